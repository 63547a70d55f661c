//! MIR data model for the buildgraph compiler.
//!
//! This crate holds the parts of the compiler that every pass and the
//! backend share: the tagged-union `Object` instruction set, the CFG that
//! links `BasicBlock`s together, the monotonically-growing `PersistentState`
//! carried across the whole configure run, and the `Toolchain` traits the
//! backend specializes arguments against.

pub mod cfg;
pub mod error;
pub mod object;
pub mod state;
pub mod toolchain;

pub use cfg::{Cfg, CfgNode, NodeId};
pub use error::CompileError;
pub use object::{
    Argument, ArgumentType, CustomTarget, Dependency, File, IncludeDirectories, IncludeKind,
    Message, MessageLevel, Object, Program, SourceLocation, Variable,
};
pub use state::{MachineInfo, MachineKind, PerMachine, PersistentState};
pub use toolchain::{Archiver, Compiler, Linker, Toolchain};
