//! Cross-pass state carried for the whole configure run (spec §3
//! "PersistentState", §5 per-machine model).

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Mutex;

use crate::object::Program;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MachineKind {
    Build,
    Host,
    Target,
}

/// What little the backend needs to know about one of the three Meson
/// machines (the machine running the compiler, the machine the binary
/// runs on, and — for compilers that produce cross compilers themselves —
/// the machine the binary's *output* runs on).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub system: String,
    pub cpu_family: String,
    pub cpu: String,
    pub endian: String,
}

impl MachineInfo {
    pub fn native(system: impl Into<String>, cpu_family: impl Into<String>, cpu: impl Into<String>) -> Self {
        MachineInfo {
            system: system.into(),
            cpu_family: cpu_family.into(),
            cpu: cpu.into(),
            endian: "little".to_string(),
        }
    }
}

/// A value that may differ across `{build, host, target}`, with Meson's
/// fallback rule: `target` falls back to `host`, `host` falls back to
/// `build`, and `build` has no fallback (spec §5). Used for
/// `MachineInfo`, compiler choices, and per-machine arguments.
#[derive(Debug, Clone, Default)]
pub struct PerMachine<T> {
    pub build: Option<T>,
    pub host: Option<T>,
    pub target: Option<T>,
}

impl<T> PerMachine<T> {
    pub fn new() -> Self {
        PerMachine {
            build: None,
            host: None,
            target: None,
        }
    }

    pub fn set(&mut self, machine: MachineKind, value: T) {
        match machine {
            MachineKind::Build => self.build = Some(value),
            MachineKind::Host => self.host = Some(value),
            MachineKind::Target => self.target = Some(value),
        }
    }

    /// The value for `machine`, falling back toward `build` per Meson's
    /// non-cross-compile default (spec §5): `target` -> `host` -> `build`.
    pub fn get(&self, machine: MachineKind) -> Option<&T> {
        match machine {
            MachineKind::Build => self.build.as_ref(),
            MachineKind::Host => self.host.as_ref().or(self.build.as_ref()),
            MachineKind::Target => self
                .target
                .as_ref()
                .or(self.host.as_ref())
                .or(self.build.as_ref()),
        }
    }
}

/// State that grows monotonically across the whole configure run and is
/// shared by every pass and, for `programs`, by the threaded resolver
/// (spec §5: single-writer-per-key discipline, readers never block on a
/// key they didn't request).
#[derive(Debug, Default)]
pub struct PersistentState {
    pub machines: PerMachine<MachineInfo>,
    /// Resolved `find_program()` results, keyed by (machine, name). A
    /// `Mutex` rather than per-key channels: the resolver pool holds the
    /// lock only for the insert, never across the PATH probe itself.
    pub programs: Mutex<HashMap<(MachineKind, String), Program>>,
    /// Detected toolchain per language, per machine. `Rc` rather than a
    /// plain value: compiler insertion only ever needs to read the
    /// binding, never clone its trait objects.
    pub toolchains: HashMap<String, PerMachine<Rc<Toolchain>>>,
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    pub subdir_stack: Vec<String>,
    /// Root of the DSL source tree and the build tree being configured.
    /// Carried on every `File` a lowering pass constructs.
    pub source_root: PathBuf,
    pub build_root: PathBuf,
}

impl PersistentState {
    pub fn new() -> Self {
        PersistentState::default()
    }

    pub fn with_roots(source_root: PathBuf, build_root: PathBuf) -> Self {
        PersistentState {
            source_root,
            build_root,
            ..PersistentState::default()
        }
    }

    pub fn toolchain(&self, language: &str, machine: MachineKind) -> Option<&Rc<Toolchain>> {
        self.toolchains.get(language).and_then(|pm| pm.get(machine))
    }

    pub fn set_toolchain(&mut self, language: impl Into<String>, machine: MachineKind, toolchain: Toolchain) {
        let language = language.into();
        tracing::debug!(%language, ?machine, compiler = toolchain.compiler.id(), "binding toolchain");
        self.toolchains
            .entry(language)
            .or_default()
            .set(machine, Rc::new(toolchain));
    }

    pub fn cached_program(&self, machine: MachineKind, name: &str) -> Option<Program> {
        self.programs
            .lock()
            .expect("persistent state mutex poisoned")
            .get(&(machine, name.to_string()))
            .cloned()
    }

    pub fn cache_program(&self, machine: MachineKind, name: String, program: Program) {
        tracing::debug!(?machine, name = %name, path = %program.path, "caching resolved program");
        self.programs
            .lock()
            .expect("persistent state mutex poisoned")
            .insert((machine, name), program);
    }

    pub fn push_subdir(&mut self, dir: impl Into<String>) {
        self.subdir_stack.push(dir.into());
    }

    pub fn pop_subdir(&mut self) {
        self.subdir_stack.pop();
    }

    pub fn current_subdir(&self) -> String {
        self.subdir_stack.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_machine_target_falls_back_through_host_to_build() {
        let mut pm: PerMachine<i32> = PerMachine::new();
        pm.set(MachineKind::Build, 1);
        assert_eq!(pm.get(MachineKind::Host), Some(&1));
        assert_eq!(pm.get(MachineKind::Target), Some(&1));

        pm.set(MachineKind::Host, 2);
        assert_eq!(pm.get(MachineKind::Host), Some(&2));
        assert_eq!(pm.get(MachineKind::Target), Some(&2));

        pm.set(MachineKind::Target, 3);
        assert_eq!(pm.get(MachineKind::Target), Some(&3));
        assert_eq!(pm.get(MachineKind::Build), Some(&1));
    }

    #[test]
    fn program_cache_round_trips() {
        let state = PersistentState::new();
        assert!(state.cached_program(MachineKind::Host, "cc").is_none());
        state.cache_program(
            MachineKind::Host,
            "cc".to_string(),
            Program {
                name: "cc".to_string(),
                for_machine: MachineKind::Host,
                path: "/usr/bin/cc".to_string(),
            },
        );
        let found = state.cached_program(MachineKind::Host, "cc").unwrap();
        assert_eq!(found.path, "/usr/bin/cc");
    }

    #[test]
    fn subdir_stack_joins_with_slash() {
        let mut state = PersistentState::new();
        state.push_subdir("a");
        state.push_subdir("b");
        assert_eq!(state.current_subdir(), "a/b");
        state.pop_subdir();
        assert_eq!(state.current_subdir(), "a");
    }

    #[test]
    fn toolchain_round_trips_per_language_and_machine() {
        let mut state = PersistentState::new();
        assert!(state.toolchain("c", MachineKind::Host).is_none());
        state.set_toolchain("c", MachineKind::Build, crate::toolchain::Toolchain::gnu("c", "cc", MachineKind::Build));
        assert!(state.toolchain("c", MachineKind::Host).is_some()); // falls back to build
        assert!(state.toolchain("cpp", MachineKind::Build).is_none());
    }
}
