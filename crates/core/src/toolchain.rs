//! Compiler/linker/archiver abstraction the backend specializes generic
//! `Argument`s against (spec §3 "Toolchain", §4.C compiler insertion pass).
//!
//! Only a GNU-family default is implemented; `detect_compilers` probes a
//! fixed candidate list per language the way the original's
//! `detect_compilers.cpp` does, rather than parsing `--version` output.

use crate::object::{Argument, ArgumentType, IncludeKind};
use crate::state::MachineKind;

/// Fixed per-language probe order. Grounded on the original's
/// `src/hir/toolchains/detect_compilers.cpp`, which walks a short static
/// candidate list per language rather than querying `cc -v`: real systems
/// rarely have more than one relevant compiler on `PATH` for a language,
/// and falling back through a list sidesteps version-string parsing
/// entirely.
pub fn candidates(language: &str) -> &'static [&'static str] {
    match language {
        "c" => &["cc", "gcc", "clang"],
        "cpp" => &["c++", "g++", "clang++"],
        _ => &[],
    }
}

/// Parses a compiler-native flag back into a generic `Argument` (spec §6
/// `generalize_argument`): `-D…`/`-I…`/`-L…`/`-l…` and `.a`/`.so` paths are
/// recognized, everything else is `Raw`. Shared by every GNU-family
/// component since the flag spellings are identical across gcc/clang.
pub fn generalize_gnu_argument(flag: &str) -> Argument {
    if let Some(rest) = flag.strip_prefix("-D") {
        Argument::new(rest, ArgumentType::Define)
    } else if let Some(rest) = flag.strip_prefix("-I") {
        Argument::new(rest, ArgumentType::Include)
    } else if let Some(rest) = flag.strip_prefix("-L") {
        Argument::new(rest, ArgumentType::LinkSearch)
    } else if let Some(rest) = flag.strip_prefix("-l") {
        Argument::new(rest, ArgumentType::Link)
    } else if flag.ends_with(".a") || flag.ends_with(".so") {
        Argument::new(flag, ArgumentType::Link)
    } else {
        Argument::new(flag, ArgumentType::Raw)
    }
}

pub trait Compiler: std::fmt::Debug {
    fn id(&self) -> &str;
    fn language(&self) -> &str;
    fn exe(&self) -> &str;
    fn for_machine(&self) -> MachineKind;
    /// Flags required on every invocation (spec glossary "Always-args"),
    /// e.g. `-D_FILE_OFFSET_BITS=64` on non-Darwin targets.
    fn always_args(&self) -> Vec<String> {
        Vec::new()
    }
    fn command(&self) -> Vec<String> {
        vec![self.exe().to_string()]
    }
    fn compile_only_command(&self) -> Vec<String> {
        vec!["-c".to_string()]
    }
    fn output_command(&self, output: &str) -> Vec<String> {
        vec!["-o".to_string(), output.to_string()]
    }
    fn specialize_argument(&self, arg: &Argument) -> Vec<String> {
        match arg.arg_type {
            ArgumentType::Define => vec![format!("-D{}", arg.value)],
            ArgumentType::Include => match arg.include_kind {
                IncludeKind::System => vec!["-isystem".to_string(), arg.value.clone()],
                IncludeKind::Base => vec![format!("-I{}", arg.value)],
            },
            ArgumentType::Link => vec![format!("-l{}", arg.value)],
            ArgumentType::LinkSearch => vec![format!("-L{}", arg.value)],
            ArgumentType::Raw => vec![arg.value.clone()],
        }
    }
    fn generalize_argument(&self, flag: &str) -> Argument {
        generalize_gnu_argument(flag)
    }
}

pub trait Linker: std::fmt::Debug {
    fn id(&self) -> &str;
    fn exe(&self) -> &str;
    fn for_machine(&self) -> MachineKind;
    fn always_args(&self) -> Vec<String> {
        Vec::new()
    }
    fn command(&self) -> Vec<String> {
        vec![self.exe().to_string()]
    }
    fn output_command(&self, output: &str) -> Vec<String> {
        vec!["-o".to_string(), output.to_string()]
    }
    fn link_with_args(&self, libs: &[String]) -> Vec<String> {
        libs.iter().map(|l| format!("-l{l}")).collect()
    }
}

pub trait Archiver: std::fmt::Debug {
    fn id(&self) -> &str;
    fn exe(&self) -> &str;
    fn for_machine(&self) -> MachineKind;
    fn always_args(&self) -> Vec<String> {
        Vec::new()
    }
    fn command(&self) -> Vec<String> {
        vec![self.exe().to_string()]
    }
    /// Arguments to create `output` from `members`, in invocation order.
    fn create_args(&self, output: &str, members: &[String]) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct GnuCompiler {
    pub language: String,
    pub exe: String,
    pub for_machine: MachineKind,
}

impl Compiler for GnuCompiler {
    fn id(&self) -> &str {
        "gnu"
    }

    fn language(&self) -> &str {
        &self.language
    }

    fn exe(&self) -> &str {
        &self.exe
    }

    fn for_machine(&self) -> MachineKind {
        self.for_machine
    }

    fn always_args(&self) -> Vec<String> {
        if self.language == "c" || self.language == "cpp" {
            vec!["-D_FILE_OFFSET_BITS=64".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GnuLinker {
    pub exe: String,
    pub for_machine: MachineKind,
}

impl Linker for GnuLinker {
    fn id(&self) -> &str {
        "gnu"
    }

    fn exe(&self) -> &str {
        &self.exe
    }

    fn for_machine(&self) -> MachineKind {
        self.for_machine
    }
}

#[derive(Debug, Clone)]
pub struct GnuArchiver {
    pub exe: String,
    pub for_machine: MachineKind,
}

impl Archiver for GnuArchiver {
    fn id(&self) -> &str {
        "gnu"
    }

    fn exe(&self) -> &str {
        &self.exe
    }

    fn for_machine(&self) -> MachineKind {
        self.for_machine
    }

    fn create_args(&self, output: &str, members: &[String]) -> Vec<String> {
        let mut args = vec!["csr".to_string(), output.to_string()];
        args.extend(members.iter().cloned());
        args
    }
}

/// The full bundle bound for one language on one machine: what
/// `compiler_pass` inserts into the MIR and the backend reads back out.
#[derive(Debug)]
pub struct Toolchain {
    pub compiler: Box<dyn Compiler>,
    pub linker: Box<dyn Linker>,
    pub archiver: Box<dyn Archiver>,
}

impl Toolchain {
    pub fn gnu(language: &str, exe: &str, for_machine: MachineKind) -> Self {
        Toolchain {
            compiler: Box::new(GnuCompiler {
                language: language.to_string(),
                exe: exe.to_string(),
                for_machine,
            }),
            linker: Box::new(GnuLinker {
                exe: exe.to_string(),
                for_machine,
            }),
            archiver: Box::new(GnuArchiver {
                exe: "ar".to_string(),
                for_machine,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_fixed_and_ordered() {
        assert_eq!(candidates("c"), &["cc", "gcc", "clang"]);
        assert_eq!(candidates("cpp"), &["c++", "g++", "clang++"]);
        assert!(candidates("fortran").is_empty());
    }

    #[test]
    fn gnu_compiler_specializes_define_and_include() {
        let cc = GnuCompiler {
            language: "c".to_string(),
            exe: "cc".to_string(),
            for_machine: MachineKind::Host,
        };
        let define = Argument::new("DEBUG=1", ArgumentType::Define);
        assert_eq!(cc.specialize_argument(&define), vec!["-DDEBUG=1".to_string()]);

        let system_include =
            Argument::new("/usr/include/foo", ArgumentType::Include).with_include_kind(IncludeKind::System);
        assert_eq!(
            cc.specialize_argument(&system_include),
            vec!["-isystem".to_string(), "/usr/include/foo".to_string()]
        );
    }

    #[test]
    fn generalize_gnu_argument_recognizes_define_and_link() {
        assert_eq!(
            generalize_gnu_argument("-Dfoo"),
            Argument::new("foo", ArgumentType::Define)
        );
        assert_eq!(
            generalize_gnu_argument("-lm"),
            Argument::new("m", ArgumentType::Link)
        );
        assert_eq!(
            generalize_gnu_argument("libfoo.a"),
            Argument::new("libfoo.a", ArgumentType::Link)
        );
        assert_eq!(
            generalize_gnu_argument("--std=c11"),
            Argument::new("--std=c11", ArgumentType::Raw)
        );
    }

    #[test]
    fn gnu_archiver_creates_with_csr() {
        let ar = GnuArchiver {
            exe: "ar".to_string(),
            for_machine: MachineKind::Host,
        };
        assert_eq!(
            ar.create_args("libfoo.a", &["a.o".to_string(), "b.o".to_string()]),
            vec!["csr", "libfoo.a", "a.o", "b.o"]
        );
    }
}
