//! CFG → flat rule list + test list (spec §4.G).
//!
//! Runs once the fixed-point driver has reduced every instruction in the
//! CFG; walks every block's instructions looking for the handful of
//! reduced object kinds the backend cares about (`Executable`,
//! `StaticLibrary`, `CustomTarget`, `Test`) and turns each into the flat,
//! Ninja-shaped output the rest of the toolchain consumes.

use buildgraph_core::object::{
    Argument, ArgumentType, CustomTarget, File, IncludeKind, ObjectKind, TargetData, TestExecutable,
};
use buildgraph_core::{Cfg, CompileError, PersistentState};

/// One emitted build step. Kept as a flat enum rather than a trait object
/// hierarchy — the Ninja emitter downstream only needs to match on these
/// four shapes, never dispatch virtually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Compile {
        inputs: Vec<String>,
        output: String,
        args: Vec<String>,
    },
    Link {
        inputs: Vec<String>,
        output: String,
        args: Vec<String>,
    },
    Archive {
        inputs: Vec<String>,
        output: String,
        args: Vec<String>,
    },
    Custom {
        inputs: Vec<String>,
        outputs: Vec<String>,
        command: Vec<String>,
        depends: Vec<String>,
        depfile: Option<String>,
        /// Set when `outputs` is empty — a custom target with nothing to
        /// check for freshness always reruns, the same way Ninja treats a
        /// rule with no declared output file.
        phony: bool,
    },
}

/// One resolved test-list entry, ready for `test_manifest::serialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub exe: String,
    pub arguments: Vec<String>,
    pub should_fail: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOutput {
    pub rules: Vec<Rule>,
    pub tests: Vec<TestCase>,
}

fn path_string(file: &File) -> String {
    file.relative_to_build_dir().to_string_lossy().into_owned()
}

fn static_lib_output_name(name: &str) -> String {
    format!("lib{name}.a")
}

/// Every `AddArguments` entry for `language`, in block-and-instruction
/// order across the whole CFG — the "global + project args for the
/// target's language" half of the aggregated argument list.
fn collect_add_arguments(cfg: &Cfg, language: &str) -> Vec<Argument> {
    let mut args = Vec::new();
    for node in cfg.node_ids() {
        for instr in &cfg.node(node).instructions {
            if let ObjectKind::AddArguments(add) = &instr.kind {
                if let Some(list) = add.arguments.get(language) {
                    args.extend(list.iter().cloned());
                }
            }
        }
    }
    args
}

fn lower_target_rules(
    cfg: &Cfg,
    state: &PersistentState,
    data: &TargetData,
    is_static: bool,
) -> Result<Vec<Rule>, CompileError> {
    let toolchain = state.toolchain(&data.language, data.for_machine).ok_or_else(|| {
        CompileError::meson(format!(
            "no toolchain bound for language '{}' when lowering target '{}'",
            data.language, data.name
        ))
    })?;

    let mut args = collect_add_arguments(cfg, &data.language);
    args.extend(data.arguments.clone());
    args.extend(
        toolchain
            .compiler
            .always_args()
            .into_iter()
            .map(|a| Argument::new(a, ArgumentType::Raw)),
    );
    args.push(Argument::new(data.subdir.clone(), ArgumentType::Include).with_include_kind(IncludeKind::Base));
    let specialized: Vec<String> = args
        .iter()
        .flat_map(|a| toolchain.compiler.specialize_argument(a))
        .collect();

    let output_name = if is_static {
        static_lib_output_name(&data.name)
    } else {
        data.name.clone()
    };

    let mut rules = Vec::new();
    let mut objects = Vec::new();
    for source in &data.sources {
        let obj_name = format!("{}.p/{}.o", output_name, source.relative_to_build_dir().to_string_lossy());
        rules.push(Rule::Compile {
            inputs: vec![path_string(source)],
            output: obj_name.clone(),
            args: specialized.clone(),
        });
        objects.push(obj_name);
    }
    for handle in &data.link_with {
        objects.push(path_string(&handle.output));
    }

    if is_static {
        rules.push(Rule::Archive {
            inputs: objects,
            output: output_name,
            args: toolchain.archiver.always_args(),
        });
    } else {
        rules.push(Rule::Link {
            inputs: objects,
            output: output_name,
            args: toolchain.linker.always_args(),
        });
    }
    Ok(rules)
}

fn lower_custom_target_rule(ct: &CustomTarget) -> Rule {
    Rule::Custom {
        inputs: ct.inputs.iter().map(path_string).collect(),
        outputs: ct.outputs.iter().map(path_string).collect(),
        command: ct.command.clone(),
        depends: ct.depends.clone(),
        depfile: ct.depfile.clone(),
        phony: ct.outputs.is_empty(),
    }
}

/// A bare relative name (no `/`) gets a `./` prefix per spec §4.H; an
/// absolute path or one with an explicit parent component does not.
fn exe_path_string(path: &str) -> String {
    if path.contains('/') {
        path.to_string()
    } else {
        format!("./{path}")
    }
}

fn lower_test_case(test: &buildgraph_core::object::Test) -> TestCase {
    let exe = match &test.executable {
        TestExecutable::File(f) => exe_path_string(&path_string(f)),
        TestExecutable::Executable(data) => exe_path_string(&data.name),
        TestExecutable::Program(p) => p.path.clone(),
    };
    TestCase {
        name: test.name.clone(),
        exe,
        arguments: test.arguments.clone(),
        should_fail: test.should_fail,
    }
}

/// Walks the fully-reduced CFG once, in block order, and emits the
/// complete rule and test list (spec §4.G).
pub fn lower(cfg: &Cfg, state: &PersistentState) -> Result<BackendOutput, CompileError> {
    let mut output = BackendOutput::default();
    for node in cfg.node_ids() {
        for instr in &cfg.node(node).instructions {
            match &instr.kind {
                ObjectKind::Executable(data) => {
                    output.rules.extend(lower_target_rules(cfg, state, data, false)?);
                }
                ObjectKind::StaticLibrary(data) => {
                    output.rules.extend(lower_target_rules(cfg, state, data, true)?);
                }
                ObjectKind::CustomTarget(ct) => {
                    output.rules.push(lower_custom_target_rule(ct));
                }
                ObjectKind::Test(test) => {
                    output.tests.push(lower_test_case(test));
                }
                _ => {}
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildgraph_core::cfg::ENTRY;
    use buildgraph_core::object::{Object, Program, Test};
    use buildgraph_core::state::MachineKind;
    use buildgraph_core::Toolchain;
    use std::path::PathBuf;

    fn state_with_c_toolchain() -> PersistentState {
        let mut state = PersistentState::with_roots(PathBuf::from("/src"), PathBuf::from("/build"));
        state.set_toolchain("c", MachineKind::Host, Toolchain::gnu("c", "cc", MachineKind::Host));
        state
    }

    #[test]
    fn executable_lowers_to_compile_then_link() {
        let mut cfg = Cfg::new();
        let state = state_with_c_toolchain();
        let source = File::source("source.c", "", state.source_root.clone(), state.build_root.clone());
        let data = TargetData {
            name: "exe".to_string(),
            subdir: String::new(),
            sources: vec![source],
            link_with: Vec::new(),
            include_dirs: Vec::new(),
            arguments: vec![Argument::new("foo", ArgumentType::Define)],
            language: "c".to_string(),
            for_machine: MachineKind::Host,
        };
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::Executable(data)));

        let output = lower(&cfg, &state).unwrap();
        assert_eq!(output.rules.len(), 2);
        match &output.rules[0] {
            Rule::Compile { output: name, args, .. } => {
                assert_eq!(name, "exe.p/source.c.o");
                assert!(args.contains(&"-Dfoo".to_string()));
            }
            other => panic!("expected Compile, got {other:?}"),
        }
        match &output.rules[1] {
            Rule::Link { inputs, output: name, .. } => {
                assert_eq!(inputs, &["exe.p/source.c.o".to_string()]);
                assert_eq!(name, "exe");
            }
            other => panic!("expected Link, got {other:?}"),
        }
    }

    #[test]
    fn custom_target_lowers_to_one_custom_rule() {
        let mut cfg = Cfg::new();
        let state = state_with_c_toolchain();
        let ct = CustomTarget {
            name: "gen".to_string(),
            inputs: Vec::new(),
            outputs: vec![File::built("out.h", "", state.source_root.clone(), state.build_root.clone())],
            command: vec!["gen".to_string(), "out.h".to_string()],
            subdir: String::new(),
            depends: Vec::new(),
            depfile: None,
        };
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::CustomTarget(ct)));
        let output = lower(&cfg, &state).unwrap();
        assert_eq!(output.rules.len(), 1);
        match &output.rules[0] {
            Rule::Custom { phony, .. } => assert!(!phony),
            other => panic!("expected Custom, got {other:?}"),
        }
    }

    #[test]
    fn custom_target_with_no_outputs_is_phony() {
        let mut cfg = Cfg::new();
        let state = state_with_c_toolchain();
        let ct = CustomTarget {
            name: "always-run".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            command: vec!["touch".to_string(), "nothing".to_string()],
            subdir: String::new(),
            depends: Vec::new(),
            depfile: None,
        };
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::CustomTarget(ct)));
        let output = lower(&cfg, &state).unwrap();
        match &output.rules[0] {
            Rule::Custom { phony, .. } => assert!(phony),
            other => panic!("expected Custom, got {other:?}"),
        }
    }

    #[test]
    fn test_with_bare_program_path_round_trips_absolute() {
        let mut cfg = Cfg::new();
        let state = state_with_c_toolchain();
        let test = Test {
            name: "foo".to_string(),
            executable: TestExecutable::Program(Program {
                name: "foo".to_string(),
                for_machine: MachineKind::Host,
                path: "/foo".to_string(),
            }),
            arguments: vec!["a".to_string(), "/b/c".to_string(), "d".to_string()],
            should_fail: false,
        };
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::Test(test)));
        let output = lower(&cfg, &state).unwrap();
        assert_eq!(output.tests.len(), 1);
        assert_eq!(output.tests[0].exe, "/foo");
    }

    #[test]
    fn test_with_built_executable_gets_dotslash_prefix() {
        let mut cfg = Cfg::new();
        let state = state_with_c_toolchain();
        let data = TargetData {
            name: "exe".to_string(),
            subdir: String::new(),
            sources: Vec::new(),
            link_with: Vec::new(),
            include_dirs: Vec::new(),
            arguments: Vec::new(),
            language: "c".to_string(),
            for_machine: MachineKind::Host,
        };
        let test = Test {
            name: "unit".to_string(),
            executable: TestExecutable::Executable(data),
            arguments: Vec::new(),
            should_fail: true,
        };
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::Test(test)));
        let output = lower(&cfg, &state).unwrap();
        assert_eq!(output.tests[0].exe, "./exe");
        assert!(output.tests[0].should_fail);
    }
}
