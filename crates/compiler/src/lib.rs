//! The buildgraph compiler: parse a DSL source tree, lower it through a
//! fixed-point pass pipeline, and emit a build-rule list plus a test
//! manifest (spec §2 overview).
//!
//! [`configure`] is the single entry point the CLI and integration tests
//! drive; everything else in this crate is a stage it wires together.

pub mod ast;
pub mod backend;
pub mod config;
pub mod ir_builder;
pub mod passes;
pub mod resolver;
pub mod test_manifest;
pub mod version_compare;

use std::fs;

use buildgraph_core::state::MachineKind;
use buildgraph_core::{CompileError, MachineInfo, PersistentState};

pub use backend::BackendOutput;
pub use config::BuildOptions;

/// Native machine info for the host this process runs on (spec §5: the
/// non-cross-compile default — `build`/`host`/`target` all the same
/// `MachineInfo`). Grounded on `std::env::consts` rather than `uname(2)`
/// so detection never fails.
fn host_machine_info() -> MachineInfo {
    let cpu_family = match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        other => other,
    };
    MachineInfo::native(std::env::consts::OS, cpu_family, cpu_family)
}

/// The full pass list in declared order (spec §5: "pass execution order
/// inside `graph_walker` is the declared order of the pass list").
fn pass_list() -> Vec<passes::Pass> {
    vec![
        Box::new(passes::lowering::machine_lowering),
        Box::new(passes::lowering::compiler_insertion),
        Box::new(passes::lowering::compiler_methods),
        Box::new(passes::lowering::flatten_arguments),
        Box::new(passes::lowering::custom_target_program_wrapping),
        Box::new(passes::lowering::free_functions),
        Box::new(passes::lowering::disabler_propagation),
        Box::new(passes::lowering::dependency_program_string_methods),
        Box::new(passes::lowering::add_arguments_combining),
        Box::new(passes::optimize::gvn_and_phi_fixup),
        Box::new(passes::optimize::constant_folding),
        Box::new(passes::optimize::constant_propagation),
        Box::new(passes::optimize::branch_pruning),
        Box::new(passes::optimize::block_joining),
        Box::new(passes::optimize::dead_code_removal),
        Box::new(passes::resolve::resolve_programs),
    ]
}

/// Dumps every block's instructions to `path` if `MESONPP_DEBUG_PRINT_MIR`
/// names one (spec §6 environment). Best-effort: a write failure here
/// never aborts configuration.
fn debug_dump_mir(cfg: &buildgraph_core::Cfg, label: &str) {
    let Ok(path) = std::env::var("MESONPP_DEBUG_PRINT_MIR") else {
        return;
    };
    let mut dump = format!("--- {label} ---\n");
    for node in cfg.node_ids() {
        dump.push_str(&format!("{node:?}:\n"));
        for instr in &cfg.node(node).instructions {
            dump.push_str(&format!("  {:?} = {:?}\n", instr.var, instr.kind));
        }
    }
    if let Ok(mut existing) = fs::read_to_string(&path) {
        existing.push_str(&dump);
        let _ = fs::write(&path, existing);
    } else {
        let _ = fs::write(&path, dump);
    }
}

/// Runs the whole pipeline for the `meson.build` at the root of
/// `options.source_dir`: parse, inline `subdir()`s, lower to the initial
/// CFG, run the fixed-point pass list, then lower the reduced CFG to
/// `(rules, tests)` (spec §2).
pub fn configure(options: &BuildOptions) -> Result<BackendOutput, CompileError> {
    let root_file = options.source_path("meson.build");
    let source = fs::read_to_string(&root_file)?;
    let program = ast::Parser::new("meson.build", &source)?.parse_program()?;
    let resolved_body = ir_builder::resolve_subdirs(program.body, &options.source_dir, std::path::Path::new(""))?;
    let program = ast::Program {
        file: program.file,
        body: resolved_body,
    };

    let mut cfg = ir_builder::build(&program)?;
    debug_dump_mir(&cfg, "initial");

    let mut state = PersistentState::with_roots(options.source_dir.clone(), options.build_dir.clone());
    let machine = host_machine_info();
    state.machines.set(MachineKind::Build, machine.clone());
    state.machines.set(MachineKind::Host, machine);

    let mut passes = pass_list();
    passes::run_fixed_point(&mut cfg, &mut state, &mut passes, 64)?;
    debug_dump_mir(&cfg, "fixed-point");

    backend::lower(&cfg, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(dir: &std::path::Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = fs::File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn e1_single_executable_compiles_and_links() {
        let dir = tempfile::tempdir().unwrap();
        write_source(
            dir.path(),
            "meson.build",
            "project('foo', 'c')\nexecutable('exe', 'source.c', cpp_args : ['-Dfoo'])\n",
        );
        let options = BuildOptions::new(dir.path(), dir.path().join("build"));
        let output = configure(&options).unwrap();
        assert_eq!(output.rules.len(), 2);
        assert!(matches!(&output.rules[0], backend::Rule::Compile { .. }));
        assert!(matches!(&output.rules[1], backend::Rule::Link { .. }));
    }

    #[test]
    fn e2_true_branch_resolves_to_a_single_message() {
        let dir = tempfile::tempdir().unwrap();
        write_source(
            dir.path(),
            "meson.build",
            "if true\n  x = 9\nelse\n  x = 10\nendif\nmessage(x)\n",
        );
        let options = BuildOptions::new(dir.path(), dir.path().join("build"));
        // message() has no backend-visible rule; drive the pipeline
        // directly to inspect the reduced CFG instead of the backend
        // output (which only sees targets and tests).
        let source = fs::read_to_string(options.source_path("meson.build")).unwrap();
        let program = ast::Parser::new("meson.build", &source).unwrap().parse_program().unwrap();
        let mut cfg = ir_builder::build(&program).unwrap();
        let mut state = PersistentState::with_roots(options.source_dir.clone(), options.build_dir.clone());
        let machine = host_machine_info();
        state.machines.set(MachineKind::Build, machine.clone());
        state.machines.set(MachineKind::Host, machine);
        let mut passes = pass_list();
        passes::run_fixed_point(&mut cfg, &mut state, &mut passes, 64).unwrap();

        let messages: Vec<_> = cfg
            .node_ids()
            .flat_map(|n| cfg.node(n).instructions.iter().cloned())
            .filter(|o| matches!(o.kind, buildgraph_core::object::ObjectKind::Message(_)))
            .collect();
        assert_eq!(messages.len(), 1);
        match &messages[0].kind {
            buildgraph_core::object::ObjectKind::Message(m) => assert_eq!(m.text, "9"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn subdir_with_missing_meson_build_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), "meson.build", "subdir('nope')\n");
        let options = BuildOptions::new(dir.path(), dir.path().join("build"));
        assert!(configure(&options).is_err());
    }
}
