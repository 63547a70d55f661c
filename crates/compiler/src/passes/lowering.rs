//! Lowering passes (spec §4.D): machine info, compiler insertion/methods,
//! free-function evaluation, `subdir()`-adjacent disabler propagation,
//! dependency/program/string methods, and `add_arguments` combining.
//!
//! Every pass shares one rule: a `FunctionCall` only reduces once every
//! positional and keyword argument is already `Object::is_reduced()`. A
//! pass that finds an unreduced call leaves it untouched and returns no
//! progress for that instruction; the fixed-point driver simply runs the
//! whole list again once an earlier pass (or the resolver) has reduced the
//! blocking argument.

use buildgraph_core::object::{
    AddArguments, Argument, ArgumentType, CompilerRef, CustomTarget, Dependency, File,
    FunctionCall, IncludeDirectories, MessageLevel, ObjectKind, TargetData,
};
use buildgraph_core::state::MachineKind;
use buildgraph_core::{Cfg, CompileError, NodeId, Object, PersistentState};

use super::{function_walker, graph_walker};

fn all_reduced(call: &FunctionCall) -> bool {
    call.holder.as_ref().map_or(true, |h| h.is_reduced())
        && call.positional.iter().all(Object::is_reduced)
        && call.keyword.iter().all(|(_, v)| v.is_reduced())
}

fn as_str(obj: &Object) -> Option<&str> {
    match &obj.kind {
        ObjectKind::Str(s) => Some(s),
        _ => None,
    }
}

fn as_bool(obj: &Object) -> Option<bool> {
    match &obj.kind {
        ObjectKind::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn as_array(obj: &Object) -> Option<&[Object]> {
    match &obj.kind {
        ObjectKind::Array(items) => Some(items),
        _ => None,
    }
}

fn stringify(obj: &Object) -> String {
    match &obj.kind {
        ObjectKind::Str(s) => s.clone(),
        ObjectKind::Number(n) => n.to_string(),
        ObjectKind::Boolean(b) => b.to_string(),
        other => format!("{other:?}"),
    }
}

/// `build_machine.*`/`host_machine.*`/`target_machine.*` → string literals
/// read off `PersistentState::machines`.
pub fn machine_lowering(cfg: &mut Cfg, state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &obj.kind else {
                return Ok(false);
            };
            let Some(holder) = &call.holder else { return Ok(false) };
            let ObjectKind::Identifier { name, .. } = &holder.kind else {
                return Ok(false);
            };
            let machine = match name.as_str() {
                "build_machine" => MachineKind::Build,
                "host_machine" => MachineKind::Host,
                "target_machine" => MachineKind::Target,
                _ => return Ok(false),
            };
            let Some(info) = state.machines.get(machine) else {
                return Ok(false);
            };
            let replacement = match call.name.as_str() {
                "cpu_family" => info.cpu_family.clone(),
                "cpu" => info.cpu.clone(),
                "system" => info.system.clone(),
                "endian" => info.endian.clone(),
                _ => return Ok(false),
            };
            *obj = Object::string(replacement).assign(obj.var.name.clone());
            Ok(true)
        })
    })
}

/// `meson.get_compiler(lang, native: bool?)` → a `Compiler` object bound
/// to the detected toolchain, once one exists for that language/machine.
pub fn compiler_insertion(cfg: &mut Cfg, state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &obj.kind else {
                return Ok(false);
            };
            if call.name != "get_compiler" {
                return Ok(false);
            }
            let Some(holder) = &call.holder else { return Ok(false) };
            if !matches!(&holder.kind, ObjectKind::Identifier { name, .. } if name == "meson") {
                return Ok(false);
            }
            if !all_reduced(call) {
                return Ok(false);
            }
            let Some(lang) = call.positional.first().and_then(as_str) else {
                return Err(CompileError::invalid_arguments(
                    "get_compiler",
                    "expected a language string",
                ));
            };
            let native = call
                .keyword_arg("native")
                .and_then(as_bool)
                .unwrap_or(false);
            let machine = if native { MachineKind::Build } else { MachineKind::Host };
            if state.toolchain(lang, machine).is_none() {
                return Err(CompileError::meson(format!(
                    "no toolchain detected for language '{lang}'"
                )));
            }
            *obj = Object::new(ObjectKind::Compiler(CompilerRef {
                language: lang.to_string(),
                for_machine: machine,
            }))
            .assign(obj.var.name.clone());
            Ok(true)
        })
    })
}

/// `Compiler.get_id()` (and friends) — dispatched only when the holder is
/// already a reduced `Compiler` reference.
pub fn compiler_methods(cfg: &mut Cfg, state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &obj.kind else {
                return Ok(false);
            };
            let Some(holder) = &call.holder else { return Ok(false) };
            let ObjectKind::Compiler(reference) = &holder.kind else {
                return Ok(false);
            };
            if !all_reduced(call) {
                return Ok(false);
            }
            let Some(toolchain) = state.toolchain(&reference.language, reference.for_machine) else {
                return Err(CompileError::meson(format!(
                    "no toolchain bound for language '{}'",
                    reference.language
                )));
            };
            let replacement = match call.name.as_str() {
                "get_id" => Object::string(toolchain.compiler.id()),
                "get_argument_syntax" => Object::string(toolchain.compiler.id()),
                _ => return Ok(false),
            };
            *obj = replacement.assign(obj.var.name.clone());
            Ok(true)
        })
    })
}

/// Splices one level of nested `Array` elements inside a `FunctionCall`'s
/// positional arguments (spec §8 property/E6: converges after repeated
/// fixed-point iterations, one flatten per pass invocation).
pub fn flatten_arguments(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &mut obj.kind else {
                return Ok(false);
            };
            let mut progress = false;
            let mut flattened = Vec::with_capacity(call.positional.len());
            for arg in call.positional.drain(..) {
                if let ObjectKind::Array(items) = arg.kind {
                    flattened.extend(items);
                    progress = true;
                } else {
                    flattened.push(arg);
                }
            }
            call.positional = flattened;
            Ok(progress)
        })
    })
}

fn src_to_file(obj: &Object, source_dir: &str, state: &PersistentState) -> Result<File, CompileError> {
    match &obj.kind {
        ObjectKind::Str(name) => Ok(File::source(
            name.clone(),
            source_dir.to_string(),
            state.source_root.clone(),
            state.build_root.clone(),
        )),
        ObjectKind::File(f) => Ok(f.clone()),
        ObjectKind::CustomTarget(ct) => match ct.outputs.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(CompileError::invalid_arguments(
                "source",
                "a custom_target with more than one output cannot be used directly as a source",
            )),
        },
        other => Err(CompileError::invalid_arguments(
            "source",
            format!("expected a string, File, or CustomTarget, got {other:?}"),
        )),
    }
}

fn substitute_command_string(s: &str, inputs: &[File], outputs: &[File]) -> String {
    let mut result = s.to_string();
    if result.contains("@INPUT@") {
        let joined = inputs
            .iter()
            .map(|f| f.relative_to_build_dir().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        result = result.replace("@INPUT@", &joined);
    }
    if result.contains("@OUTPUT@") {
        let joined = outputs
            .iter()
            .map(|f| f.relative_to_build_dir().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        result = result.replace("@OUTPUT@", &joined);
    }
    for (idx, input) in inputs.iter().enumerate() {
        let marker = format!("@INPUT{idx}@");
        if result.contains(&marker) {
            result = result.replace(&marker, &input.relative_to_build_dir().to_string_lossy());
        }
    }
    for (idx, output) in outputs.iter().enumerate() {
        let marker = format!("@OUTPUT{idx}@");
        if result.contains(&marker) {
            result = result.replace(&marker, &output.relative_to_build_dir().to_string_lossy());
        }
    }
    result
}

/// If `custom_target`'s `command` keyword's first element is still a bare
/// string, wrap it in a not-yet-reduced `find_program(name)` call so the
/// threaded resolver handles it. Runs before `free_functions` in the pass
/// list so the free-function handler never sees (and trivially reduces) a
/// bare invocation name.
pub fn custom_target_program_wrapping(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &mut obj.kind else {
                return Ok(false);
            };
            if call.name != "custom_target" {
                return Ok(false);
            }
            let source_dir = call.source_dir.clone();
            for (key, value) in call.keyword.iter_mut() {
                if key != "command" {
                    continue;
                }
                let ObjectKind::Array(items) = &mut value.kind else {
                    continue;
                };
                let Some(first) = items.first_mut() else { continue };
                if let ObjectKind::Str(name) = &first.kind {
                    let name = name.clone();
                    *first = Object::new(ObjectKind::FunctionCall(FunctionCall {
                        name: "find_program".to_string(),
                        holder: None,
                        positional: vec![Object::string(name)],
                        keyword: Vec::new(),
                        source_dir: source_dir.clone(),
                    }));
                    return Ok(true);
                }
            }
            Ok(false)
        })
    })
}

/// The free-function evaluation table (spec §4.D): every recognized
/// builtin with no holder, reducing once its arguments are all reduced.
pub fn free_functions(cfg: &mut Cfg, state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| lower_one_call(obj, state))
    })
}

fn lower_one_call(obj: &mut Object, state: &mut PersistentState) -> Result<bool, CompileError> {
    let ObjectKind::FunctionCall(call) = &obj.kind else {
        return Ok(false);
    };
    if call.holder.is_some() {
        return Ok(false);
    }
    if !all_reduced(call) {
        return Ok(false);
    }

    let var_name = obj.var.name.clone();
    let replacement = match call.name.as_str() {
        "files" => Some(lower_files(call, state)?),
        "include_directories" => Some(lower_include_directories(call)?),
        "executable" => Some(lower_target(call, state, false)?),
        "static_library" => Some(lower_target(call, state, true)?),
        "declare_dependency" => Some(lower_declare_dependency(call)?),
        "custom_target" => Some(lower_custom_target(call, state)?),
        "message" => Some(Object::message(MessageLevel::Message, join_args(&call.positional))),
        "warning" => Some(Object::message(MessageLevel::Warning, join_args(&call.positional))),
        "error" => Some(Object::message(MessageLevel::Error, join_args(&call.positional))),
        "assert" => Some(lower_assert(call)?),
        "unary_neg" => Some(lower_unary_neg(call)?),
        "unary_not" => Some(lower_unary_not(call)?),
        "rel_eq" => Some(lower_rel(call, true)?),
        "rel_ne" => Some(lower_rel(call, false)?),
        "project" => Some(lower_project(call, state)?),
        "test" => Some(lower_test(call)?),
        _ => None,
    };
    match replacement {
        Some(new_obj) => {
            *obj = new_obj.assign(var_name);
            Ok(true)
        }
        None => Ok(false),
    }
}

fn join_args(args: &[Object]) -> String {
    args.iter().map(stringify).collect::<Vec<_>>().join(" ")
}

fn lower_files(call: &FunctionCall, state: &PersistentState) -> Result<Object, CompileError> {
    let mut files = Vec::with_capacity(call.positional.len());
    for arg in &call.positional {
        let name = as_str(arg).ok_or_else(|| {
            CompileError::invalid_arguments("files", "expected every argument to be a string")
        })?;
        files.push(Object::new(ObjectKind::File(File::source(
            name.to_string(),
            call.source_dir.clone(),
            state.source_root.clone(),
            state.build_root.clone(),
        ))));
    }
    Ok(Object::new(ObjectKind::Array(files)))
}

fn lower_include_directories(call: &FunctionCall) -> Result<Object, CompileError> {
    let mut dirs = Vec::with_capacity(call.positional.len());
    for arg in &call.positional {
        let dir = as_str(arg).ok_or_else(|| {
            CompileError::invalid_arguments("include_directories", "expected every argument to be a string")
        })?;
        dirs.push(dir.to_string());
    }
    let is_system = call.keyword_arg("is_system").and_then(as_bool).unwrap_or(false);
    Ok(Object::new(ObjectKind::IncludeDirectories(IncludeDirectories {
        dirs,
        is_system,
    })))
}

fn gather_include_dirs(call: &FunctionCall) -> Result<Vec<IncludeDirectories>, CompileError> {
    let Some(arg) = call.keyword_arg("include_directories") else {
        return Ok(Vec::new());
    };
    let items = as_array(arg).ok_or_else(|| {
        CompileError::invalid_arguments("include_directories", "expected an array")
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match &item.kind {
            ObjectKind::IncludeDirectories(dirs) => out.push(dirs.clone()),
            other => {
                return Err(CompileError::invalid_arguments(
                    "include_directories",
                    format!("expected IncludeDirectories elements, got {other:?}"),
                ))
            }
        }
    }
    Ok(out)
}

/// Generalizes every `*_args`-style keyword argument (already-reduced
/// strings) into `Argument`s via the GNU-family parser (spec §4.D:
/// compiler-specific flags are generalized before being stored).
fn gather_arguments(call: &FunctionCall, keys: &[&str]) -> Result<Vec<Argument>, CompileError> {
    let mut args = Vec::new();
    for key in keys {
        let Some(value) = call.keyword_arg(key) else { continue };
        let items = as_array(value).ok_or_else(|| {
            CompileError::invalid_arguments(*key, "expected an array of strings")
        })?;
        for item in items {
            let flag = as_str(item).ok_or_else(|| {
                CompileError::invalid_arguments(*key, "expected every element to be a string")
            })?;
            args.push(buildgraph_core::toolchain::generalize_gnu_argument(flag));
        }
    }
    Ok(args)
}

fn gather_link_with(call: &FunctionCall) -> Result<Vec<buildgraph_core::object::TargetHandle>, CompileError> {
    let Some(value) = call.keyword_arg("link_with") else {
        return Ok(Vec::new());
    };
    let items = as_array(value).ok_or_else(|| {
        CompileError::invalid_arguments("link_with", "expected an array")
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match &item.kind {
            ObjectKind::StaticLibrary(data) => {
                let output = File::built(
                    format!("lib{}.a", data.name),
                    data.subdir.clone(),
                    data.sources.first().map(|f| f.source_root.clone()).unwrap_or_default(),
                    data.sources.first().map(|f| f.build_root.clone()).unwrap_or_default(),
                );
                out.push(data.handle(output));
            }
            other => {
                return Err(CompileError::invalid_arguments(
                    "link_with",
                    format!("expected a static_library(), got {other:?}"),
                ))
            }
        }
    }
    Ok(out)
}

fn lower_target(call: &FunctionCall, state: &PersistentState, is_static_lib: bool) -> Result<Object, CompileError> {
    let name = call
        .positional
        .first()
        .and_then(as_str)
        .ok_or_else(|| CompileError::invalid_arguments("executable", "expected a name string"))?
        .to_string();

    let mut sources = Vec::new();
    for arg in call.positional.iter().skip(1) {
        sources.push(src_to_file(arg, &call.source_dir, state)?);
    }

    let native = call.keyword_arg("native").and_then(as_bool).unwrap_or(false);
    let for_machine = if native { MachineKind::Build } else { MachineKind::Host };
    let language = "c".to_string();

    let mut arguments = gather_arguments(call, &["cpp_args", "c_args"])?;
    arguments.extend(gather_include_dirs(call)?.into_iter().flat_map(|d| {
        d.dirs
            .into_iter()
            .map(move |dir| Argument::new(dir, ArgumentType::Include).with_include_kind(if d.is_system {
                buildgraph_core::object::IncludeKind::System
            } else {
                buildgraph_core::object::IncludeKind::Base
            }))
            .collect::<Vec<_>>()
    }));

    let data = TargetData {
        name,
        subdir: call.source_dir.clone(),
        sources,
        link_with: gather_link_with(call)?,
        include_dirs: gather_include_dirs(call)?,
        arguments,
        language,
        for_machine,
    };

    Ok(Object::new(if is_static_lib {
        ObjectKind::StaticLibrary(data)
    } else {
        ObjectKind::Executable(data)
    }))
}

fn lower_declare_dependency(call: &FunctionCall) -> Result<Object, CompileError> {
    let version = call
        .keyword_arg("version")
        .and_then(as_str)
        .unwrap_or_default()
        .to_string();
    let mut arguments = gather_arguments(call, &["compile_args"])?;

    if let Some(value) = call.keyword_arg("include_directories") {
        match &value.kind {
            ObjectKind::IncludeDirectories(dirs) => {
                arguments.extend(dirs.dirs.iter().map(|d| Argument::new(d.clone(), ArgumentType::Include)));
            }
            ObjectKind::Array(items) => {
                for item in items {
                    if let ObjectKind::IncludeDirectories(dirs) = &item.kind {
                        arguments.extend(dirs.dirs.iter().map(|d| Argument::new(d.clone(), ArgumentType::Include)));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(value) = call.keyword_arg("dependencies") {
        let items = as_array(value).ok_or_else(|| {
            CompileError::invalid_arguments("declare_dependency", "expected an array")
        })?;
        for item in items {
            if let ObjectKind::Dependency(dep) = &item.kind {
                arguments.extend(dep.arguments.iter().cloned());
            }
        }
    }

    Ok(Object::new(ObjectKind::Dependency(Dependency {
        name: String::new(),
        found: true,
        version,
        arguments,
    })))
}

fn lower_custom_target(call: &FunctionCall, state: &PersistentState) -> Result<Object, CompileError> {
    let name = call
        .positional
        .first()
        .and_then(as_str)
        .or_else(|| call.keyword_arg("name").and_then(as_str))
        .unwrap_or("custom_target")
        .to_string();

    let mut inputs = Vec::new();
    if let Some(value) = call.keyword_arg("input") {
        match &value.kind {
            ObjectKind::Array(items) => {
                for item in items {
                    inputs.push(src_to_file(item, &call.source_dir, state)?);
                }
            }
            _ => inputs.push(src_to_file(value, &call.source_dir, state)?),
        }
    }

    let mut outputs = Vec::new();
    match call.keyword_arg("output") {
        Some(value) => match &value.kind {
            ObjectKind::Array(items) => {
                for item in items {
                    let name = as_str(item).ok_or_else(|| {
                        CompileError::invalid_arguments("custom_target", "output must be a string")
                    })?;
                    outputs.push(File::built(
                        name.to_string(),
                        call.source_dir.clone(),
                        state.source_root.clone(),
                        state.build_root.clone(),
                    ));
                }
            }
            ObjectKind::Str(name) => outputs.push(File::built(
                name.clone(),
                call.source_dir.clone(),
                state.source_root.clone(),
                state.build_root.clone(),
            )),
            other => {
                return Err(CompileError::invalid_arguments(
                    "custom_target",
                    format!("output must be a string or array of strings, got {other:?}"),
                ))
            }
        },
        None => {
            return Err(CompileError::invalid_arguments(
                "custom_target",
                "output is required",
            ))
        }
    }

    let command_items = call
        .keyword_arg("command")
        .and_then(as_array)
        .ok_or_else(|| CompileError::invalid_arguments("custom_target", "command is required"))?;
    let mut command = Vec::with_capacity(command_items.len());
    for item in command_items {
        let rendered = match &item.kind {
            ObjectKind::Program(p) => p.path.clone(),
            ObjectKind::Str(s) => substitute_command_string(s, &inputs, &outputs),
            ObjectKind::File(f) => f.relative_to_build_dir().to_string_lossy().into_owned(),
            other => {
                return Err(CompileError::invalid_arguments(
                    "custom_target",
                    format!("command elements must be a program, string, or file, got {other:?}"),
                ))
            }
        };
        command.push(rendered);
    }

    let depends = match call.keyword_arg("depends") {
        Some(value) => as_array(value)
            .ok_or_else(|| CompileError::invalid_arguments("custom_target", "depends must be an array"))?
            .iter()
            .map(stringify)
            .collect(),
        None => Vec::new(),
    };
    let depfile = call.keyword_arg("depfile").and_then(as_str).map(str::to_string);

    Ok(Object::new(ObjectKind::CustomTarget(CustomTarget {
        name,
        inputs,
        outputs,
        command,
        subdir: call.source_dir.clone(),
        depends,
        depfile,
    })))
}

fn lower_assert(call: &FunctionCall) -> Result<Object, CompileError> {
    let cond = call
        .positional
        .first()
        .and_then(as_bool)
        .ok_or_else(|| CompileError::invalid_arguments("assert", "expected a boolean condition"))?;
    if cond {
        Ok(Object::empty())
    } else {
        let msg = call
            .positional
            .get(1)
            .map(stringify)
            .unwrap_or_else(|| "Assertion failed".to_string());
        Ok(Object::message(MessageLevel::Error, format!("Assertion failed: {msg}")))
    }
}

fn lower_unary_neg(call: &FunctionCall) -> Result<Object, CompileError> {
    match call.positional.first().map(|o| &o.kind) {
        Some(ObjectKind::Number(n)) => Ok(Object::number(-n)),
        other => Err(CompileError::invalid_arguments(
            "unary_neg",
            format!("expected a number, got {other:?}"),
        )),
    }
}

fn lower_unary_not(call: &FunctionCall) -> Result<Object, CompileError> {
    match call.positional.first().map(|o| &o.kind) {
        Some(ObjectKind::Boolean(b)) => Ok(Object::boolean(!b)),
        other => Err(CompileError::invalid_arguments(
            "unary_not",
            format!("expected a boolean, got {other:?}"),
        )),
    }
}

fn lower_rel(call: &FunctionCall, want_eq: bool) -> Result<Object, CompileError> {
    let lhs = call
        .positional
        .first()
        .ok_or_else(|| CompileError::invalid_arguments("rel_eq", "expected two operands"))?;
    let rhs = call
        .positional
        .get(1)
        .ok_or_else(|| CompileError::invalid_arguments("rel_eq", "expected two operands"))?;
    let equal = lhs.kind == rhs.kind;
    Ok(Object::boolean(if want_eq { equal } else { !equal }))
}

/// `test(name, exe, args: [...]?, should_fail: bool?)` (spec §4.G).
fn lower_test(call: &FunctionCall) -> Result<Object, CompileError> {
    let name = call
        .positional
        .first()
        .and_then(as_str)
        .ok_or_else(|| CompileError::invalid_arguments("test", "expected a name string"))?
        .to_string();

    let exe_obj = call
        .positional
        .get(1)
        .ok_or_else(|| CompileError::invalid_arguments("test", "expected an executable argument"))?;
    let executable = match &exe_obj.kind {
        ObjectKind::File(f) => buildgraph_core::object::TestExecutable::File(f.clone()),
        ObjectKind::Executable(data) => buildgraph_core::object::TestExecutable::Executable(data.clone()),
        ObjectKind::Program(p) => buildgraph_core::object::TestExecutable::Program(p.clone()),
        other => {
            return Err(CompileError::invalid_arguments(
                "test",
                format!("expected a File, executable(), or program for the executable, got {other:?}"),
            ))
        }
    };

    let mut arguments = Vec::new();
    if let Some(value) = call.keyword_arg("args") {
        let items = as_array(value)
            .ok_or_else(|| CompileError::invalid_arguments("test", "args must be an array"))?;
        for item in items {
            match &item.kind {
                ObjectKind::Str(s) => arguments.push(s.clone()),
                ObjectKind::File(f) => arguments.push(f.relative_to_build_dir().to_string_lossy().into_owned()),
                other => {
                    return Err(CompileError::invalid_arguments(
                        "test",
                        format!("args elements must be a string or File, got {other:?}"),
                    ))
                }
            }
        }
    }

    let should_fail = call.keyword_arg("should_fail").and_then(as_bool).unwrap_or(false);

    Ok(Object::new(ObjectKind::Test(buildgraph_core::object::Test {
        name,
        executable,
        arguments,
        should_fail,
    })))
}

fn lower_project(call: &FunctionCall, state: &mut PersistentState) -> Result<Object, CompileError> {
    let name = call
        .positional
        .first()
        .and_then(as_str)
        .ok_or_else(|| CompileError::invalid_arguments("project", "expected a project name string"))?
        .to_string();
    state.project_name = Some(name);

    let version = call.keyword_arg("version").and_then(as_str).map(str::to_string);
    if version.is_some() {
        state.project_version = version;
    }

    for lang_obj in call.positional.iter().skip(1) {
        let Some(lang) = as_str(lang_obj) else { continue };
        if state.toolchain(lang, MachineKind::Build).is_none() {
            for candidate in buildgraph_core::toolchain::candidates(lang) {
                state.set_toolchain(
                    lang.to_string(),
                    MachineKind::Build,
                    buildgraph_core::Toolchain::gnu(lang, candidate, MachineKind::Build),
                );
                break;
            }
        }
    }

    Ok(Object::empty())
}

/// Any `Disabler` appearing in a construct's arguments/predicate poisons
/// the whole construct (spec §4.D, transitive).
pub fn disabler_propagation(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node: NodeId| {
        function_walker(cfg, node, &mut |obj| {
            let contains_disabler = match &obj.kind {
                ObjectKind::FunctionCall(call) => {
                    call.holder.as_deref().is_some_and(Object::is_disabler)
                        || call.positional.iter().any(Object::is_disabler)
                        || call.keyword.iter().any(|(_, v)| v.is_disabler())
                }
                ObjectKind::Array(items) => items.iter().any(Object::is_disabler),
                ObjectKind::Dict(entries) => entries.iter().any(|(_, v)| v.is_disabler()),
                ObjectKind::Branch { arms } => arms.iter().any(|(pred, _)| pred.is_disabler()),
                _ => false,
            };
            if contains_disabler && !obj.is_disabler() {
                *obj = Object::disabler().assign(obj.var.name.clone());
                Ok(true)
            } else {
                Ok(false)
            }
        })
    })
}

/// `Dependency.found/version/name()`, `Program.found()`,
/// `String.version_compare(spec)`.
pub fn dependency_program_string_methods(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &obj.kind else {
                return Ok(false);
            };
            let Some(holder) = &call.holder else { return Ok(false) };
            if !all_reduced(call) {
                return Ok(false);
            }
            let var_name = obj.var.name.clone();
            let replacement = match &holder.kind {
                ObjectKind::Dependency(dep) => match call.name.as_str() {
                    "found" => Some(Object::boolean(dep.found)),
                    "version" => Some(Object::string(dep.version.clone())),
                    "name" => Some(Object::string(dep.name.clone())),
                    _ => None,
                },
                ObjectKind::Program(p) => match call.name.as_str() {
                    "found" => Some(Object::boolean(p.found())),
                    "path" | "full_path" => Some(Object::string(p.path.clone())),
                    _ => None,
                },
                ObjectKind::Str(s) => match call.name.as_str() {
                    "version_compare" => {
                        let spec = call.positional.first().and_then(as_str).ok_or_else(|| {
                            CompileError::invalid_arguments("version_compare", "expected a comparator string")
                        })?;
                        Some(Object::boolean(crate::version_compare::version_compare(s, spec)?))
                    }
                    "to_upper" => Some(Object::string(s.to_uppercase())),
                    "to_lower" => Some(Object::string(s.to_lowercase())),
                    _ => None,
                },
                _ => None,
            };
            match replacement {
                Some(new_obj) => {
                    *obj = new_obj.assign(var_name);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    })
}

/// Coalesces every `add_global_arguments`/`add_project_arguments` call for
/// one scope into a single `AddArguments` instruction per block, keeping
/// duplicates (order-significant for the eventual compiler invocation).
pub fn add_arguments_combining(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut progress = false;
    for node in cfg.node_ids().collect::<Vec<_>>() {
        let instructions = &cfg.node(node).instructions;
        let mut combined: Option<(bool, std::collections::BTreeMap<String, Vec<Argument>>)> = None;
        let mut first_index = None;
        let mut to_remove = Vec::new();

        for (idx, instr) in instructions.iter().enumerate() {
            let ObjectKind::FunctionCall(call) = &instr.kind else { continue };
            let is_global = match call.name.as_str() {
                "add_global_arguments" => true,
                "add_project_arguments" => false,
                _ => continue,
            };
            if !all_reduced(call) {
                continue;
            }
            let languages: Vec<String> = call
                .keyword_arg("language")
                .and_then(as_array)
                .map(|items| items.iter().filter_map(|o| as_str(o).map(str::to_string)).collect())
                .unwrap_or_else(|| vec!["c".to_string()]);
            let flags: Vec<Argument> = call
                .positional
                .iter()
                .filter_map(as_str)
                .map(buildgraph_core::toolchain::generalize_gnu_argument)
                .collect();

            let (existing_global, map) = combined.get_or_insert_with(|| (is_global, Default::default()));
            if *existing_global != is_global {
                continue;
            }
            for lang in languages {
                map.entry(lang).or_default().extend(flags.clone());
            }
            if first_index.is_none() {
                first_index = Some(idx);
            }
            to_remove.push(idx);
        }

        if to_remove.len() < 2 {
            continue;
        }
        let (is_global, arguments) = combined.unwrap();
        let first_index = first_index.unwrap();
        let node_mut = cfg.node_mut(node);
        for &idx in to_remove.iter().rev() {
            node_mut.instructions.remove(idx);
        }
        node_mut.instructions.insert(
            first_index,
            Object::new(ObjectKind::AddArguments(AddArguments { is_global, arguments })),
        );
        progress = true;
    }
    Ok(progress)
}
