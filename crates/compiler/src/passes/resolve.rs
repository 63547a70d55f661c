//! The CFG-integration layer around the threaded `find_program` resolver
//! (spec §4.F): collect candidate calls, hand the unresolved ones to
//! `resolver::resolve_all`, then rewrite every call with the cached
//! result.
//!
//! Split into two walks rather than one so the pool only ever sees a
//! batch of genuinely new names — a call whose `(machine, name)` is
//! already cached from a previous fixed-point iteration never reaches
//! the work-list.

use std::collections::BTreeSet;

use buildgraph_core::object::{FunctionCall, ObjectKind, Program};
use buildgraph_core::state::MachineKind;
use buildgraph_core::{Cfg, CompileError, Object, PersistentState};

use super::{function_walker, graph_walker};
use crate::resolver::{self, ResolveJob};

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

/// `(name, machine, required)` for a not-yet-reduced `find_program(...)`
/// call whose own arguments are all reduced, or `None` if `call` isn't
/// one (wrong name, has a holder, or isn't ready yet).
fn find_program_request(call: &FunctionCall) -> Option<(String, MachineKind, bool)> {
    if call.name != "find_program" || call.holder.is_some() {
        return None;
    }
    if !(call.positional.iter().all(Object::is_reduced) && call.keyword.iter().all(|(_, v)| v.is_reduced())) {
        return None;
    }
    let name = call.positional.first().and_then(as_str)?.to_string();
    let native = call.keyword_arg("native").and_then(as_bool).unwrap_or(false);
    let machine = if native { MachineKind::Build } else { MachineKind::Host };
    let required = call.keyword_arg("required").and_then(as_bool).unwrap_or(true);
    Some((name, machine, required))
}

pub fn resolve_programs(cfg: &mut Cfg, state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut pending: Vec<ResolveJob> = Vec::new();
    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            if let ObjectKind::FunctionCall(call) = &obj.kind {
                if let Some((name, machine, _required)) = find_program_request(call) {
                    if state.cached_program(machine, &name).is_none() {
                        pending.push(ResolveJob { machine, name });
                    }
                }
            }
            Ok(false)
        })
    })?;

    if !pending.is_empty() {
        let mut seen = BTreeSet::new();
        pending.retain(|j| seen.insert((j.machine, j.name.clone())));
        let path_env = std::env::var("PATH").unwrap_or_default();
        for resolved in resolver::resolve_all(pending, &path_env, 8) {
            state.cache_program(
                resolved.machine,
                resolved.name.clone(),
                Program {
                    name: resolved.name,
                    for_machine: resolved.machine,
                    path: resolved.path,
                },
            );
        }
    }

    graph_walker(cfg, &mut |cfg, node| {
        function_walker(cfg, node, &mut |obj| {
            let ObjectKind::FunctionCall(call) = &obj.kind else {
                return Ok(false);
            };
            let Some((name, machine, required)) = find_program_request(call) else {
                return Ok(false);
            };
            let Some(program) = state.cached_program(machine, &name) else {
                return Ok(false);
            };
            if required && !program.found() {
                return Err(CompileError::meson(format!(
                    "Could not find required program \"{name}\""
                )));
            }
            let var_name = obj.var.name.clone();
            *obj = Object::new(ObjectKind::Program(program)).assign(var_name);
            Ok(true)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildgraph_core::cfg::ENTRY;
    use buildgraph_core::object::FunctionCall as Call;

    #[test]
    fn unresolved_program_becomes_program_object() {
        let mut cfg = Cfg::new();
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::FunctionCall(Call {
            name: "find_program".to_string(),
            holder: None,
            positional: vec![Object::string("definitely-not-a-real-binary")],
            keyword: vec![("required".to_string(), Object::boolean(false))],
            source_dir: String::new(),
        })));
        let mut state = PersistentState::new();
        resolve_programs(&mut cfg, &mut state).unwrap();
        assert!(matches!(cfg.node(ENTRY).instructions[0].kind, ObjectKind::Program(_)));
    }

    #[test]
    fn required_missing_program_is_an_error() {
        let mut cfg = Cfg::new();
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::FunctionCall(Call {
            name: "find_program".to_string(),
            holder: None,
            positional: vec![Object::string("definitely-not-a-real-binary")],
            keyword: Vec::new(),
            source_dir: String::new(),
        })));
        let mut state = PersistentState::new();
        assert!(resolve_programs(&mut cfg, &mut state).is_err());
    }
}
