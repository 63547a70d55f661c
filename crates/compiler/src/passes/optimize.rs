//! Optimization passes (spec §4.E): value numbering, phi placement and
//! fix-up, constant folding/propagation, branch pruning, block joining,
//! and dead-code removal.
//!
//! GVN and phi insertion/fix-up are implemented as one combined
//! predecessor-first traversal rather than three separate passes: each
//! node needs the "live gvn per variable name" set computed from its
//! predecessors to decide whether a join needs a phi at all, and that
//! same set is exactly what numbering a node's own definitions and
//! rewriting its `Identifier` reads both need. Splitting the three would
//! mean recomputing the same reaching-definition map three times per
//! iteration for no benefit.

use std::collections::BTreeMap;

use buildgraph_core::object::ObjectKind;
use buildgraph_core::{Cfg, CompileError, NodeId, Object, PersistentState, Variable};

use super::walk_object;

pub fn gvn_and_phi_fixup(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut progress = false;
    let mut max_gvn: BTreeMap<String, u32> = BTreeMap::new();
    for node in cfg.node_ids() {
        for instr in &cfg.node(node).instructions {
            if instr.var.is_assigned() {
                let entry = max_gvn.entry(instr.var.name.clone()).or_insert(0);
                *entry = (*entry).max(instr.var.gvn);
            }
        }
    }

    let mut end_maps: BTreeMap<NodeId, BTreeMap<String, u32>> = BTreeMap::new();
    let order = cfg.reverse_postorder();

    for node in order {
        if !cfg.contains(node) {
            continue;
        }
        let preds: Vec<NodeId> = cfg.node(node).predecessors().iter().copied().collect();
        let mut incoming: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for p in &preds {
            if let Some(map) = end_maps.get(p) {
                for (name, gvn) in map {
                    incoming.entry(name.clone()).or_default().push(*gvn);
                }
            }
        }

        let mut live: BTreeMap<String, u32> = BTreeMap::new();
        for (name, versions) in &incoming {
            let mut distinct = versions.clone();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() == 1 {
                live.insert(name.clone(), distinct[0]);
                continue;
            }
            let existing = cfg
                .node(node)
                .instructions
                .iter()
                .find(|i| matches!(&i.kind, ObjectKind::Phi { .. }) && i.var.name == *name)
                .map(|i| i.var.gvn);
            let gvn = match existing {
                Some(g) => g,
                None => {
                    let counter = max_gvn.entry(name.clone()).or_insert(0);
                    *counter += 1;
                    let fresh = *counter;
                    let phi = Object {
                        var: Variable {
                            name: name.clone(),
                            gvn: fresh,
                        },
                        kind: ObjectKind::Phi {
                            versions: distinct.clone(),
                        },
                    };
                    cfg.node_mut(node).instructions.insert(0, phi);
                    progress = true;
                    fresh
                }
            };
            live.insert(name.clone(), gvn);
        }

        let instr_count = cfg.node(node).instructions.len();
        for i in 0..instr_count {
            if matches!(&cfg.node(node).instructions[i].kind, ObjectKind::Phi { .. }) {
                let instr = &cfg.node(node).instructions[i];
                live.insert(instr.var.name.clone(), instr.var.gvn);
                continue;
            }

            let live_snapshot = live.clone();
            let instr = &mut cfg.node_mut(node).instructions[i];
            progress |= walk_object(instr, &mut |obj| {
                if let ObjectKind::Identifier { name, version } = &mut obj.kind {
                    if let Some(&gvn) = live_snapshot.get(name) {
                        if *version != gvn {
                            *version = gvn;
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            })?;

            let instr = &mut cfg.node_mut(node).instructions[i];
            if instr.var.is_assigned() {
                if instr.var.gvn == 0 {
                    let counter = max_gvn.entry(instr.var.name.clone()).or_insert(0);
                    *counter += 1;
                    instr.var.gvn = *counter;
                    progress = true;
                }
                live.insert(instr.var.name.clone(), instr.var.gvn);
            }
        }

        end_maps.insert(node, live);
    }

    Ok(progress)
}

/// Collapses a `Phi` whose incoming set has converged to a single version
/// into a plain `Identifier` alias, so the next `constant_propagation` (or
/// folding, next iteration) pass can chase it like any other reference.
pub fn constant_folding(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut progress = false;
    for node in cfg.node_ids().collect::<Vec<_>>() {
        for instr in cfg.node_mut(node).instructions.iter_mut() {
            if let ObjectKind::Phi { versions } = &instr.kind {
                if versions.len() == 1 {
                    let version = versions[0];
                    let name = instr.var.name.clone();
                    instr.kind = ObjectKind::Identifier { name, version };
                    progress = true;
                }
            }
        }
    }
    Ok(progress)
}

/// Collects `Variable -> Object` for every reduced, non-phi definition,
/// then rewrites every `Identifier` occurrence matching one of those
/// `(name, gvn)` pairs to the looked-up value (spec §4.E: phi results are
/// never propagated, since they are join points by definition).
pub fn constant_propagation(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut defs: BTreeMap<(String, u32), ObjectKind> = BTreeMap::new();
    for node in cfg.node_ids() {
        for instr in &cfg.node(node).instructions {
            if instr.var.is_assigned()
                && instr.var.gvn != 0
                && instr.is_reduced()
                && !matches!(instr.kind, ObjectKind::Phi { .. })
            {
                defs.insert((instr.var.name.clone(), instr.var.gvn), instr.kind.clone());
            }
        }
    }
    if defs.is_empty() {
        return Ok(false);
    }

    let mut progress = false;
    for node in cfg.node_ids().collect::<Vec<_>>() {
        let instr_count = cfg.node(node).instructions.len();
        for i in 0..instr_count {
            let instr = &mut cfg.node_mut(node).instructions[i];
            progress |= walk_object(instr, &mut |obj| {
                if let ObjectKind::Identifier { name, version } = &obj.kind {
                    if let Some(kind) = defs.get(&(name.clone(), *version)) {
                        obj.kind = kind.clone();
                        return Ok(true);
                    }
                }
                Ok(false)
            })?;
        }
    }
    Ok(progress)
}

/// Resolves a `Branch` once one arm's predicate has folded to a literal:
/// the first literal-`true` arm wins outright (the remaining arms, if
/// any, are unreachable); literal-`false` arms are dropped and the rest
/// kept in order. Discarded edges are unlinked so property 1 (successor
/// set matches the terminator) keeps holding.
pub fn branch_pruning(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut progress = false;
    for node in cfg.node_ids().collect::<Vec<_>>() {
        let arms = match &cfg.node(node).instructions.last() {
            Some(Object {
                kind: ObjectKind::Branch { arms },
                ..
            }) => arms.clone(),
            _ => continue,
        };

        let resolved = arms.iter().position(|(pred, _)| matches!(pred.kind, ObjectKind::Boolean(true)));
        let kept: Vec<(Object, NodeId)> = match resolved {
            Some(i) => vec![arms[i].clone()],
            None => arms
                .iter()
                .filter(|(pred, _)| !matches!(pred.kind, ObjectKind::Boolean(false)))
                .cloned()
                .collect(),
        };
        if kept.len() == arms.len() {
            continue;
        }

        let kept_targets: std::collections::BTreeSet<NodeId> = kept.iter().map(|(_, t)| *t).collect();
        for (_, target) in &arms {
            if !kept_targets.contains(target) {
                cfg.unlink(node, *target);
            }
        }

        let var = cfg.node(node).instructions.last().unwrap().var.clone();
        let new_instr = if kept.len() == 1 {
            Object {
                var,
                kind: ObjectKind::Jump {
                    target: kept[0].1,
                    predicate: None,
                },
            }
        } else {
            Object {
                var,
                kind: ObjectKind::Branch { arms: kept },
            }
        };
        let last = cfg.node(node).instructions.len() - 1;
        cfg.node_mut(node).instructions[last] = new_instr;
        progress = true;
    }
    Ok(progress)
}

/// Splices a sole-successor/sole-predecessor pair into one block, for as
/// long as the shape keeps applying.
pub fn block_joining(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut progress = false;
    loop {
        let mut joined_any = false;
        for node in cfg.node_ids().collect::<Vec<_>>() {
            if !cfg.contains(node) {
                continue;
            }
            let successors: Vec<NodeId> = cfg.node(node).successors().iter().copied().collect();
            let [succ] = successors.as_slice() else { continue };
            let succ = *succ;
            if succ == node {
                continue;
            }
            let unconditional = matches!(
                cfg.node(node).instructions.last(),
                Some(Object {
                    kind: ObjectKind::Jump { predicate: None, .. },
                    ..
                })
            );
            if !unconditional || cfg.node(succ).predecessors().len() != 1 {
                continue;
            }

            cfg.node_mut(node).instructions.pop();
            let succ_instructions: Vec<Object> = cfg.node_mut(succ).instructions.drain(..).collect();
            cfg.node_mut(node).instructions.extend(succ_instructions);

            let succ_successors: Vec<NodeId> = cfg.node(succ).successors().iter().copied().collect();
            cfg.unlink(node, succ);
            for s in succ_successors {
                cfg.unlink(succ, s);
                cfg.link(node, s);
            }
            cfg.remove_block(succ);
            joined_any = true;
            progress = true;
        }
        if !joined_any {
            break;
        }
    }
    Ok(progress)
}

/// Truncates a block at its first `Message(ERROR)` and drops every
/// now-invalid successor edge.
pub fn dead_code_removal(cfg: &mut Cfg, _state: &mut PersistentState) -> Result<bool, CompileError> {
    let mut progress = false;
    for node in cfg.node_ids().collect::<Vec<_>>() {
        let error_idx = cfg.node(node).instructions.iter().position(Object::is_error_message);
        let Some(idx) = error_idx else { continue };
        if idx == cfg.node(node).instructions.len() - 1 {
            continue;
        }
        cfg.node_mut(node).instructions.truncate(idx + 1);
        let successors: Vec<NodeId> = cfg.node(node).successors().iter().copied().collect();
        for s in successors {
            cfg.unlink(node, s);
        }
        progress = true;
    }
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildgraph_core::cfg::ENTRY;

    #[test]
    fn gvn_numbers_every_assignment_once() {
        let mut cfg = Cfg::new();
        cfg.node_mut(ENTRY).instructions.push(Object::number(9).assign("x"));
        let mut state = PersistentState::new();
        gvn_and_phi_fixup(&mut cfg, &mut state).unwrap();
        assert_eq!(cfg.node(ENTRY).instructions[0].var.gvn, 1);
    }

    #[test]
    fn phi_inserted_at_join_with_differing_incoming_gvns() {
        let mut cfg = Cfg::new();
        let arm_a = cfg.add_block();
        let arm_b = cfg.add_block();
        let join = cfg.add_block();
        cfg.link(ENTRY, arm_a);
        cfg.link(ENTRY, arm_b);
        cfg.link(arm_a, join);
        cfg.link(arm_b, join);
        cfg.node_mut(arm_a).instructions.push(Object::number(9).assign("x"));
        cfg.node_mut(arm_b).instructions.push(Object::number(10).assign("x"));

        let mut state = PersistentState::new();
        gvn_and_phi_fixup(&mut cfg, &mut state).unwrap();
        assert!(matches!(cfg.node(join).instructions.first().map(|i| &i.kind), Some(ObjectKind::Phi { .. })));
    }

    #[test]
    fn branch_pruning_resolves_literal_true_arm() {
        let mut cfg = Cfg::new();
        let arm_a = cfg.add_block();
        let arm_b = cfg.add_block();
        cfg.link(ENTRY, arm_a);
        cfg.link(ENTRY, arm_b);
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::Branch {
            arms: vec![(Object::boolean(true), arm_a), (Object::boolean(true), arm_b)],
        }));
        let mut state = PersistentState::new();
        branch_pruning(&mut cfg, &mut state).unwrap();
        assert!(matches!(
            cfg.node(ENTRY).instructions.last().unwrap().kind,
            ObjectKind::Jump { target, .. } if target == arm_a
        ));
        assert!(!cfg.node(ENTRY).successors().contains(&arm_b));
    }

    #[test]
    fn dead_code_removal_truncates_after_error() {
        let mut cfg = Cfg::new();
        let succ = cfg.add_block();
        cfg.link(ENTRY, succ);
        cfg.node_mut(ENTRY)
            .instructions
            .push(Object::message(buildgraph_core::object::MessageLevel::Error, "boom"));
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::Jump {
            target: succ,
            predicate: None,
        }));
        let mut state = PersistentState::new();
        dead_code_removal(&mut cfg, &mut state).unwrap();
        assert_eq!(cfg.node(ENTRY).instructions.len(), 1);
        assert!(!cfg.node(ENTRY).successors().contains(&succ));
    }

    #[test]
    fn block_joining_splices_sole_successor() {
        let mut cfg = Cfg::new();
        let succ = cfg.add_block();
        cfg.link(ENTRY, succ);
        cfg.node_mut(ENTRY).instructions.push(Object::new(ObjectKind::Jump {
            target: succ,
            predicate: None,
        }));
        cfg.node_mut(succ).instructions.push(Object::number(1).assign("x"));
        let mut state = PersistentState::new();
        block_joining(&mut cfg, &mut state).unwrap();
        assert!(!cfg.contains(succ));
        assert_eq!(cfg.node(ENTRY).instructions.len(), 1);
    }
}
