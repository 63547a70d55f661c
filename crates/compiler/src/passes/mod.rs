//! Walkers, the fixed-point driver, and the pass list (spec §4.C).
//!
//! `walk_object` is the one recursive traversal every named walker flavor
//! delegates to: it descends into a `FunctionCall`'s holder/positional/
//! keyword slots, `Array`/`Dict` elements, and `Branch` predicates
//! post-order, then applies the callback to the object itself. A single
//! replacement callback reaching instruction slots, array elements, and
//! nested function arguments is exactly what `function_walker` names in
//! the design; the separate `instruction_walker`/`array_walker`/
//! `function_argument_walker` names are kept as thin wrappers so callers
//! can spell out which shape of traversal they mean, matching the
//! vocabulary passes are written against.

pub mod lowering;
pub mod optimize;
pub mod resolve;

use buildgraph_core::object::ObjectKind;
use buildgraph_core::{Cfg, CompileError, NodeId, Object, PersistentState};

/// Recursively applies `f` to `obj` and everything it contains, children
/// first. `f` may mutate or wholesale replace `*obj`.
pub fn walk_object(
    obj: &mut Object,
    f: &mut dyn FnMut(&mut Object) -> Result<bool, CompileError>,
) -> Result<bool, CompileError> {
    let mut progress = false;
    match &mut obj.kind {
        ObjectKind::Array(items) => {
            for item in items {
                progress |= walk_object(item, f)?;
            }
        }
        ObjectKind::Dict(entries) => {
            for (_, value) in entries {
                progress |= walk_object(value, f)?;
            }
        }
        ObjectKind::FunctionCall(call) => {
            if let Some(holder) = &mut call.holder {
                progress |= walk_object(holder, f)?;
            }
            for arg in &mut call.positional {
                progress |= walk_object(arg, f)?;
            }
            for (_, arg) in &mut call.keyword {
                progress |= walk_object(arg, f)?;
            }
        }
        ObjectKind::Branch { arms } => {
            for (predicate, _) in arms {
                progress |= walk_object(predicate, f)?;
            }
        }
        ObjectKind::Jump {
            predicate: Some(predicate),
            ..
        } => {
            progress |= walk_object(predicate, f)?;
        }
        _ => {}
    }
    progress |= f(obj)?;
    Ok(progress)
}

/// Applies `f` to every instruction in one block, top to bottom.
pub fn instruction_walker(
    cfg: &mut Cfg,
    node: NodeId,
    f: &mut dyn FnMut(&mut Object) -> Result<bool, CompileError>,
) -> Result<bool, CompileError> {
    let mut progress = false;
    for instr in &mut cfg.node_mut(node).instructions {
        progress |= f(instr)?;
    }
    Ok(progress)
}

/// Descends into `Array` elements only.
pub fn array_walker(
    obj: &mut Object,
    f: &mut dyn FnMut(&mut Object) -> Result<bool, CompileError>,
) -> Result<bool, CompileError> {
    let mut progress = false;
    if let ObjectKind::Array(items) = &mut obj.kind {
        for item in items {
            progress |= f(item)?;
        }
    }
    Ok(progress)
}

/// Descends into a `FunctionCall`'s holder, positional, and keyword
/// arguments (including nested arrays, via `walk_object`).
pub fn function_argument_walker(
    obj: &mut Object,
    f: &mut dyn FnMut(&mut Object) -> Result<bool, CompileError>,
) -> Result<bool, CompileError> {
    let mut progress = false;
    if let ObjectKind::FunctionCall(call) = &mut obj.kind {
        if let Some(holder) = &mut call.holder {
            progress |= walk_object(holder, f)?;
        }
        for arg in &mut call.positional {
            progress |= walk_object(arg, f)?;
        }
        for (_, arg) in &mut call.keyword {
            progress |= walk_object(arg, f)?;
        }
    }
    Ok(progress)
}

/// Composes instruction + array + function-argument walking so a single
/// replacement callback reaches every reducible position in one block.
pub fn function_walker(
    cfg: &mut Cfg,
    node: NodeId,
    f: &mut dyn FnMut(&mut Object) -> Result<bool, CompileError>,
) -> Result<bool, CompileError> {
    let mut progress = false;
    for instr in &mut cfg.node_mut(node).instructions {
        progress |= walk_object(instr, f)?;
    }
    Ok(progress)
}

/// Visits every reachable node predecessor-first (`Cfg::reverse_postorder`
/// already provides this ordering) and applies `f` at each.
pub fn graph_walker(
    cfg: &mut Cfg,
    f: &mut dyn FnMut(&mut Cfg, NodeId) -> Result<bool, CompileError>,
) -> Result<bool, CompileError> {
    let mut progress = false;
    for node in cfg.reverse_postorder() {
        if cfg.contains(node) {
            progress |= f(cfg, node)?;
        }
    }
    Ok(progress)
}

pub type Pass = Box<dyn FnMut(&mut Cfg, &mut PersistentState) -> Result<bool, CompileError>>;

/// Runs `passes` in declared order inside a `while progress` loop. Bails
/// out after `max_iterations` with a `Meson` error naming the likely
/// culprit rather than spinning forever on a pass that can't reach a
/// fixed point — every individual transformation here is supposed to
/// strictly shrink a well-founded measure, so this is a bug backstop, not
/// a normal exit path.
pub fn run_fixed_point(
    cfg: &mut Cfg,
    state: &mut PersistentState,
    passes: &mut [Pass],
    max_iterations: usize,
) -> Result<usize, CompileError> {
    let mut iterations = 0;
    loop {
        let mut progress = false;
        for pass in passes.iter_mut() {
            progress |= pass(cfg, state)?;
        }
        iterations += 1;
        if !progress {
            return Ok(iterations);
        }
        if iterations >= max_iterations {
            return Err(CompileError::meson(format!(
                "pass manager did not reach a fixed point after {max_iterations} iterations"
            )));
        }
    }
}
