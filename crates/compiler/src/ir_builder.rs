//! AST → MIR lowering (spec §4.B): builds the initial CFG from a parsed
//! `Program`, including the `subdir()` AST pre-pass that inlines included
//! trees before any MIR lowering happens.

use std::fs;
use std::path::Path;

use buildgraph_core::cfg::ENTRY;
use buildgraph_core::object::{FunctionCall, ObjectKind};
use buildgraph_core::{Cfg, CompileError, NodeId, Object, SourceLocation};

use crate::ast::{AssignOp, BinaryOp, CodeBlock, Expr, Program, Spanned, Statement, UnaryOp};

/// Inlines every `subdir('x')` statement with the parsed contents of
/// `x/meson.build`, recursing into `if`/`elif`/`else` bodies the way the
/// original's `subdir_visitor` does. Rejects a target with no
/// `meson.build` rather than silently skipping it.
pub fn resolve_subdirs(body: CodeBlock, source_root: &Path, current_dir: &Path) -> Result<CodeBlock, CompileError> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        match stmt.node {
            Statement::Subdir(ref rel) => {
                let sub_dir = current_dir.join(rel);
                let meson_build = source_root.join(&sub_dir).join("meson.build");
                if !meson_build.is_file() {
                    return Err(CompileError::meson(format!(
                        "subdir '{}' has no meson.build",
                        sub_dir.display()
                    )));
                }
                let text = fs::read_to_string(&meson_build)?;
                let file_label = sub_dir.join("meson.build").to_string_lossy().into_owned();
                let parsed = crate::ast::Parser::new(file_label, &text)?.parse_program()?;
                let resolved = resolve_subdirs(parsed.body, source_root, &sub_dir)?;
                out.extend(resolved);
            }
            Statement::If { arms, else_body } => {
                let mut new_arms = Vec::with_capacity(arms.len());
                for (cond, arm_body) in arms {
                    new_arms.push((cond, resolve_subdirs(arm_body, source_root, current_dir)?));
                }
                let new_else = else_body
                    .map(|b| resolve_subdirs(b, source_root, current_dir))
                    .transpose()?;
                out.push(Spanned::new(
                    Statement::If {
                        arms: new_arms,
                        else_body: new_else,
                    },
                    stmt.location,
                ));
            }
            other => out.push(Spanned::new(other, stmt.location)),
        }
    }
    Ok(out)
}

/// Builds the initial CFG for one (already subdir-resolved) program.
pub fn build(program: &Program) -> Result<Cfg, CompileError> {
    let mut cfg = Cfg::new();
    let source_dir = Path::new(&program.file)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    lower_body(&mut cfg, ENTRY, &program.body, &source_dir)?;
    Ok(cfg)
}

fn lower_body(cfg: &mut Cfg, mut current: NodeId, body: &CodeBlock, source_dir: &str) -> Result<NodeId, CompileError> {
    for stmt in body {
        current = lower_statement(cfg, current, stmt, source_dir)?;
    }
    Ok(current)
}

fn lower_statement(
    cfg: &mut Cfg,
    current: NodeId,
    stmt: &Spanned<Statement>,
    source_dir: &str,
) -> Result<NodeId, CompileError> {
    match &stmt.node {
        Statement::Expr(expr) => {
            let obj = lower_expr(expr, source_dir)?;
            cfg.node_mut(current).instructions.push(obj);
            Ok(current)
        }
        Statement::Assign { lhs, op: AssignOp::Eq, rhs } => {
            let obj = lower_expr(rhs, source_dir)?.assign(lhs.clone());
            cfg.node_mut(current).instructions.push(obj);
            Ok(current)
        }
        Statement::CompoundAssign { op, .. } => Err(CompileError::not_implemented(format!(
            "compound assignment '{op}'"
        ))),
        Statement::If { arms, else_body } => lower_if(cfg, current, arms, else_body, source_dir, &stmt.location),
        Statement::Subdir(_) => Err(CompileError::meson(
            "internal error: subdir() reached ir_builder unresolved",
        )),
        Statement::Foreach => Err(CompileError::not_implemented("foreach")),
        Statement::Break => Err(CompileError::not_implemented("break")),
        Statement::Continue => Err(CompileError::not_implemented("continue")),
    }
}

fn lower_if(
    cfg: &mut Cfg,
    current: NodeId,
    arms: &[(Spanned<Expr>, CodeBlock)],
    else_body: &Option<CodeBlock>,
    source_dir: &str,
    location: &SourceLocation,
) -> Result<NodeId, CompileError> {
    let join = cfg.add_block();
    let mut branch_arms = Vec::with_capacity(arms.len() + 1);

    for (cond, body) in arms {
        let predicate = lower_expr(cond, source_dir)?;
        let arm_node = cfg.add_block();
        let tail = lower_body(cfg, arm_node, body, source_dir)?;
        cfg.node_mut(tail).instructions.push(Object::new(ObjectKind::Jump {
            target: join,
            predicate: None,
        }));
        cfg.link(tail, join);
        branch_arms.push((predicate, arm_node));
    }

    match else_body {
        Some(body) => {
            let arm_node = cfg.add_block();
            let tail = lower_body(cfg, arm_node, body, source_dir)?;
            cfg.node_mut(tail).instructions.push(Object::new(ObjectKind::Jump {
                target: join,
                predicate: None,
            }));
            cfg.link(tail, join);
            branch_arms.push((Object::boolean(true), arm_node));
        }
        None => {
            branch_arms.push((Object::boolean(true), join));
        }
    }

    for (_, target) in &branch_arms {
        cfg.link(current, *target);
    }
    let _ = location;
    cfg.node_mut(current)
        .instructions
        .push(Object::new(ObjectKind::Branch { arms: branch_arms }));
    Ok(join)
}

fn lower_expr(expr: &Spanned<Expr>, source_dir: &str) -> Result<Object, CompileError> {
    match &expr.node {
        Expr::Bool(b) => Ok(Object::boolean(*b)),
        Expr::Number(n) => Ok(Object::number(*n)),
        Expr::Str(s) => Ok(Object::string(s.clone())),
        Expr::Identifier(name) => Ok(Object::identifier(name.clone(), 0)),
        Expr::Array(items) => {
            let lowered = items
                .iter()
                .map(|e| lower_expr(e, source_dir))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Object::new(ObjectKind::Array(lowered)))
        }
        Expr::Dict(entries) => {
            let mut lowered = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key_obj = lower_expr(key, source_dir)?;
                let ObjectKind::Str(key_name) = key_obj.kind else {
                    return Err(CompileError::invalid_arguments_at(
                        "dict",
                        "keys must be strings",
                        key.location.clone(),
                    ));
                };
                lowered.push((key_name, lower_expr(value, source_dir)?));
            }
            Ok(Object::new(ObjectKind::Dict(lowered)))
        }
        Expr::Unary(UnaryOp::Neg, operand) => call(
            "unary_neg",
            vec![lower_expr(operand, source_dir)?],
            Vec::new(),
            source_dir,
        ),
        Expr::Unary(UnaryOp::Not, operand) => call(
            "unary_not",
            vec![lower_expr(operand, source_dir)?],
            Vec::new(),
            source_dir,
        ),
        Expr::Binary(BinaryOp::Eq, lhs, rhs) => call(
            "rel_eq",
            vec![lower_expr(lhs, source_dir)?, lower_expr(rhs, source_dir)?],
            Vec::new(),
            source_dir,
        ),
        Expr::Binary(BinaryOp::Ne, lhs, rhs) => call(
            "rel_ne",
            vec![lower_expr(lhs, source_dir)?, lower_expr(rhs, source_dir)?],
            Vec::new(),
            source_dir,
        ),
        Expr::Binary(BinaryOp::Other(op), ..) => {
            Err(CompileError::not_implemented(format!("binary operator '{op}'")))
        }
        Expr::Ternary(..) => Err(CompileError::not_implemented("ternary expression")),
        Expr::Subscript(..) => Err(CompileError::not_implemented("subscript expression")),
        Expr::Call {
            name,
            positional,
            keyword,
        } => {
            let positional = positional
                .iter()
                .map(|e| lower_expr(e, source_dir))
                .collect::<Result<Vec<_>, _>>()?;
            let mut lowered_kw = Vec::with_capacity(keyword.len());
            for (key, value) in keyword {
                lowered_kw.push((key.clone(), lower_expr(value, source_dir)?));
            }
            call(name, positional, lowered_kw, source_dir)
        }
        Expr::MethodCall { receiver, method } => {
            let receiver_obj = lower_expr(receiver, source_dir)?;
            let method_obj = lower_expr(method, source_dir)?;
            match method_obj.kind {
                ObjectKind::FunctionCall(mut call) => {
                    call.holder = Some(Box::new(receiver_obj));
                    Ok(Object::new(ObjectKind::FunctionCall(call)))
                }
                _ => Err(CompileError::invalid_arguments_at(
                    "method call",
                    "receiver of '.' must be followed by a call",
                    method.location.clone(),
                )),
            }
        }
    }
}

fn call(
    name: &str,
    positional: Vec<Object>,
    keyword: Vec<(String, Object)>,
    source_dir: &str,
) -> Result<Object, CompileError> {
    Ok(Object::new(ObjectKind::FunctionCall(FunctionCall {
        name: name.to_string(),
        holder: None,
        positional,
        keyword,
        source_dir: source_dir.to_string(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Parser;

    fn build_src(src: &str) -> Cfg {
        let program = Parser::new("meson.build", src).unwrap().parse_program().unwrap();
        build(&program).unwrap()
    }

    #[test]
    fn simple_call_lowers_to_single_instruction() {
        let cfg = build_src("project('foo')");
        assert_eq!(cfg.node(ENTRY).instructions.len(), 1);
        match &cfg.node(ENTRY).instructions[0].kind {
            ObjectKind::FunctionCall(call) => assert_eq!(call.name, "project"),
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn if_else_produces_branch_and_join() {
        let cfg = build_src("if true\n  x = 9\nelse\n  x = 10\nendif\nmessage(x)\n");
        assert!(matches!(
            cfg.node(ENTRY).instructions.last().unwrap().kind,
            ObjectKind::Branch { .. }
        ));
        assert_eq!(cfg.len(), 4); // entry, if-arm, else-arm, join
    }

    #[test]
    fn missing_else_targets_join_directly() {
        let cfg = build_src("if true\n  x = 9\nendif\nmessage(x)\n");
        match &cfg.node(ENTRY).instructions.last().unwrap().kind {
            ObjectKind::Branch { arms } => assert_eq!(arms.len(), 2),
            other => panic!("expected Branch, got {other:?}"),
        }
    }

    #[test]
    fn method_call_sets_holder() {
        let cfg = build_src("host_machine.system()");
        match &cfg.node(ENTRY).instructions[0].kind {
            ObjectKind::FunctionCall(call) => {
                assert_eq!(call.name, "system");
                assert!(call.holder.is_some());
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn chained_method_calls_nest_holders() {
        let cfg = build_src("a.b().c()");
        match &cfg.node(ENTRY).instructions[0].kind {
            ObjectKind::FunctionCall(outer) => {
                assert_eq!(outer.name, "c");
                let holder = outer.holder.as_ref().unwrap();
                match &holder.kind {
                    ObjectKind::FunctionCall(inner) => assert_eq!(inner.name, "b"),
                    other => panic!("unexpected holder {other:?}"),
                }
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn foreach_is_not_implemented() {
        let program = Parser::new("meson.build", "foreach x : [1, 2]\nendforeach\n")
            .unwrap()
            .parse_program()
            .unwrap();
        assert!(build(&program).is_err());
    }

    #[test]
    fn dict_with_non_string_key_is_invalid_arguments() {
        let program = Parser::new("meson.build", "x = {1: 2}").unwrap().parse_program().unwrap();
        let err = build(&program).unwrap_err();
        assert!(matches!(err, CompileError::InvalidArguments { .. }));
    }
}
