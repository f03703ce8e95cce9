//! Integer width defaulting.
//!
//! After inference stabilizes, integer literals whose width was never
//! constrained keep a width variable. [`IntDefaulter`] binds those variables
//! to a concrete default so downstream consumers see fully monomorphic
//! integer types. The embedding driver also runs it over quoted fragments
//! when discovering host attribute types, since a host integer carries no
//! width of its own.

use crate::ast::{Expr, ExprKind, IndexKind, Stmt, StmtKind};
use crate::builtins;
use crate::diagnostics::DiagnosticSink;
use crate::types::TypeArena;

/// Contract shared by post-inference tree passes.
pub trait TreePass {
    fn run(&mut self, arena: &mut TypeArena, sink: &mut DiagnosticSink, stmts: &mut [Stmt]);
}

#[derive(Debug, Default)]
pub struct IntDefaulter;

impl TreePass for IntDefaulter {
    fn run(&mut self, arena: &mut TypeArena, _sink: &mut DiagnosticSink, stmts: &mut [Stmt]) {
        for stmt in stmts {
            walk_stmt(stmt, &mut |expr| {
                let value = match expr.kind {
                    ExprKind::LitInt(value) => value,
                    _ => return,
                };
                if !builtins::is_int(arena, expr.ty) {
                    return;
                }
                if let Some(width_param) = builtins::mono_param(arena, expr.ty, "width") {
                    if arena.is_var(width_param) {
                        let bits = if i32::try_from(value).is_ok() { 32 } else { 64 };
                        let width = arena.width(bits);
                        let _ = arena.unify(width_param, width);
                    }
                }
            });
        }
    }
}

/// Pre-order walk over every expression under `stmt`.
pub(crate) fn walk_stmt(stmt: &mut Stmt, f: &mut impl FnMut(&mut Expr)) {
    match &mut stmt.kind {
        StmtKind::Expr(expr) => walk_expr(expr, f),
        StmtKind::Assign { targets, value } => {
            for target in targets {
                walk_expr(target, f);
            }
            walk_expr(value, f);
        }
        StmtKind::AugAssign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            walk_expr(test, f);
            for stmt in body.iter_mut().chain(orelse.iter_mut()) {
                walk_stmt(stmt, f);
            }
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            walk_expr(target, f);
            walk_expr(iter, f);
            for stmt in body.iter_mut().chain(orelse.iter_mut()) {
                walk_stmt(stmt, f);
            }
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
        StmtKind::Return(value) => {
            if let Some(value) = value {
                walk_expr(value, f);
            }
        }
        StmtKind::FunctionDef(def) => {
            for decorator in &mut def.decorators {
                walk_expr(decorator, f);
            }
            for default in &mut def.args.defaults {
                walk_expr(default, f);
            }
            for stmt in &mut def.body {
                walk_stmt(stmt, f);
            }
        }
        StmtKind::Raise { exc } => {
            if let Some(exc) = exc {
                walk_expr(exc, f);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            for stmt in body.iter_mut() {
                walk_stmt(stmt, f);
            }
            for handler in handlers {
                if let Some(filter) = &mut handler.filter {
                    walk_expr(filter, f);
                }
                for stmt in &mut handler.body {
                    walk_stmt(stmt, f);
                }
            }
            for stmt in orelse.iter_mut().chain(finalbody.iter_mut()) {
                walk_stmt(stmt, f);
            }
        }
        StmtKind::With { items, body } => {
            for item in items {
                walk_expr(&mut item.context, f);
                if let Some(var) = &mut item.var {
                    walk_expr(var, f);
                }
            }
            for stmt in body {
                walk_stmt(stmt, f);
            }
        }
        StmtKind::Assert { test, msg } => {
            walk_expr(test, f);
            if let Some(msg) = msg {
                walk_expr(msg, f);
            }
        }
    }
}

pub(crate) fn walk_expr(expr: &mut Expr, f: &mut impl FnMut(&mut Expr)) {
    f(expr);
    match &mut expr.kind {
        ExprKind::LitInt(_)
        | ExprKind::LitFloat(_)
        | ExprKind::LitStr(_)
        | ExprKind::LitBool(_)
        | ExprKind::LitNone
        | ExprKind::Name(_)
        | ExprKind::Quote { .. } => {}
        ExprKind::List(elts) | ExprKind::Tuple(elts) => {
            for elt in elts {
                walk_expr(elt, f);
            }
        }
        ExprKind::Attribute { value, .. } => walk_expr(value, f),
        ExprKind::Subscript { value, index } => {
            walk_expr(value, f);
            match index {
                IndexKind::Index(index) => walk_expr(index, f),
                IndexKind::Slice { lower, upper, step } => {
                    for bound in [lower, upper, step].into_iter().flatten() {
                        walk_expr(bound, f);
                    }
                }
            }
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            walk_expr(func, f);
            for arg in args {
                walk_expr(arg, f);
            }
            for keyword in keywords {
                walk_expr(&mut keyword.value, f);
            }
        }
        ExprKind::UnaryOp { operand, .. } => walk_expr(operand, f),
        ExprKind::BinOp { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        ExprKind::BoolOp { values, .. } => {
            for value in values {
                walk_expr(value, f);
            }
        }
        ExprKind::Compare {
            left, comparators, ..
        } => {
            walk_expr(left, f);
            for comparator in comparators {
                walk_expr(comparator, f);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            walk_expr(test, f);
            walk_expr(body, f);
            walk_expr(orelse, f);
        }
        ExprKind::Lambda { args, body } => {
            for default in &mut args.defaults {
                walk_expr(default, f);
            }
            walk_expr(body, f);
        }
        ExprKind::ListComp { elt, generators } => {
            for generator in generators {
                walk_expr(&mut generator.target, f);
                walk_expr(&mut generator.iter, f);
                for filter in &mut generator.ifs {
                    walk_expr(filter, f);
                }
            }
            walk_expr(elt, f);
        }
        ExprKind::Coerce { value } => walk_expr(value, f),
    }
}
