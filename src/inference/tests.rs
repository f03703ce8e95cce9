use crate::ast::{Arguments, BinOpKind, CompareOpKind, Expr, ExprKind, FunctionDef, Stmt, StmtKind};
use crate::builtins;
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::span::Span;
use crate::types::{FunctionFlavor, FunctionType, TypeArena, TypeId, TypeNode};

use super::{Inferencer, IntDefaulter, TreePass};

fn expr(arena: &mut TypeArena, kind: ExprKind) -> Expr {
    let ty = arena.fresh_var();
    Expr::new(kind, ty, Span::point())
}

fn lit_int(arena: &mut TypeArena, value: i64) -> Expr {
    expr(arena, ExprKind::LitInt(value))
}

fn lit_float(arena: &mut TypeArena, value: f64) -> Expr {
    expr(arena, ExprKind::LitFloat(value))
}

fn infer_stmts(arena: &mut TypeArena, sink: &mut DiagnosticSink, stmts: &mut [Stmt]) {
    Inferencer::new(arena, sink).infer(stmts);
}

fn infer_expr(arena: &mut TypeArena, sink: &mut DiagnosticSink, e: Expr) -> Expr {
    let mut stmts = vec![Stmt::new(StmtKind::Expr(e), Span::point())];
    infer_stmts(arena, sink, &mut stmts);
    match stmts.pop().map(|s| s.kind) {
        Some(StmtKind::Expr(e)) => e,
        _ => unreachable!(),
    }
}

fn kinds(sink: &DiagnosticSink) -> Vec<DiagnosticKind> {
    sink.diagnostics().iter().map(|d| d.kind).collect()
}

#[test]
fn test_list_literal_infers_element_type() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let elts = vec![
        lit_int(&mut arena, 1),
        lit_int(&mut arena, 2),
        lit_int(&mut arena, 3),
    ];
    let list = expr(&mut arena, ExprKind::List(elts));
    let list = infer_expr(&mut arena, &mut sink, list);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_list(&arena, list.ty));
    let elt = builtins::mono_param(&arena, list.ty, "elt").unwrap();
    assert!(builtins::is_int(&arena, elt));
}

#[test]
fn test_heterogeneous_list_conflicts() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let elts = vec![lit_int(&mut arena, 1), lit_float(&mut arena, 2.0)];
    let list = expr(&mut arena, ExprKind::List(elts));
    infer_expr(&mut arena, &mut sink, list);

    assert_eq!(kinds(&sink), vec![DiagnosticKind::TypeConflict]);
}

#[test]
fn test_binop_widens_to_max_known_width() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let int32 = builtins::int_type_of_width(&mut arena, 32);
    let int64 = builtins::int_type_of_width(&mut arena, 64);
    let left = Expr::new(ExprKind::Name("a".to_string()), int32, Span::point());
    let right = Expr::new(ExprKind::Name("b".to_string()), int64, Span::point());
    let sum = expr(
        &mut arena,
        ExprKind::BinOp {
            left: Box::new(left),
            op: BinOpKind::Add,
            right: Box::new(right),
        },
    );
    let sum = infer_expr(&mut arena, &mut sink, sum);

    assert!(sink.diagnostics().is_empty());
    assert_eq!(builtins::get_int_width(&arena, sum.ty), Some(64));
    // The narrower operand got a coercion node; the wider one did not.
    match sum.kind {
        ExprKind::BinOp { left, right, .. } => {
            assert!(matches!(left.kind, ExprKind::Coerce { .. }));
            assert_eq!(builtins::get_int_width(&arena, left.ty), Some(64));
            assert!(matches!(right.kind, ExprKind::Name(_)));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_binop_float_dominates() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let left = lit_int(&mut arena, 1);
    let right = lit_float(&mut arena, 2.0);
    let sum = expr(
        &mut arena,
        ExprKind::BinOp {
            left: Box::new(left),
            op: BinOpKind::Mult,
            right: Box::new(right),
        },
    );
    let sum = infer_expr(&mut arena, &mut sink, sum);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_float(&arena, sum.ty));
    match sum.kind {
        ExprKind::BinOp { left, .. } => {
            assert!(matches!(left.kind, ExprKind::Coerce { .. }));
            assert!(builtins::is_float(&arena, left.ty));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_binop_unknown_widths_stay_polymorphic() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let left = lit_int(&mut arena, 1);
    let right = lit_int(&mut arena, 2);
    let sum = expr(
        &mut arena,
        ExprKind::BinOp {
            left: Box::new(left),
            op: BinOpKind::Sub,
            right: Box::new(right),
        },
    );
    let sum = infer_expr(&mut arena, &mut sink, sum);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_int(&arena, sum.ty));
    let width = builtins::mono_param(&arena, sum.ty, "width").unwrap();
    assert!(arena.is_var(width));
}

#[test]
fn test_division_always_yields_float() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let left = lit_int(&mut arena, 1);
    let right = lit_int(&mut arena, 2);
    let quotient = expr(
        &mut arena,
        ExprKind::BinOp {
            left: Box::new(left),
            op: BinOpKind::Div,
            right: Box::new(right),
        },
    );
    let quotient = infer_expr(&mut arena, &mut sink, quotient);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_float(&arena, quotient.ty));
}

#[test]
fn test_for_over_range_shares_element_type() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let range_fn = builtins::fn_range(&mut arena);
    let func = Expr::new(ExprKind::Name("range".to_string()), range_fn, Span::point());
    let stop = lit_int(&mut arena, 10);
    let call = expr(
        &mut arena,
        ExprKind::Call {
            func: Box::new(func),
            args: vec![stop],
            keywords: Vec::new(),
        },
    );
    let target = expr(&mut arena, ExprKind::Name("x".to_string()));
    let target_ty = target.ty;
    let iter_ty = call.ty;
    let mut stmts = vec![Stmt::new(
        StmtKind::For {
            target,
            iter: call,
            body: vec![Stmt::new(StmtKind::Pass, Span::point())],
            orelse: Vec::new(),
        },
        Span::point(),
    )];
    infer_stmts(&mut arena, &mut sink, &mut stmts);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_int(&arena, target_ty));

    // The loop variable and the range parameter are one shared type:
    // resolving the element width afterwards resolves the variable too.
    let elt = builtins::mono_param(&arena, iter_ty, "elt").unwrap();
    let int32 = builtins::int_type_of_width(&mut arena, 32);
    arena.unify(elt, int32).unwrap();
    assert_eq!(builtins::get_int_width(&arena, target_ty), Some(32));
}

fn compare(arena: &mut TypeArena, left: Expr, op: CompareOpKind, right: Expr) -> Expr {
    expr(
        arena,
        ExprKind::Compare {
            left: Box::new(left),
            ops: vec![op],
            comparators: vec![right],
        },
    )
}

#[test]
fn test_equality_of_non_numeric_scalars_is_quiet() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let a = expr(&mut arena, ExprKind::LitStr("a".to_string()));
    let b = expr(&mut arena, ExprKind::LitStr("b".to_string()));
    let cmp = compare(&mut arena, a, CompareOpKind::Eq, b);
    let cmp = infer_expr(&mut arena, &mut sink, cmp);
    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_bool(&arena, cmp.ty));

    let t = expr(&mut arena, ExprKind::LitBool(true));
    let f = expr(&mut arena, ExprKind::LitBool(false));
    let cmp = compare(&mut arena, t, CompareOpKind::NotEq, f);
    let cmp = infer_expr(&mut arena, &mut sink, cmp);
    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_bool(&arena, cmp.ty));
    // No coercion node was inserted on either side.
    match cmp.kind {
        ExprKind::Compare {
            left, comparators, ..
        } => {
            assert!(matches!(left.kind, ExprKind::LitBool(true)));
            assert!(matches!(comparators[0].kind, ExprKind::LitBool(false)));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_ordering_comparison_coerces_to_float() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let left = lit_int(&mut arena, 1);
    let right = lit_float(&mut arena, 2.5);
    let cmp = compare(&mut arena, left, CompareOpKind::Lt, right);
    let cmp = infer_expr(&mut arena, &mut sink, cmp);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_bool(&arena, cmp.ty));
    match cmp.kind {
        ExprKind::Compare { left, .. } => {
            assert!(matches!(left.kind, ExprKind::Coerce { .. }));
            assert!(builtins::is_float(&arena, left.ty));
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_identity_comparison_unifies_operands() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let a = expr(&mut arena, ExprKind::Name("a".to_string()));
    let a_ty = a.ty;
    let int32 = builtins::int_type_of_width(&mut arena, 32);
    let b = Expr::new(ExprKind::Name("b".to_string()), int32, Span::point());
    let cmp = compare(&mut arena, a, CompareOpKind::Is, b);
    let cmp = infer_expr(&mut arena, &mut sink, cmp);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_bool(&arena, cmp.ty));
    assert_eq!(builtins::get_int_width(&arena, a_ty), Some(32));
}

#[test]
fn test_membership_shares_element_type() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let item = lit_int(&mut arena, 1);
    let item_ty = item.ty;
    let elts = vec![lit_int(&mut arena, 5)];
    let list = expr(&mut arena, ExprKind::List(elts));
    let list_ty = list.ty;
    let cmp = compare(&mut arena, item, CompareOpKind::In, list);
    let cmp = infer_expr(&mut arena, &mut sink, cmp);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_bool(&arena, cmp.ty));
    // The element slot and the container parameter are one shared type.
    let elt = builtins::mono_param(&arena, list_ty, "elt").unwrap();
    let int32 = builtins::int_type_of_width(&mut arena, 32);
    arena.unify(elt, int32).unwrap();
    assert_eq!(builtins::get_int_width(&arena, item_ty), Some(32));
}

fn call_with_args(arena: &mut TypeArena, callee_ty: TypeId, count: usize) -> Expr {
    let func = Expr::new(ExprKind::Name("f".to_string()), callee_ty, Span::point());
    let args = (0..count).map(|i| lit_int(arena, i as i64)).collect();
    expr(
        arena,
        ExprKind::Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
        },
    )
}

#[test]
fn test_call_arity_bounds() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let int = builtins::int_type(&mut arena);
    let opt = builtins::int_type(&mut arena);
    let none = builtins::none_type(&mut arena);
    let callee = arena.alloc(TypeNode::Function(FunctionType {
        args: vec![("a".to_string(), int)],
        optargs: vec![("b".to_string(), opt)],
        ret: none,
        flavor: FunctionFlavor::Plain,
    }));

    for count in [1, 2] {
        let call = call_with_args(&mut arena, callee, count);
        let call = infer_expr(&mut arena, &mut sink, call);
        assert!(sink.diagnostics().is_empty(), "arity {} should be fine", count);
        assert!(builtins::is_none(&arena, call.ty));
    }

    let call = call_with_args(&mut arena, callee, 3);
    infer_expr(&mut arena, &mut sink, call);
    assert_eq!(kinds(&sink), vec![DiagnosticKind::TooManyArguments]);
    sink.take();

    let call = call_with_args(&mut arena, callee, 0);
    infer_expr(&mut arena, &mut sink, call);
    assert_eq!(kinds(&sink), vec![DiagnosticKind::MissingArgument]);
}

#[test]
fn test_loop_context_resets_at_function_boundary() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let return_ty = arena.fresh_var();
    let fn_ty = arena.fresh_var();
    let inner = Stmt::new(
        StmtKind::FunctionDef(FunctionDef {
            name: "inner".to_string(),
            args: Arguments::default(),
            body: vec![Stmt::new(StmtKind::Break, Span::point())],
            decorators: Vec::new(),
            return_ty,
            ty: fn_ty,
            name_span: Span::point(),
        }),
        Span::point(),
    );
    let iter = {
        let range_fn = builtins::fn_range(&mut arena);
        let func = Expr::new(ExprKind::Name("range".to_string()), range_fn, Span::point());
        let stop = lit_int(&mut arena, 10);
        expr(
            &mut arena,
            ExprKind::Call {
                func: Box::new(func),
                args: vec![stop],
                keywords: Vec::new(),
            },
        )
    };
    let target = expr(&mut arena, ExprKind::Name("x".to_string()));
    let mut stmts = vec![Stmt::new(
        StmtKind::For {
            target,
            iter,
            body: vec![inner],
            orelse: Vec::new(),
        },
        Span::point(),
    )];
    infer_stmts(&mut arena, &mut sink, &mut stmts);

    assert_eq!(kinds(&sink), vec![DiagnosticKind::LoopControlOutsideLoop]);
    // A body that never returns gives the function a none return type.
    assert!(builtins::is_none(&arena, return_ty));
}

#[test]
fn test_break_outside_loop() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let mut stmts = vec![Stmt::new(StmtKind::Break, Span::point())];
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert_eq!(kinds(&sink), vec![DiagnosticKind::LoopControlOutsideLoop]);
}

#[test]
fn test_int_call_with_literal_width() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let int_fn = builtins::fn_int(&mut arena);
    let func = Expr::new(ExprKind::Name("int".to_string()), int_fn, Span::point());
    let operand = lit_float(&mut arena, 1.5);
    let width = lit_int(&mut arena, 64);
    let call = expr(
        &mut arena,
        ExprKind::Call {
            func: Box::new(func),
            args: vec![operand],
            keywords: vec![crate::ast::Keyword {
                name: "width".to_string(),
                value: width,
                span: Span::point(),
            }],
        },
    );
    let call = infer_expr(&mut arena, &mut sink, call);

    assert!(sink.diagnostics().is_empty());
    assert_eq!(builtins::get_int_width(&arena, call.ty), Some(64));
}

#[test]
fn test_int_call_rejects_non_literal_width() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let int_fn = builtins::fn_int(&mut arena);
    let func = Expr::new(ExprKind::Name("int".to_string()), int_fn, Span::point());
    let operand = lit_float(&mut arena, 1.5);
    let width = expr(&mut arena, ExprKind::Name("w".to_string()));
    let call = expr(
        &mut arena,
        ExprKind::Call {
            func: Box::new(func),
            args: vec![operand],
            keywords: vec![crate::ast::Keyword {
                name: "width".to_string(),
                value: width,
                span: Span::point(),
            }],
        },
    );
    infer_expr(&mut arena, &mut sink, call);

    assert_eq!(kinds(&sink), vec![DiagnosticKind::NonLiteralIntWidth]);
}

#[test]
fn test_len_returns_int32() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let len_fn = builtins::fn_len(&mut arena);
    let func = Expr::new(ExprKind::Name("len".to_string()), len_fn, Span::point());
    let elts = vec![lit_int(&mut arena, 1)];
    let list = expr(&mut arena, ExprKind::List(elts));
    let call = expr(
        &mut arena,
        ExprKind::Call {
            func: Box::new(func),
            args: vec![list],
            keywords: Vec::new(),
        },
    );
    let call = infer_expr(&mut arena, &mut sink, call);

    assert!(sink.diagnostics().is_empty());
    assert_eq!(builtins::get_int_width(&arena, call.ty), Some(32));
}

#[test]
fn test_invalid_builtin_call_lists_valid_forms() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let range_fn = builtins::fn_range(&mut arena);
    let func = Expr::new(ExprKind::Name("range".to_string()), range_fn, Span::point());
    let call = expr(
        &mut arena,
        ExprKind::Call {
            func: Box::new(func),
            args: Vec::new(),
            keywords: Vec::new(),
        },
    );
    infer_expr(&mut arena, &mut sink, call);

    let diags = sink.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagnosticKind::InvalidBuiltinCall);
    assert_eq!(diags[0].notes.len(), 3);
}

#[test]
fn test_with_statement_rejected() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let context = lit_int(&mut arena, 1);
    let mut stmts = vec![Stmt::new(
        StmtKind::With {
            items: vec![crate::ast::WithItem {
                context,
                var: None,
                span: Span::point(),
            }],
            body: vec![Stmt::new(StmtKind::Pass, Span::point())],
        },
        Span::point(),
    )];
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert_eq!(kinds(&sink), vec![DiagnosticKind::NotAContextManager]);
}

#[test]
fn test_assert_message_must_be_literal() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let test = expr(&mut arena, ExprKind::LitBool(true));
    let msg = lit_int(&mut arena, 3);
    let mut stmts = vec![Stmt::new(
        StmtKind::Assert {
            test,
            msg: Some(msg),
        },
        Span::point(),
    )];
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert_eq!(kinds(&sink), vec![DiagnosticKind::NonLiteralAssertMessage]);
}

#[test]
fn test_exception_constructor_call() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let ctor = builtins::fn_exception(&mut arena, "ValueError");
    let func = Expr::new(ExprKind::Name("ValueError".to_string()), ctor, Span::point());
    let message = expr(&mut arena, ExprKind::LitStr("out of range".to_string()));
    let param = lit_int(&mut arena, 7);
    let param_ty = param.ty;
    let call = expr(
        &mut arena,
        ExprKind::Call {
            func: Box::new(func),
            args: vec![message, param],
            keywords: Vec::new(),
        },
    );
    let call = infer_expr(&mut arena, &mut sink, call);

    assert!(sink.diagnostics().is_empty());
    assert!(builtins::is_exception(&arena, call.ty));
    assert_eq!(builtins::get_int_width(&arena, param_ty), Some(64));
}

#[test]
fn test_second_pass_is_quiet() {
    // Idempotence: re-running inference over a resolved tree neither emits
    // diagnostics nor changes any type.
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let left = lit_int(&mut arena, 1);
    let right = lit_float(&mut arena, 2.0);
    let sum = expr(
        &mut arena,
        ExprKind::BinOp {
            left: Box::new(left),
            op: BinOpKind::Add,
            right: Box::new(right),
        },
    );
    let mut stmts = vec![Stmt::new(StmtKind::Expr(sum), Span::point())];
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert!(sink.diagnostics().is_empty());

    let snapshot = format!("{:?}", stmts);
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert!(sink.diagnostics().is_empty());
    assert_eq!(format!("{:?}", stmts), snapshot);
}

#[test]
fn test_repeated_passes_keep_open_widths_stable() {
    // Arithmetic whose widths stay open must still settle: re-running
    // inference may not rebind the coercion targets to fresh variables.
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let left = lit_int(&mut arena, 1);
    let right = lit_int(&mut arena, 2);
    let sum = expr(
        &mut arena,
        ExprKind::BinOp {
            left: Box::new(left),
            op: BinOpKind::Add,
            right: Box::new(right),
        },
    );
    let mut stmts = vec![Stmt::new(StmtKind::Expr(sum), Span::point())];
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert!(sink.diagnostics().is_empty());

    let snapshot = format!("{:?}", stmts);
    for _ in 0..3 {
        infer_stmts(&mut arena, &mut sink, &mut stmts);
    }
    assert!(sink.diagnostics().is_empty());
    assert_eq!(format!("{:?}", stmts), snapshot);
}

#[test]
fn test_int_defaulter_binds_free_widths() {
    let mut arena = TypeArena::new();
    let mut sink = DiagnosticSink::new();
    let small = lit_int(&mut arena, 1);
    let big = lit_int(&mut arena, 1 << 40);
    let small_ty = small.ty;
    let big_ty = big.ty;
    let mut stmts = vec![
        Stmt::new(StmtKind::Expr(small), Span::point()),
        Stmt::new(StmtKind::Expr(big), Span::point()),
    ];
    infer_stmts(&mut arena, &mut sink, &mut stmts);
    assert_eq!(builtins::get_int_width(&arena, small_ty), None);

    IntDefaulter.run(&mut arena, &mut sink, &mut stmts);
    assert_eq!(builtins::get_int_width(&arena, small_ty), Some(32));
    assert_eq!(builtins::get_int_width(&arena, big_ty), Some(64));
}
