//! The inference engine: a post-order visitor that unifies the type slots of
//! a typed tree according to per-construct rules.
//!
//! The engine is idempotent and monotonic. A pass over an already-resolved
//! tree performs no new bindings and emits no new diagnostics, and a binding
//! is never undone. One pass is not guaranteed to fully resolve a tree when
//! host-dependent attributes are involved; the embedding driver re-runs the
//! engine to a fixed point.

use crate::ast::{
    BinOpKind, BoolOpKind, CompareOpKind, Expr, ExprKind, FunctionDef, IndexKind, Keyword, Stmt,
    StmtKind, UnaryOpKind,
};
use crate::builtins;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::span::Span;
use crate::types::{FunctionFlavor, FunctionType, TypeArena, TypeId, TypeNode, TypePrinter};

/// Hook through which the embedding driver resolves attribute accesses on
/// embedded host types. Returns the attribute's type once it is known,
/// `None` if the access was deferred or already diagnosed.
pub trait AttributeObserver {
    fn resolve_attribute(
        &mut self,
        arena: &mut TypeArena,
        sink: &mut DiagnosticSink,
        object_ty: TypeId,
        attr: &str,
        object_span: Span,
        attr_span: Span,
    ) -> Option<TypeId>;
}

struct FunctionCtx {
    return_ty: TypeId,
    has_return: bool,
}

pub struct Inferencer<'a> {
    pub(super) arena: &'a mut TypeArena,
    pub(super) sink: &'a mut DiagnosticSink,
    observer: Option<&'a mut dyn AttributeObserver>,
    function: Option<FunctionCtx>,
    in_loop: bool,
}

impl std::fmt::Debug for Inferencer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inferencer")
            .field("in_loop", &self.in_loop)
            .finish_non_exhaustive()
    }
}

impl<'a> Inferencer<'a> {
    pub fn new(arena: &'a mut TypeArena, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            arena,
            sink,
            observer: None,
            function: None,
            in_loop: false,
        }
    }

    pub fn with_observer(
        arena: &'a mut TypeArena,
        sink: &'a mut DiagnosticSink,
        observer: &'a mut dyn AttributeObserver,
    ) -> Self {
        Self {
            arena,
            sink,
            observer: Some(observer),
            function: None,
            in_loop: false,
        }
    }

    pub fn infer(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    // Unification with diagnostic reporting. Returns false when the
    // unification failed; the failure is already reported and the caller
    // skips whatever depended on it.
    pub(super) fn unify(&mut self, a: TypeId, b: TypeId, span: Span) -> bool {
        let conflict = match self.arena.unify(a, b) {
            Ok(()) => return true,
            Err(conflict) => conflict,
        };
        let mut printer = TypePrinter::new(self.arena);
        let left = printer.name(a);
        let right = printer.name(b);
        let leaf_left = printer.name(conflict.left);
        let leaf_right = printer.name(conflict.right);
        drop(printer);

        let mut diag = Diagnostic::error(
            DiagnosticKind::TypeConflict,
            "cannot unify {left} with {right}",
            span,
        )
        .with_arg("left", left.clone())
        .with_arg("right", right.clone());
        if leaf_left != left || leaf_right != right {
            diag = diag.with_note(
                Diagnostic::note("{left} is incompatible with {right}", span)
                    .with_arg("left", leaf_left)
                    .with_arg("right", leaf_right),
            );
        }
        self.sink.process(diag);
        false
    }

    pub(super) fn type_name(&self, t: TypeId) -> String {
        TypePrinter::new(self.arena).name(t)
    }

    pub fn visit_expr(&mut self, expr: &mut Expr) {
        let ty = expr.ty;
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::LitInt(_) => {
                if !builtins::is_int(self.arena, ty) {
                    let int = builtins::int_type(self.arena);
                    self.unify(ty, int, span);
                }
            }
            ExprKind::LitFloat(_) => {
                if !builtins::is_float(self.arena, ty) {
                    let float = builtins::float_type(self.arena);
                    self.unify(ty, float, span);
                }
            }
            ExprKind::LitStr(_) => {
                if !builtins::is_str(self.arena, ty) {
                    let str_ = builtins::str_type(self.arena);
                    self.unify(ty, str_, span);
                }
            }
            ExprKind::LitBool(_) => {
                if !builtins::is_bool(self.arena, ty) {
                    let bool_ = builtins::bool_type(self.arena);
                    self.unify(ty, bool_, span);
                }
            }
            ExprKind::LitNone => {
                if !builtins::is_none(self.arena, ty) {
                    let none = builtins::none_type(self.arena);
                    self.unify(ty, none, span);
                }
            }
            // Name nodes share their type slot with the environment binding;
            // the rewriter established that, nothing to do here.
            ExprKind::Name(_) => {}
            ExprKind::List(elts) => {
                for elt in elts.iter_mut() {
                    self.visit_expr(elt);
                }
                if !builtins::is_list(self.arena, ty) {
                    let list = builtins::list_type(self.arena);
                    if !self.unify(ty, list, span) {
                        return;
                    }
                }
                if let Some(elt_ty) = builtins::mono_param(self.arena, ty, "elt") {
                    // Blame the first element that disagrees, not the list.
                    for elt in elts {
                        self.unify(elt.ty, elt_ty, elt.span);
                    }
                }
            }
            ExprKind::Tuple(elts) => {
                for elt in elts.iter_mut() {
                    self.visit_expr(elt);
                }
                let elt_tys: Vec<TypeId> = elts.iter().map(|e| e.ty).collect();
                let tuple = self.arena.alloc(TypeNode::Tuple(elt_tys));
                self.unify(ty, tuple, span);
            }
            ExprKind::Attribute {
                value,
                attr,
                attr_span,
            } => {
                self.visit_expr(value);
                let object_ty = value.ty;
                let object_span = value.span;
                if self.arena.is_var(object_ty) {
                    // The attribute table may still be on its way from the
                    // embedding driver.
                    return;
                }
                if let Some(attr_ty) = builtins::attribute_of(self.arena, object_ty, attr) {
                    self.unify(ty, attr_ty, span);
                    return;
                }
                let nominal = matches!(
                    self.arena.get(object_ty),
                    TypeNode::Instance { .. } | TypeNode::Constructor { .. }
                );
                if nominal {
                    if let Some(observer) = self.observer.as_deref_mut() {
                        if let Some(attr_ty) = observer.resolve_attribute(
                            self.arena,
                            self.sink,
                            object_ty,
                            attr,
                            object_span,
                            *attr_span,
                        ) {
                            self.unify(ty, attr_ty, span);
                        }
                        return;
                    }
                }
                let type_name = self.type_name(object_ty);
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::UnknownAttribute,
                        "type {type} does not have an attribute '{attr}'",
                        *attr_span,
                    )
                    .with_arg("type", type_name)
                    .with_arg("attr", attr.clone())
                    .with_highlight(object_span),
                );
            }
            ExprKind::Subscript { value, index } => {
                self.visit_expr(value);
                match index {
                    IndexKind::Index(index) => {
                        self.visit_expr(index);
                        if matches!(index.kind, ExprKind::Tuple(_)) {
                            self.sink.process(Diagnostic::error(
                                DiagnosticKind::MultiDimSliceUnsupported,
                                "multi-dimensional indexing is not supported",
                                index.span,
                            ));
                            return;
                        }
                        let int = builtins::int_type(self.arena);
                        self.unify(index.ty, int, index.span);
                        self.unify_iterable(ty, value.ty, span, value.span);
                    }
                    IndexKind::Slice { lower, upper, step } => {
                        // All bounds share one integer type with the slice.
                        let int = builtins::int_type(self.arena);
                        for bound in [lower, upper, step].into_iter().flatten() {
                            self.visit_expr(bound);
                            self.unify(bound.ty, int, bound.span);
                        }
                        self.unify(ty, value.ty, span);
                    }
                }
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.visit_call(func, args, keywords, ty, span);
            }
            ExprKind::UnaryOp { op, operand } => {
                self.visit_expr(operand);
                let operand_ty = operand.ty;
                let operand_span = operand.span;
                match op {
                    UnaryOpKind::Not => {
                        let bool_ = builtins::bool_type(self.arena);
                        self.unify(ty, bool_, span);
                    }
                    UnaryOpKind::Invert => {
                        if builtins::is_int(self.arena, operand_ty) {
                            self.unify(ty, operand_ty, span);
                        } else if !self.arena.is_var(operand_ty) {
                            let type_name = self.type_name(operand_ty);
                            self.sink.process(
                                Diagnostic::error(
                                    DiagnosticKind::CoerceFailure,
                                    "expected '~' operand to be of integer type, not {type}",
                                    operand_span,
                                )
                                .with_arg("type", type_name),
                            );
                        }
                    }
                    UnaryOpKind::Plus | UnaryOpKind::Minus => {
                        if builtins::is_numeric(self.arena, operand_ty) {
                            self.unify(ty, operand_ty, span);
                        } else if !self.arena.is_var(operand_ty) {
                            let type_name = self.type_name(operand_ty);
                            self.sink.process(
                                Diagnostic::error(
                                    DiagnosticKind::CoerceFailure,
                                    "expected unary operand to be of numeric type, not {type}",
                                    operand_span,
                                )
                                .with_arg("type", type_name),
                            );
                        }
                    }
                }
            }
            ExprKind::BinOp { left, op, right } => {
                self.visit_expr(left);
                self.visit_expr(right);
                let op = *op;
                if let Some((result, left_target, right_target)) =
                    self.coerce_binop(op, left, right, span)
                {
                    self.coerce_in_place(left, left_target);
                    self.coerce_in_place(right, right_target);
                    self.unify(ty, result, span);
                }
            }
            ExprKind::BoolOp { op: _, values } => {
                // `and`/`or` return one of their operands, so all operand
                // types and the expression type are one.
                for value in values.iter_mut() {
                    self.visit_expr(value);
                }
                for value in values.iter() {
                    self.unify(ty, value.ty, value.span);
                }
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                let ops = ops.clone();
                self.visit_compare(left, &ops, comparators, ty, span);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.visit_expr(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
                let bool_ = builtins::bool_type(self.arena);
                self.unify(test.ty, bool_, test.span);
                if self.unify(body.ty, orelse.ty, span) {
                    self.unify(ty, body.ty, span);
                }
            }
            ExprKind::Lambda { args, body } => {
                for default in &mut args.defaults {
                    self.visit_expr(default);
                }
                let default_pairs: Vec<(TypeId, TypeId, Span)> = {
                    let (_, optional) = args.split();
                    optional
                        .map(|(param, default)| (default.ty, param.ty, default.span))
                        .collect()
                };
                for (default_ty, param_ty, default_span) in default_pairs {
                    self.unify(default_ty, param_ty, default_span);
                }
                self.visit_expr(body);
                let signature = {
                    let (required, optional) = args.split();
                    FunctionType {
                        args: required
                            .iter()
                            .map(|param| (param.name.clone(), param.ty))
                            .collect(),
                        optargs: optional
                            .map(|(param, _)| (param.name.clone(), param.ty))
                            .collect(),
                        ret: body.ty,
                        flavor: FunctionFlavor::Plain,
                    }
                };
                let fn_ty = self.arena.alloc(TypeNode::Function(signature));
                self.unify(ty, fn_ty, span);
            }
            ExprKind::ListComp { elt, generators } => {
                if generators.len() != 1 {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::ComprehensionUnsupported,
                        "only one 'for' clause is supported in a list comprehension",
                        span,
                    ));
                    return;
                }
                let generator = &mut generators[0];
                if !generator.ifs.is_empty() {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::ComprehensionUnsupported,
                        "'if' clauses are not supported in list comprehensions",
                        generator.ifs[0].span,
                    ));
                    return;
                }
                self.visit_expr(&mut generator.iter);
                self.visit_expr(&mut generator.target);
                let target_ty = generator.target.ty;
                let target_span = generator.target.span;
                let iter_ty = generator.iter.ty;
                let iter_span = generator.iter.span;
                self.unify_iterable(target_ty, iter_ty, target_span, iter_span);
                self.visit_expr(elt);
                let list = builtins::list_type_of(self.arena, elt.ty);
                self.unify(ty, list, span);
            }
            // The target type was fixed when the node was inserted.
            ExprKind::Coerce { value } => self.visit_expr(value),
            // Typed at synthesis time by the embedding driver.
            ExprKind::Quote { .. } => {}
        }
    }

    /// Unify `element_ty` with the element type of `collection_ty` by
    /// constructing the collection's shape around `element_ty` and unifying
    /// the two containers, so the element and the container parameter
    /// converge to one shared type.
    pub(super) fn unify_iterable(
        &mut self,
        element_ty: TypeId,
        collection_ty: TypeId,
        element_span: Span,
        collection_span: Span,
    ) {
        if builtins::is_iterable(self.arena, collection_ty) {
            let name = match self.arena.get(collection_ty) {
                TypeNode::Mono { name, .. } => name.clone(),
                _ => return,
            };
            let wrapped = self.arena.alloc(TypeNode::Mono {
                name,
                params: vec![("elt".to_string(), element_ty)],
            });
            self.unify(wrapped, collection_ty, element_span);
        } else if !self.arena.is_var(collection_ty) {
            let type_name = self.type_name(collection_ty);
            self.sink.process(
                Diagnostic::error(
                    DiagnosticKind::NotIterable,
                    "type {type} is not iterable",
                    collection_span,
                )
                .with_arg("type", type_name),
            );
        }
    }

    fn visit_call(
        &mut self,
        func: &mut Expr,
        args: &mut [Expr],
        keywords: &mut [Keyword],
        result_ty: TypeId,
        span: Span,
    ) {
        self.visit_expr(func);
        for arg in args.iter_mut() {
            self.visit_expr(arg);
        }
        for keyword in keywords.iter_mut() {
            self.visit_expr(&mut keyword.value);
        }

        let callee = self.arena.get(func.ty).clone();
        match callee {
            TypeNode::Var => {} // defer until the callee resolves
            TypeNode::BuiltinFunction(name) => {
                self.check_builtin_call(&name, args, keywords, result_ty, span);
            }
            TypeNode::ExceptionConstructor { name } => {
                self.check_exception_call(&name, args, keywords, result_ty, span);
            }
            TypeNode::Constructor { instance, .. } => {
                // Argument checking against the host constructor happens on
                // the host side of the boundary.
                self.unify(result_ty, instance, span);
            }
            TypeNode::Function(function) => {
                // A function reached through an instance attribute is a
                // method call; the object binds the first parameter.
                let receiver = match &func.kind {
                    ExprKind::Attribute { value, .. }
                        if matches!(self.arena.get(value.ty), TypeNode::Instance { .. }) =>
                    {
                        Some((value.ty, value.span))
                    }
                    _ => None,
                };
                self.check_function_call(&function, func, receiver, args, keywords, result_ty, span);
            }
            _ => {
                let type_name = self.type_name(func.ty);
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::NotCallable,
                        "cannot call this expression of type {type}",
                        func.span,
                    )
                    .with_arg("type", type_name),
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_function_call(
        &mut self,
        function: &FunctionType,
        func: &Expr,
        receiver: Option<(TypeId, Span)>,
        args: &mut [Expr],
        keywords: &mut [Keyword],
        result_ty: TypeId,
        span: Span,
    ) {
        let offset = receiver.is_some() as usize;
        if args.len() + offset > function.arity() {
            let type_name = self.type_name(func.ty);
            self.sink.process(
                Diagnostic::error(
                    DiagnosticKind::TooManyArguments,
                    "this function of type {type} accepts at most {arity} argument(s)",
                    span,
                )
                .with_arg("type", type_name)
                .with_arg("arity", function.arity().to_string()),
            );
            return;
        }

        let params: Vec<(String, TypeId)> = function
            .args
            .iter()
            .chain(function.optargs.iter())
            .cloned()
            .collect();
        let required = function.args.len();
        let mut bound = vec![false; params.len()];

        if let Some((self_ty, self_span)) = receiver {
            self.unify(self_ty, params[0].1, self_span);
            bound[0] = true;
        }
        for (position, arg) in args.iter().enumerate() {
            self.unify(arg.ty, params[position + offset].1, arg.span);
            bound[position + offset] = true;
        }
        for keyword in keywords.iter() {
            let position = params.iter().position(|(name, _)| *name == keyword.name);
            match position {
                None => {
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::TooManyArguments,
                            "this function does not accept argument '{name}'",
                            keyword.span,
                        )
                        .with_arg("name", keyword.name.clone()),
                    );
                }
                Some(position) if bound[position] => {
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::DuplicateArgument,
                            "argument '{name}' is passed twice",
                            keyword.span,
                        )
                        .with_arg("name", keyword.name.clone()),
                    );
                }
                Some(position) => {
                    self.unify(keyword.value.ty, params[position].1, keyword.value.span);
                    bound[position] = true;
                }
            }
        }
        for position in 0..required {
            if !bound[position] {
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::MissingArgument,
                        "mandatory argument '{name}' is not passed",
                        span,
                    )
                    .with_arg("name", params[position].0.clone()),
                );
            }
        }

        self.unify(result_ty, function.ret, span);
    }

    fn visit_compare(
        &mut self,
        left: &mut Expr,
        ops: &[CompareOpKind],
        comparators: &mut [Expr],
        result_ty: TypeId,
        span: Span,
    ) {
        self.visit_expr(left);
        for comparator in comparators.iter_mut() {
            self.visit_expr(comparator);
        }

        let identity_only = ops
            .iter()
            .all(|op| matches!(op, CompareOpKind::Is | CompareOpKind::IsNot));
        let membership_only = ops
            .iter()
            .all(|op| matches!(op, CompareOpKind::In | CompareOpKind::NotIn));

        if identity_only {
            let mut previous: (TypeId, Span) = (left.ty, left.span);
            for comparator in comparators.iter() {
                self.unify(previous.0, comparator.ty, comparator.span);
                previous = (comparator.ty, comparator.span);
            }
        } else if membership_only {
            let mut previous: (TypeId, Span) = (left.ty, left.span);
            for comparator in comparators.iter() {
                self.unify_iterable(previous.0, comparator.ty, previous.1, comparator.span);
                previous = (comparator.ty, comparator.span);
            }
        } else {
            let operands: Vec<(TypeId, Span)> = std::iter::once(&*left)
                .chain(comparators.iter())
                .map(|operand| (operand.ty, operand.span))
                .collect();
            let any_collection = operands
                .iter()
                .any(|(ty, _)| builtins::is_collection(self.arena, *ty));
            let any_numeric = operands
                .iter()
                .any(|(ty, _)| builtins::is_numeric(self.arena, *ty));
            if any_collection {
                let mut previous: (TypeId, Span) = (left.ty, left.span);
                for comparator in comparators.iter() {
                    self.unify(previous.0, comparator.ty, comparator.span);
                    previous = (comparator.ty, comparator.span);
                }
            } else if any_numeric {
                if let Some(common) = self.coerce_numeric(&operands) {
                    self.coerce_in_place(left, common);
                    for comparator in comparators.iter_mut() {
                        self.coerce_in_place(comparator, common);
                    }
                }
            }
            // Other scalars (strings, booleans, exceptions) compare as-is.
        }

        let bool_ = builtins::bool_type(self.arena);
        self.unify(result_ty, bool_, span);
    }

    /// Common numeric type of a set of operands. `None` either defers (an
    /// operand is still unresolved) or has already reported a coercion error.
    pub(super) fn coerce_numeric(&mut self, operands: &[(TypeId, Span)]) -> Option<TypeId> {
        for (ty, _) in operands {
            if self.arena.is_var(*ty) {
                return None;
            }
        }
        for (ty, span) in operands {
            if !builtins::is_numeric(self.arena, *ty) {
                let type_name = self.type_name(*ty);
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::CoerceFailure,
                        "cannot coerce {type} to a numeric type",
                        *span,
                    )
                    .with_arg("type", type_name),
                );
                return None;
            }
        }
        if operands
            .iter()
            .any(|(ty, _)| builtins::is_float(self.arena, *ty))
        {
            return Some(builtins::float_type(self.arena));
        }
        // All integers. If every width is already known the common width is
        // the maximum; otherwise stay width-polymorphic.
        let widths: Vec<Option<u64>> = operands
            .iter()
            .map(|(ty, _)| builtins::get_int_width(self.arena, *ty))
            .collect();
        if widths.iter().all(Option::is_some) {
            let max = widths.iter().flatten().copied().max().unwrap_or(32);
            Some(builtins::int_type_of_width(self.arena, max))
        } else {
            Some(builtins::int_type(self.arena))
        }
    }

    /// Wrap `expr` in a coercion to `target`, updating an existing coercion
    /// node in place so the tree stays bounded under repeated passes.
    pub(super) fn coerce_in_place(&mut self, expr: &mut Expr, target: TypeId) {
        if self.arena.types_equal(expr.ty, target) {
            return;
        }
        if let ExprKind::Coerce { .. } = expr.kind {
            // Fold the new target into the node's existing type, fresh side
            // first: the established width variable stays the union-find
            // representative, so the structural hash settles across passes.
            self.unify(target, expr.ty, expr.span);
            return;
        }
        let span = expr.span;
        let inner = std::mem::replace(expr, Expr::new(ExprKind::LitNone, target, span));
        expr.kind = ExprKind::Coerce {
            value: Box::new(inner),
        };
    }

    /// Operator typing for `left op right`. Returns the result type and the
    /// coercion targets for both operands, or `None` if typing was deferred
    /// or diagnosed.
    fn coerce_binop(
        &mut self,
        op: BinOpKind,
        left: &mut Expr,
        right: &mut Expr,
        span: Span,
    ) -> Option<(TypeId, TypeId, TypeId)> {
        let left_ty = left.ty;
        let right_ty = right.ty;
        match op {
            BinOpKind::MatMult => {
                self.sink.process(Diagnostic::error(
                    DiagnosticKind::UnsupportedOperator,
                    "operator '@' is not supported",
                    span,
                ));
                None
            }
            BinOpKind::BitAnd
            | BinOpKind::BitOr
            | BinOpKind::BitXor
            | BinOpKind::LShift
            | BinOpKind::RShift => {
                for (ty, operand_span) in [(left_ty, left.span), (right_ty, right.span)] {
                    if !self.arena.is_var(ty) && !builtins::is_int(self.arena, ty) {
                        let type_name = self.type_name(ty);
                        self.sink.process(
                            Diagnostic::error(
                                DiagnosticKind::CoerceFailure,
                                "expected a bitwise operand of integer type, not {type}",
                                operand_span,
                            )
                            .with_arg("type", type_name),
                        );
                        return None;
                    }
                }
                let common =
                    self.coerce_numeric(&[(left_ty, left.span), (right_ty, right.span)])?;
                Some((common, common, common))
            }
            BinOpKind::Add => {
                let left_node = self.arena.get(left_ty).clone();
                let right_node = self.arena.get(right_ty).clone();
                match (&left_node, &right_node) {
                    (TypeNode::Tuple(a), TypeNode::Tuple(b)) => {
                        let mut elts = a.clone();
                        elts.extend(b.iter().copied());
                        let result = self.arena.alloc(TypeNode::Tuple(elts));
                        Some((result, left_ty, right_ty))
                    }
                    _ if builtins::is_list(self.arena, left_ty)
                        && builtins::is_list(self.arena, right_ty) =>
                    {
                        if self.unify(left_ty, right_ty, span) {
                            Some((left_ty, left_ty, right_ty))
                        } else {
                            None
                        }
                    }
                    _ if self.arena.is_var(left_ty) || self.arena.is_var(right_ty) => None,
                    _ if builtins::is_collection(self.arena, left_ty)
                        || builtins::is_collection(self.arena, right_ty) =>
                    {
                        let left_name = self.type_name(left_ty);
                        let right_name = self.type_name(right_ty);
                        self.sink.process(
                            Diagnostic::error(
                                DiagnosticKind::CoerceFailure,
                                "cannot add {left} and {right}",
                                span,
                            )
                            .with_arg("left", left_name)
                            .with_arg("right", right_name)
                            .with_highlight(left.span)
                            .with_highlight(right.span),
                        );
                        None
                    }
                    _ => {
                        let common =
                            self.coerce_numeric(&[(left_ty, left.span), (right_ty, right.span)])?;
                        Some((common, common, common))
                    }
                }
            }
            BinOpKind::Mult => {
                let left_tuple = matches!(self.arena.get(left_ty), TypeNode::Tuple(_));
                let right_tuple = matches!(self.arena.get(right_ty), TypeNode::Tuple(_));
                if left_tuple || right_tuple {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::UnsupportedOperator,
                        "passing tuples to '*' is not supported",
                        span,
                    ));
                    return None;
                }
                if builtins::is_list(self.arena, left_ty) {
                    let int = builtins::int_type(self.arena);
                    if self.unify(right_ty, int, right.span) {
                        Some((left_ty, left_ty, right_ty))
                    } else {
                        None
                    }
                } else if builtins::is_list(self.arena, right_ty) {
                    let int = builtins::int_type(self.arena);
                    if self.unify(left_ty, int, left.span) {
                        Some((right_ty, left_ty, right_ty))
                    } else {
                        None
                    }
                } else {
                    let common =
                        self.coerce_numeric(&[(left_ty, left.span), (right_ty, right.span)])?;
                    Some((common, common, common))
                }
            }
            BinOpKind::Div => {
                // True division always produces a float.
                self.coerce_numeric(&[(left_ty, left.span), (right_ty, right.span)])?;
                let float = builtins::float_type(self.arena);
                Some((float, float, float))
            }
            BinOpKind::Sub | BinOpKind::FloorDiv | BinOpKind::Mod | BinOpKind::Pow => {
                let common =
                    self.coerce_numeric(&[(left_ty, left.span), (right_ty, right.span)])?;
                Some((common, common, common))
            }
        }
    }

    pub fn visit_stmt(&mut self, stmt: &mut Stmt) {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Expr(expr) => self.visit_expr(expr),
            StmtKind::Assign { targets, value } => {
                self.visit_expr(value);
                let value_ty = value.ty;
                for target in targets {
                    self.visit_expr(target);
                    self.unify(target.ty, value_ty, target.span);
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.visit_expr(target);
                self.visit_expr(value);
                let op = *op;
                if let Some((result, left_target, right_target)) =
                    self.coerce_binop(op, target, value, span)
                {
                    self.coerce_in_place(value, right_target);
                    // The assignment target cannot be wrapped in a coercion;
                    // it must already hold the operand and the result type.
                    let target_ty = target.ty;
                    let target_span = target.span;
                    if self.unify(target_ty, left_target, target_span) {
                        self.unify(target_ty, result, target_span);
                    }
                }
            }
            StmtKind::If { test, body, orelse } => {
                self.visit_expr(test);
                let bool_ = builtins::bool_type(self.arena);
                self.unify(test.ty, bool_, test.span);
                self.infer(body);
                self.infer(orelse);
            }
            StmtKind::While { test, body, orelse } => {
                self.visit_expr(test);
                let bool_ = builtins::bool_type(self.arena);
                self.unify(test.ty, bool_, test.span);
                let saved = std::mem::replace(&mut self.in_loop, true);
                self.infer(body);
                self.in_loop = saved;
                self.infer(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.visit_expr(iter);
                self.visit_expr(target);
                let target_ty = target.ty;
                let target_span = target.span;
                let iter_ty = iter.ty;
                let iter_span = iter.span;
                self.unify_iterable(target_ty, iter_ty, target_span, iter_span);
                let saved = std::mem::replace(&mut self.in_loop, true);
                self.infer(body);
                self.in_loop = saved;
                self.infer(orelse);
            }
            StmtKind::Break => {
                if !self.in_loop {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::LoopControlOutsideLoop,
                        "'break' statement outside of a loop",
                        span,
                    ));
                }
            }
            StmtKind::Continue => {
                if !self.in_loop {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::LoopControlOutsideLoop,
                        "'continue' statement outside of a loop",
                        span,
                    ));
                }
            }
            StmtKind::Return(value) => {
                if self.function.is_none() {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::ReturnOutsideFunction,
                        "'return' statement outside of a function",
                        span,
                    ));
                    return;
                }
                if let Some(value) = value {
                    self.visit_expr(value);
                }
                let function = self.function.as_mut().expect("checked above");
                function.has_return = true;
                let return_ty = function.return_ty;
                match value {
                    Some(value) => {
                        let value_ty = value.ty;
                        let value_span = value.span;
                        self.unify(return_ty, value_ty, value_span);
                    }
                    None => {
                        let none = builtins::none_type(self.arena);
                        self.unify(return_ty, none, span);
                    }
                }
            }
            StmtKind::FunctionDef(def) => self.visit_function_def(def),
            StmtKind::Raise { exc } => {
                if let Some(exc) = exc {
                    self.visit_expr(exc);
                    let exc_ty = exc.ty;
                    if !self.arena.is_var(exc_ty) && !builtins::is_exception(self.arena, exc_ty) {
                        let type_name = self.type_name(exc_ty);
                        self.sink.process(
                            Diagnostic::error(
                                DiagnosticKind::NotAnException,
                                "cannot raise a value of type {type}, which is not an exception",
                                exc.span,
                            )
                            .with_arg("type", type_name),
                        );
                    }
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.infer(body);
                for handler in handlers.iter_mut() {
                    if let Some(filter) = &mut handler.filter {
                        self.visit_expr(filter);
                        let filter_ty = filter.ty;
                        match self.arena.get(filter_ty).clone() {
                            TypeNode::ExceptionConstructor { name } => {
                                let exception = builtins::exception_type(self.arena, &name);
                                let name_ty = handler.name_ty;
                                self.unify(name_ty, exception, handler.span);
                            }
                            TypeNode::Var => {} // defer
                            _ => {
                                let type_name = self.type_name(filter_ty);
                                self.sink.process(
                                    Diagnostic::error(
                                        DiagnosticKind::NotAnExceptionConstructor,
                                        "this expression of type {type} does not refer to an exception constructor",
                                        filter.span,
                                    )
                                    .with_arg("type", type_name),
                                );
                            }
                        }
                    }
                    self.infer(&mut handler.body);
                }
                self.infer(orelse);
                self.infer(finalbody);
            }
            StmtKind::With { items, body } => {
                for item in items.iter_mut() {
                    self.visit_expr(&mut item.context);
                    if let Some(var) = &mut item.var {
                        self.visit_expr(var);
                    }
                    let type_name = self.type_name(item.context.ty);
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::NotAContextManager,
                            "type {type} is not a context manager",
                            item.context.span,
                        )
                        .with_arg("type", type_name),
                    );
                }
                self.infer(body);
            }
            StmtKind::Assert { test, msg } => {
                self.visit_expr(test);
                let bool_ = builtins::bool_type(self.arena);
                self.unify(test.ty, bool_, test.span);
                if let Some(msg) = msg {
                    self.visit_expr(msg);
                    if !matches!(msg.kind, ExprKind::LitStr(_)) {
                        self.sink.process(Diagnostic::error(
                            DiagnosticKind::NonLiteralAssertMessage,
                            "assertion message must be a string literal",
                            msg.span,
                        ));
                    }
                }
            }
            StmtKind::Pass => {}
        }
    }

    fn visit_function_def(&mut self, def: &mut FunctionDef) {
        for decorator in &def.decorators {
            let recognized = builtins::is_builtin_function(self.arena, decorator.ty, "kernel")
                || matches!(&decorator.kind, ExprKind::Name(name) if name == "kernel");
            if !recognized {
                self.sink.process(Diagnostic::error(
                    DiagnosticKind::UnsupportedDecorator,
                    "this decorator is not supported",
                    decorator.span,
                ));
            }
        }

        // Defaults are evaluated in the enclosing scope.
        for default in &mut def.args.defaults {
            self.visit_expr(default);
        }
        let default_pairs: Vec<(TypeId, TypeId, Span)> = {
            let (_, optional) = def.args.split();
            optional
                .map(|(param, default)| (default.ty, param.ty, default.span))
                .collect()
        };
        for (default_ty, param_ty, default_span) in default_pairs {
            self.unify(default_ty, param_ty, default_span);
        }

        let saved_function = self.function.replace(FunctionCtx {
            return_ty: def.return_ty,
            has_return: false,
        });
        let saved_loop = std::mem::replace(&mut self.in_loop, false);
        self.infer(&mut def.body);
        let finished = std::mem::replace(&mut self.function, saved_function)
            .expect("function context installed above");
        self.in_loop = saved_loop;

        if !finished.has_return {
            let none = builtins::none_type(self.arena);
            self.unify(def.return_ty, none, def.name_span);
        }

        let signature = {
            let (required, optional) = def.args.split();
            FunctionType {
                args: required
                    .iter()
                    .map(|param| (param.name.clone(), param.ty))
                    .collect(),
                optargs: optional
                    .map(|(param, _)| (param.name.clone(), param.ty))
                    .collect(),
                ret: def.return_ty,
                flavor: FunctionFlavor::Plain,
            }
        };
        let signature_ty = self.arena.alloc(TypeNode::Function(signature));
        self.unify(def.ty, signature_ty, def.name_span);
    }
}
