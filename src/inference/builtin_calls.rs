//! Call typing for the recognized builtin callables.
//!
//! Each builtin has a fixed table of valid invocation forms; a call matching
//! none of them is diagnosed with the forms attached as notes.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::ast::{Expr, ExprKind, Keyword};
use crate::builtins;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::span::Span;
use crate::types::TypeId;

use super::engine::Inferencer;

static VALID_FORMS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("bool", vec!["bool() -> bool", "bool(x:'a) -> bool"]),
        (
            "int",
            vec![
                "int() -> int(width='a)",
                "int(x:'a) -> int(width='b) where 'a is numeric",
                "int(x:'a, width='b <int literal>) -> int(width='b) where 'a is numeric",
            ],
        ),
        (
            "float",
            vec!["float() -> float", "float(x:'a) -> float where 'a is numeric"],
        ),
        (
            "list",
            vec![
                "list() -> list(elt='a)",
                "list(x:'a) -> list(elt='b) where 'a is iterable",
            ],
        ),
        (
            "range",
            vec![
                "range(max:'a) -> range(elt='a) where 'a is int",
                "range(min:'a, max:'a) -> range(elt='a) where 'a is int",
                "range(min:'a, max:'a, step:'a) -> range(elt='a) where 'a is int",
            ],
        ),
        ("len", vec!["len(x:'a) -> int(width=32) where 'a is iterable"]),
        ("round", vec!["round(x:float) -> int(width='a)"]),
        ("print", vec!["print(args...) -> NoneType"]),
    ])
});

impl Inferencer<'_> {
    pub(super) fn check_builtin_call(
        &mut self,
        name: &str,
        args: &mut [Expr],
        keywords: &mut [Keyword],
        result_ty: TypeId,
        span: Span,
    ) {
        match name {
            "bool" => {
                if args.len() > 1 || !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                let bool_ = builtins::bool_type(self.arena);
                self.unify(result_ty, bool_, span);
            }
            "int" => self.check_int_call(args, keywords, result_ty, span),
            "float" => {
                if args.len() > 1 || !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                if let Some(arg) = args.first() {
                    if !self.arena.is_var(arg.ty) && !builtins::is_numeric(self.arena, arg.ty) {
                        return self.invalid_form(name, arg.span);
                    }
                }
                let float = builtins::float_type(self.arena);
                self.unify(result_ty, float, span);
            }
            "list" => {
                if args.len() > 1 || !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                if !builtins::is_list(self.arena, result_ty) {
                    let list = builtins::list_type(self.arena);
                    if !self.unify(result_ty, list, span) {
                        return;
                    }
                }
                if let Some(arg) = args.first() {
                    if builtins::is_iterable(self.arena, arg.ty) {
                        let result_elt = builtins::mono_param(self.arena, result_ty, "elt");
                        let arg_elt = builtins::get_iterable_elt(self.arena, arg.ty);
                        if let (Some(result_elt), Some(arg_elt)) = (result_elt, arg_elt) {
                            self.unify(result_elt, arg_elt, arg.span);
                        }
                    } else if !self.arena.is_var(arg.ty) {
                        let type_name = self.type_name(arg.ty);
                        self.sink.process(
                            Diagnostic::error(
                                DiagnosticKind::NotIterable,
                                "the argument of list() must be of an iterable type, not {type}",
                                arg.span,
                            )
                            .with_arg("type", type_name),
                        );
                    }
                }
            }
            "range" => {
                if args.is_empty() || args.len() > 3 || !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                if !builtins::is_range(self.arena, result_ty) {
                    let range = builtins::range_type(self.arena);
                    if !self.unify(result_ty, range, span) {
                        return;
                    }
                }
                let elt = match builtins::mono_param(self.arena, result_ty, "elt") {
                    Some(elt) => elt,
                    None => return,
                };
                for arg in args.iter() {
                    if !self.arena.is_var(arg.ty) && !builtins::is_int(self.arena, arg.ty) {
                        let type_name = self.type_name(arg.ty);
                        self.sink.process(
                            Diagnostic::error(
                                DiagnosticKind::CoerceFailure,
                                "an argument of range() must be of an integer type, not {type}",
                                arg.span,
                            )
                            .with_arg("type", type_name),
                        );
                        continue;
                    }
                    self.unify(arg.ty, elt, arg.span);
                }
            }
            "len" => {
                if args.len() != 1 || !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                let arg = &args[0];
                if !self.arena.is_var(arg.ty) && !builtins::is_iterable(self.arena, arg.ty) {
                    let type_name = self.type_name(arg.ty);
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::NotIterable,
                            "the argument of len() must be of a list or range type, not {type}",
                            arg.span,
                        )
                        .with_arg("type", type_name),
                    );
                }
                let int32 = builtins::int_type_of_width(self.arena, 32);
                self.unify(result_ty, int32, span);
            }
            "round" => {
                if args.len() != 1 || !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                let arg_ty = args[0].ty;
                let arg_span = args[0].span;
                let float = builtins::float_type(self.arena);
                self.unify(arg_ty, float, arg_span);
                if !builtins::is_int(self.arena, result_ty) {
                    let int = builtins::int_type(self.arena);
                    self.unify(result_ty, int, span);
                }
            }
            "print" => {
                if !keywords.is_empty() {
                    return self.invalid_form(name, span);
                }
                let none = builtins::none_type(self.arena);
                self.unify(result_ty, none, span);
            }
            _ => {
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::InvalidBuiltinCall,
                        "builtin {name} cannot be called here",
                        span,
                    )
                    .with_arg("name", name.to_string()),
                );
            }
        }
    }

    fn check_int_call(
        &mut self,
        args: &mut [Expr],
        keywords: &mut [Keyword],
        result_ty: TypeId,
        span: Span,
    ) {
        let width_keyword = keywords.iter().find(|kw| kw.name == "width");
        let extraneous = keywords.iter().any(|kw| kw.name != "width");
        if extraneous || args.len() > 1 || (width_keyword.is_some() && args.is_empty()) {
            return self.invalid_form("int", span);
        }

        if let Some(arg) = args.first() {
            if !self.arena.is_var(arg.ty) && !builtins::is_numeric(self.arena, arg.ty) {
                return self.invalid_form("int", arg.span);
            }
        }

        match width_keyword {
            None => {
                if !builtins::is_int(self.arena, result_ty) {
                    let int = builtins::int_type(self.arena);
                    self.unify(result_ty, int, span);
                }
            }
            Some(keyword) => match keyword.value.kind {
                ExprKind::LitInt(width) if width > 0 => {
                    let int = builtins::int_type_of_width(self.arena, width as u64);
                    self.unify(result_ty, int, span);
                }
                _ => {
                    self.sink.process(Diagnostic::error(
                        DiagnosticKind::NonLiteralIntWidth,
                        "the width argument of int() must be an integer literal",
                        keyword.value.span,
                    ));
                }
            },
        }
    }

    pub(super) fn check_exception_call(
        &mut self,
        name: &str,
        args: &mut [Expr],
        keywords: &mut [Keyword],
        result_ty: TypeId,
        span: Span,
    ) {
        if let Some(keyword) = keywords.first() {
            self.sink.process(Diagnostic::error(
                DiagnosticKind::TooManyArguments,
                "exception constructors do not accept keyword arguments",
                keyword.span,
            ));
            return;
        }
        if args.len() > 4 {
            self.sink.process(
                Diagnostic::error(
                    DiagnosticKind::TooManyArguments,
                    "{name} accepts at most one message and three parameters",
                    span,
                )
                .with_arg("name", name.to_string()),
            );
            return;
        }
        // First argument is the message; the rest are numeric parameters
        // carried across the boundary as 64-bit integers.
        for (position, arg) in args.iter().enumerate() {
            if position == 0 {
                let str_ = builtins::str_type(self.arena);
                self.unify(arg.ty, str_, arg.span);
            } else {
                let int64 = builtins::int_type_of_width(self.arena, 64);
                self.unify(arg.ty, int64, arg.span);
            }
        }
        let exception = builtins::exception_type(self.arena, name);
        self.unify(result_ty, exception, span);
    }

    fn invalid_form(&mut self, name: &str, span: Span) {
        let notes: Vec<Diagnostic> = VALID_FORMS
            .get(name)
            .map(|forms| {
                forms
                    .iter()
                    .map(|form| Diagnostic::note(form.to_string(), span))
                    .collect()
            })
            .unwrap_or_default();
        self.sink.process(
            Diagnostic::error(
                DiagnosticKind::InvalidBuiltinCall,
                "{name} cannot be invoked with these arguments",
                span,
            )
            .with_arg("name", name.to_string())
            .with_notes(notes),
        );
    }
}
