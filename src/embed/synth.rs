//! Quoting: turning live host values into typed tree fragments.
//!
//! Every synthesized node gets a span into the compilation's append-only
//! [`SourceBuffer`], so diagnostics triggered deep inside embedded code can
//! still show readable context. Callables are not quoted as data; they go
//! through the [`CallableResolver`], which memoizes a symbol and a type per
//! host function identity and defers the actual stub synthesis or lowering
//! to the driver.

use std::rc::Rc;

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::builtins;
use crate::host::{HostKind, HostRuntime, HostValue};
use crate::span::SourceBuffer;
use crate::types::{TypeArena, TypeId, TypeNode};

/// Resolution callback for quoted callables. Returns the stable symbol and
/// type the callable is bound to, memoized by host identity so recursive and
/// repeated references converge.
pub trait CallableResolver {
    fn resolve_callable(
        &mut self,
        arena: &mut TypeArena,
        value: &HostValue,
        span: crate::span::Span,
    ) -> Option<(String, TypeId)>;
}

pub struct Synthesizer<'a> {
    pub arena: &'a mut TypeArena,
    pub buffer: &'a mut SourceBuffer,
    pub runtime: Rc<dyn HostRuntime>,
    pub type_map: &'a mut super::maps::TypeMap,
    pub value_map: &'a mut super::maps::ValueMap,
    pub resolver: &'a mut dyn CallableResolver,
}

impl std::fmt::Debug for Synthesizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer").finish_non_exhaustive()
    }
}

impl Synthesizer<'_> {
    /// Quote a host value into a typed expression.
    pub fn quote(&mut self, value: &HostValue) -> Expr {
        match self.runtime.classify(value) {
            HostKind::None => {
                let span = self.buffer.push("None");
                let ty = builtins::none_type(self.arena);
                Expr::new(ExprKind::LitNone, ty, span)
            }
            HostKind::Bool(b) => {
                let span = self.buffer.push(if b { "True" } else { "False" });
                let ty = builtins::bool_type(self.arena);
                Expr::new(ExprKind::LitBool(b), ty, span)
            }
            HostKind::Int(i) => {
                let span = self.buffer.push(&i.to_string());
                // Width stays open; inference or defaulting settles it.
                let ty = builtins::int_type(self.arena);
                Expr::new(ExprKind::LitInt(i), ty, span)
            }
            HostKind::Float(f) => {
                let span = self.buffer.push(&format!("{:?}", f));
                let ty = builtins::float_type(self.arena);
                Expr::new(ExprKind::LitFloat(f), ty, span)
            }
            HostKind::Str(s) => {
                let span = self.buffer.push(&format!("{:?}", s));
                let ty = builtins::str_type(self.arena);
                Expr::new(ExprKind::LitStr(s), ty, span)
            }
            HostKind::List(items) => {
                let open = self.buffer.push("[");
                let mut elts = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        self.buffer.push(", ");
                    }
                    elts.push(self.quote(item));
                }
                let close = self.buffer.push("]");
                let ty = builtins::list_type(self.arena);
                Expr::new(ExprKind::List(elts), ty, open.join(&close))
            }
            HostKind::Function | HostKind::Method => self.quote_callable(value),
            HostKind::Instance | HostKind::Class | HostKind::Opaque => self.quote_object(value),
        }
    }

    fn quote_callable(&mut self, value: &HostValue) -> Expr {
        let span = self.buffer.push(&format!("<function {:#x}>", value.identity()));
        match self.resolver.resolve_callable(self.arena, value, span) {
            Some((symbol, ty)) => {
                let name_span = self.buffer.push(&symbol);
                Expr::new(ExprKind::Name(symbol), ty, name_span)
            }
            None => {
                let ty = self.arena.fresh_var();
                Expr::new(
                    ExprKind::Quote {
                        value: value.clone(),
                    },
                    ty,
                    span,
                )
            }
        }
    }

    fn quote_object(&mut self, value: &HostValue) -> Expr {
        let is_class = matches!(self.runtime.classify(value), HostKind::Class);
        let class_identity = if is_class {
            value.identity()
        } else {
            self.runtime
                .class_of(value)
                .map(|class| class.identity())
                .unwrap_or_else(|| value.identity())
        };
        let name = self.runtime.type_name(value);

        let types = match self.type_map.get(class_identity) {
            Some(types) => types,
            None => {
                // Every embedded object carries an identity attribute so
                // handles can cross the boundary.
                let objectid = builtins::int_type_of_width(self.arena, 32);
                let instance = self.arena.alloc(TypeNode::Instance {
                    name: name.clone(),
                    attributes: vec![("__objectid__".to_string(), objectid)],
                    constructor: None,
                });
                let constructor = self.arena.alloc(TypeNode::Constructor {
                    name: name.clone(),
                    instance,
                    attributes: Vec::new(),
                });
                self.arena.set_constructor(instance, constructor);
                let types = super::maps::ClassTypes {
                    instance,
                    constructor,
                };
                self.type_map.insert(class_identity, types);
                types
            }
        };

        let ty = if is_class {
            types.constructor
        } else {
            types.instance
        };
        let span = self.buffer.push(&format!("<{}>", name));
        self.value_map.add(ty, value, span);
        Expr::new(
            ExprKind::Quote {
                value: value.clone(),
            },
            ty,
            span,
        )
    }

    /// Synthesize `<callee>(<args>...)` as a statement-position call.
    pub fn call(&mut self, callee: &HostValue, args: &[HostValue]) -> Stmt {
        let func = self.quote(callee);
        self.buffer.push("(");
        let mut arg_exprs = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                self.buffer.push(", ");
            }
            arg_exprs.push(self.quote(arg));
        }
        let close = self.buffer.push(")");
        let span = func.span.join(&close);
        let result_ty = self.arena.fresh_var();
        let call = Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args: arg_exprs,
                keywords: Vec::new(),
            },
            result_ty,
            span,
        );
        Stmt::new(StmtKind::Expr(call), span)
    }

    /// Synthesize `name = <value>`, with the target sharing `target_ty`.
    pub fn assign_global(&mut self, name: &str, target_ty: TypeId, value: &HostValue) -> Stmt {
        let name_span = self.buffer.push(name);
        self.buffer.push(" = ");
        let rhs = self.quote(value);
        self.buffer.push("\n");
        let span = name_span.join(&rhs.span);
        let target = Expr::new(ExprKind::Name(name.to_string()), target_ty, name_span);
        Stmt::new(
            StmtKind::Assign {
                targets: vec![target],
                value: rhs,
            },
            span,
        )
    }

    /// Synthesize `target = class.attr`, rebinding a class-level attribute
    /// as a module-global symbol.
    pub fn assign_attribute(
        &mut self,
        target_name: &str,
        target_ty: TypeId,
        class_name: &str,
        class_ty: TypeId,
        attr: &str,
    ) -> Stmt {
        let target_span = self.buffer.push(target_name);
        self.buffer.push(" = ");
        let class_span = self.buffer.push(class_name);
        self.buffer.push(".");
        let attr_span = self.buffer.push(attr);
        self.buffer.push("\n");
        let span = target_span.join(&attr_span);

        let object = Expr::new(ExprKind::Name(class_name.to_string()), class_ty, class_span);
        let access_ty = self.arena.fresh_var();
        let access = Expr::new(
            ExprKind::Attribute {
                value: Box::new(object),
                attr: attr.to_string(),
                attr_span,
            },
            access_ty,
            class_span.join(&attr_span),
        );
        let target = Expr::new(ExprKind::Name(target_name.to_string()), target_ty, target_span);
        Stmt::new(
            StmtKind::Assign {
                targets: vec![target],
                value: access,
            },
            span,
        )
    }
}
