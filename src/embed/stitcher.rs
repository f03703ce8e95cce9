//! The stitching driver: embeds host values and functions into one
//! coherently typed compilation unit by iterating inference to a fixed
//! point.
//!
//! Each pass alternates strictly between mutation and inference. Quoting
//! during a pass only memoizes symbols and queues work; lowering kernel
//! bodies and synthesizing foreign-call stubs happens between passes, when
//! the driver has the tree to itself. The loop ends when a structural hash
//! of the tree is unchanged across two consecutive passes and no work is
//! queued, or when the iteration cap trips.

use std::collections::HashMap;
use std::rc::Rc;

use sha2::{Digest, Sha256};

use crate::ast::{Expr, ExprKind, IndexKind, Module, Stmt, StmtKind};
use crate::builtins;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::env::Environment;
use crate::host::{AnnotationKind, EmbeddedInfo, HostRuntime, HostValue, ParamPassing};
use crate::inference::{AttributeObserver, Inferencer, IntDefaulter, TreePass};
use crate::span::{SourceBuffer, Span};
use crate::types::{FunctionFlavor, FunctionType, TypeArena, TypeId, TypeNode, TypePrinter};

use super::maps::{ClassTypes, ObjectMap, TypeMap, ValueMap};
use super::synth::{CallableResolver, Synthesizer};

/// A quoted callable waiting to be lowered or stubbed between passes. Its
/// symbol and type variable were registered at quote time, so recursive
/// references already resolve.
#[derive(Debug)]
pub struct PendingCallable {
    pub value: HostValue,
    pub symbol: String,
    pub ty: TypeId,
    pub span: Span,
}

/// Everything one compilation accumulates about the host side.
pub struct EmbedState {
    pub runtime: Rc<dyn HostRuntime>,
    pub globals: Environment,
    pub object_map: ObjectMap,
    pub type_map: TypeMap,
    pub value_map: ValueMap,
    /// Symbol and type per quoted callable, keyed by host identity.
    pub functions: HashMap<usize, (String, TypeId)>,
    pub pending: Vec<PendingCallable>,
    /// Synthesized global bindings waiting for the injection cursor.
    pub pending_globals: Vec<Stmt>,
    pub buffer: SourceBuffer,
}

impl std::fmt::Debug for EmbedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedState")
            .field("globals", &self.globals.len())
            .field("objects", &self.object_map.len())
            .field("functions", &self.functions.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// External parser and rewriter boundary: turns the body of a kernel-marked
/// host function into a typed definition bound to `symbol`. Free names are
/// resolved through [`LowerCtx::resolve_name`], which quotes host values on
/// demand.
pub trait KernelLowerer {
    fn lower(&mut self, ctx: &mut LowerCtx<'_>, function: &HostValue, symbol: &str)
        -> Option<Stmt>;
}

pub struct LowerCtx<'a> {
    pub arena: &'a mut TypeArena,
    pub sink: &'a mut DiagnosticSink,
    pub state: &'a mut EmbedState,
    pub host_fn: &'a HostValue,
}

impl std::fmt::Debug for LowerCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LowerCtx").finish_non_exhaustive()
    }
}

impl LowerCtx<'_> {
    /// Resolve a free name: device-side environment first, then the host
    /// environment of the function being lowered (quoting the value and
    /// deferring a synthesized global binding), else an unbound-name error.
    pub fn resolve_name(&mut self, name: &str, span: Span) -> Option<TypeId> {
        if let Some(ty) = self.state.globals.get(name) {
            return Some(ty);
        }
        let runtime = self.state.runtime.clone();
        if let Some(value) = runtime.resolve_global(self.host_fn, name) {
            let target_ty = self.arena.fresh_var();
            self.state.globals.insert(name, target_ty);
            let stmt = {
                let mut resolver = FunctionResolver {
                    runtime: runtime.clone(),
                    functions: &mut self.state.functions,
                    pending: &mut self.state.pending,
                    globals: &mut self.state.globals,
                    object_map: &mut self.state.object_map,
                };
                let mut synth = Synthesizer {
                    arena: self.arena,
                    buffer: &mut self.state.buffer,
                    runtime,
                    type_map: &mut self.state.type_map,
                    value_map: &mut self.state.value_map,
                    resolver: &mut resolver,
                };
                synth.assign_global(name, target_ty, &value)
            };
            self.state.pending_globals.push(stmt);
            return Some(target_ty);
        }
        self.sink.process(
            Diagnostic::error(
                DiagnosticKind::UnboundName,
                "name '{name}' is not bound to anything",
                span,
            )
            .with_arg("name", name.to_string()),
        );
        None
    }
}

/// Quote-time callable resolution: memoize a symbol and a fresh type, bind
/// the symbol as a global, and queue the callable for between-pass
/// processing. Bound methods resolve through their underlying function so
/// every bound copy shares one symbol.
struct FunctionResolver<'a> {
    runtime: Rc<dyn HostRuntime>,
    functions: &'a mut HashMap<usize, (String, TypeId)>,
    pending: &'a mut Vec<PendingCallable>,
    globals: &'a mut Environment,
    object_map: &'a mut ObjectMap,
}

impl CallableResolver for FunctionResolver<'_> {
    fn resolve_callable(
        &mut self,
        arena: &mut TypeArena,
        value: &HostValue,
        span: Span,
    ) -> Option<(String, TypeId)> {
        if let Some((symbol, ty)) = self.functions.get(&value.identity()) {
            return Some((symbol.clone(), *ty));
        }
        if let Some(parts) = self.runtime.method_parts(value) {
            return self.resolve_callable(arena, &parts.function, span);
        }
        let symbol = match self.runtime.embedded_info(value) {
            Some(EmbeddedInfo::Kernel) => {
                // Mangled per originating module so definitions can be
                // flattened into one module.
                self.runtime.describe_callable(value).ok()?.symbol()
            }
            Some(EmbeddedInfo::Syscall { name }) => format!("ffi${}", name),
            None => format!("rpc${}", self.object_map.store(value)),
        };
        let ty = arena.fresh_var();
        // Memoized before any processing, so direct or mutual recursion
        // through this callable resolves to the symbol instead of looping.
        self.functions.insert(value.identity(), (symbol.clone(), ty));
        self.globals.insert(symbol.clone(), ty);
        self.pending.push(PendingCallable {
            value: value.clone(),
            symbol: symbol.clone(),
            ty,
            span,
        });
        Some((symbol, ty))
    }
}

/// Quote a single host value and run a throwaway inference sub-pass over the
/// fragment to discover its type. Sub-pass diagnostics are re-reported
/// through `sink` with `expansion_note` attached, pointing at the site that
/// forced the expansion.
fn infer_quoted_type(
    arena: &mut TypeArena,
    state: &mut EmbedState,
    sink: &mut DiagnosticSink,
    value: &HostValue,
    expansion_note: Diagnostic,
) -> TypeId {
    let runtime = state.runtime.clone();
    let expr = {
        let mut resolver = FunctionResolver {
            runtime: runtime.clone(),
            functions: &mut state.functions,
            pending: &mut state.pending,
            globals: &mut state.globals,
            object_map: &mut state.object_map,
        };
        let mut synth = Synthesizer {
            arena,
            buffer: &mut state.buffer,
            runtime,
            type_map: &mut state.type_map,
            value_map: &mut state.value_map,
            resolver: &mut resolver,
        };
        synth.quote(value)
    };
    let ty = expr.ty;
    let span = expr.span;
    let mut scratch = DiagnosticSink::new();
    let mut fragment = vec![Stmt::new(StmtKind::Expr(expr), span)];
    Inferencer::new(arena, &mut scratch).infer(&mut fragment);
    // A host integer carries no width; default it so repeated observations
    // of the same attribute compare equal.
    IntDefaulter.run(arena, &mut scratch, &mut fragment);
    for diagnostic in scratch.take() {
        sink.process(diagnostic.with_note(expansion_note.clone()));
    }
    ty
}

/// Attribute discovery on embedded host types, driven by the inference
/// engine through the observer hook.
struct AttributeResolver<'a> {
    state: &'a mut EmbedState,
}

impl AttributeObserver for AttributeResolver<'_> {
    fn resolve_attribute(
        &mut self,
        arena: &mut TypeArena,
        sink: &mut DiagnosticSink,
        object_ty: TypeId,
        attr: &str,
        object_span: Span,
        attr_span: Span,
    ) -> Option<TypeId> {
        let object_ty = arena.resolve(object_ty);
        let observed: Vec<(HostValue, Span)> = self.state.value_map.get(object_ty).to_vec();
        if observed.is_empty() {
            // No concrete value has been quoted with this type yet.
            return None;
        }
        let runtime = self.state.runtime.clone();

        for (value, quote_span) in &observed {
            if !runtime.has_attribute(value, attr) {
                let type_name = TypePrinter::new(arena).name(object_ty);
                sink.process(
                    Diagnostic::error(
                        DiagnosticKind::HostAttributeMissing,
                        "host object of type {type} has no attribute '{attr}'",
                        attr_span,
                    )
                    .with_arg("type", type_name)
                    .with_arg("attr", attr.to_string())
                    .with_highlight(object_span)
                    .with_note(Diagnostic::note(
                        "the host object was quoted here",
                        *quote_span,
                    )),
                );
                return None;
            }
        }

        for (value, quote_span) in &observed {
            let attr_value = match runtime.get_attribute(value, attr) {
                Ok(attr_value) => attr_value,
                Err(_) => continue,
            };
            // A compiled method reached through an instance belongs to the
            // constructor's table: dispatch resolves once per class.
            let is_instance = matches!(arena.get(object_ty), TypeNode::Instance { .. });
            let (table, quote_target) = match runtime.method_parts(&attr_value) {
                Some(parts)
                    if is_instance
                        && runtime.embedded_info(&parts.function)
                            == Some(EmbeddedInfo::Kernel) =>
                {
                    (
                        arena.constructor_of(object_ty).unwrap_or(object_ty),
                        parts.function,
                    )
                }
                _ => (object_ty, attr_value),
            };
            let discovered = infer_quoted_type(
                arena,
                self.state,
                sink,
                &quote_target,
                Diagnostic::note(
                    "expanded from here while inferring the type of attribute '{attr}'",
                    attr_span,
                )
                .with_arg("attr", attr.to_string()),
            );
            match arena.attribute(table, attr) {
                Some(existing) if arena.types_equal(existing, discovered) => {}
                Some(existing) => {
                    let mut printer = TypePrinter::new(arena);
                    let before = printer.name(existing);
                    let after = printer.name(discovered);
                    drop(printer);
                    sink.process(
                        Diagnostic::error(
                            DiagnosticKind::HostAttributeUnstable,
                            "host attribute '{attr}' changed type from {before} to {after}; host attribute types must stay stable during compilation",
                            attr_span,
                        )
                        .with_arg("attr", attr.to_string())
                        .with_arg("before", before)
                        .with_arg("after", after)
                        .with_note(Diagnostic::note(
                            "the conflicting value was quoted here",
                            *quote_span,
                        )),
                    );
                    return None;
                }
                None => arena.set_attribute(table, attr, discovered),
            }
        }

        builtins::attribute_of(arena, object_ty, attr)
    }
}

/// Structural hash of the typed tree: syntactic shape plus the resolved
/// form of every type slot, nothing else.
pub struct TreeHasher<'a> {
    arena: &'a TypeArena,
    hasher: Sha256,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for TreeHasher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeHasher").finish_non_exhaustive()
    }
}

impl<'a> TreeHasher<'a> {
    pub fn new(arena: &'a TypeArena) -> Self {
        Self {
            arena,
            hasher: Sha256::new(),
            scratch: Vec::new(),
        }
    }

    pub fn hash(mut self, stmts: &[Stmt]) -> [u8; 32] {
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.hasher.finalize().into()
    }

    fn ty(&mut self, t: TypeId) {
        self.scratch.clear();
        self.arena.write_structure(t, &mut self.scratch);
        self.hasher.update(&self.scratch);
        self.hasher.update([b';']);
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        self.hasher.update((stmts.len() as u32).to_le_bytes());
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let tag: u8 = match &stmt.kind {
            StmtKind::Expr(_) => 0,
            StmtKind::Assign { .. } => 1,
            StmtKind::AugAssign { .. } => 2,
            StmtKind::If { .. } => 3,
            StmtKind::While { .. } => 4,
            StmtKind::For { .. } => 5,
            StmtKind::Break => 6,
            StmtKind::Continue => 7,
            StmtKind::Return(_) => 8,
            StmtKind::FunctionDef(_) => 9,
            StmtKind::Raise { .. } => 10,
            StmtKind::Try { .. } => 11,
            StmtKind::With { .. } => 12,
            StmtKind::Assert { .. } => 13,
            StmtKind::Pass => 14,
        };
        self.hasher.update([tag]);
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.expr(target);
                }
                self.expr(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
                self.expr(test);
                self.stmts(body);
                self.stmts(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.expr(target);
                self.expr(iter);
                self.stmts(body);
                self.stmts(orelse);
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StmtKind::FunctionDef(def) => {
                self.hasher.update(def.name.as_bytes());
                for param in &def.args.args {
                    self.hasher.update(param.name.as_bytes());
                    self.ty(param.ty);
                }
                for default in &def.args.defaults {
                    self.expr(default);
                }
                self.ty(def.return_ty);
                self.ty(def.ty);
                self.stmts(&def.body);
            }
            StmtKind::Raise { exc } => {
                if let Some(exc) = exc {
                    self.expr(exc);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.stmts(body);
                for handler in handlers {
                    if let Some(filter) = &handler.filter {
                        self.expr(filter);
                    }
                    self.ty(handler.name_ty);
                    self.stmts(&handler.body);
                }
                self.stmts(orelse);
                self.stmts(finalbody);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    self.expr(&item.context);
                    if let Some(var) = &item.var {
                        self.expr(var);
                    }
                }
                self.stmts(body);
            }
            StmtKind::Assert { test, msg } => {
                self.expr(test);
                if let Some(msg) = msg {
                    self.expr(msg);
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        let tag: u8 = match &expr.kind {
            ExprKind::LitInt(_) => 0,
            ExprKind::LitFloat(_) => 1,
            ExprKind::LitStr(_) => 2,
            ExprKind::LitBool(_) => 3,
            ExprKind::LitNone => 4,
            ExprKind::Name(_) => 5,
            ExprKind::List(_) => 6,
            ExprKind::Tuple(_) => 7,
            ExprKind::Attribute { .. } => 8,
            ExprKind::Subscript { .. } => 9,
            ExprKind::Call { .. } => 10,
            ExprKind::UnaryOp { .. } => 11,
            ExprKind::BinOp { .. } => 12,
            ExprKind::BoolOp { .. } => 13,
            ExprKind::Compare { .. } => 14,
            ExprKind::IfExp { .. } => 15,
            ExprKind::Lambda { .. } => 16,
            ExprKind::ListComp { .. } => 17,
            ExprKind::Coerce { .. } => 18,
            ExprKind::Quote { .. } => 19,
        };
        self.hasher.update([tag]);
        self.ty(expr.ty);
        match &expr.kind {
            ExprKind::LitInt(value) => self.hasher.update(value.to_le_bytes()),
            ExprKind::LitFloat(value) => self.hasher.update(value.to_bits().to_le_bytes()),
            ExprKind::LitStr(value) => self.hasher.update(value.as_bytes()),
            ExprKind::LitBool(value) => self.hasher.update([*value as u8]),
            ExprKind::LitNone => {}
            ExprKind::Name(name) => self.hasher.update(name.as_bytes()),
            ExprKind::List(elts) | ExprKind::Tuple(elts) => {
                for elt in elts {
                    self.expr(elt);
                }
            }
            ExprKind::Attribute { value, attr, .. } => {
                self.expr(value);
                self.hasher.update(attr.as_bytes());
            }
            ExprKind::Subscript { value, index } => {
                self.expr(value);
                match index {
                    IndexKind::Index(index) => self.expr(index),
                    IndexKind::Slice { lower, upper, step } => {
                        for bound in [lower, upper, step].into_iter().flatten() {
                            self.expr(bound);
                        }
                    }
                }
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func);
                for arg in args {
                    self.expr(arg);
                }
                for keyword in keywords {
                    self.hasher.update(keyword.name.as_bytes());
                    self.expr(&keyword.value);
                }
            }
            ExprKind::UnaryOp { operand, .. } => self.expr(operand),
            ExprKind::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::BoolOp { values, .. } => {
                for value in values {
                    self.expr(value);
                }
            }
            ExprKind::Compare {
                left, comparators, ..
            } => {
                self.expr(left);
                for comparator in comparators {
                    self.expr(comparator);
                }
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            ExprKind::Lambda { args, body } => {
                for param in &args.args {
                    self.hasher.update(param.name.as_bytes());
                    self.ty(param.ty);
                }
                for default in &args.defaults {
                    self.expr(default);
                }
                self.expr(body);
            }
            ExprKind::ListComp { elt, generators } => {
                for generator in generators {
                    self.expr(&generator.target);
                    self.expr(&generator.iter);
                    for filter in &generator.ifs {
                        self.expr(filter);
                    }
                }
                self.expr(elt);
            }
            ExprKind::Coerce { value } => self.expr(value),
            ExprKind::Quote { value } => {
                self.hasher.update(value.identity().to_le_bytes());
            }
        }
    }
}

/// Output of a finished stitching session.
#[derive(Debug)]
pub struct StitchResult {
    pub module: Module,
    pub arena: TypeArena,
    pub object_map: ObjectMap,
    pub sink: DiagnosticSink,
}

pub struct Stitcher {
    arena: TypeArena,
    sink: DiagnosticSink,
    state: EmbedState,
    lowerer: Box<dyn KernelLowerer>,
    typedtree: Vec<Stmt>,
    /// Synthesized globals are inserted here, before the first real
    /// statement.
    inject_at: usize,
    max_iterations: usize,
}

impl std::fmt::Debug for Stitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stitcher")
            .field("statements", &self.typedtree.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Stitcher {
    pub fn new(runtime: Rc<dyn HostRuntime>, lowerer: Box<dyn KernelLowerer>) -> Self {
        let mut arena = TypeArena::new();
        let globals = builtins::prelude(&mut arena);
        Self {
            arena,
            sink: DiagnosticSink::new(),
            state: EmbedState {
                runtime,
                globals,
                object_map: ObjectMap::new(),
                type_map: TypeMap::new(),
                value_map: ValueMap::new(),
                functions: HashMap::new(),
                pending: Vec::new(),
                pending_globals: Vec::new(),
                buffer: SourceBuffer::new("<synthesized>"),
            },
            lowerer,
            typedtree: Vec::new(),
            inject_at: 0,
            max_iterations: 100,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn globals(&self) -> &Environment {
        &self.state.globals
    }

    pub fn typedtree(&self) -> &[Stmt] {
        &self.typedtree
    }

    pub fn object_map(&self) -> &ObjectMap {
        &self.state.object_map
    }

    /// Embed a call to a host callable with the given arguments and iterate
    /// inference to a fixed point. Bound methods call through their
    /// underlying function with the receiver prepended.
    pub fn stitch_call(&mut self, function: &HostValue, args: &[HostValue]) {
        let (callee, full_args): (HostValue, Vec<HostValue>) =
            match self.state.runtime.method_parts(function) {
                Some(parts) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(parts.receiver.clone());
                    full.extend(args.iter().cloned());
                    (parts.function, full)
                }
                None => (function.clone(), args.to_vec()),
            };
        let stmt = {
            let runtime = self.state.runtime.clone();
            let mut resolver = FunctionResolver {
                runtime: runtime.clone(),
                functions: &mut self.state.functions,
                pending: &mut self.state.pending,
                globals: &mut self.state.globals,
                object_map: &mut self.state.object_map,
            };
            let mut synth = Synthesizer {
                arena: &mut self.arena,
                buffer: &mut self.state.buffer,
                runtime,
                type_map: &mut self.state.type_map,
                value_map: &mut self.state.value_map,
                resolver: &mut resolver,
            };
            synth.call(&callee, &full_args)
        };
        self.typedtree.push(stmt);
        self.iterate();
    }

    /// Run finalization and hand the accumulated module over.
    pub fn finalize(mut self) -> StitchResult {
        self.iterate();
        self.synthesize_constructor_globals();
        self.iterate();
        StitchResult {
            module: Module {
                body: self.typedtree,
                globals: self.state.globals,
            },
            arena: self.arena,
            object_map: self.state.object_map,
            sink: self.sink,
        }
    }

    /// The fixed-point loop: process queued work, re-run inference, compare
    /// structural hashes across consecutive passes.
    fn iterate(&mut self) {
        let mut previous: Option<[u8; 32]> = None;
        for _ in 0..self.max_iterations {
            self.process_pending();
            self.inject_pending_globals();
            {
                let mut observer = AttributeResolver {
                    state: &mut self.state,
                };
                let mut inferencer =
                    Inferencer::with_observer(&mut self.arena, &mut self.sink, &mut observer);
                inferencer.infer(&mut self.typedtree);
            }
            let hash = TreeHasher::new(&self.arena).hash(&self.typedtree);
            let settled =
                self.state.pending.is_empty() && self.state.pending_globals.is_empty();
            if settled && previous == Some(hash) {
                return;
            }
            previous = Some(hash);
        }
        self.sink.process(
            Diagnostic::error(
                DiagnosticKind::FixedPointDivergence,
                "embedding did not converge after {passes} inference passes",
                Span::point(),
            )
            .with_arg("passes", self.max_iterations.to_string()),
        );
    }

    fn inject_pending_globals(&mut self) {
        let pending = std::mem::take(&mut self.state.pending_globals);
        for stmt in pending {
            self.typedtree.insert(self.inject_at, stmt);
            self.inject_at += 1;
        }
    }

    fn process_pending(&mut self) {
        let pending = std::mem::take(&mut self.state.pending);
        for item in pending {
            match self.state.runtime.embedded_info(&item.value) {
                Some(EmbeddedInfo::Kernel) => self.lower_kernel(item),
                Some(EmbeddedInfo::Syscall { name }) => {
                    self.build_foreign(item, FunctionFlavor::Syscall { name });
                }
                None => {
                    let service = self.state.object_map.store(&item.value);
                    self.build_foreign(item, FunctionFlavor::Rpc { service });
                }
            }
        }
    }

    fn lower_kernel(&mut self, item: PendingCallable) {
        let stmt = {
            let mut ctx = LowerCtx {
                arena: &mut self.arena,
                sink: &mut self.sink,
                state: &mut self.state,
                host_fn: &item.value,
            };
            self.lowerer.lower(&mut ctx, &item.value, &item.symbol)
        };
        let stmt = match stmt {
            Some(stmt) => stmt,
            None => return, // the lowerer reported its own diagnostics
        };
        if let StmtKind::FunctionDef(def) = &stmt.kind {
            let _ = self.arena.unify(item.ty, def.ty);
        }
        self.typedtree.insert(self.inject_at, stmt);
        self.inject_at += 1;
    }

    fn build_foreign(&mut self, item: PendingCallable, flavor: FunctionFlavor) {
        let is_syscall = matches!(flavor, FunctionFlavor::Syscall { .. });
        let spec = match self.state.runtime.describe_callable(&item.value) {
            Ok(spec) => spec,
            Err(error) => {
                self.sink.process(
                    Diagnostic::error(DiagnosticKind::NotCallable, "{error}", item.span)
                        .with_arg("error", error.to_string()),
                );
                return;
            }
        };

        let mut args: Vec<(String, TypeId)> = Vec::new();
        let mut optargs: Vec<(String, TypeId)> = Vec::new();
        for param in &spec.params {
            match param.passing {
                ParamPassing::VarPositional | ParamPassing::VarKeyword => {
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::VariadicArgumentsUnsupported,
                            "catch-all parameter '{name}' is not supported on cross-boundary functions",
                            item.span,
                        )
                        .with_arg("name", param.name.clone()),
                    );
                    return;
                }
                ParamPassing::Positional => {}
            }
            let ty = match &param.annotation {
                Some(annotation) => self.type_from_annotation(annotation, &param.name, item.span),
                None if is_syscall => {
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::MissingAnnotation,
                            "system call parameter '{name}' must have a type annotation",
                            item.span,
                        )
                        .with_arg("name", param.name.clone()),
                    );
                    self.arena.fresh_var()
                }
                None => match &param.default {
                    // The default's type stands in for the annotation.
                    Some(default) => infer_quoted_type(
                        &mut self.arena,
                        &mut self.state,
                        &mut self.sink,
                        default,
                        Diagnostic::note(
                            "expanded from here while inferring the type of parameter '{name}' from its default value",
                            item.span,
                        )
                        .with_arg("name", param.name.clone()),
                    ),
                    None => self.arena.fresh_var(),
                },
            };
            if param.default.is_some() {
                if is_syscall {
                    self.sink.process(
                        Diagnostic::error(
                            DiagnosticKind::DefaultValueArgument,
                            "system call parameter '{name}' must not have a default value",
                            item.span,
                        )
                        .with_arg("name", param.name.clone()),
                    );
                }
                optargs.push((param.name.clone(), ty));
            } else {
                args.push((param.name.clone(), ty));
            }
        }

        let ret = match &spec.ret_annotation {
            Some(annotation) => self.type_from_annotation(annotation, "return", item.span),
            None => {
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::MissingAnnotation,
                        "the return type of cross-boundary function '{symbol}' must be annotated",
                        item.span,
                    )
                    .with_arg("symbol", item.symbol.clone()),
                );
                self.arena.fresh_var()
            }
        };

        let fn_ty = self.arena.alloc(TypeNode::Function(FunctionType {
            args,
            optargs,
            ret,
            flavor,
        }));
        let _ = self.arena.unify(item.ty, fn_ty);
    }

    fn type_from_annotation(&mut self, annotation: &HostValue, name: &str, span: Span) -> TypeId {
        match self.state.runtime.annotation_type(annotation) {
            Some(AnnotationKind::None) => builtins::none_type(&mut self.arena),
            Some(AnnotationKind::Bool) => builtins::bool_type(&mut self.arena),
            Some(AnnotationKind::Int32) => builtins::int_type_of_width(&mut self.arena, 32),
            Some(AnnotationKind::Int64) => builtins::int_type_of_width(&mut self.arena, 64),
            Some(AnnotationKind::Float) => builtins::float_type(&mut self.arena),
            Some(AnnotationKind::Str) => builtins::str_type(&mut self.arena),
            Some(AnnotationKind::List) => builtins::list_type(&mut self.arena),
            None => {
                self.sink.process(
                    Diagnostic::error(
                        DiagnosticKind::MissingAnnotation,
                        "the type annotation of '{name}' cannot be represented",
                        span,
                    )
                    .with_arg("name", name.to_string()),
                );
                self.arena.fresh_var()
            }
        }
    }

    /// Synthesize global bindings for every embedded class that was used:
    /// the constructor symbol itself, plus one rebinding per class-level
    /// compiled method so it stays reachable as a module global.
    fn synthesize_constructor_globals(&mut self) {
        let classes: Vec<(usize, ClassTypes)> = self.state.type_map.iter().collect();
        for (_, types) in classes {
            let constructor_values = self.state.value_map.get(types.constructor);
            let observed_ctor = constructor_values.first().map(|(value, _)| value.clone());
            let instance_values: Vec<HostValue> = self
                .state
                .value_map
                .get(types.instance)
                .iter()
                .map(|(value, _)| value.clone())
                .collect();
            if observed_ctor.is_none() && instance_values.is_empty() {
                continue;
            }
            // Prefer a directly observed constructor; else derive it from
            // any observed instance.
            let class_value = observed_ctor.or_else(|| {
                instance_values
                    .first()
                    .and_then(|value| self.state.runtime.class_of(value))
            });
            let class_name = match self.arena.get(types.constructor) {
                TypeNode::Constructor { name, .. } => name.clone(),
                _ => continue,
            };

            if let Some(class_value) = class_value {
                if self.state.globals.get(&class_name).is_none() {
                    self.state.globals.insert(&*class_name, types.constructor);
                    let stmt = {
                        let runtime = self.state.runtime.clone();
                        let mut resolver = FunctionResolver {
                            runtime: runtime.clone(),
                            functions: &mut self.state.functions,
                            pending: &mut self.state.pending,
                            globals: &mut self.state.globals,
                            object_map: &mut self.state.object_map,
                        };
                        let mut synth = Synthesizer {
                            arena: &mut self.arena,
                            buffer: &mut self.state.buffer,
                            runtime,
                            type_map: &mut self.state.type_map,
                            value_map: &mut self.state.value_map,
                            resolver: &mut resolver,
                        };
                        synth.assign_global(&class_name, types.constructor, &class_value)
                    };
                    self.state.pending_globals.push(stmt);
                }
            }

            let attributes: Vec<(String, TypeId)> = self
                .arena
                .attributes(types.constructor)
                .unwrap_or(&[])
                .to_vec();
            for (attr, attr_ty) in attributes {
                let compiled = matches!(
                    self.arena.get(attr_ty),
                    TypeNode::Function(function) if function.flavor == FunctionFlavor::Plain
                );
                if !compiled {
                    continue;
                }
                let target_name = format!("{}.{}", class_name, attr);
                if self.state.globals.contains(&target_name) {
                    // Already bound, typically by quoting the method itself.
                    continue;
                }
                let target_ty = self.arena.fresh_var();
                self.state.globals.insert(&*target_name, target_ty);
                let stmt = {
                    let runtime = self.state.runtime.clone();
                    let mut resolver = FunctionResolver {
                        runtime: runtime.clone(),
                        functions: &mut self.state.functions,
                        pending: &mut self.state.pending,
                        globals: &mut self.state.globals,
                        object_map: &mut self.state.object_map,
                    };
                    let mut synth = Synthesizer {
                        arena: &mut self.arena,
                        buffer: &mut self.state.buffer,
                        runtime,
                        type_map: &mut self.state.type_map,
                        value_map: &mut self.state.value_map,
                        resolver: &mut resolver,
                    };
                    synth.assign_attribute(
                        &target_name,
                        target_ty,
                        &class_name,
                        types.constructor,
                        &attr,
                    )
                };
                self.state.pending_globals.push(stmt);
            }
        }
    }
}
