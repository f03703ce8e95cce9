//! A scripted host interpreter for driver tests.
//!
//! [`MockWorld`] builds a frozen object graph of functions, classes,
//! instances and bound methods, then hands out an `Rc<MockRuntime>`
//! implementing [`HostRuntime`] over it. [`MockLowerer`] maps kernel
//! functions to plain function pointers that construct their typed bodies,
//! standing in for the parser front-end.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Arguments, Expr, ExprKind, FunctionDef, Param, Stmt, StmtKind};
use crate::host::{
    AnnotationKind, CallableSpec, EmbeddedInfo, HostError, HostKind, HostRuntime, HostValue,
    MethodParts, ParamPassing, ParamSpec,
};
use crate::span::Span;
use crate::types::TypeId;

use super::stitcher::{KernelLowerer, LowerCtx};

/// Opaque payload distinguishing scripted host objects by allocation.
struct MockObject(#[allow(dead_code)] u32);

enum MockEntry {
    Function {
        spec: CallableSpec,
        embedded: Option<EmbeddedInfo>,
        globals: Vec<(String, HostValue)>,
    },
    Method(MethodParts),
    Instance {
        class: HostValue,
        attributes: Vec<(String, HostValue)>,
    },
    Class {
        name: String,
        attributes: Vec<(String, HostValue)>,
    },
    Annotation(AnnotationKind),
}

#[derive(Default)]
pub struct MockWorld {
    entries: HashMap<usize, MockEntry>,
    next: u32,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, entry: MockEntry) -> HostValue {
        self.next += 1;
        let value = HostValue::new(MockObject(self.next));
        self.entries.insert(value.identity(), entry);
        value
    }

    pub fn annotation(&mut self, kind: AnnotationKind) -> HostValue {
        self.register(MockEntry::Annotation(kind))
    }

    pub fn function(
        &mut self,
        module: &str,
        qualname: &str,
        embedded: Option<EmbeddedInfo>,
        params: Vec<ParamSpec>,
        ret_annotation: Option<HostValue>,
    ) -> HostValue {
        self.register(MockEntry::Function {
            spec: CallableSpec {
                module: module.to_string(),
                qualname: qualname.to_string(),
                params,
                ret_annotation,
            },
            embedded,
            globals: Vec::new(),
        })
    }

    pub fn class(&mut self, name: &str) -> HostValue {
        self.register(MockEntry::Class {
            name: name.to_string(),
            attributes: Vec::new(),
        })
    }

    pub fn instance(&mut self, class: &HostValue) -> HostValue {
        self.register(MockEntry::Instance {
            class: class.clone(),
            attributes: Vec::new(),
        })
    }

    pub fn bind_method(&mut self, receiver: &HostValue, function: &HostValue) -> HostValue {
        self.register(MockEntry::Method(MethodParts {
            receiver: receiver.clone(),
            function: function.clone(),
        }))
    }

    pub fn set_attribute(&mut self, object: &HostValue, name: &str, value: HostValue) {
        match self.entries.get_mut(&object.identity()) {
            Some(MockEntry::Instance { attributes, .. })
            | Some(MockEntry::Class { attributes, .. }) => {
                attributes.push((name.to_string(), value));
            }
            _ => panic!("set_attribute on a non-object mock value"),
        }
    }

    pub fn set_global(&mut self, function: &HostValue, name: &str, value: HostValue) {
        match self.entries.get_mut(&function.identity()) {
            Some(MockEntry::Function { globals, .. }) => {
                globals.push((name.to_string(), value));
            }
            _ => panic!("set_global on a non-function mock value"),
        }
    }

    pub fn freeze(self) -> Rc<MockRuntime> {
        Rc::new(MockRuntime {
            entries: self.entries,
        })
    }
}

pub struct MockRuntime {
    entries: HashMap<usize, MockEntry>,
}

impl MockRuntime {
    fn entry(&self, value: &HostValue) -> Option<&MockEntry> {
        self.entries.get(&value.identity())
    }
}

impl HostRuntime for MockRuntime {
    fn classify(&self, value: &HostValue) -> HostKind {
        if value.downcast_ref::<()>().is_some() {
            return HostKind::None;
        }
        if let Some(b) = value.downcast_ref::<bool>() {
            return HostKind::Bool(*b);
        }
        if let Some(i) = value.downcast_ref::<i64>() {
            return HostKind::Int(*i);
        }
        if let Some(f) = value.downcast_ref::<f64>() {
            return HostKind::Float(*f);
        }
        if let Some(s) = value.downcast_ref::<String>() {
            return HostKind::Str(s.clone());
        }
        if let Some(items) = value.downcast_ref::<Vec<HostValue>>() {
            return HostKind::List(items.clone());
        }
        match self.entry(value) {
            Some(MockEntry::Function { .. }) => HostKind::Function,
            Some(MockEntry::Method(_)) => HostKind::Method,
            Some(MockEntry::Instance { .. }) => HostKind::Instance,
            Some(MockEntry::Class { .. }) => HostKind::Class,
            _ => HostKind::Opaque,
        }
    }

    fn type_name(&self, value: &HostValue) -> String {
        match self.classify(value) {
            HostKind::None => "NoneType".to_string(),
            HostKind::Bool(_) => "bool".to_string(),
            HostKind::Int(_) => "int".to_string(),
            HostKind::Float(_) => "float".to_string(),
            HostKind::Str(_) => "str".to_string(),
            HostKind::List(_) => "list".to_string(),
            HostKind::Function => "function".to_string(),
            HostKind::Method => "method".to_string(),
            HostKind::Instance => match self.entry(value) {
                Some(MockEntry::Instance { class, .. }) => self.type_name(class),
                _ => "object".to_string(),
            },
            HostKind::Class => match self.entry(value) {
                Some(MockEntry::Class { name, .. }) => name.clone(),
                _ => "type".to_string(),
            },
            HostKind::Opaque => "object".to_string(),
        }
    }

    fn class_of(&self, value: &HostValue) -> Option<HostValue> {
        match self.entry(value) {
            Some(MockEntry::Instance { class, .. }) => Some(class.clone()),
            _ => None,
        }
    }

    fn has_attribute(&self, value: &HostValue, name: &str) -> bool {
        self.get_attribute(value, name).is_ok()
    }

    fn get_attribute(&self, value: &HostValue, name: &str) -> Result<HostValue, HostError> {
        let missing = || HostError::AttributeMissing {
            object: self.type_name(value),
            name: name.to_string(),
        };
        match self.entry(value) {
            Some(MockEntry::Instance { class, attributes }) => attributes
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, v)| v.clone())
                .map(Ok)
                .unwrap_or_else(|| self.get_attribute(class, name)),
            Some(MockEntry::Class { attributes, .. }) => attributes
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(missing),
            _ => Err(missing()),
        }
    }

    fn describe_callable(&self, value: &HostValue) -> Result<CallableSpec, HostError> {
        match self.entry(value) {
            Some(MockEntry::Function { spec, .. }) => Ok(spec.clone()),
            Some(MockEntry::Method(parts)) => self.describe_callable(&parts.function),
            _ => Err(HostError::NotCallable(self.type_name(value))),
        }
    }

    fn embedded_info(&self, value: &HostValue) -> Option<EmbeddedInfo> {
        match self.entry(value) {
            Some(MockEntry::Function { embedded, .. }) => embedded.clone(),
            Some(MockEntry::Method(parts)) => self.embedded_info(&parts.function),
            _ => None,
        }
    }

    fn method_parts(&self, value: &HostValue) -> Option<MethodParts> {
        match self.entry(value) {
            Some(MockEntry::Method(parts)) => Some(parts.clone()),
            _ => None,
        }
    }

    fn annotation_type(&self, annotation: &HostValue) -> Option<AnnotationKind> {
        match self.entry(annotation) {
            Some(MockEntry::Annotation(kind)) => Some(*kind),
            _ => None,
        }
    }

    fn resolve_global(&self, function: &HostValue, name: &str) -> Option<HostValue> {
        match self.entry(function) {
            Some(MockEntry::Function { globals, .. }) => globals
                .iter()
                .find(|(global, _)| global == name)
                .map(|(_, value)| value.clone()),
            Some(MockEntry::Method(parts)) => self.resolve_global(&parts.function, name),
            _ => None,
        }
    }
}

/// A positional parameter spec with no default.
pub fn param(name: &str, annotation: Option<HostValue>) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        passing: ParamPassing::Positional,
        default: None,
        annotation,
    }
}

pub type LowerFn = fn(&mut LowerCtx<'_>, &str) -> Option<Stmt>;

/// Maps kernel function identities to body builders.
#[derive(Default)]
pub struct MockLowerer {
    bodies: HashMap<usize, LowerFn>,
}

impl MockLowerer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, function: &HostValue, body: LowerFn) {
        self.bodies.insert(function.identity(), body);
    }
}

impl KernelLowerer for MockLowerer {
    fn lower(
        &mut self,
        ctx: &mut LowerCtx<'_>,
        function: &HostValue,
        symbol: &str,
    ) -> Option<Stmt> {
        let body = self.bodies.get(&function.identity()).copied()?;
        body(ctx, symbol)
    }
}

/// Assemble a function definition statement with fresh signature slots.
pub fn function_def(
    arena: &mut crate::types::TypeArena,
    name: &str,
    params: Vec<(&str, TypeId)>,
    body: Vec<Stmt>,
) -> Stmt {
    let args = Arguments {
        args: params
            .into_iter()
            .map(|(param, ty)| Param {
                name: param.to_string(),
                ty,
                span: Span::point(),
            })
            .collect(),
        defaults: Vec::new(),
    };
    let def = FunctionDef {
        name: name.to_string(),
        args,
        body,
        decorators: Vec::new(),
        return_ty: arena.fresh_var(),
        ty: arena.fresh_var(),
        name_span: Span::point(),
    };
    Stmt::new(StmtKind::FunctionDef(def), Span::point())
}

pub fn name_expr(name: &str, ty: TypeId) -> Expr {
    Expr::new(ExprKind::Name(name.to_string()), ty, Span::point())
}
