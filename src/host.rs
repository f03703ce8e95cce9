//! Host interpreter boundary.
//!
//! The stitching driver never inspects host objects directly; everything it
//! needs is expressed through the [`HostRuntime`] capability trait over
//! opaque [`HostValue`] handles. Values are identified by pointer identity,
//! which is what keeps quoting stable: embedding the same host object twice
//! yields the same handle and the same type.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Opaque handle to a value owned by the host interpreter.
#[derive(Clone)]
pub struct HostValue(Rc<dyn Any>);

impl HostValue {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn from_rc(rc: Rc<dyn Any>) -> Self {
        Self(rc)
    }

    /// Identity of the underlying host object. Stable for the lifetime of
    /// the handle and shared by clones.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostValue({:#x})", self.identity())
    }
}

/// Shape of a host value, with payloads extracted for the literal kinds.
#[derive(Debug, Clone)]
pub enum HostKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    /// Free function or other plain callable.
    Function,
    /// Bound method; split with [`HostRuntime::method_parts`].
    Method,
    /// Instance of a host class.
    Instance,
    /// A host class itself.
    Class,
    /// Anything the compiled subset cannot represent.
    Opaque,
}

/// How a host callable participates in kernel code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedInfo {
    /// Marked for compilation; its body is lowered into the kernel.
    Kernel,
    /// Named low-level entry point with no host body.
    Syscall { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPassing {
    Positional,
    VarPositional,
    VarKeyword,
}

/// One parameter of a host callable's signature.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub passing: ParamPassing,
    pub default: Option<HostValue>,
    /// Host-side type annotation, already evaluated to a value.
    pub annotation: Option<HostValue>,
}

/// Introspected signature of a host callable.
#[derive(Debug, Clone)]
pub struct CallableSpec {
    pub module: String,
    pub qualname: String,
    pub params: Vec<ParamSpec>,
    /// Host-side return annotation, already evaluated to a value.
    pub ret_annotation: Option<HostValue>,
}

impl CallableSpec {
    /// Mangled symbol the lowered function is registered under.
    pub fn symbol(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }
}

/// Builtin type denoted by a host-side annotation value. Host integers map
/// to 64-bit by default since the host's own integers are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    None,
    Bool,
    Int32,
    Int64,
    Float,
    Str,
    List,
}

/// A bound method decomposed into its receiver and underlying function.
#[derive(Debug, Clone)]
pub struct MethodParts {
    pub receiver: HostValue,
    pub function: HostValue,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("host object {object} has no attribute {name}")]
    AttributeMissing { object: String, name: String },
    #[error("host value {0} is not callable")]
    NotCallable(String),
    #[error("{0}")]
    Other(String),
}

/// Everything the embedding driver may ask of the host interpreter.
pub trait HostRuntime {
    fn classify(&self, value: &HostValue) -> HostKind;

    /// Printable name of the value's type, qualified for class instances
    /// (`module.Class`).
    fn type_name(&self, value: &HostValue) -> String;

    /// The class object of an instance, used as the identity key for its
    /// constructor type.
    fn class_of(&self, value: &HostValue) -> Option<HostValue>;

    fn has_attribute(&self, value: &HostValue, name: &str) -> bool;

    fn get_attribute(&self, value: &HostValue, name: &str) -> Result<HostValue, HostError>;

    fn describe_callable(&self, value: &HostValue) -> Result<CallableSpec, HostError>;

    /// Kernel or syscall marker on a callable, if any. Unmarked callables
    /// become remote procedure calls.
    fn embedded_info(&self, value: &HostValue) -> Option<EmbeddedInfo>;

    fn method_parts(&self, value: &HostValue) -> Option<MethodParts>;

    /// Builtin type named by an annotation value, if the annotation is one
    /// the compiled subset can represent.
    fn annotation_type(&self, annotation: &HostValue) -> Option<AnnotationKind>;

    /// Resolve a free name in the defining environment of a host function.
    fn resolve_global(&self, function: &HostValue, name: &str) -> Option<HostValue>;
}
