//! Structured compile-time diagnostics.
//!
//! Every error and note carries a stable kind tag, a message template with
//! named substitution fields, a primary span, optional highlighted spans and
//! chained notes. The structured form, not the rendered text, is the contract
//! downstream tooling relies on, so the whole structure is serializable.
//!
//! All diagnostics flow through a single [`DiagnosticSink`]. The sink decides
//! fatality (via its `errors_are_fatal` policy); the passes that emit
//! diagnostics only decide recoverability, i.e. whether visiting can continue
//! with the offending sub-expression left unresolved.

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

/// Stable machine-readable tag identifying what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Unification failure between two types.
    TypeConflict,
    /// A coercion node wraps a non-numeric operand.
    CoerceFailure,
    /// Attribute absent from a resolved nominal type.
    UnknownAttribute,
    /// An observed host object lacks the accessed attribute.
    HostAttributeMissing,
    /// A host attribute's inferred type changed between observations.
    HostAttributeUnstable,
    NotIterable,
    NotAContextManager,
    MultiDimSliceUnsupported,
    NotCallable,
    TooManyArguments,
    MissingArgument,
    DuplicateArgument,
    /// A builtin invoked with arguments matching none of its valid forms.
    InvalidBuiltinCall,
    NonLiteralIntWidth,
    NonLiteralAssertMessage,
    UnsupportedOperator,
    UnsupportedDecorator,
    VariadicArgumentsUnsupported,
    ComprehensionUnsupported,
    ReturnOutsideFunction,
    LoopControlOutsideLoop,
    NotAnException,
    NotAnExceptionConstructor,
    /// Name absent from both device and host environments.
    UnboundName,
    /// Missing parameter or return annotation on a foreign-call stub.
    MissingAnnotation,
    /// A system call parameter carries a default value.
    DefaultValueArgument,
    /// The embedding fixed-point loop exceeded its iteration cap.
    FixedPointDivergence,
    /// Attached context; never a primary diagnostic.
    Note,
}

/// A single diagnostic with its attached context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Message template; `{field}` placeholders are filled from `args`.
    pub message: String,
    /// Named substitution fields, in insertion order.
    pub args: Vec<(String, String)>,
    /// Primary source range.
    pub span: Span,
    /// Secondary highlighted ranges.
    pub highlights: Vec<Span>,
    /// Chained context notes.
    pub notes: Vec<Diagnostic>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        kind: DiagnosticKind,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            args: Vec::new(),
            span,
            highlights: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Error, kind, message, span)
    }

    pub fn note(message: impl Into<String>, span: Span) -> Self {
        Self::new(Severity::Note, DiagnosticKind::Note, message, span)
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }

    pub fn with_highlight(mut self, span: Span) -> Self {
        self.highlights.push(span);
        self
    }

    pub fn with_note(mut self, note: Diagnostic) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = Diagnostic>) -> Self {
        self.notes.extend(notes);
        self
    }

    /// Render the message template with its substitution fields filled in.
    pub fn text(&self) -> String {
        let mut text = self.message.clone();
        for (name, value) in &self.args {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        text
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (line {}, column {})",
            match self.severity {
                Severity::Note => "note",
                Severity::Warning => "warning",
                Severity::Error => "error",
                Severity::Fatal => "fatal",
            },
            self.text(),
            self.span.start_line,
            self.span.start_column
        )
    }
}

/// Accumulating reporting sink shared by every pass of a compilation.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    errors_are_fatal: bool,
    failed: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose errors abort the compilation at the next pass boundary.
    pub fn fatal_errors() -> Self {
        Self {
            errors_are_fatal: true,
            ..Self::default()
        }
    }

    /// Record a diagnostic. An exact duplicate of one already recorded is
    /// dropped; the embedding driver re-runs inference over the same tree,
    /// and a still-unresolved construct would otherwise report once per pass.
    pub fn process(&mut self, diagnostic: Diagnostic) {
        if self.diagnostics.contains(&diagnostic) {
            return;
        }
        match diagnostic.severity {
            Severity::Fatal => self.failed = true,
            Severity::Error if self.errors_are_fatal => self.failed = true,
            _ => {}
        }
        self.diagnostics.push(diagnostic);
    }

    /// Whether a diagnostic the policy considers fatal has been reported.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.failed = false;
        std::mem::take(&mut self.diagnostics)
    }
}
