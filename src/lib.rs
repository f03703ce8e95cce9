// Prevent accidental debug output in library code.
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]

//! Type inference and host-embedding front-end for a compiled kernel subset.
//!
//! The crate has two halves. The `types` and `inference` modules implement a
//! union-find unifier over an arena of type nodes and a post-order inference
//! engine for the typed tree, including fixed-width integers with inferred
//! widths, arithmetic coercion, and function types flavored by their calling
//! convention (compiled, remote procedure call, or system call).
//!
//! The `host` and `embed` modules bridge a live host interpreter into that
//! typed world: host values are quoted into tree fragments, host callables
//! become lowered kernel definitions or foreign-call stubs, and an iterative
//! driver re-runs inference until the embedded program reaches a fixed point.

// Typed tree and environments
pub mod ast;
pub mod env;
pub mod span;

// Type model and inference
pub mod builtins;
pub mod inference;
pub mod types;

// Diagnostics
pub mod diagnostics;

// Host boundary and embedding driver
pub mod embed;
pub mod host;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use embed::{KernelLowerer, LowerCtx, StitchResult, Stitcher};
pub use host::{HostRuntime, HostValue};
pub use inference::{Inferencer, IntDefaulter};
pub use types::{TypeArena, TypeId, TypeNode};
