//! Type inference over the typed tree.
//!
//! # Module Organization
//!
//! - `engine.rs`: `Inferencer`, the post-order unification visitor
//! - `builtin_calls.rs`: signature checking for recognized builtin callables
//! - `mono.rs`: `IntDefaulter`, the integer width defaulting post-pass

mod builtin_calls;
mod engine;
mod mono;

#[cfg(test)]
mod tests;

pub use engine::{AttributeObserver, Inferencer};
pub use mono::{IntDefaulter, TreePass};
