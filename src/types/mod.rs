//! The algebraic type model and union-find unification.
//!
//! # Module Organization
//!
//! - `arena.rs`: `TypeArena`, `TypeId`, `TypeNode`, unification
//! - `printer.rs`: `TypePrinter` for diagnostics

mod arena;
mod printer;


pub use arena::{FunctionFlavor, FunctionType, TypeArena, TypeConflict, TypeId, TypeNode};
pub use printer::TypePrinter;
