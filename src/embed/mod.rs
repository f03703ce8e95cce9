//! Embedding host values into a statically typed compilation.
//!
//! # Module Organization
//!
//! - `maps.rs`: object handles, class type pairs and observed-value records
//! - `synth.rs`: quoting host values into typed tree fragments
//! - `stitcher.rs`: the fixed-point driver tying quoting, lowering and
//!   inference together

mod maps;
mod stitcher;
mod synth;

#[cfg(test)]
mod test_helpers;

pub use maps::{ClassTypes, ObjectMap, TypeMap, ValueMap};
pub use stitcher::{
    EmbedState, KernelLowerer, LowerCtx, PendingCallable, StitchResult, Stitcher, TreeHasher,
};
pub use synth::{CallableResolver, Synthesizer};
