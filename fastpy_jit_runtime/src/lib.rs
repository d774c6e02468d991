//! Runtime support for `fastpy_jit` compiled code.
//!
//! This crate holds the ABI-facing types that live on both sides of a
//! JIT-compiled call: the [`array::ArrayDescriptor`] struct that compiled
//! code reads/writes through directly, and the [`error::RuntimeError`] type
//! for failures that can only be detected at call time (bad index, shape
//! mismatch). It has no dependency on the compiler itself so that a
//! compiled binary can link against it without pulling in Cranelift.

pub mod array;
pub mod error;

/// Convenient imports for crates embedding compiled functions.
pub mod prelude {
    pub use super::array::{ArrayDescriptor, ElementKind};
    pub use super::error::{RuntimeError, RuntimeResult};
}

pub use prelude::*;
