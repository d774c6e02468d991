//! Runtime error types for JIT-compiled code.
//!
//! These cover failures that can arise *after* a function has been
//! specialized and installed in the cache, as opposed to the compile-time
//! errors (`fastpy_jit::FastpyError`) that can arise while getting it there.

use thiserror::Error;

/// Runtime error type.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An array index fell outside `[0, length)`.
    #[error("index out of bounds: the len is {length} but the index is {index}")]
    IndexOutOfBounds {
        /// Attempted index.
        index: usize,
        /// Array length.
        length: usize,
    },

    /// An `ArrayView`/`ArrayDescriptor` carried a dimensionality or element
    /// kind the caller didn't expect.
    #[error("array shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Generic error with a custom message.
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    /// Create a bounds error.
    pub fn bounds_error(index: usize, length: usize) -> Self {
        RuntimeError::IndexOutOfBounds { index, length }
    }

    /// Create a shape-mismatch error.
    pub fn shape_mismatch<S: Into<String>>(msg: S) -> Self {
        RuntimeError::ShapeMismatch(msg.into())
    }

    /// Create a custom error.
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        RuntimeError::Custom(msg.into())
    }
}

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::bounds_error(10, 5);
        assert_eq!(
            format!("{}", err),
            "index out of bounds: the len is 5 but the index is 10"
        );
    }
}
