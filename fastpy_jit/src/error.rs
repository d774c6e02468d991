//! The single error type threaded through every compiler stage.
//!
//! Each stage (parse, lower, infer, specialize, codegen, ABI bridge) raises
//! its own variant; there is no stage-local error type, matching the
//! teacher's pattern of one `thiserror`-derived enum per compiler
//! (`aot::AotError`) rather than per-module error types.

use thiserror::Error;

use crate::types::TypeTerm;

/// Errors a compile or a call can raise.
///
/// All variants are fatal to the attempt that raised them: nothing here is
/// retried, and no partially-built Cranelift module is ever finalized.
#[derive(Debug, Error)]
pub enum FastpyError {
    /// The source text isn't in the supported grammar at all.
    #[error("parse error at byte {offset}: {message}")]
    Parse {
        /// Byte offset into the source where parsing failed.
        offset: usize,
        /// Human-readable description of what was expected.
        message: String,
    },

    /// The text parsed, but lowering has no case for this construct.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// A call-site argument's reflected type isn't one the ABI bridge
    /// recognizes.
    #[error("unsupported argument type for parameter {param}: {detail}")]
    UnsupportedArgumentType {
        /// Parameter name.
        param: String,
        /// Description of the unsupported value.
        detail: String,
    },

    /// Wrong number of call-site arguments for the function's parameter
    /// list.
    #[error("arity mismatch: {name} expects {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },

    /// Unification failed to reconcile two type terms.
    #[error("type mismatch: cannot unify {0} with {1}")]
    TypeMismatch(TypeTerm, TypeTerm),

    /// Two function types unified against each other with a different
    /// number of parameters — a distinct case from a plain [`Self::TypeMismatch`]
    /// per spec.md §4.1/§7, since the shapes don't line up at all rather
    /// than merely disagreeing on what fills them.
    #[error("arity mismatch in unification: {lhs} has {expected} parameter(s), {rhs} has {got}")]
    UnifyArityMismatch {
        /// Left-hand function type.
        lhs: TypeTerm,
        /// Right-hand function type.
        rhs: TypeTerm,
        /// Left-hand parameter count.
        expected: usize,
        /// Right-hand parameter count.
        got: usize,
    },

    /// A type variable would have to unify with a term that contains it.
    #[error("infinite type: {0} occurs in {1}")]
    InfiniteType(TypeTerm, TypeTerm),

    /// After solving all constraints, a function's signature still
    /// contains an unresolved type variable.
    #[error("underdetermined signature for {0}: could not fully resolve {1}")]
    Underdetermined(String, TypeTerm),

    /// A resolved type has no representation in the native ABI (e.g. a
    /// function-typed parameter, or an arity/shape the dispatch table
    /// doesn't cover).
    #[error("unsupported ABI type: {0}")]
    UnsupportedAbiType(String),
}

/// Result type alias used throughout the crate.
pub type FastpyResult<T> = Result<T, FastpyError>;
