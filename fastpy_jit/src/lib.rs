//! A decorator-style JIT compiler for a small numeric subset of a dynamic
//! host language.
//!
//! The pipeline is one straight line, each stage its own module: [`parser`]
//! turns source text into a [`host_ast::HostModule`], [`lowering`] turns that
//! into typed-with-free-variables Core IR ([`ir::Node`]), [`inference`] runs
//! Robinson unification ([`unify`]) over it to a [`inference::TypedFunction`],
//! and [`specialize`] turns one of those into a [`specialize::Specializable`]
//! that compiles a fresh native specialization per call-site argument-type
//! combination (via [`codegen`] and the [`abi`] dispatch bridge), caching
//! each one for the life of the process.
//!
//! [`compile`] wires the first three stages together; everything after that
//! is a method on the [`specialize::Specializable`] it returns.

// Debug output has no place in a library whose only user-facing surface is
// the CLI binary under `bin/`.
#![deny(clippy::print_stderr)]

pub mod abi;
pub mod codegen;
pub mod error;
pub mod host_ast;
pub mod inference;
pub mod ir;
pub mod lowering;
pub mod parser;
pub mod specialize;
pub mod types;
pub mod unify;

pub use error::{FastpyError, FastpyResult};
pub use specialize::{HostResult, HostValue, Specializable};
pub use types::TypeTerm;

/// Parse, lower, and infer `source`'s one function definition, returning a
/// [`Specializable`] ready to be called with reflected argument types any
/// number of times.
///
/// Each call site is specialized and compiled independently the first time
/// its argument types are seen, then served from the process-wide cache
/// ([`specialize`]) afterwards.
pub fn compile(source: &str) -> FastpyResult<Specializable> {
    let module = parser::parse(source)?;
    let lowered = lowering::lower(&module)?;
    let typed = inference::infer(lowered)?;
    Ok(Specializable::new(typed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_calls_add() {
        let f = compile("def add(a, b):\n    return a + b\n").unwrap();
        let result = f.call(&[HostValue::I64(2), HostValue::I64(3)]).unwrap();
        assert_eq!(result, HostResult::I64(5));
    }

    #[test]
    fn rejects_source_outside_the_grammar() {
        assert!(compile("x = 1\n").is_err());
    }

    #[test]
    fn same_function_specializes_independently_per_call_site_types() {
        let f = compile("def add(a, b):\n    return a + b\n").unwrap();
        let int_result = f.call(&[HostValue::I64(2), HostValue::I64(3)]).unwrap();
        let float_result = f.call(&[HostValue::F64(2.5), HostValue::F64(1.5)]).unwrap();
        assert_eq!(int_result, HostResult::I64(5));
        assert_eq!(float_result, HostResult::F64(4.0));
    }
}
