//! Specialization and the process-wide compile cache.
//!
//! Turns a [`crate::inference::TypedFunction`] (still possibly polymorphic —
//! its parameters may carry free type variables) plus one concrete call's
//! reflected argument types into either a cache hit or a fresh Cranelift
//! compile, exactly the `specialize`/`function_cache` two-step
//! `original_source/fastpy.py` implements: unify the general scheme against
//! the call-site's `spec_ty`, compose with the scheme's own solution,
//! check every resulting type is concrete, then look up or compile.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use fastpy_jit_runtime::array::ElementKind;

use crate::abi::{AbiValue, Dispatcher, Scalar};
use crate::codegen::Codegen;
use crate::error::FastpyError;
use crate::inference::{self, TypedFunction};
use crate::types::TypeTerm;
use crate::unify::{self, Substitution};

/// An argument value reflected at the Rust/compiled boundary.
///
/// Stands in for "reflecting an actual dynamic argument" the way
/// `arg_pytype` does in `original_source/fastpy.py`: a plain integer always
/// reflects as `Int64`, a plain float as `Float64`, and an array carries its
/// element kind directly rather than going through further inference.
#[derive(Debug, Clone, Copy)]
pub enum HostValue<'a> {
    I64(i64),
    F64(f64),
    Array(&'a fastpy_jit_runtime::array::ArrayDescriptor),
}

impl HostValue<'_> {
    fn reflect(&self) -> TypeTerm {
        match self {
            HostValue::I64(_) => TypeTerm::int64(),
            HostValue::F64(_) => TypeTerm::float64(),
            HostValue::Array(desc) => TypeTerm::array(element_type(desc.element_kind())),
        }
    }
}

fn element_type(kind: ElementKind) -> TypeTerm {
    match kind {
        ElementKind::I32 => TypeTerm::int32(),
        ElementKind::I64 => TypeTerm::int64(),
        ElementKind::F32 => TypeTerm::float32(),
        ElementKind::F64 => TypeTerm::float64(),
    }
}

fn abi_values<'a>(args: &'a [HostValue<'a>]) -> Vec<AbiValue<'a>> {
    args.iter()
        .map(|v| match v {
            HostValue::I64(i) => AbiValue::Scalar(Scalar::I64(*i)),
            HostValue::F64(f) => AbiValue::Scalar(Scalar::F64(*f)),
            HostValue::Array(desc) => AbiValue::Array(*desc),
        })
        .collect()
}

/// One fully-resolved result value handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostResult {
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl From<Scalar> for HostResult {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::I32(v) => HostResult::I64(i64::from(v)),
            Scalar::I64(v) => HostResult::I64(v),
            Scalar::F32(v) => HostResult::F64(f64::from(v)),
            Scalar::F64(v) => HostResult::F64(v),
            Scalar::Bool(v) => HostResult::Bool(v),
        }
    }
}

/// `(fname, argtys)` — the cache key, matching spec.md §4.4's
/// `mangler(ast.fname, argtys)` verbatim except keyed structurally rather
/// than by the mangled string (the string is still computed, for the
/// native symbol name, but isn't what the `HashMap` hashes on).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SpecKey {
    fname: String,
    argtys: Vec<TypeTerm>,
}

/// A cached specialization: the marshalling dispatcher plus the
/// `Codegen` that owns the `JITModule` backing it. The `JITModule` must
/// outlive every call through the dispatcher's code pointer (§5's ABI
/// ownership note), so it's kept here rather than dropped after
/// `compile` returns.
struct CacheEntry {
    dispatcher: Dispatcher,
    _codegen: Codegen,
}

// SAFETY: a `CacheEntry` is only ever reached through the cache's `Mutex`,
// so no two threads ever touch its `Codegen`/`Dispatcher` concurrently;
// the raw code pointer the `Dispatcher` closes over is a fixed address
// into the JIT module's own executable memory; no interior mutability is
// exposed past the lock.
unsafe impl Send for CacheEntry {}

static CACHE: Lazy<Mutex<HashMap<SpecKey, CacheEntry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// A function whose general (possibly polymorphic) type scheme has been
/// inferred once and is ready to be specialized against concrete call-site
/// argument types, any number of times, each call-site signature cached
/// independently.
#[derive(Debug)]
pub struct Specializable {
    typed: TypedFunction,
}

impl Specializable {
    pub fn new(typed: TypedFunction) -> Self {
        Specializable { typed }
    }

    pub fn name(&self) -> &str {
        &self.typed.name
    }

    /// Call this function with the given reflected arguments: specialize
    /// against their types (cache hit or fresh compile), then invoke.
    pub fn call(&self, args: &[HostValue]) -> Result<HostResult, FastpyError> {
        if args.len() != self.typed.param_types.len() {
            return Err(FastpyError::Arity {
                name: self.typed.name.clone(),
                expected: self.typed.param_types.len(),
                got: args.len(),
            });
        }

        let argtys: Vec<TypeTerm> = args.iter().map(HostValue::reflect).collect();
        let (retty, resolved_argtys, specializer) = self.specialize_types(&argtys)?;

        let key = SpecKey { fname: self.typed.name.clone(), argtys: resolved_argtys.clone() };

        {
            let cache = CACHE.lock().expect("specialization cache mutex poisoned");
            if let Some(entry) = cache.get(&key) {
                let abi_args = abi_values(args);
                return entry.dispatcher.call(&abi_args).map(HostResult::from);
            }
        }

        // Compile while holding the lock for the whole attempt, so two
        // threads racing on the same key can never both compile it (§5).
        let mut cache = CACHE.lock().expect("specialization cache mutex poisoned");
        if let Some(entry) = cache.get(&key) {
            let abi_args = abi_values(args);
            return entry.dispatcher.call(&abi_args).map(HostResult::from);
        }

        // `self.typed.body`'s node types still reflect the *general* scheme
        // (e.g. both of `add`'s params stay free variables, since general
        // inference alone never pins them to anything concrete) — rewrite a
        // cloned copy through this call's specializer before codegen ever
        // looks at a node's type to pick an opcode.
        let mut body = self.typed.body.clone();
        for node in &mut body {
            inference::apply_subst(node, &specializer);
        }

        let specialized = TypedFunction {
            name: self.typed.name.clone(),
            params: self.typed.params.clone(),
            param_types: resolved_argtys.clone(),
            return_type: retty,
            body,
        };

        let mut codegen = Codegen::new()?;
        let (_, code_ptr) = codegen.compile(&specialized)?;
        // SAFETY: `code_ptr` was just produced by `codegen` for exactly
        // this `param_types -> return_type` signature, and `codegen`
        // (holding the owning `JITModule`) is stored alongside the
        // dispatcher in the cache entry below, so it outlives every call.
        let dispatcher = unsafe {
            Dispatcher::new(code_ptr, &specialized.param_types, specialized.return_type.clone())?
        };

        let abi_args = abi_values(args);
        let result = dispatcher.call(&abi_args).map(HostResult::from);

        cache.insert(key, CacheEntry { dispatcher, _codegen: codegen });
        result
    }

    /// Unify the scheme's own (possibly free) signature against this
    /// call's concrete argument types, then require every resulting type
    /// to be fully concrete — §4.4's `determined` check.
    ///
    /// `self.typed`'s fields are already the result of one `solve` pass
    /// (inference's own mgu fully applied), so this unifier alone is the
    /// composed specializer the original's `compose(unifier, mgu)` builds —
    /// there is no separate `mgu` substitution left to fold in here. The
    /// returned substitution is also what the caller must push back through
    /// the function's *body* nodes (not just its signature) before codegen,
    /// since a node whose type still names a scheme-level free variable
    /// never got pinned to anything concrete by general inference alone.
    fn specialize_types(
        &self,
        argtys: &[TypeTerm],
    ) -> Result<(TypeTerm, Vec<TypeTerm>, Substitution), FastpyError> {
        let scheme = TypeTerm::Function(self.typed.param_types.clone(), Box::new(self.typed.return_type.clone()));
        let retvar = TypeTerm::Variable(format!("retty@{}", self.typed.name));
        let spec_ty = TypeTerm::Function(argtys.to_vec(), Box::new(retvar.clone()));

        let specializer = unify::solve(vec![(scheme, spec_ty)])?;

        let retty = specializer.apply(&retvar);
        let resolved_argtys: Vec<TypeTerm> = argtys.iter().map(|t| specializer.apply(t)).collect();

        if !retty.is_concrete() {
            return Err(FastpyError::Underdetermined(self.typed.name.clone(), retty));
        }
        for (ty, original) in resolved_argtys.iter().zip(argtys) {
            if !ty.is_concrete() {
                return Err(FastpyError::Underdetermined(self.typed.name.clone(), original.clone()));
            }
        }

        Ok((retty, resolved_argtys, specializer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inference, lowering, parser};

    fn compile_one(src: &str) -> Specializable {
        let module = parser::parse(src).unwrap();
        let lowered = lowering::lower(&module).unwrap();
        let typed = inference::infer(lowered).unwrap();
        Specializable::new(typed)
    }

    #[test]
    fn specializing_add_with_int_args_determines_everything() {
        let f = compile_one("def add(a, b):\n    return a + b\n");
        let result = f.call(&[HostValue::I64(2), HostValue::I64(3)]).unwrap();
        assert_eq!(result, HostResult::I64(5));
    }

    #[test]
    fn repeated_calls_with_same_argtys_hit_the_cache() {
        let f = compile_one("def add(a, b):\n    return a + b\n");
        let first = f.call(&[HostValue::I64(1), HostValue::I64(1)]).unwrap();
        let second = f.call(&[HostValue::I64(10), HostValue::I64(20)]).unwrap();
        assert_eq!(first, HostResult::I64(2));
        assert_eq!(second, HostResult::I64(30));
    }

    #[test]
    fn underdetermined_call_surfaces_as_error() {
        let f = compile_one("def f(x):\n    y = helper(x)\n    return y\n");
        let err = f.call(&[HostValue::I64(1)]).unwrap_err();
        assert!(matches!(err, FastpyError::Underdetermined(..)));
    }
}
