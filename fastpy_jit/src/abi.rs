//! The native C-ABI bridge between a specialized function's raw code
//! pointer and the [`HostValue`] arguments a caller supplies.
//!
//! Cranelift hands back a `*const u8`; calling through it safely needs a
//! concrete Rust function-pointer type to transmute to, and that type
//! depends on the specialized signature (how many parameters, scalar or
//! array, which scalar width). This keeps a bounded dispatch table of
//! native type combinations (§4.6) and rejects anything outside it with
//! [`FastpyError::UnsupportedAbiType`] — the same `get_typed_function`
//! `transmute_copy` idiom the teacher's Cranelift backend uses
//! (`aot::codegen::cranelift::CraneliftCodeGenerator::get_typed_function`),
//! generalized to a generic `invoke` helper so each dispatch-table entry is
//! one line picking a concrete `(Args..., Ret)` instantiation rather than
//! its own hand-written trampoline.

use fastpy_jit_runtime::array::ArrayDescriptor;

use crate::error::FastpyError;
use crate::types::TypeTerm;

/// A single scalar argument or result value crossing the ABI boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

/// One concrete value a caller passes in: either a scalar or a borrowed
/// array descriptor. Results are always scalar (§4.6: arrays only ever
/// flow in as arguments in this subset's grammar).
pub enum AbiValue<'a> {
    Scalar(Scalar),
    Array(&'a ArrayDescriptor),
}

/// `Dispatcher` closes over a raw code pointer and its resolved native
/// signature, exposing one safe entry point: `call`.
///
/// Building one validates that the signature is one of the supported
/// shapes up front, so every later `call` is just marshalling, never a
/// fresh feasibility check.
pub struct Dispatcher {
    call: Box<dyn Fn(&[AbiValue]) -> Result<Scalar, FastpyError>>,
    return_ty: TypeTerm,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("return_ty", &self.return_ty).finish()
    }
}

impl Dispatcher {
    /// Build a dispatcher for a specialized function's raw code pointer and
    /// resolved monomorphic signature.
    ///
    /// # Safety
    /// `code` must point at a function compiled for exactly `param_types ->
    /// return_ty`, using the System V calling convention Cranelift was
    /// configured with in [`crate::codegen::Codegen::new`], and must remain
    /// valid (and its owning `JITModule` alive) for as long as this
    /// `Dispatcher` is used.
    pub unsafe fn new(
        code: *const u8,
        param_types: &[TypeTerm],
        return_ty: TypeTerm,
    ) -> Result<Self, FastpyError> {
        let shapes: Vec<AbiKind> = param_types.iter().map(AbiKind::of).collect::<Result<_, _>>()?;
        let ret_kind = AbiKind::of(&return_ty)?;
        let call = build_dispatch(code, &shapes, ret_kind)?;
        Ok(Dispatcher { call, return_ty })
    }

    /// Invoke the compiled function, returning its scalar result.
    pub fn call(&self, args: &[AbiValue]) -> Result<Scalar, FastpyError> {
        (self.call)(args)
    }

    pub fn return_ty(&self) -> &TypeTerm {
        &self.return_ty
    }
}

/// The native parameter/return shape the dispatch table distinguishes:
/// which scalar width, or a borrowed array descriptor pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbiKind {
    I32,
    I64,
    F32,
    F64,
    Bool,
    ArrayPtr,
}

impl AbiKind {
    fn of(ty: &TypeTerm) -> Result<Self, FastpyError> {
        match ty {
            TypeTerm::Constant("Int32") => Ok(AbiKind::I32),
            TypeTerm::Constant("Int64") => Ok(AbiKind::I64),
            TypeTerm::Constant("Float32") => Ok(AbiKind::F32),
            TypeTerm::Constant("Float64") => Ok(AbiKind::F64),
            TypeTerm::Constant("Bool") => Ok(AbiKind::Bool),
            _ if ty.is_array() => Ok(AbiKind::ArrayPtr),
            other => Err(FastpyError::UnsupportedAbiType(format!("no ABI mapping for {other}"))),
        }
    }
}

/// Call through `code` as `extern "C" fn() -> R`, for any concrete `R` the
/// caller picks — the one generic trampoline every dispatch-table arity
/// below instantiates.
///
/// # Safety
/// `code` must point at a function whose actual compiled signature matches
/// the instantiated `R` exactly.
unsafe fn invoke0<R: Copy>(code: *const u8) -> R {
    let f: unsafe extern "C" fn() -> R = std::mem::transmute_copy(&code);
    f()
}

/// # Safety
/// As [`invoke0`], for one argument.
unsafe fn invoke1<A: Copy, R: Copy>(code: *const u8, a0: A) -> R {
    let f: unsafe extern "C" fn(A) -> R = std::mem::transmute_copy(&code);
    f(a0)
}

/// # Safety
/// As [`invoke0`], for two arguments.
unsafe fn invoke2<A: Copy, B: Copy, R: Copy>(code: *const u8, a0: A, a1: B) -> R {
    let f: unsafe extern "C" fn(A, B) -> R = std::mem::transmute_copy(&code);
    f(a0, a1)
}

/// # Safety
/// As [`invoke0`], for three arguments.
unsafe fn invoke3<A: Copy, B: Copy, C: Copy, R: Copy>(code: *const u8, a0: A, a1: B, a2: C) -> R {
    let f: unsafe extern "C" fn(A, B, C) -> R = std::mem::transmute_copy(&code);
    f(a0, a1, a2)
}

fn expect_scalar(value: &AbiValue) -> Result<Scalar, FastpyError> {
    match value {
        AbiValue::Scalar(s) => Ok(*s),
        AbiValue::Array(_) => Err(FastpyError::UnsupportedAbiType("expected a scalar argument, got an array".into())),
    }
}

fn expect_array<'a>(value: &'a AbiValue<'a>) -> Result<&'a ArrayDescriptor, FastpyError> {
    match value {
        AbiValue::Array(a) => Ok(a),
        AbiValue::Scalar(_) => Err(FastpyError::UnsupportedAbiType("expected an array argument, got a scalar".into())),
    }
}

fn as_i32(s: Scalar) -> Result<i32, FastpyError> {
    match s {
        Scalar::I32(v) => Ok(v),
        Scalar::I64(v) => Ok(v as i32),
        Scalar::Bool(v) => Ok(i32::from(v)),
        _ => Err(FastpyError::UnsupportedAbiType("expected an integer scalar".into())),
    }
}
fn as_i64(s: Scalar) -> Result<i64, FastpyError> {
    match s {
        Scalar::I32(v) => Ok(i64::from(v)),
        Scalar::I64(v) => Ok(v),
        Scalar::Bool(v) => Ok(i64::from(v)),
        _ => Err(FastpyError::UnsupportedAbiType("expected an integer scalar".into())),
    }
}
fn as_f32(s: Scalar) -> Result<f32, FastpyError> {
    match s {
        Scalar::F32(v) => Ok(v),
        Scalar::F64(v) => Ok(v as f32),
        _ => Err(FastpyError::UnsupportedAbiType("expected a float scalar".into())),
    }
}
fn as_f64(s: Scalar) -> Result<f64, FastpyError> {
    match s {
        Scalar::F32(v) => Ok(f64::from(v)),
        Scalar::F64(v) => Ok(v),
        _ => Err(FastpyError::UnsupportedAbiType("expected a float scalar".into())),
    }
}
fn as_i8_bool(s: Scalar) -> Result<i8, FastpyError> {
    match s {
        Scalar::Bool(v) => Ok(i8::from(v)),
        Scalar::I32(v) => Ok((v != 0) as i8),
        Scalar::I64(v) => Ok((v != 0) as i8),
        _ => Err(FastpyError::UnsupportedAbiType("expected a boolean scalar".into())),
    }
}

type BoxedDispatch = Box<dyn Fn(&[AbiValue]) -> Result<Scalar, FastpyError>>;

fn build_dispatch(code: *const u8, shapes: &[AbiKind], ret_kind: AbiKind) -> Result<BoxedDispatch, FastpyError> {
    match shapes.len() {
        0 => dispatch0(code, ret_kind),
        1 => dispatch1(code, shapes[0], ret_kind),
        2 => dispatch2(code, shapes[0], shapes[1], ret_kind),
        3 => dispatch3(code, shapes[0], shapes[1], shapes[2], ret_kind),
        n => Err(FastpyError::UnsupportedAbiType(format!("unsupported arity {n}"))),
    }
}

fn dispatch0(code: *const u8, ret_kind: AbiKind) -> Result<BoxedDispatch, FastpyError> {
    match ret_kind {
        AbiKind::I32 => Ok(Box::new(move |_| Ok(Scalar::I32(unsafe { invoke0::<i32>(code) })))),
        AbiKind::I64 => Ok(Box::new(move |_| Ok(Scalar::I64(unsafe { invoke0::<i64>(code) })))),
        AbiKind::F32 => Ok(Box::new(move |_| Ok(Scalar::F32(unsafe { invoke0::<f32>(code) })))),
        AbiKind::F64 => Ok(Box::new(move |_| Ok(Scalar::F64(unsafe { invoke0::<f64>(code) })))),
        AbiKind::Bool => Ok(Box::new(move |_| Ok(Scalar::Bool(unsafe { invoke0::<i8>(code) } != 0)))),
        AbiKind::ArrayPtr => Err(FastpyError::UnsupportedAbiType("array-typed return values are unsupported".into())),
    }
}

/// Builds the `(marshal, invoke, wrap)` pipeline for one argument kind,
/// deferring only the final invocation to the per-return-kind closure
/// `k` — so `dispatch1` needs one match per argument kind, not one per
/// `(argument kind, return kind)` pair.
fn dispatch1(code: *const u8, p0: AbiKind, ret_kind: AbiKind) -> Result<BoxedDispatch, FastpyError> {
    macro_rules! arm {
        ($arg_ty:ty, $marshal:expr) => {
            Ok(Box::new(move |args: &[AbiValue]| -> Result<Scalar, FastpyError> {
                if args.len() != 1 {
                    return Err(FastpyError::Arity { name: "<specialized>".into(), expected: 1, got: args.len() });
                }
                let a0: $arg_ty = $marshal(&args[0])?;
                call_ret1::<$arg_ty>(code, a0, ret_kind)
            }))
        };
    }
    match p0 {
        AbiKind::ArrayPtr => arm!(*const ArrayDescriptor, |v: &AbiValue| -> Result<_, FastpyError> {
            Ok(expect_array(v)? as *const ArrayDescriptor)
        }),
        AbiKind::I32 => arm!(i32, |v: &AbiValue| as_i32(expect_scalar(v)?)),
        AbiKind::I64 => arm!(i64, |v: &AbiValue| as_i64(expect_scalar(v)?)),
        AbiKind::F32 => arm!(f32, |v: &AbiValue| as_f32(expect_scalar(v)?)),
        AbiKind::F64 => arm!(f64, |v: &AbiValue| as_f64(expect_scalar(v)?)),
        AbiKind::Bool => arm!(i8, |v: &AbiValue| as_i8_bool(expect_scalar(v)?)),
    }
}

fn call_ret1<A: Copy>(code: *const u8, a0: A, ret_kind: AbiKind) -> Result<Scalar, FastpyError> {
    match ret_kind {
        AbiKind::I32 => Ok(Scalar::I32(unsafe { invoke1::<A, i32>(code, a0) })),
        AbiKind::I64 => Ok(Scalar::I64(unsafe { invoke1::<A, i64>(code, a0) })),
        AbiKind::F32 => Ok(Scalar::F32(unsafe { invoke1::<A, f32>(code, a0) })),
        AbiKind::F64 => Ok(Scalar::F64(unsafe { invoke1::<A, f64>(code, a0) })),
        AbiKind::Bool => Ok(Scalar::Bool(unsafe { invoke1::<A, i8>(code, a0) } != 0)),
        AbiKind::ArrayPtr => Err(FastpyError::UnsupportedAbiType("array-typed return values are unsupported".into())),
    }
}

fn dispatch2(code: *const u8, p0: AbiKind, p1: AbiKind, ret_kind: AbiKind) -> Result<BoxedDispatch, FastpyError> {
    macro_rules! arm {
        ($a0_ty:ty, $a0:expr, $a1_ty:ty, $a1:expr) => {
            Ok(Box::new(move |args: &[AbiValue]| -> Result<Scalar, FastpyError> {
                if args.len() != 2 {
                    return Err(FastpyError::Arity { name: "<specialized>".into(), expected: 2, got: args.len() });
                }
                let a0: $a0_ty = $a0(&args[0])?;
                let a1: $a1_ty = $a1(&args[1])?;
                call_ret2::<$a0_ty, $a1_ty>(code, a0, a1, ret_kind)
            }))
        };
    }
    match (p0, p1) {
        (AbiKind::ArrayPtr, _) | (_, AbiKind::ArrayPtr) => {
            Err(FastpyError::UnsupportedAbiType("two-argument array shapes are unsupported".into()))
        }
        (AbiKind::F32, AbiKind::F32) => {
            arm!(f32, |v: &AbiValue| as_f32(expect_scalar(v)?), f32, |v: &AbiValue| as_f32(expect_scalar(v)?))
        }
        (AbiKind::F64, AbiKind::F64) | (AbiKind::F32, AbiKind::F64) | (AbiKind::F64, AbiKind::F32) => {
            arm!(f64, |v: &AbiValue| as_f64(expect_scalar(v)?), f64, |v: &AbiValue| as_f64(expect_scalar(v)?))
        }
        _ => arm!(i64, |v: &AbiValue| as_i64(expect_scalar(v)?), i64, |v: &AbiValue| as_i64(expect_scalar(v)?)),
    }
}

fn call_ret2<A: Copy, B: Copy>(code: *const u8, a0: A, a1: B, ret_kind: AbiKind) -> Result<Scalar, FastpyError> {
    match ret_kind {
        AbiKind::I32 => Ok(Scalar::I32(unsafe { invoke2::<A, B, i32>(code, a0, a1) })),
        AbiKind::I64 => Ok(Scalar::I64(unsafe { invoke2::<A, B, i64>(code, a0, a1) })),
        AbiKind::F32 => Ok(Scalar::F32(unsafe { invoke2::<A, B, f32>(code, a0, a1) })),
        AbiKind::F64 => Ok(Scalar::F64(unsafe { invoke2::<A, B, f64>(code, a0, a1) })),
        AbiKind::Bool => Ok(Scalar::Bool(unsafe { invoke2::<A, B, i8>(code, a0, a1) } != 0)),
        AbiKind::ArrayPtr => Err(FastpyError::UnsupportedAbiType("array-typed return values are unsupported".into())),
    }
}

/// Three-argument shapes this subset's grammar produces: one leading array
/// parameter plus up to two integer scalars (e.g. a bounds-checked
/// reduction taking an array, a start index, and an end index), or three
/// plain scalars of the same family. Anything else is rejected.
fn dispatch3(
    code: *const u8,
    p0: AbiKind,
    p1: AbiKind,
    p2: AbiKind,
    ret_kind: AbiKind,
) -> Result<BoxedDispatch, FastpyError> {
    macro_rules! arm {
        ($a0_ty:ty, $a0:expr, $a1_ty:ty, $a1:expr, $a2_ty:ty, $a2:expr) => {
            Ok(Box::new(move |args: &[AbiValue]| -> Result<Scalar, FastpyError> {
                if args.len() != 3 {
                    return Err(FastpyError::Arity { name: "<specialized>".into(), expected: 3, got: args.len() });
                }
                let a0: $a0_ty = $a0(&args[0])?;
                let a1: $a1_ty = $a1(&args[1])?;
                let a2: $a2_ty = $a2(&args[2])?;
                call_ret3::<$a0_ty, $a1_ty, $a2_ty>(code, a0, a1, a2, ret_kind)
            }))
        };
    }
    match (p0, p1, p2) {
        (AbiKind::ArrayPtr, AbiKind::I32 | AbiKind::I64, AbiKind::I32 | AbiKind::I64) => arm!(
            *const ArrayDescriptor,
            |v: &AbiValue| -> Result<_, FastpyError> { Ok(expect_array(v)? as *const ArrayDescriptor) },
            i64,
            |v: &AbiValue| as_i64(expect_scalar(v)?),
            i64,
            |v: &AbiValue| as_i64(expect_scalar(v)?)
        ),
        (AbiKind::F64, AbiKind::F64, AbiKind::F64) => {
            arm!(
                f64,
                |v: &AbiValue| as_f64(expect_scalar(v)?),
                f64,
                |v: &AbiValue| as_f64(expect_scalar(v)?),
                f64,
                |v: &AbiValue| as_f64(expect_scalar(v)?)
            )
        }
        (AbiKind::ArrayPtr, _, _) | (_, AbiKind::ArrayPtr, _) | (_, _, AbiKind::ArrayPtr) => {
            Err(FastpyError::UnsupportedAbiType("unsupported three-argument array shape".into()))
        }
        _ => arm!(
            i64,
            |v: &AbiValue| as_i64(expect_scalar(v)?),
            i64,
            |v: &AbiValue| as_i64(expect_scalar(v)?),
            i64,
            |v: &AbiValue| as_i64(expect_scalar(v)?)
        ),
    }
}

fn call_ret3<A: Copy, B: Copy, C: Copy>(
    code: *const u8,
    a0: A,
    a1: B,
    a2: C,
    ret_kind: AbiKind,
) -> Result<Scalar, FastpyError> {
    match ret_kind {
        AbiKind::I32 => Ok(Scalar::I32(unsafe { invoke3::<A, B, C, i32>(code, a0, a1, a2) })),
        AbiKind::I64 => Ok(Scalar::I64(unsafe { invoke3::<A, B, C, i64>(code, a0, a1, a2) })),
        AbiKind::F32 => Ok(Scalar::F32(unsafe { invoke3::<A, B, C, f32>(code, a0, a1, a2) })),
        AbiKind::F64 => Ok(Scalar::F64(unsafe { invoke3::<A, B, C, f64>(code, a0, a1, a2) })),
        AbiKind::Bool => Ok(Scalar::Bool(unsafe { invoke3::<A, B, C, i8>(code, a0, a1, a2) } != 0)),
        AbiKind::ArrayPtr => Err(FastpyError::UnsupportedAbiType("array-typed return values are unsupported".into())),
    }
}
