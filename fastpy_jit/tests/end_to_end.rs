//! End-to-end scenarios driving the full pipeline through the public
//! `fastpy_jit::compile` entry point: parse, lower, infer, specialize,
//! compile through Cranelift, and call through the native ABI bridge.

use fastpy_jit::{compile, FastpyError, HostResult, HostValue};
use fastpy_jit_runtime::array::{ArrayDescriptor, ElementKind};

#[test]
fn returns_an_integer_literal_with_no_arguments() {
    let f = compile("def a():\n    return 1\n").unwrap();
    assert_eq!(f.call(&[]).unwrap(), HostResult::I64(1));
}

#[test]
fn returns_a_float_literal_with_no_arguments() {
    let f = compile("def a():\n    return 1.0\n").unwrap();
    assert_eq!(f.call(&[]).unwrap(), HostResult::F64(1.0));
}

#[test]
fn adds_two_integers() {
    let f = compile("def add(x, y):\n    return x + y\n").unwrap();
    assert_eq!(f.call(&[HostValue::I64(2), HostValue::I64(3)]).unwrap(), HostResult::I64(5));
}

#[test]
fn the_same_source_specializes_independently_for_floats_and_ints() {
    // Proves scenarios 3 and 4 together: one `Specializable` serves both
    // `(Int64, Int64)` and `(Float64, Float64)` call sites from the same
    // cache with no cross-contamination between the two entries.
    let f = compile("def add(x, y):\n    return x + y\n").unwrap();
    let int_result = f.call(&[HostValue::I64(2), HostValue::I64(3)]).unwrap();
    let float_result = f.call(&[HostValue::F64(2.0), HostValue::F64(3.0)]).unwrap();
    assert_eq!(int_result, HostResult::I64(5));
    assert_eq!(float_result, HostResult::F64(5.0));
}

#[test]
fn sums_an_array_through_an_indexed_loop() {
    let f = compile(
        "def s(a):\n    n = 0\n    for i in range(10):\n        n += a[i]\n    return n\n",
    )
    .unwrap();
    let mut data: Vec<i32> = (0..10).collect();
    let mut shape = [0i32; 1];
    let desc = ArrayDescriptor::from_slice_mut(&mut data, ElementKind::I32, &mut shape);
    let result = f.call(&[HostValue::Array(&desc)]).unwrap();
    assert_eq!(result, HostResult::I64(45));
}

#[test]
fn a_return_value_reachable_only_through_an_unconstrained_call_is_underdetermined() {
    // The literal `def id(x): return x` scenario the property table describes
    // does not actually exercise this path here: this implementation's
    // Return/Assign constraints tie a bare `return x` to `x`'s own type
    // variable, so specializing against a concrete argument determines the
    // return type too. `helper(x)` is an `App` node, which inference never
    // constrains at all (see `crate::inference::visit`'s note on `App`), so
    // its result genuinely stays free. See DESIGN.md's Open Question log.
    let f = compile("def f(x):\n    y = helper(x)\n    return y\n").unwrap();
    let err = f.call(&[HostValue::I64(1)]).unwrap_err();
    assert!(matches!(err, FastpyError::Underdetermined(..)));
}

#[test]
fn cache_idempotence_repeated_calls_with_matching_argtys_reuse_one_specialization() {
    let f = compile("def add(x, y):\n    return x + y\n").unwrap();
    assert_eq!(f.call(&[HostValue::I64(1), HostValue::I64(1)]).unwrap(), HostResult::I64(2));
    assert_eq!(f.call(&[HostValue::I64(10), HostValue::I64(20)]).unwrap(), HostResult::I64(30));
    assert_eq!(f.call(&[HostValue::I64(100), HostValue::I64(200)]).unwrap(), HostResult::I64(300));
}

#[test]
fn wrong_arity_is_rejected_before_specialization_runs() {
    let f = compile("def add(x, y):\n    return x + y\n").unwrap();
    let err = f.call(&[HostValue::I64(1)]).unwrap_err();
    assert!(matches!(err, FastpyError::Arity { expected: 2, got: 1, .. }));
}

#[test]
fn rejects_text_outside_the_supported_grammar() {
    assert!(matches!(compile("x = 1\n"), Err(FastpyError::Parse { .. })));
}
