//! The ABI boundary between a compiled function and its Rust caller.
//!
//! A compiled function that takes or returns an array never copies it: the
//! caller hands over a raw, caller-owned buffer described by an
//! [`ArrayDescriptor`], and the generated code reads/writes through it
//! directly. The descriptor's layout is part of the native calling
//! convention (see the ABI bridge), so it is `#[repr(C)]` and must not
//! change shape without also changing the codegen side that builds it.

// SAFETY: all i32 <-> usize casts below are guarded by `dims`/`shape` having
// been constructed from a `usize` length that was accepted by `from_slice_mut`.
#![allow(clippy::cast_sign_loss)]

use crate::error::{RuntimeError, RuntimeResult};

/// Element kind carried alongside a raw array pointer.
///
/// This mirrors the four scalar kinds the type system supports (§3's
/// `Type` constants) plus the one array element kind the ABI bridge
/// recognizes; it is not a general dtype system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// 32-bit signed integer elements.
    I32,
    /// 64-bit signed integer elements.
    I64,
    /// 32-bit float elements.
    F32,
    /// 64-bit float elements.
    F64,
}

impl ElementKind {
    /// Size in bytes of one element of this kind.
    pub fn byte_size(self) -> usize {
        match self {
            ElementKind::I32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::F64 => 8,
        }
    }
}

/// The `#[repr(C)]` struct a compiled function receives for every array
/// argument and returns for every array result.
///
/// Exactly three fields, in this order, because generated Cranelift code
/// indexes into it by byte offset (`data` at offset 0, `dims` at offset 8,
/// `shape` at offset 16 on a 64-bit target — the 4 bytes after `dims` are
/// alignment padding, since a `*mut i32` needs 8-byte alignment): changing
/// the field order or adding fields requires updating the codegen side in
/// lockstep.
#[repr(C)]
#[derive(Debug)]
pub struct ArrayDescriptor {
    /// Pointer to the first element. Caller-owned: must outlive every call
    /// that receives this descriptor.
    pub data: *mut u8,
    /// Number of dimensions (currently always 1; multi-dimensional arrays
    /// are out of scope).
    pub dims: i32,
    /// Pointer to `dims` `i32` extents, one per dimension.
    pub shape: *mut i32,
    element: ElementKind,
    len: usize,
}

impl ArrayDescriptor {
    /// Build a descriptor over a caller-owned mutable slice.
    ///
    /// # Safety
    /// The returned descriptor borrows `data` and `shape` for as long as it
    /// is in use by compiled code; the caller must keep both alive and must
    /// not alias them mutably elsewhere for that duration.
    pub unsafe fn new(data: *mut u8, element: ElementKind, len: usize, shape: *mut i32) -> Self {
        ArrayDescriptor {
            data,
            dims: 1,
            shape,
            element,
            len,
        }
    }

    /// Build a one-dimensional descriptor directly over a Rust slice.
    ///
    /// `shape` must be kept alive by the caller for as long as the
    /// descriptor is; this constructor does not allocate one, since the
    /// descriptor only stores a pointer to it.
    pub fn from_slice_mut<T>(data: &mut [T], element: ElementKind, shape: &mut [i32; 1]) -> Self {
        shape[0] = data.len() as i32;
        ArrayDescriptor {
            data: data.as_mut_ptr().cast(),
            dims: 1,
            shape: shape.as_mut_ptr(),
            element,
            len: data.len(),
        }
    }

    /// Element kind this descriptor was constructed with.
    pub fn element_kind(&self) -> ElementKind {
        self.element
    }

    /// Number of elements (product of `shape`, which for `dims == 1` is
    /// `shape[0]`).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the backing buffer as `&[i32]`.
    ///
    /// # Safety
    /// `data` must actually point at `len` initialized `i32` values and
    /// `element_kind()` must be `ElementKind::I32`.
    pub unsafe fn as_i32_slice(&self) -> RuntimeResult<&[i32]> {
        self.check_kind(ElementKind::I32)?;
        Ok(std::slice::from_raw_parts(self.data.cast(), self.len))
    }

    /// View the backing buffer as `&[i64]`.
    ///
    /// # Safety
    /// `data` must actually point at `len` initialized `i64` values and
    /// `element_kind()` must be `ElementKind::I64`.
    pub unsafe fn as_i64_slice(&self) -> RuntimeResult<&[i64]> {
        self.check_kind(ElementKind::I64)?;
        Ok(std::slice::from_raw_parts(self.data.cast(), self.len))
    }

    /// View the backing buffer as `&[f32]`.
    ///
    /// # Safety
    /// `data` must actually point at `len` initialized `f32` values and
    /// `element_kind()` must be `ElementKind::F32`.
    pub unsafe fn as_f32_slice(&self) -> RuntimeResult<&[f32]> {
        self.check_kind(ElementKind::F32)?;
        Ok(std::slice::from_raw_parts(self.data.cast(), self.len))
    }

    /// View the backing buffer as `&[f64]`.
    ///
    /// # Safety
    /// `data` must actually point at `len` initialized `f64` values and
    /// `element_kind()` must be `ElementKind::F64`.
    pub unsafe fn as_f64_slice(&self) -> RuntimeResult<&[f64]> {
        self.check_kind(ElementKind::F64)?;
        Ok(std::slice::from_raw_parts(self.data.cast(), self.len))
    }

    fn check_kind(&self, want: ElementKind) -> RuntimeResult<()> {
        if self.element != want {
            return Err(RuntimeError::shape_mismatch(format!(
                "expected element kind {want:?}, descriptor holds {:?}",
                self.element
            )));
        }
        Ok(())
    }

    /// Bounds-check `index` against `len`, for callers that want a checked
    /// lookup instead of raw slice access.
    pub fn check_index(&self, index: usize) -> RuntimeResult<()> {
        if index >= self.len {
            return Err(RuntimeError::bounds_error(index, self.len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_mut_records_length_and_kind() {
        let mut data = [1i32, 2, 3, 4];
        let mut shape = [0i32; 1];
        let desc = ArrayDescriptor::from_slice_mut(&mut data, ElementKind::I32, &mut shape);
        assert_eq!(desc.len(), 4);
        assert_eq!(desc.element_kind(), ElementKind::I32);
        assert_eq!(shape[0], 4);
    }

    #[test]
    fn as_i32_slice_roundtrips() {
        let mut data = [10i32, 20, 30];
        let mut shape = [0i32; 1];
        let desc = ArrayDescriptor::from_slice_mut(&mut data, ElementKind::I32, &mut shape);
        let view = unsafe { desc.as_i32_slice() }.unwrap();
        assert_eq!(view, &[10, 20, 30]);
    }

    #[test]
    fn as_i32_slice_rejects_wrong_kind() {
        let mut data = [1.0f64, 2.0];
        let mut shape = [0i32; 1];
        let desc = ArrayDescriptor::from_slice_mut(&mut data, ElementKind::F64, &mut shape);
        assert!(unsafe { desc.as_i32_slice() }.is_err());
    }

    #[test]
    fn check_index_rejects_out_of_range() {
        let mut data = [1i32, 2, 3];
        let mut shape = [0i32; 1];
        let desc = ArrayDescriptor::from_slice_mut(&mut data, ElementKind::I32, &mut shape);
        assert!(desc.check_index(2).is_ok());
        assert!(desc.check_index(3).is_err());
    }
}
