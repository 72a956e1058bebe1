//! Copies between column-major storage and packed row-panels.
//!
//! Every routine moves `m1` packed rows by `kn` packed columns.

use super::{ColMajor, ColMajorMut, Operand, OperandMut, Packed};

/// `dst(i, j) = src(i, j)`.
///
/// # Safety
/// Both operands must be valid on the `m1 x kn` block.
#[inline]
pub unsafe fn pack_nn(m1: usize, kn: usize, src: ColMajor, dst: Packed) {
    for j in 0..kn {
        for i in 0..m1 {
            dst.write(i, j, src.read(i, j));
        }
    }
}

/// `dst(i, j) = src(j, i)`.
///
/// # Safety
/// `dst` must be valid on the `m1 x kn` block and `src` on the transposed `kn x m1` block.
#[inline]
pub unsafe fn pack_tn(m1: usize, kn: usize, src: ColMajor, dst: Packed) {
    let src = src.transpose();
    for j in 0..kn {
        for i in 0..m1 {
            dst.write(i, j, src.read(i, j));
        }
    }
}

/// `dst(j, i) = src(i, j)`.
///
/// # Safety
/// `src` must be valid on the `m1 x kn` block and `dst` on the transposed `kn x m1` block.
#[inline]
pub unsafe fn unpack_nt(m1: usize, kn: usize, src: Packed, dst: ColMajorMut) {
    for i in 0..m1 {
        for j in 0..kn {
            dst.write(j, i, src.read(i, j));
        }
    }
}

/// `dst(j, i) = src(i, j)` for `j <= i` only, so the strictly lower part of the transposed
/// destination block is left untouched.
///
/// # Safety
/// Same as [`unpack_nt`].
#[inline]
pub unsafe fn unpack_nt_upper(m1: usize, kn: usize, src: Packed, dst: ColMajorMut) {
    for i in 0..m1 {
        for j in 0..kn.min(i + 1) {
            dst.write(j, i, src.read(i, j));
        }
    }
}
