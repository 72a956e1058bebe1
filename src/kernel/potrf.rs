use equator::debug_assert;

use super::{gemm_nt, Operand, OperandMut, Packed, PANEL_HEIGHT};

/// Factors one diagonal panel.
///
/// Computes `X = C - A * A^T` over the lower part of the `M x 4` panel, where `A` holds the
/// `kmax` already factored columns of the same rows, then factors the leading 4 columns of `X`
/// in place: the top `4 x 4` block becomes lower triangular with `X = L * L^T`, and rows below
/// it are scaled by `L^-T`. The result goes to the lower part of `D`, and the reciprocals of the
/// diagonal entries go to `inv_diag[0..n1]`.
///
/// A pivot that is not strictly positive produces a zero diagonal entry and a zero reciprocal,
/// which zeroes the rest of the column.
///
/// Only rows `< m1` and columns `< n1` are touched.
///
/// # Safety
/// `a` must hold `min(m1, M)` rows of `kmax` columns, `c` and `d` must be valid on the clipped
/// lower part, and `inv_diag` must be writable for `min(n1, 4)` elements.
pub unsafe fn potrf_nt_l<const M: usize, C: Operand, D: OperandMut>(
    kmax: usize,
    a: Packed,
    c: C,
    d: D,
    inv_diag: *mut f32,
    m1: usize,
    n1: usize,
) {
    debug_assert!(all(M % PANEL_HEIGHT == 0, m1 > 0, n1 > 0));

    let m1 = m1.min(M);
    let n1 = n1.min(PANEL_HEIGHT).min(m1);

    let mut acc = gemm_nt::<M, _>(kmax, a, a, m1, n1);
    for j in 0..n1 {
        for i in j..m1 {
            acc[i][j] = c.read(i, j) - acc[i][j];
        }
    }

    for j in 0..n1 {
        let pivot = acc[j][j];
        let (l_jj, inv) = if pivot > 0.0 {
            let l_jj = pivot.sqrt();
            (l_jj, 1.0 / l_jj)
        } else {
            (0.0, 0.0)
        };
        acc[j][j] = l_jj;
        *inv_diag.add(j) = inv;

        for row in &mut acc[j + 1..m1] {
            row[j] *= inv;
        }
        for k in j + 1..n1 {
            let l_kj = acc[k][j];
            for row in &mut acc[k..m1] {
                row[k] -= row[j] * l_kj;
            }
        }
    }

    for j in 0..n1 {
        for (i, row) in acc.iter().enumerate().take(m1).skip(j) {
            d.write(i, j, row[j]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ColMajorMut;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn factor_4x4() {
        // L = [2 0 0 0; 1 3 0 0; 0 2 1 0; 1 1 1 1], column-major C = L * L^T
        let l = [
            [2.0f32, 0.0, 0.0, 0.0],
            [1.0, 3.0, 0.0, 0.0],
            [0.0, 2.0, 1.0, 0.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        let mut c = vec![0.0f32; 16];
        for i in 0..4 {
            for j in 0..4 {
                c[i + 4 * j] = (0..4).map(|k| l[i][k] * l[j][k]).sum();
            }
        }
        let mut inv = [0.0f32; 4];
        let view = ColMajorMut::new(c.as_mut_ptr(), 4);
        unsafe {
            potrf_nt_l::<4, _, _>(
                0,
                Packed::new(core::ptr::null_mut(), 0),
                view,
                view,
                inv.as_mut_ptr(),
                4,
                4,
            );
        }
        for i in 0..4 {
            for j in 0..=i {
                assert_approx_eq!(c[i + 4 * j], l[i][j], 1e-5);
            }
            assert_approx_eq!(inv[i], 1.0 / l[i][i], 1e-5);
        }
    }

    #[test]
    fn non_positive_pivot_zeroes_column() {
        let mut c = vec![
            -1.0f32, 2.0, 0.0, 0.0, //
            2.0, 4.0, 0.0, 0.0, //
            0.0, 0.0, 9.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let mut inv = [1.0f32; 4];
        let view = ColMajorMut::new(c.as_mut_ptr(), 4);
        unsafe {
            potrf_nt_l::<4, _, _>(
                0,
                Packed::new(core::ptr::null_mut(), 0),
                view,
                view,
                inv.as_mut_ptr(),
                4,
                4,
            );
        }
        assert_eq!(c[0], 0.0);
        assert_eq!(c[1], 0.0);
        assert_eq!(inv[0], 0.0);
        assert_approx_eq!(c[5], 2.0, 1e-6);
        assert_approx_eq!(c[10], 3.0, 1e-6);
        assert_approx_eq!(inv[3], 1.0, 1e-6);
    }

    #[test]
    fn clipped_panel_leaves_rest_untouched() {
        let mut c = vec![f32::NAN; 64];
        c[0] = 4.0;
        c[1] = 2.0;
        c[17] = 5.0;
        let mut inv = [f32::NAN; 4];
        let view = ColMajorMut::new(c.as_mut_ptr(), 16);
        unsafe {
            potrf_nt_l::<8, _, _>(
                0,
                Packed::new(core::ptr::null_mut(), 0),
                view,
                view,
                inv.as_mut_ptr(),
                2,
                2,
            );
        }
        assert_approx_eq!(c[0], 2.0, 1e-6);
        assert_approx_eq!(c[1], 1.0, 1e-6);
        assert_approx_eq!(c[17], 2.0, 1e-6);
        assert!(c[2].is_nan());
        assert!(c[16].is_nan());
        assert!(inv[2].is_nan());
    }
}
