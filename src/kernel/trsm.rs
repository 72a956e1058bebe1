use equator::debug_assert;

use super::{gemm_nt, Operand, OperandMut, Packed, PANEL_HEIGHT};

/// Solves one off-diagonal panel against a factored diagonal block.
///
/// Computes `X = beta * C - A * B^T`, where `A` is `M x kmax` and `B` is `4 x kmax`, then
/// solves `D * E^T = X` for `D`, with `E` the `4 x 4` lower triangular factor of the diagonal
/// block whose reciprocal diagonal is given by `inv_diag_e`. The diagonal of `E` itself is
/// never read.
///
/// Only rows `< m1` and columns `< n1` are touched. `C` and `D` may refer to the same storage.
///
/// # Safety
/// `a` must hold `min(m1, M)` rows and `b` must hold `min(n1, 4)` rows of `kmax` columns,
/// `c` and `d` must be valid on the clipped block, and `e` and `inv_diag_e` must be readable on
/// the leading `min(n1, 4)` rows and columns.
#[allow(clippy::too_many_arguments)]
pub unsafe fn trsm_nt_rl_inv<const M: usize, B: Operand, C: Operand, D: OperandMut, E: Operand>(
    kmax: usize,
    a: Packed,
    b: B,
    beta: f32,
    c: C,
    d: D,
    e: E,
    inv_diag_e: *const f32,
    m1: usize,
    n1: usize,
) {
    debug_assert!(all(M % PANEL_HEIGHT == 0, m1 > 0, n1 > 0));

    let m1 = m1.min(M);
    let n1 = n1.min(PANEL_HEIGHT);

    let mut acc = gemm_nt::<M, _>(kmax, a, b, m1, n1);
    for (i, row) in acc.iter_mut().enumerate().take(m1) {
        for (j, x) in row.iter_mut().enumerate().take(n1) {
            *x = beta * c.read(i, j) - *x;
        }
    }

    for j in 0..n1 {
        for l in 0..j {
            let e_jl = e.read(j, l);
            for row in &mut acc[..m1] {
                row[j] -= row[l] * e_jl;
            }
        }
        let inv = *inv_diag_e.add(j);
        for row in &mut acc[..m1] {
            row[j] *= inv;
        }
    }

    for (i, row) in acc.iter().enumerate().take(m1) {
        for (j, &x) in row.iter().enumerate().take(n1) {
            d.write(i, j, x);
        }
    }
}
