//! Unblocked Cholesky factorizations, one column at a time.
//!
//! These follow the same conventions as the blocked routines, including the zeroed column on a
//! non-positive pivot, and serve as ground truth for them.

use equator::assert;

use crate::{CholeskyError, SMat};

/// Unblocked counterpart of [`crate::spotrf_l`].
#[track_caller]
pub fn potrf_l(
    m: usize,
    c: &SMat,
    ci: usize,
    cj: usize,
    d: &mut SMat,
    di: usize,
    dj: usize,
) -> Result<(), CholeskyError> {
    potrf_l_mn(m, m, c, ci, cj, d, di, dj)
}

/// Unblocked counterpart of [`crate::spotrf_l_mn`].
#[track_caller]
#[allow(clippy::too_many_arguments)]
pub fn potrf_l_mn(
    m: usize,
    n: usize,
    c: &SMat,
    ci: usize,
    cj: usize,
    d: &mut SMat,
    di: usize,
    dj: usize,
) -> Result<(), CholeskyError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    assert!(all(
        n <= m,
        ci + m <= c.nrows(),
        cj + n <= c.ncols(),
        di + m <= d.nrows(),
        dj + n <= d.ncols()
    ));

    let mut first_failure = None;
    for j in 0..n {
        let mut pivot = c.read(ci + j, cj + j);
        for k in 0..j {
            let l_jk = d.read(di + j, dj + k);
            pivot -= l_jk * l_jk;
        }
        let (l_jj, inv) = if pivot > 0.0 {
            let l_jj = pivot.sqrt();
            (l_jj, 1.0 / l_jj)
        } else {
            first_failure = first_failure.or(Some(j));
            (0.0, 0.0)
        };
        d.write(di + j, dj + j, l_jj);

        for i in j + 1..m {
            let mut x = c.read(ci + i, cj + j);
            for k in 0..j {
                x -= d.read(di + i, dj + k) * d.read(di + j, dj + k);
            }
            d.write(di + i, dj + j, x * inv);
        }
    }

    match first_failure {
        None => Ok(()),
        Some(index) => Err(CholeskyError::NonPositivePivot { index }),
    }
}

/// Unblocked counterpart of [`crate::spotrf_u`].
#[track_caller]
pub fn potrf_u(
    m: usize,
    c: &SMat,
    ci: usize,
    cj: usize,
    d: &mut SMat,
    di: usize,
    dj: usize,
) -> Result<(), CholeskyError> {
    if m == 0 {
        return Ok(());
    }
    assert!(all(
        ci + m <= c.nrows(),
        cj + m <= c.ncols(),
        di + m <= d.nrows(),
        dj + m <= d.ncols()
    ));

    let mut first_failure = None;
    for j in 0..m {
        let mut pivot = c.read(ci + j, cj + j);
        for k in 0..j {
            let u_kj = d.read(di + k, dj + j);
            pivot -= u_kj * u_kj;
        }
        let (u_jj, inv) = if pivot > 0.0 {
            let u_jj = pivot.sqrt();
            (u_jj, 1.0 / u_jj)
        } else {
            first_failure = first_failure.or(Some(j));
            (0.0, 0.0)
        };
        d.write(di + j, dj + j, u_jj);

        for i in j + 1..m {
            let mut x = c.read(ci + j, cj + i);
            for k in 0..j {
                x -= d.read(di + k, dj + j) * d.read(di + k, dj + i);
            }
            d.write(di + j, dj + i, x * inv);
        }
    }

    match first_failure {
        None => Ok(()),
        Some(index) => Err(CholeskyError::NonPositivePivot { index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equator::assert;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn small_factors() {
        let c = SMat::from_col_major(2, 2, vec![2.0, 1.0, 1.0, 2.0]);
        let mut l = SMat::zeros(2, 2);
        potrf_l(2, &c, 0, 0, &mut l, 0, 0).unwrap();
        assert_approx_eq!(l.read(0, 0), 2.0f32.sqrt(), 1e-6);
        assert_approx_eq!(l.read(1, 0), 1.0 / 2.0f32.sqrt(), 1e-6);
        assert_approx_eq!(l.read(1, 1), 1.5f32.sqrt(), 1e-6);
        assert_eq!(l.read(0, 1), 0.0);

        let mut u = SMat::zeros(2, 2);
        potrf_u(2, &c, 0, 0, &mut u, 0, 0).unwrap();
        assert_eq!(u.transpose(), l);
    }

    #[test]
    fn reports_first_failure() {
        let mut c = SMat::identity(4);
        c.write(2, 2, -1.0);
        c.write(3, 3, 0.0);
        let mut d = SMat::zeros(4, 4);
        assert_eq!(
            potrf_l(4, &c, 0, 0, &mut d, 0, 0),
            Err(CholeskyError::NonPositivePivot { index: 2 })
        );
        assert_eq!(d.read(2, 2), 0.0);
        assert_eq!(d.read(1, 1), 1.0);
    }
}
