//! Blocked Cholesky factorization of symmetric positive definite matrices.
//!
//! The factorization proceeds by panels whose height matches the active [`KernelSet`]. Each
//! panel first solves against every diagonal block factored so far, then factors its own
//! diagonal block. A matrix whose order is not a multiple of the panel height ends with a single
//! narrower panel, processed by the kernel set of the smallest sufficient height with clipped
//! sizes.
//!
//! Source and destination may be distinct matrices or, through the `_in_place` variants, the same
//! one. Only the requested triangle of the destination block is written.

mod lower;
mod upper;

use equator::assert;

use crate::kernel::{set::get_kernel_set, ColMajor, ColMajorMut, KernelSet, Panel12, Panel4, Panel8};
use crate::SMat;

/// Error in the Cholesky factorization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CholeskyError {
    /// The pivot of column `index` was not strictly positive. The factor is still fully computed,
    /// with that column set to zero.
    NonPositivePivot { index: usize },
}

impl core::fmt::Display for CholeskyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

impl core::error::Error for CholeskyError {}

/// Kind of the next row-panel, given the rows left.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PanelStep {
    Full,
    Tail12,
    Tail8,
    Tail4,
}

impl PanelStep {
    #[inline]
    pub(crate) fn select(width: usize, remaining: usize) -> Self {
        if remaining >= width {
            PanelStep::Full
        } else if remaining <= 4 {
            PanelStep::Tail4
        } else if remaining <= 8 {
            PanelStep::Tail8
        } else {
            PanelStep::Tail12
        }
    }
}

/// Reports the first column whose reciprocal pivot was zeroed by the kernels.
fn check_pivots(inv_diag: &[f32]) -> Result<(), CholeskyError> {
    match inv_diag.iter().position(|&inv| !(inv > 0.0)) {
        None => Ok(()),
        Some(index) => {
            log::debug!(target: "panel_potrf", "non positive pivot at column {index}");
            Err(CholeskyError::NonPositivePivot { index })
        }
    }
}

impl KernelSet {
    unsafe fn lower_unchecked(
        self,
        m: usize,
        n: usize,
        c: ColMajor,
        d: ColMajorMut,
    ) -> Result<(), CholeskyError> {
        match self {
            KernelSet::Panel4 => lower::potrf_l_mn::<Panel4>(m, n, c, d),
            KernelSet::Panel8 => lower::potrf_l_mn::<Panel8>(m, n, c, d),
            KernelSet::Panel12 => lower::potrf_l_mn::<Panel12>(m, n, c, d),
        }
    }

    unsafe fn upper_unchecked(
        self,
        m: usize,
        c: ColMajor,
        d: ColMajorMut,
    ) -> Result<(), CholeskyError> {
        match self {
            KernelSet::Panel4 => upper::potrf_u::<Panel4>(m, c, d),
            KernelSet::Panel8 => upper::potrf_u::<Panel8>(m, c, d),
            KernelSet::Panel12 => upper::potrf_u::<Panel12>(m, c, d),
        }
    }

    /// Computes the lower Cholesky factor of the `m x m` block of `c` at `(ci, cj)` into the
    /// block of `d` at `(di, dj)`, such that `C = L * L^T`.
    ///
    /// Only the lower triangle of `C` is read, and only the lower triangle of `D` is written.
    ///
    /// # Panics
    /// Panics if either block is out of bounds.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn spotrf_l(
        self,
        m: usize,
        c: &SMat,
        ci: usize,
        cj: usize,
        d: &mut SMat,
        di: usize,
        dj: usize,
    ) -> Result<(), CholeskyError> {
        log::trace!(target: "panel_potrf", "spotrf_l(m: {m}) with {self:?}");
        if m == 0 {
            return Ok(());
        }
        assert!(all(
            ci + m <= c.nrows(),
            cj + m <= c.ncols(),
            di + m <= d.nrows(),
            dj + m <= d.ncols()
        ));
        unsafe { self.lower_unchecked(m, m, c.view_at(ci, cj), d.view_mut_at(di, dj)) }
    }

    /// In-place version of [`KernelSet::spotrf_l`].
    #[track_caller]
    pub fn spotrf_l_in_place(
        self,
        m: usize,
        a: &mut SMat,
        ai: usize,
        aj: usize,
    ) -> Result<(), CholeskyError> {
        log::trace!(target: "panel_potrf", "spotrf_l_in_place(m: {m}) with {self:?}");
        if m == 0 {
            return Ok(());
        }
        assert!(all(ai + m <= a.nrows(), aj + m <= a.ncols()));
        unsafe {
            let a = a.view_mut_at(ai, aj);
            self.lower_unchecked(m, m, a.rb(), a)
        }
    }

    /// Computes the upper Cholesky factor of the `m x m` block of `c` at `(ci, cj)` into the
    /// block of `d` at `(di, dj)`, such that `C = U^T * U`.
    ///
    /// Only the upper triangle of `C` is read, and only the upper triangle of `D` is written.
    ///
    /// # Panics
    /// Panics if either block is out of bounds.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn spotrf_u(
        self,
        m: usize,
        c: &SMat,
        ci: usize,
        cj: usize,
        d: &mut SMat,
        di: usize,
        dj: usize,
    ) -> Result<(), CholeskyError> {
        log::trace!(target: "panel_potrf", "spotrf_u(m: {m}) with {self:?}");
        if m == 0 {
            return Ok(());
        }
        assert!(all(
            ci + m <= c.nrows(),
            cj + m <= c.ncols(),
            di + m <= d.nrows(),
            dj + m <= d.ncols()
        ));
        unsafe { self.upper_unchecked(m, c.view_at(ci, cj), d.view_mut_at(di, dj)) }
    }

    /// In-place version of [`KernelSet::spotrf_u`].
    #[track_caller]
    pub fn spotrf_u_in_place(
        self,
        m: usize,
        a: &mut SMat,
        ai: usize,
        aj: usize,
    ) -> Result<(), CholeskyError> {
        log::trace!(target: "panel_potrf", "spotrf_u_in_place(m: {m}) with {self:?}");
        if m == 0 {
            return Ok(());
        }
        assert!(all(ai + m <= a.nrows(), aj + m <= a.ncols()));
        unsafe {
            let a = a.view_mut_at(ai, aj);
            self.upper_unchecked(m, a.rb(), a)
        }
    }

    /// Factors the first `n` columns of the `m x n` block of `c` at `(ci, cj)` into the block of
    /// `d` at `(di, dj)`.
    ///
    /// The leading `n x n` block receives the lower Cholesky factor `L` of the leading block of
    /// `C`, and the trailing `(m - n) x n` block receives `C[n..m, 0..n] * L^-T`.
    ///
    /// # Panics
    /// Panics if `n > m`, or if either block is out of bounds.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn spotrf_l_mn(
        self,
        m: usize,
        n: usize,
        c: &SMat,
        ci: usize,
        cj: usize,
        d: &mut SMat,
        di: usize,
        dj: usize,
    ) -> Result<(), CholeskyError> {
        log::trace!(target: "panel_potrf", "spotrf_l_mn(m: {m}, n: {n}) with {self:?}");
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
        unsafe { self.lower_unchecked(m, n, c.view_at(ci, cj), d.view_mut_at(di, dj)) }
    }

    /// In-place version of [`KernelSet::spotrf_l_mn`].
    #[track_caller]
    pub fn spotrf_l_mn_in_place(
        self,
        m: usize,
        n: usize,
        a: &mut SMat,
        ai: usize,
        aj: usize,
    ) -> Result<(), CholeskyError> {
        log::trace!(target: "panel_potrf", "spotrf_l_mn_in_place(m: {m}, n: {n}) with {self:?}");
        if m == 0 || n == 0 {
            return Ok(());
        }
        assert!(all(n <= m, ai + m <= a.nrows(), aj + n <= a.ncols()));
        unsafe {
            let a = a.view_mut_at(ai, aj);
            self.lower_unchecked(m, n, a.rb(), a)
        }
    }
}

/// [`KernelSet::spotrf_l`] with the global kernel set.
#[track_caller]
pub fn spotrf_l(
    m: usize,
    c: &SMat,
    ci: usize,
    cj: usize,
    d: &mut SMat,
    di: usize,
    dj: usize,
) -> Result<(), CholeskyError> {
    get_kernel_set().spotrf_l(m, c, ci, cj, d, di, dj)
}

/// [`KernelSet::spotrf_l_in_place`] with the global kernel set.
#[track_caller]
pub fn spotrf_l_in_place(m: usize, a: &mut SMat, ai: usize, aj: usize) -> Result<(), CholeskyError> {
    get_kernel_set().spotrf_l_in_place(m, a, ai, aj)
}

/// [`KernelSet::spotrf_u`] with the global kernel set.
#[track_caller]
pub fn spotrf_u(
    m: usize,
    c: &SMat,
    ci: usize,
    cj: usize,
    d: &mut SMat,
    di: usize,
    dj: usize,
) -> Result<(), CholeskyError> {
    get_kernel_set().spotrf_u(m, c, ci, cj, d, di, dj)
}

/// [`KernelSet::spotrf_u_in_place`] with the global kernel set.
#[track_caller]
pub fn spotrf_u_in_place(m: usize, a: &mut SMat, ai: usize, aj: usize) -> Result<(), CholeskyError> {
    get_kernel_set().spotrf_u_in_place(m, a, ai, aj)
}

/// [`KernelSet::spotrf_l_mn`] with the global kernel set.
#[track_caller]
#[allow(clippy::too_many_arguments)]
pub fn spotrf_l_mn(
    m: usize,
    n: usize,
    c: &SMat,
    ci: usize,
    cj: usize,
    d: &mut SMat,
    di: usize,
    dj: usize,
) -> Result<(), CholeskyError> {
    get_kernel_set().spotrf_l_mn(m, n, c, ci, cj, d, di, dj)
}

/// [`KernelSet::spotrf_l_mn_in_place`] with the global kernel set.
#[track_caller]
pub fn spotrf_l_mn_in_place(
    m: usize,
    n: usize,
    a: &mut SMat,
    ai: usize,
    aj: usize,
) -> Result<(), CholeskyError> {
    get_kernel_set().spotrf_l_mn_in_place(m, n, a, ai, aj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{select_workspace, WorkspaceKind};
    use crate::{reference, set_kernel_set};
    use equator::assert;
    use assert_approx_eq::assert_approx_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const KERNEL_SETS: [KernelSet; 3] = [KernelSet::Panel4, KernelSet::Panel8, KernelSet::Panel12];

    fn sizes() -> impl Iterator<Item = usize> {
        (0..=40).chain([199, 200, 205, 211])
    }

    /// Whether order `m` can run with `ks` in this build: heap workspaces need `alloc`.
    fn has_workspace(ks: KernelSet, m: usize) -> bool {
        cfg!(feature = "alloc") || select_workspace(m, ks.heap_threshold()) == WorkspaceKind::Stack
    }

    fn random_spd(rng: &mut StdRng, n: usize) -> SMat {
        let a = SMat::from_fn(n, n, |_, _| rng.gen::<f32>() - 0.5);
        SMat::from_fn(n, n, |i, j| {
            let dot: f32 = (0..n).map(|k| a.read(i, k) * a.read(j, k)).sum();
            if i == j {
                dot + n as f32
            } else {
                dot
            }
        })
    }

    fn assert_lower_close(got: &SMat, want: &SMat, m: usize, n: usize) {
        for j in 0..n {
            for i in j..m {
                assert_approx_eq!(got.read(i, j), want.read(i, j), 1e-3);
            }
        }
    }

    fn assert_untouched_above(d: &SMat, n: usize) {
        for j in 0..n {
            for i in 0..j {
                assert!(d.read(i, j).is_nan());
            }
        }
    }

    #[test]
    fn test_small_scenarios() {
        for ks in KERNEL_SETS {
            let c = SMat::from_col_major(1, 1, vec![4.0]);
            let mut d = SMat::zeros(1, 1);
            ks.spotrf_l(1, &c, 0, 0, &mut d, 0, 0).unwrap();
            assert_eq!(d.read(0, 0), 2.0);

            let c = SMat::from_col_major(2, 2, vec![4.0, 2.0, 2.0, 5.0]);
            let mut d = SMat::zeros(2, 2);
            ks.spotrf_l(2, &c, 0, 0, &mut d, 0, 0).unwrap();
            assert_approx_eq!(d.read(0, 0), 2.0, 1e-6);
            assert_approx_eq!(d.read(1, 0), 1.0, 1e-6);
            assert_approx_eq!(d.read(1, 1), 2.0, 1e-6);
            assert_eq!(d.read(0, 1), 0.0);

            let c = SMat::from_col_major(2, 2, vec![4.0, 2.0, 2.0, 3.0]);
            let mut d = SMat::zeros(2, 2);
            ks.spotrf_l(2, &c, 0, 0, &mut d, 0, 0).unwrap();
            assert_approx_eq!(d.read(0, 0), 2.0, 1e-6);
            assert_approx_eq!(d.read(1, 0), 1.0, 1e-6);
            assert_approx_eq!(d.read(1, 1), 2.0f32.sqrt(), 1e-6);

            let mut a = SMat::identity(5);
            ks.spotrf_l_in_place(5, &mut a, 0, 0).unwrap();
            assert_eq!(a, SMat::identity(5));
            ks.spotrf_u_in_place(5, &mut a, 0, 0).unwrap();
            assert_eq!(a, SMat::identity(5));
        }
    }

    #[test]
    fn test_zero_order_is_noop() {
        for ks in KERNEL_SETS {
            let c = SMat::zeros(0, 0);
            let mut d = SMat::from_fn(2, 2, |_, _| 7.0);
            ks.spotrf_l(0, &c, 0, 0, &mut d, 0, 0).unwrap();
            ks.spotrf_u(0, &c, 0, 0, &mut d, 0, 0).unwrap();
            ks.spotrf_l_mn(0, 0, &c, 0, 0, &mut d, 0, 0).unwrap();
            ks.spotrf_l_mn_in_place(2, 0, &mut d, 0, 0).unwrap();
            assert_eq!(d, SMat::from_fn(2, 2, |_, _| 7.0));
        }
    }

    #[test]
    fn test_lower_matches_reference() {
        let mut rng = StdRng::seed_from_u64(0);
        for m in sizes() {
            let c = random_spd(&mut rng, m);
            let mut want = SMat::zeros(m, m);
            reference::potrf_l(m, &c, 0, 0, &mut want, 0, 0).unwrap();

            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::from_fn(m, m, |_, _| f32::NAN);
                ks.spotrf_l(m, &c, 0, 0, &mut d, 0, 0).unwrap();
                assert_lower_close(&d, &want, m, m);
                assert_untouched_above(&d, m);
            }
        }
    }

    #[test]
    fn test_upper_matches_reference() {
        let mut rng = StdRng::seed_from_u64(1);
        for m in sizes() {
            let c = random_spd(&mut rng, m);
            let mut want = SMat::zeros(m, m);
            reference::potrf_u(m, &c, 0, 0, &mut want, 0, 0).unwrap();

            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::from_fn(m, m, |_, _| f32::NAN);
                ks.spotrf_u(m, &c, 0, 0, &mut d, 0, 0).unwrap();
                let (d, want) = (d.transpose(), want.transpose());
                assert_lower_close(&d, &want, m, m);
                assert_untouched_above(&d, m);
            }
        }
    }

    #[test]
    fn test_upper_is_transposed_lower() {
        let mut rng = StdRng::seed_from_u64(2);
        for m in [3, 8, 13, 26, 203] {
            let c = random_spd(&mut rng, m);
            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut l = SMat::zeros(m, m);
                let mut u = SMat::zeros(m, m);
                ks.spotrf_l(m, &c, 0, 0, &mut l, 0, 0).unwrap();
                ks.spotrf_u(m, &c, 0, 0, &mut u, 0, 0).unwrap();
                assert_lower_close(&u.transpose(), &l, m, m);
            }
        }
    }

    #[test]
    fn test_reconstruct() {
        let mut rng = StdRng::seed_from_u64(3);
        for m in [1, 7, 12, 19, 33] {
            let c = random_spd(&mut rng, m);
            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut l = SMat::zeros(m, m);
                ks.spotrf_l(m, &c, 0, 0, &mut l, 0, 0).unwrap();
                for j in 0..m {
                    for i in j..m {
                        let llt: f32 = (0..=j).map(|k| l.read(i, k) * l.read(j, k)).sum();
                        assert_approx_eq!(llt, c.read(i, j), 1e-3);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rectangular_matches_reference() {
        let mut rng = StdRng::seed_from_u64(4);
        let shapes = [
            (1, 1),
            (5, 3),
            (9, 9),
            (13, 6),
            (14, 13),
            (17, 17),
            (23, 10),
            (31, 2),
            (40, 37),
            (205, 50),
            (210, 201),
        ];
        for (m, n) in shapes {
            let c = random_spd(&mut rng, m);
            let mut want = SMat::zeros(m, n);
            reference::potrf_l_mn(m, n, &c, 0, 0, &mut want, 0, 0).unwrap();

            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::from_fn(m, n, |_, _| f32::NAN);
                ks.spotrf_l_mn(m, n, &c, 0, 0, &mut d, 0, 0).unwrap();
                assert_lower_close(&d, &want, m, n);
                assert_untouched_above(&d, n);

                // trailing rows solve against the leading factor
                for i in n..m {
                    for j in 0..n {
                        let x: f32 = (0..=j).map(|k| d.read(i, k) * d.read(j, k)).sum();
                        assert_approx_eq!(x, c.read(i, j), 1e-3);
                    }
                }
            }
        }
    }

    #[test]
    fn test_in_place_is_bitwise_identical() {
        let mut rng = StdRng::seed_from_u64(5);
        for m in [3, 11, 12, 16, 17, 29, 205] {
            let c = random_spd(&mut rng, m);
            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::zeros(m, m);
                let mut a = c.clone();
                ks.spotrf_l(m, &c, 0, 0, &mut d, 0, 0).unwrap();
                ks.spotrf_l_in_place(m, &mut a, 0, 0).unwrap();
                for j in 0..m {
                    for i in j..m {
                        assert_eq!(a.read(i, j).to_bits(), d.read(i, j).to_bits());
                    }
                }

                let mut d = SMat::zeros(m, m);
                let mut a = c.clone();
                ks.spotrf_u(m, &c, 0, 0, &mut d, 0, 0).unwrap();
                ks.spotrf_u_in_place(m, &mut a, 0, 0).unwrap();
                for j in 0..m {
                    for i in 0..=j {
                        assert_eq!(a.read(i, j).to_bits(), d.read(i, j).to_bits());
                    }
                }

                let n = m / 2 + 1;
                let mut d = SMat::zeros(m, n);
                let mut a = c.clone();
                ks.spotrf_l_mn(m, n, &c, 0, 0, &mut d, 0, 0).unwrap();
                ks.spotrf_l_mn_in_place(m, n, &mut a, 0, 0).unwrap();
                for j in 0..n {
                    for i in j..m {
                        assert_eq!(a.read(i, j).to_bits(), d.read(i, j).to_bits());
                    }
                }
            }
        }
    }

    #[test]
    fn test_offsets_touch_only_the_target_block() {
        let mut rng = StdRng::seed_from_u64(6);
        for m in [6, 13, 21, 202] {
            let block = random_spd(&mut rng, m);
            let (ci, cj, di, dj) = (3, 5, 2, 4);

            // everything outside the triangle that may be read is NaN
            let c_lower = SMat::from_fn(m + 7, m + 9, |i, j| {
                if i >= ci && j >= cj && i - ci < m && j - cj < m && i - ci >= j - cj {
                    block.read(i - ci, j - cj)
                } else {
                    f32::NAN
                }
            });
            // the block is symmetric, so this holds its upper triangle at (cj, ci)
            let c_upper = c_lower.transpose();

            let mut want_l = SMat::zeros(m, m);
            let mut want_u = SMat::zeros(m, m);
            reference::potrf_l(m, &block, 0, 0, &mut want_l, 0, 0).unwrap();
            reference::potrf_u(m, &block, 0, 0, &mut want_u, 0, 0).unwrap();

            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::from_fn(m + 4, m + 6, |_, _| 7.0);
                ks.spotrf_l(m, &c_lower, ci, cj, &mut d, di, dj).unwrap();
                for j in 0..d.ncols() {
                    for i in 0..d.nrows() {
                        let inside = i >= di && j >= dj && i - di < m && j - dj < m;
                        if inside && i - di >= j - dj {
                            assert_approx_eq!(d.read(i, j), want_l.read(i - di, j - dj), 1e-3);
                        } else {
                            assert_eq!(d.read(i, j), 7.0);
                        }
                    }
                }

                let mut d = SMat::from_fn(m + 4, m + 6, |_, _| 7.0);
                ks.spotrf_u(m, &c_upper, cj, ci, &mut d, di, dj).unwrap();
                for j in 0..d.ncols() {
                    for i in 0..d.nrows() {
                        let inside = i >= di && j >= dj && i - di < m && j - dj < m;
                        if inside && i - di <= j - dj {
                            assert_approx_eq!(d.read(i, j), want_u.read(i - di, j - dj), 1e-3);
                        } else {
                            assert_eq!(d.read(i, j), 7.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_non_positive_pivot() {
        for (m, bad) in [(1, 0), (7, 5), (20, 13), (210, 150)] {
            let mut c = SMat::from_fn(m, m, |i, j| if i == j { 4.0 } else { 0.0 });
            c.write(bad, bad, -1.0);
            let err = Err(CholeskyError::NonPositivePivot { index: bad });

            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::zeros(m, m);
                assert_eq!(ks.spotrf_l(m, &c, 0, 0, &mut d, 0, 0), err);
                for j in 0..m {
                    for i in j..m {
                        let want = if i == j && i != bad { 2.0 } else { 0.0 };
                        assert_eq!(d.read(i, j), want);
                    }
                }

                let mut d = SMat::zeros(m, m);
                assert_eq!(ks.spotrf_u(m, &c, 0, 0, &mut d, 0, 0), err);
                assert_eq!(d.read(bad, bad), 0.0);

                let mut d = SMat::zeros(m, bad + 1);
                assert_eq!(ks.spotrf_l_mn(m, bad + 1, &c, 0, 0, &mut d, 0, 0), err);
                if bad > 0 {
                    let mut d = SMat::zeros(m, bad);
                    assert_eq!(ks.spotrf_l_mn(m, bad, &c, 0, 0, &mut d, 0, 0), Ok(()));
                }
            }
        }
    }

    #[test]
    fn test_non_positive_pivot_matches_reference() {
        let mut rng = StdRng::seed_from_u64(7);
        for m in [9, 18, 201] {
            let mut c = random_spd(&mut rng, m);
            // breaks definiteness at column 6 without touching earlier pivots
            c.write(6, 6, -3.0);

            let mut want = SMat::zeros(m, m);
            let expected = reference::potrf_l(m, &c, 0, 0, &mut want, 0, 0);
            assert_eq!(expected, Err(CholeskyError::NonPositivePivot { index: 6 }));
            for ks in KERNEL_SETS {
                if !has_workspace(ks, m) {
                    continue;
                }
                let mut d = SMat::zeros(m, m);
                assert_eq!(ks.spotrf_l(m, &c, 0, 0, &mut d, 0, 0), expected);
                assert_lower_close(&d, &want, m, m);
            }
        }
    }

    #[test]
    fn test_global_kernel_set() {
        let detected = KernelSet::detect();
        set_kernel_set(KernelSet::Panel12);
        assert_eq!(get_kernel_set(), KernelSet::Panel12);

        let c = SMat::from_col_major(2, 2, vec![9.0, 3.0, 3.0, 5.0]);
        let mut d = SMat::zeros(2, 2);
        spotrf_l(2, &c, 0, 0, &mut d, 0, 0).unwrap();
        assert_approx_eq!(d.read(1, 1), 2.0, 1e-6);

        set_kernel_set(detected);
        assert_eq!(get_kernel_set(), detected);
    }

    #[test]
    fn test_panel_step() {
        assert_eq!(PanelStep::select(4, 9), PanelStep::Full);
        assert_eq!(PanelStep::select(4, 3), PanelStep::Tail4);
        assert_eq!(PanelStep::select(8, 8), PanelStep::Full);
        assert_eq!(PanelStep::select(8, 5), PanelStep::Tail8);
        assert_eq!(PanelStep::select(8, 4), PanelStep::Tail4);
        assert_eq!(PanelStep::select(12, 9), PanelStep::Tail12);
        assert_eq!(PanelStep::select(12, 1), PanelStep::Tail4);
    }

    #[cfg(not(feature = "alloc"))]
    #[test]
    fn test_heap_workspace_without_alloc_aborts() {
        const CHILD: &str = "PANEL_POTRF_HEAP_ABORT_CHILD";
        if std::env::var_os(CHILD).is_some() {
            let ks = KernelSet::Panel4;
            let m = ks.heap_threshold();
            let c = SMat::identity(m);
            let mut d = SMat::zeros(m, m);
            let _ = ks.spotrf_l(m, &c, 0, 0, &mut d, 0, 0);
            return;
        }

        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "potrf::tests::test_heap_workspace_without_alloc_aborts",
                "--test-threads=1",
            ])
            .env(CHILD, "1")
            .status()
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_block() {
        let c = SMat::identity(4);
        let mut d = SMat::zeros(4, 4);
        let _ = spotrf_l(3, &c, 2, 0, &mut d, 0, 0);
    }

    #[test]
    #[should_panic]
    fn test_rectangular_requires_n_le_m() {
        let c = SMat::identity(4);
        let mut d = SMat::zeros(4, 4);
        let _ = spotrf_l_mn(2, 3, &c, 0, 0, &mut d, 0, 0);
    }
}
