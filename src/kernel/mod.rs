//! Micro-kernels operating on one panel of the factorization.
//!
//! A panel is `M` rows by 4 columns, with `M` one of 4, 8, 12. Each kernel takes clip limits
//! `(m1, n1)` so the same code serves the trailing partial panel: only rows `< m1` and columns
//! `< n1` of any operand are read or written.
//!
//! Operands are addressed through small copyable views. A packed matrix stores row-panels of
//! height 4 one after another, element `(i, j)` living at `ptr[(i / 4) * 4 * sd + j * 4 + i % 4]`,
//! where `sd` is the panel stride in columns.

pub mod pack;
pub mod potrf;
pub mod set;
pub mod trsm;

pub use set::{KernelSet, Panel12, Panel4, Panel8, PanelKernelSet};

/// Height of a packed row-panel.
pub const PANEL_HEIGHT: usize = 4;

/// Read access to a 2D operand.
pub trait Operand: Copy {
    /// # Safety
    /// `(i, j)` must address an element of the underlying storage.
    unsafe fn read(self, i: usize, j: usize) -> f32;
}

/// Write access to a 2D operand.
pub trait OperandMut: Copy {
    /// # Safety
    /// `(i, j)` must address an element of the underlying storage, and no live reference may
    /// alias it.
    unsafe fn write(self, i: usize, j: usize, value: f32);
}

/// Column-major read-only view.
#[derive(Copy, Clone, Debug)]
pub struct ColMajor {
    ptr: *const f32,
    ld: usize,
}

/// Column-major writable view.
#[derive(Copy, Clone, Debug)]
pub struct ColMajorMut {
    ptr: *mut f32,
    ld: usize,
}

/// Transposed view of column-major storage: element `(i, j)` is element `(j, i)` of the
/// underlying matrix.
#[derive(Copy, Clone, Debug)]
pub struct RowMajor {
    ptr: *const f32,
    ld: usize,
}

/// Packed panel-major view, readable and writable.
#[derive(Copy, Clone, Debug)]
pub struct Packed {
    ptr: *mut f32,
    sd: usize,
}

impl ColMajor {
    #[inline]
    pub fn new(ptr: *const f32, ld: usize) -> Self {
        Self { ptr, ld }
    }

    /// # Safety
    /// The offset must stay inside the allocation.
    #[inline]
    pub unsafe fn at(self, i: usize, j: usize) -> Self {
        Self {
            ptr: self.ptr.add(i + j * self.ld),
            ld: self.ld,
        }
    }

    /// Reinterprets the same storage as its transpose.
    #[inline]
    pub fn transpose(self) -> RowMajor {
        RowMajor {
            ptr: self.ptr,
            ld: self.ld,
        }
    }
}

impl ColMajorMut {
    #[inline]
    pub fn new(ptr: *mut f32, ld: usize) -> Self {
        Self { ptr, ld }
    }

    /// # Safety
    /// The offset must stay inside the allocation.
    #[inline]
    pub unsafe fn at(self, i: usize, j: usize) -> Self {
        Self {
            ptr: self.ptr.add(i + j * self.ld),
            ld: self.ld,
        }
    }

    #[inline]
    pub fn rb(self) -> ColMajor {
        ColMajor {
            ptr: self.ptr,
            ld: self.ld,
        }
    }
}

impl Packed {
    /// `sd` is the number of columns reserved per row-panel.
    #[inline]
    pub fn new(ptr: *mut f32, sd: usize) -> Self {
        Self { ptr, sd }
    }

    /// Moves the origin `i` rows down. `i` must be a multiple of [`PANEL_HEIGHT`].
    ///
    /// # Safety
    /// The offset must stay inside the allocation.
    #[inline]
    pub unsafe fn rows(self, i: usize) -> Self {
        debug_assert!(i % PANEL_HEIGHT == 0);
        Self {
            ptr: self.ptr.add(i * self.sd),
            sd: self.sd,
        }
    }

    /// Moves the origin `j` columns right.
    ///
    /// # Safety
    /// The offset must stay inside the allocation.
    #[inline]
    pub unsafe fn cols(self, j: usize) -> Self {
        Self {
            ptr: self.ptr.add(j * PANEL_HEIGHT),
            sd: self.sd,
        }
    }

    #[inline]
    fn offset(self, i: usize, j: usize) -> usize {
        (i / PANEL_HEIGHT) * PANEL_HEIGHT * self.sd + j * PANEL_HEIGHT + i % PANEL_HEIGHT
    }
}

impl Operand for ColMajor {
    #[inline(always)]
    unsafe fn read(self, i: usize, j: usize) -> f32 {
        *self.ptr.add(i + j * self.ld)
    }
}

impl Operand for ColMajorMut {
    #[inline(always)]
    unsafe fn read(self, i: usize, j: usize) -> f32 {
        *self.ptr.add(i + j * self.ld)
    }
}

impl OperandMut for ColMajorMut {
    #[inline(always)]
    unsafe fn write(self, i: usize, j: usize, value: f32) {
        *self.ptr.add(i + j * self.ld) = value;
    }
}

impl Operand for RowMajor {
    #[inline(always)]
    unsafe fn read(self, i: usize, j: usize) -> f32 {
        *self.ptr.add(j + i * self.ld)
    }
}

impl Operand for Packed {
    #[inline(always)]
    unsafe fn read(self, i: usize, j: usize) -> f32 {
        *self.ptr.add(self.offset(i, j))
    }
}

impl OperandMut for Packed {
    #[inline(always)]
    unsafe fn write(self, i: usize, j: usize, value: f32) {
        *self.ptr.add(self.offset(i, j)) = value;
    }
}

/// Accumulates `acc(i, j) = sum_k a(i, k) * b(j, k)` over `k < kmax`, for `i < m1, j < n1`.
#[inline(always)]
unsafe fn gemm_nt<const M: usize, B: Operand>(
    kmax: usize,
    a: Packed,
    b: B,
    m1: usize,
    n1: usize,
) -> [[f32; PANEL_HEIGHT]; M] {
    struct Impl<const M: usize, B> {
        kmax: usize,
        a: Packed,
        b: B,
        m1: usize,
        n1: usize,
    }

    impl<const M: usize, B: Operand> pulp::WithSimd for Impl<M, B> {
        type Output = [[f32; PANEL_HEIGHT]; M];

        #[inline(always)]
        fn with_simd<S: pulp::Simd>(self, simd: S) -> Self::Output {
            let _ = simd;
            let Self { kmax, a, b, m1, n1 } = self;
            let mut acc = [[0.0f32; PANEL_HEIGHT]; M];
            for k in 0..kmax {
                for j in 0..n1 {
                    // SAFETY: forwarded from `gemm_nt`
                    let b_jk = unsafe { b.read(j, k) };
                    for (i, row) in acc.iter_mut().enumerate().take(m1) {
                        row[j] += unsafe { a.read(i, k) } * b_jk;
                    }
                }
            }
            acc
        }
    }

    pulp::Arch::new().dispatch(Impl::<M, B> { kmax, a, b, m1, n1 })
}
