use reborrow::*;

use super::{check_pivots, CholeskyError, PanelStep};
use crate::kernel::{
    ColMajor, ColMajorMut, Operand, Packed, Panel12, Panel4, Panel8, PanelKernelSet, RowMajor,
    PANEL_HEIGHT,
};
use crate::workspace::{
    heap_diag_len, heap_packed_len, heap_panel_stride, heap_req, make_zeroed, select_workspace,
    stack_panel_stride, stack_req, with_workspace, WorkspaceKind,
};

/// Packed storage for the transposed columns of the upper factor.
///
/// Column `j` of `U` is row `j` of `L = U^T`. A column-panel of `U` is packed as a row-panel of
/// `L` and runs through the same kernels as the lower factorization.
trait ColumnPanels: Copy {
    type Factored: Operand;
    type Diag: Operand;

    /// Whether factored rows live only in `D`, so that each sub-block of a diagonal panel must
    /// be repacked from it.
    const STAGED: bool;

    /// Packed rows of `L` starting at `ii`, from column 0.
    unsafe fn row_panel(self, ii: usize) -> Packed;
    /// Rows of `L` starting at `jj`, from column 0.
    unsafe fn factored_rows(self, jj: usize) -> Self::Factored;
    /// The factored `4 x 4` diagonal block of `L` at `(jj, jj)`.
    unsafe fn diag_block(self, jj: usize) -> Self::Diag;
    /// Where the diagonal block at `(i0, i0)` is factored.
    unsafe fn tile(self, i0: usize) -> Packed;
}

/// One packed row-panel and a transpose tile. Factored rows of `L` are read from `D` through a
/// transposed view.
#[derive(Copy, Clone)]
struct StackPanels {
    panel: Packed,
    tile: Packed,
    d: ColMajorMut,
}

#[derive(Copy, Clone)]
struct HeapPanels {
    packed: Packed,
}

impl ColumnPanels for StackPanels {
    type Factored = RowMajor;
    type Diag = RowMajor;
    const STAGED: bool = true;

    #[inline]
    unsafe fn row_panel(self, _: usize) -> Packed {
        self.panel
    }

    #[inline]
    unsafe fn factored_rows(self, jj: usize) -> RowMajor {
        self.d.at(0, jj).rb().transpose()
    }

    #[inline]
    unsafe fn diag_block(self, jj: usize) -> RowMajor {
        self.d.at(jj, jj).rb().transpose()
    }

    #[inline]
    unsafe fn tile(self, _: usize) -> Packed {
        self.tile
    }
}

impl ColumnPanels for HeapPanels {
    type Factored = Packed;
    type Diag = Packed;
    const STAGED: bool = false;

    #[inline]
    unsafe fn row_panel(self, ii: usize) -> Packed {
        self.packed.rows(ii)
    }

    #[inline]
    unsafe fn factored_rows(self, jj: usize) -> Packed {
        self.packed.rows(jj)
    }

    #[inline]
    unsafe fn diag_block(self, jj: usize) -> Packed {
        self.packed.rows(jj).cols(jj)
    }

    #[inline]
    unsafe fn tile(self, i0: usize) -> Packed {
        self.packed.rows(i0).cols(i0)
    }
}

#[derive(Copy, Clone)]
struct Upper<P> {
    c: ColMajor,
    d: ColMajorMut,
    inv_diag: *mut f32,
    panels: P,
    m: usize,
}

/// Computes `D[jj..jj + 4, ii..ii + m1]`.
#[inline]
unsafe fn solve_block<K: PanelKernelSet, P: ColumnPanels>(
    ctx: Upper<P>,
    a: Packed,
    ii: usize,
    jj: usize,
    m1: usize,
) {
    let Upper {
        c,
        d,
        inv_diag,
        panels,
        ..
    } = ctx;
    let block = a.cols(jj);
    K::pack_tn(PANEL_HEIGHT, c.at(jj, ii), block, m1);
    K::trsm_nt_rl_inv(
        jj,
        a,
        panels.factored_rows(jj),
        1.0,
        block,
        block,
        panels.diag_block(jj),
        inv_diag.add(jj),
        m1,
        PANEL_HEIGHT,
    );
    K::unpack_nt(PANEL_HEIGHT, block, d.at(jj, ii), m1);
}

/// Factors the diagonal block at `(i0, i0)`, with `a` the packed rows of `L` from `i0`.
unsafe fn factor_diagonal<K: PanelKernelSet, P: ColumnPanels>(
    ctx: Upper<P>,
    a: Packed,
    i0: usize,
    m1: usize,
) {
    let Upper {
        c,
        d,
        inv_diag,
        panels,
        ..
    } = ctx;
    let tile = panels.tile(i0);
    let kn = m1.min(PANEL_HEIGHT);

    K::pack_tn(kn, c.at(i0, i0), tile, m1);
    K::potrf_nt_l(i0, a, tile, tile, inv_diag.add(i0), m1, m1);
    K::unpack_nt_upper(kn, tile, d.at(i0, i0), m1);

    if K::WIDTH > PANEL_HEIGHT && m1 > PANEL_HEIGHT {
        let below = a.rows(PANEL_HEIGHT);
        let i1 = i0 + PANEL_HEIGHT;
        if P::STAGED {
            K::Narrow::pack_tn(
                PANEL_HEIGHT,
                d.at(i0, i1).rb(),
                below.cols(i0),
                m1 - PANEL_HEIGHT,
            );
        }
        factor_diagonal::<K::Narrow, P>(ctx, below, i1, m1 - PANEL_HEIGHT);
    }
}

/// Processes columns `ii..ii + m1`.
unsafe fn column_panel<K: PanelKernelSet, P: ColumnPanels>(ctx: Upper<P>, ii: usize, m1: usize) {
    let a = ctx.panels.row_panel(ii);
    let mut jj = 0;
    while jj < ii {
        solve_block::<K, P>(ctx, a, ii, jj, m1);
        jj += PANEL_HEIGHT;
    }
    factor_diagonal::<K, P>(ctx, a, ii, m1);
}

unsafe fn run<K: PanelKernelSet, P: ColumnPanels>(ctx: Upper<P>) {
    let m = ctx.m;
    let mut ii = 0;
    while ii < m {
        let rem = m - ii;
        match PanelStep::select(K::WIDTH, rem) {
            PanelStep::Full => column_panel::<K, P>(ctx, ii, K::WIDTH),
            PanelStep::Tail12 => column_panel::<Panel12, P>(ctx, ii, rem),
            PanelStep::Tail8 => column_panel::<Panel8, P>(ctx, ii, rem),
            PanelStep::Tail4 => column_panel::<Panel4, P>(ctx, ii, rem),
        }
        ii += K::WIDTH;
    }
}

/// Factors the `m x m` block as `C = U^T * U`, writing the upper triangular `U` to `D`.
///
/// # Safety
/// `c` must be readable and `d` writable on the upper part of the `m x m` block, with `m > 0`.
/// They may refer to the same storage.
pub(crate) unsafe fn potrf_u<K: PanelKernelSet>(
    m: usize,
    c: ColMajor,
    d: ColMajorMut,
) -> Result<(), CholeskyError> {
    let kind = select_workspace(m, K::HEAP_THRESHOLD);
    log::debug!(
        target: "panel_potrf",
        "upper factorization: m: {m}, width: {}, workspace: {kind:?}",
        K::WIDTH,
    );

    match kind {
        WorkspaceKind::Stack => {
            let sd = stack_panel_stride(m);
            with_workspace(kind, stack_req(K::WIDTH, m).unwrap(), |mut stack| {
                let (panel, mut stack) = make_zeroed(stack.rb_mut(), K::WIDTH * sd);
                let (inv_diag, mut stack) = make_zeroed(stack.rb_mut(), sd);
                let (tile, _) = make_zeroed(stack.rb_mut(), K::WIDTH * PANEL_HEIGHT);
                run::<K, _>(Upper {
                    c,
                    d,
                    inv_diag: inv_diag.as_mut_ptr(),
                    panels: StackPanels {
                        panel: Packed::new(panel.as_mut_ptr(), sd),
                        tile: Packed::new(tile.as_mut_ptr(), PANEL_HEIGHT),
                        d,
                    },
                    m,
                });
                check_pivots(&inv_diag[..m])
            })
        }
        WorkspaceKind::Heap => {
            with_workspace(kind, heap_req(m, m).unwrap(), |mut stack| {
                let (packed, mut stack) = make_zeroed(stack.rb_mut(), heap_packed_len(m, m));
                let (inv_diag, _) = make_zeroed(stack.rb_mut(), heap_diag_len(m));
                run::<K, _>(Upper {
                    c,
                    d,
                    inv_diag: inv_diag.as_mut_ptr(),
                    panels: HeapPanels {
                        packed: Packed::new(packed.as_mut_ptr(), heap_panel_stride(m)),
                    },
                    m,
                });
                check_pivots(&inv_diag[..m])
            })
        }
    }
}
