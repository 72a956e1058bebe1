use reborrow::*;

use super::{check_pivots, CholeskyError, PanelStep};
use crate::kernel::{
    ColMajor, ColMajorMut, Operand, Packed, Panel12, Panel4, Panel8, PanelKernelSet, PANEL_HEIGHT,
};
use crate::workspace::{
    heap_diag_len, heap_packed_len, heap_panel_stride, heap_req, make_zeroed, select_workspace,
    stack_panel_stride, stack_req, with_workspace, WorkspaceKind,
};

/// Where a row-panel gets its packed rows, and where the solves read the factored rows from.
trait RowPanels: Copy {
    type Factored: Operand;

    /// Packed rows starting at `ii`, from column 0.
    unsafe fn row_panel(self, ii: usize) -> Packed;
    /// Factored rows starting at `jj`, from column 0.
    unsafe fn factored_rows(self, jj: usize) -> Self::Factored;
}

/// A single packed row-panel, reused for every panel. Factored rows are read from `D`.
#[derive(Copy, Clone)]
struct StackPanels {
    panel: Packed,
    d: ColMajorMut,
}

/// The whole factor packed, every panel at its own place.
#[derive(Copy, Clone)]
struct HeapPanels {
    packed: Packed,
}

impl RowPanels for StackPanels {
    type Factored = ColMajorMut;

    #[inline]
    unsafe fn row_panel(self, _: usize) -> Packed {
        self.panel
    }

    #[inline]
    unsafe fn factored_rows(self, jj: usize) -> ColMajorMut {
        self.d.at(jj, 0)
    }
}

impl RowPanels for HeapPanels {
    type Factored = Packed;

    #[inline]
    unsafe fn row_panel(self, ii: usize) -> Packed {
        self.packed.rows(ii)
    }

    #[inline]
    unsafe fn factored_rows(self, jj: usize) -> Packed {
        self.packed.rows(jj)
    }
}

#[derive(Copy, Clone)]
struct Lower<P> {
    c: ColMajor,
    d: ColMajorMut,
    inv_diag: *mut f32,
    panels: P,
    m: usize,
    n: usize,
}

/// Solves the `m1 x n1` block at `(ii, jj)` and packs it into the row-panel.
#[inline]
unsafe fn solve_block<K: PanelKernelSet, P: RowPanels>(
    ctx: Lower<P>,
    a: Packed,
    ii: usize,
    jj: usize,
    m1: usize,
    n1: usize,
) {
    let Lower {
        c,
        d,
        inv_diag,
        panels,
        ..
    } = ctx;
    K::trsm_nt_rl_inv(
        jj,
        a,
        panels.factored_rows(jj),
        1.0,
        c.at(ii, jj),
        d.at(ii, jj),
        d.at(jj, jj),
        inv_diag.add(jj),
        m1,
        n1,
    );
    K::pack_nn(n1.min(PANEL_HEIGHT), d.at(ii, jj).rb(), a.cols(jj), m1);
}

/// Factors the diagonal block at `(i0, i0)`, with `a` the packed rows from `i0`.
///
/// Panels taller than 4 rows are factored 4 columns at a time: after each step the rows below
/// the freshly factored block are packed, and the remaining rows are handed to the next
/// narrower kernel set.
unsafe fn factor_diagonal<K: PanelKernelSet, P: RowPanels>(
    ctx: Lower<P>,
    a: Packed,
    i0: usize,
    m1: usize,
    n1: usize,
) {
    let Lower { c, d, inv_diag, .. } = ctx;
    K::potrf_nt_l(
        i0,
        a,
        c.at(i0, i0),
        d.at(i0, i0),
        inv_diag.add(i0),
        m1,
        n1,
    );

    if K::WIDTH > PANEL_HEIGHT && m1 > PANEL_HEIGHT {
        let below = a.rows(PANEL_HEIGHT);
        let i1 = i0 + PANEL_HEIGHT;
        K::Narrow::pack_nn(
            n1.min(PANEL_HEIGHT),
            d.at(i1, i0).rb(),
            below.cols(i0),
            m1 - PANEL_HEIGHT,
        );
        if n1 > PANEL_HEIGHT {
            factor_diagonal::<K::Narrow, P>(
                ctx,
                below,
                i1,
                m1 - PANEL_HEIGHT,
                n1 - PANEL_HEIGHT,
            );
        }
    }
}

/// Processes rows `ii..ii + m1` over the first `n` columns.
unsafe fn row_panel<K: PanelKernelSet, P: RowPanels>(ctx: Lower<P>, ii: usize, m1: usize) {
    let n = ctx.n;
    let a = ctx.panels.row_panel(ii);

    let mut jj = 0;
    while jj < ii && jj + PANEL_HEIGHT <= n {
        solve_block::<K, P>(ctx, a, ii, jj, m1, PANEL_HEIGHT);
        jj += PANEL_HEIGHT;
    }

    if jj < n {
        if jj < ii {
            solve_block::<K, P>(ctx, a, ii, jj, m1, n - jj);
        } else {
            factor_diagonal::<K, P>(ctx, a, ii, m1, n - ii);
        }
    }
}

unsafe fn run<K: PanelKernelSet, P: RowPanels>(ctx: Lower<P>) {
    let m = ctx.m;
    let mut ii = 0;
    while ii < m {
        let rem = m - ii;
        match PanelStep::select(K::WIDTH, rem) {
            PanelStep::Full => row_panel::<K, P>(ctx, ii, K::WIDTH),
            PanelStep::Tail12 => row_panel::<Panel12, P>(ctx, ii, rem),
            PanelStep::Tail8 => row_panel::<Panel8, P>(ctx, ii, rem),
            PanelStep::Tail4 => row_panel::<Panel4, P>(ctx, ii, rem),
        }
        ii += K::WIDTH;
    }
}

/// Factors the first `n` columns of the `m x m` block: `D[0..n, 0..n] = L` with
/// `C[0..n, 0..n] = L * L^T`, and `D[n..m, 0..n] = C[n..m, 0..n] * L^-T`.
///
/// # Safety
/// `c` must be readable and `d` writable on the lower part of the `m x n` block, with
/// `0 < n <= m`. They may refer to the same storage.
pub(crate) unsafe fn potrf_l_mn<K: PanelKernelSet>(
    m: usize,
    n: usize,
    c: ColMajor,
    d: ColMajorMut,
) -> Result<(), CholeskyError> {
    let kind = select_workspace(m, K::HEAP_THRESHOLD);
    log::debug!(
        target: "panel_potrf",
        "lower factorization: m: {m}, n: {n}, width: {}, workspace: {kind:?}",
        K::WIDTH,
    );

    match kind {
        WorkspaceKind::Stack => {
            let sd = stack_panel_stride(m);
            with_workspace(kind, stack_req(K::WIDTH, m).unwrap(), |mut stack| {
                let (panel, mut stack) = make_zeroed(stack.rb_mut(), K::WIDTH * sd);
                let (inv_diag, _) = make_zeroed(stack.rb_mut(), sd);
                run::<K, _>(Lower {
                    c,
                    d,
                    inv_diag: inv_diag.as_mut_ptr(),
                    panels: StackPanels {
                        panel: Packed::new(panel.as_mut_ptr(), sd),
                        d,
                    },
                    m,
                    n,
                });
                check_pivots(&inv_diag[..n])
            })
        }
        WorkspaceKind::Heap => {
            with_workspace(kind, heap_req(m, n).unwrap(), |mut stack| {
                let (packed, mut stack) = make_zeroed(stack.rb_mut(), heap_packed_len(m, n));
                let (inv_diag, _) = make_zeroed(stack.rb_mut(), heap_diag_len(n));
                run::<K, _>(Lower {
                    c,
                    d,
                    inv_diag: inv_diag.as_mut_ptr(),
                    panels: HeapPanels {
                        packed: Packed::new(packed.as_mut_ptr(), heap_panel_stride(n)),
                    },
                    m,
                    n,
                });
                check_pivots(&inv_diag[..n])
            })
        }
    }
}
