//! Scratch memory for the blocked factorizations.
//!
//! Small orders run out of a fixed-capacity buffer on the call stack holding one row-panel of
//! packed data. Larger orders pack the whole matrix into a heap buffer, which lets later panels
//! read already factored rows in packed form instead of strided from the output.

use dyn_stack::{PodStack, SizeOverflow, StackReq};
use equator::assert;

use crate::kernel::PANEL_HEIGHT;

/// Maximum order for which the stack workspace can hold a full row-panel.
pub const K_MAX_STACK: usize = 300;

/// Alignment of every scratch buffer, in bytes.
pub const CACHE_LINE_ALIGN: usize = 64;

const HEAP_ROUNDING: usize = 128;

const MAX_WIDTH: usize = 12;
// one row-panel of the widest kernel set, the inverse diagonal, a transpose tile, and padding
const STACK_SCRATCH_FLOATS: usize =
    MAX_WIDTH * K_MAX_STACK + K_MAX_STACK + MAX_WIDTH * PANEL_HEIGHT;
const STACK_SCRATCH_BYTES: usize = STACK_SCRATCH_FLOATS * 4 + 4 * CACHE_LINE_ALIGN;

#[repr(C, align(64))]
struct StackScratch([u8; STACK_SCRATCH_BYTES]);

/// Where the scratch memory of a factorization lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkspaceKind {
    Stack,
    Heap,
}

/// Chooses the workspace for a factorization of order `m`, given the heap threshold of the
/// kernel set.
#[inline]
pub fn select_workspace(m: usize, heap_threshold: usize) -> WorkspaceKind {
    if m >= heap_threshold || m > K_MAX_STACK {
        WorkspaceKind::Heap
    } else {
        WorkspaceKind::Stack
    }
}

#[inline]
pub(crate) fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

/// Column stride of the stack row-panel for order `m`.
#[inline]
pub fn stack_panel_stride(m: usize) -> usize {
    round_up(m, PANEL_HEIGHT).min(K_MAX_STACK)
}

/// Column stride of the heap packed matrix with `n` columns.
#[inline]
pub fn heap_panel_stride(n: usize) -> usize {
    round_up(n, PANEL_HEIGHT)
}

/// Size and alignment requirements of the stack workspace: a `width`-row panel, the inverse
/// diagonal, and a `width x 4` transpose tile.
pub fn stack_req(width: usize, m: usize) -> Result<StackReq, SizeOverflow> {
    let sd = stack_panel_stride(m);
    StackReq::try_all_of([
        StackReq::try_new_aligned::<f32>(width * sd, CACHE_LINE_ALIGN)?,
        StackReq::try_new_aligned::<f32>(sd, CACHE_LINE_ALIGN)?,
        StackReq::try_new_aligned::<f32>(width * PANEL_HEIGHT, CACHE_LINE_ALIGN)?,
    ])
}

/// Size and alignment requirements of the heap workspace for an `m x n` factorization: the
/// packed matrix and the inverse diagonal, both rounded up to multiples of 128.
pub fn heap_req(m: usize, n: usize) -> Result<StackReq, SizeOverflow> {
    let packed = round_up(m, HEAP_ROUNDING)
        .checked_mul(round_up(n, HEAP_ROUNDING))
        .ok_or(SizeOverflow)?;
    StackReq::try_all_of([
        StackReq::try_new_aligned::<f32>(packed, CACHE_LINE_ALIGN)?,
        StackReq::try_new_aligned::<f32>(heap_diag_len(n), CACHE_LINE_ALIGN)?,
    ])
}

/// Length of the packed matrix carved from a [`heap_req`] workspace.
#[inline]
pub(crate) fn heap_packed_len(m: usize, n: usize) -> usize {
    round_up(m, HEAP_ROUNDING) * round_up(n, HEAP_ROUNDING)
}

/// Length of the inverse diagonal carved from a [`heap_req`] workspace.
#[inline]
pub(crate) fn heap_diag_len(n: usize) -> usize {
    round_up(n, HEAP_ROUNDING)
}

/// Carves a zeroed `f32` buffer of length `len` from `stack`.
#[inline]
pub(crate) fn make_zeroed(stack: PodStack<'_>, len: usize) -> (&mut [f32], PodStack<'_>) {
    let (buf, stack) = stack.make_aligned_raw::<f32>(len, CACHE_LINE_ALIGN);
    buf.fill(0.0);
    (buf, stack)
}

/// Runs `f` with a workspace of the requested kind satisfying `req`.
///
/// # Panics
/// Panics if a stack workspace is requested for more memory than the fixed stack capacity.
///
/// Without the `alloc` feature, requesting a heap workspace aborts the process.
pub fn with_workspace<R>(kind: WorkspaceKind, req: StackReq, f: impl FnOnce(PodStack<'_>) -> R) -> R {
    match kind {
        WorkspaceKind::Stack => {
            assert!(all(
                req.size_bytes() <= STACK_SCRATCH_BYTES,
                req.align_bytes() <= CACHE_LINE_ALIGN
            ));
            let mut scratch = StackScratch([0u8; STACK_SCRATCH_BYTES]);
            f(PodStack::new(&mut scratch.0))
        }
        WorkspaceKind::Heap => with_heap(req, f),
    }
}

#[cfg(feature = "alloc")]
fn with_heap<R>(req: StackReq, f: impl FnOnce(PodStack<'_>) -> R) -> R {
    log::trace!(
        target: "panel_potrf",
        "allocating {} bytes of heap workspace",
        req.size_bytes(),
    );
    let mut mem = dyn_stack::GlobalPodBuffer::new(req);
    f(PodStack::new(&mut mem))
}

#[cfg(not(feature = "alloc"))]
fn with_heap<R>(req: StackReq, _: impl FnOnce(PodStack<'_>) -> R) -> R {
    log::error!(
        target: "panel_potrf",
        "heap workspace of {} bytes required, but the `alloc` feature is disabled",
        req.size_bytes(),
    );
    std::process::abort()
}
