use core::sync::atomic::{AtomicUsize, Ordering};

use super::{pack, potrf, trsm, ColMajor, ColMajorMut, Operand, OperandMut, Packed};

/// A family of micro-kernels sharing one panel height.
///
/// The factorization drivers are generic over this trait, so that each target can plug in the
/// widest panel it runs efficiently while the trailing partial panel falls back to narrower
/// sets through [`PanelKernelSet::Narrow`].
pub trait PanelKernelSet {
    /// Panel height, one of 4, 8, 12.
    const WIDTH: usize;
    /// Orders at or above this use a heap workspace.
    const HEAP_THRESHOLD: usize;

    /// Kernel set four rows narrower, used on the sub-blocks of a diagonal panel.
    type Narrow: PanelKernelSet;

    /// See [`potrf::potrf_nt_l`].
    ///
    /// # Safety
    /// Same as [`potrf::potrf_nt_l`].
    unsafe fn potrf_nt_l<C: Operand, D: OperandMut>(
        kmax: usize,
        a: Packed,
        c: C,
        d: D,
        inv_diag: *mut f32,
        m1: usize,
        n1: usize,
    );

    /// See [`trsm::trsm_nt_rl_inv`].
    ///
    /// # Safety
    /// Same as [`trsm::trsm_nt_rl_inv`].
    #[allow(clippy::too_many_arguments)]
    unsafe fn trsm_nt_rl_inv<B: Operand, C: Operand, D: OperandMut, E: Operand>(
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
    );

    /// Packs up to `WIDTH` rows, see [`pack::pack_nn`].
    ///
    /// # Safety
    /// Same as [`pack::pack_nn`].
    #[inline]
    unsafe fn pack_nn(kn: usize, src: ColMajor, dst: Packed, m1: usize) {
        pack::pack_nn(m1.min(Self::WIDTH), kn, src, dst)
    }

    /// Packs up to `WIDTH` rows of the transpose, see [`pack::pack_tn`].
    ///
    /// # Safety
    /// Same as [`pack::pack_tn`].
    #[inline]
    unsafe fn pack_tn(kn: usize, src: ColMajor, dst: Packed, m1: usize) {
        pack::pack_tn(m1.min(Self::WIDTH), kn, src, dst)
    }

    /// # Safety
    /// Same as [`pack::unpack_nt`].
    #[inline]
    unsafe fn unpack_nt(kn: usize, src: Packed, dst: ColMajorMut, m1: usize) {
        pack::unpack_nt(m1.min(Self::WIDTH), kn, src, dst)
    }

    /// # Safety
    /// Same as [`pack::unpack_nt_upper`].
    #[inline]
    unsafe fn unpack_nt_upper(kn: usize, src: Packed, dst: ColMajorMut, m1: usize) {
        pack::unpack_nt_upper(m1.min(Self::WIDTH), kn, src, dst)
    }
}

/// 4-row panels, available everywhere.
#[derive(Copy, Clone, Debug)]
pub struct Panel4;
/// 8-row panels.
#[derive(Copy, Clone, Debug)]
pub struct Panel8;
/// 12-row panels.
#[derive(Copy, Clone, Debug)]
pub struct Panel12;

macro_rules! impl_kernel_set {
    ($ty: ty, $width: expr, $threshold: expr, $narrow: ty) => {
        impl PanelKernelSet for $ty {
            const WIDTH: usize = $width;
            const HEAP_THRESHOLD: usize = $threshold;
            type Narrow = $narrow;

            #[inline]
            unsafe fn potrf_nt_l<C: Operand, D: OperandMut>(
                kmax: usize,
                a: Packed,
                c: C,
                d: D,
                inv_diag: *mut f32,
                m1: usize,
                n1: usize,
            ) {
                potrf::potrf_nt_l::<{ $width }, C, D>(kmax, a, c, d, inv_diag, m1, n1)
            }

            #[inline]
            unsafe fn trsm_nt_rl_inv<B: Operand, C: Operand, D: OperandMut, E: Operand>(
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
                trsm::trsm_nt_rl_inv::<{ $width }, B, C, D, E>(
                    kmax, a, b, beta, c, d, e, inv_diag_e, m1, n1,
                )
            }
        }
    };
}

impl_kernel_set!(Panel4, 4, 12, Panel4);
impl_kernel_set!(Panel8, 8, 16, Panel4);
impl_kernel_set!(Panel12, 12, 200, Panel8);

/// Runtime choice of kernel set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelSet {
    Panel4,
    Panel8,
    Panel12,
}

impl KernelSet {
    /// Picks the widest kernel set the current CPU is known to profit from.
    pub fn detect() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if pulp::x86::V3::try_new().is_some() {
                KernelSet::Panel8
            } else {
                KernelSet::Panel4
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            KernelSet::Panel8
        }
        #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
        {
            KernelSet::Panel4
        }
    }

    #[inline]
    pub fn width(self) -> usize {
        match self {
            KernelSet::Panel4 => Panel4::WIDTH,
            KernelSet::Panel8 => Panel8::WIDTH,
            KernelSet::Panel12 => Panel12::WIDTH,
        }
    }

    /// Orders at or above this use a heap workspace.
    #[inline]
    pub fn heap_threshold(self) -> usize {
        match self {
            KernelSet::Panel4 => Panel4::HEAP_THRESHOLD,
            KernelSet::Panel8 => Panel8::HEAP_THRESHOLD,
            KernelSet::Panel12 => Panel12::HEAP_THRESHOLD,
        }
    }
}

/// 0: not yet detected
/// 1: Panel4
/// 2: Panel8
/// 3: Panel12
static GLOBAL_KERNEL_SET: AtomicUsize = AtomicUsize::new(0);

fn encode(kernels: KernelSet) -> usize {
    match kernels {
        KernelSet::Panel4 => 1,
        KernelSet::Panel8 => 2,
        KernelSet::Panel12 => 3,
    }
}

/// Overrides the kernel set used by the top level factorization functions.
pub fn set_kernel_set(kernels: KernelSet) {
    GLOBAL_KERNEL_SET.store(encode(kernels), Ordering::Relaxed);
}

fn decode(value: usize) -> Option<KernelSet> {
    match value {
        1 => Some(KernelSet::Panel4),
        2 => Some(KernelSet::Panel8),
        3 => Some(KernelSet::Panel12),
        _ => None,
    }
}

/// Stores `detected` unless `global` already holds a kernel set, and returns what `global`
/// holds afterwards.
fn publish_detected(global: &AtomicUsize, detected: KernelSet) -> KernelSet {
    match global.compare_exchange(0, encode(detected), Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => detected,
        Err(stored) => decode(stored).unwrap_or(detected),
    }
}

/// Gets the kernel set used by the top level factorization functions, detecting it on first
/// use.
pub fn get_kernel_set() -> KernelSet {
    match decode(GLOBAL_KERNEL_SET.load(Ordering::Relaxed)) {
        Some(kernels) => kernels,
        None => {
            let detected = KernelSet::detect();
            log::debug!(target: "panel_potrf", "detected kernel set: {detected:?}");
            publish_detected(&GLOBAL_KERNEL_SET, detected)
        }
    }
}
