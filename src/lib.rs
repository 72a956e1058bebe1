//! `panel-potrf` computes the Cholesky factorization of single precision symmetric positive
//! definite matrices.
//!
//! The factorization of a symmetric positive definite matrix $A$ is such that:
//! $$A = LL^\top = U^\top U,$$
//! where $L$ is lower triangular and $U = L^\top$ is upper triangular.
//!
//! # Entry points
//! - [`spotrf_l`] computes $L$ from the lower triangle,
//! - [`spotrf_u`] computes $U$ from the upper triangle,
//! - [`spotrf_l_mn`] factors the first $n$ columns of an $m \times n$ block, solving the rows
//!   below the leading $n \times n$ block against its factor.
//!
//! Each has an `_in_place` variant, and each is also available as a method of [`KernelSet`] for
//! callers that want to pick the kernels explicitly.
//!
//! # Kernel sets
//! The blocked algorithm works by row-panels of 4, 8 or 12 rows. The panel height used by the top
//! level functions is detected from the host CPU on first use, and can be overridden with
//! [`set_kernel_set`].
//!
//! # Memory
//! Small orders use a fixed-capacity scratch buffer on the call stack. Above a per kernel set
//! threshold, the matrix is packed into a single heap allocation, which requires the `alloc`
//! feature (enabled by default). Without it, such calls abort the process.
//!
//! # Example
//! ```
//! use panel_potrf::{spotrf_l, SMat};
//!
//! let c = SMat::from_fn(3, 3, |i, j| if i == j { 4.0 } else { 1.0 });
//! let mut l = SMat::zeros(3, 3);
//! spotrf_l(3, &c, 0, 0, &mut l, 0, 0).unwrap();
//! assert!((l.read(0, 0) - 2.0).abs() < 1e-6);
//! ```

pub mod kernel;
pub mod mat;
pub mod potrf;
pub mod reference;
pub mod workspace;

pub use kernel::set::{get_kernel_set, set_kernel_set};
pub use kernel::KernelSet;
pub use mat::SMat;
pub use potrf::{
    spotrf_l, spotrf_l_in_place, spotrf_l_mn, spotrf_l_mn_in_place, spotrf_u,
    spotrf_u_in_place, CholeskyError,
};
pub use workspace::{select_workspace, WorkspaceKind, K_MAX_STACK};
