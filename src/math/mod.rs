//! Mathematical utilities for curvilinear alignment.
//!
//! This module provides:
//! - [`linalg`]: PCA and eigendecomposition
//! - [`polynomial`]: polynomial evaluation and least-squares fitting
//! - [`optimize`]: bracketed 1D minimization (Brent)
//! - [`integrate`]: adaptive and sampled Simpson quadrature
//! - [`stats`]: percentiles, variances, rescaling

pub mod integrate;
pub mod linalg;
pub mod optimize;
pub mod polynomial;
pub mod stats;

pub use integrate::{adaptive_simpson, simpson_sampled, QuadratureSettings};
pub use linalg::{compute_pca, PcaResult};
pub use optimize::{minimize_scalar, MinimizeFailure, MinimizerSettings, Minimum};
pub use polynomial::Polynomial;
