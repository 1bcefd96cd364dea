//! Linear algebra utilities for principal-axis alignment.
//!
//! This module provides mean-centered PCA with a deterministic sign
//! convention, using nalgebra for the symmetric eigendecomposition.

use crate::error::{FrameError, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Result of PCA computation.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaResult {
    /// Per-column mean of the fitted samples.
    pub mean: DVector<f64>,

    /// Variance along each component, sorted in descending order.
    pub eigenvalues: DVector<f64>,

    /// Principal axes as rows, sorted by corresponding eigenvalue.
    /// `components.row(i)` is the i-th principal axis.
    pub components: DMatrix<f64>,
}

impl PcaResult {
    /// Number of input dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Get the i-th principal axis.
    #[must_use]
    pub fn axis(&self, i: usize) -> Vec<f64> {
        self.components.row(i).iter().copied().collect()
    }

    /// Project one sample onto the principal axes: `components * (row - mean)`.
    ///
    /// `row` and `out` must both have [`Self::dim`] entries.
    pub fn project(&self, row: &[f64], out: &mut [f64]) {
        debug_assert_eq!(row.len(), self.dim());
        debug_assert_eq!(out.len(), self.dim());
        for (i, o) in out.iter_mut().enumerate() {
            *o = self
                .components
                .row(i)
                .iter()
                .zip(row.iter().zip(self.mean.iter()))
                .map(|(c, (r, m))| c * (r - m))
                .sum();
        }
    }
}

/// Compute mean-centered PCA of `samples` (one row per sample).
///
/// # Errors
///
/// Returns an error if there are fewer than two samples, no columns, or the
/// samples contain non-finite values.
pub fn compute_pca(samples: &DMatrix<f64>) -> Result<PcaResult> {
    let (n, d) = samples.shape();
    if n < 2 {
        return Err(FrameError::insufficient_points("principal axes", 2, n));
    }
    if d == 0 {
        return Err(FrameError::linalg("cannot fit principal axes over zero columns"));
    }
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(FrameError::numerical_instability(
            "non-finite coordinate in principal-axis input",
        ));
    }

    let mean = DVector::from_iterator(d, samples.column_iter().map(|c| c.mean()));

    // C = X_c^T X_c / (n - 1)
    let mut centered = samples.clone();
    for (mut column, &m) in centered.column_iter_mut().zip(mean.iter()) {
        column.add_scalar_mut(-m);
    }
    let cov = (centered.transpose() * &centered) / (n - 1) as f64;

    let eigen = SymmetricEigen::new(cov);

    // Collect eigenvalue-eigenvector pairs and sort descending
    let mut pairs: Vec<(f64, DVector<f64>)> = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, eigen.eigenvectors.column(i).into_owned()))
        .collect();

    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let eigenvalues = DVector::from_iterator(d, pairs.iter().map(|(v, _)| *v));
    let components = DMatrix::from_fn(d, d, |i, j| pairs[i].1[j]);

    let mut pca = PcaResult {
        mean,
        eigenvalues,
        components,
    };
    apply_sign_convention(&mut pca);
    Ok(pca)
}

/// Flip each principal axis so its largest-magnitude component is positive.
///
/// Eigendecomposition leaves axis signs arbitrary; this makes repeated fits
/// on identical input agree.
pub fn apply_sign_convention(pca: &mut PcaResult) {
    for i in 0..pca.components.nrows() {
        let row = pca.components.row(i);
        let dominant = row
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);

        if dominant < 0.0 {
            pca.components.row_mut(i).neg_mut();
        }
    }
}

/// Cosine similarity between two vectors, or `0.0` if either has zero length.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na < 1e-12 || nb < 1e-12 {
        return 0.0;
    }
    dot / (na * nb)
}
