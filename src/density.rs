//! Kernel density estimates of curvilinear coordinates.
//!
//! A [`DensityEstimator`] evaluates a Gaussian KDE of one column of a
//! [`CurvilinearCloud`] on a fixed grid. [`area_error`] compares such an
//! estimate with a reference density by integrating the absolute difference
//! over the grid, which ranges from 0 for identical densities to 2 for
//! densities with disjoint support.

use std::f64::consts::PI;

use rayon::prelude::*;

use crate::error::{FrameError, Result};
use crate::landmarks::SampleCloud;
use crate::mapper::{Coordinate, CurvilinearCloud};
use crate::math::integrate::simpson_sampled;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kernel bandwidth rule.
///
/// The data-driven rules scale the sample standard deviation (`n - 1`
/// denominator) by a factor of the sample count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Bandwidth {
    /// `n^(-1/5)`.
    #[default]
    Scott,
    /// `(3n / 4)^(-1/5)`.
    Silverman,
    /// A fixed kernel width in data units.
    Fixed(f64),
}

impl Bandwidth {
    fn validate(self) -> Result<()> {
        if let Self::Fixed(h) = self {
            if !(h.is_finite() && h > 0.0) {
                return Err(FrameError::invalid_config(format!(
                    "fixed bandwidth must be finite and positive, got {h}"
                )));
            }
        }
        Ok(())
    }
}

/// One-dimensional Gaussian kernel density estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKde {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Build an estimate from `samples`.
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than two samples, a non-finite sample, an
    /// invalid fixed bandwidth, or samples without spread under a
    /// data-driven rule.
    pub fn new(samples: Vec<f64>, bandwidth: Bandwidth) -> Result<Self> {
        let n = samples.len();
        if n < 2 {
            return Err(FrameError::insufficient_points("density", 2, n));
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(FrameError::invalid_input("density samples must be finite"));
        }
        bandwidth.validate()?;

        let h = match bandwidth {
            Bandwidth::Fixed(h) => h,
            rule => {
                let count = n as f64;
                let mean = samples.iter().sum::<f64>() / count;
                let ss: f64 = samples.iter().map(|v| (v - mean) * (v - mean)).sum();
                let sd = (ss / (count - 1.0)).sqrt();
                let factor = match rule {
                    Bandwidth::Silverman => (count * 0.75).powf(-0.2),
                    _ => count.powf(-0.2),
                };
                sd * factor
            }
        };
        if !(h.is_finite() && h > 0.0) {
            return Err(FrameError::degenerate_model(format!(
                "kernel bandwidth {h} from {n} samples"
            )));
        }

        Ok(Self {
            samples,
            bandwidth: h,
        })
    }

    /// Kernel width in data units.
    #[must_use]
    pub const fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Number of samples behind the estimate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; an estimate holds at least two samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Estimated density at `x`.
    #[must_use]
    pub fn density(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let sum: f64 = self
            .samples
            .iter()
            .map(|s| {
                let u = (x - s) / h;
                (-0.5 * u * u).exp()
            })
            .sum();
        sum / (self.samples.len() as f64 * h * (2.0 * PI).sqrt())
    }

    /// Estimated density at every grid point.
    #[must_use]
    pub fn evaluate(&self, grid: &[f64]) -> Vec<f64> {
        grid.iter().map(|&x| self.density(x)).collect()
    }
}

/// Evaluates KDEs of one curvilinear coordinate on a grid.
///
/// # Example
///
/// ```
/// use curvilinear_frame::{Coordinate, CurvilinearCloud, CurvilinearPoint, DensityEstimator};
/// use curvilinear_frame::math::stats::linspace;
///
/// let points = (0..20)
///     .map(|i| {
///         let ac = f64::from(i) - 10.0;
///         CurvilinearPoint { x: ac, y: 0.0, z: 0.0, xc: ac, yc: 0.0, zc: 0.0, r: 0.0, ac, theta: 0.0 }
///     })
///     .collect();
/// let cloud = CurvilinearCloud::from_points(points);
///
/// let grid = linspace(-20.0, 20.0, 81);
/// let pdf = DensityEstimator::new(Coordinate::Ac).estimate(&cloud, &grid)?;
/// assert_eq!(pdf.len(), grid.len());
/// assert!(pdf[40] > pdf[0]);
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DensityEstimator {
    /// Column to estimate.
    pub coordinate: Coordinate,

    /// Estimate the density of absolute values.
    pub absolute: bool,

    /// Kernel bandwidth rule.
    pub bandwidth: Bandwidth,

    /// Share of points used, taken at an even stride, in `(0, 1]`.
    pub sample_fraction: f64,

    /// Estimate batches in parallel.
    pub parallel: bool,
}

impl Default for DensityEstimator {
    fn default() -> Self {
        Self::new(Coordinate::Ac)
    }
}

impl DensityEstimator {
    /// Estimator over `coordinate` using every point and Scott's rule.
    #[must_use]
    pub const fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            absolute: false,
            bandwidth: Bandwidth::Scott,
            sample_fraction: 1.0,
            parallel: true,
        }
    }

    /// Builder: absolute values
    #[must_use]
    pub const fn with_absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }

    /// Builder: bandwidth rule
    #[must_use]
    pub const fn with_bandwidth(mut self, bandwidth: Bandwidth) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Builder: sample fraction
    #[must_use]
    pub const fn with_sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = fraction;
        self
    }

    /// Builder: parallel batches
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error for a sample fraction outside `(0, 1]` or an invalid
    /// fixed bandwidth.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(FrameError::invalid_config(format!(
                "sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        self.bandwidth.validate()
    }

    /// Every `stride`-th point is used.
    fn stride(&self) -> usize {
        ((1.0 / self.sample_fraction).round() as usize).max(1)
    }

    /// Fit the KDE of the selected column of `cloud`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings or when the selected values
    /// cannot support an estimate.
    pub fn fit(&self, cloud: &CurvilinearCloud) -> Result<GaussianKde> {
        self.validate()?;
        let absolute = self.absolute;
        let values: Vec<f64> = cloud
            .column(self.coordinate)
            .step_by(self.stride())
            .map(|v| if absolute { v.abs() } else { v })
            .collect();
        let kde = GaussianKde::new(values, self.bandwidth)?;
        log::debug!(
            "KDE of {:?} from {} of {} points, bandwidth {:.4}",
            self.coordinate,
            kde.len(),
            cloud.len(),
            kde.bandwidth()
        );
        Ok(kde)
    }

    /// Density of the selected column of `cloud` at every grid point.
    ///
    /// # Errors
    ///
    /// See [`DensityEstimator::fit`].
    pub fn estimate(&self, cloud: &CurvilinearCloud, grid: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(cloud)?.evaluate(grid))
    }

    /// Densities of every sample, in input order.
    ///
    /// # Errors
    ///
    /// Returns the first sample's error, tagged with its id.
    pub fn estimate_batch(&self, samples: &[SampleCloud<'_>], grid: &[f64]) -> Result<Vec<Vec<f64>>> {
        let run = |s: &SampleCloud<'_>| {
            self.estimate(s.cloud, grid)
                .map_err(|e| e.in_stage(s.sample_id.to_string(), "density"))
        };
        if self.parallel {
            samples.par_iter().map(run).collect()
        } else {
            samples.iter().map(run).collect()
        }
    }
}

/// Area between a reference density and an estimate over `grid`.
///
/// # Errors
///
/// Returns an error when the lengths differ or the grid is not strictly
/// increasing with at least two points.
pub fn area_error(reference: &[f64], estimate: &[f64], grid: &[f64]) -> Result<f64> {
    if reference.len() != estimate.len() {
        return Err(FrameError::shape_mismatch(
            format!("{} density values", reference.len()),
            format!("{} density values", estimate.len()),
        ));
    }
    let diff: Vec<f64> = reference
        .iter()
        .zip(estimate)
        .map(|(p, q)| (p - q).abs())
        .collect();
    simpson_sampled(&diff, grid)
}

/// [`area_error`] of each estimate against one reference.
///
/// # Errors
///
/// Returns the first failing estimate's error.
pub fn area_errors(reference: &[f64], estimates: &[Vec<f64>], grid: &[f64]) -> Result<Vec<f64>> {
    estimates
        .iter()
        .map(|e| area_error(reference, e, grid))
        .collect()
}
