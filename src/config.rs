//! Configuration for curvilinear alignment.
//!
//! This module provides [`PipelineConfig`], which centralizes every parameter
//! consumed by the per-sample pipeline, plus [`LandmarkConfig`] and
//! [`SweepConfig`] for the batch-level landmark and bin-count stages.
//!
//! # Example
//!
//! ```
//! use curvilinear_frame::PipelineConfig;
//!
//! // Use default configuration
//! let config = PipelineConfig::default();
//! assert!(config.validate().is_ok());
//!
//! // Use a preset and override a few fields
//! let forebrain = PipelineConfig::zebrafish_forebrain()
//!     .with_filter_radius(10)
//!     .with_parallel(false);
//! assert_eq!(forebrain.degree, 2);
//! ```

use std::f64::consts::PI;

use crate::align::{AlignmentMode, AxisAssignment};
use crate::cloud::ScaleVector;
use crate::curve::FitDimensions;
use crate::error::{FrameError, Result};
use crate::math::integrate::QuadratureSettings;
use crate::math::optimize::MinimizerSettings;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for processing one sample.
///
/// # Core Parameters
///
/// - `threshold` / `reference_threshold`: strict lower bounds on voxel value.
/// - `scale` / `microns`: per-axis factors, applied once each.
/// - `degree` / `fit_dim`: the curve model fitted to the reference.
/// - `comp_order`: which principal component plays which canonical axis.
///
/// # Numerical Parameters
///
/// - `degenerate_eps`: leading coefficients below this fall back to a mean vertex.
/// - `projection`: settings for the nearest-curve-point search.
/// - `integration`: settings for the arclength quadrature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    // Thresholds
    /// Voxels of every channel must exceed this value to enter the cloud.
    pub threshold: f64,

    /// Threshold applied to the denoised reference before the axis fit.
    pub reference_threshold: f64,

    // Units
    /// Per-axis multiplier applied after thresholding.
    pub scale: ScaleVector,

    /// Voxel size, indexed `[x, y, z]`.
    pub microns: ScaleVector,

    // Reference preparation
    /// Radius of the disk median filter, in voxels.
    pub filter_radius: usize,

    // Alignment
    /// Which coordinates the principal axes are fit over.
    pub alignment: AlignmentMode,

    /// Principal component feeding each canonical axis.
    pub comp_order: AxisAssignment,

    // Curve model
    /// Polynomial degree, 1 or 2.
    pub degree: usize,

    /// Independent and dependent axes of the curve fit.
    pub fit_dim: FitDimensions,

    /// Leading-coefficient magnitude below which a parabola is degenerate.
    pub degenerate_eps: f64,

    // Numerical settings
    /// Nearest-curve-point minimizer settings.
    pub projection: MinimizerSettings,

    /// Arclength quadrature settings.
    pub integration: QuadratureSettings,

    /// Use rayon for the denoiser planes and the per-point projection.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            reference_threshold: 0.5,

            scale: ScaleVector::identity(),
            microns: ScaleVector::identity(),

            filter_radius: 20,

            alignment: AlignmentMode::Full3d,
            comp_order: AxisAssignment::identity(),

            degree: 2,
            fit_dim: FitDimensions::XZ,
            degenerate_eps: 1e-9,

            projection: MinimizerSettings::default(),
            integration: QuadratureSettings::default(),
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(FrameError::invalid_config("threshold must be finite"));
        }
        if !self.reference_threshold.is_finite() {
            return Err(FrameError::invalid_config(
                "reference_threshold must be finite",
            ));
        }
        self.scale.validate("scale")?;
        self.microns.validate("microns")?;
        if !(1..=2).contains(&self.degree) {
            return Err(FrameError::invalid_config(format!(
                "degree must be 1 or 2, got {}",
                self.degree
            )));
        }
        self.comp_order.validate(self.alignment)?;
        if self.fit_dim.independent == self.fit_dim.dependent {
            return Err(FrameError::invalid_config(
                "fit_dim axes must be distinct",
            ));
        }
        if !(self.degenerate_eps.is_finite() && self.degenerate_eps >= 0.0) {
            return Err(FrameError::invalid_config(
                "degenerate_eps must be non-negative",
            ));
        }
        self.projection.validate("projection")?;
        self.integration.validate("integration")?;
        Ok(())
    }

    /// Preset for the curved forebrain structures this workflow was built on.
    ///
    /// The second principal component is routed to z so the curvature lies
    /// in the x-z plane, which is where the parabola is fit.
    #[must_use]
    pub fn zebrafish_forebrain() -> Self {
        Self {
            threshold: 0.5,
            reference_threshold: 0.5,
            filter_radius: 20,
            degree: 2,
            comp_order: AxisAssignment([0, 2, 1]),
            fit_dim: FitDimensions::XZ,
            ..Self::default()
        }
    }

    /// Preset for references without a parabolic landmark.
    #[must_use]
    pub fn linear_structure() -> Self {
        Self {
            degree: 1,
            ..Self::default()
        }
    }

    /// Set both thresholds.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self.reference_threshold = threshold;
        self
    }

    /// Set the post-threshold scale vector.
    #[must_use]
    pub const fn with_scale(mut self, scale: ScaleVector) -> Self {
        self.scale = scale;
        self
    }

    /// Set the voxel size.
    #[must_use]
    pub const fn with_microns(mut self, microns: ScaleVector) -> Self {
        self.microns = microns;
        self
    }

    /// Set the median filter radius.
    #[must_use]
    pub const fn with_filter_radius(mut self, radius: usize) -> Self {
        self.filter_radius = radius;
        self
    }

    /// Set the polynomial degree.
    #[must_use]
    pub const fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Set the principal component assignment.
    #[must_use]
    pub const fn with_comp_order(mut self, order: AxisAssignment) -> Self {
        self.comp_order = order;
        self
    }

    /// Set the curve-fit axes.
    #[must_use]
    pub const fn with_fit_dim(mut self, fit_dim: FitDimensions) -> Self {
        self.fit_dim = fit_dim;
        self
    }

    /// Set the alignment mode.
    #[must_use]
    pub const fn with_alignment(mut self, mode: AlignmentMode) -> Self {
        self.alignment = mode;
        self
    }

    /// Enable/disable rayon parallelism.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Bin layout and fallbacks for landmark aggregation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandmarkConfig {
    /// Percentiles of `r` computed per bin, each in `[0, 100]`.
    pub percentiles: Vec<f64>,

    /// Radius recorded for bins that produce no value.
    pub rnull: f64,

    /// Number of arclength bins.
    pub ac_num: usize,

    /// Angle bin width in radians; must divide `2π`.
    pub tstep: f64,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            percentiles: vec![50.0],
            rnull: 15.0,
            ac_num: 10,
            tstep: PI / 4.0,
        }
    }
}

impl LandmarkConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or out-of-range percentiles, zero bins,
    /// or an angle step that does not tile the circle.
    pub fn validate(&self) -> Result<()> {
        if self.percentiles.is_empty() {
            return Err(FrameError::invalid_config("percentiles must not be empty"));
        }
        if let Some(p) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(FrameError::invalid_config(format!(
                "percentile {p} is outside [0, 100]"
            )));
        }
        if !self.rnull.is_finite() {
            return Err(FrameError::invalid_config("rnull must be finite"));
        }
        if self.ac_num == 0 {
            return Err(FrameError::invalid_config("ac_num must be at least 1"));
        }
        angle_bin_count(self.tstep)?;
        Ok(())
    }

    /// Set the percentiles.
    #[must_use]
    pub fn with_percentiles(mut self, percentiles: Vec<f64>) -> Self {
        self.percentiles = percentiles;
        self
    }

    /// Set the null radius.
    #[must_use]
    pub const fn with_rnull(mut self, rnull: f64) -> Self {
        self.rnull = rnull;
        self
    }

    /// Set the number of arclength bins.
    #[must_use]
    pub const fn with_ac_num(mut self, ac_num: usize) -> Self {
        self.ac_num = ac_num;
        self
    }

    /// Set the angle bin width.
    #[must_use]
    pub const fn with_tstep(mut self, tstep: f64) -> Self {
        self.tstep = tstep;
        self
    }
}

/// Number of angle bins for a step, checking it tiles `[-π, π]` exactly.
///
/// # Errors
///
/// Returns [`FrameError::InvalidConfig`] if `tstep` is not positive or does
/// not divide `2π`.
pub fn angle_bin_count(tstep: f64) -> Result<usize> {
    if !(tstep.is_finite() && tstep > 0.0) {
        return Err(FrameError::invalid_config("tstep must be positive"));
    }
    let bins = (2.0 * PI / tstep).round();
    if bins < 1.0 || (bins * tstep - 2.0 * PI).abs() > 1e-9 * 2.0 * PI {
        return Err(FrameError::invalid_config(format!(
            "tstep {tstep} does not divide 2π"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(bins as usize)
}

/// Settings for a bin-count sweep.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SweepConfig {
    /// Landmark settings; `ac_num` is overridden per swept value.
    pub landmarks: LandmarkConfig,

    /// Smallest bin count tried.
    pub min_bins: usize,

    /// Largest bin count tried (inclusive).
    pub max_bins: usize,

    /// Degree of the polynomial trend fit to each variance signal.
    pub trend_degree: usize,

    /// Starting point of the minimization over bin count.
    pub initial_guess: f64,

    /// Minimizer used on the summed trend.
    pub minimizer: MinimizerSettings,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            landmarks: LandmarkConfig::default(),
            min_bins: 2,
            max_bins: 40,
            trend_degree: 3,
            initial_guess: 10.0,
            minimizer: MinimizerSettings::default(),
        }
    }
}

impl SweepConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is empty or too short for the trend.
    pub fn validate(&self) -> Result<()> {
        self.landmarks.validate()?;
        if self.min_bins == 0 || self.min_bins > self.max_bins {
            return Err(FrameError::invalid_config(format!(
                "bin range {}..={} is empty",
                self.min_bins, self.max_bins
            )));
        }
        if self.trend_degree == 0 {
            return Err(FrameError::invalid_config("trend_degree must be at least 1"));
        }
        if self.max_bins - self.min_bins < self.trend_degree {
            return Err(FrameError::invalid_config(format!(
                "sweeping {}..={} gives too few counts for a degree {} trend",
                self.min_bins, self.max_bins, self.trend_degree
            )));
        }
        if !self.initial_guess.is_finite() {
            return Err(FrameError::invalid_config("initial_guess must be finite"));
        }
        self.minimizer.validate("minimizer")?;
        Ok(())
    }

    /// Set the swept range.
    #[must_use]
    pub const fn with_range(mut self, min_bins: usize, max_bins: usize) -> Self {
        self.min_bins = min_bins;
        self.max_bins = max_bins;
        self
    }

    /// Set the trend degree.
    #[must_use]
    pub const fn with_trend_degree(mut self, degree: usize) -> Self {
        self.trend_degree = degree;
        self
    }

    /// Set the initial guess.
    #[must_use]
    pub const fn with_initial_guess(mut self, guess: f64) -> Self {
        self.initial_guess = guess;
        self
    }

    /// Bin counts visited by the sweep.
    pub fn bin_counts(&self) -> impl Iterator<Item = usize> {
        self.min_bins..=self.max_bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Axis;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.degree, 2);
        assert_eq!(config.fit_dim, FitDimensions::XZ);
        assert!(config.parallel);
    }

    #[test]
    fn test_forebrain_preset() {
        let config = PipelineConfig::zebrafish_forebrain();
        assert!(config.validate().is_ok());
        assert_eq!(config.comp_order, AxisAssignment([0, 2, 1]));
        assert_eq!(config.filter_radius, 20);
        assert_relative_eq!(config.reference_threshold, 0.5);
    }

    #[test]
    fn test_linear_preset() {
        let config = PipelineConfig::linear_structure();
        assert!(config.validate().is_ok());
        assert_eq!(config.degree, 1);
    }

    #[test]
    fn test_validation() {
        let mut config = PipelineConfig::default();

        config.degree = 3;
        assert!(config.validate().is_err());

        config.degree = 2;
        config.scale = ScaleVector::new(1.0, -1.0, 1.0);
        assert!(config.validate().is_err());

        config.scale = ScaleVector::identity();
        config.comp_order = AxisAssignment([0, 0, 2]);
        assert!(config.validate().is_err());

        config.comp_order = AxisAssignment([0, 2, 1]);
        config.alignment = AlignmentMode::Transverse2d;
        assert!(config.validate().is_ok());

        config.fit_dim = FitDimensions {
            independent: Axis::X,
            dependent: Axis::X,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_tolerances_rejected() {
        let mut config = PipelineConfig::default();
        config.projection.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.integration.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut sweep = SweepConfig::default();
        sweep.minimizer.tolerance = f64::NAN;
        assert!(sweep.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::default()
            .with_threshold(0.3)
            .with_degree(1)
            .with_filter_radius(5)
            .with_parallel(false);
        assert_relative_eq!(config.threshold, 0.3);
        assert_relative_eq!(config.reference_threshold, 0.3);
        assert_eq!(config.degree, 1);
        assert_eq!(config.filter_radius, 5);
        assert!(!config.parallel);
    }

    #[test]
    fn test_angle_bin_count() {
        assert_eq!(angle_bin_count(PI / 4.0).unwrap(), 8);
        assert_eq!(angle_bin_count(2.0 * PI).unwrap(), 1);
        assert!(angle_bin_count(1.0).is_err());
        assert!(angle_bin_count(0.0).is_err());
        assert!(angle_bin_count(-PI).is_err());
    }

    #[test]
    fn test_landmark_validation() {
        assert!(LandmarkConfig::default().validate().is_ok());
        assert!(LandmarkConfig::default()
            .with_percentiles(vec![])
            .validate()
            .is_err());
        assert!(LandmarkConfig::default()
            .with_percentiles(vec![50.0, 101.0])
            .validate()
            .is_err());
        assert!(LandmarkConfig::default().with_ac_num(0).validate().is_err());
        assert!(LandmarkConfig::default().with_tstep(0.7).validate().is_err());
    }

    #[test]
    fn test_sweep_validation() {
        let sweep = SweepConfig::default();
        assert!(sweep.validate().is_ok());
        assert_eq!(sweep.bin_counts().count(), 39);
        assert!(SweepConfig::default().with_range(10, 5).validate().is_err());
        assert!(SweepConfig::default()
            .with_range(4, 5)
            .with_trend_degree(3)
            .validate()
            .is_err());
    }
}
