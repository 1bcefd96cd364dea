//! Bin-count calibration.
//!
//! This module sweeps the number of arclength bins and, for each count,
//! measures two variance signals on one percentile's landmark radii:
//!
//! - inter-sample variance: variance across samples of each bin
//! - inter-bin variance: variance of each bin with its two arclength
//!   neighbours, per sample
//!
//! Both signals are normalized, a polynomial trend is fit to each against
//! the bin count, and the count minimizing the summed trends near an initial
//! guess is selected.

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::SweepConfig;
use crate::error::{FrameError, Result};
use crate::landmarks::{AggregationMode, BinEdges, LandmarkAggregator, LandmarkGrid, SampleCloud};
use crate::math::optimize::minimize_scalar;
use crate::math::polynomial::Polynomial;
use crate::math::stats;

/// Variance signals for one swept bin count.
#[derive(Debug, Clone, PartialEq)]
pub struct BinCountProfile {
    /// Number of arclength bins.
    pub bin_count: usize,

    /// Inter-sample variance, `[arclength bin, angle bin]`.
    pub sample_variance: Array2<f64>,

    /// Inter-bin variance, `[(interior bin, angle bin), sample]`.
    pub neighbor_variance: Array2<f64>,

    /// Mean of the finite entries of `sample_variance`.
    pub mean_sample_variance: f64,

    /// Mean of the finite entries of `neighbor_variance`; NaN with fewer
    /// than three bins.
    pub mean_neighbor_variance: f64,
}

impl BinCountProfile {
    /// Whether both mean signals are usable for trend fitting.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.mean_sample_variance.is_finite() && self.mean_neighbor_variance.is_finite()
    }
}

/// Outcome of a bin-count selection.
#[derive(Debug, Clone, PartialEq)]
pub struct BinCountSelection {
    /// Local minimum of the summed trends.
    pub optimum: f64,

    /// `optimum` rounded and clamped to the swept range.
    pub recommended: usize,

    /// Whether `optimum` lies inside the swept range.
    pub within_sweep: bool,

    /// Trend of the normalized inter-sample variance.
    pub sample_trend: Polynomial,

    /// Trend of the normalized inter-bin variance.
    pub neighbor_trend: Polynomial,
}

/// Sweeps bin counts and selects one.
///
/// # Example
///
/// ```
/// use curvilinear_frame::{BinCountOptimizer, SweepConfig};
///
/// let optimizer = BinCountOptimizer::new(SweepConfig::default().with_range(3, 12))?;
/// assert_eq!(optimizer.bin_counts().len(), 10);
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BinCountOptimizer {
    config: SweepConfig,
    percentile: f64,
    parallel: bool,
}

impl BinCountOptimizer {
    /// Create an optimizer using the first configured percentile.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweep configuration is invalid.
    pub fn new(config: SweepConfig) -> Result<Self> {
        config.validate()?;
        let percentile = config.landmarks.percentiles[0];
        Ok(Self {
            config,
            percentile,
            parallel: true,
        })
    }

    /// Use a different percentile of the landmark radii.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] outside `[0, 100]`.
    pub fn with_percentile(mut self, percentile: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(FrameError::invalid_config(format!(
                "percentile {percentile} is outside [0, 100]"
            )));
        }
        self.percentile = percentile;
        Ok(self)
    }

    /// Enable/disable rayon across bin counts.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Bin counts visited by [`Self::sweep`].
    #[must_use]
    pub fn bin_counts(&self) -> Vec<usize> {
        self.config.bin_counts().collect()
    }

    /// Variance signals for a single bin count.
    ///
    /// # Errors
    ///
    /// Returns an error with fewer than two samples.
    pub fn profile(&self, samples: &[SampleCloud<'_>], bin_count: usize) -> Result<BinCountProfile> {
        if samples.len() < 2 {
            return Err(FrameError::insufficient_points(
                "bin-count sweep",
                2,
                samples.len(),
            ));
        }

        let landmarks = &self.config.landmarks;
        let edges = BinEdges::from_clouds(samples.iter().map(|s| s.cloud), bin_count, landmarks.tstep)?;
        let aggregator = LandmarkAggregator::new(edges, vec![self.percentile], landmarks.rnull)?
            .with_parallel(self.parallel);
        let table = aggregator.aggregate_batch(samples, AggregationMode::Percentile);
        let grid = LandmarkGrid::from_table(&table, self.percentile)?;

        let sample_variance = grid.sample_variance();
        let neighbor_variance = grid.neighbor_variance();
        let profile = BinCountProfile {
            bin_count,
            mean_sample_variance: finite_mean(sample_variance.iter().copied()),
            mean_neighbor_variance: finite_mean(neighbor_variance.iter().copied()),
            sample_variance,
            neighbor_variance,
        };

        log::debug!(
            "Bin count {}: sample variance {:.4}, inter-bin variance {:.4}",
            bin_count,
            profile.mean_sample_variance,
            profile.mean_neighbor_variance
        );
        Ok(profile)
    }

    /// Profiles for every configured bin count, in increasing order.
    ///
    /// # Errors
    ///
    /// Fails on the first bin count that cannot be profiled.
    pub fn sweep(&self, samples: &[SampleCloud<'_>]) -> Result<Vec<BinCountProfile>> {
        let counts = self.bin_counts();
        if self.parallel {
            counts.par_iter().map(|&n| self.profile(samples, n)).collect()
        } else {
            counts.iter().map(|&n| self.profile(samples, n)).collect()
        }
    }

    /// Fit trends to the profiles and minimize their sum.
    ///
    /// Profiles without a finite inter-bin signal (fewer than three bins)
    /// are left out of the fit.
    ///
    /// # Errors
    ///
    /// Returns an error if too few profiles are usable for the trend degree
    /// or no local minimum is found near the initial guess.
    pub fn select(&self, profiles: &[BinCountProfile]) -> Result<BinCountSelection> {
        let usable: Vec<&BinCountProfile> = profiles.iter().filter(|p| p.is_usable()).collect();
        let degree = self.config.trend_degree;
        if usable.len() <= degree {
            return Err(FrameError::insufficient_points(
                "bin-count trend",
                degree + 1,
                usable.len(),
            ));
        }

        let counts: Vec<f64> = usable.iter().map(|p| p.bin_count as f64).collect();
        let sample_signal: Vec<f64> = usable.iter().map(|p| p.mean_sample_variance).collect();
        let neighbor_signal: Vec<f64> = usable.iter().map(|p| p.mean_neighbor_variance).collect();

        let sample_trend = Polynomial::fit(&counts, &stats::l2_normalize(&sample_signal), degree)?;
        let neighbor_trend = Polynomial::fit(&counts, &stats::l2_normalize(&neighbor_signal), degree)?;
        let total = sample_trend.add(&neighbor_trend);

        let minimum = minimize_scalar(
            |n| total.eval(n),
            self.config.initial_guess,
            &self.config.minimizer,
        )
        .map_err(|e| FrameError::degenerate_model(format!("summed bin-count trend: {e}")))?;

        let lo = counts.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = counts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let within_sweep = (lo..=hi).contains(&minimum.x);
        if !within_sweep {
            log::warn!(
                "Bin-count optimum {:.2} lies outside the swept range {lo}..={hi}",
                minimum.x
            );
        }
        let recommended = minimum.x.round().clamp(lo, hi) as usize;

        log::info!(
            "Selected {recommended} arclength bins (optimum {:.3}, {} profiles)",
            minimum.x,
            usable.len()
        );

        Ok(BinCountSelection {
            optimum: minimum.x,
            recommended,
            within_sweep,
            sample_trend,
            neighbor_trend,
        })
    }

    /// Sweep, then select.
    ///
    /// # Errors
    ///
    /// See [`Self::sweep`] and [`Self::select`].
    pub fn optimize(&self, samples: &[SampleCloud<'_>]) -> Result<(Vec<BinCountProfile>, BinCountSelection)> {
        let profiles = self.sweep(samples)?;
        let selection = self.select(&profiles)?;
        Ok((profiles, selection))
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> f64 {
    let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    stats::mean(&finite).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{CurvilinearCloud, CurvilinearPoint};
    use approx::assert_relative_eq;

    fn synthetic_profile(bin_count: usize, sample: f64, neighbor: f64) -> BinCountProfile {
        BinCountProfile {
            bin_count,
            sample_variance: Array2::zeros((0, 0)),
            neighbor_variance: Array2::zeros((0, 0)),
            mean_sample_variance: sample,
            mean_neighbor_variance: neighbor,
        }
    }

    fn sample_cloud(seed: f64) -> CurvilinearCloud {
        let points = (0..200)
            .map(|i| {
                let k = f64::from(i);
                let ac = (k * 0.137 + seed).sin() * 8.0;
                let theta = (k * 0.731 + seed * 2.0).sin() * 3.0;
                let r = 2.0 + (k * 0.29 + seed).cos().abs() * (1.0 + 0.1 * ac.abs());
                CurvilinearPoint {
                    x: ac,
                    y: 0.0,
                    z: 0.0,
                    xc: ac,
                    yc: 0.0,
                    zc: 0.0,
                    r,
                    ac,
                    theta,
                }
            })
            .collect();
        CurvilinearCloud::from_points(points)
    }

    #[test]
    fn test_select_finds_trend_minimum() {
        let mut profiles = vec![synthetic_profile(2, 1.0, f64::NAN)];
        profiles.extend((3..=30).map(|n| {
            let d = n as f64 - 12.0;
            synthetic_profile(n, d * d + 1.0, 5.0)
        }));

        let optimizer = BinCountOptimizer::new(SweepConfig::default().with_range(2, 30)).unwrap();
        let selection = optimizer.select(&profiles).unwrap();

        assert_relative_eq!(selection.optimum, 12.0, epsilon = 1e-3);
        assert_eq!(selection.recommended, 12);
        assert!(selection.within_sweep);
    }

    #[test]
    fn test_select_needs_enough_profiles() {
        let profiles = vec![
            synthetic_profile(3, 1.0, 1.0),
            synthetic_profile(4, 2.0, 1.0),
            synthetic_profile(5, 3.0, f64::NAN),
        ];
        let optimizer = BinCountOptimizer::new(SweepConfig::default()).unwrap();
        assert!(matches!(
            optimizer.select(&profiles),
            Err(FrameError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn test_profile_shapes() {
        let clouds: Vec<CurvilinearCloud> = (0..3).map(|s| sample_cloud(f64::from(s))).collect();
        let samples: Vec<SampleCloud<'_>> = clouds
            .iter()
            .enumerate()
            .map(|(i, cloud)| SampleCloud {
                sample_id: i as u64,
                group: "wt",
                cloud,
            })
            .collect();

        let optimizer = BinCountOptimizer::new(SweepConfig::default().with_range(2, 8))
            .unwrap()
            .with_parallel(false);

        let two = optimizer.profile(&samples, 2).unwrap();
        assert_eq!(two.sample_variance.dim(), (2, 8));
        assert_eq!(two.neighbor_variance.dim(), (0, 3));
        assert!(!two.is_usable());

        let five = optimizer.profile(&samples, 5).unwrap();
        assert_eq!(five.neighbor_variance.dim(), (3 * 8, 3));
        assert!(five.is_usable());
        assert!(five.mean_sample_variance >= 0.0);

        let sweep = optimizer.sweep(&samples).unwrap();
        assert_eq!(sweep.len(), 7);
        assert_eq!(sweep[0].bin_count, 2);
        assert_eq!(sweep[6].bin_count, 8);
    }

    #[test]
    fn test_profile_needs_two_samples() {
        let cloud = sample_cloud(0.0);
        let samples = [SampleCloud {
            sample_id: 1,
            group: "wt",
            cloud: &cloud,
        }];
        let optimizer = BinCountOptimizer::new(SweepConfig::default()).unwrap();
        assert!(optimizer.profile(&samples, 4).is_err());
    }
}
