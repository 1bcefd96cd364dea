//! Curvilinear coordinates relative to a fitted curve.
//!
//! Every point is projected onto the nearest point of the curve by a local
//! 1D minimization started at the point's own independent coordinate. From
//! that foot point the mapper derives the signed arclength from the vertex,
//! the angle around the curve and the radial distance.
//!
//! Points whose projection fails are recorded as [`PointFailure`]s and left
//! out of the mapped output instead of receiving an unconverged estimate.

use rayon::prelude::*;
use thiserror::Error;

use crate::cloud::PointCloud;
use crate::config::PipelineConfig;
use crate::curve::CurveModel;
use crate::error::FrameError;
use crate::math::integrate::{adaptive_simpson, QuadratureSettings};
use crate::math::optimize::{minimize_scalar, MinimizeFailure, MinimizerSettings};
use crate::math::polynomial::Polynomial;
use crate::math::stats;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One point in curvilinear coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurvilinearPoint {
    /// Aligned input coordinates.
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Nearest point on the curve.
    pub xc: f64,
    pub yc: f64,
    pub zc: f64,
    /// Distance to the curve.
    pub r: f64,
    /// Signed arclength from the vertex to `(xc, yc, zc)`.
    pub ac: f64,
    /// Angle around the curve, in `[-π, π]`.
    pub theta: f64,
}

/// One column of a [`CurvilinearCloud`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Coordinate {
    X,
    Y,
    Z,
    Xc,
    Yc,
    Zc,
    R,
    Ac,
    Theta,
}

impl Coordinate {
    /// This coordinate of `point`.
    #[must_use]
    pub const fn of(self, point: &CurvilinearPoint) -> f64 {
        match self {
            Self::X => point.x,
            Self::Y => point.y,
            Self::Z => point.z,
            Self::Xc => point.xc,
            Self::Yc => point.yc,
            Self::Zc => point.zc,
            Self::R => point.r,
            Self::Ac => point.ac,
            Self::Theta => point.theta,
        }
    }
}

/// Why a single point could not be mapped.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ProjectionFailure {
    /// The nearest-point search failed.
    #[error(transparent)]
    Minimizer(#[from] MinimizeFailure),

    /// The arclength integral came out non-finite.
    #[error("arclength is not finite ({value})")]
    Arclength { value: f64 },

    /// The arclength quadrature hit its depth limit before meeting the
    /// tolerance.
    #[error("arclength quadrature unresolved at depth limit (error estimate {error_estimate:e})")]
    ArclengthUnresolved { error_estimate: f64 },
}

/// A point that was excluded from the mapped cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointFailure {
    /// Row of the point in the input cloud.
    pub index: usize,
    /// Input coordinates.
    pub point: [f64; 3],
    /// What went wrong.
    pub reason: ProjectionFailure,
}

impl PointFailure {
    /// This failure as a crate error.
    #[must_use]
    pub fn to_error(&self) -> FrameError {
        FrameError::non_convergence(self.index, self.reason.to_string())
    }
}

/// Output of [`CurvilinearMapper::map`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurvilinearCloud {
    points: Vec<CurvilinearPoint>,
    source_indices: Vec<usize>,
    failures: Vec<PointFailure>,
}

impl CurvilinearCloud {
    /// Build a cloud from already mapped points, with no failures.
    #[must_use]
    pub fn from_points(points: Vec<CurvilinearPoint>) -> Self {
        let source_indices = (0..points.len()).collect();
        Self {
            points,
            source_indices,
            failures: Vec::new(),
        }
    }

    /// Mapped points in input order.
    #[must_use]
    pub fn points(&self) -> &[CurvilinearPoint] {
        &self.points
    }

    /// Input row of each mapped point.
    #[must_use]
    pub fn source_indices(&self) -> &[usize] {
        &self.source_indices
    }

    /// Points that could not be mapped.
    #[must_use]
    pub fn failures(&self) -> &[PointFailure] {
        &self.failures
    }

    /// Number of mapped points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of rows in the input cloud.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.points.len() + self.failures.len()
    }

    /// Values of one column, in point order.
    pub fn column(&self, coordinate: Coordinate) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(move |p| coordinate.of(p))
    }

    /// Arclength column.
    #[must_use]
    pub fn arclengths(&self) -> Vec<f64> {
        self.column(Coordinate::Ac).collect()
    }

    /// Arclength rescaled to `[-1, 1]`, each side of the vertex separately.
    #[must_use]
    pub fn normalized_arclength(&self) -> Vec<f64> {
        stats::rescale_signed(&self.arclengths())
    }

    /// Smallest and largest arclength, or `None` when empty.
    #[must_use]
    pub fn arclength_range(&self) -> Option<(f64, f64)> {
        self.points.iter().map(|p| p.ac).fold(None, |acc, ac| match acc {
            None => Some((ac, ac)),
            Some((lo, hi)) => Some((lo.min(ac), hi.max(ac))),
        })
    }
}

/// Maps aligned, vertex-centered clouds onto a [`CurveModel`].
///
/// The independent fit axis plays `x`, the dependent one `z` and the
/// remaining axis `y`; the curve lies in the plane where the remaining
/// coordinate is zero.
///
/// # Example
///
/// ```
/// use curvilinear_frame::{CurveModel, CurvilinearMapper, FitDimensions, PointCloud};
/// use curvilinear_frame::math::Polynomial;
///
/// let model = CurveModel::new(Polynomial::new(vec![1.0, 0.0, 0.0])?, FitDimensions::XZ)?;
/// let cloud = PointCloud::from_points(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 1.0]]);
///
/// let mapped = CurvilinearMapper::new(&model).map(&cloud);
/// assert_eq!(mapped.len(), 2);
/// assert_eq!(mapped.points()[0].ac, 0.0);
/// assert!(mapped.points()[1].ac > 1.0);
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CurvilinearMapper<'a> {
    model: &'a CurveModel,
    slope: Polynomial,
    projection: MinimizerSettings,
    integration: QuadratureSettings,
    parallel: bool,
}

impl<'a> CurvilinearMapper<'a> {
    /// Create a mapper with default numerical settings.
    #[must_use]
    pub fn new(model: &'a CurveModel) -> Self {
        Self {
            model,
            slope: model.polynomial().derivative(),
            projection: MinimizerSettings::default(),
            integration: QuadratureSettings::default(),
            parallel: true,
        }
    }

    /// Create a mapper using the pipeline's numerical settings.
    #[must_use]
    pub fn from_config(model: &'a CurveModel, config: &PipelineConfig) -> Self {
        Self::new(model)
            .with_projection(config.projection)
            .with_integration(config.integration)
            .with_parallel(config.parallel)
    }

    /// Set the nearest-point minimizer settings.
    #[must_use]
    pub const fn with_projection(mut self, settings: MinimizerSettings) -> Self {
        self.projection = settings;
        self
    }

    /// Set the arclength quadrature settings.
    #[must_use]
    pub const fn with_integration(mut self, settings: QuadratureSettings) -> Self {
        self.integration = settings;
        self
    }

    /// Enable/disable rayon over points.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Signed arclength of the curve from the vertex (`u = 0`) to `u`.
    ///
    /// # Errors
    ///
    /// Fails if the quadrature is cut off at its depth limit or the result
    /// is not finite.
    pub fn arclength(&self, u: f64) -> Result<f64, ProjectionFailure> {
        let q = adaptive_simpson(|t| self.slope.eval(t).hypot(1.0), 0.0, u, &self.integration);
        if q.depth_limited {
            return Err(ProjectionFailure::ArclengthUnresolved {
                error_estimate: q.error_estimate,
            });
        }
        if !q.value.is_finite() {
            return Err(ProjectionFailure::Arclength { value: q.value });
        }
        Ok(q.value)
    }

    /// Map a single point.
    ///
    /// # Errors
    ///
    /// Returns a [`PointFailure`] tagged with `index` if the nearest point
    /// cannot be found or its arclength cannot be resolved.
    pub fn project_point(&self, index: usize, point: &[f64; 3]) -> Result<CurvilinearPoint, PointFailure> {
        let fail = |reason: ProjectionFailure| PointFailure {
            index,
            point: *point,
            reason,
        };

        let dims = self.model.fit_dim();
        let u = point[dims.independent.index()];
        let w = point[dims.dependent.index()];
        let v = point[self.model.remaining().index()];
        let curve = self.model.polynomial();

        let nearest = minimize_scalar(
            |t| {
                let du = t - u;
                let dw = curve.eval(t) - w;
                du * du + dw * dw
            },
            u,
            &self.projection,
        )
        .map_err(|e| fail(e.into()))?;

        let uc = nearest.x;
        let wc = curve.eval(uc);
        let ac = self.arclength(uc).map_err(fail)?;

        let dw = w - wc;
        let mut foot = [0.0; 3];
        foot[dims.independent.index()] = uc;
        foot[dims.dependent.index()] = wc;

        Ok(CurvilinearPoint {
            x: point[0],
            y: point[1],
            z: point[2],
            xc: foot[0],
            yc: foot[1],
            zc: foot[2],
            r: dw.hypot(v),
            ac,
            theta: v.atan2(dw),
        })
    }

    /// Map every point of `cloud`.
    ///
    /// Output order follows input order whether or not rayon is used.
    #[must_use]
    pub fn map(&self, cloud: &PointCloud) -> CurvilinearCloud {
        let results: Vec<Result<CurvilinearPoint, PointFailure>> = if self.parallel {
            cloud
                .points()
                .par_iter()
                .enumerate()
                .map(|(i, p)| self.project_point(i, p))
                .collect()
        } else {
            cloud
                .points()
                .iter()
                .enumerate()
                .map(|(i, p)| self.project_point(i, p))
                .collect()
        };

        let mut out = CurvilinearCloud {
            points: Vec::with_capacity(results.len()),
            source_indices: Vec::with_capacity(results.len()),
            failures: Vec::new(),
        };
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(p) => {
                    out.points.push(p);
                    out.source_indices.push(i);
                }
                Err(f) => out.failures.push(f),
            }
        }

        if !out.failures.is_empty() {
            log::warn!(
                "{} of {} points did not project onto the curve; first: {}",
                out.failures.len(),
                cloud.len(),
                out.failures[0].to_error()
            );
        }
        log::debug!("Mapped {} points onto curve", out.points.len());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::FitDimensions;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn model(coefficients: Vec<f64>) -> CurveModel {
        CurveModel::new(Polynomial::new(coefficients).unwrap(), FitDimensions::XZ).unwrap()
    }

    fn parabola_arclength(x: f64) -> f64 {
        // Closed form for z = x^2.
        let s = (1.0 + 4.0 * x * x).sqrt();
        0.5 * x * s + 0.25 * (2.0 * x + s).ln()
    }

    #[test]
    fn test_straight_line_coordinates() {
        let line = model(vec![0.0, 0.0]);
        let mapper = CurvilinearMapper::new(&line);

        let p = mapper.project_point(0, &[3.0, 2.0, 4.0]).unwrap();
        assert_relative_eq!(p.xc, 3.0, epsilon = 1e-7);
        assert_relative_eq!(p.zc, 0.0);
        assert_relative_eq!(p.yc, 0.0);
        assert_relative_eq!(p.ac, 3.0, epsilon = 1e-7);
        assert_relative_eq!(p.r, 20f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(p.theta, 2f64.atan2(4.0), epsilon = 1e-12);

        let q = mapper.project_point(1, &[-2.0, 0.0, -1.0]).unwrap();
        assert_relative_eq!(q.ac, -2.0, epsilon = 1e-7);
        assert_relative_eq!(q.theta, PI, epsilon = 1e-12);
    }

    #[test]
    fn test_points_on_curve() {
        let curve = model(vec![1.0, 0.0, 0.0]);
        let mapper = CurvilinearMapper::new(&curve);
        let cloud = PointCloud::from_points(
            (-8..=8)
                .map(|i| {
                    let x = f64::from(i) * 0.25;
                    [x, 0.0, x * x]
                })
                .collect(),
        );

        let mapped = mapper.map(&cloud);
        assert_eq!(mapped.len(), cloud.len());
        assert!(mapped.failures().is_empty());

        let mut previous = f64::NEG_INFINITY;
        for p in mapped.points() {
            assert_eq!(p.r, 0.0);
            assert!(p.ac >= previous);
            previous = p.ac;
            assert_relative_eq!(p.ac, parabola_arclength(p.x), epsilon = 1e-8);
            assert!(p.ac * p.x >= 0.0);
        }
        assert_eq!(mapped.points()[8].ac, 0.0);
    }

    #[test]
    fn test_off_curve_point_along_normal() {
        let curve = model(vec![1.0, 0.0, 0.0]);
        let mapper = CurvilinearMapper::new(&curve);
        // Unit normal at (1, 1) is (-2, 1) / sqrt(5).
        let d = 0.5;
        let n = 5f64.sqrt();
        let p = mapper
            .project_point(0, &[1.0 - 2.0 * d / n, 0.0, 1.0 + d / n])
            .unwrap();

        assert_relative_eq!(p.xc, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.zc, 1.0, epsilon = 1e-6);
        // r is measured in the plane orthogonal to the independent axis.
        assert_relative_eq!(p.r, d / n, epsilon = 1e-6);
        assert_relative_eq!(p.theta, 0.0, epsilon = 1e-12);
        assert!(p.r >= 0.0);
    }

    #[test]
    fn test_non_convergence_is_recorded() {
        let curve = model(vec![1.0, 0.0, 0.0]);
        let settings = MinimizerSettings {
            max_iterations: 1,
            ..MinimizerSettings::default()
        };
        let mapper = CurvilinearMapper::new(&curve)
            .with_projection(settings)
            .with_parallel(false);
        let cloud = PointCloud::from_points(vec![[1.0, 0.5, 3.0], [-2.0, 0.0, 1.0]]);

        let mapped = mapper.map(&cloud);
        assert!(mapped.is_empty());
        assert_eq!(mapped.input_len(), 2);
        assert_eq!(mapped.failures()[1].index, 1);
        assert!(matches!(
            mapped.failures()[0].reason,
            ProjectionFailure::Minimizer(MinimizeFailure::MaxIterations { .. })
        ));
        assert!(matches!(
            mapped.failures()[0].to_error(),
            FrameError::ProjectionNonConvergence { index: 0, .. }
        ));
    }

    #[test]
    fn test_unresolved_arclength_is_recorded() {
        let curve = model(vec![1.0, 0.0, 0.0]);
        let settings = QuadratureSettings {
            max_depth: 0,
            ..QuadratureSettings::default()
        };
        let mapper = CurvilinearMapper::new(&curve)
            .with_integration(settings)
            .with_parallel(false);
        let cloud = PointCloud::from_points(vec![[3.0, 0.0, 9.0], [-2.0, 0.5, 4.0]]);

        let mapped = mapper.map(&cloud);
        assert!(mapped.is_empty());
        assert_eq!(mapped.failures().len(), 2);
        for failure in mapped.failures() {
            assert!(matches!(
                failure.reason,
                ProjectionFailure::ArclengthUnresolved { .. }
            ));
        }
        assert!(matches!(
            mapper.arclength(3.0),
            Err(ProjectionFailure::ArclengthUnresolved { error_estimate }) if error_estimate > 0.0
        ));

        let resolved = CurvilinearMapper::new(&curve).arclength(3.0).unwrap();
        assert_relative_eq!(resolved, parabola_arclength(3.0), epsilon = 1e-8);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let curve = model(vec![0.3, -0.1, 0.0]);
        let cloud = PointCloud::from_points(
            (0..40)
                .map(|i| {
                    let t = f64::from(i) * 0.37 - 7.0;
                    [t, (t * 1.3).sin(), 0.3 * t * t + (t * 0.7).cos()]
                })
                .collect(),
        );

        let parallel = CurvilinearMapper::new(&curve).with_parallel(true).map(&cloud);
        let sequential = CurvilinearMapper::new(&curve).with_parallel(false).map(&cloud);
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_normalized_arclength() {
        let line = model(vec![0.0, 0.0]);
        let cloud = PointCloud::from_points(vec![[-4.0, 0.0, 1.0], [2.0, 0.0, 1.0], [1.0, 0.0, 1.0]]);
        let mapped = CurvilinearMapper::new(&line).map(&cloud);

        let normalized = mapped.normalized_arclength();
        assert_relative_eq!(normalized[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(normalized[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(normalized[2], 0.5, epsilon = 1e-9);

        let (lo, hi) = mapped.arclength_range().unwrap();
        assert_relative_eq!(lo, -4.0, epsilon = 1e-7);
        assert_relative_eq!(hi, 2.0, epsilon = 1e-7);
    }

    #[test]
    fn test_remaining_axis_follows_fit_dim() {
        // Curve in the x-y plane; z is the remaining axis.
        let fit_dim = FitDimensions::new(crate::cloud::Axis::X, crate::cloud::Axis::Y).unwrap();
        let curve = CurveModel::new(Polynomial::new(vec![0.0, 0.0]).unwrap(), fit_dim).unwrap();
        let p = CurvilinearMapper::new(&curve)
            .project_point(0, &[1.0, 3.0, -4.0])
            .unwrap();
        assert_relative_eq!(p.xc, 1.0, epsilon = 1e-7);
        assert_relative_eq!(p.yc, 0.0);
        assert_relative_eq!(p.zc, 0.0);
        assert_relative_eq!(p.r, 5.0, epsilon = 1e-9);
        assert_relative_eq!(p.theta, (-4f64).atan2(3.0), epsilon = 1e-12);
    }
}
