//! Curve model fitting and orientation normalization.
//!
//! A polynomial of degree 1 or 2 is fit to an aligned reference cloud over
//! two chosen axes. Its vertex becomes the origin of the sample and, for
//! parabolas, the cloud is turned half way around the axis orthogonal to the
//! fit plane when needed so curvature always opens towards the positive
//! dependent axis.

use crate::cloud::{Axis, PointCloud};
use crate::config::PipelineConfig;
use crate::error::{FrameError, Result};
use crate::mapper::{CurvilinearCloud, CurvilinearMapper};
use crate::math::polynomial::Polynomial;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How many spans of the independent data range a parabola's turning point
/// may lie beyond the data before the fit counts as degenerate.
pub const VERTEX_REACH: f64 = 1.0;

/// The `[independent, dependent]` axis pair a curve is fit over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitDimensions {
    /// Axis the polynomial is evaluated along.
    pub independent: Axis,
    /// Axis the polynomial predicts.
    pub dependent: Axis,
}

impl Default for FitDimensions {
    fn default() -> Self {
        Self::XZ
    }
}

impl FitDimensions {
    /// `x` independent, `z` dependent.
    pub const XZ: Self = Self {
        independent: Axis::X,
        dependent: Axis::Z,
    };

    /// Create an axis pair.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] if both axes are the same.
    pub fn new(independent: Axis, dependent: Axis) -> Result<Self> {
        let dims = Self {
            independent,
            dependent,
        };
        dims.remaining()?;
        Ok(dims)
    }

    /// The axis not involved in the fit.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] if both axes are the same.
    pub fn remaining(&self) -> Result<Axis> {
        self.independent.remaining(self.dependent).ok_or_else(|| {
            FrameError::invalid_config(format!(
                "fit_dim axes must differ, got [{}, {}]",
                self.independent, self.dependent
            ))
        })
    }
}

/// A fitted polynomial together with the axes it relates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurveModel {
    polynomial: Polynomial,
    fit_dim: FitDimensions,
    remaining: Axis,
}

impl CurveModel {
    /// Wrap a polynomial over `fit_dim`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] if the axes coincide.
    pub fn new(polynomial: Polynomial, fit_dim: FitDimensions) -> Result<Self> {
        let remaining = fit_dim.remaining()?;
        Ok(Self {
            polynomial,
            fit_dim,
            remaining,
        })
    }

    /// Underlying polynomial.
    #[must_use]
    pub const fn polynomial(&self) -> &Polynomial {
        &self.polynomial
    }

    /// Axes of the fit.
    #[must_use]
    pub const fn fit_dim(&self) -> FitDimensions {
        self.fit_dim
    }

    /// Axis orthogonal to the fit plane.
    #[must_use]
    pub const fn remaining(&self) -> Axis {
        self.remaining
    }

    /// Coefficients, highest degree first.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        self.polynomial.coefficients()
    }

    /// Polynomial degree.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.polynomial.degree()
    }

    /// Evaluate the curve at an independent coordinate.
    #[must_use]
    pub fn eval(&self, u: f64) -> f64 {
        self.polynomial.eval(u)
    }
}

/// How the vertex of a sample was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VertexSource {
    /// Turning point `-b / 2a` of a parabola.
    Parabola,
    /// Mean of the independent axis on a degree-1 fit.
    Mean,
    /// The parabola was too flat for its turning point to lie near the
    /// data; the mean vertex was used instead.
    DegenerateFallback,
    /// Passed in by the caller.
    Supplied,
}

/// Externally supplied pieces of a curve fit.
///
/// Secondary channels of a sample pass the primary channel's model, vertex
/// and flip here so every channel shares one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveOptions {
    /// Use this model for mapping instead of refitting.
    pub model: Option<CurveModel>,
    /// Translate to this vertex instead of deriving one.
    pub vertex: Option<[f64; 3]>,
    /// Force (`Some(true)`) or suppress (`Some(false)`) the half turn.
    pub flip: Option<bool>,
}

impl CurveOptions {
    /// Options reusing a frame decided elsewhere.
    #[must_use]
    pub const fn shared(model: CurveModel, vertex: [f64; 3], flip: bool) -> Self {
        Self {
            model: Some(model),
            vertex: Some(vertex),
            flip: Some(flip),
        }
    }
}

/// A vertex-centered, oriented cloud and the model to map it with.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    /// Cloud translated to the vertex and possibly turned.
    pub cloud: PointCloud,
    /// Model used for curvilinear mapping.
    pub model: CurveModel,
    /// Vertex in the aligned input frame.
    pub vertex: [f64; 3],
    /// Where the vertex came from.
    pub vertex_source: VertexSource,
    /// Whether the half turn was applied.
    pub flipped: bool,
}

/// Fits curve models and normalizes sample pose.
///
/// # Example
///
/// ```
/// use curvilinear_frame::{CurveModelFitter, CurveOptions, FitDimensions, PointCloud};
///
/// let points = (-4..=4)
///     .map(|i| {
///         let x = f64::from(i);
///         [x, 0.0, 0.5 * x * x - 2.0 * x + 1.0]
///     })
///     .collect();
/// let cloud = PointCloud::from_points(points);
///
/// let fitter = CurveModelFitter::new(2, FitDimensions::XZ)?;
/// let fit = fitter.fit(&cloud, &CurveOptions::default())?;
/// assert!((fit.vertex[0] - 2.0).abs() < 1e-9);
/// assert!(!fit.flipped);
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveModelFitter {
    degree: usize,
    fit_dim: FitDimensions,
    remaining: Axis,
    degenerate_eps: f64,
}

impl CurveModelFitter {
    /// Create a fitter for polynomials of `degree` over `fit_dim`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] for degrees other than 1 or 2
    /// and for coinciding axes.
    pub fn new(degree: usize, fit_dim: FitDimensions) -> Result<Self> {
        if !(1..=2).contains(&degree) {
            return Err(FrameError::invalid_config(format!(
                "curve degree must be 1 or 2, got {degree}"
            )));
        }
        Ok(Self {
            degree,
            fit_dim,
            remaining: fit_dim.remaining()?,
            degenerate_eps: 1e-9,
        })
    }

    /// Create a fitter from the pipeline settings.
    ///
    /// # Errors
    ///
    /// See [`CurveModelFitter::new`].
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(config.degree, config.fit_dim)?.with_degenerate_eps(config.degenerate_eps))
    }

    /// Set the flat-parabola threshold.
    #[must_use]
    pub const fn with_degenerate_eps(mut self, eps: f64) -> Self {
        self.degenerate_eps = eps;
        self
    }

    /// Degree of fitted models.
    #[must_use]
    pub const fn degree(&self) -> usize {
        self.degree
    }

    /// Least-squares fit of the dependent on the independent axis.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud has no more points than the degree.
    pub fn fit_model(&self, cloud: &PointCloud) -> Result<CurveModel> {
        let xs: Vec<f64> = cloud.column(self.fit_dim.independent).collect();
        let ys: Vec<f64> = cloud.column(self.fit_dim.dependent).collect();
        let polynomial = Polynomial::fit(&xs, &ys, self.degree)?;
        CurveModel::new(polynomial, self.fit_dim)
    }

    /// Canonical vertex of `cloud` under `model`.
    ///
    /// A parabola's turning point is used only when its leading coefficient
    /// is at least `degenerate_eps` and the turning point lies within
    /// [`VERTEX_REACH`] data spans of the observed independent range. Flatter
    /// fits fall back to the mean vertex.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InsufficientPoints`] for an empty cloud.
    pub fn vertex(&self, cloud: &PointCloud, model: &CurveModel) -> Result<([f64; 3], VertexSource)> {
        let empty = || FrameError::insufficient_points("vertex", 1, 0);
        let mean_remaining = cloud.mean(self.remaining).ok_or_else(empty)?;
        let mean_independent = cloud.mean(self.fit_dim.independent).ok_or_else(empty)?;
        let (lo, hi) = cloud
            .column(self.fit_dim.independent)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), u| (lo.min(u), hi.max(u)));
        let reach = VERTEX_REACH * (hi - lo);

        let (u, source) = match model.coefficients() {
            [a, b, _] => {
                let turning = -b / (2.0 * a);
                if a.abs() >= self.degenerate_eps && (lo - reach..=hi + reach).contains(&turning) {
                    (turning, VertexSource::Parabola)
                } else {
                    log::warn!(
                        "Parabola too flat (a = {a:e}, turning point {turning:e} outside \
                         [{:e}, {:e}]); using mean vertex",
                        lo - reach,
                        hi + reach
                    );
                    (mean_independent, VertexSource::DegenerateFallback)
                }
            }
            _ => (mean_independent, VertexSource::Mean),
        };

        let mut vertex = [0.0; 3];
        vertex[self.fit_dim.independent.index()] = u;
        vertex[self.fit_dim.dependent.index()] = model.eval(u);
        vertex[self.remaining.index()] = mean_remaining;

        if vertex.iter().any(|v| !v.is_finite()) {
            return Err(FrameError::degenerate_model(format!(
                "vertex {vertex:?} is not finite"
            )));
        }
        Ok((vertex, source))
    }

    /// Whether a vertex-centered cloud needs the half turn.
    ///
    /// Lines never do: turning them does not change the sign of the slope.
    /// Neither do parabolas flatter than the degenerate threshold.
    ///
    /// # Errors
    ///
    /// Propagates fitting errors.
    pub fn needs_flip(&self, centered: &PointCloud) -> Result<bool> {
        if self.degree < 2 {
            return Ok(false);
        }
        Ok(self.fit_model(centered)?.polynomial().leading() < -self.degenerate_eps)
    }

    /// Fit, center and orient `cloud`.
    ///
    /// Pieces supplied in `options` are used as given. The vertex is always
    /// derived from a fresh fit on `cloud` when not supplied, since a supplied
    /// model lives in the centered frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud is too small to fit or the vertex is not
    /// finite.
    pub fn fit(&self, cloud: &PointCloud, options: &CurveOptions) -> Result<CurveFit> {
        let (vertex, vertex_source) = match options.vertex {
            Some(v) => (v, VertexSource::Supplied),
            None => {
                let model = self.fit_model(cloud)?;
                self.vertex(cloud, &model)?
            }
        };

        let centered = cloud.translated(vertex);
        let flipped = match options.flip {
            Some(flip) => flip,
            None => self.needs_flip(&centered)?,
        };
        let oriented = if flipped {
            rotate_half_turn(&centered, self.remaining)
        } else {
            centered
        };

        let model = match &options.model {
            Some(model) => model.clone(),
            None => self.fit_model(&oriented)?,
        };

        log::debug!(
            "Curve fit: vertex {vertex:?} ({vertex_source:?}), flipped {flipped}, coefficients {:?}",
            model.coefficients()
        );

        Ok(CurveFit {
            cloud: oriented,
            model,
            vertex,
            vertex_source,
            flipped,
        })
    }
}

/// Rotate a cloud by 180° about `axis`, negating the other two coordinates.
#[must_use]
pub fn rotate_half_turn(cloud: &PointCloud, axis: Axis) -> PointCloud {
    let keep = axis.index();
    cloud.map_points(|p| {
        let mut out = [-p[0], -p[1], -p[2]];
        out[keep] = p[keep];
        out
    })
}

/// Fit one model per already-aligned cloud.
///
/// # Errors
///
/// Fails on the first cloud that cannot be fit.
pub fn fit_models<'a>(
    fitter: &CurveModelFitter,
    clouds: impl IntoIterator<Item = &'a PointCloud>,
) -> Result<Vec<CurveModel>> {
    clouds.into_iter().map(|c| fitter.fit_model(c)).collect()
}

/// Fit a fresh model on an already aligned and centered cloud and map it.
///
/// No translation or turn is applied; the cloud is taken as is.
///
/// # Errors
///
/// Returns an error if the model cannot be fit.
pub fn refit_aligned(cloud: &PointCloud, config: &PipelineConfig) -> Result<CurvilinearCloud> {
    let fitter = CurveModelFitter::from_config(config)?;
    let model = fitter.fit_model(cloud)?;
    Ok(CurvilinearMapper::from_config(&model, config).map(cloud))
}
