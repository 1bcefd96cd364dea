//! Simpson quadrature.
//!
//! [`adaptive_simpson`] integrates a function; bounds keep their natural
//! order, so integrating from `a` to `b < a` yields the negated integral
//! from `b` to `a`. [`simpson_sampled`] integrates values already sampled on
//! a grid.

use std::cmp::Ordering;

use crate::error::{FrameError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for [`adaptive_simpson`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuadratureSettings {
    /// Error tolerance relative to the magnitude of the integral, and
    /// absolute when the integral is smaller than one.
    pub tolerance: f64,

    /// Maximum recursion depth.
    pub max_depth: usize,
}

impl Default for QuadratureSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_depth: 32,
        }
    }
}

impl QuadratureSettings {
    /// Check that the tolerance is finite and positive.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] naming `what` otherwise.
    pub fn validate(&self, what: &str) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FrameError::invalid_config(format!(
                "{what} tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Result of a quadrature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrature {
    /// Integral estimate.
    pub value: f64,
    /// Accumulated error estimate.
    pub error_estimate: f64,
    /// Whether any subinterval hit `max_depth` before meeting its tolerance.
    pub depth_limited: bool,
}

/// Integrate `f` over `[a, b]` with adaptive Simpson refinement.
///
/// # Example
///
/// ```
/// use curvilinear_frame::math::integrate::{adaptive_simpson, QuadratureSettings};
///
/// let q = adaptive_simpson(|x| x * x, 0.0, 3.0, &QuadratureSettings::default());
/// assert!((q.value - 9.0).abs() < 1e-9);
/// ```
#[must_use]
pub fn adaptive_simpson(
    f: impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    settings: &QuadratureSettings,
) -> Quadrature {
    if a == b {
        return Quadrature {
            value: 0.0,
            error_estimate: 0.0,
            depth_limited: false,
        };
    }

    let fa = f(a);
    let fb = f(b);
    let m = 0.5 * (a + b);
    let fm = f(m);
    let whole = simpson(a, b, fa, fm, fb);
    let tolerance = settings.tolerance * whole.abs().max(1.0);

    let mut state = Quadrature {
        value: 0.0,
        error_estimate: 0.0,
        depth_limited: false,
    };
    state.value = refine(
        &f,
        Interval { a, b, fa, fm, fb },
        whole,
        tolerance,
        settings.max_depth,
        &mut state,
    );
    state
}

/// Composite Simpson integral of samples `ys` taken at increasing `xs`.
///
/// Spacing may be irregular. With an odd number of intervals the last one
/// is integrated under the parabola through the final three samples; two
/// samples fall back to the trapezoid rule.
///
/// # Errors
///
/// Returns [`FrameError::ShapeMismatch`] if the slices differ in length,
/// [`FrameError::InsufficientPoints`] with fewer than two samples and
/// [`FrameError::InvalidInput`] if `xs` is not strictly increasing.
///
/// # Example
///
/// ```
/// use curvilinear_frame::math::integrate::simpson_sampled;
///
/// let xs: Vec<f64> = (0..=6).map(|i| f64::from(i) * 0.5).collect();
/// let ys: Vec<f64> = xs.iter().map(|x| x * x).collect();
/// assert!((simpson_sampled(&ys, &xs)? - 9.0).abs() < 1e-12);
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
pub fn simpson_sampled(ys: &[f64], xs: &[f64]) -> Result<f64> {
    if ys.len() != xs.len() {
        return Err(FrameError::shape_mismatch(
            format!("{} samples", xs.len()),
            format!("{} samples", ys.len()),
        ));
    }
    let n = xs.len();
    if n < 2 {
        return Err(FrameError::insufficient_points("sampled Simpson", 2, n));
    }
    if xs.windows(2).any(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater)) {
        return Err(FrameError::invalid_input("sample abscissae must be strictly increasing"));
    }
    if n == 2 {
        return Ok(0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]));
    }

    let intervals = n - 1;
    let paired = intervals - intervals % 2;
    let mut total = 0.0;
    for i in (0..paired).step_by(2) {
        let h0 = xs[i + 1] - xs[i];
        let h1 = xs[i + 2] - xs[i + 1];
        let hs = h0 + h1;
        total += hs / 6.0
            * ((2.0 - h1 / h0) * ys[i] + hs * hs / (h0 * h1) * ys[i + 1] + (2.0 - h0 / h1) * ys[i + 2]);
    }

    if paired < intervals {
        let h0 = xs[n - 2] - xs[n - 3];
        let h1 = xs[n - 1] - xs[n - 2];
        let alpha = (2.0 * h1 * h1 + 3.0 * h0 * h1) / (6.0 * (h0 + h1));
        let beta = (h1 * h1 + 3.0 * h0 * h1) / (6.0 * h0);
        let eta = h1 * h1 * h1 / (6.0 * h0 * (h0 + h1));
        total += alpha * ys[n - 1] + beta * ys[n - 2] - eta * ys[n - 3];
    }
    Ok(total)
}

#[derive(Clone, Copy)]
struct Interval {
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
}

#[inline]
fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

fn refine(
    f: &impl Fn(f64) -> f64,
    iv: Interval,
    whole: f64,
    tolerance: f64,
    depth: usize,
    state: &mut Quadrature,
) -> f64 {
    let m = 0.5 * (iv.a + iv.b);
    let lm = 0.5 * (iv.a + m);
    let rm = 0.5 * (m + iv.b);
    let flm = f(lm);
    let frm = f(rm);
    let left = simpson(iv.a, m, iv.fa, flm, iv.fm);
    let right = simpson(m, iv.b, iv.fm, frm, iv.fb);
    let delta = left + right - whole;

    if depth == 0 || delta.abs() <= 15.0 * tolerance {
        if depth == 0 && delta.abs() > 15.0 * tolerance {
            state.depth_limited = true;
        }
        state.error_estimate += delta.abs() / 15.0;
        // Richardson extrapolation
        return left + right + delta / 15.0;
    }

    let half_tol = 0.5 * tolerance;
    refine(
        f,
        Interval {
            a: iv.a,
            b: m,
            fa: iv.fa,
            fm: flm,
            fb: iv.fm,
        },
        left,
        half_tol,
        depth - 1,
        state,
    ) + refine(
        f,
        Interval {
            a: m,
            b: iv.b,
            fa: iv.fm,
            fm: frm,
            fb: iv.fb,
        },
        right,
        half_tol,
        depth - 1,
        state,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_settings_validation() {
        assert!(QuadratureSettings::default().validate("test").is_ok());
        for tolerance in [f64::NAN, 0.0, -1e-8, f64::INFINITY] {
            let settings = QuadratureSettings {
                tolerance,
                ..QuadratureSettings::default()
            };
            assert!(settings.validate("test").is_err());
        }
    }

    #[test]
    fn test_sampled_cubic_exact() {
        let xs: Vec<f64> = (0..7).map(|i| -1.0 + 0.4 * f64::from(i)).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| x * x * x - 2.0 * x + 1.0).collect();
        let prim = |x: f64| 0.25 * x.powi(4) - x * x + x;
        assert_relative_eq!(simpson_sampled(&ys, &xs).unwrap(), prim(1.4) - prim(-1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_sampled_odd_interval_count() {
        // Seven intervals; the last one uses the end parabola.
        let xs: Vec<f64> = (0..8).map(|i| 0.25 * f64::from(i)).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 3.0 * x * x - x).collect();
        let prim = |x: f64| x * x * x - 0.5 * x * x;
        assert_relative_eq!(simpson_sampled(&ys, &xs).unwrap(), prim(1.75), epsilon = 1e-12);
    }

    #[test]
    fn test_sampled_irregular_spacing() {
        let xs = [0.0, 0.3, 1.0, 1.2, 2.0];
        let ys: Vec<f64> = xs.iter().map(|x| x * x).collect();
        assert_relative_eq!(simpson_sampled(&ys, &xs).unwrap(), 8.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sampled_rejects_bad_grids() {
        assert!(matches!(
            simpson_sampled(&[1.0, 2.0], &[0.0, 1.0, 2.0]),
            Err(FrameError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            simpson_sampled(&[1.0], &[0.0]),
            Err(FrameError::InsufficientPoints { .. })
        ));
        assert!(simpson_sampled(&[1.0, 2.0, 3.0], &[0.0, 0.0, 1.0]).is_err());
        assert_relative_eq!(simpson_sampled(&[1.0, 3.0], &[0.0, 2.0]).unwrap(), 4.0);
    }

    #[test]
    fn test_polynomial_exact() {
        let q = adaptive_simpson(|x| 3.0 * x * x + 1.0, -1.0, 2.0, &QuadratureSettings::default());
        assert_relative_eq!(q.value, 12.0, epsilon = 1e-10);
        assert!(!q.depth_limited);
    }

    #[test]
    fn test_reversed_bounds_negate() {
        let settings = QuadratureSettings::default();
        let forward = adaptive_simpson(f64::exp, 0.0, 1.5, &settings);
        let backward = adaptive_simpson(f64::exp, 1.5, 0.0, &settings);
        assert_relative_eq!(forward.value, 1.5f64.exp() - 1.0, epsilon = 1e-9);
        assert_relative_eq!(backward.value, -forward.value, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_interval() {
        let q = adaptive_simpson(|x| x, 2.0, 2.0, &QuadratureSettings::default());
        assert_relative_eq!(q.value, 0.0);
    }

    #[test]
    fn test_large_interval_terminates() {
        let q = adaptive_simpson(
            |x| (1.0 + 0.01 * x * x).sqrt(),
            0.0,
            -5.0e4,
            &QuadratureSettings::default(),
        );
        assert!(q.value < 0.0);
        assert!(!q.depth_limited);
    }

    #[test]
    fn test_parabola_arclength() {
        // Arclength of y = x^2 from 0 to 1.
        let q = adaptive_simpson(
            |x| (1.0 + 4.0 * x * x).sqrt(),
            0.0,
            1.0,
            &QuadratureSettings::default(),
        );
        let expected = 0.5 * 5f64.sqrt() + 0.25 * (2.0 + 5f64.sqrt()).ln();
        assert_relative_eq!(q.value, expected, epsilon = 1e-9);
    }
}
