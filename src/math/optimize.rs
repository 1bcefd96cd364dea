//! One-dimensional local minimization.
//!
//! A golden-section expansion brackets a minimum starting from an initial
//! guess, then Brent's method (parabolic interpolation with golden-section
//! fallback) refines it. Failures are returned as [`MinimizeFailure`] so
//! callers can record them instead of using an unconverged estimate.

use thiserror::Error;

use crate::error::{FrameError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const GOLDEN: f64 = 1.618_033_988_749_895;
const CGOLD: f64 = 0.381_966_011_250_105_1;
const ZEPS: f64 = 1e-12;

/// Settings for [`minimize_scalar`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MinimizerSettings {
    /// Relative tolerance on the abscissa.
    pub tolerance: f64,

    /// Maximum Brent iterations.
    pub max_iterations: usize,

    /// Maximum bracket expansion steps.
    pub max_bracket_steps: usize,

    /// First step away from the initial guess.
    pub initial_step: f64,
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
            max_bracket_steps: 60,
            initial_step: 1.0,
        }
    }
}

impl MinimizerSettings {
    /// Check that the settings can drive a minimization.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] naming `what` for a tolerance
    /// that is not finite and positive, zero iterations or a zero or
    /// non-finite initial step.
    pub fn validate(&self, what: &str) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) || self.max_iterations == 0 {
            return Err(FrameError::invalid_config(format!(
                "{what} tolerance and max_iterations must be positive, got {} and {}",
                self.tolerance, self.max_iterations
            )));
        }
        if !self.initial_step.is_finite() || self.initial_step == 0.0 {
            return Err(FrameError::invalid_config(format!(
                "{what} initial_step must be finite and non-zero, got {}",
                self.initial_step
            )));
        }
        Ok(())
    }
}

/// A located minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    /// Abscissa of the minimum.
    pub x: f64,
    /// Function value at `x`.
    pub value: f64,
    /// Brent iterations used.
    pub iterations: usize,
}

/// Why a minimization gave up.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum MinimizeFailure {
    /// The function kept decreasing; no bracket was found.
    #[error("no bracket found after {steps} expansion steps (last x = {last_x})")]
    NoBracket { steps: usize, last_x: f64 },

    /// Brent's method ran out of iterations.
    #[error("did not converge within {iterations} iterations (x = {x})")]
    MaxIterations { iterations: usize, x: f64 },

    /// The objective returned NaN or infinity.
    #[error("objective is not finite at x = {x}")]
    NonFinite { x: f64 },
}

/// Bracket a local minimum starting at `x0`.
///
/// Returns `(a, b, c)` with `b` between `a` and `c` and
/// `f(b) <= f(a)`, `f(b) <= f(c)`.
///
/// # Errors
///
/// Returns [`MinimizeFailure::NoBracket`] if the function is still
/// decreasing after `max_steps` expansions.
pub fn bracket_minimum(
    f: impl Fn(f64) -> f64,
    x0: f64,
    step: f64,
    max_steps: usize,
) -> std::result::Result<(f64, f64, f64), MinimizeFailure> {
    let eval = |x: f64| {
        let v = f(x);
        if v.is_finite() {
            Ok(v)
        } else {
            Err(MinimizeFailure::NonFinite { x })
        }
    };

    let (mut a, mut b) = (x0, x0 + step);
    let (mut fa, mut fb) = (eval(a)?, eval(b)?);
    if fb > fa {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut c = b + GOLDEN * (b - a);
    let mut fc = eval(c)?;
    let mut steps = 0;

    while fb > fc {
        if steps >= max_steps {
            return Err(MinimizeFailure::NoBracket { steps, last_x: c });
        }
        a = b;
        b = c;
        fb = fc;
        c = b + GOLDEN * (b - a);
        fc = eval(c)?;
        steps += 1;
    }

    Ok((a, b, c))
}

/// Refine a bracketed minimum with Brent's method.
///
/// # Errors
///
/// Returns [`MinimizeFailure`] on non-finite objective values or when
/// `max_iterations` is exhausted.
#[allow(clippy::float_cmp, clippy::many_single_char_names)]
pub fn brent(
    f: impl Fn(f64) -> f64,
    bracket: (f64, f64, f64),
    tolerance: f64,
    max_iterations: usize,
) -> std::result::Result<Minimum, MinimizeFailure> {
    let (ax, bx, cx) = bracket;
    let (mut a, mut b) = if ax < cx { (ax, cx) } else { (cx, ax) };

    let mut x = bx;
    let mut w = bx;
    let mut v = bx;
    let mut fx = f(x);
    if !fx.is_finite() {
        return Err(MinimizeFailure::NonFinite { x });
    }
    let mut fw = fx;
    let mut fv = fx;
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iteration in 0..max_iterations {
        let xm = 0.5 * (a + b);
        let tol1 = tolerance * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;

        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return Ok(Minimum {
                x,
                value: fx,
                iterations: iteration,
            });
        }

        let mut golden_step = true;
        if e.abs() > tol1 {
            // Parabolic fit through x, w, v
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_prev = e;
            e = d;

            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden_step = false;
            }
        }

        if golden_step {
            e = if x >= xm { a - x } else { b - x };
            d = CGOLD * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u);
        if !fu.is_finite() {
            return Err(MinimizeFailure::NonFinite { x: u });
        }

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    Err(MinimizeFailure::MaxIterations {
        iterations: max_iterations,
        x,
    })
}

/// Find a local minimum of `f` near `x0`.
///
/// # Errors
///
/// Propagates bracketing and refinement failures.
///
/// # Example
///
/// ```
/// use curvilinear_frame::math::optimize::{minimize_scalar, MinimizerSettings};
///
/// let min = minimize_scalar(|x| (x - 3.0).powi(2) + 1.0, 0.0, &MinimizerSettings::default())?;
/// assert!((min.x - 3.0).abs() < 1e-6);
/// # Ok::<(), curvilinear_frame::math::optimize::MinimizeFailure>(())
/// ```
pub fn minimize_scalar(
    f: impl Fn(f64) -> f64,
    x0: f64,
    settings: &MinimizerSettings,
) -> std::result::Result<Minimum, MinimizeFailure> {
    let bracket = bracket_minimum(&f, x0, settings.initial_step, settings.max_bracket_steps)?;
    brent(&f, bracket, settings.tolerance, settings.max_iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_settings_validation() {
        assert!(MinimizerSettings::default().validate("test").is_ok());
        for bad in [
            MinimizerSettings { tolerance: f64::NAN, ..MinimizerSettings::default() },
            MinimizerSettings { tolerance: 0.0, ..MinimizerSettings::default() },
            MinimizerSettings { max_iterations: 0, ..MinimizerSettings::default() },
            MinimizerSettings { initial_step: f64::INFINITY, ..MinimizerSettings::default() },
        ] {
            assert!(matches!(bad.validate("test"), Err(FrameError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_quadratic() {
        let min = minimize_scalar(|x| (x + 1.5).powi(2), 10.0, &MinimizerSettings::default())
            .unwrap();
        assert_relative_eq!(min.x, -1.5, epsilon = 1e-6);
        assert_relative_eq!(min.value, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_start_at_minimum() {
        let min =
            minimize_scalar(|x| x * x + 2.0, 0.0, &MinimizerSettings::default()).unwrap();
        assert_relative_eq!(min.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quartic_local_minimum() {
        // Two minima at +-1; starting on the right finds the right one.
        let f = |x: f64| (x * x - 1.0).powi(2);
        let settings = MinimizerSettings {
            initial_step: 0.1,
            ..MinimizerSettings::default()
        };
        let min = minimize_scalar(f, 0.8, &settings).unwrap();
        assert_relative_eq!(min.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_unbounded_reports_no_bracket() {
        let result = minimize_scalar(|x| -x, 0.0, &MinimizerSettings::default());
        assert!(matches!(result, Err(MinimizeFailure::NoBracket { .. })));
    }

    #[test]
    fn test_non_finite_objective() {
        let result = minimize_scalar(|_| f64::NAN, 0.0, &MinimizerSettings::default());
        assert!(matches!(result, Err(MinimizeFailure::NonFinite { .. })));
    }

    #[test]
    fn test_iteration_cap() {
        let bracket = bracket_minimum(|x| (x - 0.3).powi(2), 0.0, 1.0, 50).unwrap();
        let result = brent(|x| (x - 0.3).powi(2), bracket, 1e-15, 1);
        assert!(matches!(result, Err(MinimizeFailure::MaxIterations { .. })));
    }
}
