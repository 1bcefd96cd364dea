//! Dense univariate polynomials and least-squares fitting.

use nalgebra::{DMatrix, DVector};

use crate::error::{FrameError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A polynomial with coefficients stored highest degree first.
///
/// `[a, b, c]` is `a*x^2 + b*x + c`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Create a polynomial from coefficients, highest degree first.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidInput`] for an empty coefficient list.
    pub fn new(coefficients: Vec<f64>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(FrameError::invalid_input(
                "polynomial needs at least one coefficient",
            ));
        }
        Ok(Self { coefficients })
    }

    /// Degree (number of coefficients minus one).
    #[must_use]
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Coefficients, highest degree first.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Coefficient of the highest-degree term.
    #[must_use]
    pub fn leading(&self) -> f64 {
        self.coefficients[0]
    }

    /// Evaluate at `x` (Horner's rule).
    #[must_use]
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |acc, &c| acc.mul_add(x, c))
    }

    /// First derivative.
    #[must_use]
    pub fn derivative(&self) -> Self {
        let n = self.degree();
        if n == 0 {
            return Self {
                coefficients: vec![0.0],
            };
        }
        let coefficients = self.coefficients[..n]
            .iter()
            .enumerate()
            .map(|(i, &c)| c * (n - i) as f64)
            .collect();
        Self { coefficients }
    }

    /// Sum of two polynomials.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let len = self.coefficients.len().max(other.coefficients.len());
        let pad = |p: &Self, i: usize| {
            let offset = len - p.coefficients.len();
            if i < offset {
                0.0
            } else {
                p.coefficients[i - offset]
            }
        };
        Self {
            coefficients: (0..len).map(|i| pad(self, i) + pad(other, i)).collect(),
        }
    }

    /// Least-squares fit of `ys` against `xs`.
    ///
    /// Vandermonde columns are scaled to unit norm before the SVD solve to
    /// keep high powers well conditioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs differ in length, there are not more
    /// points than the degree, or the system cannot be solved.
    pub fn fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(FrameError::shape_mismatch(
                format!("{} dependent values", xs.len()),
                format!("{} dependent values", ys.len()),
            ));
        }
        let n = xs.len();
        if n <= degree {
            return Err(FrameError::insufficient_points(
                "polynomial fit",
                degree + 1,
                n,
            ));
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(FrameError::numerical_instability(
                "non-finite value in polynomial fit input",
            ));
        }

        let cols = degree + 1;
        let mut vander = DMatrix::from_fn(n, cols, |i, j| xs[i].powi((degree - j) as i32));

        let mut norms = vec![1.0; cols];
        for (j, mut column) in vander.column_iter_mut().enumerate() {
            let norm = column.norm();
            if norm > 0.0 {
                column /= norm;
                norms[j] = norm;
            }
        }

        let rhs = DVector::from_column_slice(ys);
        let solution = vander
            .svd(true, true)
            .solve(&rhs, 1e-14)
            .map_err(FrameError::linalg)?;

        let coefficients: Vec<f64> = solution
            .iter()
            .zip(norms.iter())
            .map(|(c, s)| c / s)
            .collect();

        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FrameError::numerical_instability(
                "non-finite polynomial coefficient",
            ));
        }

        Ok(Self { coefficients })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_eval_and_derivative() {
        let p = Polynomial::new(vec![0.5, -2.0, 1.0]).unwrap();
        assert_relative_eq!(p.eval(0.0), 1.0);
        assert_relative_eq!(p.eval(2.0), -1.0);

        let dp = p.derivative();
        assert_eq!(dp.coefficients(), &[1.0, -2.0]);
        assert_relative_eq!(dp.eval(2.0), 0.0);

        let ddp = dp.derivative().derivative();
        assert_eq!(ddp.coefficients(), &[0.0]);
    }

    #[test]
    fn test_fit_recovers_parabola() {
        let xs: Vec<f64> = (-10..=10).map(|i| f64::from(i) * 0.5).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 0.5 * x * x - 2.0 * x + 1.0).collect();

        let p = Polynomial::fit(&xs, &ys, 2).unwrap();
        assert_eq!(p.degree(), 2);
        assert_relative_eq!(p.coefficients()[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(p.coefficients()[1], -2.0, epsilon = 1e-9);
        assert_relative_eq!(p.coefficients()[2], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_line_least_squares() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.1, 4.9, 7.0];
        let p = Polynomial::fit(&xs, &ys, 1).unwrap();
        assert_relative_eq!(p.coefficients()[0], 1.98, epsilon = 1e-9);
        assert_relative_eq!(p.coefficients()[1], 1.03, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_needs_enough_points() {
        let result = Polynomial::fit(&[0.0, 1.0], &[0.0, 1.0], 2);
        assert!(matches!(
            result,
            Err(FrameError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn test_add_pads_lower_degree() {
        let a = Polynomial::new(vec![1.0, 0.0, 2.0]).unwrap();
        let b = Polynomial::new(vec![3.0, 4.0]).unwrap();
        assert_eq!(a.add(&b).coefficients(), &[1.0, 3.0, 6.0]);
    }
}
