//! Error types for curvilinear frame operations.
//!
//! Stage-level failures (bad shapes, degenerate models, bad configuration) are
//! reported through [`FrameError`]. Point-level and bin-level failures are not
//! errors: they are recorded inline as [`crate::mapper::PointFailure`] and
//! [`crate::landmarks::LandmarkValue`] so a batch run can complete.

use thiserror::Error;

/// Main error type for curvilinear frame operations.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Input array dimensionality or shape is invalid for the operation.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Not enough points survived filtering for a stage to run.
    #[error("Too few points for {stage}: need at least {min}, got {actual}")]
    InsufficientPoints {
        stage: &'static str,
        min: usize,
        actual: usize,
    },

    /// A fitted model cannot produce the requested quantity.
    #[error("Degenerate model: {context}")]
    DegenerateModel { context: String },

    /// Nearest-curve-point search did not converge for a point.
    #[error("Projection did not converge for point {index}: {reason}")]
    ProjectionNonConvergence { index: usize, reason: String },

    /// Input validation errors.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Linear algebra computation failed.
    #[error("Linear algebra error: {0}")]
    LinalgError(String),

    /// Numerical computation resulted in NaN or Inf.
    #[error("Numerical instability: {context}")]
    NumericalInstability { context: String },

    /// A stage failed while processing a specific sample.
    #[error("Sample {sample}: {stage} failed: {source}")]
    Stage {
        sample: String,
        stage: &'static str,
        #[source]
        source: Box<FrameError>,
    },
}

/// Result type alias for curvilinear frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;

impl FrameError {
    /// Create a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an insufficient points error.
    #[must_use]
    pub const fn insufficient_points(stage: &'static str, min: usize, actual: usize) -> Self {
        Self::InsufficientPoints { stage, min, actual }
    }

    /// Create a degenerate model error.
    #[must_use]
    pub fn degenerate_model(context: impl Into<String>) -> Self {
        Self::DegenerateModel {
            context: context.into(),
        }
    }

    /// Create a projection non-convergence error.
    #[must_use]
    pub fn non_convergence(index: usize, reason: impl Into<String>) -> Self {
        Self::ProjectionNonConvergence {
            index,
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a linear algebra error.
    #[must_use]
    pub fn linalg(msg: impl Into<String>) -> Self {
        Self::LinalgError(msg.into())
    }

    /// Create a numerical instability error.
    #[must_use]
    pub fn numerical_instability(context: impl Into<String>) -> Self {
        Self::NumericalInstability {
            context: context.into(),
        }
    }

    /// Attach the sample identifier and pipeline stage to a failure.
    #[must_use]
    pub fn in_stage(self, sample: impl Into<String>, stage: &'static str) -> Self {
        Self::Stage {
            sample: sample.into(),
            stage,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameError::insufficient_points("pca", 3, 1);
        let msg = err.to_string();
        assert!(msg.contains("pca"));
        assert!(msg.contains('3'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn test_stage_wrapping() {
        let err = FrameError::shape_mismatch("3 dimensions", "2 dimensions").in_stage("7", "build");
        let msg = err.to_string();
        assert!(msg.contains("Sample 7"));
        assert!(msg.contains("build"));
        assert!(msg.contains("3 dimensions"));
        assert!(matches!(err, FrameError::Stage { .. }));
    }

    #[test]
    fn test_error_constructors() {
        let _ = FrameError::invalid_input("test");
        let _ = FrameError::degenerate_model("leading coefficient is zero");
        let _ = FrameError::non_convergence(4, "no bracket");
        let _ = FrameError::linalg("eigendecomposition failed");
        let _ = FrameError::numerical_instability("nan in covariance");
    }
}
