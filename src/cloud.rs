//! Point cloud tables built from dense probability volumes.
//!
//! A [`PointCloud`] is an ordered list of `(x, y, z)` rows with an optional
//! per-row `value` (probability or intensity). Every transform in this crate
//! produces a new cloud; clouds are never mutated in place once built.

use ndarray::{ArrayView3, ArrayViewD, Ix3};

use crate::error::{FrameError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A canonical coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in column order.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Column index of this axis in a `[x, y, z]` row.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Column name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }

    /// The axis that is neither `self` nor `other`.
    ///
    /// Returns `None` when both arguments name the same axis.
    #[must_use]
    pub fn remaining(self, other: Self) -> Option<Self> {
        if self == other {
            return None;
        }
        Self::ALL.into_iter().find(|&a| a != self && a != other)
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-axis multiplicative factors, indexed `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaleVector(pub [f64; 3]);

impl Default for ScaleVector {
    fn default() -> Self {
        Self::identity()
    }
}

impl ScaleVector {
    /// Create a scale vector from `[x, y, z]` factors.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self([x, y, z])
    }

    /// Unit scale on every axis.
    #[must_use]
    pub const fn identity() -> Self {
        Self([1.0, 1.0, 1.0])
    }

    /// Factor for a single axis.
    #[must_use]
    pub const fn along(&self, axis: Axis) -> f64 {
        self.0[axis.index()]
    }

    /// Check that all factors are finite and strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] naming the offending axis.
    pub fn validate(&self, what: &str) -> Result<()> {
        for axis in Axis::ALL {
            let s = self.along(axis);
            if !s.is_finite() || s <= 0.0 {
                return Err(FrameError::invalid_config(format!(
                    "{what} factor for {axis} must be positive and finite, got {s}"
                )));
            }
        }
        Ok(())
    }
}

/// An ordered table of `(x, y, z[, value])` rows.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCloud {
    points: Vec<[f64; 3]>,
    values: Option<Vec<f64>>,
}

impl PointCloud {
    /// Create a cloud without a value column.
    #[must_use]
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            values: None,
        }
    }

    /// Create a cloud with a value column.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ShapeMismatch`] if the column lengths differ.
    pub fn with_values(points: Vec<[f64; 3]>, values: Vec<f64>) -> Result<Self> {
        if points.len() != values.len() {
            return Err(FrameError::shape_mismatch(
                format!("{} values", points.len()),
                format!("{} values", values.len()),
            ));
        }
        Ok(Self {
            points,
            values: Some(values),
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinate rows.
    #[must_use]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Value column, if present.
    #[must_use]
    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    /// One coordinate column.
    pub fn column(&self, axis: Axis) -> impl Iterator<Item = f64> + '_ {
        let i = axis.index();
        self.points.iter().map(move |p| p[i])
    }

    /// Mean of one coordinate column, or `None` when empty.
    #[must_use]
    pub fn mean(&self, axis: Axis) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.column(axis).sum::<f64>() / self.points.len() as f64)
    }

    /// Keep only rows whose value is strictly above `threshold`.
    ///
    /// The value column is carried forward. A cloud without values is
    /// returned unchanged.
    #[must_use]
    pub fn above_threshold(&self, threshold: f64) -> Self {
        let Some(values) = &self.values else {
            return self.clone();
        };
        let (points, values): (Vec<[f64; 3]>, Vec<f64>) = self
            .points
            .iter()
            .zip(values.iter())
            .filter(|(_, &v)| v > threshold)
            .map(|(p, &v)| (*p, v))
            .unzip();
        Self {
            points,
            values: Some(values),
        }
    }

    /// Multiply every coordinate by its per-axis factor.
    #[must_use]
    pub fn scaled(&self, scale: &ScaleVector) -> Self {
        let s = scale.0;
        Self {
            points: self
                .points
                .iter()
                .map(|p| [p[0] * s[0], p[1] * s[1], p[2] * s[2]])
                .collect(),
            values: self.values.clone(),
        }
    }

    /// Re-express every coordinate relative to `origin`.
    #[must_use]
    pub fn translated(&self, origin: [f64; 3]) -> Self {
        self.map_points(|p| [p[0] - origin[0], p[1] - origin[1], p[2] - origin[2]])
    }

    /// Apply `f` to every coordinate row, carrying the value column forward.
    #[must_use]
    pub fn map_points(&self, f: impl Fn(&[f64; 3]) -> [f64; 3]) -> Self {
        Self {
            points: self.points.iter().map(f).collect(),
            values: self.values.clone(),
        }
    }
}

/// Converts a dense `[z, y, x]` scalar volume into a [`PointCloud`].
///
/// Voxel indices are multiplied by the voxel size (`microns`, indexed
/// `[x, y, z]`) so the cloud is in physical units. Every voxel becomes a row;
/// no filtering happens here.
///
/// # Example
///
/// ```
/// use curvilinear_frame::{PointCloudBuilder, ScaleVector};
/// use ndarray::Array3;
///
/// let volume = Array3::<f64>::zeros((2, 3, 4));
/// let builder = PointCloudBuilder::new(ScaleVector::new(0.5, 0.5, 2.0));
/// let cloud = builder.build(volume.view().into_dyn())?;
/// assert_eq!(cloud.len(), 24);
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCloudBuilder {
    microns: ScaleVector,
}

impl PointCloudBuilder {
    /// Create a builder with the given voxel size.
    #[must_use]
    pub const fn new(microns: ScaleVector) -> Self {
        Self { microns }
    }

    /// Voxel size used by this builder.
    #[must_use]
    pub const fn microns(&self) -> ScaleVector {
        self.microns
    }

    /// Build a cloud from a dynamically shaped array.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ShapeMismatch`] if the array is not 3-dimensional.
    pub fn build(&self, field: ArrayViewD<'_, f64>) -> Result<PointCloud> {
        let ndim = field.ndim();
        let field = field.into_dimensionality::<Ix3>().map_err(|_| {
            FrameError::shape_mismatch("3-dimensional [z, y, x] array", format!("{ndim} dimensions"))
        })?;
        Ok(self.build_3d(field))
    }

    /// Build a cloud from a 3D `[z, y, x]` array.
    #[must_use]
    pub fn build_3d(&self, field: ArrayView3<'_, f64>) -> PointCloud {
        let [sx, sy, sz] = self.microns.0;
        let mut points = Vec::with_capacity(field.len());
        let mut values = Vec::with_capacity(field.len());

        for ((z, y, x), &v) in field.indexed_iter() {
            points.push([x as f64 * sx, y as f64 * sy, z as f64 * sz]);
            values.push(v);
        }

        log::debug!(
            "Built point cloud: {:?} voxels -> {} rows",
            field.dim(),
            points.len()
        );

        PointCloud {
            points,
            values: Some(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3, Array4};

    #[test]
    fn test_build_scales_indices() {
        let mut volume = Array3::<f64>::zeros((2, 3, 4));
        volume[[1, 2, 3]] = 0.75;

        let builder = PointCloudBuilder::new(ScaleVector::new(0.5, 2.0, 3.0));
        let cloud = builder.build(volume.view().into_dyn()).unwrap();

        assert_eq!(cloud.len(), 24);
        let values = cloud.values().unwrap();
        let (idx, _) = values
            .iter()
            .enumerate()
            .find(|(_, &v)| v > 0.5)
            .unwrap();
        let p = cloud.points()[idx];
        assert_relative_eq!(p[0], 1.5);
        assert_relative_eq!(p[1], 4.0);
        assert_relative_eq!(p[2], 3.0);
    }

    #[test]
    fn test_build_rejects_non_3d() {
        let builder = PointCloudBuilder::new(ScaleVector::identity());

        let flat = Array2::<f64>::zeros((4, 4));
        assert!(matches!(
            builder.build(flat.view().into_dyn()),
            Err(FrameError::ShapeMismatch { .. })
        ));

        let deep = Array4::<f64>::zeros((2, 2, 2, 2));
        assert!(matches!(
            builder.build(deep.view().into_dyn()),
            Err(FrameError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_threshold_is_strict() {
        let cloud = PointCloud::with_values(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            vec![0.5, 0.51, 0.2],
        )
        .unwrap();
        let kept = cloud.above_threshold(0.5);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept.points()[0][0], 1.0);
        assert_relative_eq!(kept.values().unwrap()[0], 0.51);
    }

    #[test]
    fn test_scaled_and_translated() {
        let cloud = PointCloud::from_points(vec![[1.0, 2.0, 3.0]]);
        let scaled = cloud.scaled(&ScaleVector::new(2.0, 1.0, 0.5));
        assert_eq!(scaled.points()[0], [2.0, 2.0, 1.5]);

        let moved = scaled.translated([2.0, 2.0, 1.5]);
        assert_eq!(moved.points()[0], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_value_length_mismatch() {
        let result = PointCloud::with_values(vec![[0.0; 3]], vec![1.0, 2.0]);
        assert!(matches!(result, Err(FrameError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_axis_remaining() {
        assert_eq!(Axis::X.remaining(Axis::Z), Some(Axis::Y));
        assert_eq!(Axis::Y.remaining(Axis::X), Some(Axis::Z));
        assert_eq!(Axis::Z.remaining(Axis::Z), None);
    }

    #[test]
    fn test_scale_validation() {
        assert!(ScaleVector::identity().validate("scale").is_ok());
        assert!(ScaleVector::new(1.0, 0.0, 1.0).validate("scale").is_err());
        assert!(ScaleVector::new(1.0, f64::NAN, 1.0).validate("scale").is_err());
    }
}
