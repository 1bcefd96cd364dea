//! Principal-axis alignment of point clouds.
//!
//! A [`PrincipalAxisTransform`] is fit once on the denoised, thresholded
//! reference channel of a sample and then applied read-only to every channel
//! of that sample. The operator-supplied [`AxisAssignment`] decides which
//! principal component plays the x, y and z role, because the axis of
//! greatest variance is not always the anatomically intended one.

use nalgebra::DMatrix;
use ndarray::ArrayViewD;

use crate::cloud::{Axis, PointCloud, PointCloudBuilder};
use crate::config::PipelineConfig;
use crate::denoise::ReferenceDenoiser;
use crate::error::{FrameError, Result};
use crate::math::linalg::{compute_pca, PcaResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which coordinates the principal axes are fit over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlignmentMode {
    /// Fit over `(x, y, z)` and rotate all three coordinates.
    #[default]
    Full3d,
    /// Fit over `(y, z)` only; `x` passes through unchanged.
    Transverse2d,
}

impl AlignmentMode {
    /// Axes the transform is fit over.
    #[must_use]
    pub const fn fit_axes(self) -> &'static [Axis] {
        match self {
            Self::Full3d => &[Axis::X, Axis::Y, Axis::Z],
            Self::Transverse2d => &[Axis::Y, Axis::Z],
        }
    }
}

/// Assignment of principal components to the canonical `[x, y, z]` roles.
///
/// `AxisAssignment([0, 2, 1])` puts the first component on x, the third on
/// y and the second on z. In [`AlignmentMode::Transverse2d`] the x entry is
/// ignored and the y and z entries name component slots 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisAssignment(pub [usize; 3]);

impl Default for AxisAssignment {
    fn default() -> Self {
        Self::identity()
    }
}

impl AxisAssignment {
    /// Component `i` goes to axis `i`.
    #[must_use]
    pub const fn identity() -> Self {
        Self([0, 1, 2])
    }

    /// Component index feeding the given canonical axis.
    #[must_use]
    pub const fn component_for(&self, axis: Axis) -> usize {
        self.0[axis.index()]
    }

    /// Check the assignment is usable with `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] if entries repeat or fall
    /// outside the available components.
    pub fn validate(&self, mode: AlignmentMode) -> Result<()> {
        let [x, y, z] = self.0;
        match mode {
            AlignmentMode::Full3d => {
                let mut seen = [false; 3];
                for c in [x, y, z] {
                    if c > 2 || seen[c] {
                        return Err(FrameError::invalid_config(format!(
                            "comp_order {:?} must be a permutation of [0, 1, 2]",
                            self.0
                        )));
                    }
                    seen[c] = true;
                }
            }
            AlignmentMode::Transverse2d => {
                if !(1..=2).contains(&y) || !(1..=2).contains(&z) || y == z {
                    return Err(FrameError::invalid_config(format!(
                        "comp_order {:?}: y and z entries must be 1 and 2 in 2D alignment",
                        self.0
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Mean-centered orthonormal basis fit on a reference cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalAxisTransform {
    mode: AlignmentMode,
    pca: PcaResult,
}

impl PrincipalAxisTransform {
    /// Fit the principal axes of `reference` over the columns of `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference has fewer points than fitted
    /// dimensions or contains non-finite coordinates.
    pub fn fit(reference: &PointCloud, mode: AlignmentMode) -> Result<Self> {
        let axes = mode.fit_axes();
        if reference.len() < axes.len() {
            return Err(FrameError::insufficient_points(
                "principal axes",
                axes.len(),
                reference.len(),
            ));
        }

        let points = reference.points();
        let samples = DMatrix::from_fn(points.len(), axes.len(), |i, j| {
            points[i][axes[j].index()]
        });
        let pca = compute_pca(&samples)?;

        log::debug!(
            "Fit {:?} principal axes on {} points, variances {:?}",
            mode,
            reference.len(),
            pca.eigenvalues.as_slice()
        );

        Ok(Self { mode, pca })
    }

    /// Alignment mode this transform was fit with.
    #[must_use]
    pub const fn mode(&self) -> AlignmentMode {
        self.mode
    }

    /// Underlying PCA result.
    #[must_use]
    pub const fn pca(&self) -> &PcaResult {
        &self.pca
    }

    /// Principal axis `i` expressed in `[x, y, z]` coordinates.
    ///
    /// In 2D mode the axis lies in the `(y, z)` plane.
    #[must_use]
    pub fn axis(&self, i: usize) -> [f64; 3] {
        let component = self.pca.axis(i);
        let mut out = [0.0; 3];
        for (axis, c) in self.mode.fit_axes().iter().zip(component) {
            out[axis.index()] = c;
        }
        out
    }

    /// Project `cloud` onto the principal axes and assign components to
    /// canonical axes.
    ///
    /// The value column is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] if `order` does not fit the mode.
    pub fn apply(&self, cloud: &PointCloud, order: &AxisAssignment) -> Result<PointCloud> {
        order.validate(self.mode)?;

        let points = match self.mode {
            AlignmentMode::Full3d => {
                let [cx, cy, cz] = order.0;
                let mut projected = [0.0; 3];
                cloud
                    .points()
                    .iter()
                    .map(|p| {
                        self.pca.project(p, &mut projected);
                        [projected[cx], projected[cy], projected[cz]]
                    })
                    .collect()
            }
            AlignmentMode::Transverse2d => {
                let cy = order.component_for(Axis::Y) - 1;
                let cz = order.component_for(Axis::Z) - 1;
                let mut projected = [0.0; 2];
                cloud
                    .points()
                    .iter()
                    .map(|p| {
                        self.pca.project(&[p[1], p[2]], &mut projected);
                        [p[0], projected[cy], projected[cz]]
                    })
                    .collect()
            }
        };

        Ok(PointCloud::from_points(points))
    }
}

/// Build the cloud used to fit the principal axes.
///
/// The raw reference volume is median filtered plane by plane, turned into a
/// cloud in physical units, thresholded with `reference_threshold` and then
/// scaled per axis.
///
/// # Errors
///
/// Returns [`FrameError::ShapeMismatch`] for non-3D volumes.
pub fn prepare_reference(volume: ArrayViewD<'_, f64>, config: &PipelineConfig) -> Result<PointCloud> {
    let denoised = ReferenceDenoiser::new(config.filter_radius)
        .with_parallel(config.parallel)
        .apply(volume)?;

    let cloud = PointCloudBuilder::new(config.microns).build_3d(denoised.view());
    let kept = cloud.above_threshold(config.reference_threshold);

    log::debug!(
        "Reference: {} of {} voxels above {}",
        kept.len(),
        cloud.len(),
        config.reference_threshold
    );

    Ok(kept.scaled(&config.scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::linalg::cosine_similarity;
    use approx::assert_relative_eq;

    fn elongated_cloud() -> PointCloud {
        // Long along (1, 1, 0), short along z.
        let mut points = Vec::new();
        for i in -10..=10 {
            for j in -2..=2 {
                let t = f64::from(i);
                let s = f64::from(j) * 0.3;
                points.push([t + s, t - s, f64::from(j % 2) * 0.1]);
            }
        }
        PointCloud::from_points(points)
    }

    fn covariance(points: &[[f64; 3]]) -> [[f64; 3]; 3] {
        let n = points.len() as f64;
        let mut mean = [0.0; 3];
        for p in points {
            for k in 0..3 {
                mean[k] += p[k] / n;
            }
        }
        let mut cov = [[0.0; 3]; 3];
        for p in points {
            for i in 0..3 {
                for j in 0..3 {
                    cov[i][j] += (p[i] - mean[i]) * (p[j] - mean[j]) / n;
                }
            }
        }
        cov
    }

    #[test]
    fn test_first_axis_follows_elongation() {
        let transform = PrincipalAxisTransform::fit(&elongated_cloud(), AlignmentMode::Full3d).unwrap();
        let sim = cosine_similarity(&transform.axis(0), &[1.0, 1.0, 0.0]);
        assert!(sim.abs() > 0.99, "cosine similarity {sim}");
    }

    #[test]
    fn test_identity_assignment_decorrelates() {
        let cloud = elongated_cloud();
        let transform = PrincipalAxisTransform::fit(&cloud, AlignmentMode::Full3d).unwrap();
        let aligned = transform.apply(&cloud, &AxisAssignment::identity()).unwrap();

        assert_eq!(aligned.len(), cloud.len());
        let cov = covariance(aligned.points());
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    assert_relative_eq!(cov[i][j], 0.0, epsilon = 1e-9);
                }
            }
        }
        assert!(cov[0][0] >= cov[1][1] && cov[1][1] >= cov[2][2]);
        for axis in Axis::ALL {
            assert_relative_eq!(aligned.mean(axis).unwrap(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_assignment_permutes_components() {
        let cloud = elongated_cloud();
        let transform = PrincipalAxisTransform::fit(&cloud, AlignmentMode::Full3d).unwrap();
        let identity = transform.apply(&cloud, &AxisAssignment::identity()).unwrap();
        let swapped = transform.apply(&cloud, &AxisAssignment([0, 2, 1])).unwrap();

        for (a, b) in identity.points().iter().zip(swapped.points()) {
            assert_relative_eq!(a[0], b[0]);
            assert_relative_eq!(a[1], b[2]);
            assert_relative_eq!(a[2], b[1]);
        }
    }

    #[test]
    fn test_transverse_mode_keeps_x() {
        let cloud = PointCloud::from_points(vec![
            [5.0, 0.0, 0.0],
            [6.0, 1.0, 2.0],
            [7.0, 2.0, 4.1],
            [8.0, 3.0, 5.9],
        ]);
        let transform = PrincipalAxisTransform::fit(&cloud, AlignmentMode::Transverse2d).unwrap();
        assert_relative_eq!(transform.axis(0)[0], 0.0);

        let aligned = transform.apply(&cloud, &AxisAssignment([0, 2, 1])).unwrap();
        for (a, p) in aligned.points().iter().zip(cloud.points()) {
            assert_relative_eq!(a[0], p[0]);
        }
        // The major (y, z) component lands on z with order [_, 2, 1].
        let spread_z: f64 = aligned.column(Axis::Z).map(|v| v * v).sum();
        let spread_y: f64 = aligned.column(Axis::Y).map(|v| v * v).sum();
        assert!(spread_z > spread_y);
    }

    #[test]
    fn test_assignment_validation() {
        assert!(AxisAssignment([0, 2, 1]).validate(AlignmentMode::Full3d).is_ok());
        assert!(AxisAssignment([0, 0, 1]).validate(AlignmentMode::Full3d).is_err());
        assert!(AxisAssignment([0, 3, 1]).validate(AlignmentMode::Full3d).is_err());
        assert!(AxisAssignment([0, 2, 1]).validate(AlignmentMode::Transverse2d).is_ok());
        assert!(AxisAssignment([0, 0, 1]).validate(AlignmentMode::Transverse2d).is_err());
    }

    #[test]
    fn test_fit_rejects_tiny_reference() {
        let cloud = PointCloud::from_points(vec![[0.0; 3], [1.0; 3]]);
        assert!(matches!(
            PrincipalAxisTransform::fit(&cloud, AlignmentMode::Full3d),
            Err(FrameError::InsufficientPoints { .. })
        ));
    }
}
