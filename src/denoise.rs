//! Plane-wise disk median filtering of the reference channel.
//!
//! The reference channel is smoothed before thresholding and principal-axis
//! fitting. Each `(y, x)` plane is filtered independently so `z` stays a
//! physical axis; the filter runs twice because the second pass clears
//! residual speckle left by the first.

use ndarray::{Array2, Array3, ArrayView2, ArrayViewD, Axis as ArrayAxis, Ix3};
use rayon::prelude::*;

use crate::error::{FrameError, Result};

/// Number of median passes applied to each plane.
pub const DEFAULT_PASSES: usize = 2;

/// Disk-footprint median filter applied plane by plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDenoiser {
    radius: usize,
    passes: usize,
    parallel: bool,
    offsets: Vec<(isize, isize)>,
}

impl ReferenceDenoiser {
    /// Create a denoiser with a disk of the given radius and two passes.
    #[must_use]
    pub fn new(radius: usize) -> Self {
        Self {
            radius,
            passes: DEFAULT_PASSES,
            parallel: true,
            offsets: disk_offsets(radius),
        }
    }

    /// Set the number of passes.
    #[must_use]
    pub const fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    /// Enable or disable plane-parallel filtering.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disk radius in voxels.
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// Filter a dynamically shaped `[z, y, x]` volume.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ShapeMismatch`] if the array is not 3-dimensional.
    pub fn apply(&self, field: ArrayViewD<'_, f64>) -> Result<Array3<f64>> {
        let ndim = field.ndim();
        let field = field.into_dimensionality::<Ix3>().map_err(|_| {
            FrameError::shape_mismatch("3-dimensional [z, y, x] array", format!("{ndim} dimensions"))
        })?;

        let n_planes = field.len_of(ArrayAxis(0));
        let filter = |z: usize| self.filter_plane(field.index_axis(ArrayAxis(0), z));

        let planes: Vec<Array2<f64>> = if self.parallel {
            (0..n_planes).into_par_iter().map(filter).collect()
        } else {
            (0..n_planes).map(filter).collect()
        };

        let mut out = Array3::<f64>::zeros(field.raw_dim());
        for (z, plane) in planes.iter().enumerate() {
            out.index_axis_mut(ArrayAxis(0), z).assign(plane);
        }

        log::debug!(
            "Denoised {} planes with disk radius {} ({} passes)",
            n_planes,
            self.radius,
            self.passes
        );

        Ok(out)
    }

    /// Run all passes over one `(y, x)` plane.
    fn filter_plane(&self, plane: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut current = plane.to_owned();
        for _ in 0..self.passes {
            current = self.median_pass(current.view());
        }
        current
    }

    /// One median pass with nearest-edge extension.
    fn median_pass(&self, plane: ArrayView2<'_, f64>) -> Array2<f64> {
        let (height, width) = plane.dim();
        if height == 0 || width == 0 || self.radius == 0 {
            return plane.to_owned();
        }

        let max_y = height as isize - 1;
        let max_x = width as isize - 1;
        let mut window = Vec::with_capacity(self.offsets.len());

        Array2::from_shape_fn((height, width), |(y, x)| {
            window.clear();
            for &(dy, dx) in &self.offsets {
                let ny = (y as isize + dy).clamp(0, max_y) as usize;
                let nx = (x as isize + dx).clamp(0, max_x) as usize;
                window.push(plane[[ny, nx]]);
            }
            median_of(&mut window)
        })
    }
}

/// Offsets `(dy, dx)` inside a disk of the given radius.
fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let r2 = r * r;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dy * dy + dx * dx <= r2 {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

/// Median of a non-empty window; reorders the slice.
fn median_of(values: &mut [f64]) -> f64 {
    let mid = values.len() / 2;
    let (_, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if values.len() % 2 == 1 {
        return upper;
    }
    let lower = values[..mid]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    (lower + upper) / 2.0
}
