//! Curvilinear Frame Library
//!
//! Canonical curvilinear coordinates for point clouds extracted from
//! volumetric probability maps.
//!
//! Samples of a curved structure differ in position, orientation and scale.
//! This library aligns each sample to the principal axes of a reference
//! channel, fits a parabola (or line) to it, re-centers everything on the
//! curve's vertex and then expresses every point by its arclength along the
//! curve, its angle around it and its distance from it. Points of
//! structurally equivalent regions then share coordinates across samples.
//!
//! # Features
//!
//! - **Shared frame**: axes, vertex, turn and curve model are decided once on
//!   a primary channel and passed explicitly to every other channel
//! - **Explicit failures**: non-converged projections and empty landmark bins
//!   are recorded as values, not hidden behind sentinels
//! - **Landmarks**: percentile radii per arclength × angle bin, with a
//!   variance-driven choice of the number of arclength bins
//! - **Parallel**: per-point projection and per-plane denoising run on rayon
//!
//! # Quick Start
//!
//! ```
//! use curvilinear_frame::{process_sample, Channel, PipelineConfig};
//! use ndarray::Array3;
//!
//! // A thick bar along x in a (z, y, x) volume.
//! let mut volume = Array3::<f64>::zeros((6, 10, 20));
//! for z in 2..4 {
//!     for y in 3..7 {
//!         for x in 2..18 {
//!             volume[[z, y, x]] = 1.0;
//!         }
//!     }
//! }
//!
//! let config = PipelineConfig::linear_structure().with_filter_radius(1);
//! let channels = [Channel { name: "ref", volume: volume.view().into_dyn() }];
//! let result = process_sample("fish-1", &channels, "ref", &config)?;
//!
//! let mapped = &result.channels[0].curvilinear;
//! assert_eq!(mapped.len(), 2 * 4 * 16);
//! assert!(mapped.points().iter().all(|p| p.r >= 0.0));
//! # Ok::<(), curvilinear_frame::FrameError>(())
//! ```
//!
//! # Pipeline
//!
//! | Stage | Entry point |
//! |-------|-------------|
//! | Volume to cloud | [`PointCloudBuilder`] |
//! | Reference denoising | [`ReferenceDenoiser`] |
//! | Principal-axis alignment | [`PrincipalAxisTransform`] |
//! | Vertex, turn and curve model | [`CurveModelFitter`] |
//! | Curvilinear coordinates | [`CurvilinearMapper`] |
//! | Landmarks | [`LandmarkAggregator`] |
//! | Bin-count calibration | [`BinCountOptimizer`] |
//! | Coordinate densities | [`DensityEstimator`], [`area_error`] |
//!
//! # Presets
//!
//! ```
//! use curvilinear_frame::PipelineConfig;
//!
//! let forebrain = PipelineConfig::zebrafish_forebrain();
//! let linear = PipelineConfig::linear_structure();
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod align;
pub mod bin_count;
pub mod cloud;
pub mod config;
pub mod curve;
pub mod denoise;
pub mod density;
pub mod error;
pub mod landmarks;
pub mod mapper;
pub mod math;
pub mod sample;

// Re-exports for convenient access
pub use align::{prepare_reference, AlignmentMode, AxisAssignment, PrincipalAxisTransform};
pub use bin_count::{BinCountOptimizer, BinCountProfile, BinCountSelection};
pub use cloud::{Axis, PointCloud, PointCloudBuilder, ScaleVector};
pub use config::{LandmarkConfig, PipelineConfig, SweepConfig};
pub use curve::{
    fit_models, refit_aligned, CurveFit, CurveModel, CurveModelFitter, CurveOptions,
    FitDimensions, VertexSource,
};
pub use denoise::ReferenceDenoiser;
pub use density::{area_error, area_errors, Bandwidth, DensityEstimator, GaussianKde};
pub use error::{FrameError, Result};
pub use landmarks::{
    AggregationMode, BinEdges, FallbackReason, LandmarkAggregator, LandmarkGrid, LandmarkKey,
    LandmarkMetric, LandmarkRow, LandmarkSummary, LandmarkTable, LandmarkValue, ReferenceCounts,
    SampleCloud,
};
pub use mapper::{
    Coordinate, CurvilinearCloud, CurvilinearMapper, CurvilinearPoint, PointFailure, ProjectionFailure,
};
pub use sample::{
    channel_cloud, process_primary, process_sample, process_secondary, Channel, ChannelResult,
    SampleFrame, SampleResult,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
