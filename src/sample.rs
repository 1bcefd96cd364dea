//! Processing of all channels of one sample in a shared frame.
//!
//! The primary channel decides the [`SampleFrame`]: the principal axes of
//! its denoised reference, and the vertex, turn and curve model of its
//! aligned cloud. Every other channel is then aligned, centered and mapped
//! with that frame passed in explicitly, so all channels of a sample are
//! directly comparable.
//!
//! Stage-level failures are wrapped in [`FrameError::Stage`] naming the
//! sample and the stage.

use ndarray::ArrayViewD;

use crate::align::{prepare_reference, AxisAssignment, PrincipalAxisTransform};
use crate::cloud::{PointCloud, PointCloudBuilder};
use crate::config::PipelineConfig;
use crate::curve::{CurveModel, CurveModelFitter, CurveOptions, VertexSource};
use crate::error::{FrameError, Result};
use crate::mapper::{CurvilinearCloud, CurvilinearMapper};

/// Frame shared by every channel of a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    pub transform: PrincipalAxisTransform,
    pub comp_order: AxisAssignment,
    pub model: CurveModel,
    pub vertex: [f64; 3],
    pub vertex_source: VertexSource,
    pub flipped: bool,
}

/// A named channel volume.
#[derive(Debug, Clone)]
pub struct Channel<'a> {
    pub name: &'a str,
    pub volume: ArrayViewD<'a, f64>,
}

/// One processed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResult {
    pub name: String,
    /// Aligned, vertex-centered and oriented cloud.
    pub aligned: PointCloud,
    pub curvilinear: CurvilinearCloud,
}

/// All channels of a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub sample: String,
    pub frame: SampleFrame,
    pub channels: Vec<ChannelResult>,
}

impl SampleResult {
    /// Result of a channel by name.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&ChannelResult> {
        self.channels.iter().find(|c| c.name == name)
    }
}

/// Thresholded, scaled cloud of one channel.
///
/// # Errors
///
/// Returns [`FrameError::ShapeMismatch`] for non-3D volumes.
pub fn channel_cloud(volume: ArrayViewD<'_, f64>, config: &PipelineConfig) -> Result<PointCloud> {
    let cloud = PointCloudBuilder::new(config.microns).build(volume)?;
    Ok(cloud.above_threshold(config.threshold).scaled(&config.scale))
}

/// Decide the frame on the primary channel and map that channel.
///
/// # Errors
///
/// Returns [`FrameError::Stage`] if any stage fails.
pub fn process_primary(
    sample: &str,
    name: &str,
    volume: ArrayViewD<'_, f64>,
    config: &PipelineConfig,
) -> Result<(SampleFrame, ChannelResult)> {
    let stage = |stage: &'static str| move |e: FrameError| e.in_stage(sample, stage);

    config.validate().map_err(stage("config"))?;

    let reference = prepare_reference(volume.view(), config).map_err(stage("reference"))?;
    let transform =
        PrincipalAxisTransform::fit(&reference, config.alignment).map_err(stage("align"))?;

    let general = channel_cloud(volume, config).map_err(stage("build"))?;
    let aligned = transform
        .apply(&general, &config.comp_order)
        .map_err(stage("align"))?;

    let fitter = CurveModelFitter::from_config(config).map_err(stage("curve fit"))?;
    let fit = fitter
        .fit(&aligned, &CurveOptions::default())
        .map_err(stage("curve fit"))?;

    let curvilinear = CurvilinearMapper::from_config(&fit.model, config).map(&fit.cloud);
    log::debug!(
        "Sample {sample}: primary channel {name} mapped {} of {} points",
        curvilinear.len(),
        fit.cloud.len()
    );

    let frame = SampleFrame {
        transform,
        comp_order: config.comp_order,
        model: fit.model,
        vertex: fit.vertex,
        vertex_source: fit.vertex_source,
        flipped: fit.flipped,
    };
    let result = ChannelResult {
        name: name.to_owned(),
        aligned: fit.cloud,
        curvilinear,
    };
    Ok((frame, result))
}

/// Map a secondary channel in the frame decided on the primary.
///
/// # Errors
///
/// Returns [`FrameError::Stage`] if any stage fails.
pub fn process_secondary(
    sample: &str,
    name: &str,
    volume: ArrayViewD<'_, f64>,
    frame: &SampleFrame,
    config: &PipelineConfig,
) -> Result<ChannelResult> {
    let stage = |stage: &'static str| move |e: FrameError| e.in_stage(sample, stage);

    let general = channel_cloud(volume, config).map_err(stage("build"))?;
    let aligned = frame
        .transform
        .apply(&general, &frame.comp_order)
        .map_err(stage("align"))?;

    let fitter = CurveModelFitter::from_config(config).map_err(stage("curve fit"))?;
    let shared = CurveOptions::shared(frame.model.clone(), frame.vertex, frame.flipped);
    let fit = fitter.fit(&aligned, &shared).map_err(stage("curve fit"))?;

    let curvilinear = CurvilinearMapper::from_config(&frame.model, config).map(&fit.cloud);
    log::debug!(
        "Sample {sample}: channel {name} mapped {} of {} points",
        curvilinear.len(),
        fit.cloud.len()
    );

    Ok(ChannelResult {
        name: name.to_owned(),
        aligned: fit.cloud,
        curvilinear,
    })
}

/// Process every channel of a sample, deciding the frame on `primary`.
///
/// Channel results keep the input order.
///
/// # Errors
///
/// Returns [`FrameError::Stage`] if `primary` is not among the channels or
/// any channel fails a stage.
pub fn process_sample(
    sample: &str,
    channels: &[Channel<'_>],
    primary: &str,
    config: &PipelineConfig,
) -> Result<SampleResult> {
    let primary_channel = channels.iter().find(|c| c.name == primary).ok_or_else(|| {
        FrameError::invalid_input(format!("no channel named {primary}")).in_stage(sample, "channels")
    })?;

    let (frame, primary_result) =
        process_primary(sample, primary, primary_channel.volume.view(), config)?;

    let mut primary_result = Some(primary_result);
    let mut results = Vec::with_capacity(channels.len());
    for channel in channels {
        let result = match (channel.name == primary, primary_result.take()) {
            (true, Some(done)) => done,
            (_, pending) => {
                primary_result = pending;
                process_secondary(sample, channel.name, channel.volume.view(), &frame, config)?
            }
        };
        results.push(result);
    }

    log::info!(
        "Sample {sample}: {} channels in frame of {primary} (vertex {:?}, flipped {})",
        results.len(),
        frame.vertex,
        frame.flipped
    );

    Ok(SampleResult {
        sample: sample.to_owned(),
        frame,
        channels: results,
    })
}
