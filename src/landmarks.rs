//! Landmark aggregation over arclength × angle bins.
//!
//! Points of a [`CurvilinearCloud`] are binned by arclength and angle. For
//! every `(arclength bin, angle bin, percentile)` key a radial landmark is
//! computed: the percentile of `r` in the bin and how many points lie below
//! it. Bins that cannot produce a value fall back to a configured null
//! radius and zero count, recorded as such so they never look like data.

use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;

use crate::config::{angle_bin_count, LandmarkConfig};
use crate::error::{FrameError, Result};
use crate::mapper::CurvilinearCloud;
use crate::math::stats;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An open interval `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinRange {
    pub low: f64,
    pub high: f64,
}

impl BinRange {
    /// Whether `v` lies strictly inside the range.
    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        self.low < v && v < self.high
    }

    /// Centre of the range.
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.low + self.high)
    }
}

/// Arclength and angle bin edges shared by every sample of a batch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinEdges {
    arclength: Vec<f64>,
    angle: Vec<f64>,
}

impl BinEdges {
    /// Create edges from explicit sorted lists.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidInput`] if either list has fewer than two
    /// entries, is not sorted or holds non-finite values.
    pub fn new(arclength: Vec<f64>, angle: Vec<f64>) -> Result<Self> {
        for (name, edges) in [("arclength", &arclength), ("angle", &angle)] {
            if edges.len() < 2 {
                return Err(FrameError::invalid_input(format!(
                    "{name} needs at least two edges, got {}",
                    edges.len()
                )));
            }
            if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] < w[0]) {
                return Err(FrameError::invalid_input(format!(
                    "{name} edges must be finite and sorted"
                )));
            }
        }
        Ok(Self { arclength, angle })
    }

    /// `ac_num` equal arclength bins over `[-extent, extent]` and angle bins
    /// of width `tstep` over `[-π, π]`.
    ///
    /// # Errors
    ///
    /// Returns an error for a negative extent, zero bins or a step that
    /// does not divide `2π`.
    pub fn symmetric(extent: f64, ac_num: usize, tstep: f64) -> Result<Self> {
        if !(extent.is_finite() && extent >= 0.0) {
            return Err(FrameError::invalid_input(format!(
                "arclength extent must be finite and non-negative, got {extent}"
            )));
        }
        if ac_num == 0 {
            return Err(FrameError::invalid_config("ac_num must be at least 1"));
        }
        let angle_bins = angle_bin_count(tstep)?;
        Self::new(
            stats::linspace(-extent, extent, ac_num + 1),
            stats::linspace(-std::f64::consts::PI, std::f64::consts::PI, angle_bins + 1),
        )
    }

    /// Edges spanning every cloud of a batch, symmetric about the vertex.
    ///
    /// The extent is `max(|min ac|, max ac)` over all clouds, with both
    /// bounds starting at zero.
    ///
    /// # Errors
    ///
    /// See [`BinEdges::symmetric`].
    pub fn from_clouds<'a>(
        clouds: impl IntoIterator<Item = &'a CurvilinearCloud>,
        ac_num: usize,
        tstep: f64,
    ) -> Result<Self> {
        let (min, max) = clouds
            .into_iter()
            .filter_map(CurvilinearCloud::arclength_range)
            .fold((0.0f64, 0.0f64), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
        let extent = min.abs().max(max);
        if extent == 0.0 {
            log::warn!("Arclength extent of batch is zero; every landmark bin will be empty");
        }
        Self::symmetric(extent, ac_num, tstep)
    }

    /// Arclength edges.
    #[must_use]
    pub fn arclength_edges(&self) -> &[f64] {
        &self.arclength
    }

    /// Angle edges.
    #[must_use]
    pub fn angle_edges(&self) -> &[f64] {
        &self.angle
    }

    /// Number of arclength bins.
    #[must_use]
    pub fn n_arclength_bins(&self) -> usize {
        self.arclength.len() - 1
    }

    /// Number of angle bins.
    #[must_use]
    pub fn n_angle_bins(&self) -> usize {
        self.angle.len() - 1
    }

    /// Range of arclength bin `i`.
    #[must_use]
    pub fn arclength_bin(&self, i: usize) -> BinRange {
        BinRange {
            low: self.arclength[i],
            high: self.arclength[i + 1],
        }
    }

    /// Range of angle bin `j`.
    #[must_use]
    pub fn angle_bin(&self, j: usize) -> BinRange {
        BinRange {
            low: self.angle[j],
            high: self.angle[j + 1],
        }
    }

    /// Bin indices of a point, or `None` if it is outside or on an edge.
    #[must_use]
    pub fn locate(&self, ac: f64, theta: f64) -> Option<(usize, usize)> {
        Some((locate(&self.arclength, ac)?, locate(&self.angle, theta)?))
    }
}

// Index of the open interval containing v.
fn locate(edges: &[f64], v: f64) -> Option<usize> {
    let k = edges.partition_point(|&e| e < v);
    if k == 0 || k == edges.len() || edges[k] <= v {
        return None;
    }
    Some(k - 1)
}

/// Which quantity of a landmark is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LandmarkMetric {
    /// Radial percentile value.
    Radius,
    /// Points below that value.
    Points,
}

/// Identifies one landmark column.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandmarkKey {
    pub arclength: BinRange,
    pub angle: BinRange,
    pub arclength_index: usize,
    pub angle_index: usize,
    pub percentile: f64,
}

/// Why a bin has no computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FallbackReason {
    /// No point fell strictly inside the bin.
    EmptyBin,
    /// The percentile of the bin's radii could not be computed.
    PercentileUndefined,
}

/// Outcome for one landmark of one sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LandmarkValue {
    /// Percentile radius and number of points strictly below it.
    Computed { radius: f64, points: usize },
    /// The null radius, with zero points.
    Fallback { radius: f64, reason: FallbackReason },
    /// The landmark could not be evaluated at all.
    Error { reason: String },
}

impl LandmarkValue {
    /// Radius for computed and fallback values.
    #[must_use]
    pub fn radius(&self) -> Option<f64> {
        match self {
            Self::Computed { radius, .. } | Self::Fallback { radius, .. } => Some(*radius),
            Self::Error { .. } => None,
        }
    }

    /// Point count; zero unless computed.
    #[must_use]
    pub fn points(&self) -> usize {
        match self {
            Self::Computed { points, .. } => *points,
            _ => 0,
        }
    }

    /// Value of one metric, `None` for errors.
    #[must_use]
    pub fn metric(&self, metric: LandmarkMetric) -> Option<f64> {
        match metric {
            LandmarkMetric::Radius => self.radius(),
            LandmarkMetric::Points => self.radius().map(|_| self.points() as f64),
        }
    }

    /// Whether a value was computed from data.
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }
}

/// Mean point counts per key, taken from a reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCounts {
    entries: Vec<(LandmarkKey, Option<f64>)>,
}

impl ReferenceCounts {
    /// Mean `points` of each column of `table`, ignoring error values.
    #[must_use]
    pub fn from_table(table: &LandmarkTable) -> Self {
        let entries = table
            .keys()
            .iter()
            .enumerate()
            .map(|(k, key)| {
                let counts: Vec<f64> = table
                    .column(k)
                    .filter(|v| !matches!(v, LandmarkValue::Error { .. }))
                    .map(|v| v.points() as f64)
                    .collect();
                (*key, stats::mean(&counts))
            })
            .collect();
        Self { entries }
    }

    /// Mean count recorded for `key`, looked up by position first.
    #[must_use]
    pub fn mean_points(&self, index: usize, key: &LandmarkKey) -> Option<f64> {
        match self.entries.get(index) {
            Some((k, count)) if k == key => *count,
            _ => self
                .entries
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, count)| *count),
        }
    }
}

/// How each bin's radius is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregationMode<'a> {
    /// The key's percentile of `r`.
    Percentile,
    /// The radius enclosing the reference's mean point count for the key.
    MatchedCount(&'a ReferenceCounts),
}

/// One sample to aggregate.
#[derive(Debug, Clone, Copy)]
pub struct SampleCloud<'a> {
    pub sample_id: u64,
    pub group: &'a str,
    pub cloud: &'a CurvilinearCloud,
}

/// Landmarks of one sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandmarkRow {
    pub sample_id: u64,
    /// Category label of the sample.
    pub group: String,
    /// One value per key of the owning table.
    pub values: Vec<LandmarkValue>,
}

/// Per-key summary across the samples of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandmarkSummary {
    pub key: LandmarkKey,
    pub mean_radius: f64,
    /// Standard error of the mean radius; `None` with fewer than two samples.
    pub standard_error: Option<f64>,
    pub mean_points: f64,
    pub arclength_mid: f64,
    pub angle_mid: f64,
    /// `(ac_mid, sin(angle_mid)·r, cos(angle_mid)·r)`.
    pub position: [f64; 3],
}

/// Landmarks of a batch: one row per sample, one column per key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandmarkTable {
    edges: BinEdges,
    keys: Vec<LandmarkKey>,
    rows: Vec<LandmarkRow>,
}

impl LandmarkTable {
    /// Bin edges the keys were built from.
    #[must_use]
    pub const fn edges(&self) -> &BinEdges {
        &self.edges
    }

    /// Column keys.
    #[must_use]
    pub fn keys(&self) -> &[LandmarkKey] {
        &self.keys
    }

    /// Sample rows.
    #[must_use]
    pub fn rows(&self) -> &[LandmarkRow] {
        &self.rows
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of a sample.
    #[must_use]
    pub fn row(&self, sample_id: u64) -> Option<&LandmarkRow> {
        self.rows.iter().find(|r| r.sample_id == sample_id)
    }

    /// Values of one column, in row order.
    pub fn column(&self, key_index: usize) -> impl Iterator<Item = &LandmarkValue> + '_ {
        self.rows.iter().filter_map(move |r| r.values.get(key_index))
    }

    /// Column index of a key.
    #[must_use]
    pub fn key_index(&self, arclength_index: usize, angle_index: usize, percentile: f64) -> Option<usize> {
        self.keys.iter().position(|k| {
            k.arclength_index == arclength_index
                && k.angle_index == angle_index
                && same_percentile(k.percentile, percentile)
        })
    }

    /// Mean radius, its standard error and mean count per key.
    ///
    /// Fallback values take part with their null radius and zero count;
    /// error values are skipped. Keys without any usable value are omitted.
    #[must_use]
    pub fn summarize(&self) -> Vec<LandmarkSummary> {
        self.keys
            .iter()
            .enumerate()
            .filter_map(|(k, key)| {
                let (radii, counts): (Vec<f64>, Vec<f64>) = self
                    .column(k)
                    .filter_map(|v| Some((v.radius()?, v.points() as f64)))
                    .unzip();
                let mean_radius = stats::mean(&radii)?;
                let arclength_mid = key.arclength.midpoint();
                let angle_mid = key.angle.midpoint();
                Some(LandmarkSummary {
                    key: *key,
                    mean_radius,
                    standard_error: stats::standard_error(&radii),
                    mean_points: stats::mean(&counts)?,
                    arclength_mid,
                    angle_mid,
                    position: [
                        arclength_mid,
                        angle_mid.sin() * mean_radius,
                        angle_mid.cos() * mean_radius,
                    ],
                })
            })
            .collect()
    }
}

fn same_percentile(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

/// Computes landmark rows for samples sharing one set of bin edges.
///
/// # Example
///
/// ```
/// use curvilinear_frame::landmarks::{AggregationMode, BinEdges, LandmarkAggregator};
/// use curvilinear_frame::CurvilinearCloud;
/// use std::f64::consts::PI;
///
/// let edges = BinEdges::symmetric(10.0, 10, PI / 4.0)?;
/// let aggregator = LandmarkAggregator::new(edges, vec![50.0], 15.0)?;
/// assert_eq!(aggregator.keys().len(), 10 * 8);
///
/// let row = aggregator.aggregate(1, "wt", &CurvilinearCloud::default(), AggregationMode::Percentile);
/// assert!(row.values.iter().all(|v| v.radius() == Some(15.0)));
/// # Ok::<(), curvilinear_frame::FrameError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkAggregator {
    edges: BinEdges,
    percentiles: Vec<f64>,
    rnull: f64,
    keys: Vec<LandmarkKey>,
    parallel: bool,
}

impl LandmarkAggregator {
    /// Create an aggregator.
    ///
    /// Keys are ordered by arclength bin, then angle bin, then percentile.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidConfig`] for empty or out-of-range
    /// percentiles and a non-finite `rnull`.
    pub fn new(edges: BinEdges, percentiles: Vec<f64>, rnull: f64) -> Result<Self> {
        if percentiles.is_empty() || percentiles.iter().any(|p| !(0.0..=100.0).contains(p)) {
            return Err(FrameError::invalid_config(format!(
                "percentiles {percentiles:?} must be non-empty and within [0, 100]"
            )));
        }
        if !rnull.is_finite() {
            return Err(FrameError::invalid_config("rnull must be finite"));
        }

        let mut keys = Vec::with_capacity(
            edges.n_arclength_bins() * edges.n_angle_bins() * percentiles.len(),
        );
        for arclength_index in 0..edges.n_arclength_bins() {
            for angle_index in 0..edges.n_angle_bins() {
                for &percentile in &percentiles {
                    keys.push(LandmarkKey {
                        arclength: edges.arclength_bin(arclength_index),
                        angle: edges.angle_bin(angle_index),
                        arclength_index,
                        angle_index,
                        percentile,
                    });
                }
            }
        }

        Ok(Self {
            edges,
            percentiles,
            rnull,
            keys,
            parallel: true,
        })
    }

    /// Derive edges from a batch and build an aggregator for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config<'a>(
        clouds: impl IntoIterator<Item = &'a CurvilinearCloud>,
        config: &LandmarkConfig,
    ) -> Result<Self> {
        config.validate()?;
        let edges = BinEdges::from_clouds(clouds, config.ac_num, config.tstep)?;
        Self::new(edges, config.percentiles.clone(), config.rnull)
    }

    /// Enable/disable rayon across samples.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Bin edges.
    #[must_use]
    pub const fn edges(&self) -> &BinEdges {
        &self.edges
    }

    /// Column keys.
    #[must_use]
    pub fn keys(&self) -> &[LandmarkKey] {
        &self.keys
    }

    /// Percentiles per bin.
    #[must_use]
    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// Landmarks of one sample.
    #[must_use]
    pub fn aggregate(
        &self,
        sample_id: u64,
        group: &str,
        cloud: &CurvilinearCloud,
        mode: AggregationMode<'_>,
    ) -> LandmarkRow {
        let n_angle = self.edges.n_angle_bins();
        let mut bins = vec![Vec::new(); self.edges.n_arclength_bins() * n_angle];
        for p in cloud.points() {
            if let Some((i, j)) = self.edges.locate(p.ac, p.theta) {
                bins[i * n_angle + j].push(p.r);
            }
        }

        let values: Vec<LandmarkValue> = self
            .keys
            .iter()
            .enumerate()
            .map(|(k, key)| {
                let radii = &bins[key.arclength_index * n_angle + key.angle_index];
                self.evaluate(k, key, radii, mode)
            })
            .collect();

        if values.iter().all(|v| !v.is_computed()) {
            log::warn!("Sample {sample_id}: no landmark bin produced a value");
        }

        LandmarkRow {
            sample_id,
            group: group.to_owned(),
            values,
        }
    }

    fn evaluate(
        &self,
        index: usize,
        key: &LandmarkKey,
        radii: &[f64],
        mode: AggregationMode<'_>,
    ) -> LandmarkValue {
        if radii.is_empty() {
            return LandmarkValue::Fallback {
                radius: self.rnull,
                reason: FallbackReason::EmptyBin,
            };
        }

        let percentile = match mode {
            AggregationMode::Percentile => key.percentile,
            AggregationMode::MatchedCount(reference) => {
                let Some(target) = reference.mean_points(index, key) else {
                    return LandmarkValue::Error {
                        reason: format!(
                            "no reference count for bin ({}, {}) at percentile {}",
                            key.arclength_index, key.angle_index, key.percentile
                        ),
                    };
                };
                (100.0 * target / radii.len() as f64).clamp(0.0, 100.0)
            }
        };

        match stats::percentile(radii, percentile) {
            Some(radius) => LandmarkValue::Computed {
                radius,
                points: radii.iter().filter(|&&r| r < radius).count(),
            },
            None => LandmarkValue::Fallback {
                radius: self.rnull,
                reason: FallbackReason::PercentileUndefined,
            },
        }
    }

    /// Landmarks of every sample, in input order.
    #[must_use]
    pub fn aggregate_batch(&self, samples: &[SampleCloud<'_>], mode: AggregationMode<'_>) -> LandmarkTable {
        let run = |s: &SampleCloud<'_>| self.aggregate(s.sample_id, s.group, s.cloud, mode);
        let rows: Vec<LandmarkRow> = if self.parallel {
            samples.par_iter().map(run).collect()
        } else {
            samples.iter().map(run).collect()
        };

        let computed = rows
            .iter()
            .flat_map(|r| &r.values)
            .filter(|v| v.is_computed())
            .count();
        log::debug!(
            "Aggregated {} samples over {} keys, {} values computed",
            rows.len(),
            self.keys.len(),
            computed
        );

        LandmarkTable {
            edges: self.edges.clone(),
            keys: self.keys.clone(),
            rows,
        }
    }
}

/// One percentile's radii as an arclength × angle × sample array.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkGrid {
    values: Array3<f64>,
    sample_ids: Vec<u64>,
    percentile: f64,
}

impl LandmarkGrid {
    /// Collect the radii of `percentile` from `table`.
    ///
    /// Error values become NaN.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidInput`] if the table has no rows or no
    /// key with that percentile.
    pub fn from_table(table: &LandmarkTable, percentile: f64) -> Result<Self> {
        if table.is_empty() {
            return Err(FrameError::invalid_input("landmark table has no samples"));
        }

        let edges = table.edges();
        let (n_ac, n_angle) = (edges.n_arclength_bins(), edges.n_angle_bins());
        let mut values = Array3::from_elem((n_ac, n_angle, table.len()), f64::NAN);
        for i in 0..n_ac {
            for t in 0..n_angle {
                let k = table.key_index(i, t, percentile).ok_or_else(|| {
                    FrameError::invalid_input(format!(
                        "landmark table has no percentile {percentile} for bin ({i}, {t})"
                    ))
                })?;
                for (s, value) in table.column(k).enumerate() {
                    values[[i, t, s]] = value.radius().unwrap_or(f64::NAN);
                }
            }
        }

        Ok(Self {
            values,
            sample_ids: table.rows().iter().map(|r| r.sample_id).collect(),
            percentile,
        })
    }

    /// The `[arclength, angle, sample]` array.
    #[must_use]
    pub const fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Sample of each index along the last axis.
    #[must_use]
    pub fn sample_ids(&self) -> &[u64] {
        &self.sample_ids
    }

    /// Percentile the grid was taken at.
    #[must_use]
    pub const fn percentile(&self) -> f64 {
        self.percentile
    }

    /// Population variance across samples for every bin.
    #[must_use]
    pub fn sample_variance(&self) -> Array2<f64> {
        self.values.var_axis(Axis(2), 0.0)
    }

    /// Population variance of each interior bin with its two arclength
    /// neighbours, per angle bin and sample.
    ///
    /// Rows run over `(arclength bin 1..n-1, angle bin)`, columns over
    /// samples. Fewer than three arclength bins give no rows.
    #[must_use]
    pub fn neighbor_variance(&self) -> Array2<f64> {
        let (n_ac, n_angle, n_samples) = self.values.dim();
        let interior = n_ac.saturating_sub(2);
        let mut out = Array2::zeros((interior * n_angle, n_samples));

        for i in 1..n_ac.saturating_sub(1) {
            for t in 0..n_angle {
                let row = (i - 1) * n_angle + t;
                for s in 0..n_samples {
                    let window = [
                        self.values[[i - 1, t, s]],
                        self.values[[i, t, s]],
                        self.values[[i + 1, t, s]],
                    ];
                    out[[row, s]] = stats::variance(&window).unwrap_or(f64::NAN);
                }
            }
        }
        out
    }
}
