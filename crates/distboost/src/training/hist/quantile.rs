//! Mergeable weighted quantile sketch and the histogram cuts derived from it.
//!
//! Each worker sketches its own blocks, the driver merges the per-worker
//! sketches and turns the result into [`HistogramCuts`] shared by every
//! worker. Summaries keep the exact minimum and maximum of each feature; the
//! interior is pruned to a bounded number of entries.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::training::WeightsView;

/// Entries kept per feature, relative to `max_bin`.
const SKETCH_EPS_FACTOR: usize = 8;

// =============================================================================
// FeatureSummary
// =============================================================================

/// Weighted summary of one feature's values.
///
/// Entries are `(value, weight)` sorted by strictly increasing value. NaN is
/// never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSummary {
    entries: Vec<(f32, f64)>,
}

impl FeatureSummary {
    /// Exact summary of a column. Rows with zero weight are ignored.
    pub fn from_values(values: ArrayView1<'_, f32>, weights: WeightsView<'_>) -> Self {
        let mut sorted: Vec<(f32, f64)> = values
            .iter()
            .zip(weights.iter(values.len()))
            .filter(|&(v, w)| !v.is_nan() && w > 0.0)
            .map(|(&v, w)| (v, w as f64))
            .collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut entries: Vec<(f32, f64)> = Vec::new();
        for (v, weight) in sorted {
            match entries.last_mut() {
                Some((last, w)) if *last == v => *w += weight,
                _ => entries.push((v, weight)),
            }
        }
        Self { entries }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|&(_, w)| w).sum()
    }

    pub fn min(&self) -> Option<f32> {
        self.entries.first().map(|&(v, _)| v)
    }

    pub fn max(&self) -> Option<f32> {
        self.entries.last().map(|&(v, _)| v)
    }

    /// Merge two summaries, summing weights of equal values.
    pub fn merge(&self, other: &Self) -> Self {
        let (a, b) = (&self.entries, &other.entries);
        let mut entries = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let (va, wa) = a[i];
            let (vb, wb) = b[j];
            if va < vb {
                entries.push((va, wa));
                i += 1;
            } else if vb < va {
                entries.push((vb, wb));
                j += 1;
            } else {
                entries.push((va, wa + wb));
                i += 1;
                j += 1;
            }
        }
        entries.extend_from_slice(&a[i..]);
        entries.extend_from_slice(&b[j..]);
        Self { entries }
    }

    /// Reduce to at most `max_entries` entries, keeping the first and last.
    ///
    /// Weight of dropped entries moves to the next kept entry, so the total
    /// weight and the rank of every kept value are preserved.
    pub fn prune(&mut self, max_entries: usize) {
        let n = self.entries.len();
        if n <= max_entries || max_entries < 2 {
            return;
        }

        let total = self.total_weight();
        let mut keep = Vec::with_capacity(max_entries);
        keep.push(0);

        let mut cum = 0.0;
        let mut k = 1;
        for (idx, &(_, w)) in self.entries.iter().enumerate().take(n - 1) {
            cum += w;
            let target = k as f64 * total / (max_entries - 1) as f64;
            if cum >= target && idx > *keep.last().unwrap_or(&0) {
                keep.push(idx);
                while (k as f64 * total / (max_entries - 1) as f64) <= cum {
                    k += 1;
                }
            }
            if keep.len() == max_entries - 1 {
                break;
            }
        }
        keep.push(n - 1);

        let mut pruned = Vec::with_capacity(keep.len());
        let mut start = 0;
        for &idx in &keep {
            let weight: f64 = self.entries[start..=idx].iter().map(|&(_, w)| w).sum();
            pruned.push((self.entries[idx].0, weight));
            start = idx + 1;
        }
        self.entries = pruned;
    }

    /// Cut points for at most `max_bin` bins.
    ///
    /// Returns strictly increasing values; the last one lies above the
    /// feature's maximum.
    fn cuts(&self, max_bin: usize) -> Vec<f32> {
        let (Some(min), Some(max)) = (self.min(), self.max()) else {
            return vec![f32::MAX];
        };

        let mut cuts: Vec<f32> = Vec::with_capacity(max_bin);
        if self.entries.len() <= max_bin {
            cuts.extend(self.entries.iter().skip(1).map(|&(v, _)| v));
        } else {
            let total = self.total_weight();
            let mut cum = 0.0;
            let mut idx = 0;
            for k in 1..max_bin {
                let target = k as f64 * total / max_bin as f64;
                while idx < self.entries.len() - 1 && cum + self.entries[idx].1 <= target {
                    cum += self.entries[idx].1;
                    idx += 1;
                }
                let value = self.entries[idx].0;
                if value > min && cuts.last().is_none_or(|&last| value > last) {
                    cuts.push(value);
                }
            }
            // Leave room for the upper bound.
            cuts.truncate(max_bin - 1);
        }

        let upper = max + (max.abs() * 1e-5).max(1e-5);
        if cuts.last().is_none_or(|&last| upper > last) {
            cuts.push(upper);
        }
        cuts
    }
}

// =============================================================================
// QuantileSketch
// =============================================================================

/// Per-feature summaries for a whole dataset shard.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileSketch {
    max_bin: usize,
    features: Vec<FeatureSummary>,
}

impl QuantileSketch {
    pub fn new(n_features: usize, max_bin: usize) -> Self {
        Self {
            max_bin,
            features: vec![FeatureSummary::default(); n_features],
        }
    }

    #[inline]
    fn max_entries(&self) -> usize {
        self.max_bin * SKETCH_EPS_FACTOR
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn feature(&self, f: usize) -> &FeatureSummary {
        &self.features[f]
    }

    /// Add a `rows x features` block with its sample weights.
    pub fn push_block(&mut self, block: ArrayView2<'_, f32>, weights: WeightsView<'_>) {
        debug_assert_eq!(block.ncols(), self.features.len());
        let max_entries = self.max_entries();
        self.features
            .par_iter_mut()
            .zip(block.axis_iter(Axis(1)).into_par_iter())
            .for_each(|(summary, column)| {
                let mut merged = summary.merge(&FeatureSummary::from_values(column, weights));
                merged.prune(max_entries);
                *summary = merged;
            });
    }

    /// Fold another sketch into this one.
    pub fn merge(&mut self, other: &QuantileSketch) {
        debug_assert_eq!(self.features.len(), other.features.len());
        let max_entries = self.max_entries();
        self.features
            .par_iter_mut()
            .zip(other.features.par_iter())
            .for_each(|(mine, theirs)| {
                let mut merged = mine.merge(theirs);
                merged.prune(max_entries);
                *mine = merged;
            });
    }

    pub fn into_cuts(self) -> HistogramCuts {
        let per_feature: Vec<Vec<f32>> = self
            .features
            .par_iter()
            .map(|summary| summary.cuts(self.max_bin))
            .collect();
        HistogramCuts::from_feature_cuts(per_feature)
    }
}

// =============================================================================
// HistogramCuts
// =============================================================================

/// Bin boundaries for every feature, stored back to back.
///
/// Feature `f` owns `values[offsets[f]..offsets[f + 1]]`. A value `x` falls in
/// bin `i` when `cuts[i - 1] <= x < cuts[i]`; bin 0 holds everything below
/// `cuts[0]` and NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramCuts {
    values: Vec<f32>,
    offsets: Vec<usize>,
}

impl HistogramCuts {
    pub fn from_feature_cuts(per_feature: Vec<Vec<f32>>) -> Self {
        let mut offsets = Vec::with_capacity(per_feature.len() + 1);
        offsets.push(0);
        let mut values = Vec::new();
        for cuts in per_feature {
            values.extend(cuts);
            offsets.push(values.len());
        }
        Self { values, offsets }
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Global bin offsets, one per feature plus the total at the end.
    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    #[inline]
    pub fn total_bins(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn feature_cuts(&self, f: usize) -> &[f32] {
        &self.values[self.offsets[f]..self.offsets[f + 1]]
    }

    #[inline]
    pub fn n_bins(&self, f: usize) -> usize {
        self.offsets[f + 1] - self.offsets[f]
    }

    /// Local bin of `x` for feature `f`. NaN maps to bin 0; values above the
    /// last cut map to the last bin.
    #[inline]
    pub fn search_bin(&self, f: usize, x: f32) -> usize {
        let cuts = self.feature_cuts(f);
        cuts.partition_point(|&c| c <= x).min(cuts.len() - 1)
    }

    /// Threshold separating bins `..=bin` from the rest.
    #[inline]
    pub fn split_value(&self, f: usize, bin: usize) -> f32 {
        self.feature_cuts(f)[bin]
    }
}
