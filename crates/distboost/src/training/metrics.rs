//! Evaluation metrics.
//!
//! Metrics are computed in two steps so they can be evaluated over sharded
//! data: every shard produces a [`MetricPartial`], the partials are summed, and
//! [`MetricFn::finalize`] turns the total into the metric value.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::model::ConfigError;
use crate::training::WeightsView;

// =============================================================================
// MetricPartial
// =============================================================================

/// Additive intermediate of a metric: a weighted sum and its total weight.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricPartial {
    pub sum: f64,
    pub weight: f64,
}

impl MetricPartial {
    #[inline]
    pub fn new(sum: f64, weight: f64) -> Self {
        Self { sum, weight }
    }

    /// `sum / weight`, or 0 when there is no weight.
    #[inline]
    pub fn mean(self) -> f64 {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            0.0
        }
    }
}

impl Add for MetricPartial {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.sum + rhs.sum, self.weight + rhs.weight)
    }
}

impl AddAssign for MetricPartial {
    fn add_assign(&mut self, rhs: Self) {
        self.sum += rhs.sum;
        self.weight += rhs.weight;
    }
}

impl Sum for MetricPartial {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

// =============================================================================
// MetricFn
// =============================================================================

/// An evaluation metric over (prediction, target) pairs.
pub trait MetricFn: Send + Sync {
    /// Short name used in the evaluation history, e.g. `"rmse"`.
    fn name(&self) -> &'static str;

    /// Partial result for one shard of rows.
    ///
    /// # Arguments
    ///
    /// * `predictions` - Raw predictions, one per row
    /// * `targets` - Labels, one per row
    /// * `weights` - Sample weights; each row's loss is scaled by its weight
    fn partial(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> MetricPartial;

    /// Final value from the sum of all partials.
    fn finalize(&self, total: MetricPartial) -> f64 {
        total.mean()
    }

    fn higher_is_better(&self) -> bool {
        false
    }

    /// Convenience: evaluate on a single in-memory shard.
    fn compute(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> f64 {
        self.finalize(self.partial(predictions, targets, weights))
    }
}

#[inline]
fn sum_residuals(
    predictions: &[f32],
    targets: ArrayView1<'_, f32>,
    weights: WeightsView<'_>,
    f: impl Fn(f64) -> f64,
) -> MetricPartial {
    debug_assert_eq!(predictions.len(), targets.len());
    predictions
        .iter()
        .zip(targets.iter())
        .zip(weights.iter(predictions.len()))
        .fold(MetricPartial::default(), |acc, ((&p, &t), w)| {
            let w = w as f64;
            acc + MetricPartial::new(w * f(p as f64 - t as f64), w)
        })
}

// =============================================================================
// Regression metrics
// =============================================================================

/// Root Mean Squared Error: `sqrt(mean((pred - label)^2))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse;

impl MetricFn for Rmse {
    fn name(&self) -> &'static str {
        "rmse"
    }

    fn partial(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> MetricPartial {
        sum_residuals(predictions, targets, weights, |r| r * r)
    }

    fn finalize(&self, total: MetricPartial) -> f64 {
        total.mean().sqrt()
    }
}

/// Mean Absolute Error: `mean(|pred - label|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mae;

impl MetricFn for Mae {
    fn name(&self) -> &'static str {
        "mae"
    }

    fn partial(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> MetricPartial {
        sum_residuals(predictions, targets, weights, f64::abs)
    }
}

/// Mean Pseudo-Huber Error: `mean(slope^2 * (sqrt(1 + (r / slope)^2) - 1))`.
#[derive(Debug, Clone, Copy)]
pub struct Mphe {
    pub slope: f64,
}

impl Default for Mphe {
    fn default() -> Self {
        Self { slope: 1.0 }
    }
}

impl MetricFn for Mphe {
    fn name(&self) -> &'static str {
        "mphe"
    }

    fn partial(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> MetricPartial {
        let slope_sq = self.slope * self.slope;
        sum_residuals(predictions, targets, weights, |r| {
            slope_sq * ((1.0 + r * r / slope_sq).sqrt() - 1.0)
        })
    }
}

// =============================================================================
// Metric enum
// =============================================================================

/// Metric selection for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Rmse,
    Mae,
    /// Pseudo-Huber error with the given slope.
    Mphe { slope: f32 },
}

impl Metric {
    /// Pseudo-Huber error with slope 1.
    pub fn mphe() -> Self {
        Metric::Mphe { slope: 1.0 }
    }
}

impl MetricFn for Metric {
    fn name(&self) -> &'static str {
        match self {
            Metric::Rmse => Rmse.name(),
            Metric::Mae => Mae.name(),
            Metric::Mphe { .. } => Mphe::default().name(),
        }
    }

    fn partial(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> MetricPartial {
        match self {
            Metric::Rmse => Rmse.partial(predictions, targets, weights),
            Metric::Mae => Mae.partial(predictions, targets, weights),
            Metric::Mphe { slope } => Mphe {
                slope: *slope as f64,
            }
            .partial(predictions, targets, weights),
        }
    }

    fn finalize(&self, total: MetricPartial) -> f64 {
        match self {
            Metric::Rmse => Rmse.finalize(total),
            Metric::Mae => Mae.finalize(total),
            Metric::Mphe { .. } => total.mean(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rmse" => Ok(Metric::Rmse),
            "mae" => Ok(Metric::Mae),
            "mphe" => Ok(Metric::mphe()),
            _ => Err(ConfigError::InvalidValue {
                key: "eval_metric".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
