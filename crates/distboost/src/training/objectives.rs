//! Regression objectives.
//!
//! Objectives turn predictions and targets into per-row gradient pairs and
//! provide the optimal constant prediction used as the base score. The base
//! score is computed from per-shard partial sums so it can be reduced across
//! workers.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::model::ConfigError;
use crate::training::{GradsTuple, Metric, MetricPartial, WeightsView};

// =============================================================================
// ObjectiveFn
// =============================================================================

/// A twice-differentiable loss.
pub trait ObjectiveFn: Send + Sync {
    /// Name as accepted by the `objective` parameter.
    fn name(&self) -> &'static str;

    /// Write `(grad, hess)` for every row.
    ///
    /// # Arguments
    ///
    /// * `predictions` - Current raw predictions, one per row
    /// * `targets` - Labels, one per row
    /// * `weights` - Sample weights; gradients and hessians are scaled by them
    /// * `grad_hess` - Output buffer, same length as `predictions`
    fn compute_gradients_into(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
        grad_hess: &mut [GradsTuple],
    );

    /// Weighted partial sums over one shard's targets.
    fn base_score_partial(
        &self,
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
    ) -> MetricPartial {
        targets
            .iter()
            .zip(weights.iter(targets.len()))
            .fold(MetricPartial::default(), |acc, (&t, w)| {
                acc + MetricPartial::new(w as f64 * t as f64, w as f64)
            })
    }

    /// Base score from the total of all partials. Defaults to the mean.
    fn base_score(&self, total: MetricPartial) -> f32 {
        total.mean() as f32
    }

    /// Metric reported when none is configured.
    fn default_metric(&self) -> Metric;
}

// =============================================================================
// SquaredLoss
// =============================================================================

/// Squared error: `0.5 * (pred - label)^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl ObjectiveFn for SquaredLoss {
    fn name(&self) -> &'static str {
        "reg:squarederror"
    }

    fn compute_gradients_into(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
        grad_hess: &mut [GradsTuple],
    ) {
        debug_assert_eq!(predictions.len(), targets.len());
        let rows = predictions.iter().zip(targets.iter());
        for ((gh, (&pred, &target)), w) in grad_hess
            .iter_mut()
            .zip(rows)
            .zip(weights.iter(predictions.len()))
        {
            gh.grad = w * (pred - target);
            gh.hess = w;
        }
    }

    fn default_metric(&self) -> Metric {
        Metric::Rmse
    }
}

// =============================================================================
// PseudoHuberLoss
// =============================================================================

/// Pseudo-Huber loss: `slope^2 * (sqrt(1 + (r / slope)^2) - 1)`.
///
/// Quadratic near zero, linear for large residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoHuberLoss {
    pub slope: f32,
}

impl PseudoHuberLoss {
    pub fn new(slope: f32) -> Self {
        debug_assert!(slope > 0.0);
        Self { slope }
    }
}

impl Default for PseudoHuberLoss {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ObjectiveFn for PseudoHuberLoss {
    fn name(&self) -> &'static str {
        "reg:pseudohubererror"
    }

    fn compute_gradients_into(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
        grad_hess: &mut [GradsTuple],
    ) {
        let inv_slope_sq = 1.0 / (self.slope * self.slope);
        let rows = predictions.iter().zip(targets.iter());
        for ((gh, (&pred, &target)), w) in grad_hess
            .iter_mut()
            .zip(rows)
            .zip(weights.iter(predictions.len()))
        {
            let residual = pred - target;
            let factor = 1.0 + residual * residual * inv_slope_sq;
            let sqrt_factor = factor.sqrt();
            gh.grad = w * residual / sqrt_factor;
            gh.hess = w / (factor * sqrt_factor);
        }
    }

    fn default_metric(&self) -> Metric {
        Metric::Mphe { slope: self.slope }
    }
}

// =============================================================================
// Objective enum
// =============================================================================

/// Objective selection for configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// `reg:squarederror`
    #[default]
    SquaredError,
    /// `reg:pseudohubererror`
    PseudoHuberError { slope: f32 },
}

impl Objective {
    /// Pseudo-Huber with slope 1.
    pub fn pseudo_huber() -> Self {
        Objective::PseudoHuberError { slope: 1.0 }
    }
}

impl ObjectiveFn for Objective {
    fn name(&self) -> &'static str {
        match self {
            Objective::SquaredError => SquaredLoss.name(),
            Objective::PseudoHuberError { slope } => PseudoHuberLoss::new(*slope).name(),
        }
    }

    fn compute_gradients_into(
        &self,
        predictions: &[f32],
        targets: ArrayView1<'_, f32>,
        weights: WeightsView<'_>,
        grad_hess: &mut [GradsTuple],
    ) {
        match self {
            Objective::SquaredError => {
                SquaredLoss.compute_gradients_into(predictions, targets, weights, grad_hess)
            }
            Objective::PseudoHuberError { slope } => PseudoHuberLoss::new(*slope)
                .compute_gradients_into(predictions, targets, weights, grad_hess),
        }
    }

    fn default_metric(&self) -> Metric {
        match self {
            Objective::SquaredError => SquaredLoss.default_metric(),
            Objective::PseudoHuberError { slope } => PseudoHuberLoss::new(*slope).default_metric(),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reg:squarederror" => Ok(Objective::SquaredError),
            "reg:pseudohubererror" => Ok(Objective::pseudo_huber()),
            _ => Err(ConfigError::InvalidValue {
                key: "objective".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, aview1};

    fn grads(obj: &impl ObjectiveFn, preds: &[f32], targets: &[f32]) -> Vec<GradsTuple> {
        let mut out = vec![GradsTuple::default(); preds.len()];
        obj.compute_gradients_into(preds, aview1(targets), WeightsView::None, &mut out);
        out
    }

    #[test]
    fn squared_loss_gradients() {
        let gh = grads(&SquaredLoss, &[1.0, 0.0], &[0.5, 2.0]);
        assert_eq!(gh[0], GradsTuple::new(0.5, 1.0));
        assert_eq!(gh[1], GradsTuple::new(-2.0, 1.0));
    }

    #[test]
    fn weights_scale_gradients_and_hessians() {
        let weights = Array1::from(vec![2.0f32, 0.5]);
        let mut out = vec![GradsTuple::default(); 2];
        SquaredLoss.compute_gradients_into(
            &[1.0, 0.0],
            aview1(&[0.5, 2.0]),
            WeightsView::Some(weights.view()),
            &mut out,
        );
        assert_eq!(out[0], GradsTuple::new(1.0, 2.0));
        assert_eq!(out[1], GradsTuple::new(-1.0, 0.5));

        let unweighted = grads(&PseudoHuberLoss::new(2.0), &[3.0], &[0.0]);
        let mut weighted = vec![GradsTuple::default(); 1];
        PseudoHuberLoss::new(2.0).compute_gradients_into(
            &[3.0],
            aview1(&[0.0]),
            WeightsView::Some(aview1(&[4.0])),
            &mut weighted,
        );
        assert_relative_eq!(weighted[0].grad, 4.0 * unweighted[0].grad);
        assert_relative_eq!(weighted[0].hess, 4.0 * unweighted[0].hess);
    }

    #[test]
    fn pseudo_huber_near_zero_is_quadratic() {
        let gh = grads(&PseudoHuberLoss::new(1.0), &[0.01], &[0.0]);
        assert_relative_eq!(gh[0].grad, 0.01, epsilon = 1e-3);
        assert_relative_eq!(gh[0].hess, 1.0, epsilon = 1e-2);
    }

    #[test]
    fn pseudo_huber_large_residual_is_linear() {
        let gh = grads(&PseudoHuberLoss::new(1.0), &[100.0], &[0.0]);
        assert_relative_eq!(gh[0].grad, 1.0, epsilon = 1e-3);
        assert!(gh[0].hess < 1e-5);
    }

    #[test]
    fn base_score_is_mean_of_partials() {
        let obj = SquaredLoss;
        let total = obj.base_score_partial(aview1(&[1.0, 2.0]), WeightsView::None)
            + obj.base_score_partial(aview1(&[3.0, 6.0]), WeightsView::None);
        assert_relative_eq!(obj.base_score(total), 3.0);
        assert_eq!(obj.base_score(MetricPartial::default()), 0.0);
    }

    #[test]
    fn base_score_is_weighted_mean() {
        let obj = SquaredLoss;
        let total = obj.base_score_partial(
            aview1(&[1.0, 4.0]),
            WeightsView::Some(aview1(&[3.0, 1.0])),
        );
        // (3 * 1 + 1 * 4) / 4
        assert_relative_eq!(obj.base_score(total), 1.75);
    }

    #[test]
    fn objective_names_parse() {
        assert_eq!(
            "reg:squarederror".parse::<Objective>().unwrap(),
            Objective::SquaredError
        );
        assert_eq!(
            "reg:pseudohubererror".parse::<Objective>().unwrap(),
            Objective::pseudo_huber()
        );
        assert!("binary:logistic".parse::<Objective>().is_err());
        assert_eq!(Objective::SquaredError.default_metric(), Metric::Rmse);
        assert_eq!(Objective::pseudo_huber().default_metric(), Metric::mphe());
    }

    #[test]
    fn pseudo_huber_metric_follows_objective_slope() {
        let objective = Objective::PseudoHuberError { slope: 10.0 };
        assert_eq!(objective.default_metric(), Metric::Mphe { slope: 10.0 });
    }
}
