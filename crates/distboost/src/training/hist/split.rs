//! Split gain and best-split search.

use rayon::prelude::*;

use super::{HistogramCuts, NodeHistogram};
use crate::training::GradStats;

// =============================================================================
// GainParams
// =============================================================================

/// Regularization parameters for gain and leaf weight computation.
#[derive(Debug, Clone, PartialEq)]
pub struct GainParams {
    /// L2 regularization on leaf weights (lambda).
    pub reg_lambda: f32,
    /// L1 regularization on leaf weights (alpha).
    pub reg_alpha: f32,
    /// Minimum gain required to keep a split (gamma).
    pub min_gain: f32,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            min_gain: 0.0,
            min_child_weight: 1.0,
        }
    }
}

impl GainParams {
    /// L1 soft-thresholding of a gradient sum.
    #[inline]
    fn threshold_l1(&self, sum_grad: f64) -> f64 {
        let alpha = self.reg_alpha as f64;
        if sum_grad > alpha {
            sum_grad - alpha
        } else if sum_grad < -alpha {
            sum_grad + alpha
        } else {
            0.0
        }
    }

    /// Structure score of a node: `T(G)^2 / (H + lambda)`.
    #[inline]
    pub fn score(&self, stats: GradStats) -> f64 {
        let g = self.threshold_l1(stats.sum_grad);
        g * g / (stats.sum_hess + self.reg_lambda as f64)
    }

    /// Gain of splitting `parent` into `left` and `right`:
    /// `0.5 * (score(L) + score(R) - score(P)) - gamma`.
    #[inline]
    pub fn compute_gain(&self, left: GradStats, right: GradStats, parent: GradStats) -> f64 {
        0.5 * (self.score(left) + self.score(right) - self.score(parent)) - self.min_gain as f64
    }

    /// Optimal leaf weight: `-T(G) / (H + lambda)`.
    #[inline]
    pub fn compute_leaf_weight(&self, stats: GradStats) -> f64 {
        let denom = stats.sum_hess + self.reg_lambda as f64;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.threshold_l1(stats.sum_grad) / denom
    }

    #[inline]
    fn children_heavy_enough(&self, left: GradStats, right: GradStats) -> bool {
        let min = self.min_child_weight as f64;
        left.sum_hess >= min && right.sum_hess >= min
    }
}

// =============================================================================
// SplitCandidate
// =============================================================================

/// Best split found for a node.
///
/// Rows whose bin for `feature` is `<= bin` (raw value `< threshold`, or NaN)
/// go left.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCandidate {
    pub feature: usize,
    pub bin: usize,
    pub threshold: f32,
    pub gain: f64,
    pub left: GradStats,
    pub right: GradStats,
}

/// Best split of a node over all features, or `None` if no split has
/// positive gain.
///
/// Ties go to the lower feature index, then the lower bin.
pub fn find_best_split(
    hist: &NodeHistogram,
    cuts: &HistogramCuts,
    parent: GradStats,
    params: &GainParams,
) -> Option<SplitCandidate> {
    let offsets = cuts.offsets();
    (0..cuts.n_features())
        .into_par_iter()
        .filter_map(|feature| {
            let bins = hist.feature(offsets[feature]..offsets[feature + 1]);
            best_split_for_feature(feature, bins, cuts, parent, params)
        })
        .reduce_with(|a, b| {
            if b.gain > a.gain || (b.gain == a.gain && b.feature < a.feature) {
                b
            } else {
                a
            }
        })
}

fn best_split_for_feature(
    feature: usize,
    bins: &[(f64, f64)],
    cuts: &HistogramCuts,
    parent: GradStats,
    params: &GainParams,
) -> Option<SplitCandidate> {
    if bins.len() < 2 {
        return None;
    }

    let mut best: Option<SplitCandidate> = None;
    let mut left = GradStats::default();
    for (bin, &(g, h)) in bins.iter().enumerate().take(bins.len() - 1) {
        left += GradStats::new(g, h);
        let right = parent - left;
        if !params.children_heavy_enough(left, right) {
            continue;
        }
        let gain = params.compute_gain(left, right, parent);
        if gain > 0.0 && best.as_ref().is_none_or(|b| gain > b.gain) {
            best = Some(SplitCandidate {
                feature,
                bin,
                threshold: cuts.split_value(feature, bin),
                gain,
                left,
                right,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::GradsTuple;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn gain_formula() {
        let params = GainParams::default();
        let left = GradStats::new(-4.0, 3.0);
        let right = GradStats::new(4.0, 3.0);
        let parent = left + right;
        // 0.5 * (16/4 + 16/4 - 0/7)
        assert_relative_eq!(params.compute_gain(left, right, parent), 4.0);
    }

    #[test]
    fn gamma_reduces_gain() {
        let params = GainParams {
            min_gain: 1.5,
            ..Default::default()
        };
        let left = GradStats::new(-4.0, 3.0);
        let right = GradStats::new(4.0, 3.0);
        assert_relative_eq!(params.compute_gain(left, right, left + right), 2.5);
    }

    #[test]
    fn leaf_weight_with_l1() {
        let params = GainParams {
            reg_alpha: 1.0,
            ..Default::default()
        };
        // -(5 - 1) / (3 + 1)
        assert_relative_eq!(params.compute_leaf_weight(GradStats::new(5.0, 3.0)), -1.0);
        assert_eq!(params.compute_leaf_weight(GradStats::new(0.5, 3.0)), 0.0);
    }

    fn histogram_for(bins: ndarray::Array2<u8>, grads: &[f32], offsets: &[usize]) -> NodeHistogram {
        let gh: Vec<_> = grads.iter().map(|&g| GradsTuple::new(g, 1.0)).collect();
        let mut hists = vec![NodeHistogram::zeros(*offsets.last().unwrap())];
        NodeHistogram::accumulate_block(
            &mut hists,
            std::iter::repeat(Some(0)),
            bins.view(),
            &gh,
            offsets,
        );
        hists.pop().unwrap()
    }

    #[test]
    fn finds_separating_split() {
        // Feature 0 separates negative from positive gradients, feature 1 is noise.
        let cuts = HistogramCuts::from_feature_cuts(vec![vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 2.0]]);
        let bins = array![[0u8, 0], [1, 1], [2, 0], [3, 1]];
        let hist = histogram_for(bins, &[-1.0, -1.0, 1.0, 1.0], cuts.offsets());
        let parent = GradStats::new(0.0, 4.0);
        let params = GainParams {
            min_child_weight: 0.0,
            ..Default::default()
        };

        let split = find_best_split(&hist, &cuts, parent, &params).unwrap();
        assert_eq!(split.feature, 0);
        assert_eq!(split.bin, 1);
        assert_eq!(split.threshold, 2.0);
        assert_eq!(split.left, GradStats::new(-2.0, 2.0));
        assert_eq!(split.right, GradStats::new(2.0, 2.0));
    }

    #[test]
    fn ties_prefer_lower_feature() {
        let cuts = HistogramCuts::from_feature_cuts(vec![vec![1.0, 2.0], vec![1.0, 2.0]]);
        let bins = array![[0u8, 0], [1, 1]];
        let hist = histogram_for(bins, &[-1.0, 1.0], cuts.offsets());
        let params = GainParams {
            min_child_weight: 0.0,
            ..Default::default()
        };

        let split = find_best_split(&hist, &cuts, GradStats::new(0.0, 2.0), &params).unwrap();
        assert_eq!(split.feature, 0);
    }

    #[test]
    fn min_child_weight_blocks_split() {
        let cuts = HistogramCuts::from_feature_cuts(vec![vec![1.0, 2.0]]);
        let hist = histogram_for(array![[0u8], [1]], &[-1.0, 1.0], cuts.offsets());
        let params = GainParams {
            min_child_weight: 2.0,
            ..Default::default()
        };
        assert!(find_best_split(&hist, &cuts, GradStats::new(0.0, 2.0), &params).is_none());
    }

    #[test]
    fn constant_gradients_do_not_split() {
        let cuts = HistogramCuts::from_feature_cuts(vec![vec![1.0, 2.0]]);
        let hist = histogram_for(array![[0u8], [1]], &[0.0, 0.0], cuts.offsets());
        let params = GainParams {
            min_child_weight: 0.0,
            ..Default::default()
        };
        assert!(find_best_split(&hist, &cuts, GradStats::new(0.0, 2.0), &params).is_none());
    }
}
