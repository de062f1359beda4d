//! Property-based tests for quantile cuts and binning.

use ndarray::Array2;
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use distboost::training::WeightsView;
use distboost::training::hist::{BinnedBlock, QuantileSketch};

/// Strategy for feature values: finite, with occasional missing values.
fn arb_value() -> impl Strategy<Value = f32> {
    prop_oneof![
        9 => (-1e4f32..1e4f32),
        1 => Just(f32::NAN),
    ]
}

fn column(values: &[f32]) -> Array2<f32> {
    Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap()
}

proptest! {
    #[test]
    fn cuts_are_strictly_increasing(
        values in prop_vec(arb_value(), 1..400),
        max_bin in 2usize..=256,
    ) {
        let mut sketch = QuantileSketch::new(1, max_bin);
        sketch.push_block(column(&values).view(), WeightsView::None);
        let cuts = sketch.into_cuts();

        let feature = cuts.feature_cuts(0);
        prop_assert!(!feature.is_empty());
        prop_assert!(feature.len() <= max_bin);
        prop_assert!(feature.windows(2).all(|w| w[0] < w[1]));

        let max = values.iter().copied().filter(|v| !v.is_nan()).fold(f32::NEG_INFINITY, f32::max);
        if max.is_finite() {
            prop_assert!(*feature.last().unwrap() > max);
        }
    }

    #[test]
    fn bins_respect_cut_boundaries(values in prop_vec(arb_value(), 1..300)) {
        let mut sketch = QuantileSketch::new(1, 32);
        sketch.push_block(column(&values).view(), WeightsView::None);
        let cuts = sketch.into_cuts();
        let binned = BinnedBlock::from_features(column(&values).view(), &cuts);
        let feature = cuts.feature_cuts(0);

        for (row, &x) in values.iter().enumerate() {
            let bin = binned.bin(row, 0) as usize;
            prop_assert!(bin < feature.len());
            prop_assert_eq!(bin, cuts.search_bin(0, x));
            if x.is_nan() {
                prop_assert_eq!(bin, 0);
            } else {
                // Split at `bin - 1` sends x right; split at `bin` sends it left.
                prop_assert!(x < feature[bin]);
                if bin > 0 {
                    prop_assert!(x >= feature[bin - 1]);
                }
            }
        }
    }

    #[test]
    fn merging_shards_matches_single_sketch(
        values in prop_vec(-100f32..100f32, 2..200),
        split in 1usize..199,
    ) {
        let split = split.min(values.len() - 1);
        let mut whole = QuantileSketch::new(1, 256);
        whole.push_block(column(&values).view(), WeightsView::None);

        let mut left = QuantileSketch::new(1, 256);
        left.push_block(column(&values[..split]).view(), WeightsView::None);
        let mut right = QuantileSketch::new(1, 256);
        right.push_block(column(&values[split..]).view(), WeightsView::None);
        left.merge(&right);

        prop_assert_eq!(left.into_cuts(), whole.into_cuts());
    }
}
