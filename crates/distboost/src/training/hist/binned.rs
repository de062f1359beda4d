//! Quantized feature blocks.

use ndarray::{Array2, ArrayView2, Axis, Zip};

use super::HistogramCuts;

/// Largest `max_bin` a [`BinnedBlock`] can hold.
pub const MAX_BINS: usize = u8::MAX as usize + 1;

/// Row-major matrix of per-feature local bin indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinnedBlock {
    bins: Array2<u8>,
}

impl BinnedBlock {
    /// Quantize a `rows x features` block.
    pub fn from_features(features: ArrayView2<'_, f32>, cuts: &HistogramCuts) -> Self {
        debug_assert_eq!(features.ncols(), cuts.n_features());
        let mut bins = Array2::<u8>::zeros(features.raw_dim());
        Zip::from(bins.axis_iter_mut(Axis(0)))
            .and(features.axis_iter(Axis(0)))
            .par_for_each(|mut out, row| {
                for (f, (bin, &x)) in out.iter_mut().zip(row.iter()).enumerate() {
                    *bin = cuts.search_bin(f, x) as u8;
                }
            });
        Self { bins }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.bins.nrows()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.bins.ncols()
    }

    #[inline]
    pub fn bin(&self, row: usize, feature: usize) -> u8 {
        self.bins[[row, feature]]
    }

    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.bins.view()
    }
}
