//! Gradient histograms.
//!
//! Bins are plain `(sum_grad, sum_hess)` tuples in `f64`. Histograms for all
//! features of a node live in one flat buffer indexed by global bin
//! (`offsets[feature] + local_bin`).

use std::ops::{AddAssign, Range};

use ndarray::ArrayView2;

use crate::training::{GradStats, GradsTuple};

/// `(sum_grad, sum_hess)` for one bin.
pub type HistogramBin = (f64, f64);

/// Histogram of one tree node over every feature.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistogram {
    bins: Vec<HistogramBin>,
}

impl NodeHistogram {
    pub fn zeros(total_bins: usize) -> Self {
        Self {
            bins: vec![(0.0, 0.0); total_bins],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[HistogramBin] {
        &self.bins
    }

    /// Bins of one feature.
    #[inline]
    pub fn feature(&self, range: Range<usize>) -> &[HistogramBin] {
        &self.bins[range]
    }

    /// Sibling histogram: `parent - child`.
    pub fn subtract(parent: &Self, child: &Self) -> Self {
        debug_assert_eq!(parent.len(), child.len());
        let bins = parent
            .bins
            .iter()
            .zip(&child.bins)
            .map(|(&(pg, ph), &(cg, ch))| (pg - cg, ph - ch))
            .collect();
        Self { bins }
    }

    /// Sum over the bins in `range`.
    pub fn stats(&self, range: Range<usize>) -> GradStats {
        self.bins[range]
            .iter()
            .map(|&(g, h)| GradStats::new(g, h))
            .sum()
    }

    /// Add the rows of one block whose slot is `Some`.
    ///
    /// # Arguments
    ///
    /// * `hists` - One histogram per slot
    /// * `slots` - Slot of each row, `None` to skip the row
    /// * `bins` - Local bin indices, `rows x features`
    /// * `grad_hess` - Gradient pair of each row
    /// * `offsets` - Global bin offset of each feature
    pub fn accumulate_block(
        hists: &mut [NodeHistogram],
        slots: impl Iterator<Item = Option<usize>>,
        bins: ArrayView2<'_, u8>,
        grad_hess: &[GradsTuple],
        offsets: &[usize],
    ) {
        for ((slot, row), gh) in slots.zip(bins.rows()).zip(grad_hess) {
            let Some(slot) = slot else { continue };
            let hist = &mut hists[slot].bins;
            let (g, h) = (gh.grad as f64, gh.hess as f64);
            for (&bin, &offset) in row.iter().zip(offsets) {
                let entry = &mut hist[offset + bin as usize];
                entry.0 += g;
                entry.1 += h;
            }
        }
    }
}

impl AddAssign<&NodeHistogram> for NodeHistogram {
    fn add_assign(&mut self, rhs: &NodeHistogram) {
        debug_assert_eq!(self.len(), rhs.len());
        for (a, b) in self.bins.iter_mut().zip(&rhs.bins) {
            a.0 += b.0;
            a.1 += b.1;
        }
    }
}
