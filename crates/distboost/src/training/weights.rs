//! Optional per-row sample weights.

use ndarray::ArrayView1;

/// Sample weights of a block of rows.
///
/// `None` means every row has weight 1.0.
#[derive(Clone, Copy, Debug, Default)]
pub enum WeightsView<'a> {
    #[default]
    None,
    Some(ArrayView1<'a, f32>),
}

impl<'a> WeightsView<'a> {
    #[inline]
    pub fn from_optional(weights: Option<ArrayView1<'a, f32>>) -> Self {
        match weights {
            Some(w) => WeightsView::Some(w),
            None => WeightsView::None,
        }
    }

    /// Iterate over the weights of `n_rows` rows.
    #[inline]
    pub fn iter(self, n_rows: usize) -> WeightsIter<'a> {
        match self {
            WeightsView::None => WeightsIter::Uniform { remaining: n_rows },
            WeightsView::Some(w) => {
                debug_assert_eq!(w.len(), n_rows, "weights length mismatch");
                WeightsIter::Weighted { view: w, idx: 0 }
            }
        }
    }
}

/// Iterator over [`WeightsView`] values.
#[derive(Clone, Debug)]
pub enum WeightsIter<'a> {
    Uniform { remaining: usize },
    Weighted { view: ArrayView1<'a, f32>, idx: usize },
}

impl Iterator for WeightsIter<'_> {
    type Item = f32;

    #[inline]
    fn next(&mut self) -> Option<f32> {
        match self {
            WeightsIter::Uniform { remaining } => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Some(1.0)
                } else {
                    None
                }
            }
            WeightsIter::Weighted { view, idx } => {
                let w = view.get(*idx).copied();
                *idx += 1;
                w
            }
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = match self {
            WeightsIter::Uniform { remaining } => *remaining,
            WeightsIter::Weighted { view, idx } => view.len().saturating_sub(*idx),
        };
        (len, Some(len))
    }
}

impl ExactSizeIterator for WeightsIter<'_> {}
