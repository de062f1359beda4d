//! Random distributed arrays.
//!
//! Values are uniform in `[0, 1)`. Each block draws its seed when the array is
//! created, so a block produces the same values however often it is
//! materialized, while separate arrays are independent.

use ndarray::{Array, Dimension, Ix1, Ix2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::{Block, BlockTask, DArray, normalize_chunks, tokenize};
use crate::error::Result;

/// Random `(rows, cols)` array chunked into blocks of `chunk` rows.
pub fn random_2d((n_rows, n_cols): (usize, usize), chunk: usize) -> Result<DArray<Ix2>> {
    random_blocks(Ix2(n_rows, n_cols), chunk, move |rows| Ix2(rows, n_cols))
}

/// Random vector of length `len` chunked into blocks of `chunk` elements.
pub fn random_1d(len: usize, chunk: usize) -> Result<DArray<Ix1>> {
    random_blocks(Ix1(len), chunk, Ix1)
}

fn random_blocks<D, S>(dim: D, chunk: usize, block_dim: S) -> Result<DArray<D>>
where
    D: Dimension + 'static,
    S: Fn(usize) -> D,
{
    let chunks = normalize_chunks(dim[0], chunk)?;
    let blocks = chunks
        .iter()
        .map(|&rows| {
            let seed = rand::random::<u64>();
            let shape = block_dim(rows);
            Block::Pending(BlockTask::new(move || {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                Ok(Array::from_shape_simple_fn(shape.clone(), || rng.r#gen::<f32>()))
            }))
        })
        .collect();

    DArray::from_blocks(tokenize("random"), dim, chunks, blocks)
}
