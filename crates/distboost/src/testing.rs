//! Deterministic data and small clusters for tests and benches.

use ndarray::{Array1, Array2};
use rand::prelude::*;

use crate::array::{DArray, DArray1, DArray2};
use crate::cluster::{Client, ClusterConfig, LocalCluster};
use crate::error::Result;

/// Random features uniform in `[0, 1)`, reproducible from `seed`.
pub fn random_features(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((rows, cols), || rng.r#gen::<f32>())
}

/// Small fixed feature matrix.
pub fn small_features(rows: usize, cols: usize) -> Array2<f32> {
    random_features(rows, cols, 42)
}

/// `y = sum_j (j + 1) * x_j`, no noise.
pub fn linear_target(features: &Array2<f32>) -> Array1<f32> {
    let weights = Array1::from_shape_fn(features.ncols(), |j| (j + 1) as f32);
    features.dot(&weights)
}

/// Linear regression problem as aligned distributed arrays.
///
/// Returns `(x, y)` chunked into blocks of `chunk` rows.
pub fn synthetic_regression(
    rows: usize,
    cols: usize,
    chunk: usize,
    seed: u64,
) -> Result<(DArray2, DArray1)> {
    let features = random_features(rows, cols, seed);
    let targets = linear_target(&features);
    Ok((
        DArray::from_array(features, chunk)?,
        DArray::from_array(targets, chunk)?,
    ))
}

/// Accelerator-bound cluster with one worker per ordinal `0..n_workers`, and
/// a client connected to it.
pub fn accelerated_client(n_workers: usize) -> Result<(LocalCluster, Client)> {
    let config = ClusterConfig::builder()
        .device_ordinals((0..n_workers as u32).collect())
        .threads_per_worker(1)
        .name("test")
        .build()?;
    let cluster = LocalCluster::new(config)?;
    let client = Client::connect(&cluster)?;
    Ok((cluster, client))
}
