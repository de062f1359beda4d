//! Regressor demo: random data, accelerator-targeted hist training, lazy
//! distributed predictions.

use crate::array::{DArray1, random_1d, random_2d};
use crate::cluster::Client;
use crate::error::Result;
use crate::model::{Booster, DistributedRegressor, RegressorConfig};
use crate::training::Verbosity;

/// Rows of generated data.
pub const N_ROWS: usize = 1_000_000;
/// Features of generated data.
pub const N_FEATURES: usize = 100;
/// Rows per block.
pub const PARTITION_SIZE: usize = 10_000;

/// Run the demo on `client` and return the trained booster.
///
/// Generates a `1_000_000 x 100` uniform random feature matrix and target
/// vector in blocks of 10,000 rows, fits a histogram regressor on the
/// accelerator with the training pair as its only eval set, checks that
/// predictions come back partitioned like the features and prints the
/// evaluation history.
pub fn run(client: &Client) -> Result<Booster> {
    run_with(client, N_ROWS, N_FEATURES, PARTITION_SIZE)
}

/// [`run`] with a custom data size.
pub fn run_with(client: &Client, n_rows: usize, n_features: usize, chunk: usize) -> Result<Booster> {
    let x = random_2d((n_rows, n_features), chunk)?;
    let y = random_1d(n_rows, chunk)?;

    let config = RegressorConfig::builder()
        .verbosity(Verbosity::Info)
        .build()?;
    let mut regressor = DistributedRegressor::new(config);
    regressor.set_params([("tree_method", "hist"), ("device", "cuda")])?;
    regressor.set_client(client.clone());

    regressor.fit(&x, &y, &[(&x, &y)])?;
    let prediction: DArray1 = regressor.predict(&x)?;
    // Predictions are a lazy array partitioned like the input.
    prediction.ensure_aligned(&x)?;

    let booster = regressor.get_booster()?;
    let history = regressor.evals_result()?;
    println!("Evaluation history: {history}");
    Ok(booster)
}
