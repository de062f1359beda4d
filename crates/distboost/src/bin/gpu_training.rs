//! Train a regressor on random data with a local accelerator cluster.
//!
//! Usage:
//!   cargo run --bin gpu_training --release
//!
//! The cluster and the client are dropped in reverse order on every exit
//! path, so both are torn down before an error reaches `main`'s caller.

use distboost::cluster::{Client, LocalCluster};
use distboost::{Error, demo};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let cluster = LocalCluster::accelerated()?;
    let client = Client::connect(&cluster)?;
    demo::run(&client)?;
    Ok(())
}
