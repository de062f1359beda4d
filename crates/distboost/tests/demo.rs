//! End-to-end runs of the demo on small data.

use distboost::cluster::{Client, LocalCluster};
use distboost::testing::accelerated_client;
use distboost::{Error, demo};

#[test]
fn demo_trains_on_accelerated_cluster() {
    let (cluster, client) = accelerated_client(2).unwrap();
    let booster = demo::run_with(&client, 500, 5, 100).unwrap();

    assert_eq!(booster.num_features(), 5);
    assert_eq!(booster.num_boosted_rounds(), 100);
    assert_eq!(booster.best_iteration(), None);
    assert!(cluster.is_running());
}

#[test]
fn failed_fit_still_tears_down_cluster_and_client() {
    let watch;
    let result = {
        // CPU-only workers cannot satisfy a `cuda` regressor.
        let cluster = LocalCluster::cpu(2).unwrap();
        let client = Client::connect(&cluster).unwrap();
        watch = client.watch();
        assert!(watch.is_cluster_running());
        assert!(watch.is_client_open());
        demo::run_with(&client, 200, 4, 50)
    };

    assert!(matches!(
        result,
        Err(Error::DeviceUnavailable { worker: 0, .. })
    ));
    assert!(!watch.is_cluster_running());
    assert!(!watch.is_client_open());
}

#[test]
fn closed_client_fails_without_training() {
    let (cluster, client) = accelerated_client(1).unwrap();
    client.close();
    assert!(matches!(
        demo::run_with(&client, 100, 2, 10),
        Err(Error::ClientClosed)
    ));
    assert!(cluster.is_running());
}

#[test]
fn closed_cluster_fails_without_training() {
    let (cluster, client) = accelerated_client(1).unwrap();
    cluster.close();
    assert!(matches!(
        demo::run_with(&client, 100, 2, 10),
        Err(Error::ClusterClosed)
    ));
}
