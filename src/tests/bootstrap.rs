use crate::{
    Result,
    tests::{ReplicaRecord, TestCluster, TopologyView, log_try_init, test_config, uri},
    topology::NodePools,
};
use futures_util::future::join_all;
use serial_test::serial;
use std::sync::atomic::Ordering;

const SENTINELS: &[(&str, u16)] = &[("10.0.1.1", 26379), ("10.0.1.2", 26379)];

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn discovers_initial_topology() -> Result<()> {
    log_try_init();

    let view = TopologyView::new(("10.0.0.1", 6379), SENTINELS)
        .with_replica(ReplicaRecord::up("10.0.0.3", 6379, ("10.0.0.1", 6379)));
    let cluster = TestCluster::new(view);

    let manager = cluster.bootstrap(test_config(SENTINELS)).await?;

    assert_eq!(Some(uri("10.0.0.1", 6379)), manager.master());
    assert_eq!(Some(uri("10.0.0.1", 6379)), cluster.pools.current_master());
    assert_eq!(vec![uri("10.0.0.3", 6379)], cluster.pools.added());

    let mut sentinels = manager.sentinels();
    sentinels.sort_by_key(|uri| uri.to_string());
    assert_eq!(
        vec![uri("10.0.1.1", 26379), uri("10.0.1.2", 26379)],
        sentinels
    );

    assert!(manager.disconnected_replicas().is_empty());

    // auth probe, seeding and one PING-verified connection per Sentinel
    assert!(cluster.state.connects.load(Ordering::Relaxed) >= 3);

    manager.shutdown().await;

    Ok(())
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn fails_when_no_seed_is_reachable() {
    log_try_init();

    let cluster = TestCluster::new(TopologyView::new(("10.0.0.1", 6379), SENTINELS));
    cluster.state.set_unreachable("10.0.1.1", 26379);
    cluster.state.set_unreachable("10.0.1.2", 26379);

    let result = cluster.bootstrap(test_config(SENTINELS)).await;

    let error = result.err().expect("bootstrap must fail");
    assert!(error.to_string().contains("Unable to connect"));
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn fails_when_master_is_unknown() {
    log_try_init();

    let mut view = TopologyView::new(("10.0.0.1", 6379), SENTINELS);
    view.master = None;
    let cluster = TestCluster::new(view);

    let result = cluster.bootstrap(test_config(SENTINELS)).await;

    let error = result.err().expect("bootstrap must fail");
    assert!(error.to_string().contains("Can't connect to servers"));
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn strict_sentinels_list_requires_two_sentinels() {
    log_try_init();

    let seeds = &[("10.0.1.1", 26379)][..];
    // the polled Sentinel does not know any other Sentinel
    let cluster = TestCluster::new(TopologyView::new(("10.0.0.1", 6379), &[]));

    let result = cluster.bootstrap(test_config(seeds)).await;

    let error = result.err().expect("bootstrap must fail");
    assert!(error.to_string().contains("check_sentinels_list"));
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn single_sentinel_accepted_without_strict_check() -> Result<()> {
    log_try_init();

    let seeds = &[("10.0.1.1", 26379)][..];
    let cluster = TestCluster::new(TopologyView::new(("10.0.0.1", 6379), &[]));

    let mut config = test_config(seeds);
    config.check_sentinels_list = false;

    let manager = cluster.bootstrap(config).await?;

    assert_eq!(vec![uri("10.0.1.1", 26379)], manager.sentinels());

    manager.shutdown().await;

    Ok(())
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn auth_probe_latches_password() -> Result<()> {
    log_try_init();

    let cluster = TestCluster::new(TopologyView::new(("10.0.0.1", 6379), SENTINELS));
    cluster.state.auth_required.store(true, Ordering::Relaxed);

    let mut config = test_config(SENTINELS);
    config.sentinel_password = Some("pwd".to_owned());

    let manager = cluster.bootstrap(config).await?;

    assert!(manager.shared().use_password());
    assert_eq!(2, manager.sentinels().len());

    manager.shutdown().await;

    Ok(())
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn auth_required_without_password_is_fatal() {
    log_try_init();

    let cluster = TestCluster::new(TopologyView::new(("10.0.0.1", 6379), SENTINELS));
    cluster.state.auth_required.store(true, Ordering::Relaxed);

    let result = cluster.bootstrap(test_config(SENTINELS)).await;

    let error = result.err().expect("bootstrap must fail");
    assert!(error.to_string().contains("requires authentication"));
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn down_replicas_are_surfaced() -> Result<()> {
    log_try_init();

    let view = TopologyView::new(("10.0.0.1", 6379), SENTINELS)
        .with_replica(ReplicaRecord::up("10.0.0.3", 6379, ("10.0.0.1", 6379)))
        .with_replica(ReplicaRecord::up("10.0.0.4", 6379, ("10.0.0.1", 6379)).down());
    let cluster = TestCluster::new(view);

    let manager = cluster.bootstrap(test_config(SENTINELS)).await?;

    let disconnected = manager.disconnected_replicas();
    assert_eq!(1, disconnected.len());
    assert!(disconnected.contains(&uri("10.0.0.4", 6379)));

    // both replicas are handed to the pools; the down one stays frozen
    assert!(cluster.pools.has_replica(&uri("10.0.0.3", 6379)));
    assert!(cluster.pools.has_replica(&uri("10.0.0.4", 6379)));

    manager.shutdown().await;

    Ok(())
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn skip_replicas_init_suppresses_replica_seeding() -> Result<()> {
    log_try_init();

    let view = TopologyView::new(("10.0.0.1", 6379), SENTINELS)
        .with_replica(ReplicaRecord::up("10.0.0.3", 6379, ("10.0.0.1", 6379)));
    let cluster = TestCluster::new(view);

    let mut config = test_config(SENTINELS);
    config.skip_replicas_init = true;

    let manager = cluster.bootstrap(config).await?;

    assert!(cluster.pools.added().is_empty());
    assert!(manager.disconnected_replicas().is_empty());

    manager.shutdown().await;

    Ok(())
}

#[cfg_attr(feature = "tokio-runtime", tokio::test)]
#[cfg_attr(feature = "async-std-runtime", async_std::test)]
#[serial]
async fn concurrent_sentinel_registration_is_idempotent() -> Result<()> {
    log_try_init();

    let cluster = TestCluster::new(TopologyView::new(("10.0.0.1", 6379), SENTINELS));
    let manager = cluster.bootstrap(test_config(SENTINELS)).await?;

    let shared = manager.shared();
    let newcomer = uri("10.0.1.9", 26379);

    let results = join_all(
        (0..5).map(|_| shared.register_sentinel(newcomer.clone())),
    )
    .await;

    let inserted = results
        .into_iter()
        .collect::<Result<Vec<bool>>>()?
        .into_iter()
        .filter(|inserted| *inserted)
        .count();

    assert_eq!(1, inserted);
    assert_eq!(3, manager.sentinels().len());

    manager.shutdown().await;

    Ok(())
}
