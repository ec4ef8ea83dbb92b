use crate::{
    Result,
    address::{RedisUri, Scheme},
    commands::{ReplicaInfo, SentinelCommands, SentinelInfo},
    network::{SentinelHandle, sleep, spawn},
    topology::{FreezeReason, Shared},
};
use futures_util::future::{join3, join_all};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use std::{collections::HashSet, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Self-rearming reconciliation loop.
///
/// The next scan is armed only after the current one has fully completed,
/// so two scans never overlap.
pub(crate) async fn run_scan_loop(shared: Arc<Shared>, cancellation: CancellationToken) {
    loop {
        sleep(shared.config.scan_interval).await;

        if cancellation.is_cancelled() || shared.pools.shutdown_gate().is_closed() {
            return;
        }

        scan_once(&shared).await;
    }
}

/// One reconciliation scan: poll the registered Sentinels in shuffled
/// order until one of them answers every query.
///
/// A Sentinel failing any query has its connection closed and iteration
/// resumes with the next one; steady-state errors never propagate.
pub(crate) async fn scan_once(shared: &Shared) {
    let mut handles = shared.registry.snapshot();
    handles.shuffle(&mut rand::rng());

    let mut last_error = None;

    for handle in handles {
        let Some(_gate) = shared.pools.shutdown_gate().acquire() else {
            return;
        };

        let client = match acquire_client(shared, &handle).await {
            Ok(client) => client,
            Err(e) => {
                debug!("Cannot connect to Sentinel {}: {e}", handle.uri());
                last_error = Some(e);
                continue;
            }
        };

        match poll_sentinel(shared, handle.uri(), &*client).await {
            Ok(()) => {
                handle.restore_client(client).await;
                return;
            }
            Err(e) => {
                warn!("Sentinel {} failed during scan: {e}", handle.uri());
                let _ = client.close().await;
                last_error = Some(e);
            }
        }
    }

    if let Some(e) = last_error {
        error!("Unable to update the topology from any Sentinel: {e}");
    }
}

async fn acquire_client(
    shared: &Shared,
    handle: &SentinelHandle,
) -> Result<Box<dyn SentinelCommands>> {
    match handle.take_client().await {
        Some(client) => Ok(client),
        None => shared.connect_sentinel(handle.uri()).await,
    }
}

async fn poll_sentinel(
    shared: &Shared,
    sentinel_uri: &RedisUri,
    client: &dyn SentinelCommands,
) -> Result<()> {
    let master_name = shared.config.master_name.clone();

    let (master_addr, replicas, sentinels) = join3(
        client.sentinel_get_master_addr_by_name(&master_name),
        async {
            if shared.config.skip_replicas_init {
                None
            } else {
                Some(client.sentinel_slaves(&master_name).await)
            }
        },
        client.sentinel_sentinels(&master_name),
    )
    .await;

    // the three mutations target disjoint state: every query that came
    // back is applied, whatever happened to the other two
    let mut failure = None;

    match master_addr {
        Ok(master_addr) => apply_master_change(shared, master_addr).await,
        Err(e) => failure = Some(e),
    }

    match replicas {
        Some(Ok(replicas)) => apply_replica_changes(shared, replicas).await,
        Some(Err(e)) => failure = Some(e),
        None => (),
    }

    match sentinels {
        Ok(sentinels) => {
            if shared.config.sentinels_discovery {
                apply_sentinel_changes(shared, sentinel_uri, sentinels).await;
            }
        }
        Err(e) => failure = Some(e),
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn apply_master_change(shared: &Shared, master_addr: Option<(String, u16)>) {
    let master_name = &shared.config.master_name;

    let Some((host, port)) = master_addr else {
        warn!("Sentinel reports no master for {master_name}");
        return;
    };

    let declared = RedisUri::new(Scheme::Redis, &host, port);

    let resolved = match shared.resolve_uri(&declared).await {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("Unable to resolve master {declared}: {e}");
            return;
        }
    };

    let current = shared.master.get();

    if current.as_ref() == Some(&resolved) {
        return;
    }

    if !shared
        .master
        .compare_and_set(current.as_ref(), Some(resolved.clone()))
    {
        // another task swapped the cell in the meantime
        return;
    }

    match shared.pools.change_master(resolved.clone()).await {
        Ok(()) => match &current {
            Some(old) => info!("Master for {master_name} has changed from {old} to {resolved}"),
            None => info!("Master {resolved} used for {master_name}"),
        },
        Err(e) => {
            error!("Failed to change master for {master_name} to {resolved}: {e}");
            shared.master.compare_and_set(Some(&resolved), current);
        }
    }
}

async fn apply_replica_changes(shared: &Shared, replicas: Vec<ReplicaInfo>) {
    let Some(current_master) = shared.master.get() else {
        return;
    };

    let check_sync = shared.config.check_sync;
    let mut seen = HashSet::new();

    for info in replicas {
        let declared = RedisUri::new(Scheme::Redis, &info.ip, info.port);

        if info.is_down(check_sync) {
            let uri = shared.nat(&declared);
            if shared.pools.replica_down(&uri, FreezeReason::Manager) {
                warn!("Replica {uri} is down: flags={}", info.flags);
            }
            continue;
        }

        let resolved = match shared.resolve_uri(&declared).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Unable to resolve replica {declared}: {e}");
                continue;
            }
        };

        if info.master_host == "?" {
            warn!("Replica {resolved} reports an unknown master; skipped");
            continue;
        }

        let reported = RedisUri::new(Scheme::Redis, &info.master_host, info.master_port);

        let reported_master = match shared.resolve_uri(&reported).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Unable to resolve the master of replica {resolved}: {e}");
                continue;
            }
        };

        if reported_master != current_master {
            warn!(
                "Replica {resolved} reports master {reported_master}, but the current master is {current_master}; skipped"
            );
            continue;
        }

        if resolved == current_master {
            debug!("Skipping replica {resolved}: it is the current master");
            continue;
        }

        seen.insert(resolved.clone());

        if !shared.pools.has_replica(&resolved) {
            match shared.pools.add_replica(resolved.clone()).await {
                Ok(()) => {
                    info!("Replica {resolved} added");

                    if !shared.pools.is_replica_unfrozen(&resolved)
                        && shared.pools.replica_up(&resolved, FreezeReason::Manager)
                    {
                        info!("Replica {resolved} is up");
                    }
                }
                Err(e) => error!("Failed to add replica {resolved}: {e}"),
            }
        } else if shared.pools.replica_up(&resolved, FreezeReason::Manager) {
            info!("Replica {resolved} is up");
        }
    }

    for endpoint in shared.pools.replica_endpoints() {
        if !seen.contains(&endpoint)
            && endpoint != current_master
            && shared.pools.replica_down(&endpoint, FreezeReason::Manager)
        {
            warn!("Replica {endpoint} is no longer reported by Sentinel; frozen");
        }
    }
}

async fn apply_sentinel_changes(
    shared: &Shared,
    connected: &RedisUri,
    sentinels: Vec<SentinelInfo>,
) {
    let mut fleet = HashSet::new();

    for info in sentinels {
        if info.ip.is_empty() || info.is_down() {
            continue;
        }

        let declared = RedisUri::new(Scheme::Redis, &info.ip, info.port);

        match shared.resolve_uri(&declared).await {
            Ok(resolved) => {
                fleet.insert(resolved);
            }
            Err(e) => error!("Unable to resolve Sentinel {declared}: {e}"),
        }
    }

    fleet.insert(connected.clone());

    let additions = fleet
        .iter()
        .filter(|uri| !shared.registry.contains(uri))
        .map(|uri| shared.register_sentinel_logged(uri.clone()))
        .collect::<Vec<_>>();

    join_all(additions).await;

    for uri in shared.registry.uris() {
        if !fleet.contains(&uri) {
            if let Some(handle) = shared.registry.remove(&uri) {
                warn!("Sentinel {uri} is no longer part of the fleet; removed");
                spawn(async move { handle.close().await });
            }
        }
    }
}
