use crate::{
    address::{RedisUri, Scheme},
    network::sleep,
    topology::{FreezeReason, Shared},
};
use log::{error, info, warn};
use std::{net::IpAddr, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Periodic re-resolution of the master and replica hostnames recorded at
/// bootstrap. Literal IP addresses are immutable under DNS and are never
/// monitored.
pub(crate) async fn run_dns_loop(shared: Arc<Shared>, cancellation: CancellationToken) {
    let Some(interval) = shared.config.dns_interval else {
        return;
    };

    loop {
        sleep(interval).await;

        if cancellation.is_cancelled() || shared.pools.shutdown_gate().is_closed() {
            return;
        }

        dns_check_once(&shared).await;
    }
}

/// One DNS pass over every hostname-declared master and replica.
pub(crate) async fn dns_check_once(shared: &Shared) {
    let Some(_gate) = shared.pools.shutdown_gate().acquire() else {
        return;
    };

    let masters = shared
        .dns_masters
        .lock()
        .unwrap()
        .iter()
        .map(|(uri, addr)| (uri.clone(), *addr))
        .collect::<Vec<_>>();

    for (declared, last) in masters {
        check_master_host(shared, declared, last).await;
    }

    let replicas = shared
        .dns_replicas
        .lock()
        .unwrap()
        .iter()
        .map(|(uri, addr)| (uri.clone(), *addr))
        .collect::<Vec<_>>();

    for (declared, last) in replicas {
        check_replica_host(shared, declared, last).await;
    }
}

async fn check_master_host(shared: &Shared, declared: RedisUri, last: IpAddr) {
    let addr = match shared
        .resolver
        .resolve_one(declared.host(), declared.port())
        .await
    {
        Ok(addr) => addr,
        Err(e) => {
            error!("Unable to resolve master hostname {declared}: {e}");
            return;
        }
    };

    if addr.ip() == last {
        return;
    }

    let old_uri = shared.nat(&declared.with_ip(last));
    let new_uri = shared.nat(&declared.with_ip(addr.ip()));

    let current = shared.master.get();

    if current.as_ref() != Some(&old_uri) {
        warn!(
            "Master {declared} changed its address, but {old_uri} is not the current master; skipped"
        );
        return;
    }

    if !shared
        .master
        .compare_and_set(Some(&old_uri), Some(new_uri.clone()))
    {
        return;
    }

    match shared.pools.change_master(new_uri.clone()).await {
        Ok(()) => {
            info!(
                "Master {declared} has changed its address from {last} to {}",
                addr.ip()
            );
            shared.dns_masters.lock().unwrap().insert(declared, addr.ip());
        }
        Err(e) => {
            error!("Failed to change master to {new_uri}: {e}");
            shared.master.compare_and_set(Some(&new_uri), current);
        }
    }
}

async fn check_replica_host(shared: &Shared, declared: RedisUri, last: IpAddr) {
    let addr = match shared
        .resolver
        .resolve_one(declared.host(), declared.port())
        .await
    {
        Ok(addr) => addr,
        Err(e) => {
            error!("Unable to resolve replica hostname {declared}: {e}");
            return;
        }
    };

    if addr.ip() == last {
        return;
    }

    let old_uri = shared.nat(&declared.with_ip(last));
    let new_uri = shared.nat(&declared.with_ip(addr.ip()));

    if !shared.pools.has_replica(&old_uri) {
        warn!(
            "Replica {declared} changed its address, but {old_uri} is not a known replica; skipped"
        );
        return;
    }

    if shared.pools.has_replica(&new_uri) {
        shared.pools.replica_up(&new_uri, FreezeReason::Manager);
        shared.pools.replica_down(&old_uri, FreezeReason::Manager);
    } else {
        match shared.pools.add_replica(new_uri.clone()).await {
            Ok(()) => {
                shared.pools.replica_down(&old_uri, FreezeReason::Manager);
            }
            Err(e) => {
                error!("Failed to add replica {new_uri}: {e}");
                return;
            }
        }
    }

    info!(
        "Replica {declared} has changed its address from {last} to {}",
        addr.ip()
    );
    shared.dns_replicas.lock().unwrap().insert(declared, addr.ip());
}

/// Auxiliary sweep re-resolving the Sentinel hostnames recorded at
/// bootstrap, registering any address not yet part of the registry.
pub(crate) async fn run_sentinel_dns_loop(shared: Arc<Shared>, cancellation: CancellationToken) {
    let Some(interval) = shared.config.dns_interval else {
        return;
    };

    loop {
        sleep(interval).await;

        if cancellation.is_cancelled() || shared.pools.shutdown_gate().is_closed() {
            return;
        }

        sentinel_dns_check_once(&shared).await;
    }
}

pub(crate) async fn sentinel_dns_check_once(shared: &Shared) {
    let hosts = shared
        .sentinel_hosts
        .lock()
        .unwrap()
        .iter()
        .cloned()
        .collect::<Vec<_>>();

    for (host, port) in hosts {
        let addrs = match shared.resolver.resolve_all(&host, port).await {
            Ok(addrs) => addrs,
            Err(e) => {
                error!("Unable to resolve Sentinel hostname {host}: {e}");
                continue;
            }
        };

        for addr in addrs {
            let uri = RedisUri::from_addr(Scheme::Redis, addr);

            if !shared.registry.contains(&shared.nat(&uri)) {
                shared.register_sentinel_logged(uri).await;
            }
        }
    }
}
