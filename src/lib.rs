/*!
sentis is a Sentinel-backed topology manager for Redis clients.

# Philosophy
* Full async library
* Steady-state errors never propagate: they are logged and drive scheduling
* Rust idiomatic API

# Features
* Discovery of a master/replica deployment through its
  [Sentinel](https://redis.io/docs/management/sentinel/) fleet
* Periodic reconciliation of the master, the replicas and the Sentinel
  fleet itself, tolerating any subset of Sentinels being unreachable
* DNS monitoring of hostname-declared nodes, so a rebinding triggers a
  master swap or a replica rebinding without waiting for Sentinel
* Authentication discovery at bootstrap
* NAT-aware address handling with canonical IPv6 normalization
* Async support ([tokio](https://tokio.rs/) or [async-std](https://async.rs/))

# Basic Usage

```no_run
use sentis::{
    Result,
    client::IntoConfig,
    topology::{NodePools, TopologyManager},
};
use std::sync::Arc;

async fn run(pools: Arc<dyn NodePools>) -> Result<()> {
    let config = "redis+sentinel://127.0.0.1:26379,127.0.0.1:26380/mymaster".into_config()?;

    // Discover the topology and arm the monitor loops
    let manager = TopologyManager::bootstrap(config, pools).await?;

    println!("master: {:?}", manager.master());

    // ...

    manager.shutdown().await;

    Ok(())
}
```

The per-node connection pools are collaborators of this crate, not part of
it: implement the [`NodePools`](topology::NodePools) trait to receive the
topology mutations: master swap, replica addition, freeze and unfreeze.
*/
pub mod address;
pub mod client;
pub mod commands;
mod error;
mod network;
pub mod resp;
pub mod topology;

pub use error::*;
pub use network::{SentinelConnector, StandaloneConnection, TcpSentinelConnector};

/// Library general result type.
pub type Result<T> = std::result::Result<T, Error>;
/// Library general future type.
pub type Future<'a, T> = futures_util::future::BoxFuture<'a, Result<T>>;

#[cfg(all(feature = "tokio-runtime", feature = "async-std-runtime"))]
compile_error!(
    "feature \"tokio-runtime\" and feature \"async-std-runtime\" cannot be enabled at the same time"
);

#[cfg(test)]
mod tests;
