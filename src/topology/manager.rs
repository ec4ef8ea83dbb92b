use crate::{
    Error, Result,
    address::{HostKind, RedisUri, Scheme},
    client::{Config, ReadMode},
    commands::SentinelCommands,
    network::{
        SentinelConnector, SentinelHandle, SentinelRegistry, TcpSentinelConnector, spawn, timeout,
    },
    topology::{
        DnsResolver, FreezeReason, NodePools, Resolve, run_dns_loop, run_scan_loop,
        run_sentinel_dns_loop,
    },
};
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::{
    collections::{HashMap, HashSet},
    net::IpAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio_util::sync::CancellationToken;

/// Atomically-updatable cell holding the current master URI.
///
/// Transitions are compare-and-swap: the observed value must still be
/// current, else the swap is abandoned as a no-op.
#[derive(Debug, Default)]
pub(crate) struct MasterCell(Mutex<Option<RedisUri>>);

impl MasterCell {
    pub fn get(&self) -> Option<RedisUri> {
        self.0.lock().unwrap().clone()
    }

    pub fn compare_and_set(&self, observed: Option<&RedisUri>, new: Option<RedisUri>) -> bool {
        let mut guard = self.0.lock().unwrap();

        if guard.as_ref() == observed {
            *guard = new;
            true
        } else {
            false
        }
    }
}

/// State shared between the manager handle and its monitor loops.
pub(crate) struct Shared {
    pub config: Config,
    pub pools: Arc<dyn NodePools>,
    pub connector: Box<dyn SentinelConnector>,
    pub resolver: Box<dyn Resolve>,
    pub registry: SentinelRegistry,
    pub master: MasterCell,
    pub use_password: AtomicBool,
    /// Sentinel hostnames declared in the seed list, re-resolved by the DNS monitor.
    pub sentinel_hosts: Mutex<HashSet<(String, u16)>>,
    /// Replicas reported down at bootstrap, surfaced to collaborators
    /// so they skip the initial connection.
    pub disconnected_replicas: Mutex<HashSet<RedisUri>>,
    /// Hostname-declared master, with its last resolved address.
    pub dns_masters: Mutex<HashMap<RedisUri, IpAddr>>,
    /// Hostname-declared replicas, with their last resolved addresses.
    pub dns_replicas: Mutex<HashMap<RedisUri, IpAddr>>,
}

impl Shared {
    pub fn use_password(&self) -> bool {
        self.use_password.load(Ordering::Relaxed)
    }

    pub fn nat(&self, uri: &RedisUri) -> RedisUri {
        self.config.nat_mapper.map(uri)
    }

    pub async fn connect_sentinel(&self, uri: &RedisUri) -> Result<Box<dyn SentinelCommands>> {
        self.connector.connect(uri, self.use_password()).await
    }

    /// Resolve `uri` and apply the NAT mapping, returning the raw resolved
    /// address when the host actually went through DNS.
    pub async fn resolve_uri_tracked(&self, uri: &RedisUri) -> Result<(RedisUri, Option<IpAddr>)> {
        if uri.is_ip_literal() {
            Ok((self.nat(uri), None))
        } else {
            let addr = self.resolver.resolve_one(uri.host(), uri.port()).await?;
            Ok((self.nat(&uri.with_ip(addr.ip())), Some(addr.ip())))
        }
    }

    /// Resolve `uri` (hostnames only) and apply the NAT mapping.
    pub async fn resolve_uri(&self, uri: &RedisUri) -> Result<RedisUri> {
        self.resolve_uri_tracked(uri).await.map(|(uri, _)| uri)
    }

    /// Register the Sentinel at `uri` under its IP-form URI,
    /// verifying it with `PING` first.
    ///
    /// Idempotent: concurrent registrations of the same URI yield exactly
    /// one registry entry, and every caller succeeds.
    /// Returns whether a new entry was inserted.
    pub async fn register_sentinel(&self, uri: RedisUri) -> Result<bool> {
        let mapped = self.nat(&uri);

        if mapped.is_ip_literal() && self.registry.contains(&mapped) {
            return Ok(false);
        }

        let declared_host = match uri.host_kind() {
            HostKind::Hostname => Some(uri.host().to_owned()),
            _ => None,
        };

        let ip_uri = self.resolve_uri(&uri).await?;

        if declared_host.is_some() && self.registry.contains(&ip_uri) {
            return Ok(false);
        }

        let client = self.connect_sentinel(&ip_uri).await?;
        client.ping().await?;

        let handle = Arc::new(SentinelHandle::new(ip_uri.clone(), declared_host, client));

        if self.registry.try_register(handle.clone()) {
            info!("New Sentinel discovered at {ip_uri}");
            Ok(true)
        } else {
            // lost the race; another caller registered the same URI first
            handle.close().await;
            Ok(false)
        }
    }

    pub async fn register_sentinel_logged(&self, uri: RedisUri) {
        if let Err(e) = self.register_sentinel(uri.clone()).await {
            warn!("Failed to register Sentinel {uri}: {e}");
        }
    }

    /// Probe the seed Sentinels to discover whether the deployment
    /// requires authentication. The first definitive outcome wins.
    async fn probe_auth(&self) -> Result<()> {
        let mut last_error: Option<Error> = None;

        for (host, port) in &self.config.sentinels {
            let uri = self.nat(&RedisUri::new(Scheme::Redis, host, *port));

            let client = match self.connector.connect(&uri, false).await {
                Ok(client) => client,
                Err(e) => {
                    debug!("Cannot connect to Sentinel {uri}: {e}");
                    last_error = Some(e);
                    continue;
                }
            };

            let result = client.ping().await;
            let _ = client.close().await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_auth_required() => {
                    return if self.config.sentinel_credentials().is_some() {
                        self.use_password.store(true, Ordering::Relaxed);
                        Ok(())
                    } else {
                        Err(Error::Sentinel(format!(
                            "Sentinel {uri} requires authentication, but no password is configured"
                        )))
                    };
                }
                Err(e) => {
                    warn!("Unexpected PING reply from Sentinel {uri}: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => Error::Sentinel(format!("Unable to connect to Sentinel servers: {e}")),
            None => Error::Sentinel("Unable to connect to Sentinel servers".to_owned()),
        })
    }

    /// First-contact loop over the seed Sentinels: the first one able to
    /// describe the deployment seeds the registry and the pools.
    async fn seed_topology(&self) -> Result<()> {
        let mut last_error: Option<Error> = None;
        let mut seeded: Option<(RedisUri, Vec<(RedisUri, bool)>)> = None;

        for (host, port) in &self.config.sentinels {
            let seed = self.nat(&RedisUri::new(Scheme::Redis, host, *port));

            match self.seed_from_sentinel(&seed).await {
                Ok(snapshot) => {
                    seeded = Some(snapshot);
                    break;
                }
                Err(e) => {
                    warn!("Cannot seed topology from Sentinel {seed}: {e}");
                    last_error = Some(e);
                }
            }
        }

        let Some((master, replicas)) = seeded else {
            return Err(match last_error {
                Some(e) => Error::Sentinel(format!("Can't connect to servers: {e}")),
                None => Error::Sentinel("Can't connect to servers".to_owned()),
            });
        };

        if self.config.check_sentinels_list && self.config.sentinels_discovery {
            if self.registry.is_empty() {
                return Err(Error::Sentinel(
                    "No Sentinel instances registered at bootstrap".to_owned(),
                ));
            }

            if self.registry.len() < 2 {
                return Err(Error::Sentinel(format!(
                    "At least two Sentinel instances are required when check_sentinels_list is enabled, found {}",
                    self.registry.len()
                )));
            }
        }

        if self.master.get().is_none() {
            return Err(Error::Sentinel("Can't connect to servers".to_owned()));
        }

        if self.config.read_mode != ReadMode::Master
            && !self.config.skip_replicas_init
            && replicas.is_empty()
        {
            warn!(
                "No replica discovered for master {} although read mode is {:?}",
                self.config.master_name, self.config.read_mode
            );
        }

        self.pools.change_master(master.clone()).await?;
        info!("Master {master} used for {}", self.config.master_name);

        for (uri, down) in replicas {
            if let Err(e) = self.pools.add_replica(uri.clone()).await {
                error!("Failed to add replica {uri}: {e}");
                continue;
            }

            info!("Replica {uri} added");

            if down {
                self.pools.replica_down(&uri, FreezeReason::Manager);
            }
        }

        Ok(())
    }

    async fn seed_from_sentinel(
        &self,
        seed: &RedisUri,
    ) -> Result<(RedisUri, Vec<(RedisUri, bool)>)> {
        let client = self.connect_sentinel(seed).await?;
        let result = self.read_initial_state(&*client, seed).await;
        let _ = client.close().await;
        result
    }

    async fn read_initial_state(
        &self,
        client: &dyn SentinelCommands,
        seed: &RedisUri,
    ) -> Result<(RedisUri, Vec<(RedisUri, bool)>)> {
        let master_name = self.config.master_name.clone();

        let Some((master_host, master_port)) =
            client.sentinel_get_master_addr_by_name(&master_name).await?
        else {
            return Err(Error::Sentinel(format!(
                "Master {master_name} is unknown by Sentinel {seed}"
            )));
        };

        let declared_master = RedisUri::new(Scheme::Redis, &master_host, master_port);
        let (master, master_addr) = self.resolve_uri_tracked(&declared_master).await?;

        if let Some(addr) = master_addr {
            if !declared_master.is_localhost() {
                self.dns_masters
                    .lock()
                    .unwrap()
                    .insert(declared_master.clone(), addr);
            }
        }

        self.master.compare_and_set(None, Some(master.clone()));

        let mut replicas = Vec::new();

        if !self.config.skip_replicas_init {
            for info in client.sentinel_slaves(&master_name).await? {
                let declared = RedisUri::new(Scheme::Redis, &info.ip, info.port);

                let (resolved, addr) = match self.resolve_uri_tracked(&declared).await {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        error!("Unable to resolve replica {declared}: {e}");
                        continue;
                    }
                };

                let down = info.is_down(self.config.check_sync);

                if down {
                    warn!("Replica {resolved} is down: flags={}", info.flags);
                    self.disconnected_replicas
                        .lock()
                        .unwrap()
                        .insert(resolved.clone());
                }

                if let Some(addr) = addr {
                    if !declared.is_localhost() {
                        self.dns_replicas.lock().unwrap().insert(declared, addr);
                    }
                }

                replicas.push((resolved, down));
            }
        }

        let mut discovered = Vec::new();

        for info in client.sentinel_sentinels(&master_name).await? {
            if info.ip.is_empty() || info.is_down() {
                continue;
            }

            discovered.push(RedisUri::new(Scheme::Redis, &info.ip, info.port));
        }

        discovered.push(seed.clone());

        let registrations = discovered
            .into_iter()
            .map(|uri| self.register_sentinel_logged(uri))
            .collect::<Vec<_>>();

        if timeout(self.config.connect_timeout, join_all(registrations))
            .await
            .is_err()
        {
            warn!("Sentinel registration did not complete within the connect timeout");
        }

        Ok((master, replicas))
    }
}

/// Discovers a Redis master/replica deployment through a set of Sentinel
/// nodes, maintains an up-to-date view of that topology as it changes, and
/// keeps the per-node connection pools aligned with reality.
///
/// Lifecycle: [`bootstrap`](TopologyManager::bootstrap) discovers the
/// initial topology and arms the monitor loops;
/// [`shutdown`](TopologyManager::shutdown) stops them and drains every
/// Sentinel connection.
pub struct TopologyManager {
    shared: Arc<Shared>,
    cancellation: CancellationToken,
}

impl TopologyManager {
    /// Bootstrap the topology with the production TCP transport and the
    /// runtime's DNS resolver.
    pub async fn bootstrap(config: Config, pools: Arc<dyn NodePools>) -> Result<Self> {
        let connector = Box::new(TcpSentinelConnector::new(config.clone()));
        Self::bootstrap_with(config, pools, connector, Box::new(DnsResolver)).await
    }

    /// Bootstrap the topology with a custom Sentinel transport and resolver.
    pub async fn bootstrap_with(
        config: Config,
        pools: Arc<dyn NodePools>,
        connector: Box<dyn SentinelConnector>,
        resolver: Box<dyn Resolve>,
    ) -> Result<Self> {
        config.validate()?;

        let mut sentinel_hosts = HashSet::new();

        for (host, port) in &config.sentinels {
            let uri = RedisUri::new(Scheme::Redis, host, *port);
            if uri.host_kind() == HostKind::Hostname && !uri.is_localhost() {
                sentinel_hosts.insert((host.clone(), *port));
            }
        }

        let shared = Arc::new(Shared {
            config,
            pools,
            connector,
            resolver,
            registry: SentinelRegistry::new(),
            master: MasterCell::default(),
            use_password: AtomicBool::new(false),
            sentinel_hosts: Mutex::new(sentinel_hosts),
            disconnected_replicas: Mutex::new(HashSet::new()),
            dns_masters: Mutex::new(HashMap::new()),
            dns_replicas: Mutex::new(HashMap::new()),
        });

        shared.probe_auth().await?;
        shared.seed_topology().await?;

        let cancellation = CancellationToken::new();

        spawn(run_scan_loop(shared.clone(), cancellation.clone()));

        if shared.config.dns_interval.is_some() {
            let monitors_nodes = !shared.dns_masters.lock().unwrap().is_empty()
                || !shared.dns_replicas.lock().unwrap().is_empty();

            if monitors_nodes {
                spawn(run_dns_loop(shared.clone(), cancellation.clone()));
            }

            if !shared.sentinel_hosts.lock().unwrap().is_empty() {
                spawn(run_sentinel_dns_loop(shared.clone(), cancellation.clone()));
            }
        }

        Ok(Self {
            shared,
            cancellation,
        })
    }

    /// Current master URI.
    pub fn master(&self) -> Option<RedisUri> {
        self.shared.master.get()
    }

    /// Registered Sentinels, in IP form.
    pub fn sentinels(&self) -> Vec<RedisUri> {
        self.shared.registry.uris()
    }

    /// Replicas reported down at bootstrap; collaborators skip their
    /// initial connection.
    pub fn disconnected_replicas(&self) -> HashSet<RedisUri> {
        self.shared.disconnected_replicas.lock().unwrap().clone()
    }

    /// Stop monitoring and close every Sentinel connection.
    ///
    /// In-flight scans observe the closed shutdown gate and abort without
    /// mutating the topology. Pool teardown remains the adapter's job.
    pub async fn shutdown(&self) {
        self.cancellation.cancel();
        self.shared.pools.shutdown_gate().close();

        for handle in self.shared.registry.drain() {
            handle.close().await;
        }

        info!(
            "Topology manager for {} stopped",
            self.shared.config.master_name
        );
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}
