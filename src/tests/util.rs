use crate::{
    Error, Future, RedisError, Result,
    address::{RedisUri, Scheme},
    client::Config,
    commands::SentinelCommands,
    network::SentinelConnector,
    resp::{Command, Value},
    topology::{FreezeReason, NodePools, Resolve, ShutdownGate, TopologyManager},
};
use bytes::Bytes;
use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, SocketAddr},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

pub(crate) fn log_try_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn uri(host: &str, port: u16) -> RedisUri {
    RedisUri::new(Scheme::Redis, host, port)
}

/// A config pointing at the given seeds, with both monitor loops
/// effectively disarmed so tests can drive scans by hand.
pub(crate) fn test_config(sentinels: &[(&str, u16)]) -> Config {
    let mut config = Config::new(
        "myservice",
        sentinels
            .iter()
            .map(|(host, port)| ((*host).to_owned(), *port))
            .collect(),
    );
    config.scan_interval = Duration::from_secs(3600);
    config.dns_interval = Some(Duration::from_secs(3600));
    config
}

fn bulk(str: &str) -> Value {
    Value::BulkString(Some(Bytes::copy_from_slice(str.as_bytes())))
}

fn field_map(fields: &[(&str, String)]) -> Value {
    Value::Array(Some(
        fields
            .iter()
            .flat_map(|(key, value)| [bulk(key), bulk(value)])
            .collect(),
    ))
}

/// A replica as a scripted Sentinel would report it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplicaRecord {
    pub ip: String,
    pub port: u16,
    pub flags: String,
    pub master_link_status: String,
    pub master_host: String,
    pub master_port: u16,
}

impl ReplicaRecord {
    pub fn up(ip: &str, port: u16, master: (&str, u16)) -> Self {
        Self {
            ip: ip.to_owned(),
            port,
            flags: "slave".to_owned(),
            master_link_status: "ok".to_owned(),
            master_host: master.0.to_owned(),
            master_port: master.1,
        }
    }

    pub fn down(mut self) -> Self {
        self.flags = "s_down,slave".to_owned();
        self
    }

    pub fn to_value(&self) -> Value {
        field_map(&[
            ("ip", self.ip.clone()),
            ("port", self.port.to_string()),
            ("flags", self.flags.clone()),
            ("master-link-status", self.master_link_status.clone()),
            ("master-host", self.master_host.clone()),
            ("master-port", self.master_port.to_string()),
        ])
    }
}

fn sentinel_entry(host: &str, port: u16) -> Value {
    field_map(&[
        ("ip", host.to_owned()),
        ("port", port.to_string()),
        ("flags", "sentinel".to_owned()),
        ("master-link-status", "ok".to_owned()),
    ])
}

/// What every scripted Sentinel currently answers.
#[derive(Debug, Clone, Default)]
pub(crate) struct TopologyView {
    pub master: Option<(String, u16)>,
    pub replicas: Vec<ReplicaRecord>,
    pub sentinels: Vec<(String, u16)>,
}

impl TopologyView {
    pub fn new(master: (&str, u16), sentinels: &[(&str, u16)]) -> Self {
        Self {
            master: Some((master.0.to_owned(), master.1)),
            replicas: Vec::new(),
            sentinels: sentinels
                .iter()
                .map(|(host, port)| ((*host).to_owned(), *port))
                .collect(),
        }
    }

    pub fn with_replica(mut self, replica: ReplicaRecord) -> Self {
        self.replicas.push(replica);
        self
    }
}

#[derive(Default)]
pub(crate) struct MockState {
    view: Mutex<TopologyView>,
    unreachable: Mutex<HashSet<(String, u16)>>,
    pub auth_required: AtomicBool,
    pub connects: AtomicUsize,
}

impl MockState {
    pub fn set_view(&self, view: TopologyView) {
        *self.view.lock().unwrap() = view;
    }

    pub fn set_master(&self, host: &str, port: u16) {
        self.view.lock().unwrap().master = Some((host.to_owned(), port));
    }

    pub fn set_replicas(&self, replicas: Vec<ReplicaRecord>) {
        self.view.lock().unwrap().replicas = replicas;
    }

    pub fn set_sentinels(&self, sentinels: &[(&str, u16)]) {
        self.view.lock().unwrap().sentinels = sentinels
            .iter()
            .map(|(host, port)| ((*host).to_owned(), *port))
            .collect();
    }

    pub fn set_unreachable(&self, host: &str, port: u16) {
        self.unreachable
            .lock()
            .unwrap()
            .insert((host.to_owned(), port));
    }
}

struct MockSentinel {
    state: Arc<MockState>,
    addr: (String, u16),
    authenticated: bool,
}

impl SentinelCommands for MockSentinel {
    fn send(&self, command: Command) -> Future<'_, Value> {
        Box::pin(async move {
            if self.state.unreachable.lock().unwrap().contains(&self.addr) {
                return Err(Error::IO(std::io::Error::other("broken pipe")));
            }

            if !self.authenticated {
                return Err(Error::Redis(RedisError::from(
                    "NOAUTH Authentication required.",
                )));
            }

            let view = self.state.view.lock().unwrap().clone();

            match (command.name, command.args.first().map(|arg| arg.as_slice())) {
                ("PING", _) => Ok(Value::SimpleString("PONG".to_owned())),
                ("SENTINEL", Some(b"GET-MASTER-ADDR-BY-NAME")) => Ok(match &view.master {
                    Some((host, port)) => {
                        Value::Array(Some(vec![bulk(host), bulk(&port.to_string())]))
                    }
                    None => Value::BulkString(None),
                }),
                ("SENTINEL", Some(b"SLAVES")) => Ok(Value::Array(Some(
                    view.replicas.iter().map(ReplicaRecord::to_value).collect(),
                ))),
                ("SENTINEL", Some(b"SENTINELS")) => Ok(Value::Array(Some(
                    view.sentinels
                        .iter()
                        .map(|(host, port)| sentinel_entry(host, *port))
                        .collect(),
                ))),
                _ => Err(Error::Client(format!("Unexpected command {command}"))),
            }
        })
    }
}

pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new(state: Arc<MockState>) -> Self {
        Self { state }
    }
}

impl SentinelConnector for MockConnector {
    fn connect<'a>(
        &'a self,
        uri: &'a RedisUri,
        use_password: bool,
    ) -> Future<'a, Box<dyn SentinelCommands>> {
        Box::pin(async move {
            let addr = (uri.host().to_owned(), uri.port());

            if self.state.unreachable.lock().unwrap().contains(&addr) {
                return Err(Error::IO(std::io::Error::other(format!(
                    "connection refused: {uri}"
                ))));
            }

            self.state.connects.fetch_add(1, Ordering::Relaxed);

            let authenticated = use_password || !self.state.auth_required.load(Ordering::Relaxed);

            Ok(Box::new(MockSentinel {
                state: self.state.clone(),
                addr,
                authenticated,
            }) as Box<dyn SentinelCommands>)
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockResolver {
    hosts: Arc<Mutex<HashMap<String, Vec<IpAddr>>>>,
}

impl MockResolver {
    pub fn set(&self, host: &str, ip: &str) {
        self.set_all(host, &[ip]);
    }

    pub fn set_all(&self, host: &str, ips: &[&str]) {
        self.hosts.lock().unwrap().insert(
            host.to_owned(),
            ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        );
    }
}

impl Resolve for MockResolver {
    fn resolve_one<'a>(&'a self, host: &'a str, port: u16) -> Future<'a, SocketAddr> {
        Box::pin(async move {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(SocketAddr::new(ip, port));
            }

            self.hosts
                .lock()
                .unwrap()
                .get(host)
                .and_then(|ips| ips.first().copied())
                .map(|ip| SocketAddr::new(ip, port))
                .ok_or_else(|| Error::Client(format!("Unable to resolve hostname {host}")))
        })
    }

    fn resolve_all<'a>(&'a self, host: &'a str, port: u16) -> Future<'a, Vec<SocketAddr>> {
        Box::pin(async move {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(vec![SocketAddr::new(ip, port)]);
            }

            self.hosts
                .lock()
                .unwrap()
                .get(host)
                .map(|ips| ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect())
                .ok_or_else(|| Error::Client(format!("Unable to resolve hostname {host}")))
        })
    }
}

/// Pool adapter double recording every mutation the manager drives.
#[derive(Default)]
pub(crate) struct MockPools {
    master: Mutex<Option<RedisUri>>,
    replicas: Mutex<HashMap<RedisUri, bool>>,
    gate: ShutdownGate,
    change_master_calls: Mutex<Vec<RedisUri>>,
    added: Mutex<Vec<RedisUri>>,
    downs: Mutex<Vec<(RedisUri, FreezeReason)>>,
    ups: Mutex<Vec<(RedisUri, FreezeReason)>>,
    pub fail_change_master: AtomicBool,
    pub fail_add_replica: AtomicBool,
}

impl MockPools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current_master(&self) -> Option<RedisUri> {
        self.master.lock().unwrap().clone()
    }

    pub fn change_masters(&self) -> Vec<RedisUri> {
        self.change_master_calls.lock().unwrap().clone()
    }

    pub fn added(&self) -> Vec<RedisUri> {
        self.added.lock().unwrap().clone()
    }

    pub fn downs(&self) -> Vec<(RedisUri, FreezeReason)> {
        self.downs.lock().unwrap().clone()
    }

    pub fn ups(&self) -> Vec<(RedisUri, FreezeReason)> {
        self.ups.lock().unwrap().clone()
    }

    /// `Some(true)` when present and up, `Some(false)` when frozen.
    pub fn replica_state(&self, uri: &RedisUri) -> Option<bool> {
        self.replicas.lock().unwrap().get(uri).copied()
    }
}

impl NodePools for MockPools {
    fn change_master(&self, new_master: RedisUri) -> Future<'_, ()> {
        Box::pin(async move {
            if self.fail_change_master.load(Ordering::Relaxed) {
                return Err(Error::Client("changeMaster rejected".to_owned()));
            }

            self.change_master_calls
                .lock()
                .unwrap()
                .push(new_master.clone());
            *self.master.lock().unwrap() = Some(new_master.clone());
            self.replicas.lock().unwrap().remove(&new_master);
            Ok(())
        })
    }

    fn add_replica(&self, uri: RedisUri) -> Future<'_, ()> {
        Box::pin(async move {
            if self.fail_add_replica.load(Ordering::Relaxed) {
                return Err(Error::Client("addReplica rejected".to_owned()));
            }

            self.added.lock().unwrap().push(uri.clone());
            // new replicas start frozen; the manager unfreezes them
            self.replicas.lock().unwrap().entry(uri).or_insert(false);
            Ok(())
        })
    }

    fn has_replica(&self, uri: &RedisUri) -> bool {
        self.replicas.lock().unwrap().contains_key(uri)
    }

    fn replica_down(&self, uri: &RedisUri, reason: FreezeReason) -> bool {
        let mut replicas = self.replicas.lock().unwrap();

        match replicas.get_mut(uri) {
            Some(up) if *up => {
                *up = false;
                self.downs.lock().unwrap().push((uri.clone(), reason));
                true
            }
            _ => false,
        }
    }

    fn replica_up(&self, uri: &RedisUri, reason: FreezeReason) -> bool {
        let mut replicas = self.replicas.lock().unwrap();

        match replicas.get_mut(uri) {
            Some(up) if !*up => {
                *up = true;
                self.ups.lock().unwrap().push((uri.clone(), reason));
                true
            }
            _ => false,
        }
    }

    fn is_replica_unfrozen(&self, uri: &RedisUri) -> bool {
        self.replicas.lock().unwrap().get(uri).copied().unwrap_or(false)
    }

    fn replica_endpoints(&self) -> Vec<RedisUri> {
        self.replicas.lock().unwrap().keys().cloned().collect()
    }

    fn shutdown_gate(&self) -> &ShutdownGate {
        &self.gate
    }
}

/// A scripted deployment: one shared Sentinel view, a programmable
/// resolver and a recording pool adapter.
pub(crate) struct TestCluster {
    pub state: Arc<MockState>,
    pub resolver: MockResolver,
    pub pools: Arc<MockPools>,
}

impl TestCluster {
    pub fn new(view: TopologyView) -> Self {
        let state = Arc::new(MockState::default());
        state.set_view(view);

        Self {
            state,
            resolver: MockResolver::default(),
            pools: MockPools::new(),
        }
    }

    pub async fn bootstrap(&self, config: Config) -> Result<TopologyManager> {
        TopologyManager::bootstrap_with(
            config,
            self.pools.clone(),
            Box::new(MockConnector::new(self.state.clone())),
            Box::new(self.resolver.clone()),
        )
        .await
    }
}
