use crate::{
    Error, Result,
    address::{NatMapper, split_host_port},
};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    time::Duration,
};
use url::Url;

pub(crate) const DEFAULT_SENTINEL_PORT: u16 = 26379;
const DEFAULT_SCAN_INTERVAL: u64 = 1_000;
const DEFAULT_DNS_INTERVAL: i64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT: u64 = 10_000;
const DEFAULT_COMMAND_TIMEOUT: u64 = 0;
const DEFAULT_CHECK_SENTINELS_LIST: bool = true;
const DEFAULT_SENTINELS_DISCOVERY: bool = true;
const DEFAULT_CHECK_SYNC: bool = true;
const DEFAULT_SKIP_REPLICAS_INIT: bool = false;
const DEFAULT_KEEP_ALIVE: Option<Duration> = None;
const DEFAULT_NO_DELAY: bool = true;

/// Which nodes the surrounding client reads from.
///
/// Only affects the empty-replica warning emitted at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    Master,
    MasterSlave,
    #[default]
    Slave,
}

impl ReadMode {
    fn as_str(&self) -> &'static str {
        match self {
            ReadMode::Master => "master",
            ReadMode::MasterSlave => "master_slave",
            ReadMode::Slave => "slave",
        }
    }
}

impl FromStr for ReadMode {
    type Err = Error;

    fn from_str(str: &str) -> Result<ReadMode> {
        match str {
            "master" => Ok(ReadMode::Master),
            "master_slave" => Ok(ReadMode::MasterSlave),
            "slave" => Ok(ReadMode::Slave),
            _ => Err(Error::Config(format!("Cannot parse read mode from {str}"))),
        }
    }
}

/// Authentication pair sent with the `AUTH` command.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

/// Configuration options for a [`TopologyManager`](crate::topology::TopologyManager)
#[derive(Debug, Clone)]
pub struct Config {
    /// The Sentinel logical master name. Required.
    pub master_name: String,
    /// Seed addresses of the Sentinel instances. Required, non-empty.
    pub sentinels: Vec<(String, u16)>,
    /// An optional ACL username for data-plane authentication.
    ///
    /// See [`ACL`](https://redis.io/docs/management/security/acl/)
    pub username: Option<String>,
    /// An optional password for data-plane authentication.
    ///
    /// When set, the auth probe runs at bootstrap and latches whether
    /// the deployment requires authentication.
    pub password: Option<String>,
    /// An optional ACL username for Sentinel connections.
    pub sentinel_username: Option<String>,
    /// An optional password for Sentinel connections.
    ///
    /// Used only if the auth probe latched; falls back to `password`.
    pub sentinel_password: Option<String>,
    /// Fail bootstrap unless at least 2 Sentinels were discovered.
    ///
    /// The default is `true`
    pub check_sentinels_list: bool,
    /// Reconcile the Sentinel fleet itself on every scan.
    ///
    /// The default is `true`
    pub sentinels_discovery: bool,
    /// Extend the down predicate with the replica's `master-link-status`.
    ///
    /// The default is `true`
    pub check_sync: bool,
    /// Period of the Sentinel reconciliation scan. The default is 1 second
    pub scan_interval: Duration,
    /// Period of the DNS monitor. `None` disables it. The default is 5 seconds
    pub dns_interval: Option<Duration>,
    /// The time to attempt a connection before timing out. The default is 10 seconds
    pub connect_timeout: Duration,
    /// If a command does not return a reply within a set number of milliseconds,
    /// a timeout error will be thrown.
    ///
    /// If set to 0, no timeout is apply
    ///
    /// The default is 0
    pub command_timeout: Duration,
    /// Set the name of the connection to make it easier to identify the connection in client list.
    pub connection_name: String,
    /// Enable/disable keep-alive functionality (default `None`)
    ///
    /// See [`TcpKeepAlive::with_time`](https://docs.rs/socket2/latest/socket2/struct.TcpKeepalive.html#method.with_time)
    pub keep_alive: Option<Duration>,
    /// Enable/disable the use of Nagle's algorithm (default `true`)
    ///
    /// See [`TcpStream::set_nodelay`](https://docs.rs/tokio/latest/tokio/net/struct.TcpStream.html#method.set_nodelay)
    pub no_delay: bool,
    /// Which nodes the surrounding client reads from.
    pub read_mode: ReadMode,
    /// Suppress initial replica connection and reconciliation replica calls.
    ///
    /// The default is `false`
    pub skip_replicas_init: bool,
    /// URI rewrite applied at every address boundary.
    pub nat_mapper: NatMapper,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_name: String::new(),
            sentinels: Vec::new(),
            username: None,
            password: None,
            sentinel_username: None,
            sentinel_password: None,
            check_sentinels_list: DEFAULT_CHECK_SENTINELS_LIST,
            sentinels_discovery: DEFAULT_SENTINELS_DISCOVERY,
            check_sync: DEFAULT_CHECK_SYNC,
            scan_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL),
            dns_interval: Some(Duration::from_millis(DEFAULT_DNS_INTERVAL as u64)),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT),
            connection_name: String::new(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            no_delay: DEFAULT_NO_DELAY,
            read_mode: ReadMode::default(),
            skip_replicas_init: DEFAULT_SKIP_REPLICAS_INIT,
            nat_mapper: NatMapper::default(),
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    /// Build a config from an URI in the format
    /// `redis+sentinel://[[username]:password@]host[:port][,host2[:port2]...]/master-name[?param=value[&param=value...]]`
    fn from_str(str: &str) -> Result<Config> {
        match Self::parse_uri(str) {
            Some(config) => {
                config.validate()?;
                Ok(config)
            }
            None => Err(Error::Config(format!("Cannot parse config from {str}"))),
        }
    }
}

impl Config {
    /// Build a config from its mandatory parts, leaving every option at its default.
    pub fn new(master_name: impl Into<String>, sentinels: Vec<(String, u16)>) -> Self {
        Self {
            master_name: master_name.into(),
            sentinels,
            ..Default::default()
        }
    }

    /// Build a config from a parsed [`Url`]
    pub fn from_uri(uri: Url) -> Result<Config> {
        Self::from_str(uri.as_str())
    }

    /// Check the mandatory parts of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.master_name.is_empty() {
            return Err(Error::Config("master_name is required".to_owned()));
        }

        if self.sentinels.is_empty() {
            return Err(Error::Config(
                "at least one Sentinel address is required".to_owned(),
            ));
        }

        Ok(())
    }

    /// Credentials for Sentinel connections, falling back to the data-plane pair.
    pub(crate) fn sentinel_credentials(&self) -> Option<Credentials> {
        let password = self
            .sentinel_password
            .clone()
            .or_else(|| self.password.clone())?;

        Some(Credentials {
            username: self
                .sentinel_username
                .clone()
                .or_else(|| self.username.clone()),
            password,
        })
    }

    fn parse_uri(uri: &str) -> Option<Config> {
        let rest = uri
            .strip_prefix("redis+sentinel://")
            .or_else(|| uri.strip_prefix("redis-sentinel://"))?;

        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };

        // the path carries the mandatory master name
        let (authority, path) = rest.split_once('/')?;

        let master_name = match path.split('/').next() {
            Some(master_name) if !master_name.is_empty() => master_name.to_owned(),
            _ => return None,
        };

        // '@' in the host section always requests authentication,
        // even with empty credentials
        let (user_info, seeds) = match authority.rsplit_once('@') {
            Some((user_info, seeds)) => (Some(user_info), seeds),
            None => (None, authority),
        };

        let (username, password) = match user_info {
            Some(user_info) => {
                // username without password is not accepted
                let (username, password) = user_info.split_once(':')?;
                (
                    (!username.is_empty()).then(|| username.to_owned()),
                    Some(password.to_owned()),
                )
            }
            None => (None, None),
        };

        let sentinels = seeds
            .split(',')
            .map(Self::parse_seed)
            .collect::<Option<Vec<_>>>()?;

        let mut config = Config {
            master_name,
            sentinels,
            username,
            password,
            ..Default::default()
        };

        for pair in query.unwrap_or_default().split('&') {
            if pair.is_empty() {
                continue;
            }

            let (key, value) = pair.split_once('=')?;
            config.apply_parameter(key, value);
        }

        Some(config)
    }

    /// Parse one seed in `host[:port]` form; IPv6 literals use brackets.
    fn parse_seed(str: &str) -> Option<(String, u16)> {
        if let Some((host, port)) = split_host_port(str) {
            return Some((host.to_owned(), port));
        }

        if str.is_empty() || str.contains(':') {
            return None;
        }

        Some((str.to_owned(), DEFAULT_SENTINEL_PORT))
    }

    /// Apply one query parameter; unknown keys and unparsable values
    /// are ignored, later occurrences win.
    fn apply_parameter(&mut self, key: &str, value: &str) {
        match key {
            "scan_interval" => {
                if let Ok(millis) = value.parse() {
                    self.scan_interval = Duration::from_millis(millis);
                }
            }
            "dns_interval" => {
                if let Ok(millis) = value.parse::<i64>() {
                    self.dns_interval = if millis < 0 {
                        None
                    } else {
                        Some(Duration::from_millis(millis as u64))
                    };
                }
            }
            "connect_timeout" => {
                if let Ok(millis) = value.parse() {
                    self.connect_timeout = Duration::from_millis(millis);
                }
            }
            "command_timeout" => {
                if let Ok(millis) = value.parse() {
                    self.command_timeout = Duration::from_millis(millis);
                }
            }
            "check_sentinels_list" => {
                if let Ok(flag) = value.parse() {
                    self.check_sentinels_list = flag;
                }
            }
            "sentinels_discovery" => {
                if let Ok(flag) = value.parse() {
                    self.sentinels_discovery = flag;
                }
            }
            "check_sync" => {
                if let Ok(flag) = value.parse() {
                    self.check_sync = flag;
                }
            }
            "skip_replicas_init" => {
                if let Ok(flag) = value.parse() {
                    self.skip_replicas_init = flag;
                }
            }
            "read_mode" => {
                if let Ok(read_mode) = value.parse() {
                    self.read_mode = read_mode;
                }
            }
            "sentinel_username" => self.sentinel_username = Some(value.to_owned()),
            "sentinel_password" => self.sentinel_password = Some(value.to_owned()),
            "connection_name" => self.connection_name = value.to_owned(),
            "keep_alive" => {
                if let Ok(millis) = value.parse() {
                    self.keep_alive = Some(Duration::from_millis(millis));
                }
            }
            "no_delay" => {
                if let Ok(flag) = value.parse() {
                    self.no_delay = flag;
                }
            }
            _ => (),
        }
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("redis+sentinel://")?;

        if let Some(username) = &self.username {
            f.write_str(username)?;
        }

        if let Some(password) = &self.password {
            f.write_fmt(format_args!(":{password}@"))?;
        }

        for (index, (host, port)) in self.sentinels.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_fmt(format_args!("{host}:{port}"))?;
        }

        f.write_fmt(format_args!("/{}", self.master_name))?;

        let mut separator = '?';
        let mut param = |f: &mut Formatter<'_>, key: &str, value: &dyn Display| {
            let result = f.write_fmt(format_args!("{separator}{key}={value}"));
            separator = '&';
            result
        };

        if self.scan_interval != Duration::from_millis(DEFAULT_SCAN_INTERVAL) {
            param(f, "scan_interval", &self.scan_interval.as_millis())?;
        }

        match self.dns_interval {
            None => param(f, "dns_interval", &-1)?,
            Some(interval) if interval != Duration::from_millis(DEFAULT_DNS_INTERVAL as u64) => {
                param(f, "dns_interval", &interval.as_millis())?;
            }
            _ => (),
        }

        if self.connect_timeout != Duration::from_millis(DEFAULT_CONNECT_TIMEOUT) {
            param(f, "connect_timeout", &self.connect_timeout.as_millis())?;
        }

        if self.command_timeout != Duration::from_millis(DEFAULT_COMMAND_TIMEOUT) {
            param(f, "command_timeout", &self.command_timeout.as_millis())?;
        }

        if self.check_sentinels_list != DEFAULT_CHECK_SENTINELS_LIST {
            param(f, "check_sentinels_list", &self.check_sentinels_list)?;
        }

        if self.sentinels_discovery != DEFAULT_SENTINELS_DISCOVERY {
            param(f, "sentinels_discovery", &self.sentinels_discovery)?;
        }

        if self.check_sync != DEFAULT_CHECK_SYNC {
            param(f, "check_sync", &self.check_sync)?;
        }

        if self.skip_replicas_init != DEFAULT_SKIP_REPLICAS_INIT {
            param(f, "skip_replicas_init", &self.skip_replicas_init)?;
        }

        if self.read_mode != ReadMode::default() {
            param(f, "read_mode", &self.read_mode.as_str())?;
        }

        if let Some(sentinel_username) = &self.sentinel_username {
            param(f, "sentinel_username", sentinel_username)?;
        }

        if let Some(sentinel_password) = &self.sentinel_password {
            param(f, "sentinel_password", sentinel_password)?;
        }

        if !self.connection_name.is_empty() {
            param(f, "connection_name", &self.connection_name)?;
        }

        if let Some(keep_alive) = self.keep_alive {
            param(f, "keep_alive", &keep_alive.as_millis())?;
        }

        if self.no_delay != DEFAULT_NO_DELAY {
            param(f, "no_delay", &self.no_delay)?;
        }

        Ok(())
    }
}

/// Types which can be used to build a [`Config`]
pub trait IntoConfig {
    fn into_config(self) -> Result<Config>;
}

impl IntoConfig for &str {
    fn into_config(self) -> Result<Config> {
        self.parse()
    }
}

impl IntoConfig for String {
    fn into_config(self) -> Result<Config> {
        self.parse()
    }
}

impl IntoConfig for Url {
    fn into_config(self) -> Result<Config> {
        Config::from_uri(self)
    }
}

impl IntoConfig for Config {
    fn into_config(self) -> Result<Config> {
        Ok(self)
    }
}
