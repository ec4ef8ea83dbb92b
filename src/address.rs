use crate::{Error, Result};
use std::{
    fmt::{self, Display, Formatter},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

/// URI scheme of a Redis endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    #[default]
    Redis,
    Rediss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Redis => "redis",
            Scheme::Rediss => "rediss",
        }
    }
}

/// Classification of the host part of a [`RedisUri`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Ipv4,
    Ipv6,
    Hostname,
}

/// Address of a Redis or Sentinel endpoint.
///
/// Two URIs are equal iff their scheme, host and port are byte-equal.
/// IPv6 hosts are normalized to their canonical compressed form at
/// construction, so `[2001:db8::1]:6379` and `[2001:0db8:0000::1]:6379`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedisUri {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl RedisUri {
    pub fn new(scheme: Scheme, host: &str, port: u16) -> Self {
        let host = match parse_ipv6(host) {
            Some(addr) => addr.to_string(),
            None => host.to_owned(),
        };

        Self { scheme, host, port }
    }

    pub fn from_addr(scheme: Scheme, addr: SocketAddr) -> Self {
        Self::new(scheme, &addr.ip().to_string(), addr.port())
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host_kind(&self) -> HostKind {
        if self.host.parse::<Ipv4Addr>().is_ok() {
            HostKind::Ipv4
        } else if parse_ipv6(&self.host).is_some() {
            HostKind::Ipv6
        } else {
            HostKind::Hostname
        }
    }

    /// `true` if the host is a literal IPv4 or IPv6 address.
    pub fn is_ip_literal(&self) -> bool {
        self.host_kind() != HostKind::Hostname
    }

    /// `true` if the host names the local machine by convention.
    pub fn is_localhost(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
    }

    /// Same scheme and port, host replaced by a resolved IP address.
    pub fn with_ip(&self, ip: IpAddr) -> Self {
        Self::new(self.scheme, &ip.to_string(), self.port)
    }

    /// The socket address of this URI, if the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip = if let Ok(v4) = self.host.parse::<Ipv4Addr>() {
            IpAddr::V4(v4)
        } else {
            IpAddr::V6(parse_ipv6(&self.host)?)
        };

        Some(SocketAddr::new(ip, self.port))
    }
}

impl Display for RedisUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.host_kind() == HostKind::Ipv6 {
            f.write_fmt(format_args!(
                "{}://[{}]:{}",
                self.scheme.as_str(),
                self.host,
                self.port
            ))
        } else {
            f.write_fmt(format_args!(
                "{}://{}:{}",
                self.scheme.as_str(),
                self.host,
                self.port
            ))
        }
    }
}

impl FromStr for RedisUri {
    type Err = Error;

    /// Parse an URI in the format `scheme://host:port`,
    /// with IPv6 hosts enclosed in brackets.
    fn from_str(str: &str) -> Result<RedisUri> {
        let (scheme, rest) = str
            .split_once("://")
            .ok_or_else(|| Error::Config(format!("Cannot parse URI from {str}")))?;

        let scheme = match scheme {
            "redis" => Scheme::Redis,
            "rediss" => Scheme::Rediss,
            _ => return Err(Error::Config(format!("Unknown scheme {scheme}"))),
        };

        let (host, port) = split_host_port(rest)
            .ok_or_else(|| Error::Config(format!("Cannot parse URI from {str}")))?;

        Ok(RedisUri::new(scheme, host, port))
    }
}

/// Split `host:port` or `[v6]:port` into its two parts.
pub(crate) fn split_host_port(str: &str) -> Option<(&str, u16)> {
    let (host, port) = if let Some(rest) = str.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        (host, rest.strip_prefix(':')?)
    } else {
        str.rsplit_once(':')?
    };

    if host.is_empty() {
        return None;
    }

    port.parse::<u16>().ok().map(|port| (host, port))
}

/// Parse an IPv6 literal, normalizing through the byte representation.
fn parse_ipv6(host: &str) -> Option<Ipv6Addr> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let addr = host.parse::<Ipv6Addr>().ok()?;
    Some(Ipv6Addr::from(addr.octets()))
}

/// User-supplied URI rewrite applied at every address boundary,
/// typically to undo NAT between the client and the deployment.
#[derive(Clone, Default)]
pub enum NatMapper {
    /// No rewrite
    #[default]
    Identity,
    /// Arbitrary URI to URI transform
    Custom(Arc<dyn Fn(&RedisUri) -> RedisUri + Send + Sync>),
}

impl NatMapper {
    pub fn map(&self, uri: &RedisUri) -> RedisUri {
        match self {
            NatMapper::Identity => uri.clone(),
            NatMapper::Custom(f) => f(uri),
        }
    }
}

impl fmt::Debug for NatMapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NatMapper::Identity => f.write_str("NatMapper::Identity"),
            NatMapper::Custom(_) => f.write_str("NatMapper::Custom"),
        }
    }
}
