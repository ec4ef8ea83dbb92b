use crate::{Error, Future, network::lookup_host};
use std::net::SocketAddr;

/// Asynchronous hostname resolution.
///
/// Failures are reported per address and never abort a batch.
pub trait Resolve: Send + Sync {
    /// Resolve `host` to a single address.
    fn resolve_one<'a>(&'a self, host: &'a str, port: u16) -> Future<'a, SocketAddr>;

    /// Resolve `host` to every address it is bound to.
    fn resolve_all<'a>(&'a self, host: &'a str, port: u16) -> Future<'a, Vec<SocketAddr>>;
}

/// Resolver backed by the runtime's DNS machinery.
#[derive(Debug, Default)]
pub struct DnsResolver;

impl Resolve for DnsResolver {
    fn resolve_one<'a>(&'a self, host: &'a str, port: u16) -> Future<'a, SocketAddr> {
        Box::pin(async move {
            lookup_host(host, port)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Client(format!("Unable to resolve hostname {host}")))
        })
    }

    fn resolve_all<'a>(&'a self, host: &'a str, port: u16) -> Future<'a, Vec<SocketAddr>> {
        Box::pin(async move {
            let addrs = lookup_host(host, port).await?;

            if addrs.is_empty() {
                Err(Error::Client(format!("Unable to resolve hostname {host}")))
            } else {
                Ok(addrs)
            }
        })
    }
}
