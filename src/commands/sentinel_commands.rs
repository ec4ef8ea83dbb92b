use crate::{
    Error, Future, Result,
    resp::{Command, Value, cmd},
};
use std::collections::HashMap;

/// A group of Redis commands related to [Sentinel](https://redis.io/docs/management/sentinel/),
/// issued over an abstract transport.
///
/// The only required method is [`send`](SentinelCommands::send); the typed
/// commands are provided on top of it, so any transport (or any test double
/// producing raw [`Value`] replies) gets the same parsing.
///
/// Methods take `&self` so several queries can be dispatched concurrently
/// on one client; implementations serialize the exchanges internally.
///
/// # See Also
/// [Sentinel Commands](https://redis.io/docs/management/sentinel/#sentinel-commands)
pub trait SentinelCommands: Send + Sync {
    /// Send a raw command and return the server reply.
    ///
    /// Error replies are surfaced as [`Error::Redis`].
    fn send(&self, command: Command) -> Future<'_, Value>;

    /// Release the underlying transport.
    fn close(&self) -> Future<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    /// Ping the instance, verifying both liveness and authentication.
    fn ping(&self) -> Future<'_, ()> {
        Box::pin(async move {
            self.send(cmd("PING")).await?;
            Ok(())
        })
    }

    /// Return the ip and port number of the master with that name.
    ///
    /// If a failover is in progress or terminated successfully for this master,
    /// it returns the address and port of the promoted replica.
    ///
    /// # Return
    /// * `None` if sentinel does not know this master
    /// * A tuple made up of
    ///     * The IP of the master
    ///     * The port of the master
    fn sentinel_get_master_addr_by_name<'a>(
        &'a self,
        master_name: &'a str,
    ) -> Future<'a, Option<(String, u16)>> {
        Box::pin(async move {
            let value = self
                .send(
                    cmd("SENTINEL")
                        .arg("GET-MASTER-ADDR-BY-NAME")
                        .arg(master_name),
                )
                .await?;

            if value.is_nil() {
                return Ok(None);
            }

            let values = value.into_array()?;
            let mut iter = values.into_iter();

            match (iter.next(), iter.next(), iter.next()) {
                (Some(host), Some(port), None) => {
                    let host = host.into_string()?;
                    let port = port.into_string()?.parse::<u16>()?;
                    Ok(Some((host, port)))
                }
                _ => Err(Error::Client(
                    "Unexpected `SENTINEL GET-MASTER-ADDR-BY-NAME` reply".to_owned(),
                )),
            }
        })
    }

    /// Show a list of replicas for this master, and their state.
    fn sentinel_slaves<'a>(&'a self, master_name: &'a str) -> Future<'a, Vec<ReplicaInfo>> {
        Box::pin(async move {
            let value = self
                .send(cmd("SENTINEL").arg("SLAVES").arg(master_name))
                .await?;

            value
                .into_array()?
                .into_iter()
                .map(ReplicaInfo::try_from)
                .collect()
        })
    }

    /// Show a list of sentinel instances for this master, and their state.
    fn sentinel_sentinels<'a>(&'a self, master_name: &'a str) -> Future<'a, Vec<SentinelInfo>> {
        Box::pin(async move {
            let value = self
                .send(cmd("SENTINEL").arg("SENTINELS").arg(master_name))
                .await?;

            value
                .into_array()?
                .into_iter()
                .map(SentinelInfo::try_from)
                .collect()
        })
    }
}

/// Result entry for the [`sentinel_slaves`](SentinelCommands::sentinel_slaves) command.
#[derive(Debug, Clone, Default)]
pub struct ReplicaInfo {
    pub ip: String,
    pub port: u16,
    pub flags: String,
    pub master_link_status: String,
    pub master_host: String,
    pub master_port: u16,
}

impl ReplicaInfo {
    pub fn is_down(&self, check_sync: bool) -> bool {
        is_replica_down(&self.flags, &self.master_link_status, check_sync)
    }
}

impl TryFrom<Value> for ReplicaInfo {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let mut map = value.into_field_map()?;

        Ok(Self {
            ip: required_field(&mut map, "ip")?,
            port: required_field(&mut map, "port")?.parse::<u16>()?,
            flags: map.remove("flags").unwrap_or_default(),
            master_link_status: map.remove("master-link-status").unwrap_or_default(),
            master_host: map.remove("master-host").unwrap_or_default(),
            master_port: match map.remove("master-port") {
                Some(port) => port.parse::<u16>()?,
                None => 0,
            },
        })
    }
}

/// Result entry for the [`sentinel_sentinels`](SentinelCommands::sentinel_sentinels) command.
#[derive(Debug, Clone, Default)]
pub struct SentinelInfo {
    pub ip: String,
    pub port: u16,
    pub flags: String,
    pub master_link_status: String,
}

impl SentinelInfo {
    pub fn is_down(&self) -> bool {
        is_replica_down(&self.flags, &self.master_link_status, false)
    }
}

impl TryFrom<Value> for SentinelInfo {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let mut map = value.into_field_map()?;

        Ok(Self {
            ip: map.remove("ip").unwrap_or_default(),
            port: match map.remove("port") {
                Some(port) => port.parse::<u16>()?,
                None => 0,
            },
            flags: map.remove("flags").unwrap_or_default(),
            master_link_status: map.remove("master-link-status").unwrap_or_default(),
        })
    }
}

/// The rule deciding whether a Sentinel-reported node is unusable.
///
/// A node is down iff its `flags` contain `s_down` or `disconnected`.
/// With `check_sync` enabled, a non-empty `master-link-status` containing
/// `err` also marks it down.
pub fn is_replica_down(flags: &str, master_link_status: &str, check_sync: bool) -> bool {
    flags.contains("s_down")
        || flags.contains("disconnected")
        || (check_sync && !master_link_status.is_empty() && master_link_status.contains("err"))
}

fn required_field(map: &mut HashMap<String, String>, field: &str) -> Result<String> {
    map.remove(field)
        .ok_or_else(|| Error::Client(format!("Missing field `{field}` in Sentinel reply")))
}
