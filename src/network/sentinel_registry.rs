use crate::{address::RedisUri, commands::SentinelCommands};
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A registered Sentinel: its IP-form URI, the hostname it was declared
/// with (if any), and a cached client connection.
pub(crate) struct SentinelHandle {
    uri: RedisUri,
    declared_host: Option<String>,
    client: Mutex<Option<Box<dyn SentinelCommands>>>,
}

impl SentinelHandle {
    pub fn new(
        uri: RedisUri,
        declared_host: Option<String>,
        client: Box<dyn SentinelCommands>,
    ) -> Self {
        Self {
            uri,
            declared_host,
            client: Mutex::new(Some(client)),
        }
    }

    pub fn uri(&self) -> &RedisUri {
        &self.uri
    }

    #[allow(dead_code)]
    pub fn declared_host(&self) -> Option<&str> {
        self.declared_host.as_deref()
    }

    /// Take the cached client out of the handle, leaving it empty.
    pub async fn take_client(&self) -> Option<Box<dyn SentinelCommands>> {
        self.client.lock().await.take()
    }

    /// Put a healthy client back for the next tick.
    pub async fn restore_client(&self, client: Box<dyn SentinelCommands>) {
        *self.client.lock().await = Some(client);
    }

    /// Close the cached client, if any.
    pub async fn close(&self) {
        if let Some(client) = self.take_client().await {
            let _ = client.close().await;
        }
    }
}

/// Thread-safe map of Sentinel URI to client handle.
///
/// At most one entry exists per URI; inserts use compare-and-set semantics
/// so concurrent discovery from two Sentinels cannot create duplicates.
pub(crate) struct SentinelRegistry {
    sentinels: DashMap<RedisUri, Arc<SentinelHandle>>,
}

impl SentinelRegistry {
    pub fn new() -> Self {
        Self {
            sentinels: DashMap::new(),
        }
    }

    /// Insert `handle` only if its URI is absent.
    ///
    /// The caller must have PING-verified the client beforehand.
    /// Returns whether the insert occurred.
    pub fn try_register(&self, handle: Arc<SentinelHandle>) -> bool {
        match self.sentinels.entry(handle.uri().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
        }
    }

    pub fn contains(&self, uri: &RedisUri) -> bool {
        self.sentinels.contains_key(uri)
    }

    /// Remove and return the handle, if present.
    /// The caller is responsible for shutting the client down.
    pub fn remove(&self, uri: &RedisUri) -> Option<Arc<SentinelHandle>> {
        self.sentinels.remove(uri).map(|(_, handle)| handle)
    }

    /// A stable list of the registered handles, for shuffled iteration.
    pub fn snapshot(&self) -> Vec<Arc<SentinelHandle>> {
        self.sentinels
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn uris(&self) -> Vec<RedisUri> {
        self.sentinels.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove every handle, returning them for shutdown.
    pub fn drain(&self) -> Vec<Arc<SentinelHandle>> {
        let uris = self.uris();
        uris.iter().filter_map(|uri| self.remove(uri)).collect()
    }

    pub fn len(&self) -> usize {
        self.sentinels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentinels.is_empty()
    }
}
