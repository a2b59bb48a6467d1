//! Connection-pool identity for watch traffic.
//!
//! Watch connections stay open indefinitely. Sharing a pool with short-lived
//! request traffic starves those requests of connections, so every watch
//! client lives in its own registry keyed by cluster and transport scheme.
//!
//! The cluster is part of the key because TLS material (extra roots, client
//! identity) is baked into each `reqwest::Client`. Two clusters over `https`
//! cannot share one client without sharing trust settings, so within one
//! cluster the scheme alone decides the pool.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use reqwest::Url;

use crate::errors::WatchError;

static WATCH_CLIENTS: Lazy<ClientRegistry> = Lazy::new(ClientRegistry::default);

/// Transport scheme of a watch endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `http`
    Plain,
    /// `https`
    Encrypted,
}

impl Scheme {
    pub fn from_url(url: &Url) -> Result<Self, WatchError> {
        match url.scheme() {
            "http" => Ok(Self::Plain),
            "https" => Ok(Self::Encrypted),
            other => Err(WatchError::config(format!(
                "unsupported url scheme {other:?} (expected http or https)"
            ))),
        }
    }
}

/// Pool identity shared by all watch sessions to one cluster over one scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub cluster: String,
    pub scheme: Scheme,
}

/// Process-wide map from pool identity to a pooled HTTP client.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<PoolKey, reqwest::Client>,
}

impl ClientRegistry {
    /// Registry used by `ReqwestTransport`.
    pub fn global() -> &'static ClientRegistry {
        &WATCH_CLIENTS
    }

    /// Returns the client for `key`, building it on first use.
    ///
    /// Settings passed to later `build` calls for the same key are ignored.
    pub fn client_for<F>(&self, key: &PoolKey, build: F) -> Result<reqwest::Client, WatchError>
    where
        F: FnOnce() -> Result<reqwest::Client, WatchError>,
    {
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }
        match self.clients.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let client = build()?;
                entry.insert(client.clone());
                Ok(client)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
