//! Per-service client cache
//!
//! Clients are built lazily and kept for the lifetime of the wrapper. Nothing
//! is ever evicted; a fresh set of clients needs a fresh wrapper.

use crate::cdp::PlatformClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
pub struct ClientCache {
    clients: Mutex<HashMap<String, Arc<dyn PlatformClient>>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn PlatformClient>> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned()
    }

    /// Store a client unless one is already cached, returning the cached one.
    ///
    /// Two tasks racing on first use both build a client; the first insert wins.
    pub fn insert(&self, service: &str, client: Arc<dyn PlatformClient>) -> Arc<dyn PlatformClient> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(service.to_string())
            .or_insert(client)
            .clone()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(service)
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let mut services: Vec<&String> = clients.keys().collect();
        services.sort();
        f.debug_struct("ClientCache")
            .field("services", &services)
            .finish()
    }
}
