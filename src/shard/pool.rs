// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The shard fleet as one value.
//!
//! A [`ShardSet`] owns the per-shard store handles and the router that
//! picks between them. It is built once at startup from the registry
//! snapshot and shared immutably; the stores' internal pools carry all
//! the concurrency bookkeeping.

use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

use super::postgres::PgShardStore;
use super::traits::{ShardError, ShardStore};
use crate::registry::ShardRegistry;
use crate::router::Router;

#[derive(Clone)]
pub struct ShardSet {
    stores: Vec<Arc<dyn ShardStore>>,
    router: Router,
}

impl ShardSet {
    /// Assemble a fleet from store handles; index position is shard id.
    ///
    /// # Panics
    ///
    /// Panics on an empty store list (the registry rejects that first).
    #[must_use]
    pub fn new(stores: Vec<Arc<dyn ShardStore>>) -> Self {
        let router = Router::new(stores.len() as u32);
        Self { stores, router }
    }

    /// Connect every shard in the registry snapshot.
    ///
    /// Shards connect sequentially so a misconfigured fleet fails with
    /// the first offender named in the error.
    pub async fn connect(
        registry: &ShardRegistry,
        max_connections_per_shard: u32,
    ) -> Result<Self, ShardError> {
        let mut stores: Vec<Arc<dyn ShardStore>> = Vec::with_capacity(registry.len());
        for descriptor in registry.descriptors() {
            let store = PgShardStore::connect(descriptor, max_connections_per_shard).await?;
            stores.push(Arc::new(store));
        }
        Ok(Self::new(stores))
    }

    /// The routing rule bound to this fleet's size.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router
    }

    /// Number of shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// The shard owning a routing key, with its id.
    #[must_use]
    pub fn owner(&self, key: &str) -> (u32, &Arc<dyn ShardStore>) {
        let shard_id = self.router.route(key);
        (shard_id, &self.stores[shard_id as usize])
    }

    /// Store handle for a shard id.
    #[must_use]
    pub fn get(&self, shard_id: u32) -> Option<&Arc<dyn ShardStore>> {
        self.stores.get(shard_id as usize)
    }

    /// All shards with their ids, for scatter fan-out.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Arc<dyn ShardStore>)> {
        self.stores
            .iter()
            .enumerate()
            .map(|(id, store)| (id as u32, store))
    }

    /// Ping every shard in parallel; returns `(healthy, total)`.
    pub async fn ping_all(&self) -> (usize, usize) {
        let probes = self.iter().map(|(shard_id, store)| async move {
            match store.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(shard_id, error = %e, "Unhealthy shard");
                    false
                }
            }
        });
        let results = join_all(probes).await;
        let healthy = results.iter().filter(|ok| **ok).count();
        (healthy, results.len())
    }
}
