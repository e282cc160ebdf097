use super::error::CacheResult;
use crate::core::GraphKey;
use crate::storage::CoordinationStore;
use std::sync::Arc;
use tracing::info;

/// Marks cached reachability data stale by advancing version counters.
///
/// Entries are not touched: an entry stamped with an older version simply
/// reads as not initialized until the next fill overwrites it, and its TTL
/// eventually collects it.
#[derive(Clone)]
pub struct Invalidator {
    store: Arc<dyn CoordinationStore>,
}

impl Invalidator {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Invalidates one graph view. Returns the new version.
    pub async fn invalidate(&self, graph_key: &GraphKey) -> CacheResult<u64> {
        let version = self.store.bump_version(graph_key).await?;
        info!(%graph_key, version, "Invalidated reachability cache");
        Ok(version)
    }

    /// Invalidates every graph view the store has seen, e.g. after the flow
    /// graph itself changed. Returns how many keys were bumped.
    pub async fn invalidate_all(&self) -> CacheResult<usize> {
        let keys = self.store.known_graph_keys().await?;
        for graph_key in &keys {
            self.store.bump_version(graph_key).await?;
        }
        info!(keys = keys.len(), "Invalidated all reachability caches");
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryCoordinationStore;

    #[tokio::test]
    async fn test_invalidate_all_bumps_every_known_key() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let invalidator = Invalidator::new(store.clone());

        let a = GraphKey::from("a");
        let b = GraphKey::from("b");
        invalidator.invalidate(&a).await.unwrap();
        invalidator.invalidate(&b).await.unwrap();
        invalidator.invalidate(&b).await.unwrap();

        assert_eq!(invalidator.invalidate_all().await.unwrap(), 2);
        assert_eq!(store.current_version(&a).await.unwrap(), 2);
        assert_eq!(store.current_version(&b).await.unwrap(), 3);
    }
}
