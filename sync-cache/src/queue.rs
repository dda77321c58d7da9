//! The queued-mutation buffer.
//!
//! A state-changing request that failed for lack of connectivity is
//! serialized here and replayed once connectivity returns. Entries live in
//! the runtime region under a reserved key prefix, keyed by a monotonic id
//! so replay order matches enqueue order. Delivery is at-least-once: an
//! entry is deleted only after a replay obtains a response, and a replay
//! whose success the client never observes can deliver twice.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::region::{CacheError, RegionStore, StoredResponse};

/// Reserved key prefix separating queue entries from cached responses in
/// the shared region.
pub const QUEUE_KEY_PREFIX: &str = "/__queue__/";

/// One deferred state-changing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Monotonic enqueue id; replay goes in ascending order.
    pub id: u64,
    /// The original destination URL, re-invoked verbatim on replay.
    pub url: String,
    /// The original form fields, re-sent urlencoded on replay.
    pub payload: BTreeMap<String, String>,
}

/// Durable FIFO of deferred mutations over a cache region.
pub struct MutationQueue<R> {
    store: Arc<R>,
    region: String,
}

impl<R: RegionStore> MutationQueue<R> {
    /// Create a queue backed by the given region.
    pub fn new(store: Arc<R>, region: String) -> Self {
        Self { store, region }
    }

    /// Persist a new mutation; returns its id.
    pub async fn enqueue(
        &self,
        url: &str,
        payload: BTreeMap<String, String>,
    ) -> Result<u64, CacheError> {
        let id = self.next_id().await?;
        let mutation = QueuedMutation {
            id,
            url: url.to_string(),
            payload,
        };
        let body = serde_json::to_vec(&mutation).map_err(|e| CacheError::Corrupt {
            key: key_for(id),
            reason: format!("unserializable mutation: {}", e),
        })?;

        self.store
            .put(
                &self.region,
                &key_for(id),
                &StoredResponse::new(200, Some("application/json"), body),
            )
            .await?;

        Ok(id)
    }

    /// All queued mutations, ascending id order.
    pub async fn entries(&self) -> Result<Vec<QueuedMutation>, CacheError> {
        let mut keys: Vec<String> = self
            .store
            .keys(&self.region)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(QUEUE_KEY_PREFIX))
            .collect();
        // Zero-padded ids make lexicographic order numeric.
        keys.sort();

        let mut mutations = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(entry) = self.store.get(&self.region, &key).await? else {
                continue; // deleted between keys() and get()
            };
            let mutation: QueuedMutation =
                serde_json::from_slice(&entry.body).map_err(|e| CacheError::Corrupt {
                    key: key.clone(),
                    reason: format!("unparseable mutation: {}", e),
                })?;
            mutations.push(mutation);
        }

        Ok(mutations)
    }

    /// Delete a mutation after successful replay.
    pub async fn remove(&self, id: u64) -> Result<bool, CacheError> {
        self.store.delete(&self.region, &key_for(id)).await
    }

    /// Number of queued mutations.
    pub async fn len(&self) -> Result<usize, CacheError> {
        Ok(self
            .store
            .keys(&self.region)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(QUEUE_KEY_PREFIX))
            .count())
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// One past the highest id currently persisted.
    ///
    /// Derived from the stored keys rather than an in-memory counter, so
    /// monotonicity survives a restart of the hosting context.
    async fn next_id(&self) -> Result<u64, CacheError> {
        let max = self
            .store
            .keys(&self.region)
            .await?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(QUEUE_KEY_PREFIX)
                    .and_then(|id| id.parse::<u64>().ok())
            })
            .max();

        Ok(max.map(|m| m + 1).unwrap_or(1))
    }
}

fn key_for(id: u64) -> String {
    format!("{}{:020}", QUEUE_KEY_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::MemoryRegionStore;

    fn form(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn queue() -> MutationQueue<MemoryRegionStore> {
        MutationQueue::new(Arc::new(MemoryRegionStore::new()), "runtime-v1".to_string())
    }

    #[tokio::test]
    async fn enqueue_assigns_ascending_ids() {
        let queue = queue();

        let a = queue.enqueue("/save/1", form(&[])).await.unwrap();
        let b = queue.enqueue("/save/2", form(&[])).await.unwrap();
        let c = queue.enqueue("/save/3", form(&[])).await.unwrap();

        assert!(a < b && b < c);
        assert_eq!(queue.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn entries_come_back_in_enqueue_order() {
        let queue = queue();

        queue
            .enqueue("/first", form(&[("k", "1")]))
            .await
            .unwrap();
        queue
            .enqueue("/second", form(&[("k", "2")]))
            .await
            .unwrap();

        let entries = queue.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "/first");
        assert_eq!(entries[0].payload["k"], "1");
        assert_eq!(entries[1].url, "/second");
    }

    #[tokio::test]
    async fn remove_deletes_one_entry() {
        let queue = queue();

        let id = queue.enqueue("/save", form(&[])).await.unwrap();
        assert!(!queue.is_empty().await.unwrap());

        assert!(queue.remove(id).await.unwrap());
        assert!(queue.is_empty().await.unwrap());

        // Second remove is a miss.
        assert!(!queue.remove(id).await.unwrap());
    }

    #[tokio::test]
    async fn ids_stay_monotonic_after_drain() {
        let queue = queue();

        let a = queue.enqueue("/one", form(&[])).await.unwrap();
        let b = queue.enqueue("/two", form(&[])).await.unwrap();
        queue.remove(a).await.unwrap();

        // The next id must not reuse the drained one while b is live.
        let c = queue.enqueue("/three", form(&[])).await.unwrap();
        assert!(c > b);
    }

    #[tokio::test]
    async fn queue_keys_do_not_collide_with_cached_responses() {
        let store = Arc::new(MemoryRegionStore::new());
        let queue = MutationQueue::new(Arc::clone(&store), "runtime-v1".to_string());

        // A cached API response shares the region with the queue.
        store
            .put(
                "runtime-v1",
                "/api/students/",
                &StoredResponse::new(200, Some("application/json"), b"[]".to_vec()),
            )
            .await
            .unwrap();
        queue.enqueue("/save", form(&[])).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 1);
        let entries = queue.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "/save");
    }
}
