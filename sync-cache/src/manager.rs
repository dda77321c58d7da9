//! The cache manager: strategy dispatch over versioned regions.

use std::sync::Arc;

use sync_core::classify::{classify, ResourceClass};

use crate::config::{CacheConfig, RegionKind};
use crate::fetcher::{FetchError, Fetcher, ResourceRequest};
use crate::queue::MutationQueue;
use crate::region::{CacheError, RegionStore, StoredResponse};

/// The resource cache manager.
///
/// Classifies every request and applies the matching strategy against the
/// region that strategy owns. Constructed explicitly with its store and
/// fetcher; the host wires its lifecycle hooks to [`install`], [`activate`],
/// [`handle`] and [`replay`].
///
/// [`install`]: CacheManager::install
/// [`activate`]: CacheManager::activate
/// [`handle`]: CacheManager::handle
/// [`replay`]: CacheManager::replay
pub struct CacheManager<R, F> {
    store: Arc<R>,
    fetcher: Arc<F>,
    config: CacheConfig,
    queue: MutationQueue<R>,
}

impl<R, F> CacheManager<R, F>
where
    R: RegionStore + 'static,
    F: Fetcher + 'static,
{
    /// Create a manager over the given region store and fetcher.
    pub fn new(store: Arc<R>, fetcher: Arc<F>, config: CacheConfig) -> Self {
        let queue = MutationQueue::new(
            Arc::clone(&store),
            config.region_name(RegionKind::Runtime),
        );
        Self {
            store,
            fetcher,
            config,
            queue,
        }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The queued-mutation buffer.
    pub fn queue(&self) -> &MutationQueue<R> {
        &self.queue
    }

    /// Best-effort precache of the shell manifest into the pages region.
    ///
    /// Individual fetch failures are logged and skipped; they never abort
    /// installation. Storage faults do surface.
    pub async fn install(&self) -> Result<(), CacheError> {
        let region = self.config.region_name(RegionKind::Pages);

        for url in &self.config.precache {
            match self.fetcher.fetch(&ResourceRequest::get(url)).await {
                Ok(response) => {
                    self.store.put(&region, url, &response).await?;
                }
                Err(e) => {
                    tracing::warn!("failed to precache {}: {}", url, e);
                }
            }
        }

        tracing::info!("install complete ({} shell urls)", self.config.precache.len());
        Ok(())
    }

    /// Delete every region that is not one of the four current-version
    /// region names. Old regions are never mutated, only dropped whole.
    ///
    /// Returns the number of regions deleted.
    pub async fn activate(&self) -> Result<u64, CacheError> {
        let current = self.config.current_region_names();
        let mut deleted = 0;

        for name in self.store.region_names().await? {
            if !current.contains(&name) {
                self.store.delete_region(&name).await?;
                tracing::info!("deleted stale cache region {}", name);
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Intercept one request: classify, dispatch, respond.
    pub async fn handle(&self, request: &ResourceRequest) -> Result<StoredResponse, CacheError> {
        let meta = request.meta();

        if meta.is_mutating() {
            return self.handle_mutating(request).await;
        }
        if meta.method() != "GET" {
            // Safe non-GET traffic is not cacheable; hand it straight through.
            return Ok(self.fetcher.fetch(request).await?);
        }

        match classify(&meta) {
            ResourceClass::Navigation => self.network_first(request).await,
            ResourceClass::StaticAsset => self.cache_first(request, RegionKind::Static).await,
            ResourceClass::Image => {
                let response = self.cache_first(request, RegionKind::Images).await?;
                self.trim_images().await?;
                Ok(response)
            }
            ResourceClass::Api => self.stale_while_revalidate(request).await,
            ResourceClass::Other => self.cache_first(request, RegionKind::Runtime).await,
        }
    }

    /// Replay queued mutations in enqueue order.
    ///
    /// Each entry is re-issued as a form-encoded POST to its original URL.
    /// Any response at all counts as delivery and deletes the entry; a
    /// fetch failure leaves it queued for the next trigger and is only
    /// logged - replay never propagates delivery errors.
    ///
    /// Returns the number of mutations delivered.
    pub async fn replay(&self) -> Result<u64, CacheError> {
        let mut replayed = 0;

        for mutation in self.queue.entries().await? {
            let request = ResourceRequest::post_form(&mutation.url, mutation.payload.clone());
            match self.fetcher.fetch(&request).await {
                Ok(_) => {
                    self.queue.remove(mutation.id).await?;
                    replayed += 1;
                }
                Err(e) => {
                    tracing::warn!("replay failed for {} (kept queued): {}", mutation.url, e);
                }
            }
        }

        if replayed > 0 {
            tracing::info!("replayed {} queued mutations", replayed);
        }
        Ok(replayed)
    }

    /// Network-first (navigation): try the network and cache the result;
    /// on failure serve the cached exact match, then the offline page.
    async fn network_first(&self, request: &ResourceRequest) -> Result<StoredResponse, CacheError> {
        let region = self.config.region_name(RegionKind::Pages);

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if let Err(e) = self.store.put(&region, &request.url, &response).await {
                    tracing::warn!("failed to cache {}: {}", request.url, e);
                }
                Ok(response)
            }
            Err(e) => {
                tracing::debug!("navigation fetch failed, trying cache: {}", e);
                if let Some(cached) = self.store.get(&region, &request.url).await? {
                    return Ok(cached);
                }
                if let Some(offline) = self.store.get(&region, &self.config.offline_url).await? {
                    return Ok(offline);
                }
                Err(CacheError::Unavailable {
                    url: request.url.clone(),
                })
            }
        }
    }

    /// Cache-first: serve the cached match, otherwise fetch and populate.
    async fn cache_first(
        &self,
        request: &ResourceRequest,
        kind: RegionKind,
    ) -> Result<StoredResponse, CacheError> {
        let region = self.config.region_name(kind);

        if let Some(cached) = self.store.get(&region, &request.url).await? {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request).await?;
        if let Err(e) = self.store.put(&region, &request.url, &response).await {
            tracing::warn!("failed to cache {}: {}", request.url, e);
        }
        Ok(response)
    }

    /// Stale-while-revalidate: serve the cached match immediately and
    /// refresh it in the background; without a cached match, await the
    /// network. A failed refresh silently keeps the stale value.
    async fn stale_while_revalidate(
        &self,
        request: &ResourceRequest,
    ) -> Result<StoredResponse, CacheError> {
        let region = self.config.region_name(RegionKind::Runtime);

        match self.store.get(&region, &request.url).await? {
            Some(cached) => {
                let store = Arc::clone(&self.store);
                let fetcher = Arc::clone(&self.fetcher);
                let request = request.clone();
                let region = region.clone();
                tokio::spawn(async move {
                    match fetcher.fetch(&request).await {
                        Ok(fresh) => {
                            if let Err(e) = store.put(&region, &request.url, &fresh).await {
                                tracing::warn!("failed to refresh {}: {}", request.url, e);
                            }
                        }
                        Err(e) => {
                            tracing::debug!(
                                "refresh failed for {}, keeping stale entry: {}",
                                request.url,
                                e
                            );
                        }
                    }
                });
                Ok(cached)
            }
            None => {
                let response = self.fetcher.fetch(request).await?;
                if let Err(e) = self.store.put(&region, &request.url, &response).await {
                    tracing::warn!("failed to cache {}: {}", request.url, e);
                }
                Ok(response)
            }
        }
    }

    /// Mutating path: network first; a connectivity failure converts into
    /// a queued mutation and an immediate "accepted for later delivery"
    /// response, so the call site is not blocked by the deferral.
    async fn handle_mutating(
        &self,
        request: &ResourceRequest,
    ) -> Result<StoredResponse, CacheError> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(response),
            Err(FetchError::Disconnected(reason)) => {
                let payload = request.form.clone().unwrap_or_default();
                let id = self.queue.enqueue(&request.url, payload).await?;
                tracing::info!(
                    "queued mutation {} for {} ({})",
                    id,
                    request.url,
                    reason
                );
                Ok(StoredResponse::queued())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Trim the image region to its bound, oldest entry first, one
    /// deletion at a time until the bound holds.
    async fn trim_images(&self) -> Result<(), CacheError> {
        let region = self.config.region_name(RegionKind::Images);
        let max = self.config.image_max_entries;

        loop {
            let keys = self.store.keys(&region).await?;
            if keys.len() as u64 <= max {
                return Ok(());
            }
            self.store.delete(&region, &keys[0]).await?;
        }
    }
}
