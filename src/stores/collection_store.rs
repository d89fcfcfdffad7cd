//! Per-domain cache of collection metadata and statistics

use crate::api::types::{Collection, CollectionStats, DomainConfig};
use crate::api::{CollectionApi, Domain};
use crate::error::Result;
use crate::services::notifier::{Notice, Notifier};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default staleness window of the collection list
pub const DEFAULT_COLLECTIONS_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct CollectionsCache {
    items: Vec<Collection>,
    fetched_at: Option<Instant>,
}

pub struct CollectionStore {
    api: Arc<dyn CollectionApi>,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
    collections: RwLock<CollectionsCache>,
    stats: DashMap<String, CollectionStats>,
    loading_collections: AtomicBool,
    loading_stats: DashSet<String>,
    companies: RwLock<Vec<String>>,
    domain_config: RwLock<Option<DomainConfig>>,
}

impl CollectionStore {
    pub fn new(api: Arc<dyn CollectionApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_ttl(api, notifier, DEFAULT_COLLECTIONS_TTL)
    }

    pub fn with_ttl(api: Arc<dyn CollectionApi>, notifier: Arc<dyn Notifier>, ttl: Duration) -> Self {
        Self {
            api,
            notifier,
            ttl,
            collections: RwLock::new(CollectionsCache::default()),
            stats: DashMap::new(),
            loading_collections: AtomicBool::new(false),
            loading_stats: DashSet::new(),
            companies: RwLock::new(Vec::new()),
            domain_config: RwLock::new(None),
        }
    }

    pub fn domain(&self) -> Domain {
        self.api.domain()
    }

    pub fn api(&self) -> Arc<dyn CollectionApi> {
        self.api.clone()
    }

    /// Whether the cached list is missing or older than the staleness window
    pub fn should_refresh_collections(&self) -> bool {
        match self.collections.read().fetched_at {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        }
    }

    /// Collection list, refetched when empty, stale or forced.
    ///
    /// A failed fetch is reported to the notifier and the previous list is
    /// returned.
    pub async fn load_collections(&self, force: bool) -> Vec<Collection> {
        match self.try_load_collections(force).await {
            Ok(collections) => collections,
            Err(e) => {
                self.notifier.notify(Notice::operation_failed(self.domain(), &e));
                self.collections()
            }
        }
    }

    /// Same as `load_collections` but hands the error back to the caller
    pub async fn try_load_collections(&self, force: bool) -> Result<Vec<Collection>> {
        {
            let cache = self.collections.read();
            if !force && !cache.items.is_empty() && !self.is_stale(&cache) {
                debug!("{} collections served from cache", self.domain());
                return Ok(cache.items.clone());
            }
        }

        info!("CollectionStore::load_collections {} force={}", self.domain(), force);
        self.loading_collections.store(true, Ordering::SeqCst);
        let result = self.api.list_collections().await;
        self.loading_collections.store(false, Ordering::SeqCst);

        let items = result?;
        let mut cache = self.collections.write();
        cache.items = items.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(items)
    }

    fn is_stale(&self, cache: &CollectionsCache) -> bool {
        cache.fetched_at.map_or(true, |at| at.elapsed() > self.ttl)
    }

    /// Statistics of one collection, cached until forced or cleared
    pub async fn load_collection_stats(&self, name: &str, force: bool) -> Option<CollectionStats> {
        match self.try_load_collection_stats(name, force).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                self.notifier.notify(Notice::operation_failed(self.domain(), &e));
                None
            }
        }
    }

    pub async fn try_load_collection_stats(&self, name: &str, force: bool) -> Result<CollectionStats> {
        if !force {
            if let Some(stats) = self.stats.get(name) {
                return Ok(stats.clone());
            }
        }

        self.loading_stats.insert(name.to_string());
        let result = self.api.collection_stats(name).await;
        self.loading_stats.remove(name);

        let stats = result?;
        self.stats.insert(name.to_string(), stats.clone());
        Ok(stats)
    }

    /// Fund company names, fetched once until forced or cleared.
    ///
    /// A failed fetch is reported to the notifier and the previous list is
    /// returned.
    pub async fn load_companies(&self, force: bool) -> Vec<String> {
        match self.try_load_companies(force).await {
            Ok(companies) => companies,
            Err(e) => {
                self.notifier.notify(Notice::operation_failed(self.domain(), &e));
                self.companies.read().clone()
            }
        }
    }

    pub async fn try_load_companies(&self, force: bool) -> Result<Vec<String>> {
        {
            let companies = self.companies.read();
            if !force && !companies.is_empty() {
                return Ok(companies.clone());
            }
        }

        let companies = self.api.fund_companies().await?;
        debug!("{} fund companies loaded", companies.len());
        *self.companies.write() = companies.clone();
        Ok(companies)
    }

    /// Domain settings, fetched once until forced or cleared
    pub async fn load_config(&self, force: bool) -> Option<DomainConfig> {
        match self.try_load_config(force).await {
            Ok(config) => Some(config),
            Err(e) => {
                self.notifier.notify(Notice::operation_failed(self.domain(), &e));
                self.domain_config.read().clone()
            }
        }
    }

    pub async fn try_load_config(&self, force: bool) -> Result<DomainConfig> {
        if !force {
            if let Some(config) = self.domain_config.read().clone() {
                return Ok(config);
            }
        }

        let config = self.api.domain_config().await?;
        *self.domain_config.write() = Some(config.clone());
        Ok(config)
    }

    /// Cached default provider key, empty until the settings are loaded
    pub fn default_api_key(&self) -> String {
        self.domain_config
            .read()
            .as_ref()
            .map(|c| c.default_api_key.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the cached collection list
    pub fn collections(&self) -> Vec<Collection> {
        self.collections.read().items.clone()
    }

    pub fn collection_by_name(&self, name: &str) -> Option<Collection> {
        self.collections
            .read()
            .items
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Display name of a collection, falling back to its name
    pub fn display_name(&self, name: &str) -> String {
        self.collection_by_name(name)
            .map(|c| c.display_name)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| name.to_string())
    }

    pub fn cached_stats(&self, name: &str) -> Option<CollectionStats> {
        self.stats.get(name).map(|s| s.clone())
    }

    /// Drop cached statistics of one collection, or of all with `None`
    pub fn clear_collection_stats(&self, name: Option<&str>) {
        match name {
            Some(name) => {
                self.stats.remove(name);
                self.loading_stats.remove(name);
            }
            None => {
                self.stats.clear();
                self.loading_stats.clear();
            }
        }
    }

    pub fn clear_cache(&self) {
        *self.collections.write() = CollectionsCache::default();
        self.clear_collection_stats(None);
        self.companies.write().clear();
        *self.domain_config.write() = None;
    }

    pub fn is_loading_collections(&self) -> bool {
        self.loading_collections.load(Ordering::SeqCst)
    }

    pub fn is_loading_stats(&self, name: &str) -> bool {
        self.loading_stats.contains(name)
    }
}
