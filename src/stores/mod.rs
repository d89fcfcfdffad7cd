//! Client-side caches, one store per data domain

pub mod collection_store;

pub use collection_store::CollectionStore;

use crate::api::{ApiRegistry, Domain};
use crate::services::notifier::Notifier;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct StoreRegistry {
    stores: HashMap<Domain, Arc<CollectionStore>>,
}

impl StoreRegistry {
    pub fn new(apis: &ApiRegistry, notifier: Arc<dyn Notifier>, ttl: Duration) -> Self {
        let stores = apis
            .list()
            .into_iter()
            .map(|api| {
                let domain = api.domain();
                let store = CollectionStore::with_ttl(api, notifier.clone(), ttl);
                (domain, Arc::new(store))
            })
            .collect();
        Self { stores }
    }

    pub fn get(&self, domain: Domain) -> Option<Arc<CollectionStore>> {
        self.stores.get(&domain).cloned()
    }

    /// Drop every cached list and statistic
    pub fn clear_all(&self) {
        for store in self.stores.values() {
            store.clear_cache();
        }
    }
}
