//! Backend API layer

pub mod client;
pub mod collections;
pub mod domain;
pub mod logs;
pub mod sync;
pub mod types;

pub use client::ApiClient;
pub use collections::HttpCollectionApi;
pub use domain::{Domain, SyncPayloadStyle};

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use types::*;

/// Collection endpoints that every data domain exposes
#[async_trait]
pub trait CollectionApi: Send + Sync {
    /// Domain served by this API
    fn domain(&self) -> Domain;

    /// List all collections of the domain
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Fetch one page of rows
    async fn collection_data(&self, name: &str, query: &CollectionQuery) -> Result<CollectionData>;

    /// Fetch aggregate statistics
    async fn collection_stats(&self, name: &str) -> Result<CollectionStats>;

    /// Fetch the parameters accepted by single and batch updates
    async fn update_config(&self, name: &str) -> Result<CollectionUpdateConfig>;

    /// Start a refresh job
    async fn refresh(&self, name: &str, request: &RefreshRequest) -> Result<RefreshStart>;

    /// Status of a running refresh job
    async fn task_status(&self, name: &str, task_id: &str) -> Result<RefreshTask>;

    /// Import a file into the collection
    async fn upload(&self, name: &str, file_name: &str, bytes: Vec<u8>) -> Result<ImportResult>;

    /// Copy rows from another database instance
    async fn sync_remote(&self, name: &str, payload: &Value) -> Result<SyncResult>;

    /// Export the filtered collection as a file blob
    async fn export(&self, name: &str, request: &ExportRequest) -> Result<Vec<u8>>;

    /// Delete every row of the collection
    async fn clear(&self, name: &str) -> Result<ClearResult>;

    /// Sorted names of all fund companies
    async fn fund_companies(&self) -> Result<Vec<String>> {
        Err(AppError::NotFound(format!(
            "{} data has no company list",
            self.domain().label()
        )))
    }

    /// Domain-wide settings such as the default provider key
    async fn domain_config(&self) -> Result<DomainConfig> {
        Err(AppError::NotFound(format!(
            "{} data has no domain settings",
            self.domain().label()
        )))
    }
}

/// One collection API per domain
pub struct ApiRegistry {
    apis: HashMap<Domain, Arc<dyn CollectionApi>>,
}

impl ApiRegistry {
    /// Register the HTTP implementation for every domain
    pub fn new(client: &ApiClient) -> Self {
        let mut apis: HashMap<Domain, Arc<dyn CollectionApi>> = HashMap::new();
        for domain in Domain::ALL {
            apis.insert(domain, Arc::new(HttpCollectionApi::new(domain, client.clone())));
        }
        Self { apis }
    }

    /// Registry from explicit implementations
    pub fn from_apis(apis: Vec<Arc<dyn CollectionApi>>) -> Self {
        Self {
            apis: apis.into_iter().map(|api| (api.domain(), api)).collect(),
        }
    }

    pub fn get(&self, domain: Domain) -> Option<Arc<dyn CollectionApi>> {
        self.apis.get(&domain).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn CollectionApi>> {
        self.apis.values().cloned().collect()
    }
}
