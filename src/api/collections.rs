//! HTTP implementation of the per-domain collection endpoints

use crate::api::client::ApiClient;
use crate::api::domain::{Domain, SyncPayloadStyle};
use crate::api::types::*;
use crate::api::CollectionApi;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

pub struct HttpCollectionApi {
    domain: Domain,
    client: ApiClient,
}

impl HttpCollectionApi {
    pub fn new(domain: Domain, client: ApiClient) -> Self {
        Self { domain, client }
    }
}

#[async_trait]
impl CollectionApi for HttpCollectionApi {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        self.client.get(&self.domain.collections_path(), &[]).await
    }

    async fn collection_data(&self, name: &str, query: &CollectionQuery) -> Result<CollectionData> {
        self.client
            .get(&self.domain.data_path(name), &query.to_pairs())
            .await
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        self.client
            .get(&self.domain.collection_path(name, "stats"), &[])
            .await
    }

    async fn update_config(&self, name: &str) -> Result<CollectionUpdateConfig> {
        self.client
            .get(&self.domain.collection_path(name, "update-config"), &[])
            .await
    }

    async fn refresh(&self, name: &str, request: &RefreshRequest) -> Result<RefreshStart> {
        info!("{}::refresh {} ({:?})", self.domain, name, request.update_type);
        let envelope = self
            .client
            .post_envelope::<RefreshAck, _>(
                &self.domain.collection_path(name, "refresh"),
                Some(request),
                None,
            )
            .await?;

        let mut ack = envelope.data.unwrap_or_default();
        if ack.message.is_none() {
            ack.message = envelope.message;
        }
        Ok(RefreshStart::from(ack))
    }

    async fn task_status(&self, name: &str, task_id: &str) -> Result<RefreshTask> {
        let tail = format!("refresh/status/{}", urlencoding::encode(task_id));
        self.client
            .get(&self.domain.collection_path(name, &tail), &[])
            .await
    }

    async fn upload(&self, name: &str, file_name: &str, bytes: Vec<u8>) -> Result<ImportResult> {
        info!("{}::upload {} <- {} ({} bytes)", self.domain, name, file_name, bytes.len());
        let envelope = self
            .client
            .upload::<ImportResult>(&self.domain.collection_path(name, "upload"), file_name, bytes)
            .await?;

        let mut result = envelope.data.unwrap_or_default();
        if result.message.is_none() {
            result.message = envelope.message;
        }
        Ok(result)
    }

    async fn sync_remote(&self, name: &str, payload: &Value) -> Result<SyncResult> {
        info!("{}::sync_remote {}", self.domain, name);
        let envelope = self
            .client
            .post_envelope::<SyncResult, _>(
                &self.domain.collection_path(name, "sync"),
                Some(payload),
                None,
            )
            .await?;

        let mut result = envelope.data.unwrap_or_default();
        if result.message.is_empty() {
            result.message = envelope.message.unwrap_or_default();
        }
        Ok(result)
    }

    async fn export(&self, name: &str, request: &ExportRequest) -> Result<Vec<u8>> {
        info!("{}::export {} as {:?}", self.domain, name, request.file_format);
        self.client
            .download(&self.domain.collection_path(name, "export"), request)
            .await
    }

    async fn fund_companies(&self) -> Result<Vec<String>> {
        if !self.domain.has_fund_companies() {
            return Err(AppError::NotFound(format!(
                "{} data has no company list",
                self.domain.label()
            )));
        }
        self.client.get(&self.domain.domain_path("companies"), &[]).await
    }

    async fn domain_config(&self) -> Result<DomainConfig> {
        if !self.domain.has_domain_config() {
            return Err(AppError::NotFound(format!(
                "{} data has no domain settings",
                self.domain.label()
            )));
        }
        self.client.get(&self.domain.domain_path("config"), &[]).await
    }

    async fn clear(&self, name: &str) -> Result<ClearResult> {
        info!("{}::clear {}", self.domain, name);
        let envelope = self
            .client
            .delete_envelope::<ClearResult>(&self.domain.collection_path(name, "clear"))
            .await?;

        let mut result = envelope.data.unwrap_or_default();
        if result.message.is_none() {
            result.message = envelope.message;
        }
        Ok(result)
    }
}

/// Request body of a remote sync in the domain's key style.
///
/// The target collection defaults to `current_collection`; absent optional
/// fields are omitted.
pub fn remote_sync_payload(
    style: SyncPayloadStyle,
    config: &RemoteSyncConfig,
    current_collection: &str,
) -> Value {
    let keys = match style {
        SyncPayloadStyle::RemotePrefixed => [
            "remote_host",
            "remote_username",
            "remote_password",
            "remote_auth_source",
            "remote_collection",
            "batch_size",
        ],
        SyncPayloadStyle::Plain => [
            "host",
            "username",
            "password",
            "authSource",
            "collection",
            "batchSize",
        ],
    };

    let collection = config
        .collection
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(current_collection);

    let values = [
        Some(json!(config.host)),
        non_empty(&config.username).map(|v| json!(v)),
        non_empty(&config.password).map(|v| json!(v)),
        non_empty(&config.auth_source).map(|v| json!(v)),
        Some(json!(collection)),
        config.batch_size.map(|v| json!(v)),
    ];

    let mut payload = Map::new();
    for (key, value) in keys.iter().zip(values) {
        if let Some(value) = value {
            payload.insert(key.to_string(), value);
        }
    }
    Value::Object(payload)
}
