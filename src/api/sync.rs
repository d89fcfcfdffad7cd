//! Multi-source and node-to-node synchronisation endpoints

use crate::api::client::ApiClient;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const STOCK_BASICS_TIMEOUT: Duration = Duration::from_secs(600);
const SOURCE_TEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSourceStatus {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub description: String,
    pub token_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentDataSource {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: String,
    pub token_source: Option<String>,
    pub token_source_display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    pub job: String,
    pub status: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub errors: u64,
    pub last_trade_date: Option<String>,
    #[serde(default)]
    pub data_sources_used: Vec<String>,
    pub source_stats: Option<HashMap<String, HashMap<String, f64>>>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncHistoryPage {
    #[serde(default)]
    pub records: Vec<SyncStatus>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRank {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncRecommendations {
    pub primary_source: Option<SourceRank>,
    #[serde(default)]
    pub fallback_sources: Vec<SourceRank>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSourceTestResult {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub message: String,
    pub token_source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TestSourcesResponse {
    #[serde(default)]
    test_results: Vec<DataSourceTestResult>,
}

/// A remote backend instance taking part in collection sync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncNode {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_masked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default = "default_node_status")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_node_status() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncTaskStats {
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub transferred: u64,
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncTask {
    pub task_id: String,
    pub direction: String,
    #[serde(default)]
    pub source_node: String,
    #[serde(default)]
    pub target_node: String,
    #[serde(default)]
    pub collection: String,
    pub filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub strategy: String,
    pub status: String,
    #[serde(default)]
    pub stats: SyncTaskStats,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncableCollection {
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub unique_keys: Vec<String>,
    pub incremental_field: Option<String>,
    #[serde(default)]
    pub chunk_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeTestResult {
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub version: Option<String>,
    pub node_name: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    Full,
    #[default]
    Incremental,
}

/// Body of a pull or push request
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    /// Remote node id (`source_node` for pulls, `target_node` for pushes)
    #[serde(skip)]
    pub node: String,
    pub collection: String,
    pub strategy: TransferStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
}

impl TransferRequest {
    fn body(&self, node_key: &str) -> Result<Value> {
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut body {
            map.insert(node_key.to_string(), Value::String(self.node.clone()));
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

pub struct SyncApi {
    client: ApiClient,
}

impl SyncApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn sources_status(&self) -> Result<Vec<DataSourceStatus>> {
        self.client.get("/api/sync/multi-source/sources/status", &[]).await
    }

    pub async fn current_source(&self) -> Result<CurrentDataSource> {
        self.client.get("/api/sync/multi-source/sources/current", &[]).await
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        self.client.get("/api/sync/multi-source/status", &[]).await
    }

    /// Run the stock basics sync; `preferred_sources` is a comma separated list
    pub async fn run_stock_basics(&self, force: bool, preferred_sources: Option<&str>) -> Result<SyncStatus> {
        info!("SyncApi::run_stock_basics force={}", force);
        let mut path = "/api/sync/multi-source/stock_basics/run".to_string();
        let mut params = Vec::new();
        if force {
            params.push("force=true".to_string());
        }
        if let Some(sources) = preferred_sources.filter(|s| !s.is_empty()) {
            params.push(format!("preferred_sources={}", urlencoding::encode(sources)));
        }
        if !params.is_empty() {
            path = format!("{}?{}", path, params.join("&"));
        }
        self.client
            .post_envelope::<SyncStatus, Value>(&path, None, Some(STOCK_BASICS_TIMEOUT))
            .await?
            .into_data()
    }

    pub async fn test_sources(&self, source_name: Option<&str>) -> Result<Vec<DataSourceTestResult>> {
        let mut body = Map::new();
        if let Some(name) = source_name {
            body.insert("source_name".to_string(), Value::String(name.to_string()));
        }
        let response: TestSourcesResponse = self
            .client
            .post_envelope(
                "/api/sync/multi-source/test-sources",
                Some(&Value::Object(body)),
                Some(SOURCE_TEST_TIMEOUT),
            )
            .await?
            .into_data()?;
        Ok(response.test_results)
    }

    pub async fn recommendations(&self) -> Result<SyncRecommendations> {
        self.client.get("/api/sync/multi-source/recommendations", &[]).await
    }

    pub async fn history(&self, query: &HistoryQuery) -> Result<SyncHistoryPage> {
        let mut pairs = Vec::new();
        if let Some(page) = query.page.filter(|p| *p > 0) {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(size) = query.page_size.filter(|s| *s > 0) {
            pairs.push(("page_size".to_string(), size.to_string()));
        }
        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("status".to_string(), status.to_string()));
        }
        self.client.get("/api/sync/multi-source/history", &pairs).await
    }

    pub async fn clear_cache(&self) -> Result<bool> {
        #[derive(Deserialize)]
        struct Cleared {
            #[serde(default)]
            cleared: bool,
        }
        let cleared: Cleared = self
            .client
            .delete_envelope("/api/sync/multi-source/cache")
            .await?
            .into_data()?;
        Ok(cleared.cleared)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub async fn nodes(&self) -> Result<Vec<SyncNode>> {
        self.client.get("/api/sync/nodes", &[]).await
    }

    pub async fn node(&self, node_id: &str) -> Result<SyncNode> {
        self.client.get(&node_path(node_id, ""), &[]).await
    }

    pub async fn create_node(&self, node: &SyncNode) -> Result<SyncNode> {
        info!("SyncApi::create_node {}", node.name);
        self.client.post("/api/sync/nodes", Some(node)).await
    }

    pub async fn update_node(&self, node_id: &str, node: &SyncNode) -> Result<SyncNode> {
        info!("SyncApi::update_node {}", node_id);
        self.client.put(&node_path(node_id, ""), node).await
    }

    /// Delete a node, returning the server message
    pub async fn delete_node(&self, node_id: &str) -> Result<String> {
        info!("SyncApi::delete_node {}", node_id);
        let envelope = self
            .client
            .delete_envelope::<Value>(&node_path(node_id, ""))
            .await?;
        let message = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(envelope.message)
            .unwrap_or_else(|| "Node deleted".to_string());
        Ok(message)
    }

    pub async fn test_node(&self, node_id: &str) -> Result<NodeTestResult> {
        self.client
            .post::<NodeTestResult, Value>(&node_path(node_id, "test"), None)
            .await
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn tasks(&self, limit: Option<u32>, skip: Option<u32>) -> Result<Vec<SyncTask>> {
        let mut pairs = Vec::new();
        if let Some(limit) = limit.filter(|l| *l > 0) {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(skip) = skip.filter(|s| *s > 0) {
            pairs.push(("skip".to_string(), skip.to_string()));
        }
        self.client.get("/api/sync/tasks", &pairs).await
    }

    pub async fn task(&self, task_id: &str) -> Result<SyncTask> {
        let path = format!("/api/sync/tasks/{}", urlencoding::encode(task_id));
        self.client.get(&path, &[]).await
    }

    pub async fn pull(&self, request: &TransferRequest) -> Result<SyncTask> {
        info!("SyncApi::pull {} from {}", request.collection, request.node);
        let body = request.body("source_node")?;
        self.client.post("/api/sync/pull", Some(&body)).await
    }

    pub async fn push(&self, request: &TransferRequest) -> Result<SyncTask> {
        info!("SyncApi::push {} to {}", request.collection, request.node);
        let body = request.body("target_node")?;
        self.client.post("/api/sync/push", Some(&body)).await
    }

    pub async fn syncable_collections(&self) -> Result<Vec<SyncableCollection>> {
        self.client.get("/api/sync/collections", &[]).await
    }
}

fn node_path(node_id: &str, tail: &str) -> String {
    let base = format!("/api/sync/nodes/{}", urlencoding::encode(node_id));
    if tail.is_empty() {
        base
    } else {
        format!("{}/{}", base, tail)
    }
}
