//! Common API types shared by every collection domain

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Standard backend envelope `{success, data?, error?, message?, detail?}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub detail: Option<Value>,
}

/// A named dataset slice managed by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One column of a collection's row schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub example: Option<String>,
}

/// One page of collection rows
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionData {
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// Category breakdown entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Aggregate statistics of a collection.
///
/// Domain-specific breakdowns (grade, exchange, type, top movers, ...) are
/// kept verbatim in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CollectionStats {
    #[serde(default)]
    pub total_count: u64,
    pub collection_name: Option<String>,
    pub earliest_date: Option<String>,
    pub latest_date: Option<String>,
    pub latest_time: Option<String>,
    pub latest_update: Option<String>,
    pub date_field: Option<String>,
    pub category_stats: Option<Vec<CategoryCount>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Query for one page of a collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_dir: SortDirection,
    pub filter_field: Option<String>,
    pub filter_value: Option<String>,
    /// Domain-specific filters (`tracking_target`, `fund_company`, ...)
    pub extra: BTreeMap<String, String>,
}

impl CollectionQuery {
    /// Query-string pairs; empty optional values are omitted
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        if let Some(sort_by) = non_empty(&self.sort_by) {
            pairs.push(("sort_by".to_string(), sort_by.to_string()));
        }
        pairs.push(("sort_dir".to_string(), self.sort_dir.as_str().to_string()));
        if let Some(field) = non_empty(&self.filter_field) {
            pairs.push(("filter_field".to_string(), field.to_string()));
        }
        if let Some(value) = non_empty(&self.filter_value) {
            pairs.push(("filter_value".to_string(), value.to_string()));
        }
        for (key, value) in &self.extra {
            if !value.is_empty() {
                pairs.push((key.clone(), value.clone()));
            }
        }
        pairs
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Json,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for FileFormat {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" => Ok(FileFormat::Xlsx),
            "json" => Ok(FileFormat::Json),
            other => Err(crate::error::AppError::Validation(format!(
                "Unsupported export format: {}",
                other
            ))),
        }
    }
}

/// Body of `POST /collections/{name}/export`
#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest {
    pub file_format: FileFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    pub sort_dir: SortDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_value: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

// ============================================================================
// Refresh tasks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || matches!(self, TaskStatus::Failed)
    }
}

/// Optional counters a backend job may report
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskResult {
    pub processed: Option<u64>,
    pub success: Option<u64>,
    pub failed: Option<u64>,
    pub fetched_rows: Option<u64>,
    pub saved_rows: Option<u64>,
    pub saved_fund_count: Option<u64>,
    pub inserted: Option<u64>,
    pub updated: Option<u64>,
    pub deleted: Option<u64>,
    pub saved: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status of an asynchronous backend job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTask {
    #[serde(default)]
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: Option<f64>,
    pub total: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Some jobs finish with a bare string here instead of counters
    #[serde(default, deserialize_with = "counters_or_none")]
    pub result: Option<TaskResult>,
}

fn counters_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<TaskResult>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => Ok(serde_json::from_value(value).ok()),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Single,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Incremental,
    Full,
}

impl std::str::FromStr for UpdateMode {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "incremental" => Ok(UpdateMode::Incremental),
            "full" => Ok(UpdateMode::Full),
            other => Err(crate::error::AppError::Validation(format!(
                "Unknown update mode: {}",
                other
            ))),
        }
    }
}

/// Body of `POST /collections/{name}/refresh`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RefreshRequest {
    pub update_type: UpdateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Raw acknowledgement of a refresh request
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefreshAck {
    pub task_id: Option<String>,
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the backend answered a refresh request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshStart {
    /// Job runs in the background and must be polled
    Tracked {
        task_id: String,
        message: Option<String>,
    },
    /// Job finished within the request
    Completed {
        message: Option<String>,
        result: Map<String, Value>,
    },
}

impl From<RefreshAck> for RefreshStart {
    fn from(ack: RefreshAck) -> Self {
        match ack.task_id.filter(|id| !id.is_empty()) {
            Some(task_id) => RefreshStart::Tracked {
                task_id,
                message: ack.message,
            },
            None => RefreshStart::Completed {
                message: ack.message,
                result: ack.extra,
            },
        }
    }
}

// ============================================================================
// Update configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Text,
    Number,
    Select,
    Date,
    Boolean,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamOption {
    pub label: String,
    pub value: Value,
}

/// One input accepted by a single or batch update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateParam {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub default: Option<Value>,
    #[serde(default)]
    pub options: Vec<ParamOption>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateConfig {
    #[serde(default)]
    pub enabled: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<UpdateParam>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CollectionUpdateConfig {
    #[serde(default)]
    pub collection_name: String,
    #[serde(default)]
    pub display_name: String,
    pub update_description: Option<String>,
    #[serde(default)]
    pub single_update: UpdateConfig,
    #[serde(default)]
    pub batch_update: UpdateConfig,
}

// ============================================================================
// Import / remote sync / clear
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportResult {
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Connection parameters of another database instance
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RemoteSyncConfig {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: Option<String>,
    pub collection: Option<String>,
    pub batch_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SyncResult {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClearResult {
    #[serde(default)]
    pub deleted_count: u64,
    pub message: Option<String>,
}

/// Domain-wide settings published by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DomainConfig {
    /// Provider key pre-filled into update forms
    #[serde(default)]
    pub default_api_key: String,
}
