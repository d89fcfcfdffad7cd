//! System log management endpoints
//!
//! These endpoints sometimes answer with the standard envelope and sometimes
//! with the bare payload, so reads go through the loose client helpers.

use crate::api::client::ApiClient;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl std::str::FromStr for LogLevel {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            other => Err(crate::error::AppError::Validation(format!(
                "Unknown log level: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogFileInfo {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub size_mb: f64,
    #[serde(default)]
    pub modified_at: String,
    #[serde(rename = "type", default)]
    pub log_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogContentStats {
    #[serde(default)]
    pub total_lines: u64,
    #[serde(default)]
    pub filtered_lines: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub warning_count: u64,
    #[serde(default)]
    pub info_count: u64,
    #[serde(default)]
    pub debug_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogContentResponse {
    pub filename: String,
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default)]
    pub stats: LogContentStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogStatistics {
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_size_mb: f64,
    #[serde(default)]
    pub error_files: u64,
    #[serde(default)]
    pub recent_errors: Vec<String>,
    #[serde(default)]
    pub log_types: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LogReadRequest {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogExportFormat {
    #[default]
    Zip,
    Txt,
}

impl LogExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            LogExportFormat::Zip => "zip",
            LogExportFormat::Txt => "txt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LogExportRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filenames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub format: LogExportFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteLogResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

pub struct LogsApi {
    client: ApiClient,
}

impl LogsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list_files(&self) -> Result<Vec<LogFileInfo>> {
        self.client.get_loose("/api/system/system-logs/files", &[]).await
    }

    pub async fn read(&self, request: &LogReadRequest) -> Result<LogContentResponse> {
        self.client.post_loose("/api/system/system-logs/read", request).await
    }

    /// Export log files as a zip or text blob
    pub async fn export(&self, request: &LogExportRequest) -> Result<Vec<u8>> {
        info!("LogsApi::export {} file(s)", request.filenames.len());
        self.client
            .download("/api/system/system-logs/export", request)
            .await
    }

    pub async fn statistics(&self, days: u32) -> Result<LogStatistics> {
        let query = [("days".to_string(), days.to_string())];
        self.client
            .get_loose("/api/system/system-logs/statistics", &query)
            .await
    }

    pub async fn delete_file(&self, filename: &str) -> Result<DeleteLogResult> {
        info!("LogsApi::delete_file {}", filename);
        let path = format!("/api/system/system-logs/files/{}", urlencoding::encode(filename));
        let envelope = self.client.delete_envelope::<serde_json::Value>(&path).await?;
        Ok(DeleteLogResult {
            success: envelope.success,
            message: envelope.message.unwrap_or_default(),
        })
    }
}
