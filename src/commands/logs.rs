//! System log commands

use crate::api::logs::{LogExportFormat, LogExportRequest, LogLevel, LogReadRequest};
use crate::error::Result;
use crate::services::export_service;
use crate::state::AppState;
use clap::Subcommand;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::to_json;

#[derive(Debug, Clone, Subcommand)]
pub enum LogsCommand {
    /// List log files
    List,
    /// Read the tail of one log file
    Read {
        filename: String,
        #[arg(long)]
        lines: Option<u32>,
        #[arg(long)]
        level: Option<LogLevel>,
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        start_time: Option<String>,
        #[arg(long)]
        end_time: Option<String>,
    },
    /// Download log files as a zip or text archive
    Export {
        /// Files to include (all when omitted)
        filenames: Vec<String>,
        #[arg(long)]
        level: Option<LogLevel>,
        #[arg(long)]
        start_time: Option<String>,
        #[arg(long)]
        end_time: Option<String>,
        #[arg(long, default_value_t = false)]
        txt: bool,
        #[arg(long, default_value = "logs")]
        file_name: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Aggregate log statistics
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Delete one log file
    Delete { filename: String },
}

pub async fn run(state: &AppState, command: &LogsCommand) -> Result<Value> {
    state.require_auth()?;
    let api = &state.logs;
    match command {
        LogsCommand::List => to_json(&api.list_files().await?),
        LogsCommand::Read {
            filename,
            lines,
            level,
            keyword,
            start_time,
            end_time,
        } => {
            let request = LogReadRequest {
                filename: filename.clone(),
                lines: *lines,
                level: *level,
                keyword: keyword.clone(),
                start_time: start_time.clone(),
                end_time: end_time.clone(),
            };
            to_json(&api.read(&request).await?)
        }
        LogsCommand::Export {
            filenames,
            level,
            start_time,
            end_time,
            txt,
            file_name,
            dir,
        } => {
            let request = LogExportRequest {
                filenames: filenames.clone(),
                level: *level,
                start_time: start_time.clone(),
                end_time: end_time.clone(),
                format: if *txt {
                    LogExportFormat::Txt
                } else {
                    LogExportFormat::Zip
                },
            };
            let bytes = api.export(&request).await?;
            let path = export_service::save_blob(dir, file_name, request.format.extension(), &bytes)?;
            Ok(json!({ "path": path }))
        }
        LogsCommand::Stats { days } => to_json(&api.statistics(*days).await?),
        LogsCommand::Delete { filename } => to_json(&api.delete_file(filename).await?),
    }
}
