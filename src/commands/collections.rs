//! Collection browsing, import/export, remote sync and clear commands

use crate::api::types::{FileFormat, RemoteSyncConfig, SortDirection};
use crate::api::Domain;
use crate::error::{AppError, Result};
use crate::services::collection_service::{CollectionSession, ViewOptions};
use crate::state::AppState;
use clap::Args;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{to_json, TerminalConfirm};

/// Sorting and filtering shared by listing and export
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Field to sort by
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort ascending instead of descending
    #[arg(long, default_value_t = false)]
    pub asc: bool,

    /// Field to filter on
    #[arg(long)]
    pub filter_field: Option<String>,

    /// Value the filter field must match
    #[arg(long)]
    pub filter_value: Option<String>,

    /// Extra domain-specific query parameter (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Rows per page (defaults to the configured page size)
    #[arg(long)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct RemoteSyncArgs {
    /// Remote database host, e.g. 10.0.0.5:27017
    #[arg(long)]
    pub host: String,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long, env = "MARKETDATA_ADMIN_REMOTE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long)]
    pub auth_source: Option<String>,

    /// Remote collection (defaults to the local collection name)
    #[arg(long)]
    pub remote_collection: Option<String>,

    #[arg(long)]
    pub batch_size: Option<u32>,
}

impl FilterArgs {
    fn view(&self, page: Option<&PageArgs>) -> Result<ViewOptions> {
        let mut extra = BTreeMap::new();
        for raw in &self.params {
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                AppError::Validation(format!("Expected KEY=VALUE, got '{}'", raw))
            })?;
            extra.insert(key.trim().to_string(), value.to_string());
        }
        let dir = if self.asc {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        Ok(ViewOptions {
            page: page.map(|p| p.page),
            page_size: page.and_then(|p| p.page_size),
            sort: self.sort_by.clone().map(|field| (field, dir)),
            filter_field: self.filter_field.clone(),
            filter_value: self.filter_value.clone(),
            extra,
        })
    }
}

fn open(state: &AppState, domain: Domain, name: &str, view: ViewOptions) -> Result<CollectionSession> {
    state.require_auth()?;
    Ok(state.session(domain, name)?.with_view(view))
}

/// List the collections of a domain
pub async fn list(state: &AppState, domain: Domain, force: bool) -> Result<Value> {
    state.require_auth()?;
    let store = state.store(domain)?;
    let collections = store.try_load_collections(force).await?;
    to_json(&collections)
}

/// Fund company names
pub async fn companies(state: &AppState, domain: Domain, force: bool) -> Result<Value> {
    state.require_auth()?;
    let companies = state.store(domain)?.try_load_companies(force).await?;
    to_json(&companies)
}

/// Domain-wide settings such as the default provider key
pub async fn domain_config(state: &AppState, domain: Domain, force: bool) -> Result<Value> {
    state.require_auth()?;
    let config = state.store(domain)?.try_load_config(force).await?;
    to_json(&config)
}

/// Load one page of a collection
pub async fn show(
    state: &AppState,
    domain: Domain,
    name: &str,
    filter: &FilterArgs,
    page: &PageArgs,
) -> Result<Value> {
    let mut session = open(state, domain, name, filter.view(Some(page))?)?;
    session.load_data().await?;
    to_json(&session.snapshot())
}

pub async fn stats(state: &AppState, domain: Domain, name: &str) -> Result<Value> {
    state.require_auth()?;
    let store = state.store(domain)?;
    let stats = store.try_load_collection_stats(name, true).await?;
    to_json(&stats)
}

pub async fn update_config(state: &AppState, domain: Domain, name: &str) -> Result<Value> {
    let mut session = open(state, domain, name, ViewOptions::default())?;
    session.load_update_config().await?;
    to_json(&session.update_form().config())
}

/// Export the filtered collection to `dir/{file_name}.{format}`
pub async fn export(
    state: &AppState,
    domain: Domain,
    name: &str,
    filter: &FilterArgs,
    format: FileFormat,
    file_name: Option<&str>,
    dir: PathBuf,
) -> Result<Value> {
    let session = open(state, domain, name, filter.view(None)?)?;
    let file_name = file_name.unwrap_or(name);
    let path = session.export(file_name, format, &dir).await?;
    Ok(json!({ "path": path }))
}

pub async fn import(state: &AppState, domain: Domain, name: &str, file: PathBuf) -> Result<Value> {
    let mut session = open(state, domain, name, ViewOptions::default())?;
    let result = session.import_file(&file).await?;
    to_json(&result)
}

pub async fn sync_remote(
    state: &AppState,
    domain: Domain,
    name: &str,
    args: &RemoteSyncArgs,
) -> Result<Value> {
    let mut session = open(state, domain, name, ViewOptions::default())?;
    let config = RemoteSyncConfig {
        host: args.host.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        auth_source: args.auth_source.clone(),
        collection: args.remote_collection.clone(),
        batch_size: args.batch_size,
    };
    let result = session.remote_sync(&config).await?;
    to_json(&result)
}

/// Delete every row of a collection after confirmation
pub async fn clear(state: &AppState, domain: Domain, name: &str, assume_yes: bool) -> Result<Value> {
    let mut session = open(state, domain, name, ViewOptions::default())?;
    let confirm = TerminalConfirm { assume_yes };
    match session.clear_data(&confirm).await? {
        Some(deleted) => Ok(json!({ "cleared": true, "deleted_count": deleted })),
        None => Ok(json!({ "cleared": false })),
    }
}
