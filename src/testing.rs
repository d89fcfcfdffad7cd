//! In-memory collection API for unit tests

use crate::api::types::*;
use crate::api::{CollectionApi, Domain};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashSet, VecDeque};

pub fn task(status: TaskStatus, progress: Option<f64>, total: Option<f64>) -> RefreshTask {
    RefreshTask {
        task_id: "t1".to_string(),
        status,
        progress,
        total,
        message: None,
        error: None,
        result: None,
    }
}

pub fn field(name: &str) -> FieldDefinition {
    FieldDefinition {
        name: name.to_string(),
        field_type: "string".to_string(),
        example: None,
    }
}

pub struct FakeCollectionApi {
    domain: Domain,
    calls: DashMap<&'static str, usize>,
    failing: Mutex<HashSet<&'static str>>,
    statuses: Mutex<VecDeque<Result<RefreshTask>>>,
    pub data: Mutex<CollectionData>,
    pub update_config: Mutex<CollectionUpdateConfig>,
    pub refresh_start: Mutex<RefreshStart>,
    pub last_query: Mutex<Option<CollectionQuery>>,
    pub refresh_requests: Mutex<Vec<RefreshRequest>>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    pub sync_payloads: Mutex<Vec<Value>>,
    pub export_requests: Mutex<Vec<ExportRequest>>,
    pub export_bytes: Mutex<Vec<u8>>,
    pub companies: Mutex<Vec<String>>,
    pub domain_config: Mutex<DomainConfig>,
}

impl FakeCollectionApi {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            calls: DashMap::new(),
            failing: Mutex::new(HashSet::new()),
            statuses: Mutex::new(VecDeque::new()),
            data: Mutex::new(CollectionData {
                items: vec![row(json!({"code": "1", "name": "first"}))],
                total: 1,
                page: 1,
                page_size: 50,
                fields: vec![field("code"), field("name"), field("updated_at"), field("rate")],
            }),
            update_config: Mutex::new(CollectionUpdateConfig::default()),
            refresh_start: Mutex::new(RefreshStart::Tracked {
                task_id: "t1".to_string(),
                message: None,
            }),
            last_query: Mutex::new(None),
            refresh_requests: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            sync_payloads: Mutex::new(Vec::new()),
            export_requests: Mutex::new(Vec::new()),
            export_bytes: Mutex::new(b"code,name\n1,first\n".to_vec()),
            companies: Mutex::new(vec!["Alpha Fund Co".to_string(), "Beta Asset".to_string()]),
            domain_config: Mutex::new(DomainConfig {
                default_api_key: "demo-key".to_string(),
            }),
        }
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.get(method).map(|c| *c).unwrap_or(0)
    }

    /// Make the next call of `method` fail
    pub fn fail_next(&self, method: &'static str) {
        self.failing.lock().insert(method);
    }

    /// Queue a task status answer; once drained the task reports `running`
    pub fn push_status(&self, status: Result<RefreshTask>) {
        self.statuses.lock().push_back(status);
    }

    fn record(&self, method: &'static str) -> Result<()> {
        *self.calls.entry(method).or_insert(0) += 1;
        if self.failing.lock().remove(method) {
            return Err(AppError::Api {
                status: 500,
                message: Some(format!("{} failed", method)),
            });
        }
        Ok(())
    }
}

pub fn row(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl CollectionApi for FakeCollectionApi {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        self.record("list_collections")?;
        Ok(vec![
            Collection {
                name: "bond_info_cm".to_string(),
                display_name: "Bond Info".to_string(),
                description: String::new(),
                route: String::new(),
                fields: Vec::new(),
            },
            Collection {
                name: "fund_name_em".to_string(),
                display_name: String::new(),
                description: String::new(),
                route: String::new(),
                fields: Vec::new(),
            },
        ])
    }

    async fn collection_data(&self, _name: &str, query: &CollectionQuery) -> Result<CollectionData> {
        self.record("collection_data")?;
        *self.last_query.lock() = Some(query.clone());
        Ok(self.data.lock().clone())
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        self.record("collection_stats")?;
        Ok(CollectionStats {
            total_count: self.data.lock().total,
            collection_name: Some(name.to_string()),
            ..CollectionStats::default()
        })
    }

    async fn update_config(&self, _name: &str) -> Result<CollectionUpdateConfig> {
        self.record("update_config")?;
        Ok(self.update_config.lock().clone())
    }

    async fn refresh(&self, _name: &str, request: &RefreshRequest) -> Result<RefreshStart> {
        self.record("refresh")?;
        self.refresh_requests.lock().push(request.clone());
        Ok(self.refresh_start.lock().clone())
    }

    async fn task_status(&self, _name: &str, task_id: &str) -> Result<RefreshTask> {
        self.record("task_status")?;
        let next = self.statuses.lock().pop_front();
        match next {
            Some(status) => status,
            None => {
                let mut running = task(TaskStatus::Running, None, None);
                running.task_id = task_id.to_string();
                Ok(running)
            }
        }
    }

    async fn upload(&self, _name: &str, file_name: &str, bytes: Vec<u8>) -> Result<ImportResult> {
        self.record("upload")?;
        self.uploads.lock().push((file_name.to_string(), bytes));
        Ok(ImportResult {
            message: Some("Imported 1 rows".to_string()),
            extra: Map::new(),
        })
    }

    async fn sync_remote(&self, _name: &str, payload: &Value) -> Result<SyncResult> {
        self.record("sync_remote")?;
        self.sync_payloads.lock().push(payload.clone());
        Ok(SyncResult {
            inserted: 3,
            updated: 1,
            failed: 0,
            message: "Synced 4 rows".to_string(),
        })
    }

    async fn export(&self, _name: &str, request: &ExportRequest) -> Result<Vec<u8>> {
        self.record("export")?;
        self.export_requests.lock().push(request.clone());
        Ok(self.export_bytes.lock().clone())
    }

    async fn fund_companies(&self) -> Result<Vec<String>> {
        self.record("fund_companies")?;
        Ok(self.companies.lock().clone())
    }

    async fn domain_config(&self) -> Result<DomainConfig> {
        self.record("domain_config")?;
        Ok(self.domain_config.lock().clone())
    }

    async fn clear(&self, _name: &str) -> Result<ClearResult> {
        self.record("clear")?;
        Ok(ClearResult {
            deleted_count: 42,
            message: None,
        })
    }
}
