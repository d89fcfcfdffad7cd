//! Collection Service
//!
//! A `CollectionSession` is the working state behind one collection page:
//! the current listing with its paging, sorting and filtering, the update
//! form, the tracked refresh job, and the import, sync and clear actions.
//! Every operation reports its outcome to the notifier and also returns it.

use crate::api::collections::remote_sync_payload;
use crate::api::types::*;
use crate::api::{CollectionApi, Domain};
use crate::config::PollSettings;
use crate::error::{AppError, Result};
use crate::services::export_service;
use crate::services::notifier::{Notice, Notifier};
use crate::services::refresh_poller::{spawn_poller, PollHandle, PollOutcome, Progress, ProgressStatus};
use crate::services::update_form::UpdateForm;
use crate::stores::CollectionStore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Bookkeeping columns shown after the data columns
pub const META_FIELDS: [&str; 4] = ["code", "endpoint", "source", "updated_at"];

/// Asks the operator to approve a destructive action
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Initial paging, sorting and filtering of a session
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<(String, SortDirection)>,
    pub filter_field: Option<String>,
    pub filter_value: Option<String>,
    pub extra: BTreeMap<String, String>,
}

enum RefreshSlot {
    Idle,
    Tracking { kind: UpdateType, handle: PollHandle },
}

/// Serializable view of the loaded page
#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub domain: Domain,
    pub collection: String,
    pub display_name: String,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub fields: Vec<FieldDefinition>,
    pub items: Vec<Map<String, Value>>,
    pub stats: Option<CollectionStats>,
}

pub struct CollectionSession {
    domain: Domain,
    name: String,
    api: Arc<dyn CollectionApi>,
    store: Arc<CollectionStore>,
    notifier: Arc<dyn Notifier>,
    poll: PollSettings,

    items: Vec<Map<String, Value>>,
    fields: Vec<FieldDefinition>,
    page: u32,
    page_size: u32,
    total: u64,
    sort_by: Option<String>,
    sort_dir: SortDirection,
    filter_field: Option<String>,
    filter_value: Option<String>,
    extra_filters: BTreeMap<String, String>,
    stats: Option<CollectionStats>,
    info: Option<Collection>,
    loading: bool,

    form: UpdateForm,
    refresh: RefreshSlot,
    progress: Arc<watch::Sender<Progress>>,
    remote_sync_stats: Option<SyncResult>,
}

impl CollectionSession {
    pub fn new(
        name: impl Into<String>,
        store: Arc<CollectionStore>,
        notifier: Arc<dyn Notifier>,
        poll: PollSettings,
        page_size: u32,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            domain: store.domain(),
            name: name.into(),
            api: store.api(),
            store,
            notifier,
            poll,
            items: Vec::new(),
            fields: Vec::new(),
            page: 1,
            page_size: page_size.max(1),
            total: 0,
            sort_by: None,
            sort_dir: SortDirection::Desc,
            filter_field: None,
            filter_value: None,
            extra_filters: BTreeMap::new(),
            stats: None,
            info: None,
            loading: false,
            form: UpdateForm::new(),
            refresh: RefreshSlot::Idle,
            progress: Arc::new(progress),
            remote_sync_stats: None,
        }
    }

    /// Apply view options without loading anything
    pub fn with_view(mut self, view: ViewOptions) -> Self {
        if let Some(page) = view.page {
            self.page = page.max(1);
        }
        if let Some(page_size) = view.page_size {
            self.page_size = page_size.max(1);
        }
        if let Some((field, dir)) = view.sort.filter(|(f, _)| !f.is_empty()) {
            self.sort_by = Some(field);
            self.sort_dir = dir;
        }
        self.filter_field = view.filter_field.filter(|f| !f.is_empty());
        self.filter_value = view.filter_value.filter(|v| !v.is_empty());
        for (key, value) in view.extra {
            self.set_extra_filter(key, value);
        }
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[Map<String, Value>] {
        &self.items
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sort(&self) -> (Option<&str>, SortDirection) {
        (self.sort_by.as_deref(), self.sort_dir)
    }

    pub fn filter(&self) -> (Option<&str>, Option<&str>) {
        (self.filter_field.as_deref(), self.filter_value.as_deref())
    }

    pub fn stats(&self) -> Option<&CollectionStats> {
        self.stats.as_ref()
    }

    pub fn info(&self) -> Option<&Collection> {
        self.info.as_ref()
    }

    pub fn display_name(&self) -> String {
        self.info
            .as_ref()
            .map(|c| c.display_name.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.store.display_name(&self.name))
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn remote_sync_stats(&self) -> Option<&SyncResult> {
        self.remote_sync_stats.as_ref()
    }

    pub fn update_form(&self) -> &UpdateForm {
        &self.form
    }

    pub fn update_form_mut(&mut self) -> &mut UpdateForm {
        &mut self.form
    }

    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            domain: self.domain,
            collection: self.name.clone(),
            display_name: self.display_name(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            fields: self.fields.clone(),
            items: self.items.clone(),
            stats: self.stats.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    /// Reload collection info, statistics and the current page
    pub async fn load_data(&mut self) -> Result<()> {
        self.loading = true;
        let result = self.fetch_page().await;
        self.loading = false;

        if let Err(e) = &result {
            warn!("{}::load_data {} failed: {}", self.domain, self.name, e);
            self.notifier.notify(Notice::operation_failed(self.domain, e));
        }
        result
    }

    async fn fetch_page(&mut self) -> Result<()> {
        info!(
            "CollectionService::load_data {}/{} page={} size={}",
            self.domain, self.name, self.page, self.page_size
        );

        let collections = self.store.load_collections(false).await;
        if let Some(info) = collections.into_iter().find(|c| c.name == self.name) {
            self.info = Some(info);
        }
        if let Some(stats) = self.store.load_collection_stats(&self.name, true).await {
            self.stats = Some(stats);
        }

        let query = self.query();
        let data = self.api.collection_data(&self.name, &query).await?;
        self.items = data.items;
        self.fields = order_fields(self.domain, &self.name, data.fields);
        self.total = data.total;
        Ok(())
    }

    fn query(&self) -> CollectionQuery {
        CollectionQuery {
            page: self.page,
            page_size: self.page_size,
            sort_by: self.sort_by.clone(),
            sort_dir: self.sort_dir,
            filter_field: self.filter_field.clone(),
            filter_value: self.filter_value.clone(),
            extra: self.extra_filters.clone(),
        }
    }

    /// Sort by a field, or clear sorting with `None`, and reload
    pub async fn set_sort(&mut self, sort: Option<(String, SortDirection)>) -> Result<()> {
        match sort {
            Some((field, dir)) if !field.is_empty() => {
                self.sort_by = Some(field);
                self.sort_dir = dir;
            }
            _ => {
                self.sort_by = None;
                self.sort_dir = SortDirection::Desc;
            }
        }
        self.load_data().await
    }

    /// Filter on `field` containing `value` and reload from the first page
    pub async fn set_filter(&mut self, field: Option<String>, value: Option<String>) -> Result<()> {
        self.filter_field = field.filter(|f| !f.is_empty());
        self.filter_value = value.filter(|v| !v.is_empty());
        self.page = 1;
        self.load_data().await
    }

    /// Domain-specific query parameter sent with listings and exports.
    /// An empty value removes it. Does not reload.
    pub fn set_extra_filter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        if value.is_empty() {
            self.extra_filters.remove(&key);
        } else {
            self.extra_filters.insert(key, value);
        }
    }

    pub async fn set_page(&mut self, page: u32) -> Result<()> {
        self.page = page.max(1);
        self.load_data().await
    }

    pub async fn set_page_size(&mut self, page_size: u32) -> Result<()> {
        self.page_size = page_size.max(1);
        self.page = 1;
        self.load_data().await
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Export every row matching the current sort and filter
    pub async fn export(&self, file_name: &str, format: FileFormat, dir: &Path) -> Result<PathBuf> {
        let request = ExportRequest {
            file_format: format,
            sort_by: self.sort_by.clone(),
            sort_dir: self.sort_dir,
            filter_field: self.filter_field.clone(),
            filter_value: self.filter_value.clone(),
            extra: self.extra_filters.clone(),
        };

        let result =
            export_service::export_collection(self.api.as_ref(), &self.name, &request, dir, file_name).await;
        match &result {
            Ok(path) => self
                .notifier
                .notify(Notice::success(format!("Exported to {}", path.display()))),
            Err(e) => self.notifier.notify(Notice::operation_failed(self.domain, e)),
        }
        result
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Fetch the update configuration and seed parameter defaults
    pub async fn load_update_config(&mut self) -> Result<()> {
        self.form.reset();
        match self.api.update_config(&self.name).await {
            Ok(config) => {
                self.form.apply_config(config);
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(Notice::error(format!(
                    "Failed to load update config: {}",
                    e.user_message()
                )));
                Err(e)
            }
        }
    }

    pub fn can_single_update(&self) -> bool {
        self.form.can_single_update()
    }

    pub fn can_batch_update(&self) -> bool {
        self.form.can_batch_update()
    }

    /// Whether a refresh job is being tracked
    pub fn is_refreshing(&self) -> bool {
        match &self.refresh {
            RefreshSlot::Tracking { handle, .. } => handle.is_active(),
            RefreshSlot::Idle => false,
        }
    }

    /// Kind and task id of the tracked job
    pub fn tracked_task(&self) -> Option<(UpdateType, &str)> {
        match &self.refresh {
            RefreshSlot::Tracking { kind, handle } if handle.is_active() => Some((*kind, handle.task_id())),
            _ => None,
        }
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn current_progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    pub fn reset_progress(&mut self) {
        self.progress.send_replace(Progress::default());
    }

    /// Start a single update with the form's single parameters
    pub async fn single_update(&mut self) -> Result<RefreshStart> {
        if !self.can_single_update() {
            return Err(AppError::Validation(
                "Single update is disabled or a required parameter is missing".to_string(),
            ));
        }
        let request = self.form.single_request(self.domain.coerces_numeric_year());
        self.start_refresh(UpdateType::Single, request).await
    }

    /// Start a batch update with the form's batch parameters and mode
    pub async fn batch_update(&mut self) -> Result<RefreshStart> {
        if !self.can_batch_update() {
            return Err(AppError::Validation(
                "Batch update is disabled or a required parameter is missing".to_string(),
            ));
        }
        let request = self.form.batch_request();
        self.start_refresh(UpdateType::Batch, request).await
    }

    async fn start_refresh(&mut self, kind: UpdateType, request: RefreshRequest) -> Result<RefreshStart> {
        if let Err(e) = self.reap_refresh().await {
            warn!("Previous refresh of {} ended abnormally: {}", self.name, e);
        }
        if self.is_refreshing() {
            return Err(AppError::Busy(format!(
                "A refresh of {} is already running",
                self.name
            )));
        }
        info!("CollectionService::refresh {}/{} {:?}", self.domain, self.name, kind);

        let label = match kind {
            UpdateType::Single => "Single",
            UpdateType::Batch => "Batch",
        };
        self.progress.send_replace(Progress::with_message(match kind {
            UpdateType::Single => "Running single update...",
            UpdateType::Batch => "Creating batch update task...",
        }));

        let start = match self.api.refresh(&self.name, &request).await {
            Ok(start) => start,
            Err(e) => {
                self.progress.send_replace(Progress {
                    percentage: 0,
                    status: Some(ProgressStatus::Exception),
                    message: e.user_message(),
                });
                self.notifier.notify(Notice::operation_failed(self.domain, &e));
                return Err(e);
            }
        };

        match &start {
            RefreshStart::Tracked { task_id, .. } => {
                self.progress.send_modify(|p| {
                    p.message = "Task created, updating data...".to_string();
                });
                let handle = spawn_poller(
                    self.api.clone(),
                    self.name.clone(),
                    task_id.clone(),
                    self.poll.clone(),
                    self.progress.clone(),
                    self.notifier.clone(),
                );
                self.refresh = RefreshSlot::Tracking { kind, handle };
            }
            RefreshStart::Completed { message, .. } => {
                let message = message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("{} update complete", label));
                self.progress.send_replace(Progress {
                    percentage: 100,
                    status: Some(ProgressStatus::Success),
                    message,
                });
                self.notifier
                    .notify(Notice::success(format!("{} update succeeded", label)));
                self.reload_quietly().await;
            }
        }
        Ok(start)
    }

    /// Wait for the tracked refresh job to end.
    ///
    /// The poller has already dispatched the terminal notice; this reloads
    /// the listing on success. Returns `None` when nothing is tracked.
    pub async fn await_refresh(&mut self) -> Result<Option<PollOutcome>> {
        let handle = match std::mem::replace(&mut self.refresh, RefreshSlot::Idle) {
            RefreshSlot::Tracking { handle, .. } => handle,
            RefreshSlot::Idle => return Ok(None),
        };

        let outcome = handle.wait().await?;
        if outcome.is_success() {
            self.reload_quietly().await;
        }
        Ok(Some(outcome))
    }

    /// Settle a job whose poller finished on its own, without waiting on a
    /// live one. Returns `None` when nothing finished.
    pub async fn reap_refresh(&mut self) -> Result<Option<PollOutcome>> {
        let finished = matches!(&self.refresh, RefreshSlot::Tracking { handle, .. } if !handle.is_active());
        if finished {
            self.await_refresh().await
        } else {
            Ok(None)
        }
    }

    /// Reload after a successful mutation; failures were already notified
    async fn reload_quietly(&mut self) {
        if let Err(e) = self.load_data().await {
            warn!("Reload of {} after update failed: {}", self.name, e);
        }
    }

    // ------------------------------------------------------------------
    // Import / remote sync / clear
    // ------------------------------------------------------------------

    /// Upload a local file into the collection
    pub async fn import_file(&mut self, path: &Path) -> Result<ImportResult> {
        let result = self.upload_file(path).await;
        match &result {
            Ok(imported) => {
                let message = imported
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Import succeeded".to_string());
                self.notifier.notify(Notice::success(message));
                self.reload_quietly().await;
            }
            Err(e) => self.notifier.notify(Notice::operation_failed(self.domain, e)),
        }
        result
    }

    async fn upload_file(&self, path: &Path) -> Result<ImportResult> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Validation(format!("Not a file: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        info!("CollectionService::import_file {}/{} <- {}", self.domain, self.name, file_name);
        self.api.upload(&self.name, &file_name, bytes).await
    }

    /// Copy rows from another database instance into this collection
    pub async fn remote_sync(&mut self, config: &RemoteSyncConfig) -> Result<SyncResult> {
        self.remote_sync_stats = None;
        let result = self.sync_from(config).await;
        match &result {
            Ok(stats) => {
                self.remote_sync_stats = Some(stats.clone());
                let message = if stats.message.is_empty() {
                    "Sync succeeded".to_string()
                } else {
                    stats.message.clone()
                };
                self.notifier.notify(Notice::success(message));
                self.reload_quietly().await;
            }
            Err(e) => self.notifier.notify(Notice::operation_failed(self.domain, e)),
        }
        result
    }

    async fn sync_from(&self, config: &RemoteSyncConfig) -> Result<SyncResult> {
        if config.host.trim().is_empty() {
            return Err(AppError::Validation("Remote host is required".to_string()));
        }
        let payload = remote_sync_payload(self.domain.sync_payload_style(), config, &self.name);
        info!("CollectionService::remote_sync {}/{} from {}", self.domain, self.name, config.host);
        self.api.sync_remote(&self.name, &payload).await
    }

    /// Delete every row after the operator confirms.
    ///
    /// Returns `None` when the operator declined.
    pub async fn clear_data(&mut self, confirm: &dyn Confirm) -> Result<Option<u64>> {
        let prompt = format!(
            "Clear all data of \"{}\"? This cannot be undone.",
            self.display_name()
        );
        if !confirm.confirm(&prompt) {
            info!("Clearing {} declined", self.name);
            return Ok(None);
        }

        info!("CollectionService::clear_data {}/{}", self.domain, self.name);
        match self.api.clear(&self.name).await {
            Ok(cleared) => {
                self.notifier.notify(Notice::success(format!(
                    "Cleared {} records",
                    cleared.deleted_count
                )));
                self.store.clear_collection_stats(Some(&self.name));
                self.reload_quietly().await;
                Ok(Some(cleared.deleted_count))
            }
            Err(e) => {
                self.notifier.notify(Notice::operation_failed(self.domain, &e));
                Err(e)
            }
        }
    }

    /// Stop any live poller. The backend job is left running.
    pub fn cleanup(&mut self) {
        if let RefreshSlot::Tracking { mut handle, .. } = std::mem::replace(&mut self.refresh, RefreshSlot::Idle) {
            handle.cancel();
        }
    }
}

impl Drop for CollectionSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Move meta fields after the data fields, unless the collection keeps the
/// backend's order
pub fn order_fields(domain: Domain, collection: &str, fields: Vec<FieldDefinition>) -> Vec<FieldDefinition> {
    if domain.preserves_field_order(collection) {
        return fields;
    }
    let (meta, mut main): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .partition(|f| META_FIELDS.contains(&f.name.as_str()));
    main.extend(meta);
    main
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{TaskResult, TaskStatus};
    use crate::services::notifier::{MemoryNotifier, NoticeLevel};
    use crate::testing::{field, row, task, FakeCollectionApi};
    use serde_json::json;

    struct Fixture {
        api: Arc<FakeCollectionApi>,
        notifier: Arc<MemoryNotifier>,
        session: CollectionSession,
    }

    fn fixture(domain: Domain, name: &str) -> Fixture {
        let api = Arc::new(FakeCollectionApi::new(domain));
        let notifier = Arc::new(MemoryNotifier::new());
        let store = Arc::new(CollectionStore::new(api.clone(), notifier.clone()));
        let session = CollectionSession::new(name, store, notifier.clone(), PollSettings::default(), 50);
        Fixture { api, notifier, session }
    }

    fn enable_updates(api: &FakeCollectionApi) {
        let mut config = api.update_config.lock();
        config.single_update.enabled = true;
        config.batch_update.enabled = true;
    }

    fn names(fields: &[FieldDefinition]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_meta_fields_move_last_idempotently() {
        let fields = vec![field("code"), field("name"), field("source"), field("rate")];
        let once = order_fields(Domain::Bonds, "bond_info_cm", fields);
        assert_eq!(names(&once), vec!["name", "rate", "code", "source"]);

        let twice = order_fields(Domain::Bonds, "bond_info_cm", once.clone());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_fund_hk_history_keeps_backend_order() {
        let fields = vec![field("code"), field("date"), field("nav")];
        let ordered = order_fields(Domain::Funds, "fund_hk_hist_em", fields);
        assert_eq!(names(&ordered), vec!["code", "date", "nav"]);
    }

    #[tokio::test]
    async fn test_load_data_sends_query_and_keeps_server_total() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        {
            let mut data = fx.api.data.lock();
            data.items = vec![row(json!({"code": "101"})), row(json!({"code": "102"}))];
            data.total = 52;
        }
        fx.session.page = 2;
        fx.session.set_extra_filter("exchange", "SSE");

        fx.session.load_data().await.unwrap();

        let query = fx.api.last_query.lock().clone().unwrap();
        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, 50);
        assert_eq!(query.extra.get("exchange").map(String::as_str), Some("SSE"));
        assert_eq!(fx.session.total(), 52);
        assert_eq!(fx.session.items().len(), 2);
        assert_eq!(names(fx.session.fields()), vec!["name", "rate", "code", "updated_at"]);
        assert_eq!(fx.session.display_name(), "Bond Info");
        assert_eq!(fx.session.stats().map(|s| s.total_count), Some(52));
        assert!(!fx.session.is_loading());
    }

    #[tokio::test]
    async fn test_load_failure_notifies_and_resets_loading() {
        let mut fx = fixture(Domain::Currencies, "currency_latest");
        fx.api.fail_next("collection_data");

        assert!(fx.session.load_data().await.is_err());
        assert!(!fx.session.is_loading());
        let notices = fx.notifier.take();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("Currency operation failed"));
    }

    #[tokio::test]
    async fn test_sort_and_filter_reload() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        fx.session
            .set_sort(Some(("rate".into(), SortDirection::Asc)))
            .await
            .unwrap();
        let query = fx.api.last_query.lock().clone().unwrap();
        assert_eq!(query.sort_by.as_deref(), Some("rate"));
        assert_eq!(query.sort_dir, SortDirection::Asc);

        fx.session.set_sort(None).await.unwrap();
        assert_eq!(fx.session.sort(), (None, SortDirection::Desc));

        fx.session.set_page(3).await.unwrap();
        fx.session
            .set_filter(Some("name".into()), Some(String::new()))
            .await
            .unwrap();
        assert_eq!(fx.session.filter(), (Some("name"), None));
        assert_eq!(fx.session.page(), 1);
        assert_eq!(fx.api.calls("collection_data"), 4);
    }

    #[tokio::test]
    async fn test_export_does_not_touch_listing() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        fx.session.load_data().await.unwrap();
        fx.session.set_extra_filter("exchange", "SZSE");
        let before = (fx.session.items().to_vec(), fx.session.total(), fx.session.page());
        let dir = tempfile::tempdir().unwrap();

        let path = fx.session.export("bonds", FileFormat::Json, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("bonds.json"));
        assert_eq!(before, (fx.session.items().to_vec(), fx.session.total(), fx.session.page()));
        let request = fx.api.export_requests.lock()[0].clone();
        assert_eq!(request.extra.get("exchange").map(String::as_str), Some("SZSE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_refresh_reloads_on_completion() {
        let mut fx = fixture(Domain::Funds, "fund_name_em");
        enable_updates(&fx.api);
        fx.api.push_status(Ok(task(TaskStatus::Running, Some(4.0), Some(10.0))));
        let mut done = task(TaskStatus::Completed, Some(10.0), Some(10.0));
        done.result = Some(TaskResult {
            saved_rows: Some(12_000),
            ..TaskResult::default()
        });
        fx.api.push_status(Ok(done));

        fx.session.load_update_config().await.unwrap();
        let start = fx.session.batch_update().await.unwrap();
        assert!(matches!(start, RefreshStart::Tracked { .. }));
        assert!(fx.session.is_refreshing());
        assert!(matches!(
            fx.session.single_update().await,
            Err(AppError::Busy(_))
        ));

        let outcome = fx.session.await_refresh().await.unwrap().unwrap();
        assert!(outcome.is_success());
        assert_eq!(fx.api.calls("collection_data"), 1);

        let progress = fx.session.current_progress();
        assert_eq!(progress.percentage, 100);
        assert_eq!(progress.status, Some(ProgressStatus::Success));
        assert_eq!(progress.message, "Saved 12,000 rows");
        let notices = fx.notifier.take();
        assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Success));
        assert!(!fx.session.is_refreshing());
        assert!(fx.session.await_refresh().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_synchronous_refresh_completes_immediately() {
        let mut fx = fixture(Domain::Funds, "fund_hk_hist_em");
        enable_updates(&fx.api);
        *fx.api.refresh_start.lock() = RefreshStart::Completed {
            message: None,
            result: Map::new(),
        };

        fx.session.load_update_config().await.unwrap();
        fx.session.update_form_mut().set_single("year", json!("2023"));
        fx.session.single_update().await.unwrap();

        let request = fx.api.refresh_requests.lock()[0].clone();
        assert_eq!(request.update_type, UpdateType::Single);
        assert_eq!(request.params.get("year"), Some(&json!(2023)));
        assert_eq!(fx.session.current_progress().message, "Single update complete");
        assert_eq!(fx.api.calls("collection_data"), 1);
        assert!(!fx.session.is_refreshing());

        fx.session.reset_progress();
        assert_eq!(fx.session.current_progress(), Progress::default());
    }

    #[tokio::test]
    async fn test_update_requires_enabled_config() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        assert!(matches!(
            fx.session.batch_update().await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(fx.api.calls("refresh"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stops_tracking() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        enable_updates(&fx.api);
        fx.session.load_update_config().await.unwrap();
        fx.session.batch_update().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        fx.session.cleanup();
        let calls = fx.api.calls("task_status");
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        assert_eq!(fx.api.calls("task_status"), calls);
        assert!(!fx.session.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unawaited_failure_is_notified_before_next_refresh() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        enable_updates(&fx.api);
        let mut failed = task(TaskStatus::Failed, None, None);
        failed.error = Some("provider offline".into());
        fx.api.push_status(Ok(failed));

        fx.session.load_update_config().await.unwrap();
        fx.session.batch_update().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!fx.session.is_refreshing());

        let errors: Vec<_> = fx
            .notifier
            .take()
            .into_iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "provider offline");

        fx.session.single_update().await.unwrap();
        assert!(fx.session.is_refreshing());
        assert_eq!(fx.api.calls("collection_data"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unawaited_success_reloads_on_next_refresh() {
        let mut fx = fixture(Domain::Funds, "fund_name_em");
        enable_updates(&fx.api);
        fx.api.push_status(Ok(task(TaskStatus::Success, Some(10.0), Some(10.0))));

        fx.session.load_update_config().await.unwrap();
        fx.session.batch_update().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(
            fx.notifier.take().last().map(|n| n.level),
            Some(NoticeLevel::Success)
        );
        assert_eq!(fx.api.calls("collection_data"), 0);

        let reaped = fx.session.reap_refresh().await.unwrap();
        assert!(reaped.map_or(false, |o| o.is_success()));
        assert_eq!(fx.api.calls("collection_data"), 1);
        assert!(fx.session.reap_refresh().await.unwrap().is_none());

        fx.api.push_status(Ok(task(TaskStatus::Success, None, None)));
        fx.session.single_update().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        fx.session.batch_update().await.unwrap();
        assert_eq!(fx.api.calls("collection_data"), 2);
    }

    #[tokio::test]
    async fn test_import_and_remote_sync() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bonds.csv");
        std::fs::write(&file, b"code\n1\n").unwrap();

        let imported = fx.session.import_file(&file).await.unwrap();
        assert_eq!(imported.message.as_deref(), Some("Imported 1 rows"));
        assert_eq!(fx.api.uploads.lock()[0].0, "bonds.csv");

        let config = RemoteSyncConfig {
            host: "10.0.0.5".into(),
            ..RemoteSyncConfig::default()
        };
        let stats = fx.session.remote_sync(&config).await.unwrap();
        assert_eq!(stats.inserted, 3);
        assert_eq!(fx.session.remote_sync_stats(), Some(&stats));
        assert_eq!(
            fx.api.sync_payloads.lock()[0],
            json!({"remote_host": "10.0.0.5", "remote_collection": "bond_info_cm"})
        );
        assert_eq!(fx.api.calls("collection_data"), 2);

        let missing_host = RemoteSyncConfig::default();
        assert!(fx.session.remote_sync(&missing_host).await.is_err());
        assert!(fx.session.remote_sync_stats().is_none());
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let mut fx = fixture(Domain::Bonds, "bond_info_cm");

        let declined = fx.session.clear_data(&|_: &str| false).await.unwrap();
        assert_eq!(declined, None);
        assert_eq!(fx.api.calls("clear"), 0);

        let cleared = fx.session.clear_data(&|prompt: &str| prompt.contains("bond_info_cm") || prompt.contains("Bond Info")).await.unwrap();
        assert_eq!(cleared, Some(42));
        let notices = fx.notifier.take();
        assert!(notices.iter().any(|n| n.message == "Cleared 42 records"));
    }
}
