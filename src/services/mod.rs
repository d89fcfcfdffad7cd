//! Services Layer
//!
//! Logic shared by the CLI commands and any embedding program. Commands stay
//! thin: they parse arguments, open a session and serialize the result.
//!
//! # Architecture
//!
//! ```text
//! CLI commands --> Services ──> Stores ──> CollectionApi --> Admin backend
//!                     └──> Notifier (user-facing notices)
//! ```
//!
//! # Services
//!
//! - `CollectionSession` - Per-collection view: paging, sorting, filtering, refresh, import, clear
//! - `UpdateForm` - Single/batch refresh parameter form
//! - `refresh_poller` - Background task polling and progress reporting
//! - `export_service` - Download exports and write them to disk
//! - `Notifier` - Success/error notices

pub mod collection_service;
pub mod export_service;
pub mod notifier;
pub mod refresh_poller;
pub mod update_form;

pub use collection_service::{CollectionSession, Confirm, PageSnapshot, ViewOptions};
pub use notifier::{MemoryNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use refresh_poller::{PollHandle, PollOutcome, PollTracker, Progress, ProgressStatus};
pub use update_form::UpdateForm;
