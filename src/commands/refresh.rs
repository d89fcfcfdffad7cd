//! Refresh command: start a single or batch update and follow its task

use crate::api::types::{RefreshStart, UpdateMode};
use crate::api::Domain;
use crate::error::{AppError, Result};
use crate::services::refresh_poller::{PollOutcome, Progress};
use crate::services::update_form::parse_assignment;
use crate::state::AppState;
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::to_json;

#[derive(Debug, Clone, Args)]
pub struct RefreshArgs {
    /// Run a batch update instead of a single update
    #[arg(long, default_value_t = false)]
    pub batch: bool,

    /// Batch update mode: incremental or full
    #[arg(long, default_value = "incremental")]
    pub mode: UpdateMode,

    /// Update parameter (repeatable), typed by the declared parameter kind
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Return right after the task is created
    #[arg(long, default_value_t = false)]
    pub no_wait: bool,
}

#[derive(Debug, Serialize)]
struct RefreshReport {
    start: RefreshStart,
    outcome: Option<PollOutcome>,
    progress: Progress,
}

pub async fn refresh(state: &AppState, domain: Domain, name: &str, args: &RefreshArgs) -> Result<Value> {
    state.require_auth()?;
    let mut session = state.session(domain, name)?;
    session.load_update_config().await?;

    let form = session.update_form_mut();
    form.update_mode = args.mode;
    for raw in &args.params {
        let (key, text) = parse_assignment(raw)?;
        if args.batch {
            form.set_batch_text(&key, &text)?;
        } else {
            form.set_single_text(&key, &text)?;
        }
    }

    let start = if args.batch {
        session.batch_update().await?
    } else {
        session.single_update().await?
    };

    let outcome = match (&start, args.no_wait) {
        (RefreshStart::Tracked { task_id, .. }, false) => {
            info!("Following task {}", task_id);
            let mut progress = session.progress();
            let reporter = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let p = progress.borrow_and_update().clone();
                    info!("[{:>3}%] {}", p.percentage, p.message);
                }
            });
            let outcome = session.await_refresh().await;
            reporter.abort();
            outcome?
        }
        _ => None,
    };

    let report = RefreshReport {
        start,
        progress: session.current_progress(),
        outcome,
    };
    let value = to_json(&report)?;

    match &report.outcome {
        Some(PollOutcome::Failed { message }) => Err(AppError::TaskFailed(message.clone())),
        Some(PollOutcome::Unreachable { message, .. }) => Err(AppError::TaskFailed(message.clone())),
        _ => Ok(value),
    }
}
