//! Command handlers behind the `marketdata-admin` binary
//!
//! Each handler takes the shared `AppState`, runs one operation and returns
//! a JSON value for the front end to print.

pub mod auth;
pub mod collections;
pub mod logs;
pub mod refresh;
pub mod sync;

use crate::error::Result;
use crate::services::collection_service::Confirm;
use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, Write};

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Confirmation read from the terminal, or granted up front with `--yes`
pub struct TerminalConfirm {
    pub assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let mut stderr = std::io::stderr();
        if write!(stderr, "{} [y/N] ", prompt).and_then(|_| stderr.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
