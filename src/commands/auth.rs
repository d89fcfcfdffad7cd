//! Session commands

use crate::error::Result;
use crate::state::AppState;
use serde::Serialize;
use serde_json::Value;

use super::to_json;

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub require_auth: bool,
    pub base_url: String,
    pub saved_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Save a session token for later commands
pub fn login(state: &AppState, token: &str) -> Result<Value> {
    let session = state.login(token)?;
    tracing::info!("Logged in against {}", session.base_url);
    status(state)
}

pub fn logout(state: &AppState) -> Result<Value> {
    let removed = state.logout()?;
    Ok(serde_json::json!({ "logged_out": removed }))
}

pub fn status(state: &AppState) -> Result<Value> {
    let saved = state.saved_session()?;
    to_json(&AuthStatus {
        authenticated: state.is_authenticated(),
        require_auth: state.config.require_auth,
        base_url: state.config.base_url.clone(),
        saved_at: saved.map(|s| s.saved_at),
    })
}
