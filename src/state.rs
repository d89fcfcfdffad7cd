//! Application state management

use crate::api::logs::LogsApi;
use crate::api::sync::SyncApi;
use crate::api::{ApiClient, ApiRegistry, Domain};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::security::{StoredSession, TokenStore};
use crate::services::collection_service::CollectionSession;
use crate::services::notifier::{Notifier, TracingNotifier};
use crate::stores::{CollectionStore, StoreRegistry};
use std::sync::Arc;

/// Everything a front end needs to talk to the backend
pub struct AppState {
    pub config: AppConfig,
    pub client: ApiClient,
    pub apis: Arc<ApiRegistry>,
    pub stores: Arc<StoreRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub sync: SyncApi,
    pub logs: LogsApi,
    tokens: TokenStore,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let data_dir = config.data_dir();
        tracing::debug!("Data directory: {:?}", data_dir);

        let client = ApiClient::new(&config)?;
        let tokens = TokenStore::new(&data_dir);

        // An explicit token from config or environment wins over the saved one
        if !client.has_token() {
            match tokens.load() {
                Ok(Some(session)) if session.matches_base_url(&config.base_url) => {
                    client.set_token(Some(session.token))
                }
                Ok(Some(session)) => tracing::warn!(
                    "Saved session belongs to {}, not {}; log in again",
                    session.base_url,
                    config.base_url
                ),
                Ok(None) => {}
                Err(e) => tracing::warn!("Ignoring unreadable session file: {}", e),
            }
        }

        let apis = Arc::new(ApiRegistry::new(&client));
        let stores = Arc::new(StoreRegistry::new(
            &apis,
            notifier.clone(),
            config.collections_ttl(),
        ));

        Ok(Self {
            sync: SyncApi::new(client.clone()),
            logs: LogsApi::new(client.clone()),
            config,
            client,
            apis,
            stores,
            notifier,
            tokens,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.has_token()
    }

    /// Guard for every backend command
    pub fn require_auth(&self) -> Result<()> {
        if self.config.require_auth && !self.is_authenticated() {
            return Err(AppError::Auth(
                "Login required: run `auth login --token <TOKEN>` first".to_string(),
            ));
        }
        Ok(())
    }

    /// Persist a session token and start using it
    pub fn login(&self, token: &str) -> Result<StoredSession> {
        let session = self.tokens.save(token, &self.config.base_url)?;
        self.client.set_token(Some(session.token.clone()));
        tracing::info!("Session saved to {}", self.tokens.path().display());
        Ok(session)
    }

    /// Forget the saved session. Returns whether one existed.
    pub fn logout(&self) -> Result<bool> {
        self.client.set_token(None);
        self.tokens.clear()
    }

    pub fn saved_session(&self) -> Result<Option<StoredSession>> {
        self.tokens.load()
    }

    pub fn store(&self, domain: Domain) -> Result<Arc<CollectionStore>> {
        self.stores
            .get(domain)
            .ok_or_else(|| AppError::NotFound(format!("No store for domain {}", domain)))
    }

    /// Open a browsing session on one collection
    pub fn session(&self, domain: Domain, collection: &str) -> Result<CollectionSession> {
        if collection.trim().is_empty() {
            return Err(AppError::Validation("Collection name is required".to_string()));
        }
        Ok(CollectionSession::new(
            collection.trim(),
            self.store(domain)?,
            self.notifier.clone(),
            self.config.poll.clone(),
            self.config.default_page_size,
        ))
    }
}
