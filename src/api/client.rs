//! HTTP client for the market data backend
//!
//! Every JSON endpoint answers with the `{success, data, error, message}`
//! envelope. Non-2xx statuses and `success: false` both become `AppError`s
//! carrying the server's own message when it sent one.

use crate::api::types::ApiEnvelope;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use parking_lot::RwLock;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Shared HTTP client. Cloning is cheap and shares the session token.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
    export_timeout: Duration,
    upload_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let client = Self {
            http,
            base_url: parse_base_url(&config.base_url)?,
            token: Arc::new(RwLock::new(None)),
            export_timeout: config.export_timeout(),
            upload_timeout: config.upload_timeout(),
        };
        client.set_token(config.token.clone());
        Ok(client)
    }

    /// Client with default timeouts against `base_url`
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let config = AppConfig {
            base_url: base_url.to_string(),
            ..AppConfig::default()
        };
        Self::new(&config)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.is_empty());
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        debug!("{} {}", method, url);
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.token.read().as_deref() {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    // ------------------------------------------------------------------
    // Enveloped JSON
    // ------------------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        let builder = self.request(Method::GET, path)?.query(query);
        send_envelope(builder).await?.into_data()
    }

    pub async fn post<T, B>(&self, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_envelope(path, body, None).await?.into_data()
    }

    /// POST returning the whole envelope, for endpoints that put useful
    /// text in the top-level `message`
    pub async fn post_envelope<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        timeout: Option<Duration>,
    ) -> Result<ApiEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut builder = self.request(Method::POST, path)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        send_envelope(builder).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.request(Method::PUT, path)?.json(body);
        send_envelope(builder).await?.into_data()
    }

    pub async fn delete_envelope<T: DeserializeOwned>(&self, path: &str) -> Result<ApiEnvelope<T>> {
        let builder = self.request(Method::DELETE, path)?;
        send_envelope(builder).await
    }

    /// Multipart upload of one file in the `file` field
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ApiEnvelope<T>> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let builder = self
            .request(Method::POST, path)?
            .multipart(form)
            .timeout(self.upload_timeout);
        send_envelope(builder).await
    }

    // ------------------------------------------------------------------
    // Loosely enveloped and binary endpoints
    // ------------------------------------------------------------------

    /// GET against an endpoint that may or may not wrap its payload
    pub async fn get_loose<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let builder = self.request(Method::GET, path)?.query(query);
        let response = check_status(builder.send().await?).await?;
        response.json::<MaybeEnveloped<T>>().await?.into_data()
    }

    pub async fn post_loose<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.request(Method::POST, path)?.json(body);
        let response = check_status(builder.send().await?).await?;
        response.json::<MaybeEnveloped<T>>().await?.into_data()
    }

    /// POST a JSON body and return the raw response bytes (export endpoints)
    pub async fn download<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Vec<u8>> {
        let builder = self
            .request(Method::POST, path)?
            .json(body)
            .timeout(self.export_timeout);
        let response = check_status(builder.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    // A base without a trailing slash would drop its last segment on join
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn send_envelope<T: DeserializeOwned>(builder: RequestBuilder) -> Result<ApiEnvelope<T>> {
    let response = check_status(builder.send().await?).await?;
    let envelope: ApiEnvelope<T> = response.json().await?;
    envelope.check()
}

/// Map a non-2xx response to `AppError::Api` with the body's message
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body);
    warn!("Backend answered {}: {:?}", status, message);
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Pull `error` / `detail` / `message` out of an error body
pub(crate) fn error_message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(text_of)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("message").and_then(text_of),
        // FastAPI validation errors: [{"msg": ...}, ...]
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(text_of)),
        _ => None,
    }
}

impl<T> ApiEnvelope<T> {
    /// Reject `success: false` envelopes
    pub fn check(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(AppError::Envelope(self.failure_message()))
    }

    pub fn failure_message(&self) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.error.as_deref().filter(|m| !m.is_empty()))
            .map(str::to_string)
            .or_else(|| self.detail.as_ref().and_then(text_of))
            .unwrap_or_else(|| "Request failed".to_string())
    }

    /// The `data` payload of a successful envelope
    pub fn into_data(self) -> Result<T> {
        let envelope = self.check()?;
        envelope
            .data
            .ok_or_else(|| AppError::Envelope("Response carried no data".to_string()))
    }
}

/// Payload that may arrive bare or inside the standard envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaybeEnveloped<T> {
    Enveloped(ApiEnvelope<T>),
    Bare(T),
}

impl<T> MaybeEnveloped<T> {
    fn into_data(self) -> Result<T> {
        match self {
            MaybeEnveloped::Enveloped(envelope) => envelope.into_data(),
            MaybeEnveloped::Bare(data) => Ok(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_keeps_prefix() {
        let client = ApiClient::with_base_url("http://localhost:8000/backend").unwrap();
        assert_eq!(
            client.url("/api/bonds/collections").unwrap().as_str(),
            "http://localhost:8000/backend/api/bonds/collections"
        );
    }

    #[test]
    fn test_token_is_optional() {
        let client = ApiClient::with_base_url("http://localhost:8000").unwrap();
        assert!(!client.has_token());
        client.set_token(Some(String::new()));
        assert!(!client.has_token());
        client.set_token(Some("abc".into()));
        assert!(client.clone().has_token());
    }

    #[test]
    fn test_error_message_from_body() {
        assert_eq!(
            error_message_from_body(r#"{"detail": "Collection not found"}"#).as_deref(),
            Some("Collection not found")
        );
        assert_eq!(
            error_message_from_body(r#"{"error": {"message": "bad filter"}}"#).as_deref(),
            Some("bad filter")
        );
        assert_eq!(
            error_message_from_body(r#"{"detail": [{"msg": "field required"}]}"#).as_deref(),
            Some("field required")
        );
        assert_eq!(error_message_from_body("<html>oops</html>"), None);
    }

    #[test]
    fn test_envelope_rejection_uses_message() {
        let envelope: ApiEnvelope<Value> =
            serde_json::from_value(json!({"success": false, "error": "unknown collection"})).unwrap();
        match envelope.into_data() {
            Err(AppError::Envelope(message)) => assert_eq!(message, "unknown collection"),
            other => panic!("unexpected result: {:?}", other),
        }

        let envelope: ApiEnvelope<Value> =
            serde_json::from_value(json!({"success": false})).unwrap();
        assert_eq!(envelope.failure_message(), "Request failed");
    }

    #[test]
    fn test_maybe_enveloped_accepts_both_shapes() {
        let bare: MaybeEnveloped<Vec<String>> = serde_json::from_value(json!(["a.log"])).unwrap();
        assert_eq!(bare.into_data().unwrap(), vec!["a.log".to_string()]);

        let wrapped: MaybeEnveloped<Vec<String>> =
            serde_json::from_value(json!({"success": true, "data": ["b.log"]})).unwrap();
        assert_eq!(wrapped.into_data().unwrap(), vec!["b.log".to_string()]);
    }
}
