//! HTTP chat clients built on reqwest.
//!
//! Two implementations cover the two credential shapes:
//!
//! * [`OpenAiCompatClient`] — any endpoint speaking the
//!   `/chat/completions` dialect with a static bearer API key
//!   (Gemini's OpenAI-compatible surface, Perplexity).
//! * [`OauthChatClient`] — endpoints whose bearer token is short-lived and
//!   comes from a client-credentials exchange; it owns a
//!   [`TokenManager`] and retries once after a 401 with a fresh token.
//!
//! Both classify every failure into a [`ProviderError`] variant so the
//! router can branch on the error kind instead of matching strings.

use crate::error::{AnalysisError, ProviderError};
use crate::llm::provider::{ChatClient, ChatRequest};
use crate::llm::token::{FetchedToken, TokenFetcher, TokenManager};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const COMPLETION_TEMPERATURE: f64 = 0.2;
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(1800);

/// Map an HTTP status from a chat endpoint onto the provider error
/// taxonomy. 401/403 is an auth failure; 429 and every 5xx is transient;
/// anything else non-2xx is "other".
fn classify_status(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("HTTP {} - {}", status.as_u16(), truncate(body, 300));
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::Auth {
            provider: provider.into(),
            detail,
        }
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient {
            provider: provider.into(),
            detail,
        }
    } else {
        ProviderError::Other {
            provider: provider.into(),
            detail,
        }
    }
}

/// Map a reqwest transport error. Timeouts and connection failures are
/// transient: a missed deadline is retry/failover material, not a
/// distinct error class.
fn classify_transport(provider: &str, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Transient {
            provider: provider.into(),
            detail: e.to_string(),
        }
    } else {
        ProviderError::Other {
            provider: provider.into(),
            detail: e.to_string(),
        }
    }
}

/// Pull the assistant text out of a chat-completion response body.
///
/// Providers disagree on the envelope, so three shapes are accepted in
/// order: the OpenAI `choices[0].message.content` form (with `message`
/// occasionally being a bare string), flat `content`/`text`/`message`
/// fields, and a bare JSON string.
fn extract_content(data: &Value) -> Option<String> {
    if let Some(choices) = data.get("choices").and_then(Value::as_array) {
        if let Some(message) = choices.first().and_then(|c| c.get("message")) {
            match message {
                Value::String(s) if !s.is_empty() => return Some(s.clone()),
                _ => {
                    if let Some(s) = message.get("content").and_then(Value::as_str) {
                        if !s.is_empty() {
                            return Some(s.to_owned());
                        }
                    }
                }
            }
        }
    }
    for key in ["content", "text", "message"] {
        if let Some(s) = data.get(key).and_then(Value::as_str) {
            if !s.is_empty() {
                return Some(s.to_owned());
            }
        }
    }
    match data {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn chat_body(model: &str, request: &ChatRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));
    json!({
        "model": model,
        "messages": messages,
        "temperature": COMPLETION_TEMPERATURE,
    })
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AnalysisError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AnalysisError::Internal(format!("HTTP client build failed: {e}")))
}

// ── OpenAI-compatible client ─────────────────────────────────────────────

/// Chat client for OpenAI-compatible `/chat/completions` endpoints with a
/// static API key.
pub struct OpenAiCompatClient {
    provider: String,
    model: String,
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        Ok(Self {
            provider: provider.into(),
            model: model.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            http: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&chat_body(&self.model, request))
            .send()
            .await
            .map_err(|e| classify_transport(&self.provider, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&self.provider, e))?;

        if !status.is_success() {
            return Err(classify_status(&self.provider, status, &body));
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| ProviderError::Other {
            provider: self.provider.clone(),
            detail: format!("malformed response body: {e}"),
        })?;

        extract_content(&data).ok_or_else(|| ProviderError::Empty {
            provider: self.provider.clone(),
        })
    }
}

// ── OAuth bearer flow ────────────────────────────────────────────────────

/// Token fetcher for client-credentials endpoints: posts the scope with a
/// `Basic` authorization key and parses `access_token` plus either
/// `expires_in` (seconds) or `expires_at` (unix timestamp, s or ms).
pub struct OauthTokenFetcher {
    provider: String,
    auth_url: String,
    auth_key: String,
    scope: String,
    http: reqwest::Client,
}

impl OauthTokenFetcher {
    pub fn new(
        provider: impl Into<String>,
        auth_url: impl Into<String>,
        auth_key: impl Into<String>,
        scope: impl Into<String>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| AnalysisError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            provider: provider.into(),
            auth_url: auth_url.into(),
            auth_key: auth_key.into(),
            scope: scope.into(),
            http,
        })
    }
}

/// Turn a token response body into a TTL.
///
/// `expires_in` wins when present. `expires_at` above 1e10 is taken as
/// milliseconds (unix-seconds values stay below that for centuries).
fn ttl_from_token_response(data: &Value, now_unix_secs: f64) -> Duration {
    if let Some(expires_in) = data.get("expires_in").and_then(Value::as_i64) {
        return Duration::from_secs(expires_in.max(0) as u64);
    }
    if let Some(raw) = data.get("expires_at").and_then(Value::as_f64) {
        let expires_at_secs = if raw > 1e10 { raw / 1000.0 } else { raw };
        let remaining = expires_at_secs - now_unix_secs;
        if remaining > 0.0 {
            return Duration::from_secs_f64(remaining);
        }
        return Duration::ZERO;
    }
    DEFAULT_TOKEN_TTL
}

#[async_trait]
impl TokenFetcher for OauthTokenFetcher {
    async fn fetch(&self) -> Result<FetchedToken, ProviderError> {
        let response = self
            .http
            .post(&self.auth_url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Basic {}", self.auth_key))
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| classify_transport(&self.provider, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&self.provider, e))?;

        if !status.is_success() {
            // Rate limits on the token endpoint stay transient; any other
            // refusal of the credential exchange is an auth failure.
            return Err(match classify_status(&self.provider, status, &body) {
                transient @ ProviderError::Transient { .. } => transient,
                other => ProviderError::Auth {
                    provider: self.provider.clone(),
                    detail: other.to_string(),
                },
            });
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| ProviderError::Other {
            provider: self.provider.clone(),
            detail: format!("malformed token response: {e}"),
        })?;

        let secret = data
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Auth {
                provider: self.provider.clone(),
                detail: "token response without access_token".into(),
            })?
            .to_owned();

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Ok(FetchedToken {
            secret,
            ttl: ttl_from_token_response(&data, now),
        })
    }
}

/// Chat client whose bearer token comes from a [`TokenManager`].
///
/// A 401 from the chat endpoint invalidates the cached token and the call
/// is retried once with a fresh one; a second 401 is a real auth failure.
pub struct OauthChatClient {
    provider: String,
    model: String,
    endpoint: String,
    tokens: TokenManager,
    http: reqwest::Client,
}

impl OauthChatClient {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        api_base: &str,
        fetcher: Arc<dyn TokenFetcher>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| AnalysisError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            provider: provider.into(),
            model: model.into(),
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            tokens: TokenManager::new(fetcher),
            http,
        })
    }

    async fn complete_once(&self, token: &str, request: &ChatRequest) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .bearer_auth(token)
            .json(&chat_body(&self.model, request))
            .send()
            .await
            .map_err(|e| classify_transport(&self.provider, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&self.provider, e))?;

        if !status.is_success() {
            return Err(classify_status(&self.provider, status, &body));
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| ProviderError::Other {
            provider: self.provider.clone(),
            detail: format!("malformed response body: {e}"),
        })?;

        extract_content(&data).ok_or_else(|| ProviderError::Empty {
            provider: self.provider.clone(),
        })
    }
}

#[async_trait]
impl ChatClient for OauthChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let token = self.tokens.bearer().await?;
        match self.complete_once(&token, request).await {
            Err(ProviderError::Auth { .. }) => {
                tracing::info!("{}: access token rejected, refreshing", self.provider);
                self.tokens.invalidate().await;
                let token = self.tokens.bearer().await?;
                self.complete_once(&token, request).await
            }
            other => other,
        }
    }
}
