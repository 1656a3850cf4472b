//! Provider specifications and the client seam the router calls through.
//!
//! [`ProviderSpec`] is static data: name, model, credential. It is built
//! once from the available credentials and its list order **is** the
//! failover priority. The [`ChatClient`] trait is the seam that lets the
//! test suite drive the router with scripted fakes instead of live HTTP.

use crate::error::ProviderError;
use async_trait::async_trait;

/// Credential material for one provider.
///
/// The secret is deliberately excluded from `Debug` output.
#[derive(Clone)]
pub enum Credential {
    /// Plain bearer API key for OpenAI-compatible endpoints.
    ApiKey(String),
    /// OAuth client-credentials flow: the key is exchanged for a
    /// short-lived bearer token via a token endpoint.
    OAuth { auth_key: String, scope: String },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::OAuth { scope, .. } => {
                f.debug_struct("OAuth").field("scope", scope).finish_non_exhaustive()
            }
        }
    }
}

/// One configured LM provider. Built once at router construction; the
/// position in the provider list is the failover priority.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub model: String,
    pub credential: Credential,
    /// Providers with a bespoke HTTP surface (OAuth bearer flow) bypass
    /// the generic OpenAI-compatible client.
    pub uses_direct_client: bool,
}

impl ProviderSpec {
    /// Collect provider specs from conventional environment variables, in
    /// failover priority order. Missing keys simply skip the provider.
    ///
    /// 1. `GEMINI_API_KEY` → gemini / gemini-2.5-flash-lite
    /// 2. `PERPLEXITY_API_KEY` (or `PERPLEXITYAI_API_KEY`) → perplexity / sonar
    /// 3. `GIGACHAT_AUTH_KEY` (+ `GIGACHAT_SCOPE`, `GIGACHAT_MODEL`) →
    ///    gigachat via the OAuth bearer flow
    pub fn from_env() -> Vec<ProviderSpec> {
        let mut specs = Vec::new();

        if let Some(key) = non_empty_env("GEMINI_API_KEY") {
            specs.push(ProviderSpec {
                name: "gemini".into(),
                model: "gemini-2.5-flash-lite".into(),
                credential: Credential::ApiKey(key),
                uses_direct_client: false,
            });
            tracing::info!("Gemini provider enabled");
        }

        if let Some(key) =
            non_empty_env("PERPLEXITY_API_KEY").or_else(|| non_empty_env("PERPLEXITYAI_API_KEY"))
        {
            specs.push(ProviderSpec {
                name: "perplexity".into(),
                model: "sonar".into(),
                credential: Credential::ApiKey(key),
                uses_direct_client: false,
            });
            tracing::info!("Perplexity provider enabled (model: sonar)");
        }

        if let Some(auth_key) = non_empty_env("GIGACHAT_AUTH_KEY") {
            let scope =
                non_empty_env("GIGACHAT_SCOPE").unwrap_or_else(|| "GIGACHAT_API_PERS".into());
            let model = non_empty_env("GIGACHAT_MODEL").unwrap_or_else(|| "GigaChat-2".into());
            specs.push(ProviderSpec {
                name: "gigachat".into(),
                model,
                credential: Credential::OAuth { auth_key, scope },
                uses_direct_client: true,
            });
            tracing::info!("GigaChat provider enabled");
        }

        specs
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// One generation request: a user prompt plus an optional system prompt.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
}

impl ChatRequest {
    pub fn new(system_prompt: Option<&str>, prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.map(str::to_owned),
            prompt: prompt.to_owned(),
        }
    }
}

/// A chat-completion backend for one provider.
///
/// Implementations classify every failure into a
/// [`ProviderError`] variant; the router's retry/failover decisions hang
/// off that classification, not off string matching.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Issue one generation call and return the assistant text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let dbg = format!("{:?}", Credential::ApiKey("sk-secret".into()));
        assert!(!dbg.contains("sk-secret"));

        let dbg = format!(
            "{:?}",
            Credential::OAuth {
                auth_key: "base64secret".into(),
                scope: "API_PERS".into()
            }
        );
        assert!(!dbg.contains("base64secret"));
        assert!(dbg.contains("API_PERS"));
    }
}
