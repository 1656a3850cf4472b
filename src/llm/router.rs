//! Ordered provider chain with retry, backoff, and failover.
//!
//! ## Retry strategy
//!
//! 429 / 503 / connect failures are transient and frequent under load.
//! The router retries the *same* provider with exponential backoff
//! (`backoff_base × 2^attempt`, base 2 s), bounded by the caller's retry
//! budget. Auth failures skip the provider immediately — retrying a bad
//! credential cannot succeed — and any other failure fails over after one
//! attempt. Only when every provider is exhausted does the router give up,
//! and the aggregate error names the last provider and its last error so
//! the failure is diagnosable from the log line alone.
//!
//! The state machine per call is `NotStarted → TryingProvider(i) →
//! {Succeeded | TryingProvider(i+1) | AllFailed}`; nothing is persisted
//! across calls.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ProviderError};
use crate::llm::http::{OauthChatClient, OauthTokenFetcher, OpenAiCompatClient};
use crate::llm::provider::{ChatClient, ChatRequest, Credential, ProviderSpec};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const PERPLEXITY_BASE: &str = "https://api.perplexity.ai";
const GIGACHAT_API_BASE: &str = "https://gigachat.devices.sberbank.ru/api/v1";
const GIGACHAT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";

/// A successful generation: the assistant text and which provider
/// produced it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub provider: String,
}

struct ConfiguredProvider {
    name: String,
    client: Arc<dyn ChatClient>,
}

/// Chain-of-responsibility over the configured providers.
pub struct LlmRouter {
    providers: Vec<ConfiguredProvider>,
    backoff_base: Duration,
}

impl LlmRouter {
    /// Build a router from pre-constructed clients (tests, custom stacks).
    /// List order is the failover priority.
    pub fn new(providers: Vec<(String, Arc<dyn ChatClient>)>, backoff_base: Duration) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|(name, client)| ConfiguredProvider { name, client })
                .collect(),
            backoff_base,
        }
    }

    /// Build a router from the environment-configured provider specs.
    ///
    /// An empty environment yields an empty router; the orchestrator
    /// treats that as "heuristic only" rather than an error.
    pub fn from_env(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Self::from_specs(&ProviderSpec::from_env(), config)
    }

    /// Build a router from explicit specs, wiring the HTTP client that
    /// matches each credential shape.
    pub fn from_specs(
        specs: &[ProviderSpec],
        config: &AnalysisConfig,
    ) -> Result<Self, AnalysisError> {
        let timeout = Duration::from_secs(config.api_timeout_secs);
        let mut providers = Vec::with_capacity(specs.len());

        for spec in specs {
            let client: Arc<dyn ChatClient> = match &spec.credential {
                Credential::ApiKey(key) => {
                    let base = match spec.name.as_str() {
                        "gemini" => GEMINI_OPENAI_BASE,
                        "perplexity" => PERPLEXITY_BASE,
                        other => {
                            warn!("No known endpoint for provider '{}', skipping", other);
                            continue;
                        }
                    };
                    Arc::new(OpenAiCompatClient::new(
                        spec.name.clone(),
                        spec.model.clone(),
                        base,
                        key.clone(),
                        timeout,
                    )?)
                }
                Credential::OAuth { auth_key, scope } => {
                    let insecure = std::env::var("GIGACHAT_ACCEPT_INVALID_CERTS")
                        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                        .unwrap_or(false);
                    let fetcher = Arc::new(OauthTokenFetcher::new(
                        spec.name.clone(),
                        GIGACHAT_AUTH_URL,
                        auth_key.clone(),
                        scope.clone(),
                        timeout,
                        insecure,
                    )?);
                    Arc::new(OauthChatClient::new(
                        spec.name.clone(),
                        spec.model.clone(),
                        GIGACHAT_API_BASE,
                        fetcher,
                        timeout,
                        insecure,
                    )?)
                }
            };
            providers.push(ConfiguredProvider {
                name: spec.name.clone(),
                client,
            });
        }

        Ok(Self {
            providers,
            backoff_base: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    /// Generate content, failing over through the provider chain.
    ///
    /// `max_retries` bounds the attempts per provider on transient
    /// failures. Returns the first usable completion, or
    /// [`AnalysisError::ProviderExhausted`] naming the last provider and
    /// its last error.
    pub async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        max_retries: u32,
    ) -> Result<Completion, AnalysisError> {
        if self.providers.is_empty() {
            return Err(AnalysisError::NoProvidersConfigured);
        }

        let request = ChatRequest::new(system_prompt, prompt);
        let attempts = max_retries.max(1);
        let mut last_error: Option<ProviderError> = None;

        'providers: for provider in &self.providers {
            info!("Trying provider '{}'", provider.name);

            for attempt in 0..attempts {
                if attempt > 0 {
                    let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                    warn!(
                        "{}: retry {}/{} after {:?}",
                        provider.name,
                        attempt,
                        attempts - 1,
                        backoff
                    );
                    sleep(backoff).await;
                }

                match provider.client.complete(&request).await {
                    Ok(content) if is_usable(&content) => {
                        info!("Got response from '{}'", provider.name);
                        return Ok(Completion {
                            content,
                            provider: provider.name.clone(),
                        });
                    }
                    Ok(_) => {
                        warn!("{}: empty response, failing over", provider.name);
                        last_error = Some(ProviderError::Empty {
                            provider: provider.name.clone(),
                        });
                        continue 'providers;
                    }
                    Err(e @ ProviderError::Transient { .. }) => {
                        warn!("{}: temporarily unavailable: {}", provider.name, e);
                        last_error = Some(e);
                        // falls through to the backoff-retry loop
                    }
                    Err(e @ ProviderError::Auth { .. }) => {
                        warn!("{}: authentication failed, skipping: {}", provider.name, e);
                        last_error = Some(e);
                        continue 'providers;
                    }
                    Err(e) => {
                        warn!("{}: failed: {}", provider.name, e);
                        last_error = Some(e);
                        continue 'providers;
                    }
                }
            }

            warn!("{}: retries exhausted, failing over", provider.name);
        }

        let (provider, detail) = match &last_error {
            Some(e) => (e.provider().to_owned(), e.to_string()),
            None => ("unknown".to_owned(), "no provider produced an error".to_owned()),
        };
        Err(AnalysisError::ProviderExhausted { provider, detail })
    }
}

/// A completion that is blank or a bare `{}` counts as a provider
/// failure: there is nothing for the normalizer to work with.
fn is_usable(content: &str) -> bool {
    let trimmed = content.trim();
    !trimmed.is_empty() && trimmed != "{}"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    enum Step {
        Ok(&'static str),
        Transient,
        Auth,
        Empty,
        Other,
    }

    struct ScriptedClient {
        name: &'static str,
        script: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(name: &'static str, steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                name,
                script: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Ok(s)) => Ok(s.to_string()),
                Some(Step::Empty) => Ok(String::new()),
                Some(Step::Transient) | None => Err(ProviderError::Transient {
                    provider: self.name.into(),
                    detail: "HTTP 503".into(),
                }),
                Some(Step::Auth) => Err(ProviderError::Auth {
                    provider: self.name.into(),
                    detail: "invalid key".into(),
                }),
                Some(Step::Other) => Err(ProviderError::Other {
                    provider: self.name.into(),
                    detail: "boom".into(),
                }),
            }
        }
    }

    fn router_of(clients: Vec<(&str, Arc<ScriptedClient>)>) -> LlmRouter {
        LlmRouter::new(
            clients
                .into_iter()
                .map(|(n, c)| (n.to_string(), c as Arc<dyn ChatClient>))
                .collect(),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn transient_failures_retry_same_provider_before_failover() {
        let a = ScriptedClient::new("a", vec![Step::Transient, Step::Transient, Step::Ok("{\"x\":1}")]);
        let b = ScriptedClient::new("b", vec![Step::Ok("{}")]);
        let router = router_of(vec![("a", a.clone()), ("b", b.clone())]);

        let result = router.generate(None, "p", 3).await.unwrap();
        assert_eq!(result.provider, "a");
        assert_eq!(result.content, "{\"x\":1}");
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 0, "provider b must never be invoked");
    }

    #[tokio::test]
    async fn auth_failure_skips_provider_without_retry() {
        let a = ScriptedClient::new("a", vec![Step::Auth]);
        let b = ScriptedClient::new("b", vec![Step::Ok("result")]);
        let router = router_of(vec![("a", a.clone()), ("b", b.clone())]);

        let result = router.generate(Some("sys"), "p", 3).await.unwrap();
        assert_eq!(result.provider, "b");
        assert_eq!(a.calls(), 1, "auth failure must not be retried");
    }

    #[tokio::test]
    async fn empty_content_fails_over() {
        let a = ScriptedClient::new("a", vec![Step::Empty]);
        let b = ScriptedClient::new("b", vec![Step::Ok("ok")]);
        let router = router_of(vec![("a", a.clone()), ("b", b.clone())]);

        let result = router.generate(None, "p", 2).await.unwrap();
        assert_eq!(result.provider, "b");
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn exhaustion_names_last_provider() {
        let a = ScriptedClient::new("a", vec![Step::Other]);
        let b = ScriptedClient::new("b", vec![Step::Transient, Step::Transient]);
        let router = router_of(vec![("a", a), ("b", b)]);

        let err = router.generate(None, "p", 2).await.unwrap_err();
        match err {
            AnalysisError::ProviderExhausted { provider, detail } => {
                assert_eq!(provider, "b");
                assert!(detail.contains("503"), "got: {detail}");
            }
            other => panic!("expected ProviderExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_router_reports_no_providers() {
        let router = LlmRouter::new(Vec::new(), Duration::from_millis(1));
        assert!(matches!(
            router.generate(None, "p", 1).await,
            Err(AnalysisError::NoProvidersConfigured)
        ));
    }

    #[test]
    fn usable_content_rules() {
        assert!(is_usable("{\"a\":1}"));
        assert!(!is_usable("   "));
        assert!(!is_usable("{}"));
        assert!(!is_usable("  {}  "));
    }
}
