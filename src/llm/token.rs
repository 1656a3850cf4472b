//! Bearer-token lifecycle for OAuth-style providers.
//!
//! ## Why a single critical section?
//!
//! Token endpoints are typically rate-limited far harder than the chat
//! endpoint they guard. If ten concurrent analyses each noticed an expired
//! token and fetched their own, nine fetches would be wasted and the tenth
//! might be refused outright. The [`TokenManager`] therefore holds one
//! `tokio::sync::Mutex` across the whole check-and-fetch: the first caller
//! fetches, everyone else parks on the lock and reuses the result. This is
//! the only place in the crate where a lock is held across a network call,
//! and that call is a single bounded HTTP round trip.
//!
//! The manager is an injected, explicitly owned object — one per
//! provider client — so tests can run as many independent instances as
//! they like.

use crate::error::ProviderError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Safety margin subtracted from the advertised token lifetime, so a
/// token is refreshed before the server starts rejecting it.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A freshly fetched bearer token and its advertised lifetime.
#[derive(Debug, Clone)]
pub struct FetchedToken {
    pub secret: String,
    pub ttl: Duration,
}

/// Fetches a fresh bearer token. Implemented over HTTP in
/// [`crate::llm::http`] and by counting fakes in the tests.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchedToken, ProviderError>;
}

#[derive(Debug)]
struct CachedToken {
    secret: String,
    expires_at: Instant,
}

/// Expiry-aware bearer-token cache shared by all calls through one
/// provider client.
pub struct TokenManager {
    fetcher: Arc<dyn TokenFetcher>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            fetcher,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, fetching a fresh one only when the
    /// cached token is missing or inside the expiry margin.
    ///
    /// Concurrent callers serialize on the internal mutex: at most one
    /// in-flight fetch exists per manager, and waiting callers reuse its
    /// result instead of issuing duplicates.
    pub async fn bearer(&self) -> Result<String, ProviderError> {
        let mut guard = self.cached.lock().await;

        if let Some(tok) = guard.as_ref() {
            if Instant::now() < tok.expires_at {
                return Ok(tok.secret.clone());
            }
        }

        let fresh = self.fetcher.fetch().await?;
        let lifetime = fresh.ttl.saturating_sub(EXPIRY_MARGIN);
        let cached = CachedToken {
            secret: fresh.secret.clone(),
            expires_at: Instant::now() + lifetime,
        };
        tracing::info!("access token refreshed (valid {:?})", lifetime);
        *guard = Some(cached);
        Ok(fresh.secret)
    }

    /// Drop the cached token so the next [`bearer`](Self::bearer) call
    /// fetches a fresh one. Used when the chat endpoint answers 401 with a
    /// token the cache still considered valid.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFetcher {
        calls: AtomicU32,
        ttl: Duration,
    }

    impl CountingFetcher {
        fn new(ttl: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                ttl,
            })
        }
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<FetchedToken, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(FetchedToken {
                secret: format!("token-{n}"),
                ttl: self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let fetcher = CountingFetcher::new(Duration::from_secs(1800));
        let manager = Arc::new(TokenManager::new(fetcher.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&manager);
                tokio::spawn(async move { m.bearer().await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refetched() {
        // ttl below the safety margin ⇒ expires immediately.
        let fetcher = CountingFetcher::new(Duration::from_secs(30));
        let manager = TokenManager::new(fetcher.clone());

        assert_eq!(manager.bearer().await.unwrap(), "token-1");
        assert_eq!(manager.bearer().await.unwrap(), "token-2");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let fetcher = CountingFetcher::new(Duration::from_secs(1800));
        let manager = TokenManager::new(fetcher.clone());

        assert_eq!(manager.bearer().await.unwrap(), "token-1");
        manager.invalidate().await;
        assert_eq!(manager.bearer().await.unwrap(), "token-2");
    }

    struct FailingFetcher;

    #[async_trait]
    impl TokenFetcher for FailingFetcher {
        async fn fetch(&self) -> Result<FetchedToken, ProviderError> {
            Err(ProviderError::Auth {
                provider: "gigachat".into(),
                detail: "credentials rejected".into(),
            })
        }
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_caches_nothing() {
        let manager = TokenManager::new(Arc::new(FailingFetcher));
        assert!(manager.bearer().await.is_err());
        assert!(manager.bearer().await.is_err());
    }
}
