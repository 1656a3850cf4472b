//! LM provider layer: specs, clients, token lifecycle, and the failover
//! router.
//!
//! The router treats providers as an ordered chain of responsibility:
//! first-configured is first-tried, and every failure is classified into a
//! typed [`crate::error::ProviderError`] before deciding between retry,
//! failover, and giving up.

pub mod http;
pub mod provider;
pub mod router;
pub mod token;

pub use provider::{ChatClient, ChatRequest, Credential, ProviderSpec};
pub use router::{Completion, LlmRouter};
pub use token::{FetchedToken, TokenFetcher, TokenManager};
