//! # uw-llm
//!
//! The generative completion service as seen by the pipeline: a prompt goes
//! in, text comes out. [`HttpGenerative`] talks to an OpenAI-compatible chat
//! completions endpoint; [`RetryingGenerative`] wraps any client with the
//! bounded backoff schedule from `uw-config`.
//!
//! The generative service writes prose only. Numeric terms come from
//! `uw-rules` and are substituted after generation.

pub mod client;
mod error;
mod http;
pub mod retry;

pub use client::HttpGenerative;
pub use error::{LlmError, NON_RETRYABLE_STATUSES};
pub use retry::{RetryPolicy, RetryingGenerative};

use std::sync::Arc;

use async_trait::async_trait;

/// A black-box text completion service.
#[async_trait]
pub trait Generative: Send + Sync {
    /// Complete `prompt`, producing at most `max_tokens` tokens.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: Generative + ?Sized> Generative for Arc<T> {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        (**self).complete(prompt, max_tokens).await
    }
}
