//! Candidate generation capability
//!
//! The pipeline treats generators as untrusted black boxes: any error they
//! return becomes a `generation_error` rejection for that attempt.

use crate::error::{JournalError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// What the generator is asked to produce on one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateContext {
    /// Zero-based attempt index within the current `generate` call
    pub attempt: usize,
    pub theme: String,
    pub opening_word: String,
    /// `Theme: {theme} | Start with: {opening_word}`
    pub prompt: String,
}

/// Produces raw candidate text for a themed context
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate(&self, context: &CandidateContext) -> Result<String>;
}

/// Adapter turning an async closure into a `CandidateGenerator`
pub struct FnGenerator<F>
where
    F: Fn(CandidateContext) -> BoxFuture<'static, Result<String>> + Send + Sync,
{
    f: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(CandidateContext) -> BoxFuture<'static, Result<String>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> CandidateGenerator for FnGenerator<F>
where
    F: Fn(CandidateContext) -> BoxFuture<'static, Result<String>> + Send + Sync,
{
    async fn generate(&self, context: &CandidateContext) -> Result<String> {
        (self.f)(context.clone()).await
    }
}

/// One scripted generator response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Text(String),
    Fail(String),
}

/// Replays a fixed sequence of responses, then fails
///
/// Records every context it was asked with, so callers can inspect the
/// rotation the pipeline applied.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    repeat_last: bool,
    seen: Mutex<Vec<CandidateContext>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_responses(texts.into_iter().map(|t| ScriptedResponse::Text(t.into())))
    }

    pub fn from_responses(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            repeat_last: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text
    pub fn repeating(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            repeat_last: true,
            ..Self::new([text])
        }
    }

    /// Contexts received so far, in call order
    pub fn contexts(&self) -> Vec<CandidateContext> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> Option<ScriptedResponse> {
        let mut responses = self.responses.lock().ok()?;
        if self.repeat_last && responses.len() == 1 {
            return responses.front().cloned();
        }
        responses.pop_front()
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(&self, context: &CandidateContext) -> Result<String> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(context.clone());
        }

        match self.next_response() {
            Some(ScriptedResponse::Text(text)) => Ok(text),
            Some(ScriptedResponse::Fail(message)) => Err(JournalError::Generation(message)),
            None => Err(JournalError::Generation("script exhausted".into())),
        }
    }
}
