//! Scripted provider for deterministic tests and offline demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, GenerationOptions, LlmProvider};

/// One scripted reply
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Text(String),
    Unavailable(String),
    RateLimited(String),
    Auth(String),
    /// Never resolves; stands in for a hung upstream
    Stall,
}

impl From<&str> for ScriptedReply {
    fn from(text: &str) -> Self {
        ScriptedReply::Text(text.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(text: String) -> Self {
        ScriptedReply::Text(text)
    }
}

/// Replays a fixed list of replies, one per `complete` call, and records
/// every request it receives.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    repeat: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
    credential_error: Option<String>,
}

impl ScriptedProvider {
    pub fn new<I, R>(replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedReply>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Answer every call with the same text
    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            repeat: Some(text.into()),
            ..Default::default()
        }
    }

    /// Fail the credential pre-check
    pub fn rejecting_credentials(mut self, reason: impl Into<String>) -> Self {
        self.credential_error = Some(reason.into());
        self
    }

    /// Number of `complete` calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every message list received, in call order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let mut replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        replies
            .pop_front()
            .or_else(|| self.repeat.clone().map(ScriptedReply::Text))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn validate_credentials(&self) -> Result<()> {
        match &self.credential_error {
            Some(reason) => Err(AgentError::Auth(reason.clone())),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        match self.next_reply() {
            Some(ScriptedReply::Text(text)) => Ok(Completion::text(text, &options.model)),
            Some(ScriptedReply::Unavailable(msg)) => Err(AgentError::ProviderUnavailable(msg)),
            Some(ScriptedReply::RateLimited(msg)) => Err(AgentError::RateLimited(msg)),
            Some(ScriptedReply::Auth(msg)) => Err(AgentError::Auth(msg)),
            Some(ScriptedReply::Stall) => std::future::pending().await,
            None => Err(AgentError::Provider("script exhausted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_exhausts() {
        let provider = ScriptedProvider::new(["one", "two"]);
        let opts = GenerationOptions::default();

        assert_eq!(provider.ask("a", &opts).await.unwrap(), "one");
        assert_eq!(provider.ask("b", &opts).await.unwrap(), "two");
        assert!(provider.ask("c", &opts).await.is_err());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.requests()[1][0].content, "b");
    }

    #[tokio::test]
    async fn test_repeating_and_errors() {
        let provider = ScriptedProvider::repeating("again");
        let opts = GenerationOptions::default();
        for _ in 0..3 {
            assert_eq!(provider.ask("q", &opts).await.unwrap(), "again");
        }

        let failing = ScriptedProvider::new([ScriptedReply::Unavailable("down".into())]);
        assert!(matches!(
            failing.ask("q", &opts).await,
            Err(AgentError::ProviderUnavailable(_))
        ));
    }
}
