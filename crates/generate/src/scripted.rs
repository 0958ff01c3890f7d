use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{GenerationError, Generator};

/// Replays canned completions in order. Used by tests and offline runs.
///
/// Both transports draw from the same queue. Once the queue is empty the
/// repeat reply (if any) is returned forever, otherwise calls fail.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    async_failures: AtomicUsize,
    async_calls: AtomicUsize,
    blocking_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Always answer with `reply`.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            repeat: Some(reply.into()),
            ..Default::default()
        }
    }

    /// Fail the first `n` async calls with a network error.
    pub fn with_async_failures(self, n: usize) -> Self {
        self.async_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn async_calls(&self) -> usize {
        self.async_calls.load(Ordering::SeqCst)
    }

    pub fn blocking_calls(&self) -> usize {
        self.blocking_calls.load(Ordering::SeqCst)
    }

    /// Calls on either transport, including failed ones.
    pub fn calls(&self) -> usize {
        self.async_calls() + self.blocking_calls()
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let queued = self
            .replies
            .lock()
            .map_err(|_| GenerationError::Provider("script lock poisoned".into()))?
            .pop_front();
        queued
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| GenerationError::Provider("script exhausted".into()))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
        self.async_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .async_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GenerationError::Network("scripted async failure".into()));
        }
        self.next_reply(prompt)
    }

    fn generate_blocking(&self, prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
        self.blocking_calls.fetch_add(1, Ordering::SeqCst);
        self.next_reply(prompt)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let g = ScriptedGenerator::new(["one", "two"]);
        assert_eq!(g.generate("p1", 10).await.unwrap(), "one");
        assert_eq!(g.generate_blocking("p2", 10).unwrap(), "two");
        assert!(g.generate("p3", 10).await.is_err());
        assert_eq!(g.calls(), 3);
        assert_eq!(g.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn repeating_never_runs_out() {
        let g = ScriptedGenerator::repeating("same");
        for _ in 0..3 {
            assert_eq!(g.generate("p", 1).await.unwrap(), "same");
        }
    }

    #[tokio::test]
    async fn async_failures_do_not_consume_replies() {
        let g = ScriptedGenerator::new(["ok"]).with_async_failures(1);
        assert!(matches!(
            g.generate("p", 1).await,
            Err(GenerationError::Network(_))
        ));
        assert_eq!(g.generate_blocking("p", 1).unwrap(), "ok");
        assert_eq!(g.async_calls(), 1);
        assert_eq!(g.blocking_calls(), 1);
    }
}
