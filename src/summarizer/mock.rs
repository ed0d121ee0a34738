//! Mock summarizer for tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use super::Summarizer;
use crate::error::NexusError;

/// Returns a fixed reply and counts calls.
pub struct MockSummarizer {
    reply: String,
    failing: AtomicBool,
    call_count: AtomicU32,
}

impl MockSummarizer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            failing: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
        }
    }

    /// Make every call fail with an upstream error.
    pub fn with_failure(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new(
            r#"{"title":"Mock Policy","summary":"placeholder","publishCity":"成都","publishYear":"2024","industryTags":"AI","mindMap":{"nodes":[{"id":"root","label":"Mock Policy"}],"links":[]}}"#,
        )
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn id(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, _prompt: &str) -> Result<String, NexusError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NexusError::Upstream("mock summarizer disabled".into()));
        }
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::parse_analysis;

    #[tokio::test]
    async fn test_default_reply_parses() {
        let mock = MockSummarizer::default();
        let reply = mock.summarize("anything").await.unwrap();
        let analysis = parse_analysis(&reply).unwrap();
        assert_eq!(analysis.title.as_deref(), Some("Mock Policy"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let mock = MockSummarizer::default().with_failure();
        assert!(mock.summarize("x").await.is_err());
    }
}
