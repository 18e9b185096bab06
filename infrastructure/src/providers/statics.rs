//! In-memory voice adapter with canned replies.
//!
//! Used for demos and offline runs where no provider endpoint is
//! available. Replies cycle through the configured list; the adapter
//! is always healthy.

use async_trait::async_trait;
use chorus_application::{AdapterError, AdapterFactory, HealthProbe, VoiceAdapter};
use chorus_domain::{PriorMessage, VoiceIdentity, VoiceResponse, VoiceSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct StaticVoiceAdapter {
    replies: Vec<String>,
    next: AtomicUsize,
}

impl StaticVoiceAdapter {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VoiceAdapter for StaticVoiceAdapter {
    async fn connect(&self) -> Result<bool, AdapterError> {
        Ok(true)
    }

    async fn disconnect(&self) {}

    async fn send(
        &self,
        _prompt: &str,
        _history: &[PriorMessage],
    ) -> Result<VoiceResponse, AdapterError> {
        if self.replies.is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        Ok(VoiceResponse::new(self.replies[index].clone()))
    }

    async fn check_health(&self) -> HealthProbe {
        HealthProbe::healthy(Duration::ZERO)
    }
}

/// Factory producing [`StaticVoiceAdapter`]s for every identity.
pub struct StaticVoiceFactory {
    replies: Vec<String>,
}

impl StaticVoiceFactory {
    pub fn new(replies: Vec<String>) -> Self {
        Self { replies }
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            replies: vec![text.into()],
        }
    }
}

impl AdapterFactory for StaticVoiceFactory {
    fn create(
        &self,
        _spec: &VoiceSpec,
        _identity: &VoiceIdentity,
    ) -> Result<Arc<dyn VoiceAdapter>, AdapterError> {
        Ok(Arc::new(StaticVoiceAdapter::new(self.replies.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_cycle() {
        let adapter = StaticVoiceAdapter::new(vec!["one".into(), "two".into()]);
        assert_eq!(adapter.send("p", &[]).await.unwrap().text, "one");
        assert_eq!(adapter.send("p", &[]).await.unwrap().text, "two");
        assert_eq!(adapter.send("p", &[]).await.unwrap().text, "one");
    }

    #[tokio::test]
    async fn test_no_replies_is_empty_response() {
        let adapter = StaticVoiceAdapter::new(Vec::new());
        assert!(matches!(
            adapter.send("p", &[]).await,
            Err(AdapterError::EmptyResponse)
        ));
    }
}
