use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Text(String),
    Error(String),
    /// Sleeps before answering; used to trip per-attempt timeouts.
    Delayed(Duration, String),
}

/// Offline client that replays scripted replies in order, then repeats the
/// fallback.
pub struct FakeClient {
    script: Mutex<VecDeque<FakeReply>>,
    fallback: FakeReply,
    calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeReply::Text(fallback.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeReply::Error(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, reply: FakeReply) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> FakeReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, _system: Option<&str>, _prompt: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = match self.next_reply() {
            FakeReply::Text(t) => t,
            FakeReply::Error(e) => anyhow::bail!(e),
            FakeReply::Delayed(d, t) => {
                tokio::time::sleep(d).await;
                t
            }
        };
        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: "fake".to_string(),
            meta: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
