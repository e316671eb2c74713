use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::{Attachment, ChunkStream, ModelClient, ModelError, ResponseModality, StreamChunk};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(ModelError),
    Chunks(Vec<Result<StreamChunk, ModelError>>),
    /// Wait before producing the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delayed(delay, Box::new(inner))
    }
}

struct Rule {
    marker: String,
    replies: VecDeque<MockReply>,
}

/// Scripted model for tests and offline runs.
///
/// Replies are routed by a marker substring of the prompt, so concurrent
/// stages get their own script regardless of call order. Each rule's queue
/// is consumed front to back and its last reply repeats.
pub struct MockModelClient {
    rules: Mutex<Vec<Rule>>,
    fallback: MockReply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockModelClient {
    pub fn new(fallback: MockReply) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Mock that answers every prompt with the same text.
    pub fn replying(text: &str) -> Self {
        Self::new(MockReply::text(text))
    }

    /// Queue a reply for prompts containing `marker`.
    pub fn on(self, marker: &str, reply: MockReply) -> Self {
        {
            let mut rules = lock(&self.rules);
            match rules.iter_mut().find(|r| r.marker == marker) {
                Some(rule) => rule.replies.push_back(reply),
                None => rules.push(Rule {
                    marker: marker.to_string(),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Total invocations, streaming included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());

        let mut rules = lock(&self.rules);
        let Some(rule) = rules.iter_mut().find(|r| prompt.contains(&r.marker)) else {
            return self.fallback.clone();
        };
        if rule.replies.len() > 1 {
            rule.replies.pop_front().unwrap_or_else(|| self.fallback.clone())
        } else {
            rule.replies.front().cloned().unwrap_or_else(|| self.fallback.clone())
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn settle(mut reply: MockReply) -> MockReply {
    while let MockReply::Delayed(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    reply
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, prompt: &str, _attachments: &[Attachment]) -> Result<String, ModelError> {
        let reply = self.next_reply(prompt);
        match settle(reply).await {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(e) => Err(e),
            MockReply::Chunks(chunks) => {
                let mut text = String::new();
                for chunk in chunks {
                    if let StreamChunk::Text(t) = chunk? {
                        text.push_str(&t);
                    }
                }
                Ok(text)
            }
            MockReply::Delayed(..) => Err(ModelError::MalformedResponse("unsettled reply".into())),
        }
    }

    async fn invoke_streaming(
        &self,
        prompt: &str,
        _attachments: &[Attachment],
        _modalities: &[ResponseModality],
    ) -> Result<ChunkStream, ModelError> {
        let reply = self.next_reply(prompt);
        match settle(reply).await {
            MockReply::Text(text) => Ok(stream::iter(vec![Ok(StreamChunk::Text(text))]).boxed()),
            MockReply::Fail(e) => Err(e),
            MockReply::Chunks(chunks) => Ok(stream::iter(chunks).boxed()),
            MockReply::Delayed(..) => Err(ModelError::MalformedResponse("unsettled reply".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_by_marker_and_repeats_last() {
        let mock = MockModelClient::replying("default")
            .on("LEASE", MockReply::text("first"))
            .on("LEASE", MockReply::text("second"));

        assert_eq!(mock.invoke("read the LEASE", &[]).await.unwrap(), "first");
        assert_eq!(mock.invoke("read the LEASE", &[]).await.unwrap(), "second");
        assert_eq!(mock.invoke("read the LEASE", &[]).await.unwrap(), "second");
        assert_eq!(mock.invoke("something else", &[]).await.unwrap(), "default");
        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.prompts().len(), 4);
    }

    #[tokio::test]
    async fn failures_are_returned() {
        let mock = MockModelClient::new(MockReply::Fail(ModelError::RateLimited("quota".into())));
        let err = mock.invoke("x", &[]).await.unwrap_err();
        assert_eq!(err, ModelError::RateLimited("quota".into()));
    }

    #[tokio::test]
    async fn streaming_yields_scripted_chunks() {
        let mock = MockModelClient::new(MockReply::Chunks(vec![
            Ok(StreamChunk::Text("a".into())),
            Ok(StreamChunk::Binary {
                data: vec![1, 2],
                media_type: "image/png".into(),
            }),
        ]));
        let chunks: Vec<_> = mock
            .invoke_streaming("draw", &[], &[ResponseModality::Image])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reply_waits() {
        let mock = MockModelClient::new(MockReply::delayed(
            Duration::from_secs(5),
            MockReply::text("late"),
        ));
        let start = tokio::time::Instant::now();
        assert_eq!(mock.invoke("x", &[]).await.unwrap(), "late");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
