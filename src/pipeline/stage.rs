//! One model invocation plus its extraction, producing a uniform outcome.
//!
//! Every call runs under a deadline and a cancellation token. Transient
//! failures may be retried with exponential backoff when a retry budget is
//! configured; the default budget is zero.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::extractor::{self, ParseOutcome};
use super::model::{Attachment, ChunkStream, ModelClient, ModelError, ResponseModality, StreamChunk};
use crate::config::Settings;

/// Characters of reply text shown in debug logs.
const LOG_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// Reply degraded to heuristic classification.
    Partial,
    Error,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// Uniform per-stage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub payload: Option<serde_json::Value>,
    pub raw_text: Option<String>,
    pub message: Option<String>,
    /// Machine-readable reason for an error, e.g. `no_floor_plan`.
    pub code: Option<String>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn success(stage: &str, payload: serde_json::Value) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Success,
            payload: Some(payload),
            raw_text: None,
            message: None,
            code: None,
            duration_ms: 0,
        }
    }

    pub fn partial(stage: &str, payload: serde_json::Value, message: &str) -> Self {
        Self {
            status: StageStatus::Partial,
            message: Some(message.to_string()),
            ..Self::success(stage, payload)
        }
    }

    pub fn error(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Error,
            payload: None,
            raw_text: None,
            message: Some(message.into()),
            code: None,
            duration_ms: 0,
        }
    }

    pub fn from_model_error(stage: &str, err: &ModelError) -> Self {
        let code = match err {
            ModelError::Cancelled => "cancelled",
            ModelError::Timeout(_) => "timeout",
            _ => "model_error",
        };
        Self::error(stage, err.to_string()).with_code(code)
    }

    /// Dependent stage that never ran because `cause` did not succeed.
    pub fn skipped(stage: &str, cause: &StageResult) -> Self {
        let reason = cause
            .message
            .clone()
            .unwrap_or_else(|| format!("stage '{}' ended {}", cause.stage, cause.status.as_str()));
        Self {
            stage: stage.to_string(),
            status: StageStatus::Skipped,
            payload: None,
            raw_text: None,
            message: Some(format!("{}: {}", cause.stage, reason)),
            code: cause.code.clone(),
            duration_ms: 0,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_text = Some(raw.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    /// Decode the payload into a typed record.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.payload
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }
}

/// Exponential backoff for transient model failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Accumulated result of a streaming call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutput {
    pub text: String,
    /// First non-empty binary fragment and its media type.
    pub binary: Option<(Vec<u8>, String)>,
}

/// Drain a chunk stream: text is concatenated, the first binary fragment wins.
pub async fn accumulate(mut stream: ChunkStream) -> Result<StreamOutput, ModelError> {
    let mut out = StreamOutput::default();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Text(t) => out.text.push_str(&t),
            StreamChunk::Binary { data, media_type } => {
                if out.binary.is_none() && !data.is_empty() {
                    out.binary = Some((data, media_type));
                }
            }
        }
    }
    Ok(out)
}

/// Runs model calls with deadline, cancellation and retry applied.
#[derive(Clone)]
pub struct StageExecutor {
    client: Arc<dyn ModelClient>,
    stage_timeout: Duration,
    stream_timeout: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl StageExecutor {
    pub fn new(client: Arc<dyn ModelClient>, settings: &Settings) -> Self {
        Self {
            client,
            stage_timeout: settings.stage_timeout,
            stream_timeout: settings.stream_timeout,
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: settings.retry_base_delay,
            },
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, stage: Duration, stream: Duration) -> Self {
        self.stage_timeout = stage;
        self.stream_timeout = stream;
        self
    }

    /// Bind to a caller-owned token, e.g. one cancelled on client disconnect.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Executor on a child token: cancelling it leaves this executor usable,
    /// cancelling this executor cancels it too.
    pub fn scoped(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    /// Single-shot call returning the reply text.
    pub async fn invoke(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError> {
        let span = tracing::debug_span!("model_call", model = %self.client.name());
        self.invoke_with_retry(prompt, attachments)
            .instrument(span)
            .await
    }

    async fn invoke_with_retry(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<String, ModelError> {
        let mut attempt = 0u32;
        loop {
            let call = self.client.invoke(prompt, attachments);
            match self.guarded(self.stage_timeout, call).await {
                Ok(text) => {
                    tracing::debug!(
                        len = text.len(),
                        preview = %preview(&text),
                        "model reply received"
                    );
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "model call failed, retrying"
                    );
                    self.sleep(delay).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Call and extract a typed record. The raw text is returned alongside.
    pub async fn extract<T: DeserializeOwned>(
        &self,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<(ParseOutcome<T>, String), ModelError> {
        let raw = self.invoke(prompt, attachments).await?;
        Ok((extractor::extract(&raw), raw))
    }

    /// Generic stage: structured reply is success, heuristic fallback is partial.
    pub async fn run<T>(&self, stage: &str, prompt: &str, attachments: &[Attachment]) -> StageResult
    where
        T: DeserializeOwned + Serialize,
    {
        match self.extract::<T>(prompt, attachments).await {
            Ok((ParseOutcome::Structured(record), raw)) => match serde_json::to_value(&record) {
                Ok(payload) => StageResult::success(stage, payload).with_raw_text(raw),
                Err(e) => StageResult::error(stage, e.to_string()).with_raw_text(raw),
            },
            Ok((
                ParseOutcome::Heuristic {
                    damage_found,
                    message,
                },
                raw,
            )) => StageResult::partial(
                stage,
                serde_json::json!({ "damage_found": damage_found, "message": message }),
                "reply could not be parsed as structured data",
            )
            .with_raw_text(raw),
            Err(e) => {
                tracing::warn!(stage, error = %e, "model call failed");
                StageResult::from_model_error(stage, &e)
            }
        }
    }

    /// Streaming call drained into text plus the first binary fragment.
    pub async fn invoke_streaming(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        modalities: &[ResponseModality],
    ) -> Result<StreamOutput, ModelError> {
        let work = async {
            let stream = self
                .client
                .invoke_streaming(prompt, attachments, modalities)
                .await?;
            accumulate(stream).await
        };
        let out = self.guarded(self.stream_timeout, work).await?;
        tracing::debug!(
            text_len = out.text.len(),
            has_binary = out.binary.is_some(),
            "stream drained"
        );
        Ok(out)
    }

    async fn guarded<F, T>(&self, deadline: Duration, fut: F) -> Result<T, ModelError>
    where
        F: std::future::Future<Output = Result<T, ModelError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ModelError::Cancelled),
            res = tokio::time::timeout(deadline, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(ModelError::Timeout(deadline.as_secs())),
            },
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<(), ModelError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ModelError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::{MockModelClient, MockReply};
    use futures_util::stream;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Reply {
        ok: bool,
    }

    fn executor(mock: MockModelClient) -> (Arc<MockModelClient>, StageExecutor) {
        let mock = Arc::new(mock);
        let exec = StageExecutor::new(mock.clone(), &Settings::default());
        (mock, exec)
    }

    #[tokio::test]
    async fn structured_reply_is_success() {
        let (_, exec) = executor(MockModelClient::replying("```json\n{\"ok\": true}\n```"));
        let result = exec.run::<Reply>("probe", "prompt", &[]).await;
        assert_eq!(result.status, StageStatus::Success);
        assert_eq!(result.payload_as::<Reply>(), Some(Reply { ok: true }));
        assert!(result.raw_text.unwrap().contains("```json"));
    }

    #[tokio::test]
    async fn prose_reply_is_partial() {
        let (_, exec) = executor(MockModelClient::replying("a big water stain"));
        let result = exec.run::<Reply>("probe", "prompt", &[]).await;
        assert_eq!(result.status, StageStatus::Partial);
        assert_eq!(result.payload.unwrap()["damage_found"], true);
    }

    #[tokio::test]
    async fn model_failure_is_error() {
        let (_, exec) = executor(MockModelClient::new(MockReply::Fail(
            ModelError::Authentication("bad key".into()),
        )));
        let result = exec.run::<Reply>("probe", "prompt", &[]).await;
        assert_eq!(result.status, StageStatus::Error);
        assert!(result.payload.is_none());
        assert!(result.message.unwrap().contains("bad key"));
        assert_eq!(result.code.as_deref(), Some("model_error"));
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let (mock, exec) = executor(
            MockModelClient::replying("{\"ok\":true}")
                .on("p", MockReply::Fail(ModelError::RateLimited("q".into())))
                .on("p", MockReply::text("{\"ok\":true}")),
        );
        assert!(exec.invoke("p", &[]).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff() {
        let (mock, exec) = executor(
            MockModelClient::replying("")
                .on("p", MockReply::Fail(ModelError::Connection("down".into())))
                .on("p", MockReply::Fail(ModelError::Timeout(1)))
                .on("p", MockReply::text("{\"ok\":true}")),
        );
        let exec = exec.with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        });
        let start = tokio::time::Instant::now();
        assert_eq!(exec.invoke("p", &[]).await.unwrap(), "{\"ok\":true}");
        assert_eq!(mock.call_count(), 3);
        // 100ms + 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let (mock, exec) = executor(MockModelClient::new(MockReply::Fail(ModelError::Api {
            status: 400,
            body: "bad request".into(),
        })));
        let exec = exec.with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        });
        assert!(exec.invoke("p", &[]).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let (_, exec) = executor(MockModelClient::new(MockReply::delayed(
            Duration::from_secs(60),
            MockReply::text("late"),
        )));
        let exec = exec.with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
        let result = exec.run::<Reply>("slow", "p", &[]).await;
        assert_eq!(result.status, StageStatus::Error);
        assert_eq!(result.code.as_deref(), Some("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_call() {
        let (_, exec) = executor(MockModelClient::new(MockReply::delayed(
            Duration::from_secs(60),
            MockReply::text("late"),
        )));
        let token = exec.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        assert_eq!(exec.invoke("p", &[]).await, Err(ModelError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_cancellation_stays_local() {
        let (_, exec) = executor(MockModelClient::new(MockReply::delayed(
            Duration::from_secs(2),
            MockReply::text("done"),
        )));
        let scoped = exec.scoped();
        scoped.cancellation_token().cancel();
        assert_eq!(scoped.invoke("p", &[]).await, Err(ModelError::Cancelled));
        assert_eq!(exec.invoke("p", &[]).await.unwrap(), "done");

        let other = exec.scoped();
        exec.cancellation_token().cancel();
        assert_eq!(other.invoke("p", &[]).await, Err(ModelError::Cancelled));
    }

    #[tokio::test]
    async fn first_binary_fragment_wins() {
        let chunks: ChunkStream = stream::iter(vec![
            Ok(StreamChunk::Text("Here ".into())),
            Ok(StreamChunk::Binary {
                data: vec![],
                media_type: "image/gif".into(),
            }),
            Ok(StreamChunk::Binary {
                data: vec![1],
                media_type: "image/png".into(),
            }),
            Ok(StreamChunk::Text("it is".into())),
            Ok(StreamChunk::Binary {
                data: vec![2],
                media_type: "image/jpeg".into(),
            }),
        ])
        .boxed();
        let out = accumulate(chunks).await.unwrap();
        assert_eq!(out.text, "Here it is");
        assert_eq!(out.binary, Some((vec![1], "image/png".to_string())));
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let chunks: ChunkStream = stream::iter(vec![
            Ok(StreamChunk::Text("x".into())),
            Err(ModelError::Connection("reset".into())),
        ])
        .boxed();
        assert!(accumulate(chunks).await.is_err());
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn skipped_carries_cause() {
        let cause = StageResult::error("identify", "no plan").with_code("no_floor_plan");
        let skipped = StageResult::skipped("parse_rooms", &cause);
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert_eq!(skipped.message.as_deref(), Some("identify: no plan"));
        assert_eq!(skipped.code.as_deref(), Some("no_floor_plan"));
    }
}
