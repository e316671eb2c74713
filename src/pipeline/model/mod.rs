//! Boundary to the generative model.
//!
//! The core treats the model as an opaque capability: a prompt plus binary
//! attachments in, text out; or, for image generation, a finite and
//! non-restartable stream of text/binary chunks. `GeminiClient` is the
//! production implementation; `MockModelClient` scripts replies for tests.

pub mod gemini;
pub mod gemini_types;
pub mod mock;

pub use gemini::GeminiClient;
pub use mock::{MockModelClient, MockReply};

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// ModelInvocationError taxonomy. Surfaced as a stage's error outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model endpoint unreachable at {0}")]
    Connection(String),

    #[error("Model call timed out after {0}s")]
    Timeout(u64),

    #[error("Model returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Model rate limited: {0}")]
    RateLimited(String),

    #[error("Model authentication failed: {0}")]
    Authentication(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Model call cancelled")]
    Cancelled,

    #[error("Model not configured: {0}")]
    NotConfigured(String),
}

impl ModelError {
    /// Transient failures worth a backoff retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::HttpClient(_) => {
                true
            }
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication(body),
            429 => Self::RateLimited(body),
            _ => Self::Api { status, body },
        }
    }
}

/// Binary payload sent alongside a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub data: Arc<[u8]>,
    pub media_type: String,
}

impl Attachment {
    pub fn new(data: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }
}

/// One element of a streaming reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Binary { data: Vec<u8>, media_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Text,
    Image,
}

impl ResponseModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
        }
    }
}

/// Finite, non-restartable sequence of streaming chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ModelError>>;

/// Generative model capability (allows mocking).
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Single-shot call returning the reply text.
    async fn invoke(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError>;

    /// Streaming call for image generation.
    async fn invoke_streaming(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        modalities: &[ResponseModality],
    ) -> Result<ChunkStream, ModelError>;
}
