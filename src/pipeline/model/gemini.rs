use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use super::gemini_types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
};
use super::{Attachment, ChunkStream, ModelClient, ModelError, ResponseModality, StreamChunk};
use crate::config::Settings;

/// Gemini REST client for multimodal generation.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self, ModelError> {
        let api_key = settings
            .require_api_key()
            .map_err(|e| ModelError::NotConfigured(e.to_string()))?
            .to_string();
        let timeout_secs = settings.stream_timeout.as_secs().max(1);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            text_model: settings.text_model.clone(),
            image_model: settings.image_model.clone(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_connect() {
            ModelError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else {
            ModelError::HttpClient(e.to_string())
        }
    }

    async fn post(&self, url: &str, body: &GenerateContentRequest) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

/// Build the single-turn request: prompt text first, then attachments inline.
pub fn build_request(
    prompt: &str,
    attachments: &[Attachment],
    modalities: &[ResponseModality],
) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    parts.push(Part {
        text: Some(prompt.to_string()),
        inline_data: None,
    });
    for attachment in attachments {
        parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: attachment.media_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&attachment.data),
            }),
        });
    }

    let generation_config = if modalities.is_empty() {
        None
    } else {
        Some(GenerationConfig {
            response_modalities: modalities.iter().map(|m| m.as_str().to_string()).collect(),
        })
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config,
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        &self.text_model
    }

    async fn invoke(&self, prompt: &str, attachments: &[Attachment]) -> Result<String, ModelError> {
        let url = self.endpoint(&self.text_model, "generateContent");
        let body = build_request(prompt, attachments, &[]);
        let response = self.post(&url, &body).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        parsed
            .text()
            .ok_or_else(|| ModelError::MalformedResponse("reply contained no text".into()))
    }

    async fn invoke_streaming(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        modalities: &[ResponseModality],
    ) -> Result<ChunkStream, ModelError> {
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&self.image_model, "streamGenerateContent")
        );
        let body = build_request(prompt, attachments, modalities);
        let response = self.post(&url, &body).await?;

        tracing::debug!(model = %self.image_model, "streaming reply opened");
        Ok(sse_chunks(response.bytes_stream()))
    }
}

// ──────────────────────────────────────────────
// Server-sent events → chunks
// ──────────────────────────────────────────────

struct SseState<B, E> {
    bytes: BoxStream<'static, Result<B, E>>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamChunk>,
    finished: bool,
}

/// Turn an SSE byte stream into a chunk stream. Each `data:` event carries
/// one `GenerateContentResponse`; its parts become chunks in order.
pub fn sse_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: bytes.boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    st.buffer
                        .extend(bytes.as_ref().iter().copied().filter(|b| *b != b'\r'));
                    while let Some(event) = take_event(&mut st.buffer) {
                        match parse_event(&event) {
                            Ok(chunks) => st.pending.extend(chunks),
                            Err(e) => {
                                st.finished = true;
                                return Some((Err(e), st));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ModelError::HttpClient(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    let rest = String::from_utf8_lossy(&std::mem::take(&mut st.buffer)).into_owned();
                    if !rest.trim().is_empty() {
                        match parse_event(&rest) {
                            Ok(chunks) => st.pending.extend(chunks),
                            Err(e) => return Some((Err(e), st)),
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

/// Split one complete event (terminated by a blank line) off the buffer.
fn take_event(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&event[..end]).into_owned())
}

fn parse_event(event: &str) -> Result<Vec<StreamChunk>, ModelError> {
    let data: String = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }

    let response: GenerateContentResponse =
        serde_json::from_str(&data).map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

    let mut chunks = Vec::new();
    for part in response.first_parts() {
        if let Some(inline) = &part.inline_data {
            let data = base64::engine::general_purpose::STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|e| ModelError::MalformedResponse(format!("inline data: {e}")))?;
            chunks.push(StreamChunk::Binary {
                data,
                media_type: inline.mime_type.clone(),
            });
        } else if let Some(text) = &part.text {
            chunks.push(StreamChunk::Text(text.clone()));
        }
    }
    Ok(chunks)
}
