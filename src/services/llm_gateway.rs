use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::config::Config;
use crate::models::internal::{Message, Role};
use crate::services::http_client;
use crate::services::sse::{SseDecoder, SseEvent};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Reply text deltas in arrival order. The stream ends cleanly only when the
/// provider signalled completion; any failure is yielded as the last item.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Start a completion for `messages`. Errors returned here happen before
    /// any reply text was produced.
    async fn stream_reply(&self, messages: &[Message]) -> Result<ReplyStream, GatewayError>;
}

/// Anthropic Messages API with `stream: true`.
#[derive(Clone)]
pub struct AnthropicGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGateway {
    pub fn new(base_url: String, api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.llm_base_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_max_tokens,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// System turns become the top-level `system` prompt; everything else is
    /// forwarded in order.
    pub fn build_request(&self, messages: &[Message]) -> MessagesRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let turns = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ProviderMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            stream: true,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
        }
    }
}

#[async_trait]
impl LlmGateway for AnthropicGateway {
    async fn stream_reply(&self, messages: &[Message]) -> Result<ReplyStream, GatewayError> {
        let request = self.build_request(messages);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::ApiError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        tracing::debug!(
            "Streaming reply from {} for {} messages",
            self.model,
            request.messages.len()
        );

        Ok(Box::pin(async_stream::stream! {
            let mut bytes = Box::pin(response.bytes_stream());
            let mut decoder = SseDecoder::new();

            loop {
                let (events, exhausted) = match bytes.next().await {
                    Some(Ok(chunk)) => (decoder.push(&chunk), false),
                    Some(Err(e)) => {
                        yield Err(GatewayError::HttpError(e));
                        break;
                    }
                    None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
                };

                let mut done = false;
                for event in events {
                    match parse_event(&event) {
                        Ok(StreamItem::Text(text)) => yield Ok(text),
                        Ok(StreamItem::Ignore) => {}
                        Ok(StreamItem::Stop) => {
                            done = true;
                            break;
                        }
                        Err(e) => {
                            yield Err(e);
                            done = true;
                            break;
                        }
                    }
                }

                if done {
                    break;
                }
                if exhausted {
                    yield Err(GatewayError::InvalidResponse(
                        "stream ended before message_stop".to_string(),
                    ));
                    break;
                }
            }
        }))
    }
}

/// What one provider event means for the reply.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamItem {
    Text(String),
    Stop,
    Ignore,
}

pub fn parse_event(event: &SseEvent) -> Result<StreamItem, GatewayError> {
    if event.data.is_empty() {
        return Ok(StreamItem::Ignore);
    }

    let payload: StreamPayload = serde_json::from_str(&event.data)
        .map_err(|e| GatewayError::InvalidResponse(format!("{}: {}", e, event.data)))?;

    Ok(match payload {
        StreamPayload::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => StreamItem::Text(text),
        StreamPayload::ContentBlockDelta { delta: Delta::Other } => StreamItem::Ignore,
        StreamPayload::MessageStop => StreamItem::Stop,
        StreamPayload::Error { error } => {
            return Err(GatewayError::Provider(format!(
                "{}: {}",
                error.kind, error.message
            )))
        }
        StreamPayload::Other => StreamItem::Ignore,
    })
}

// Request/Response Models
#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ProviderMessage>,
}

#[derive(Debug, Serialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ProviderErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}
