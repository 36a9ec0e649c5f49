use futures::StreamExt;
use uuid::Uuid;

use crate::api::dto::{
    ChatTurnRequest, EmailSignInRequest, EmailSignInResponse, ErrorResponse,
    ReplaceMessagesRequest,
};
use crate::models::internal::{Conversation, IssuedSession, Message, User};
use crate::services::http_client;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Not signed in")]
    NotSignedIn,
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::ApiError { status, .. } => Some(*status),
            ClientError::HttpError(e) => e.status().map(|s| s.as_u16()),
            ClientError::NotSignedIn => None,
        }
    }
}

/// HTTP client for the conversation and session endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&str, ClientError> {
        self.token.as_deref().ok_or(ClientError::NotSignedIn)
    }

    pub async fn create_conversation(&self) -> Result<Conversation, ClientError> {
        let response = self
            .client
            .post(self.url("/api/ai/chats/new"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let response = self
            .client
            .get(self.url("/api/ai/chats/user"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/ai/chats/{}", id)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Overwrite the stored transcript of `id` with `messages`.
    pub async fn save_messages(
        &self,
        id: Uuid,
        messages: &[Message],
    ) -> Result<Conversation, ClientError> {
        let request = ReplaceMessagesRequest {
            messages: messages.to_vec(),
            title: None,
        };

        let response = self
            .client
            .put(self.url(&format!("/api/ai/chats/{}", id)))
            .bearer_auth(self.bearer()?)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Submit a chat turn and feed each decoded piece of the reply to
    /// `on_chunk` as it arrives. Returns the full reply text.
    pub async fn stream_chat<F>(
        &self,
        conversation_id: Uuid,
        messages: &[Message],
        mut on_chunk: F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str) + Send,
    {
        let request = ChatTurnRequest {
            conversation_id: Some(conversation_id.to_string()),
            messages: Some(messages.to_vec()),
        };

        let response = self
            .client
            .post(self.url("/api/ai/chat"))
            .bearer_auth(self.bearer()?)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut decoder = Utf8Decoder::default();
        let mut reply = String::new();

        while let Some(chunk) = stream.next().await {
            let text = decoder.push(&chunk?);
            if !text.is_empty() {
                on_chunk(&text);
                reply.push_str(&text);
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            on_chunk(&tail);
            reply.push_str(&tail);
        }

        Ok(reply)
    }

    pub async fn request_sign_in(&self, email: &str) -> Result<bool, ClientError> {
        let request = EmailSignInRequest {
            email: email.to_string(),
        };

        let response = self
            .client
            .post(self.url("/api/auth/email"))
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: EmailSignInResponse = response.json().await?;
        Ok(body.sent)
    }

    /// Exchange a sign-in link for a session; the client keeps the token.
    pub async fn verify_email(
        &mut self,
        token: &str,
        email: &str,
    ) -> Result<IssuedSession, ClientError> {
        let response = self
            .client
            .get(self.url("/api/auth/callback/email"))
            .query(&[("token", token), ("email", email)])
            .send()
            .await?;

        let response = check_status(response).await?;
        let session: IssuedSession = response.json().await?;
        self.token = Some(session.token.clone());
        Ok(session)
    }

    pub async fn current_user(&self) -> Result<User, ClientError> {
        let response = self
            .client
            .get(self.url("/api/auth/session"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn sign_out(&mut self) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/auth/signout"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;

        check_status(response).await?;
        self.token = None;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    Err(ClientError::ApiError { status, message })
}

/// Incremental UTF-8 decoding for a byte stream whose chunk boundaries may
/// fall inside a multi-byte character.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode everything complete so far; an incomplete trailing sequence is
    /// held back for the next push. Invalid bytes become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());

                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
