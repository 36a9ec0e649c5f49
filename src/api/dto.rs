use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::internal::Message;

// ==================== REQUEST DTOs ====================

/// Body of `PUT /api/ai/chats/{id}`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ReplaceMessagesRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Body of `POST /api/ai/chat`. Both fields are optional on the wire so a
/// missing one is reported as a bad request rather than a decode failure.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct EmailSignInRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailQuery {
    pub token: String,
    pub email: String,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmailSignInResponse {
    pub sent: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u32,
}
