//! NeonChat - authenticated streaming chat service

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::routes::{create_router, AppState};
pub use crate::client::{ApiClient, ChatController, ChatSession};
pub use crate::config::Config;
pub use crate::models::internal::{Conversation, Message, Role, User};
pub use crate::services::llm_gateway::{AnthropicGateway, LlmGateway};
pub use crate::services::mailer::{Mailer, MailerSendClient};
pub use crate::storage::db::init_db;
pub use crate::storage::identity::{IdentityStore, SeaOrmIdentityStore};
pub use crate::storage::repository::{ConversationRepository, SeaOrmConversationRepository};
