use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{prelude::*, QueryOrder, Set};
use uuid::Uuid;

use crate::models::internal::{Conversation, Message};
use crate::storage::entities::conversations;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

// ============================================
// TRAIT DEFINITION - with Send + Sync bounds
// ============================================
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert an empty conversation owned by `owner`.
    async fn create(&self, owner: Uuid, title: &str) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError>;

    /// Conversations of `owner`, most recently updated first.
    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Conversation>, RepositoryError>;

    /// Overwrite the whole transcript (and optionally the title) in a single
    /// row update. Last write wins.
    async fn replace_messages(
        &self,
        id: Uuid,
        messages: &[Message],
        title: Option<&str>,
    ) -> Result<Conversation, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}

// ============================================
// IMPLEMENTATION STRUCT
// ============================================
pub struct SeaOrmConversationRepository {
    db: DatabaseConnection,
}

impl SeaOrmConversationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================
#[async_trait]
impl ConversationRepository for SeaOrmConversationRepository {
    async fn create(&self, owner: Uuid, title: &str) -> Result<Conversation, RepositoryError> {
        let now = Utc::now();
        let active_model = conversations::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            title: Set(title.to_string()),
            user_id: Set(owner.to_string()),
            messages: Set(serde_json::Value::Array(Vec::new())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active_model.insert(&self.db).await?;
        tracing::info!("Created conversation: {}", model.id);

        Conversation::try_from(model)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let model = conversations::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        model.map(Conversation::try_from).transpose()
    }

    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Conversation>, RepositoryError> {
        let models = conversations::Entity::find()
            .filter(conversations::Column::UserId.eq(owner.to_string()))
            .order_by_desc(conversations::Column::UpdatedAt)
            .order_by_desc(conversations::Column::CreatedAt)
            .all(&self.db)
            .await?;

        models.into_iter().map(Conversation::try_from).collect()
    }

    async fn replace_messages(
        &self,
        id: Uuid,
        messages: &[Message],
        title: Option<&str>,
    ) -> Result<Conversation, RepositoryError> {
        let model = conversations::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        let transcript = serde_json::to_value(messages)
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        let mut active_model: conversations::ActiveModel = model.into();
        active_model.messages = Set(transcript);
        if let Some(title) = title {
            active_model.title = Set(title.to_string());
        }
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(&self.db).await?;
        tracing::debug!(
            "Saved {} messages to conversation {}",
            messages.len(),
            updated.id
        );

        Conversation::try_from(updated)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count = conversations::Entity::find().count(&self.db).await?;
        Ok(count)
    }
}

// ============================================
// Conversions
// ============================================

impl TryFrom<conversations::Model> for Conversation {
    type Error = RepositoryError;

    fn try_from(model: conversations::Model) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&model.id)
            .map_err(|e| RepositoryError::Corrupt(format!("conversation id {}: {}", model.id, e)))?;
        let user_id = Uuid::parse_str(&model.user_id)
            .map_err(|e| RepositoryError::Corrupt(format!("owner of {}: {}", model.id, e)))?;
        let messages: Vec<Message> = serde_json::from_value(model.messages)
            .map_err(|e| RepositoryError::Corrupt(format!("messages of {}: {}", model.id, e)))?;

        Ok(Self {
            id,
            title: model.title,
            user_id,
            messages,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
