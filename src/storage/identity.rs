use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{prelude::*, Set};
use uuid::Uuid;

use crate::auth::{generate_token, hash_token};
use crate::models::internal::{IssuedSession, User};
use crate::storage::entities::{sessions, users, verification_tokens};
use crate::storage::repository::RepositoryError;

/// Users, sessions and sign-in tokens.
///
/// Raw tokens are handed to the caller exactly once; only their SHA-256
/// digests are stored.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find the user for `email`, creating it if needed, and mark the
    /// address as verified.
    async fn upsert_verified_user(&self, email: &str) -> Result<User, RepositoryError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    async fn create_session(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<IssuedSession, RepositoryError>;

    /// Resolve a bearer token to its user; expired sessions resolve to `None`.
    async fn resolve_session(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    async fn revoke_session(&self, token: &str) -> Result<(), RepositoryError>;

    /// Store a single-use sign-in token for `email` and return the raw token.
    async fn create_verification_token(
        &self,
        email: &str,
        ttl: Duration,
    ) -> Result<String, RepositoryError>;

    /// Consume a sign-in token. Returns `false` if it is unknown, expired or
    /// was issued for another address; the token is gone afterwards either way.
    async fn consume_verification_token(
        &self,
        email: &str,
        token: &str,
    ) -> Result<bool, RepositoryError>;
}

pub struct SeaOrmIdentityStore {
    db: DatabaseConnection,
}

impl SeaOrmIdentityStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Addresses are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityStore for SeaOrmIdentityStore {
    async fn upsert_verified_user(&self, email: &str) -> Result<User, RepositoryError> {
        let email = normalize_email(email);
        let now = Utc::now();

        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?;

        let model = match existing {
            Some(model) => {
                if model.email_verified.is_some() {
                    model
                } else {
                    let mut active_model: users::ActiveModel = model.into();
                    active_model.email_verified = Set(Some(now));
                    active_model.update(&self.db).await?
                }
            }
            None => {
                let active_model = users::ActiveModel {
                    id: Set(Uuid::new_v4().to_string()),
                    email: Set(email),
                    email_verified: Set(Some(now)),
                    created_at: Set(now),
                };
                let model = active_model.insert(&self.db).await?;
                tracing::info!("Created user: {}", model.id);
                model
            }
        };

        User::try_from(model)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let model = users::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        model.map(User::try_from).transpose()
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<IssuedSession, RepositoryError> {
        let user = self
            .find_user(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(user_id.to_string()))?;

        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + ttl;

        let session = sessions::ActiveModel {
            token_hash: Set(hash_token(&token)),
            user_id: Set(user_id.to_string()),
            expires_at: Set(expires_at),
            created_at: Set(now),
        };
        session.insert(&self.db).await?;
        tracing::info!("Issued session for user {}", user_id);

        Ok(IssuedSession {
            token,
            expires_at,
            user,
        })
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let found = sessions::Entity::find_by_id(hash_token(token))
            .find_also_related(users::Entity)
            .one(&self.db)
            .await?;

        match found {
            Some((session, Some(user))) if is_live(session.expires_at) => {
                User::try_from(user).map(Some)
            }
            Some((session, _)) => {
                tracing::debug!("Rejected expired session for user {}", session.user_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn revoke_session(&self, token: &str) -> Result<(), RepositoryError> {
        sessions::Entity::delete_by_id(hash_token(token))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn create_verification_token(
        &self,
        email: &str,
        ttl: Duration,
    ) -> Result<String, RepositoryError> {
        let token = generate_token();

        let record = verification_tokens::ActiveModel {
            token_hash: Set(hash_token(&token)),
            identifier: Set(normalize_email(email)),
            expires_at: Set(Utc::now() + ttl),
        };
        record.insert(&self.db).await?;

        Ok(token)
    }

    async fn consume_verification_token(
        &self,
        email: &str,
        token: &str,
    ) -> Result<bool, RepositoryError> {
        let token_hash = hash_token(token);

        let Some(record) = verification_tokens::Entity::find_by_id(token_hash.clone())
            .one(&self.db)
            .await?
        else {
            return Ok(false);
        };

        // Single use: a second attempt with the same link must fail
        let deleted = verification_tokens::Entity::delete_by_id(token_hash)
            .exec(&self.db)
            .await?;

        Ok(deleted.rows_affected == 1
            && record.identifier == normalize_email(email)
            && is_live(record.expires_at))
    }
}

fn is_live(expires_at: DateTime<Utc>) -> bool {
    expires_at > Utc::now()
}

impl TryFrom<users::Model> for User {
    type Error = RepositoryError;

    fn try_from(model: users::Model) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&model.id)
            .map_err(|e| RepositoryError::Corrupt(format!("user id {}: {}", model.id, e)))?;

        Ok(Self {
            id,
            email: model.email,
            email_verified: model.email_verified,
            created_at: model.created_at,
        })
    }
}
