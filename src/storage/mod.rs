pub mod db;
pub mod entities;
pub mod identity;
pub mod repository;

pub use db::{connect, init_db, shared_connection};
pub use entities::{conversations, sessions, users, verification_tokens};
pub use identity::{IdentityStore, SeaOrmIdentityStore};
pub use repository::{ConversationRepository, RepositoryError, SeaOrmConversationRepository};
