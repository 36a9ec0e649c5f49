pub use sea_orm_migration::prelude::*;

mod m20261017_000001_create_users;
mod m20261017_000002_create_sessions;
mod m20261017_000003_create_verification_tokens;
mod m20261017_000004_create_conversations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261017_000001_create_users::Migration),
            Box::new(m20261017_000002_create_sessions::Migration),
            Box::new(m20261017_000003_create_verification_tokens::Migration),
            Box::new(m20261017_000004_create_conversations::Migration),
        ]
    }
}
