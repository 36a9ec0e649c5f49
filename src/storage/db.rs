use migration::{Migrator, MigratorTrait};
use once_cell::sync::Lazy;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tokio::sync::Mutex;

const MEMORY_URL: &str = "sqlite::memory:";

/// Process-wide connection pool, created on first use and reused afterwards.
static DB_CONN: Lazy<Mutex<Option<DatabaseConnection>>> = Lazy::new(|| Mutex::new(None));

/// Open a fresh pool for `database_url` and bring its schema up to date.
pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    connect(database_url, 10).await
}

/// Both spellings sqlx accepts for an in-memory database, query string ignored.
fn is_memory_url(database_url: &str) -> bool {
    let base = database_url.split('?').next().unwrap_or(database_url);
    matches!(base, "sqlite::memory:" | "sqlite://:memory:")
}

pub async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    tracing::info!("Connecting to database: {}", database_url);

    let in_memory = is_memory_url(database_url);
    let url = if in_memory { MEMORY_URL } else { database_url };

    let mut options = ConnectOptions::new(url.to_string());
    options.sqlx_logging(false);

    if in_memory {
        // Every pooled connection would otherwise see its own empty database
        options.max_connections(1).min_connections(1);
    } else if let Some(path_str) = database_url.strip_prefix("sqlite://") {
        let path_str = path_str.split('?').next().unwrap_or(path_str);
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbErr::Custom(format!("Failed to create DB directory: {}", e)))?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        if !path.exists() {
            std::fs::File::create(path)
                .map_err(|e| DbErr::Custom(format!("Failed to create DB file: {}", e)))?;
            tracing::info!("Created database file: {}", path.display());
        }

        options.max_connections(max_connections);
    } else {
        return Err(DbErr::Custom("Invalid SQLite URL format".to_string()));
    }

    let db = Database::connect(options)
        .await
        .map_err(|e| DbErr::Custom(format!("Connection failed: {}", e)))?;

    if !in_memory {
        db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
    }

    tracing::info!("Applying migrations...");
    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Return the shared pool, connecting on the first call.
///
/// Later calls ignore their arguments and hand out the existing pool.
pub async fn shared_connection(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let mut conn = DB_CONN.lock().await;
    if let Some(db) = conn.as_ref() {
        return Ok(db.clone());
    }

    let db = connect(database_url, max_connections).await?;
    *conn = Some(db.clone());
    Ok(db)
}

pub async fn get_connection() -> Option<DatabaseConnection> {
    DB_CONN.lock().await.clone()
}
