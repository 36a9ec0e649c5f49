use serde::Deserialize;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Main configuration for the NeonChat server
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// Interface the HTTP server binds to
    pub server_host: String,

    /// HTTP server port
    #[validate(range(min = 1, max = 65535))]
    pub server_port: u16,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Maximum database connections
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    pub cors_enabled: bool,

    /// Externally reachable base URL, used to build sign-in links
    pub public_url: String,

    /// Title given to freshly created conversations
    #[validate(length(min = 1))]
    pub default_title: String,

    /// At most ten years
    #[validate(range(min = 1, max = 87600))]
    pub session_ttl_hours: i64,

    #[validate(range(min = 1, max = 87600))]
    pub verification_ttl_hours: i64,

    /// Requests per minute allowed per client IP on the API routes
    #[validate(range(min = 1))]
    pub rate_limit_per_minute: u32,

    /// Anthropic API key (`LLM_KEY` is honoured as well)
    pub llm_api_key: String,

    pub llm_base_url: String,

    pub llm_model: String,

    #[validate(range(min = 1))]
    pub llm_max_tokens: u32,

    /// MailerSend API key (`MAILERSEND_API_KEY` is honoured as well)
    pub mail_api_key: String,

    pub mail_base_url: String,

    pub mail_from: String,

    pub mail_from_name: String,

    /// OAuth credentials are carried as opaque configuration only
    pub github_client_id: Option<String>,

    pub github_client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            database_url: "sqlite://neonchat.db".to_string(),
            max_connections: 10,
            log_level: "info".to_string(),
            cors_enabled: true,
            public_url: "http://localhost:8080".to_string(),
            default_title: "New Conversation".to_string(),
            session_ttl_hours: 24 * 30,
            verification_ttl_hours: 24,
            rate_limit_per_minute: 120,
            llm_api_key: String::new(),
            llm_base_url: "https://api.anthropic.com".to_string(),
            llm_model: "claude-3-5-sonnet-20240620".to_string(),
            llm_max_tokens: 4096,
            mail_api_key: String::new(),
            mail_base_url: "https://api.mailersend.com".to_string(),
            mail_from: "no-reply@neonchat.app".to_string(),
            mail_from_name: "NeonChat".to_string(),
            github_client_id: None,
            github_client_secret: None,
        }
    }
}

impl Config {
    /// Load from `~/.neonchat/config` (if present) and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load with an explicit config file; the file must exist when given.
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let file_source = match path {
            Some(p) => config::File::from(p.to_path_buf()).required(true),
            None => config::File::with_name(&default_config_path().to_string_lossy())
                .required(false),
        };

        let settings = config::Config::builder()
            .set_default("server_host", defaults.server_host)?
            .set_default("server_port", i64::from(defaults.server_port))?
            .set_default("database_url", defaults.database_url)?
            .set_default("max_connections", i64::from(defaults.max_connections))?
            .set_default("log_level", defaults.log_level)?
            .set_default("cors_enabled", defaults.cors_enabled)?
            .set_default("public_url", defaults.public_url)?
            .set_default("default_title", defaults.default_title)?
            .set_default("session_ttl_hours", defaults.session_ttl_hours)?
            .set_default("verification_ttl_hours", defaults.verification_ttl_hours)?
            .set_default("rate_limit_per_minute", i64::from(defaults.rate_limit_per_minute))?
            .set_default("llm_api_key", defaults.llm_api_key)?
            .set_default("llm_base_url", defaults.llm_base_url)?
            .set_default("llm_model", defaults.llm_model)?
            .set_default("llm_max_tokens", i64::from(defaults.llm_max_tokens))?
            .set_default("mail_api_key", defaults.mail_api_key)?
            .set_default("mail_base_url", defaults.mail_base_url)?
            .set_default("mail_from", defaults.mail_from)?
            .set_default("mail_from_name", defaults.mail_from_name)?
            .add_source(file_source)
            // Environment overrides: NEONCHAT__SERVER_PORT, NEONCHAT__LLM_MODEL, etc.
            .add_source(config::Environment::with_prefix("NEONCHAT").separator("__"))
            // Variable names used by earlier deployments
            .set_override_option("llm_api_key", std::env::var("LLM_KEY").ok())?
            .set_override_option("mail_api_key", std::env::var("MAILERSEND_API_KEY").ok())?
            .set_override_option("github_client_id", std::env::var("AUTH_GITHUB_ID").ok())?
            .set_override_option(
                "github_client_secret",
                std::env::var("AUTH_GITHUB_SECRET").ok(),
            )?
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        ttl_hours(self.session_ttl_hours)
    }

    pub fn verification_ttl(&self) -> chrono::Duration {
        ttl_hours(self.verification_ttl_hours)
    }
}

pub const MAX_TTL_HOURS: i64 = 87600;

/// Clamped to the range `validate()` enforces.
fn ttl_hours(hours: i64) -> chrono::Duration {
    chrono::Duration::hours(hours.clamp(1, MAX_TTL_HOURS))
}

/// `~/.neonchat/config`, extension resolved by the `config` crate.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".neonchat")
        .join("config")
}
