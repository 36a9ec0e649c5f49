pub mod llm_gateway;
pub mod mailer;
pub mod sse;

use once_cell::sync::Lazy;

// Re-export for convenience
pub use llm_gateway::{AnthropicGateway, GatewayError, LlmGateway, ReplyStream};
pub use mailer::{MailError, Mailer, MailerSendClient, OutgoingMail};

/// One connection pool for every outbound HTTP call in the process.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

pub fn http_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}
