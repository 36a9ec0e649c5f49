use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::services::http_client;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Verification email could not be sent: {status} - {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// MailerSend transactional email API.
#[derive(Clone)]
pub struct MailerSendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
    from_name: String,
}

impl MailerSendClient {
    pub fn new(base_url: String, api_key: String, from: String, from_name: String) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from,
            from_name,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.mail_base_url.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
            config.mail_from_name.clone(),
        )
    }
}

#[async_trait]
impl Mailer for MailerSendClient {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let sender = Address {
            email: &self.from,
            name: Some(&self.from_name),
        };
        let request = EmailRequest {
            from: sender.clone(),
            to: vec![Address {
                email: &mail.to,
                name: None,
            }],
            reply_to: sender,
            subject: &mail.subject,
            html: &mail.html,
            text: &mail.text,
        };

        let response = self
            .client
            .post(format!("{}/v1/email", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if response.status().as_u16() >= 400 {
            return Err(MailError::Rejected {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        tracing::info!("Sent \"{}\" mail to {}", mail.subject, mail.to);
        Ok(())
    }
}

/// Sign-in link mail, subject `Sign in to {host}`.
pub fn verification_mail(to: &str, url: &str, host: &str) -> OutgoingMail {
    let escaped_url = escape_html(url);
    let escaped_host = escape_html(host);

    let html = format!(
        "<body style=\"font-family: Helvetica, Arial, sans-serif;\">\
         <p>Sign in to <strong>{host}</strong></p>\
         <p><a href=\"{url}\" target=\"_blank\" \
         style=\"padding: 10px 20px; background: #08193b; color: #ffffff; \
         border-radius: 5px; text-decoration: none;\">Sign in</a></p>\
         <p>If you did not request this email you can safely ignore it.</p>\
         </body>",
        host = escaped_host,
        url = escaped_url,
    );
    let text = format!("Sign in to {}\n{}\n\n", host, url);

    OutgoingMail {
        to: to.to_string(),
        subject: format!("Sign in to {}", host),
        html,
        text,
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Clone, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    from: Address<'a>,
    to: Vec<Address<'a>>,
    reply_to: Address<'a>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}
