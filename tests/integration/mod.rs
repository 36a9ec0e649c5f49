// tests/integration/mod.rs

// ============================================
// Re-export commonly used types
// ============================================
pub use serde_json::{json, Value};
pub use std::sync::Arc;
pub use uuid::Uuid;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use neonchat::{
    api::routes::{create_router, AppState},
    config::Config,
    models::internal::{Message, User},
    services::{
        llm_gateway::{GatewayError, LlmGateway, ReplyStream},
        mailer::{MailError, Mailer, OutgoingMail},
    },
    storage::{init_db, IdentityStore, SeaOrmConversationRepository, SeaOrmIdentityStore},
};
use std::sync::Mutex;
use tower::ServiceExt;

pub mod auth;
pub mod concurrency;

// ============================================
// Test doubles
// ============================================

/// Scripted model provider.
#[derive(Default)]
pub struct FakeGateway {
    chunks: Vec<String>,
    fail_before_stream: bool,
    fail_mid_stream: bool,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl FakeGateway {
    pub fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_before_stream: true,
            ..Self::default()
        }
    }

    pub fn failing_mid_stream(chunks: &[&str]) -> Self {
        Self {
            fail_mid_stream: true,
            ..Self::replying(chunks)
        }
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmGateway for FakeGateway {
    async fn stream_reply(&self, messages: &[Message]) -> Result<ReplyStream, GatewayError> {
        self.calls.lock().unwrap().push(messages.to_vec());

        if self.fail_before_stream {
            return Err(GatewayError::Provider("overloaded_error: busy".to_string()));
        }

        let mut items: Vec<Result<String, GatewayError>> =
            self.chunks.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(GatewayError::Provider("stream interrupted".to_string())));
        }

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Mailer that keeps everything it was asked to send.
#[derive(Default)]
pub struct FakeMailer {
    fail: bool,
    sent: Mutex<Vec<OutgoingMail>>,
}

impl FakeMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Rejected {
                status: 422,
                message: "domain not verified".to_string(),
            });
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

// ============================================
// Shared Test Helpers
// ============================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<FakeMailer>,
}

pub fn create_test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        public_url: "http://localhost:8080".to_string(),
        rate_limit_per_minute: 1000,
        ..Config::default()
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(
        create_test_config(),
        FakeGateway::replying(&["hi", " there"]),
        FakeMailer::default(),
    )
    .await
}

pub async fn create_test_app_with(
    config: Config,
    gateway: FakeGateway,
    mailer: FakeMailer,
) -> TestApp {
    let db = init_db(&config.database_url).await.unwrap();
    let gateway = Arc::new(gateway);
    let mailer = Arc::new(mailer);

    let state = AppState::new(
        config,
        Arc::new(SeaOrmConversationRepository::new(db.clone())),
        Arc::new(SeaOrmIdentityStore::new(db)),
        gateway.clone(),
        mailer.clone(),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        gateway,
        mailer,
    }
}

/// Create a verified user with a live session; returns the bearer token.
pub async fn sign_in(app: &TestApp, email: &str) -> (User, String) {
    let user = app.state.identity.upsert_verified_user(email).await.unwrap();
    let session = app
        .state
        .identity
        .create_session(user.id, chrono::Duration::hours(1))
        .await
        .unwrap();
    (user, session.token)
}

pub async fn send_request(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Create a conversation through the API and return its id.
pub async fn create_conversation(app: &TestApp, token: &str) -> String {
    let response = send_request(app, "POST", "/api/ai/chats/new", Some(token), None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}
