use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::api::auth_routes;
use crate::api::dto::*;
use crate::api::error::{ApiError, ApiResult};
use crate::api::rate_limiter::{rate_limit_middleware, RateLimiter};
use crate::auth::AuthUser;
use crate::config::Config;
use crate::models::internal::{Conversation, IssuedSession, Message, Role, User};
use crate::services::llm_gateway::LlmGateway;
use crate::services::mailer::Mailer;
use crate::storage::identity::IdentityStore;
use crate::storage::repository::ConversationRepository;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub repo: Arc<dyn ConversationRepository>,
    pub identity: Arc<dyn IdentityStore>,
    pub gateway: Arc<dyn LlmGateway>,
    pub mailer: Arc<dyn Mailer>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: Config,
        repo: Arc<dyn ConversationRepository>,
        identity: Arc<dyn IdentityStore>,
        gateway: Arc<dyn LlmGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_per_minute);
        Self {
            config: Arc::new(RwLock::new(config)),
            repo,
            identity,
            gateway,
            mailer,
            limiter,
        }
    }
}

/// Unparseable ids are indistinguishable from unknown ones.
fn parse_conversation_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(raw.to_string()))
}

/// Load a conversation, hiding conversations of other users behind NotFound.
async fn owned_conversation(state: &AppState, id: Uuid, owner: Uuid) -> ApiResult<Conversation> {
    match state.repo.find_by_id(id).await? {
        Some(conversation) if conversation.is_owned_by(owner) => Ok(conversation),
        Some(_) => {
            tracing::debug!("User {} asked for foreign conversation {}", owner, id);
            Err(ApiError::NotFound(id.to_string()))
        }
        None => Err(ApiError::NotFound(id.to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/api/ai/chats/new",
    responses(
        (status = 201, description = "Conversation created", body = Conversation),
        (status = 401, description = "No valid session", body = ErrorResponse)
    )
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let title = state.config.read().await.default_title.clone();
    let conversation = state.repo.create(auth.id(), &title).await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

#[utoipa::path(
    get,
    path = "/api/ai/chats/user",
    responses(
        (status = 200, description = "Caller's conversations, most recent first", body = [Conversation]),
        (status = 401, description = "No valid session", body = ErrorResponse)
    )
)]
pub async fn list_user_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state.repo.list_by_owner(auth.id()).await?;
    Ok(Json(conversations))
}

#[utoipa::path(
    get,
    path = "/api/ai/chats/{id}",
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation", body = Conversation),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "Unknown conversation", body = ErrorResponse)
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    let id = parse_conversation_id(&id)?;
    let conversation = owned_conversation(&state, id, auth.id()).await?;
    Ok(Json(conversation))
}

#[utoipa::path(
    put,
    path = "/api/ai/chats/{id}",
    params(("id" = String, Path, description = "Conversation id")),
    request_body = ReplaceMessagesRequest,
    responses(
        (status = 200, description = "Updated conversation", body = Conversation),
        (status = 400, description = "Undecodable body", body = ErrorResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "Unknown conversation", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn replace_conversation_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<ReplaceMessagesRequest>, JsonRejection>,
) -> ApiResult<Json<Conversation>> {
    let id = parse_conversation_id(&id)?;
    let Json(req) = payload?;
    owned_conversation(&state, id, auth.id()).await?;

    let updated = state
        .repo
        .replace_messages(id, &req.messages, req.title.as_deref())
        .await?;

    Ok(Json(updated))
}

/// Persist the submitted history, then stream the model's reply as plain text.
///
/// Every gateway delta is written to the body as soon as it arrives. A
/// provider failure before the first byte is a 502; a failure afterwards
/// aborts the body.
#[utoipa::path(
    post,
    path = "/api/ai/chat",
    request_body = ChatTurnRequest,
    responses(
        (status = 200, description = "Streamed reply text", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing or undecodable conversation id or messages", body = ErrorResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "Unknown conversation", body = ErrorResponse),
        (status = 502, description = "Model provider failure", body = ErrorResponse)
    )
)]
pub async fn chat_turn(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;

    let raw_id = req
        .conversation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing conversationId".to_string()))?;

    let messages = req
        .messages
        .filter(|messages| !messages.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing messages".to_string()))?;

    let id = Uuid::parse_str(raw_id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid conversationId: {}", raw_id)))?;

    owned_conversation(&state, id, auth.id()).await?;

    // The user's turn is durable before the model is invoked
    state.repo.replace_messages(id, &messages, None).await?;

    let mut reply = state.gateway.stream_reply(&messages).await?;

    // An error event ahead of any text still counts as a failed call
    let first = match reply.next().await {
        Some(Err(e)) => return Err(e.into()),
        first => first,
    };

    tracing::info!(
        "Streaming reply for conversation {} ({} messages)",
        id,
        messages.len()
    );

    let body = futures::stream::iter(first).chain(reply).map(move |chunk| {
        chunk.inspect_err(|e| {
            tracing::warn!("Reply stream for conversation {} aborted: {}", id, e);
        })
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_conversation,
        list_user_conversations,
        get_conversation,
        replace_conversation_messages,
        chat_turn,
        auth_routes::request_email_sign_in,
        auth_routes::verify_email,
        auth_routes::current_session,
        auth_routes::sign_out,
    ),
    components(schemas(
        Conversation,
        Message,
        Role,
        User,
        IssuedSession,
        ReplaceMessagesRequest,
        ChatTurnRequest,
        EmailSignInRequest,
        EmailSignInResponse,
        ErrorResponse,
    )),
    tags((name = "neonchat", description = "Conversation and session API"))
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/ai/chats/new", post(create_conversation))
        .route("/ai/chats/user", get(list_user_conversations))
        .route(
            "/ai/chats/{id}",
            get(get_conversation).put(replace_conversation_messages),
        )
        .route("/ai/chat", post(chat_turn))
        .merge(auth_routes::routes())
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> &'static str {
    "OK"
}

/// The conversation gauge is left out when the store cannot be counted.
pub async fn metrics(State(state): State<AppState>) -> String {
    let mut out = String::new();

    match state.repo.count().await {
        Ok(count) => out.push_str(&format!(
            "# HELP neonchat_conversations_total Total number of conversations\n\
             # TYPE neonchat_conversations_total gauge\n\
             neonchat_conversations_total {}\n",
            count
        )),
        Err(e) => tracing::error!("Failed to count conversations for metrics: {}", e),
    }

    out.push_str(
        "# HELP neonchat_up Whether the service is up\n\
         # TYPE neonchat_up gauge\n\
         neonchat_up 1\n",
    );
    out
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
