use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use reqwest::Url;
use validator::Validate;

use crate::api::dto::{EmailSignInRequest, EmailSignInResponse, ErrorResponse, VerifyEmailQuery};
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::auth::AuthUser;
use crate::models::internal::{IssuedSession, User};
use crate::services::mailer::verification_mail;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/email", post(request_email_sign_in))
        .route("/auth/callback/email", get(verify_email))
        .route("/auth/session", get(current_session))
        .route("/auth/signout", post(sign_out))
}

/// `{public_url}/api/auth/callback/email?token=..&email=..`
pub fn sign_in_link(public_url: &str, token: &str, email: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(&format!(
        "{}/api/auth/callback/email",
        public_url.trim_end_matches('/')
    ))
    .map_err(|e| ApiError::Internal(format!("invalid public_url {}: {}", public_url, e)))?;

    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("email", email);

    Ok(url)
}

/// Host shown in the mail subject, including a non-default port.
fn display_host(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => url.as_str().to_string(),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/email",
    request_body = EmailSignInRequest,
    responses(
        (status = 200, description = "Sign-in link sent", body = EmailSignInResponse),
        (status = 400, description = "Invalid email address", body = ErrorResponse),
        (status = 500, description = "Mail delivery failed", body = ErrorResponse)
    )
)]
pub async fn request_email_sign_in(
    State(state): State<AppState>,
    payload: Result<Json<EmailSignInRequest>, JsonRejection>,
) -> ApiResult<Json<EmailSignInResponse>> {
    let Json(req) = payload?;
    req.validate()
        .map_err(|_| ApiError::BadRequest(format!("Invalid email address: {}", req.email)))?;

    let (public_url, ttl) = {
        let config = state.config.read().await;
        (config.public_url.clone(), config.verification_ttl())
    };

    let token = state
        .identity
        .create_verification_token(&req.email, ttl)
        .await?;

    let link = sign_in_link(&public_url, &token, &req.email)?;
    let mail = verification_mail(&req.email, link.as_str(), &display_host(&link));
    state.mailer.send(&mail).await?;

    tracing::info!("Sent sign-in link to {}", req.email);
    Ok(Json(EmailSignInResponse { sent: true }))
}

#[utoipa::path(
    get,
    path = "/api/auth/callback/email",
    params(
        ("token" = String, Query, description = "Token from the sign-in link"),
        ("email" = String, Query, description = "Address the link was sent to")
    ),
    responses(
        (status = 200, description = "Session issued", body = IssuedSession),
        (status = 401, description = "Unknown, expired or reused link", body = ErrorResponse)
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    query: Result<Query<VerifyEmailQuery>, QueryRejection>,
) -> ApiResult<Json<IssuedSession>> {
    let Query(query) = query?;
    let accepted = state
        .identity
        .consume_verification_token(&query.email, &query.token)
        .await?;

    if !accepted {
        return Err(ApiError::Unauthorized(
            "Invalid or expired sign-in link".to_string(),
        ));
    }

    let user = state.identity.upsert_verified_user(&query.email).await?;
    let ttl = state.config.read().await.session_ttl();
    let session = state.identity.create_session(user.id, ttl).await?;

    Ok(Json(session))
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Signed-in user", body = User),
        (status = 401, description = "No valid session", body = ErrorResponse)
    )
)]
pub async fn current_session(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

#[utoipa::path(
    post,
    path = "/api/auth/signout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No valid session", body = ErrorResponse)
    )
)]
pub async fn sign_out(State(state): State<AppState>, auth: AuthUser) -> ApiResult<StatusCode> {
    state.identity.revoke_session(&auth.token).await?;
    tracing::info!("User {} signed out", auth.id());
    Ok(StatusCode::NO_CONTENT)
}
