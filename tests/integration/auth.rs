use super::*;
use axum::http::StatusCode;

// ============================================
// Email link sign-in
// ============================================

/// Pull `token` out of the link in the plain-text body of a sign-in mail.
fn token_from_mail(mail: &neonchat::services::OutgoingMail) -> String {
    let link = mail
        .text
        .lines()
        .find(|line| line.starts_with("http"))
        .unwrap();
    let url = reqwest::Url::parse(link).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

async fn request_link(app: &TestApp, email: &str) -> String {
    let response = send_request(
        app,
        "POST",
        "/api/auth/email",
        None,
        Some(json!({ "email": email })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "sent": true }));

    let sent = app.mailer.sent();
    token_from_mail(sent.last().unwrap())
}

#[tokio::test]
async fn test_full_sign_in_flow() {
    let app = create_test_app().await;

    let link_token = request_link(&app, "alice@example.com").await;
    let mail = app.mailer.sent().pop().unwrap();
    assert_eq!(mail.to, "alice@example.com");
    assert_eq!(mail.subject, "Sign in to localhost:8080");
    assert!(mail
        .text
        .contains("http://localhost:8080/api/auth/callback/email?token="));

    let response = send_request(
        &app,
        "GET",
        &format!(
            "/api/auth/callback/email?token={}&email=alice%40example.com",
            link_token
        ),
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let session = body_json(response).await;
    let token = session["token"].as_str().unwrap().to_string();
    assert!(session["expiresAt"].is_string());
    assert_eq!(session["user"]["email"], "alice@example.com");
    assert!(session["user"]["emailVerified"].is_string());

    let response = send_request(&app, "GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "alice@example.com");

    let response = send_request(&app, "POST", "/api/auth/signout", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send_request(&app, "GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_in_link_is_single_use() {
    let app = create_test_app().await;
    let link_token = request_link(&app, "alice@example.com").await;
    let uri = format!(
        "/api/auth/callback/email?token={}&email=alice%40example.com",
        link_token
    );

    let response = send_request(&app, "GET", &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_request(&app, "GET", &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_in_link_is_bound_to_its_address() {
    let app = create_test_app().await;
    let link_token = request_link(&app, "alice@example.com").await;

    let response = send_request(
        &app,
        "GET",
        &format!(
            "/api/auth/callback/email?token={}&email=mallory%40example.com",
            link_token
        ),
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The attempt burned the token
    let response = send_request(
        &app,
        "GET",
        &format!(
            "/api/auth/callback/email?token={}&email=alice%40example.com",
            link_token
        ),
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_email_is_rejected_without_mail() {
    let app = create_test_app().await;

    let response = send_request(
        &app,
        "POST",
        "/api/auth/email",
        None,
        Some(json!({ "email": "not an address" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_mail_failure_is_internal_error() {
    let app =
        create_test_app_with(create_test_config(), FakeGateway::default(), FakeMailer::failing())
            .await;

    let response = send_request(
        &app,
        "POST",
        "/api/auth/email",
        None,
        Some(json!({ "email": "alice@example.com" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "Failed to send verification email"
    );
}

#[tokio::test]
async fn test_same_address_signs_into_same_user() {
    let app = create_test_app().await;
    let (first, _) = sign_in(&app, "alice@example.com").await;
    let (second, _) = sign_in(&app, "Alice@Example.com").await;

    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_session_endpoint_requires_bearer() {
    let app = create_test_app().await;

    let response = send_request(&app, "GET", "/api/auth/session", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send_request(&app, "POST", "/api/auth/signout", Some("bogus"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
