//! Google sign-in: state check, emailed code, profile completion.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use modernshop_core::Email;
use modernshop_integration_tests::{TestApp, TestClient};
use modernshop_storefront::models::GoogleProfile;
use modernshop_storefront::services::google::ScriptedOAuthProvider;

fn profile(id: &str, email: Option<&str>) -> GoogleProfile {
    GoogleProfile {
        id: id.to_owned(),
        email: email.map(|e| Email::parse(e).unwrap()),
        display_name: Some("Gina Gee".to_owned()),
    }
}

fn app() -> TestApp {
    TestApp::with_google(
        ScriptedOAuthProvider::new()
            .with_profile("good-code", profile("g-123", Some("gina@example.com")))
            .with_profile("no-email", profile("g-456", None)),
    )
}

/// Start sign-in and return the `state` sent to Google.
async fn start(client: &mut TestClient) -> String {
    let res = client.get("/auth/google").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let location = res.location().to_owned();
    location.split("state=").nth(1).unwrap().to_owned()
}

async fn callback(client: &mut TestClient, code: &str, state: &str) -> String {
    let res = client
        .get(&format!("/auth/google/callback?code={code}&state={state}"))
        .await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    res.location().to_owned()
}

#[tokio::test]
async fn test_new_google_user_signs_up() {
    let app = app();
    let mut client = app.client();

    let state = start(&mut client).await;
    assert_eq!(state.len(), 32);
    assert_eq!(callback(&mut client, "good-code", &state).await, "/google-otp.html");

    let info = client.get("/api/auth/google/session-info").await.json();
    assert_eq!(info["hasSession"], true);
    assert_eq!(info["emailSent"], true);
    assert!(info.get("fallbackOtp").is_none());

    // Completing before the code is checked is refused.
    let res = client
        .post_json("/api/auth/google/complete", &json!({ "username": "gina" }))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let code = app.latest_code_for("gina@example.com").unwrap();
    let res = client
        .post_json("/api/auth/google/verify-otp", &json!({ "otp": code }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["redirect"], "/google-complete.html");

    let hint = client.get("/api/auth/google/profile").await.json();
    assert_eq!(hint["suggestedUsername"], "gina");

    let res = client
        .post_json(
            "/api/auth/google/complete",
            &json!({ "username": "gina", "phone": "555-0100" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.json()["username"], "gina");

    let status = client.get("/api/auth/status").await.json();
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["user"]["displayName"], "Gina Gee");
    assert_eq!(status["user"]["isVerified"], true);

    // The challenge is gone.
    let res = client.get("/api/auth/google/session-info").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recent_google_user_skips_code() {
    let app = app();
    let mut first = app.client();
    let state = start(&mut first).await;
    callback(&mut first, "good-code", &state).await;
    let code = app.latest_code_for("gina@example.com").unwrap();
    first
        .post_json("/api/auth/google/verify-otp", &json!({ "otp": code }))
        .await;
    let res = first
        .post_json("/api/auth/google/complete", &json!({ "username": "gina" }))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let mails = app.sent_mail().len();

    let mut second = app.client();
    let state = start(&mut second).await;
    assert_eq!(callback(&mut second, "good-code", &state).await, "/");
    assert!(second.has_session());
    assert_eq!(app.sent_mail().len(), mails, "no code for a recent login");
}

#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let app = app();
    let mut client = app.client();
    start(&mut client).await;

    let location = callback(&mut client, "good-code", "forged").await;
    assert_eq!(location, "/login.html?error=invalid_state");
    assert!(app.sent_mail().is_empty());
}

#[tokio::test]
async fn test_profile_without_email() {
    let app = app();
    let mut client = app.client();
    let state = start(&mut client).await;

    let location = callback(&mut client, "no-email", &state).await;
    assert_eq!(location, "/login.html?error=no_email");
}

#[tokio::test]
async fn test_wrong_code_and_missing_challenge() {
    let app = app();
    let mut client = app.client();

    let res = client
        .post_json("/api/auth/google/verify-otp", &json!({ "otp": "123456" }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let state = start(&mut client).await;
    callback(&mut client, "good-code", &state).await;
    let res = client
        .post_json("/api/auth/google/verify-otp", &json!({ "otp": "nope" }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "Invalid OTP");
}

#[tokio::test]
async fn test_google_not_configured() {
    let app = TestApp::new();
    let res = app.client().get("/auth/google").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
