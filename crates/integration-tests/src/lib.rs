//! Integration tests for Bazaar.
//!
//! These run against a live server and are `#[ignore]`d by default.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and the server
//! cargo run -p bazaar-server
//!
//! # Run integration tests
//! BAZAAR_TEST_URL=http://localhost:3000 cargo test -p bazaar-integration-tests -- --ignored
//! ```
//!
//! Admin scenarios also need `BAZAAR_TEST_ADMIN_EMAIL` and
//! `BAZAAR_TEST_ADMIN_PASSWORD` for an account promoted with
//! `bz-cli admin promote`. Password-reset scenarios read the mailed code
//! from the database at `BAZAAR_TEST_DATABASE_URL`.
//!
//! Credential endpoints share a strict per-IP limiter, so helpers that hit
//! them wait out `429` responses.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;

/// A 1x1 transparent PNG, accepted as an avatar or product image.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Base URL of the server under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("BAZAAR_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Admin credentials from the environment, if provided.
#[must_use]
pub fn admin_credentials() -> Option<(String, String)> {
    let email = std::env::var("BAZAAR_TEST_ADMIN_EMAIL").ok()?;
    let password = std::env::var("BAZAAR_TEST_ADMIN_PASSWORD").ok()?;
    Some((email, password))
}

/// A client with its own cookie jar, so token cookies persist between calls.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
#[allow(clippy::expect_used)]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// Full URL for an `/api/v1` path.
#[must_use]
pub fn api(path: &str) -> String {
    format!("{}/api/v1{path}", base_url())
}

/// A unique suffix for usernames and emails.
#[must_use]
pub fn unique() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(10).collect()
}

/// Status and parsed envelope of a response.
///
/// # Panics
///
/// Panics if the body is not JSON.
#[allow(clippy::expect_used)]
pub async fn envelope(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let body = resp.json::<Value>().await.expect("response is not JSON");
    (status, body)
}

/// Password used by every account the helpers register.
pub const PASSWORD: &str = "correct horse battery";

/// Send a request, waiting out rate-limit rejections.
///
/// `build` is called again for every retry since multipart bodies cannot be
/// cloned.
///
/// # Panics
///
/// Panics if the request fails or is still limited after several waits.
#[allow(clippy::expect_used)]
pub async fn send_paced(build: impl Fn() -> RequestBuilder) -> Response {
    for _ in 0..10 {
        let resp = build().send().await.expect("request failed");
        if resp.status() != StatusCode::TOO_MANY_REQUESTS {
            return resp;
        }
        let wait = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(6);
        tokio::time::sleep(Duration::from_secs(wait)).await;
    }
    panic!("still rate limited after repeated waits");
}

/// Submit the registration form.
///
/// # Panics
///
/// Panics if the request fails.
#[allow(clippy::expect_used)]
pub async fn register_as(client: &Client, username: &str, email: &str) -> (StatusCode, Value) {
    let resp = send_paced(|| {
        let avatar = reqwest::multipart::Part::bytes(TINY_PNG.to_vec())
            .file_name("avatar.png")
            .mime_str("image/png")
            .expect("valid mime");
        let form = reqwest::multipart::Form::new()
            .text("username", username.to_owned())
            .text("email", email.to_owned())
            .text("password", PASSWORD)
            .part("avatar", avatar);
        client.post(api("/auth/registerUser")).multipart(form)
    })
    .await;
    envelope(resp).await
}

/// Register a fresh account, returning its email and password.
///
/// # Panics
///
/// Panics if registration does not return 201.
pub async fn register(client: &Client) -> (String, String) {
    let id = unique();
    let email = format!("it-{id}@example.com");

    let (status, body) = register_as(client, &format!("it_{id}"), &email).await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    (email, PASSWORD.to_owned())
}

/// Log in, storing the token cookies in the client's jar.
pub async fn login(client: &Client, email: &str, password: &str) -> (StatusCode, Value) {
    let body = json!({ "email": email, "password": password });
    let resp = send_paced(|| client.post(api("/auth/loginUser")).json(&body)).await;
    envelope(resp).await
}

/// POST a JSON body to a credential endpoint such as `/auth/verifyOTP`.
pub async fn post_credentials(client: &Client, path: &str, body: &Value) -> (StatusCode, Value) {
    let resp = send_paced(|| client.post(api(path)).json(body)).await;
    envelope(resp).await
}

/// Connection to the server's database, for reading mailed reset codes.
///
/// # Panics
///
/// Panics if `BAZAAR_TEST_DATABASE_URL` is unset or unreachable.
#[allow(clippy::expect_used)]
pub async fn database() -> PgPool {
    let url = std::env::var("BAZAAR_TEST_DATABASE_URL").expect("BAZAAR_TEST_DATABASE_URL not set");
    PgPool::connect(&url).await.expect("Failed to connect to test database")
}

/// The reset code currently stored for `email`.
///
/// # Panics
///
/// Panics if the query fails.
#[allow(clippy::expect_used)]
pub async fn stored_otp(pool: &PgPool, email: &str) -> Option<String> {
    sqlx::query_scalar::<_, Option<String>>("SELECT otp FROM users WHERE email = $1")
        .bind(email)
        .fetch_one(pool)
        .await
        .expect("otp query failed")
}
