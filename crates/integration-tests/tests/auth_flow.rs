//! Integration tests for registration, login and token handling.
//!
//! These tests require:
//! - A running `PostgreSQL` database with migrations applied (`bz-cli migrate`)
//! - The server running (cargo run -p bazaar-server)
//! - Cloudinary credentials, since registration uploads an avatar
//! - `BAZAAR_TEST_DATABASE_URL` for the password-reset flows, which read the
//!   mailed code from the `users` table
//!
//! Run with: cargo test -p bazaar-integration-tests -- --ignored

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bazaar_integration_tests::{
    PASSWORD, api, client, database, envelope, login, post_credentials, register, register_as,
    stored_otp, unique,
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_health() {
    let resp = client()
        .get(format!("{}/health", bazaar_integration_tests::base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running server and Cloudinary credentials"]
async fn test_register_login_me_logout() {
    let client = client();
    let (email, password) = register(&client).await;

    let (status, body) = login(&client, &email, &password).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["user"]["password"].is_null());

    // Cookie jar carries the access token.
    let (status, body) = envelope(client.get(api("/auth/me")).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], email.as_str());

    let resp = client.post(api("/auth/logoutUser")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.get(api("/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server and Cloudinary credentials"]
async fn test_refresh_rotates_tokens() {
    let client = client();
    let (email, password) = register(&client).await;
    let (_, body) = login(&client, &email, &password).await;
    let first = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let fresh = bazaar_integration_tests::client();
    let (status, body) = envelope(
        fresh
            .post(api("/auth/refresh"))
            .json(&json!({ "refreshToken": first }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["refreshToken"].as_str(), Some(first.as_str()));

    // The rotated-out token no longer works.
    let resp = bazaar_integration_tests::client()
        .post(api("/auth/refresh"))
        .json(&json!({ "refreshToken": first }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_wrong_password_is_unauthorized() {
    let (status, body) = login(&client(), "nobody@example.com", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 401);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_forgot_password_does_not_reveal_accounts() {
    let (status, body) = post_credentials(
        &client(),
        "/auth/forgotPassword",
        &json!({ "email": "nobody@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
#[ignore = "Requires running server and Cloudinary credentials"]
async fn test_duplicate_registration_conflicts() {
    let client = client();
    let id = unique();
    let email = format!("dup-{id}@example.com");

    let (status, _) = register_as(&client, &format!("dup_{id}"), &email).await;
    assert_eq!(status, StatusCode::CREATED);

    // Same email, different username.
    let (status, body) = register_as(&client, &format!("dup2_{id}"), &email).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    // Same username, different email.
    let other = format!("dup2-{id}@example.com");
    let (status, _) = register_as(&client, &format!("dup_{id}"), &other).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

/// Request a reset code and read it back from the database.
async fn request_otp(email: &str) -> String {
    let (status, _) =
        post_credentials(&client(), "/auth/forgotPassword", &json!({ "email": email })).await;
    assert_eq!(status, StatusCode::OK);
    stored_otp(&database().await, email)
        .await
        .expect("reset code was not stored")
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary credentials and database access"]
async fn test_lockout_and_reset_unlocks() {
    let client = client();
    let (email, _) = register(&client).await;

    for _ in 0..5 {
        let (status, _) = login(&client, &email, "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Locked: even the right password is refused.
    let (status, body) = login(&client, &email, PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "User is locked. Please check your email");

    // Reset is refused until a code has been verified.
    let reset = json!({
        "email": email,
        "newPassword": "a brand new secret",
        "confirmPassword": "a brand new secret",
    });
    let (status, _) = post_credentials(&client, "/auth/resetPassword", &reset).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let otp = request_otp(&email).await;
    let (status, _) = post_credentials(
        &client,
        "/auth/verifyOTP",
        &json!({ "email": email, "otp": otp }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_credentials(&client, "/auth/resetPassword", &reset).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&client, &email, "a brand new secret").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary credentials and database access"]
async fn test_otp_is_single_use() {
    let client = client();
    let (email, _) = register(&client).await;
    let otp = request_otp(&email).await;
    let body = json!({ "email": email, "otp": otp });

    let (status, _) = post_credentials(&client, "/auth/verifyOTP", &body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, reply) = post_credentials(&client, "/auth/verifyOTP", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["message"], "Invalid OTP");
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary credentials and database access"]
async fn test_expired_otp_is_rejected() {
    let client = client();
    let (email, _) = register(&client).await;
    let otp = request_otp(&email).await;

    let pool = database().await;
    sqlx::query("UPDATE users SET otp_expires_at = NOW() - INTERVAL '1 minute' WHERE email = $1")
        .bind(&email)
        .execute(&pool)
        .await
        .unwrap();

    let body = json!({ "email": email, "otp": otp });
    let (status, reply) = post_credentials(&client, "/auth/verifyOTP", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["message"], "OTP expired");

    // The expired code is gone for good.
    assert_eq!(stored_otp(&pool, &email).await, None);
}

#[tokio::test]
#[ignore = "Requires running server, Cloudinary credentials and database access"]
async fn test_otp_discarded_after_repeated_misses() {
    let client = client();
    let (email, _) = register(&client).await;
    let otp = request_otp(&email).await;
    let wrong = if otp == "10000" { "10001" } else { "10000" };

    for _ in 0..5 {
        let (status, _) = post_credentials(
            &client,
            "/auth/verifyOTP",
            &json!({ "email": email, "otp": wrong }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // The right code no longer works once guessing used up the attempts.
    let (status, _) = post_credentials(
        &client,
        "/auth/verifyOTP",
        &json!({ "email": email, "otp": otp }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
