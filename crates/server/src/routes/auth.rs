//! Authentication route handlers.
//!
//! Password accounts, token refresh, OTP password reset, user
//! administration and Google sign-in.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, header},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tower_sessions::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use tracing::instrument;

use bazaar_core::UserId;

use crate::config::ServerConfig;
use crate::error::{AppError, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{
    ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, RequireAdmin, RequireAuth, cookie_value,
};
use crate::models::{PublicUser, session_keys};
use crate::routes::multipart::{read_text, read_upload};
use crate::routes::response::{ApiResponse, Json, Path, Query};
use crate::services::auth::{AuthError, AuthService, Registration, TokenPair};
use crate::state::AppState;

const OAUTH_STATE_LENGTH: usize = 32;

fn auth_service(state: &AppState) -> AuthService<'_> {
    AuthService::new(state.pool(), state.tokens(), state.email(), state.media())
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh request body, used when the cookie is absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Body carrying only an email.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// OTP verification body.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Password reset body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Password change body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Google callback query.
#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// User plus freshly issued tokens.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthPayload {
    fn new(user: PublicUser, tokens: TokenPair) -> Self {
        Self {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

/// Admin user listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub users: Vec<PublicUser>,
    pub total_users: usize,
}

// =============================================================================
// Cookies
// =============================================================================

fn token_cookie(
    config: &ServerConfig,
    name: &'static str,
    value: String,
    max_age: CookieDuration,
) -> String {
    Cookie::build((name, value))
        .http_only(true)
        .secure(config.is_secure())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
        .to_string()
}

/// `Set-Cookie` headers for a token pair.
fn set_token_cookies(
    state: &AppState,
    tokens: &TokenPair,
) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    let config = state.config();
    let access_age = CookieDuration::seconds(state.tokens().access_ttl().num_seconds());
    let refresh_age = CookieDuration::seconds(state.tokens().refresh_ttl().num_seconds());
    AppendHeaders([
        (
            header::SET_COOKIE,
            token_cookie(config, ACCESS_TOKEN_COOKIE, tokens.access_token.clone(), access_age),
        ),
        (
            header::SET_COOKIE,
            token_cookie(config, REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone(), refresh_age),
        ),
    ])
}

/// `Set-Cookie` headers that expire both token cookies.
fn clear_token_cookies(config: &ServerConfig) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    AppendHeaders([
        (
            header::SET_COOKIE,
            token_cookie(config, ACCESS_TOKEN_COOKIE, String::new(), CookieDuration::ZERO),
        ),
        (
            header::SET_COOKIE,
            token_cookie(config, REFRESH_TOKEN_COOKIE, String::new(), CookieDuration::ZERO),
        ),
    ])
}

// =============================================================================
// Registration & Login
// =============================================================================

/// Register a password account.
///
/// # Route
///
/// `POST /api/v1/auth/registerUser` (multipart)
#[instrument(skip(state, multipart))]
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut form = Registration {
        username: String::new(),
        email: String::new(),
        password: String::new(),
        phone: None,
        avatar: None,
    };

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("username") => form.username = read_text(field).await?,
            Some("email") => form.email = read_text(field).await?,
            Some("password") => form.password = read_text(field).await?,
            Some("phone") => form.phone = Some(read_text(field).await?),
            Some("avatar") => form.avatar = Some(read_upload(field).await?),
            _ => {}
        }
    }

    let user = auth_service(&state).register(form).await?;
    Ok(ApiResponse::created(PublicUser::from(user), "User created successfully").into_response())
}

/// Log in and receive tokens as cookies and in the body.
///
/// # Route
///
/// `POST /api/v1/auth/loginUser`
#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let (user, tokens) = auth_service(&state)
        .login(&body.email, &body.password)
        .await?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "Logged in", None);

    let cookies = set_token_cookies(&state, &tokens);
    let payload = AuthPayload::new(PublicUser::from(user), tokens);
    Ok((cookies, ApiResponse::ok(payload, "User logged in successfully")).into_response())
}

/// Revoke the refresh token and clear cookies.
///
/// # Route
///
/// `POST /api/v1/auth/logoutUser`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Response, AppError> {
    auth_service(&state).logout(user.id).await?;
    clear_sentry_user();

    Ok((
        clear_token_cookies(state.config()),
        ApiResponse::ok(Option::<()>::None, "User logged out successfully"),
    )
        .into_response())
}

/// Rotate the token pair.
///
/// Reads the `refreshToken` cookie, falling back to a JSON body.
///
/// # Route
///
/// `POST /api/v1/auth/refresh`
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let token = cookie_value(&headers, REFRESH_TOKEN_COOKIE)
        .or_else(|| {
            serde_json::from_slice::<RefreshRequest>(&body)
                .ok()
                .and_then(|b| b.refresh_token)
        })
        .ok_or_else(|| AppError::Unauthorized("Refresh token is required".to_owned()))?;

    let (user, tokens) = auth_service(&state).refresh(&token).await?;

    let cookies = set_token_cookies(&state, &tokens);
    let payload = AuthPayload::new(PublicUser::from(user), tokens);
    Ok((cookies, ApiResponse::ok(payload, "Access token refreshed")).into_response())
}

// =============================================================================
// Password Reset
// =============================================================================

/// Mail a reset code.
///
/// # Route
///
/// `POST /api/v1/auth/forgotPassword`
#[instrument(skip(state, body))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<ApiResponse<Option<()>>, AppError> {
    auth_service(&state).forgot_password(&body.email).await?;
    Ok(ApiResponse::ok(
        None,
        "If an account exists for this email, an OTP has been sent",
    ))
}

/// Verify a reset code.
///
/// # Route
///
/// `POST /api/v1/auth/verifyOTP`
#[instrument(skip(state, body))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<ApiResponse<Option<()>>, AppError> {
    auth_service(&state)
        .verify_otp(&body.email, body.otp.trim())
        .await?;
    Ok(ApiResponse::ok(None, "OTP verified successfully"))
}

/// Set a new password after OTP verification.
///
/// # Route
///
/// `POST /api/v1/auth/resetPassword`
#[instrument(skip(state, body))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<ApiResponse<Option<()>>, AppError> {
    auth_service(&state)
        .reset_password(&body.email, &body.new_password, &body.confirm_password)
        .await?;
    Ok(ApiResponse::ok(None, "Password reset successfully"))
}

// =============================================================================
// Account Management
// =============================================================================

/// Change the caller's password.
///
/// # Route
///
/// `PUT /api/v1/auth/{id}`
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<UserId>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<Option<()>>, AppError> {
    auth_service(&state)
        .change_password(&user, id, &body.old_password, &body.new_password)
        .await?;
    Ok(ApiResponse::ok(None, "Password updated"))
}

/// Delete a user.
///
/// # Route
///
/// `DELETE /api/v1/auth/{id}` (admin)
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
) -> Result<ApiResponse<Option<()>>, AppError> {
    auth_service(&state).delete_user(id).await?;
    Ok(ApiResponse::ok(None, "User deleted successfully"))
}

/// Every user.
///
/// # Route
///
/// `GET /api/v1/auth` (admin)
#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<UserList>, AppError> {
    let users: Vec<PublicUser> = auth_service(&state)
        .list_users()
        .await?
        .iter()
        .map(PublicUser::from)
        .collect();
    let total_users = users.len();
    Ok(ApiResponse::ok(
        UserList { users, total_users },
        "Users fetched successfully",
    ))
}

/// The caller's profile.
///
/// # Route
///
/// `GET /api/v1/auth/me`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<PublicUser>, AppError> {
    let user = auth_service(&state).get_user(user.id).await?;
    Ok(ApiResponse::ok(PublicUser::from(user), "User fetched successfully"))
}

// =============================================================================
// Google Sign-In
// =============================================================================

fn generate_oauth_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(OAUTH_STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Start Google sign-in.
///
/// # Route
///
/// `GET /api/v1/auth/google`
#[instrument(skip_all)]
pub async fn google_start(
    State(state): State<AppState>,
    session: Session,
) -> Result<Redirect, AppError> {
    let google = state
        .google()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".to_owned()))?;

    let oauth_state = generate_oauth_state();
    session
        .insert(session_keys::GOOGLE_OAUTH_STATE, &oauth_state)
        .await
        .map_err(|e| AppError::Internal(format!("failed to store OAuth state: {e}")))?;

    Ok(Redirect::to(&google.authorize_url(&oauth_state)))
}

fn login_failure(state: &AppState, reason: &str) -> Response {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("error", reason)
        .finish();
    Redirect::to(&format!("{}/login?{query}", state.config().frontend_url)).into_response()
}

/// Finish Google sign-in and hand the tokens to the frontend.
///
/// # Route
///
/// `GET /auth/google/callback`
#[instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<GoogleCallbackQuery>,
) -> Response {
    let Some(google) = state.google() else {
        return login_failure(&state, "google_disabled");
    };

    if let Some(error) = query.error {
        tracing::warn!(%error, "Google sign-in cancelled or refused");
        return login_failure(&state, "google_denied");
    }

    let expected = session
        .remove::<String>(session_keys::GOOGLE_OAUTH_STATE)
        .await
        .ok()
        .flatten();
    if expected.is_none() || expected != query.state {
        tracing::warn!("Google sign-in state mismatch");
        return login_failure(&state, "invalid_state");
    }

    let Some(code) = query.code else {
        return login_failure(&state, "missing_code");
    };

    let profile = match google.fetch_profile(&code).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(error = %e, "Google profile fetch failed");
            return login_failure(&state, "google_failed");
        }
    };

    let (user, tokens) = match auth_service(&state).google_login(&profile).await {
        Ok(result) => result,
        Err(AuthError::AccountLocked) => return login_failure(&state, "locked"),
        Err(e) => return AppError::from(e).into_response(),
    };

    set_sentry_user(&user.id, Some(user.email.as_str()));

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("accessToken", &tokens.access_token)
        .append_pair("refreshToken", &tokens.refresh_token)
        .finish();
    let target = format!("{}/?{query}", state.config().frontend_url);

    (set_token_cookies(&state, &tokens), Redirect::to(&target)).into_response()
}
