//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers should return
//! `Result<T, AppError>`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::db::RepositoryError;
use crate::services::google::GoogleError;
use crate::services::{
    AuthError, CartError, ExportError, MediaError, OrderError, ProductError, ReportError,
};

const INTERNAL_MESSAGE: &str = "Internal server error";
const UPSTREAM_MESSAGE: &str = "External service error";

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication or account operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Catalog operation failed.
    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout or order lookup failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Report query failed.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Rendering an export failed.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Image storage failed.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Cache backend failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure envelope: `{statusCode, data: null, message, success: false}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    data: Option<()>,
    message: String,
    success: bool,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => auth_status(err),
            Self::Product(err) => match err {
                ProductError::Validation(_) | ProductError::ImageRequired => {
                    StatusCode::BAD_REQUEST
                }
                ProductError::NotFound => StatusCode::NOT_FOUND,
                ProductError::Repository(err) => repository_status(err),
                ProductError::Media(err) => media_status(err),
            },
            Self::Cart(err) => match err {
                CartError::InvalidQuantity(_)
                | CartError::NotEnoughStock
                | CartError::TotalTooLarge => StatusCode::BAD_REQUEST,
                CartError::ProductNotFound | CartError::ItemNotFound => StatusCode::NOT_FOUND,
                CartError::Repository(err) => repository_status(err),
            },
            Self::Order(err) => match err {
                OrderError::EmptyCart | OrderError::TotalTooLarge => StatusCode::BAD_REQUEST,
                OrderError::NotEnoughStock(_) => StatusCode::CONFLICT,
                OrderError::NotFound => StatusCode::NOT_FOUND,
                OrderError::Repository(err) => repository_status(err),
            },
            Self::Report(err) => match err {
                ReportError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
                ReportError::Repository(err) => repository_status(err),
            },
            Self::Media(err) => media_status(err),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Export(_) | Self::Cache(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to clients.
    fn client_message(&self, status: StatusCode) -> String {
        if status == StatusCode::BAD_GATEWAY {
            return UPSTREAM_MESSAGE.to_owned();
        }
        if status.is_server_error() {
            return INTERNAL_MESSAGE.to_owned();
        }
        match self {
            Self::Database(err) => err.to_string(),
            Self::Auth(err) => err.to_string(),
            Self::Product(err) => err.to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::Report(err) => err.to_string(),
            Self::Media(err) => err.to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, please try again later".to_owned(),
            Self::Export(_) | Self::Cache(_) | Self::Internal(_) => INTERNAL_MESSAGE.to_owned(),
        }
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn media_status(err: &MediaError) -> StatusCode {
    match err {
        MediaError::NotAnImage(_) => StatusCode::BAD_REQUEST,
        MediaError::Http(_) | MediaError::Api(_) => StatusCode::BAD_GATEWAY,
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail(_)
        | AuthError::InvalidUsername(_)
        | AuthError::WeakPassword(_)
        | AuthError::PasswordMismatch
        | AuthError::InvalidOldPassword
        | AuthError::InvalidPhone { .. }
        | AuthError::AvatarRequired
        | AuthError::InvalidOtp
        | AuthError::OtpExpired
        | AuthError::ResetNotAllowed
        | AuthError::Google(GoogleError::UnverifiedEmail) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::AccountLocked | AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::Repository(err) => repository_status(err),
        AuthError::Media(err) => media_status(err),
        AuthError::Google(_) => StatusCode::BAD_GATEWAY,
        AuthError::PasswordHash | AuthError::Email(_) | AuthError::Token(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        // Don't expose internal error details to clients
        let body = ErrorBody {
            status_code: status.as_u16(),
            data: None,
            message: self.client_message(status),
            success: false,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn auth_errors_map_to_client_statuses() {
        let status = |err: AuthError| AppError::from(err).status();

        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::AccountLocked), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status(AuthError::InvalidOtp), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::OtpExpired), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::PasswordMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::UserNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(AuthError::PasswordHash), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn cart_and_order_stock_errors_differ() {
        assert_eq!(
            AppError::from(CartError::NotEnoughStock).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(OrderError::NotEnoughStock("Mug".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(OrderError::EmptyCart).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(CartError::ItemNotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn oversized_totals_are_client_errors() {
        assert_eq!(
            AppError::from(CartError::TotalTooLarge).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(OrderError::TotalTooLarge).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn repository_conflict_is_409() {
        let err = AppError::from(RepositoryError::Conflict("dup".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failure_envelope_carries_status_and_message() {
        let (status, body) = body_json(AppError::from(AuthError::AccountLocked)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["statusCode"], 403);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert_eq!(body["message"], "User is locked. Please check your email");
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let (status, body) =
            body_json(AppError::Internal("connection string leaked".into())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn out_of_stock_names_the_product() {
        let (_, body) = body_json(AppError::from(OrderError::NotEnoughStock("Mug".into()))).await;
        assert_eq!(body["message"], "Not enough stock for Mug");
    }
}
