//! HTTP route handlers for the Bazaar API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database)
//! GET  /auth/google/callback            - Google OAuth callback
//!
//! # Auth (/api/v1/auth)
//! POST /registerUser                    - Register (multipart, avatar)
//! POST /loginUser                       - Login, sets token cookies
//! POST /logoutUser                      - Logout (auth)
//! POST /refresh                         - Rotate tokens
//! POST /forgotPassword                  - Mail an OTP
//! POST /verifyOTP                       - Verify OTP, open reset window
//! POST /resetPassword                   - Reset password inside the window
//! PUT  /{id}                            - Change own password (auth)
//! DELETE /{id}                          - Delete user (admin)
//! GET  /                                - List users (admin)
//! GET  /me                              - Current user (auth)
//! GET  /google                          - Start Google sign-in
//!
//! # Products (/api/v1/product)
//! POST /                                - Create (admin, multipart)
//! GET  /                                - Paginated listing
//! GET  /category                        - Distinct categories
//! GET  /{id}                            - Detail, counts a view
//! PUT  /{id}                            - Partial update (admin)
//! DELETE /{id}                          - Delete (admin)
//!
//! # Cart (/api/v1/cart, auth)
//! POST /                                - Add item
//! GET  /                                - Current cart or null
//! PATCH /{itemId}                       - Set quantity
//! DELETE /{itemId}                      - Remove item
//!
//! # Orders (/api/v1/order, auth)
//! POST /                                - Checkout
//! GET  /                                - Own orders
//! GET  /all                             - Every order (admin)
//! GET  /{id}                            - One order (owner or admin)
//!
//! # Reports (/api/v1/report, admin)
//! GET  /totalRevenue, /totalOrders, /dailyReport, /monthlySales,
//!      /topSellingProducts, /topSearchedProducts, /yoy/{year},
//!      /mom/{year}/{month}, /profitability,
//!      /export/csv, /export/excel, /export/pdf
//! ```

pub mod auth;
pub mod cart;
pub mod multipart;
pub mod orders;
pub mod products;
pub mod reports;
pub mod response;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri},
    routing::{get, patch, post, put},
};

use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
///
/// Credential endpoints get the strict limiter on top of the API one.
pub fn auth_routes() -> Router<AppState> {
    let credentials = Router::new()
        .route("/registerUser", post(auth::register))
        .route("/loginUser", post(auth::login))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/verifyOTP", post(auth::verify_otp))
        .route("/resetPassword", post(auth::reset_password))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/", get(auth::list_users))
        .route("/me", get(auth::me))
        .route("/logoutUser", post(auth::logout))
        .route("/refresh", post(auth::refresh))
        .route("/google", get(auth::google_start))
        .route("/{id}", put(auth::change_password).delete(auth::delete_user))
        .merge(credentials)
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/category", get(products::categories))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add))
        .route("/{item_id}", patch(cart::update).delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::checkout))
        .route("/all", get(orders::all))
        .route("/{id}", get(orders::show))
}

/// Create the report routes router.
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/totalRevenue", get(reports::total_revenue))
        .route("/totalOrders", get(reports::total_orders))
        .route("/dailyReport", get(reports::daily))
        .route("/monthlySales", get(reports::monthly))
        .route("/topSellingProducts", get(reports::top_selling))
        .route("/topSearchedProducts", get(reports::top_searched))
        .route("/yoy/{year}", get(reports::year_over_year))
        .route("/mom/{year}/{month}", get(reports::month_over_month))
        .route("/profitability", get(reports::profitability))
        .route("/export/csv", get(reports::export_csv))
        .route("/export/excel", get(reports::export_excel))
        .route("/export/pdf", get(reports::export_pdf))
}

/// Everything under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/product", product_routes())
        .nest("/cart", cart_routes())
        .nest("/order", order_routes())
        .nest("/report", report_routes())
        .layer(api_rate_limiter())
}

/// Create all routes for the API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/auth/google/callback", get(auth::google_callback))
        .nest("/api/v1", api_routes())
        .fallback(not_found)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Not Found - {}", uri.path()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use bazaar_core::UserRole;
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use crate::cache::Cache;
    use crate::config::tests::test_config;
    use crate::models::User;

    /// The router over a pool that never connects; every request here must
    /// be answered before a query runs.
    fn app() -> (Router, AppState) {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/bazaar_test")
            .unwrap();
        let state = AppState::new(config, pool, Cache::memory()).unwrap();
        (crate::build_app(state.clone()), state)
    }

    fn bearer(state: &AppState, role: UserRole) -> String {
        let pair = state.tokens().issue(&User::sample(role)).unwrap();
        format!("Bearer {}", pair.access_token)
    }

    fn request(uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "198.51.100.20")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let response = app
            .oneshot(request("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_routes_name_the_path() {
        let (app, _) = app();
        let (status, body) = send(app, request("/nope").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Not Found - /nope");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn cart_requires_a_token() {
        let (app, _) = app();
        let (status, body) = send(app, request("/api/v1/cart").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["statusCode"], 401);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let (app, _) = app();
        let request = request("/api/v1/order")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reports_are_admin_only() {
        let (app, state) = app();
        let request = request("/api/v1/report/totalRevenue")
            .header(header::AUTHORIZATION, bearer(&state, UserRole::User))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn access_cookie_authenticates() {
        let (app, state) = app();
        let pair = state.tokens().issue(&User::sample(UserRole::Admin)).unwrap();
        let request = request("/api/v1/report/mom/2025/13")
            .header(header::COOKIE, format!("accessToken={}", pair.access_token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        // Authenticated as admin, then rejected on the month.
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "invalid month: 2025-13");
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        let (app, _) = app();
        let (status, body) =
            send(app, request("/api/v1/product/not-a-uuid").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn non_numeric_price_bound_is_rejected() {
        let (app, _) = app();
        let (status, _) = send(
            app,
            request("/api/v1/product?minPrice=cheap").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_cart_body_is_rejected() {
        let (app, state) = app();
        let request = request("/api/v1/cart")
            .method("POST")
            .header(header::AUTHORIZATION, bearer(&state, UserRole::User))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"productId": 5}"#))
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
    }

    #[tokio::test]
    async fn refresh_without_a_token_is_unauthorized() {
        let (app, _) = app();
        let request = request("/api/v1/auth/refresh")
            .method("POST")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn credential_endpoints_are_rate_limited() {
        let (app, _) = app();
        let login = || {
            request("/api/v1/auth/loginUser")
                .method("POST")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("not json"))
                .unwrap()
        };

        for _ in 0..5 {
            let (status, _) = send(app.clone(), login()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let (status, body) = send(app, login()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["statusCode"], 429);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn google_start_is_404_when_disabled() {
        let (app, _) = app();
        let (status, _) = send(app, request("/api/v1/auth/google").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
