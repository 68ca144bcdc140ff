//! Authentication extractors.
//!
//! Requests authenticate with `Authorization: Bearer <token>` or the
//! `accessToken` cookie; the token is verified against the access secret on
//! every request, nothing is looked up in the database.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tower_sessions::cookie::Cookie;

use crate::error::{AppError, set_sentry_user};
use crate::models::CurrentUser;
use crate::state::AppState;

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Extractor that requires a valid access token.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_value(&parts.headers, ACCESS_TOKEN_COOKIE))
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_owned()))?;

        let claims = state
            .tokens()
            .verify_access(&token)
            .map_err(|_| AppError::Unauthorized("Invalid access token".to_owned()))?;

        let user = CurrentUser::from(claims);
        set_sentry_user(&user.id, Some(user.email.as_str()));
        Ok(Self(user))
    }
}

/// Extractor that requires a valid access token with the admin role.
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "non-admin denied");
            return Err(AppError::Forbidden(
                "You are not authorized to access this resource".to_owned(),
            ));
        }
        Ok(Self(user))
    }
}

/// Token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Value of the named cookie, if the request carries it.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_header_is_read() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(bearer_token(&map), None);

        let map = headers(&[(header::AUTHORIZATION, "Bearer ")]);
        assert_eq!(bearer_token(&map), None);
    }

    #[test]
    fn cookie_is_found_among_others() {
        let map = headers(&[
            (header::COOKIE, "bazaar_session=s1; accessToken=tok123"),
            (header::COOKIE, "theme=dark"),
        ]);
        assert_eq!(
            cookie_value(&map, ACCESS_TOKEN_COOKIE).as_deref(),
            Some("tok123")
        );
        assert_eq!(cookie_value(&map, "theme").as_deref(), Some("dark"));
        assert_eq!(cookie_value(&map, REFRESH_TOKEN_COOKIE), None);
    }

    #[test]
    fn empty_cookie_counts_as_missing() {
        let map = headers(&[(header::COOKIE, "accessToken=")]);
        assert_eq!(cookie_value(&map, ACCESS_TOKEN_COOKIE), None);
    }
}
