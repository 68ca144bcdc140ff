//! Google OAuth 2.0 authorization-code client.

use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GoogleConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

/// Errors from the Google OAuth flow.
#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google rejected the request: {0}")]
    Rejected(String),

    #[error("Google account email is not verified")]
    UnverifiedEmail,
}

/// The profile fields Bazaar uses from Google's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    /// Stable Google account id.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Client for Google's consent screen, token and userinfo endpoints.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    #[must_use]
    pub const fn new(config: GoogleConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    /// The consent screen URL carrying `state`.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state)
            .append_pair("prompt", "select_account")
            .finish();
        format!("{AUTHORIZE_URL}?{query}")
    }

    /// Exchange an authorization code and fetch the signed-in profile.
    ///
    /// # Errors
    ///
    /// Returns `GoogleError` if either request fails or the email is unverified.
    pub async fn fetch_profile(&self, code: &str) -> Result<GoogleProfile, GoogleError> {
        let access_token = self.exchange_code(code).await?;
        let profile = self.userinfo(&access_token).await?;
        if !profile.email_verified {
            return Err(GoogleError::UnverifiedEmail);
        }
        Ok(profile)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, GoogleError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<OAuthErrorResponse>().await {
                Ok(body) => body.error_description.unwrap_or(body.error),
                Err(_) => format!("token endpoint returned {status}"),
            };
            return Err(GoogleError::Rejected(message));
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    async fn userinfo(&self, access_token: &str) -> Result<GoogleProfile, GoogleError> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GoogleError::Rejected(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use url::Url;

    fn client() -> GoogleClient {
        GoogleClient::new(
            GoogleConfig {
                client_id: "client-123.apps.googleusercontent.com".to_string(),
                client_secret: SecretString::from("google-secret"),
                redirect_uri: "http://localhost:8000/auth/google/callback".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn authorize_url_carries_state_and_redirect() {
        let url = Url::parse(&client().authorize_url("xyz")).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("xyz"));
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("http://localhost:8000/auth/google/callback")
        );
        assert_eq!(pairs.get("scope").map(String::as_str), Some(SCOPES));
    }

    #[test]
    fn profile_defaults_unverified() {
        let profile: GoogleProfile =
            serde_json::from_str(r#"{"sub":"1","email":"a@example.com"}"#).unwrap();
        assert!(!profile.email_verified);
        assert!(profile.name.is_none());
    }
}
