//! Cloudinary image storage.
//!
//! Uses the signed upload/destroy REST endpoints. A request signature is the
//! SHA-1 hex digest of the alphabetically sorted `key=value` parameters joined
//! with `&`, followed by the API secret.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::config::CloudinaryConfig;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary folder for user avatars.
pub const AVATAR_FOLDER: &str = "bazaar_avatar";
/// Cloudinary folder for product images.
pub const PRODUCT_FOLDER: &str = "bazaar_product";

/// Errors from the media store.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudinary error: {0}")]
    Api(String),

    #[error("not an image upload: {0}")]
    NotAnImage(String),
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Reject anything that does not declare an `image/*` content type.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::NotAnImage` for other content types.
    pub fn ensure_image(&self) -> Result<(), MediaError> {
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => Ok(()),
            _ => Err(MediaError::NotAnImage(self.file_name.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Cloudinary client.
#[derive(Clone)]
pub struct MediaService {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
}

impl MediaService {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(config: &CloudinaryConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    /// Upload an image into `folder`, returning its HTTPS URL.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if the file is not an image or Cloudinary rejects it.
    pub async fn upload(&self, upload: Upload, folder: &str) -> Result<String, MediaError> {
        upload.ensure_image()?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[("folder", folder), ("timestamp", timestamp.as_str())],
            self.api_secret.expose_secret(),
        );

        let mut part = reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        if let Some(ct) = upload.content_type.as_deref() {
            part = part.mime_str(ct)?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_owned())
            .text("signature", signature);

        let response = self
            .http
            .post(format!("{API_BASE}/{}/image/upload", self.cloud_name))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: UploadResponse = response.json().await?;
        tracing::debug!(url = %body.secure_url, folder, "image uploaded");
        Ok(body.secure_url)
    }

    /// Delete the image behind a Cloudinary delivery URL.
    ///
    /// URLs that are not Cloudinary upload URLs are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if Cloudinary rejects the request.
    pub async fn destroy_url(&self, url: &str) -> Result<(), MediaError> {
        let Some(public_id) = public_id_from_url(url) else {
            tracing::warn!(url, "not a Cloudinary upload URL, skipping delete");
            return Ok(());
        };

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", public_id.as_str()), ("timestamp", timestamp.as_str())],
            self.api_secret.expose_secret(),
        );

        let response = self
            .http
            .post(format!("{API_BASE}/{}/image/destroy", self.cloud_name))
            .form(&[
                ("public_id", public_id.as_str()),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: DestroyResponse = response.json().await?;
        if body.result != "ok" && body.result != "not found" {
            return Err(MediaError::Api(body.result));
        }
        Ok(())
    }

    /// Delete several images, logging failures instead of returning them.
    pub async fn destroy_all(&self, urls: &[String]) {
        for url in urls {
            if let Err(e) = self.destroy_url(url).await {
                tracing::warn!(url = %url, error = %e, "failed to delete image");
            }
        }
    }
}

async fn api_error(response: reqwest::Response) -> MediaError {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => MediaError::Api(body.error.message),
        Err(_) => MediaError::Api(format!("unexpected status {status}")),
    }
}

/// Compute a Cloudinary request signature.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the public id from a delivery URL such as
/// `https://res.cloudinary.com/<cloud>/image/upload/v1712/bazaar_avatar/abc.jpg`
/// (yields `bazaar_avatar/abc`).
fn public_id_from_url(url: &str) -> Option<String> {
    let (_, after) = url.split_once("/upload/")?;
    let path = match after.split_once('/') {
        Some((version, rest))
            if version
                .strip_prefix('v')
                .is_some_and(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit())) =>
        {
            rest
        }
        _ => after,
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let without_ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => path,
    };
    (!without_ext.is_empty()).then(|| without_ext.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        // sha1("folder=bazaar_avatar&timestamp=1315060510abcd")
        let mut hasher = Sha1::new();
        hasher.update(b"folder=bazaar_avatar&timestamp=1315060510abcd");
        let expected = hex::encode(hasher.finalize());

        let got = sign(
            &[("timestamp", "1315060510"), ("folder", "bazaar_avatar")],
            "abcd",
        );
        assert_eq!(got, expected);
        assert_eq!(got.len(), 40);
    }

    #[test]
    fn public_id_strips_version_and_extension() {
        assert_eq!(
            public_id_from_url(
                "https://res.cloudinary.com/demo/image/upload/v1712345678/bazaar_avatar/abc123.jpg"
            ),
            Some("bazaar_avatar/abc123".to_owned())
        );
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/image/upload/bazaar_product/x.png"),
            Some("bazaar_product/x".to_owned())
        );
    }

    #[test]
    fn public_id_rejects_foreign_urls() {
        assert_eq!(public_id_from_url("https://lh3.googleusercontent.com/a/pic"), None);
    }

    #[test]
    fn ensure_image_checks_content_type() {
        let mut upload = Upload {
            file_name: "a.png".to_owned(),
            content_type: Some("image/png".to_owned()),
            bytes: vec![1, 2, 3],
        };
        assert!(upload.ensure_image().is_ok());
        upload.content_type = Some("application/pdf".to_owned());
        assert!(upload.ensure_image().is_err());
        upload.content_type = None;
        assert!(upload.ensure_image().is_err());
    }
}
