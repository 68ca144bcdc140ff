//! Multipart form helpers shared by registration and product creation.

use axum::extract::multipart::Field;

use crate::error::AppError;
use crate::services::media::Upload;

/// Read a file part.
///
/// # Errors
///
/// Returns `AppError::BadRequest` if the body cannot be read.
pub async fn read_upload(field: Field<'_>) -> Result<Upload, AppError> {
    let file_name = field.file_name().unwrap_or("upload").to_owned();
    let content_type = field.content_type().map(str::to_owned);
    let bytes = field.bytes().await?;
    Ok(Upload {
        file_name,
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Read a text part.
///
/// # Errors
///
/// Returns `AppError::BadRequest` if the body is not UTF-8.
pub async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    Ok(field.text().await?)
}
