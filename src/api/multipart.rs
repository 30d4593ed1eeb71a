//! Multipart form helpers

use axum::extract::multipart::{Field, Multipart, MultipartError};

use crate::error::AppError;
use crate::storage::UploadedFile;

fn multipart_error(e: MultipartError) -> AppError {
    AppError::Validation(format!("Failed to parse multipart: {}", e))
}

/// Next field of a multipart body.
pub async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, AppError> {
    multipart.next_field().await.map_err(multipart_error)
}

/// Read a text field.
pub async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

/// Read a file field, refusing to buffer more than `max_bytes`.
pub async fn read_upload(mut field: Field<'_>, max_bytes: usize) -> Result<UploadedFile, AppError> {
    let file_name = field
        .file_name()
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::Validation("uploaded file has no file name".to_string()))?;

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::Validation(format!(
                "file too large: {} (max {} bytes)",
                file_name, max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(UploadedFile { file_name, bytes })
}
