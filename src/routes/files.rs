use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{
        DefaultBodyLimit, Multipart,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    routing::post,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::logging::{SanitizedFilename, SecurityEvent};
use crate::security::upload::{self, MAX_UPLOAD_BYTES, UploadError};

/// Transport ceiling for upload bodies; sits above the guard's own limit so
/// the guard reports oversize files itself.
pub const UPLOAD_BODY_LIMIT: usize = 6 * 1024 * 1024;

const FILE_FIELD: &str = "file";

/// Directory uploads are admitted into.
#[derive(Debug, Clone)]
pub struct UploadRoot(pub Arc<PathBuf>);

impl UploadRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::new(path.into()))
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    filename: String,
    saved_as: String,
    size: usize,
    content_type: &'static str,
    message: &'static str,
}

pub fn router() -> Router {
    Router::new().route(
        "/files/upload",
        post(upload_file).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
    )
}

#[tracing::instrument(name = "upload_file", skip_all, fields(filename))]
pub async fn upload_file(
    Extension(root): Extension<UploadRoot>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart =
        multipart.map_err(|err| AppError::invalid_field(FILE_FIELD, err.body_text()))?;

    let (filename, data) = loop {
        let Some(field) = multipart.next_field().await.map_err(multipart_error)? else {
            return Err(AppError::invalid_field(FILE_FIELD, "field required"));
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        break (filename, data);
    };

    tracing::Span::current().record(
        "filename",
        tracing::field::display(SanitizedFilename::new(&filename)),
    );

    let root = Arc::clone(&root.0);
    let suggested = filename.clone();
    let admitted = tokio::task::spawn_blocking(move || upload::admit(&root, &data, &suggested))
        .await
        .map_err(|err| AppError::Internal(format!("upload task failed: {err}")))?;

    let admitted = match admitted {
        Ok(admitted) => admitted,
        Err(err) => {
            crate::log_security_event!(
                SecurityEvent::UploadRejected,
                filename = %SanitizedFilename::new(&filename),
                reason = %err,
                "Upload rejected"
            );
            return Err(err.into());
        }
    };

    tracing::debug!(path = %admitted.resolved_path.display(), "Upload written");

    Ok(Json(UploadResponse {
        filename,
        saved_as: admitted.generated_filename,
        size: admitted.size,
        content_type: admitted.content_type.mime(),
        message: "File uploaded securely",
    }))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Upload(UploadError::FileTooLarge {
            size: MAX_UPLOAD_BYTES + 1,
        })
    } else {
        AppError::invalid_field(FILE_FIELD, err.body_text())
    }
}
