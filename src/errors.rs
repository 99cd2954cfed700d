use std::any::Any;
use std::error::Error as StdError;
use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::codec::CodecError;
use crate::logging::{Redacted, SecurityEvent};
use crate::problem::{ErrorCategory, ProblemDetail};
use crate::security::upload::{MAX_UPLOAD_BYTES, UploadError};
use crate::store::StoreError;
use crate::validation::ValidationErrors;

pub const GENERIC_INTERNAL_DETAIL: &str = "An unexpected error occurred";

/// Centralized application error type. Every failure a handler can produce
/// ends up here, and `into_response` is the only place a wire-format error
/// body is built.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("storage backend failure: {0}")]
    Storage(String),

    #[error("rate limit exceeded; please try again later")]
    RateLimited { retry_after: Duration },

    /// The path exists but not for this method. Not a registry category, so
    /// the envelope keeps `about:blank`.
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("unexpected failure: {0}")]
    Internal(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(ValidationErrors::single(field, message))
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        let category = match self {
            AppError::Validation(_) => ErrorCategory::Validation,
            AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::Upload(err) => match err {
                UploadError::FileTooLarge { .. } => ErrorCategory::FileTooLarge,
                UploadError::UnsupportedFileType => ErrorCategory::UnsupportedFileType,
                UploadError::PathTraversal | UploadError::SymlinkNotAllowed => {
                    ErrorCategory::InvalidPath
                }
                UploadError::Storage(_) => ErrorCategory::Internal,
            },
            AppError::Storage(_) => ErrorCategory::ExternalService,
            AppError::RateLimited { .. } => ErrorCategory::RateLimit,
            AppError::MethodNotAllowed => return None,
            AppError::Internal(_) | AppError::Panicked(_) => ErrorCategory::Internal,
        };
        Some(category)
    }

    /// The `detail` member shown to the client. Server-side failures never
    /// carry their internal message.
    fn client_detail(&self) -> String {
        match self {
            AppError::Upload(UploadError::FileTooLarge { .. }) => {
                "File exceeds maximum allowed size (5MB)".to_string()
            }
            AppError::Upload(UploadError::UnsupportedFileType) => {
                "Only PNG and JPEG images are supported".to_string()
            }
            AppError::Upload(UploadError::PathTraversal | UploadError::SymlinkNotAllowed) => {
                "Invalid file path".to_string()
            }
            AppError::Upload(UploadError::Storage(_)) => {
                "Failed to process file upload".to_string()
            }
            AppError::Storage(_) => "The storage backend is unavailable".to_string(),
            AppError::MethodNotAllowed => {
                "The requested method is not supported for this resource".to_string()
            }
            AppError::Internal(_) | AppError::Panicked(_) => GENERIC_INTERNAL_DETAIL.to_string(),
            other => other.to_string(),
        }
    }

    fn to_problem(&self) -> ProblemDetail {
        let problem = match self.category() {
            Some(category) => ProblemDetail::from_category(category, self.client_detail()),
            None => ProblemDetail::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method Not Allowed",
                self.client_detail(),
            ),
        };

        match self {
            AppError::Validation(errors) => {
                let violations =
                    serde_json::to_value(errors.violations()).unwrap_or(Value::Array(Vec::new()));
                problem.with_extension("errors", violations)
            }
            AppError::Upload(UploadError::FileTooLarge { .. }) => {
                problem.with_extension("max_bytes", MAX_UPLOAD_BYTES)
            }
            AppError::RateLimited { retry_after } => {
                problem.with_extension("retry_after", retry_after.as_secs())
            }
            _ => problem,
        }
    }

    /// Logs the error once, with its correlation id. Only redacted text
    /// reaches the log sink.
    fn log_error(&self, problem: &ProblemDetail) {
        let status = problem.status();
        let correlation_id = problem.correlation_id();
        let problem_type = problem.problem_type();
        let message = self.to_string();
        let message = Redacted(&message);

        match self {
            AppError::Upload(UploadError::PathTraversal) => {
                crate::log_security_event!(
                    SecurityEvent::PathTraversalAttempt,
                    %correlation_id,
                    status_code = %status,
                    "Upload path escaped the upload root"
                );
            }
            AppError::Upload(UploadError::SymlinkNotAllowed) => {
                crate::log_security_event!(
                    SecurityEvent::SymlinkRejected,
                    %correlation_id,
                    status_code = %status,
                    "Upload root traverses a symbolic link"
                );
            }
            AppError::Validation(errors) if errors.has_forbidden_content() => {
                crate::log_security_event!(
                    SecurityEvent::DangerousContent,
                    %correlation_id,
                    status_code = %status,
                    error = %message,
                    "Request carried a forbidden pattern"
                );
            }
            AppError::Validation(_) => {
                crate::log_security_event!(
                    SecurityEvent::ValidationRejected,
                    %correlation_id,
                    status_code = %status,
                    error = %message,
                    "Request failed validation"
                );
            }
            AppError::Panicked(_) => {
                crate::log_security_event!(
                    SecurityEvent::UnexpectedFailure,
                    %correlation_id,
                    status_code = %status,
                    error = %message,
                    "Request handler panicked"
                );
            }
            _ if status.is_server_error() => {
                tracing::error!(
                    %correlation_id,
                    status_code = %status,
                    problem_type,
                    error = %message,
                    source = ?self.source().map(|source| Redacted(&source.to_string()).to_string()),
                    "Server error"
                );
            }
            _ => {
                tracing::warn!(
                    %correlation_id,
                    status_code = %status,
                    problem_type,
                    detail = %Redacted(problem.detail()),
                    "Client error"
                );
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let problem = self.to_problem();
        self.log_error(&problem);

        let mut response = problem.into_response();
        if let AppError::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }

        response
    }
}

impl From<CodecError> for AppError {
    fn from(error: CodecError) -> Self {
        AppError::invalid_field("body", error.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(entity) => AppError::not_found(entity),
            StoreError::Backend(message) => AppError::Storage(message),
        }
    }
}

/// Outermost boundary for panics raised while handling a request; used with
/// `tower_http::catch_panic::CatchPanicLayer`.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "panic with non-string payload".to_string()
    };

    AppError::Panicked(message).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::header::CONTENT_TYPE;

    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::logging::REDACTED_EMAIL;
    use crate::problem::PROBLEM_JSON;
    use crate::validation::FieldViolation;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_upload_error_categories() {
        let cases = [
            (UploadError::FileTooLarge { size: 6_000_000 }, StatusCode::PAYLOAD_TOO_LARGE),
            (UploadError::UnsupportedFileType, StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (UploadError::PathTraversal, StatusCode::BAD_REQUEST),
            (UploadError::SymlinkNotAllowed, StatusCode::BAD_REQUEST),
        ];

        for (error, status) in cases {
            assert_eq!(AppError::from(error).category().unwrap().status(), status);
        }
    }

    #[test]
    fn test_store_errors_map_to_not_found_and_external_service() {
        assert_eq!(
            AppError::from(StoreError::NotFound("Note")).category(),
            Some(ErrorCategory::NotFound)
        );
        assert_eq!(
            AppError::from(StoreError::Backend("lock poisoned".into())).category(),
            Some(ErrorCategory::ExternalService)
        );
    }

    #[tokio::test]
    async fn test_validation_detail_joins_field_messages() {
        let errors: ValidationErrors = [
            FieldViolation::new("title", "must be at most 200 characters"),
            FieldViolation::new("extra_field", "extra fields not permitted"),
        ]
        .into_iter()
        .collect();

        let response = AppError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[CONTENT_TYPE], PROBLEM_JSON);

        let body = body_of(response).await;
        assert_eq!(body["type"], "/errors/validation");
        assert_eq!(
            body["detail"],
            "title: must be at most 200 characters; extra_field: extra fields not permitted"
        );
        assert_eq!(body["errors"][0]["field"], "title");
    }

    #[tokio::test]
    async fn test_internal_errors_hide_their_message() {
        let response =
            AppError::Internal("password for admin@example.com rejected".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body["detail"], GENERIC_INTERNAL_DETAIL);
        assert_eq!(body["type"], "/errors/internal");
    }

    #[tokio::test]
    async fn test_storage_failure_hides_backend_message() {
        let body = body_of(AppError::Storage("connection refused to 10.0.0.5".into()).into_response()).await;
        assert_eq!(body["status"], 502);
        assert!(!body["detail"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_secs(30),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "30");
        assert_eq!(body_of(response).await["retry_after"], 30);
    }

    #[tokio::test]
    async fn test_method_not_allowed_is_about_blank() {
        let response = AppError::MethodNotAllowed.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[CONTENT_TYPE], PROBLEM_JSON);

        let body = body_of(response).await;
        assert_eq!(body["type"], "about:blank");
        assert_eq!(body["title"], "Method Not Allowed");
        assert_eq!(body["status"], 405);
    }

    #[tokio::test]
    async fn test_panic_payload_becomes_generic_internal_error() {
        let response = handle_panic(Box::new("index out of bounds".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], PROBLEM_JSON);

        let body = body_of(response).await;
        assert_eq!(body["detail"], GENERIC_INTERNAL_DETAIL);
        assert_eq!(body["correlation_id"].as_str().unwrap().len(), 36);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_validation_error() {
        let codec_error = crate::codec::decode("{").unwrap_err();
        let body = body_of(AppError::from(codec_error).into_response()).await;
        assert_eq!(body["status"], 422);
        assert!(body["detail"].as_str().unwrap().starts_with("body: invalid JSON"));
    }

    #[test]
    fn test_logged_messages_are_redacted() {
        let output = capture_logs(|| {
            let _ = AppError::Internal("password for admin@example.com rejected".into())
                .into_response();
        });

        assert!(output.contains("Server error"));
        assert!(output.contains(REDACTED_EMAIL));
        assert!(!output.contains("admin@example.com"));
    }

    #[test]
    fn test_client_error_log_redacts_detail() {
        let output = capture_logs(|| {
            let _ = AppError::not_found("jane@example.org").into_response();
        });

        assert!(output.contains("Client error"));
        assert!(!output.contains("jane@example.org"));
    }

    #[test]
    fn test_panic_is_logged_once_with_correlation_id() {
        let output = capture_logs(|| {
            let _ = handle_panic(Box::new("card 4111 1111 1111 1111 declined"));
        });

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1, "{output}");
        assert!(lines[0].contains("unexpected_failure"));
        assert!(lines[0].contains("correlation_id"));
        assert!(!lines[0].contains("4111 1111"));
    }
}
