use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub const PROBLEM_JSON: &str = "application/problem+json";

const RESERVED_MEMBERS: [&str; 5] = ["type", "title", "status", "detail", "correlation_id"];

/// Closed registry of error categories and their `(type, title, status)` triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    RateLimit,
    Internal,
    ExternalService,
    FileTooLarge,
    UnsupportedFileType,
    InvalidPath,
}

impl ErrorCategory {
    pub fn type_uri(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "/errors/validation",
            ErrorCategory::Authentication => "/errors/authentication",
            ErrorCategory::Authorization => "/errors/authorization",
            ErrorCategory::NotFound => "/errors/not-found",
            ErrorCategory::RateLimit => "/errors/rate-limit",
            ErrorCategory::Internal => "/errors/internal",
            ErrorCategory::ExternalService => "/errors/external-service",
            ErrorCategory::FileTooLarge => "/errors/file-too-large",
            ErrorCategory::UnsupportedFileType => "/errors/unsupported-file-type",
            ErrorCategory::InvalidPath => "/errors/invalid-path",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "Validation Error",
            ErrorCategory::Authentication => "Authentication Error",
            ErrorCategory::Authorization => "Authorization Error",
            ErrorCategory::NotFound => "Not Found",
            ErrorCategory::RateLimit => "Rate Limit Exceeded",
            ErrorCategory::Internal => "Internal Server Error",
            ErrorCategory::ExternalService => "External Service Error",
            ErrorCategory::FileTooLarge => "File Too Large",
            ErrorCategory::UnsupportedFileType => "Unsupported Media Type",
            ErrorCategory::InvalidPath => "Bad Request",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
            ErrorCategory::Authorization => StatusCode::FORBIDDEN,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::ExternalService => StatusCode::BAD_GATEWAY,
            ErrorCategory::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCategory::UnsupportedFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCategory::InvalidPath => StatusCode::BAD_REQUEST,
        }
    }
}

/// RFC 7807 problem details body. Built once per failed request.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemDetail {
    #[serde(rename = "type")]
    problem_type: String,
    title: String,
    status: u16,
    detail: String,
    correlation_id: Uuid,
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

impl ProblemDetail {
    /// A problem outside the registry, typed `about:blank`.
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: "about:blank".to_string(),
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
            correlation_id: Uuid::new_v4(),
            extensions: Map::new(),
        }
    }

    pub fn from_category(category: ErrorCategory, detail: impl Into<String>) -> Self {
        Self {
            problem_type: category.type_uri().to_string(),
            ..Self::new(category.status(), category.title(), detail)
        }
    }

    /// Adds an extension member. Mandatory members cannot be overwritten.
    pub fn with_extension(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !RESERVED_MEMBERS.contains(&key) {
            self.extensions.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn problem_type(&self) -> &str {
        &self.problem_type
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl IntoResponse for ProblemDetail {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self)).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        response
    }
}
