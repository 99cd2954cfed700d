use axum::{
    body::to_bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{HeaderMap, HeaderValue, header::CONTENT_TYPE, request::Parts},
};
use serde_json::{Map, Value};

use crate::codec;
use crate::errors::AppError;

pub const MAX_BODY_SIZE_BYTES: usize = 64 * 1024; // 64 KiB upper bound for JSON bodies

/// A JSON object body, parsed with numbers kept as their source text. Field
/// validation happens afterwards against a model schema.
#[derive(Debug)]
pub struct SafeJson(pub Map<String, Value>);

impl<S> FromRequest<S> for SafeJson
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        validate_content_type(req.headers())?;

        let body_bytes = to_bytes(req.into_body(), MAX_BODY_SIZE_BYTES)
            .await
            .map_err(|_| {
                AppError::invalid_field(
                    "body",
                    format!("could not be read or exceeds {MAX_BODY_SIZE_BYTES} bytes"),
                )
            })?;

        match codec::parse_document(&body_bytes)? {
            Value::Object(members) => Ok(SafeJson(members)),
            _ => Err(AppError::invalid_field("body", "must be a JSON object")),
        }
    }
}

fn validate_content_type(headers: &HeaderMap) -> Result<(), AppError> {
    let value = headers.get(CONTENT_TYPE);

    if let Some(value) = value
        && let Ok(value) = value.to_str()
        && (value.starts_with("application/json") || value.ends_with("+json"))
    {
        return Ok(());
    }

    Err(invalid_content_type(value))
}

fn invalid_content_type(value: Option<&HeaderValue>) -> AppError {
    let received = value
        .and_then(|val| val.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "missing".to_string());
    AppError::invalid_field(
        "body",
        format!("expected application/json payload, received {received}"),
    )
}

/// Integer row id taken from the `{id}` path segment.
#[derive(Debug, Clone, Copy)]
pub struct IdParam(pub i64);

impl<S> FromRequestParts<S> for IdParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::invalid_field("id", "missing path parameter"))?;

        raw.parse::<i64>()
            .map(IdParam)
            .map_err(|_| AppError::invalid_field("id", "must be an integer"))
    }
}
