use axum::{
    Json, Router,
    body::Bytes,
    extract::rejection::BytesRejection,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};

use crate::codec;
use crate::errors::AppError;
use crate::models::payment::PaymentRecord;
use crate::security::json::{MAX_BODY_SIZE_BYTES, SafeJson};

pub fn router() -> Router {
    Router::new()
        .route("/decimal-test", get(decimal_test))
        .route("/parse-json", post(parse_json))
        .route("/validate-payment", post(validate_payment))
}

#[derive(Serialize)]
struct DecimalSample {
    small_decimal: Decimal,
    large_decimal: Decimal,
    float_number: f64,
    regular_string: &'static str,
}

/// Decimals leave as exact strings; the float shows the rounding it carries.
pub async fn decimal_test() -> Result<Json<Value>, AppError> {
    let sample = DecimalSample {
        small_decimal: Decimal::new(1, 1),
        large_decimal: Decimal::from_i128_with_scale(12_345_678_901_234_567_890, 10),
        float_number: 0.1 + 0.2,
        regular_string: "test",
    };
    Ok(Json(codec::safe_response(&sample)?))
}

/// Parses raw JSON text, returning every number as its original digits.
pub async fn parse_json(body: Result<Bytes, BytesRejection>) -> Result<Json<Value>, AppError> {
    let body = body.map_err(|_| {
        AppError::invalid_field(
            "body",
            format!("could not be read or exceeds {MAX_BODY_SIZE_BYTES} bytes"),
        )
    })?;
    let text = std::str::from_utf8(&body)
        .map_err(|_| AppError::invalid_field("body", "must be UTF-8 text"))?;
    let parsed = codec::decode(text)?;
    Ok(Json(json!({
        "original": text,
        "parsed": parsed,
        "float_values_converted_to_string": true,
    })))
}

pub async fn validate_payment(SafeJson(payload): SafeJson) -> Result<Json<PaymentRecord>, AppError> {
    Ok(Json(PaymentRecord::from_input(&payload)?))
}
