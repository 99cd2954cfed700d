use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Upper bound on the textual length of a numeric literal accepted as a decimal.
pub const MAX_NUMERIC_LITERAL_LEN: usize = 64;

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("value cannot be serialized: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("numeric literal is {len} characters long (max {max})")]
    LiteralTooLong { len: usize, max: usize },
    #[error("not a valid decimal number")]
    InvalidDecimal,
    #[error("not a valid ISO 8601 timestamp")]
    InvalidTimestamp,
}

/// Parses JSON text, handing every numeric literal back as a string holding
/// its original digits.
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let document = serde_json::from_str::<Value>(text).map_err(CodecError::Malformed)?;
    Ok(numbers_to_text(document))
}

/// Parses a JSON document without converting numbers. Numbers keep their
/// exact source text (`arbitrary_precision`), so `Number::to_string` returns
/// the literal as written.
pub fn parse_document(bytes: &[u8]) -> Result<Value, CodecError> {
    serde_json::from_slice::<Value>(bytes).map_err(CodecError::Malformed)
}

/// Serializes a value to JSON text. `Decimal` fields are written as strings.
pub fn encode<T>(value: &T) -> Result<String, CodecError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value).map_err(CodecError::Serialization)
}

/// Encodes and re-parses a value so a handler can return arbitrary data
/// through the same rules as [`encode`].
pub fn safe_response<T>(value: &T) -> Result<Value, CodecError>
where
    T: Serialize + ?Sized,
{
    let text = encode(value)?;
    parse_document(text.as_bytes())
}

pub fn decimal_from_text(text: &str) -> Result<Decimal, CodecError> {
    let text = text.trim();
    if text.len() > MAX_NUMERIC_LITERAL_LEN {
        return Err(CodecError::LiteralTooLong {
            len: text.len(),
            max: MAX_NUMERIC_LITERAL_LEN,
        });
    }

    // rust_decimal tolerates `_` separators; JSON literals never contain them.
    let well_formed = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !well_formed {
        return Err(CodecError::InvalidDecimal);
    }

    match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => scientific_exact(mantissa, exponent),
        None => Decimal::from_str_exact(text).map_err(|_| CodecError::InvalidDecimal),
    }
}

/// Applies a decimal exponent without rounding. Fails when the result would
/// need more than 28 fractional digits or overflow the 96-bit mantissa.
fn scientific_exact(mantissa: &str, exponent: &str) -> Result<Decimal, CodecError> {
    let mut value = Decimal::from_str_exact(mantissa).map_err(|_| CodecError::InvalidDecimal)?;
    let exponent: i64 = exponent.parse().map_err(|_| CodecError::InvalidDecimal)?;

    let mut scale = i64::from(value.scale()) - exponent;
    if scale > i64::from(Decimal::MAX_SCALE) {
        value = value.normalize();
        scale = i64::from(value.scale()) - exponent;
    }

    if scale >= 0 {
        let scale = u32::try_from(scale).map_err(|_| CodecError::InvalidDecimal)?;
        value
            .set_scale(scale)
            .map_err(|_| CodecError::InvalidDecimal)?;
        return Ok(value);
    }

    let shift = scale.unsigned_abs();
    if shift > u64::from(Decimal::MAX_SCALE) {
        return Err(CodecError::InvalidDecimal);
    }
    value
        .set_scale(0)
        .map_err(|_| CodecError::InvalidDecimal)?;
    (0..shift).try_fold(value, |acc, _| {
        acc.checked_mul(Decimal::TEN).ok_or(CodecError::InvalidDecimal)
    })
}

/// Normalizes a timestamp to the UTC-naive convention: offsets are converted
/// to UTC and dropped, timestamps without an offset are taken as UTC.
pub fn normalize_timestamp(text: &str) -> Result<NaiveDateTime, CodecError> {
    let text = text.trim();

    let aware = DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, OFFSET_TIMESTAMP_FORMAT));
    if let Ok(aware) = aware {
        return Ok(aware.with_timezone(&Utc).naive_utc());
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .ok_or(CodecError::InvalidTimestamp)
}

fn numbers_to_text(value: Value) -> Value {
    match value {
        Value::Number(number) => Value::String(number.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(numbers_to_text).collect()),
        Value::Object(members) => Value::Object(
            members
                .into_iter()
                .map(|(key, member)| (key, numbers_to_text(member)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decimal_round_trip_keeps_digits() {
        for literal in ["0.1", "100.50", "1234567890.1234567890", "-0.000001", "42"] {
            let decimal = decimal_from_text(literal).unwrap();
            let decoded = decode(&encode(&decimal).unwrap()).unwrap();
            assert_eq!(decoded, Value::String(literal.to_string()));
        }
    }

    #[test]
    fn test_long_integer_round_trip() {
        let decoded = decode(&encode(&u64::MAX).unwrap()).unwrap();
        assert_eq!(decoded, json!("18446744073709551615"));
    }

    #[test]
    fn test_numbers_are_exposed_as_text() {
        let long_number = format!("{}.0", "9".repeat(100));
        let decoded = decode(&format!(r#"{{"amount": {long_number}, "nested": [0.1, 2]}}"#)).unwrap();

        assert_eq!(decoded["amount"], Value::String(long_number));
        assert_eq!(decoded["nested"], json!(["0.1", "2"]));
    }

    #[test]
    fn test_string_amount_is_left_alone() {
        let long_number = format!("{}.0", "9".repeat(100));
        let decoded = decode(&format!(r#"{{"amount": "{long_number}"}}"#)).unwrap();
        assert_eq!(decoded["amount"].as_str(), Some(long_number.as_str()));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            decode(r#"{"amount": 100.50"#),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_document_keeps_exact_number_text() {
        let document = parse_document(br#"{"priority": 0.30000000000000000001}"#).unwrap();
        let number = document["priority"].as_number().unwrap();
        assert_eq!(number.to_string(), "0.30000000000000000001");
    }

    #[test]
    fn test_encode_rejects_unrepresentable_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8, 2], 3);
        assert!(matches!(encode(&map), Err(CodecError::Serialization(_))));
    }

    #[test]
    fn test_safe_response_writes_decimals_as_strings() {
        let value = safe_response(&json!({ "price": decimal_from_text("19.99").unwrap() })).unwrap();
        assert_eq!(value["price"], json!("19.99"));
    }

    #[test]
    fn test_decimal_from_text_rejections() {
        assert!(matches!(
            decimal_from_text(&"9".repeat(MAX_NUMERIC_LITERAL_LEN + 1)),
            Err(CodecError::LiteralTooLong { .. })
        ));
        assert!(matches!(decimal_from_text("1_000"), Err(CodecError::InvalidDecimal)));
        assert!(matches!(decimal_from_text("NaN"), Err(CodecError::InvalidDecimal)));
        assert!(matches!(decimal_from_text(""), Err(CodecError::InvalidDecimal)));
        assert!(matches!(
            decimal_from_text("0.12345678901234567890123456789"),
            Err(CodecError::InvalidDecimal)
        ));
    }

    #[test]
    fn test_decimal_from_text_scientific() {
        assert_eq!(decimal_from_text("1.5e2").unwrap().to_string(), "150");
        assert_eq!(decimal_from_text("25E-3").unwrap().to_string(), "0.025");
        assert_eq!(decimal_from_text("-1.20e+1").unwrap().to_string(), "-12.0");
        assert_eq!(decimal_from_text("1.0e-28").unwrap(), Decimal::new(1, 28));
    }

    #[test]
    fn test_scientific_rejects_instead_of_rounding() {
        for literal in [
            "1.00000000000000000000000000001e0",
            "1e-29",
            "1e29",
            "79228162514264337593543950335e1",
            "1e",
            "e5",
            "1e2.5",
        ] {
            assert!(
                matches!(decimal_from_text(literal), Err(CodecError::InvalidDecimal)),
                "literal {literal}"
            );
        }
    }

    #[test]
    fn test_timestamps_normalize_to_utc_naive() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        for input in [
            "2024-01-15T12:00:00Z",
            "2024-01-15T15:00:00+03:00",
            "2024-01-15T07:00:00-0500",
            "2024-01-15T12:00:00",
            "2024-01-15 12:00:00",
        ] {
            assert_eq!(normalize_timestamp(input).unwrap(), expected, "input {input}");
        }
    }

    #[test]
    fn test_timestamp_keeps_fractional_seconds() {
        let parsed = normalize_timestamp("2024-01-15T12:00:00.250Z").unwrap();
        assert_eq!(parsed.and_utc().timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_invalid_timestamps_are_rejected() {
        assert!(normalize_timestamp("2024-01-15").is_err());
        assert!(normalize_timestamp("yesterday").is_err());
    }
}
