//! Table-driven field validation.
//!
//! A [`Schema`] lists the accepted fields of a payload. [`Schema::validate`]
//! walks the table and either returns the typed values or every violation it
//! found, at most one per field.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::codec::{self, CodecError};

/// Substrings rejected in title and name fields, matched case-insensitively.
///
/// This is a substring heuristic, not an HTML sanitizer: it blocks the common
/// script-injection markers and nothing more.
pub const DANGEROUS_SUBSTRINGS: &[&str] = &["<script>", "javascript:", "onload=", "<", ">"];

const FORBIDDEN_PATTERN_MESSAGE: &str = "contains forbidden pattern";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every constraint violated by one payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, message)],
        }
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// True when a deny-list rule fired, as opposed to a plain format error.
    pub fn has_forbidden_content(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.message.starts_with(FORBIDDEN_PATTERN_MESSAGE))
    }
}

impl FromIterator<FieldViolation> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = FieldViolation>>(iter: I) -> Self {
        Self {
            violations: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Decimal(Decimal),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Decimal,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
enum Presence {
    Required,
    Optional,
    Default(fn() -> FieldValue),
}

#[derive(Debug, Clone, Copy)]
enum LowerBound {
    Inclusive(Decimal),
    Exclusive(Decimal),
}

#[derive(Debug, Clone, Default)]
struct DecimalRules {
    lower: Option<LowerBound>,
    upper: Option<Decimal>,
    max_scale: Option<u32>,
    max_digits: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    presence: Presence,
    length: Option<(usize, usize)>,
    pattern: Option<Regex>,
    decimal: DecimalRules,
    deny_list: Option<&'static [&'static str]>,
}

impl FieldSpec {
    fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Required,
            length: None,
            pattern: None,
            decimal: DecimalRules::default(),
            deny_list: None,
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn decimal(name: &'static str) -> Self {
        Self::new(name, FieldKind::Decimal)
    }

    pub fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    pub fn default_with(mut self, default: fn() -> FieldValue) -> Self {
        self.presence = Presence::Default(default);
        self
    }

    /// Inclusive bounds on the character count of a trimmed text value.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.length = Some((min, max));
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Regex::new(pattern).expect("field pattern must be a valid regex"));
        self
    }

    pub fn deny(mut self, substrings: &'static [&'static str]) -> Self {
        self.deny_list = Some(substrings);
        self
    }

    pub fn at_least(mut self, min: Decimal) -> Self {
        self.decimal.lower = Some(LowerBound::Inclusive(min));
        self
    }

    pub fn greater_than(mut self, min: Decimal) -> Self {
        self.decimal.lower = Some(LowerBound::Exclusive(min));
        self
    }

    pub fn at_most(mut self, max: Decimal) -> Self {
        self.decimal.upper = Some(max);
        self
    }

    pub fn max_decimal_places(mut self, places: u32) -> Self {
        self.decimal.max_scale = Some(places);
        self
    }

    pub fn max_digits(mut self, digits: u32) -> Self {
        self.decimal.max_digits = Some(digits);
        self
    }

    fn check(&self, raw: &Value) -> Result<FieldValue, String> {
        let value = match self.kind {
            FieldKind::Text => FieldValue::Text(self.check_text_syntax(raw)?),
            FieldKind::Decimal => FieldValue::Decimal(self.check_decimal_syntax(raw)?),
            FieldKind::Timestamp => {
                let text = raw
                    .as_str()
                    .ok_or_else(|| "must be an ISO 8601 timestamp string".to_string())?;
                FieldValue::Timestamp(
                    codec::normalize_timestamp(text)
                        .map_err(|_| "must be an ISO 8601 timestamp".to_string())?,
                )
            }
        };

        match &value {
            FieldValue::Decimal(decimal) => self.check_decimal_range(*decimal)?,
            FieldValue::Text(text) => self.check_text_content(text)?,
            FieldValue::Timestamp(_) => {}
        }

        Ok(value)
    }

    fn check_text_syntax(&self, raw: &Value) -> Result<String, String> {
        let text = raw
            .as_str()
            .ok_or_else(|| "must be a string".to_string())?
            .trim();

        if let Some((min, max)) = self.length {
            let count = text.chars().count();
            if count < min {
                return Err(format!("must be at least {min} characters"));
            }
            if count > max {
                return Err(format!("must be at most {max} characters"));
            }
        }

        if let Some(pattern) = &self.pattern
            && !pattern.is_match(text)
        {
            return Err("contains characters that are not allowed".to_string());
        }

        Ok(text.to_string())
    }

    fn check_text_content(&self, text: &str) -> Result<(), String> {
        let Some(deny_list) = self.deny_list else {
            return Ok(());
        };

        let lowered = text.to_lowercase();
        match deny_list.iter().find(|pattern| lowered.contains(*pattern)) {
            Some(pattern) => Err(format!("{FORBIDDEN_PATTERN_MESSAGE}: {pattern}")),
            None => Ok(()),
        }
    }

    fn check_decimal_syntax(&self, raw: &Value) -> Result<Decimal, String> {
        let literal = match raw {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            _ => return Err("must be a decimal number".to_string()),
        };

        let decimal = codec::decimal_from_text(&literal).map_err(|err| match err {
            CodecError::LiteralTooLong { max, .. } => {
                format!("must be a decimal number of at most {max} characters")
            }
            _ => "must be a decimal number".to_string(),
        })?;

        let (digits, places) = digits_and_places(decimal);
        if let Some(max_digits) = self.decimal.max_digits
            && digits > max_digits
        {
            return Err(format!("must have at most {max_digits} digits in total"));
        }
        if let Some(max_scale) = self.decimal.max_scale
            && places > max_scale
        {
            return Err(format!("must have at most {max_scale} decimal places"));
        }

        Ok(decimal)
    }

    fn check_decimal_range(&self, decimal: Decimal) -> Result<(), String> {
        match self.decimal.lower {
            Some(LowerBound::Inclusive(min)) if decimal < min => {
                return Err(format!("must be greater than or equal to {min}"));
            }
            Some(LowerBound::Exclusive(min)) if decimal <= min => {
                return Err(format!("must be greater than {min}"));
            }
            _ => {}
        }

        match self.decimal.upper {
            Some(max) if decimal > max => Err(format!("must be less than or equal to {max}")),
            _ => Ok(()),
        }
    }
}

/// Significant digits and decimal places of the normalized value, so that
/// trailing fractional zeros do not count against either limit.
fn digits_and_places(decimal: Decimal) -> (u32, u32) {
    let normalized = decimal.normalize();
    let places = normalized.scale();
    let mantissa_digits = normalized.mantissa().unsigned_abs().to_string().len() as u32;
    (mantissa_digits.max(places), places)
}

/// Closed schema: a payload may only carry the declared fields.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Same table with every field made optional and defaults dropped, for
    /// partial updates.
    pub fn partial(&self) -> Self {
        let fields = self
            .fields
            .iter()
            .cloned()
            .map(FieldSpec::optional)
            .collect();
        Self { fields }
    }

    pub fn validate(&self, input: &Map<String, Value>) -> Result<ValidatedFields, ValidationErrors> {
        let mut violations = Vec::new();

        for key in input.keys() {
            if !self.fields.iter().any(|field| field.name == key) {
                violations.push(FieldViolation::new(key.as_str(), "extra fields not permitted"));
            }
        }

        let mut values = HashMap::new();
        for field in &self.fields {
            let raw = input.get(field.name).filter(|value| !value.is_null());

            match (raw, field.presence) {
                (Some(raw), _) => match field.check(raw) {
                    Ok(value) => {
                        values.insert(field.name, value);
                    }
                    Err(message) => violations.push(FieldViolation::new(field.name, message)),
                },
                (None, Presence::Required) => {
                    violations.push(FieldViolation::new(field.name, "field required"));
                }
                (None, Presence::Default(default)) => {
                    values.insert(field.name, default());
                }
                (None, Presence::Optional) => {}
            }
        }

        if violations.is_empty() {
            Ok(ValidatedFields { values })
        } else {
            tracing::debug!(
                violation_count = violations.len(),
                "Payload rejected by field validation"
            );
            Err(ValidationErrors { violations })
        }
    }
}

/// Typed values produced by a successful [`Schema::validate`].
#[derive(Debug, Default)]
pub struct ValidatedFields {
    values: HashMap<&'static str, FieldValue>,
}

impl ValidatedFields {
    pub fn take_text(&mut self, name: &str) -> Option<String> {
        match self.values.remove(name) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn take_decimal(&mut self, name: &str) -> Option<Decimal> {
        match self.values.remove(name) {
            Some(FieldValue::Decimal(decimal)) => Some(decimal),
            _ => None,
        }
    }

    pub fn take_timestamp(&mut self, name: &str) -> Option<NaiveDateTime> {
        match self.values.remove(name) {
            Some(FieldValue::Timestamp(timestamp)) => Some(timestamp),
            _ => None,
        }
    }
}
