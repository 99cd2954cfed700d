use std::sync::LazyLock;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::validation::{FieldSpec, Schema, ValidationErrors};

static PAYMENT_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::decimal("amount")
            .greater_than(Decimal::ZERO)
            .max_digits(12)
            .max_decimal_places(2),
        FieldSpec::text("currency").length(3, 3).pattern("^[A-Z]{3}$"),
        FieldSpec::timestamp("occurred_at"),
        FieldSpec::text("description").length(1, 500),
    ])
});

/// Validated payment. `occurred_at` is UTC with the offset dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub amount: Decimal,
    pub currency: String,
    pub occurred_at: NaiveDateTime,
    pub description: String,
}

impl PaymentRecord {
    pub fn from_input(input: &Map<String, Value>) -> Result<Self, ValidationErrors> {
        let mut fields = PAYMENT_SCHEMA.validate(input)?;
        Ok(Self {
            amount: fields.take_decimal("amount").unwrap_or_default(),
            currency: fields.take_text("currency").unwrap_or_default(),
            occurred_at: fields.take_timestamp("occurred_at").unwrap_or_default(),
            description: fields.take_text("description").unwrap_or_default(),
        })
    }
}
