use std::sync::LazyLock;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

use super::utc_now;
use crate::validation::{DANGEROUS_SUBSTRINGS, FieldSpec, Schema, ValidationErrors};

static ITEM_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::text("name").length(1, 100).deny(DANGEROUS_SUBSTRINGS),
        FieldSpec::decimal("price")
            .optional()
            .greater_than(Decimal::ZERO)
            .max_digits(10)
            .max_decimal_places(2),
        FieldSpec::timestamp("created_at").optional(),
    ])
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: Option<Decimal>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub price: Option<Decimal>,
    pub created_at: NaiveDateTime,
}

impl ItemDraft {
    /// Validates an item payload; a missing `created_at` becomes "now".
    pub fn from_input(input: &Map<String, Value>) -> Result<Self, ValidationErrors> {
        let mut fields = ITEM_SCHEMA.validate(input)?;
        Ok(Self {
            name: fields.take_text("name").unwrap_or_default(),
            price: fields.take_decimal("price"),
            created_at: fields.take_timestamp("created_at").unwrap_or_else(utc_now),
        })
    }

    pub fn into_item(self, id: i64) -> Item {
        Item {
            id,
            name: self.name,
            price: self.price,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_minimal_item_gets_timestamp() {
        let before = utc_now();
        let draft = ItemDraft::from_input(&input(json!({ "name": "Notebook" }))).unwrap();
        assert_eq!(draft.price, None);
        assert!(draft.created_at >= before);
    }

    #[test]
    fn test_dangerous_name_rejected() {
        for name in ["<b>", "a > b", "javascript:alert(1)", "x onload=y"] {
            let err = ItemDraft::from_input(&input(json!({ "name": name }))).unwrap_err();
            assert!(err.has_forbidden_content(), "name {name}");
        }
    }

    #[test]
    fn test_price_rules() {
        let ok = ItemDraft::from_input(&input(json!({ "name": "Pen", "price": 12.5 }))).unwrap();
        assert_eq!(ok.price, Some(Decimal::new(125, 1)));

        for price in ["0", "1.999", "123456789.01"] {
            let err =
                ItemDraft::from_input(&input(json!({ "name": "Pen", "price": price }))).unwrap_err();
            assert!(err.mentions("price"), "price {price}");
        }
    }

    #[test]
    fn test_created_at_normalized() {
        let draft = ItemDraft::from_input(&input(json!({
            "name": "Clock",
            "created_at": "2024-03-01T00:30:00+01:00",
        })))
        .unwrap();
        assert_eq!(draft.created_at.to_string(), "2024-02-29 23:30:00");
    }

    #[test]
    fn test_name_too_long() {
        let err = ItemDraft::from_input(&input(json!({ "name": "a".repeat(101) }))).unwrap_err();
        assert_eq!(err.to_string(), "name: must be at most 100 characters");
    }
}
