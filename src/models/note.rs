use std::sync::LazyLock;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::validation::{
    DANGEROUS_SUBSTRINGS, FieldSpec, FieldValue, Schema, ValidatedFields, ValidationErrors,
};

pub const TITLE_PATTERN: &str = r"^[a-zA-Z0-9\s.,-]+$";

static NOTE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::text("title")
            .length(1, 200)
            .pattern(TITLE_PATTERN)
            .deny(DANGEROUS_SUBSTRINGS),
        FieldSpec::text("body").length(1, 10_000),
        FieldSpec::decimal("priority")
            .at_least(Decimal::new(1, 1))
            .at_most(Decimal::new(100, 1))
            .default_with(default_priority),
    ])
});

static NOTE_CHANGES_SCHEMA: LazyLock<Schema> = LazyLock::new(|| NOTE_SCHEMA.partial());

fn default_priority() -> FieldValue {
    FieldValue::Decimal(Decimal::new(10, 1))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub priority: Decimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A note that passed validation and may be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedNote {
    pub title: String,
    pub body: String,
    pub priority: Decimal,
}

impl ValidatedNote {
    pub fn from_input(input: &Map<String, Value>) -> Result<Self, ValidationErrors> {
        let mut fields = NOTE_SCHEMA.validate(input)?;
        Ok(Self {
            title: fields.take_text("title").unwrap_or_default(),
            body: fields.take_text("body").unwrap_or_default(),
            priority: fields
                .take_decimal("priority")
                .unwrap_or_else(|| Decimal::new(10, 1)),
        })
    }

    pub fn into_note(self, id: i64, now: NaiveDateTime) -> Note {
        Note {
            id,
            title: self.title,
            body: self.body,
            priority: self.priority,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub priority: Option<Decimal>,
}

impl NoteChanges {
    pub fn from_input(input: &Map<String, Value>) -> Result<Self, ValidationErrors> {
        let mut fields: ValidatedFields = NOTE_CHANGES_SCHEMA.validate(input)?;
        Ok(Self {
            title: fields.take_text("title"),
            body: fields.take_text("body"),
            priority: fields.take_decimal("priority"),
        })
    }

    /// Produces the next snapshot of `note`; the original is left untouched.
    pub fn apply(&self, note: &Note, now: NaiveDateTime) -> Note {
        Note {
            id: note.id,
            title: self.title.clone().unwrap_or_else(|| note.title.clone()),
            body: self.body.clone().unwrap_or_else(|| note.body.clone()),
            priority: self.priority.unwrap_or(note.priority),
            created_at: note.created_at,
            updated_at: now,
        }
    }
}
