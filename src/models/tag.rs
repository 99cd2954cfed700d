use std::sync::LazyLock;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::validation::{DANGEROUS_SUBSTRINGS, FieldSpec, Schema, ValidationErrors};

static TAG_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::text("name").length(1, 50).deny(DANGEROUS_SUBSTRINGS),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagName(String);

impl TagName {
    pub fn from_input(input: &Map<String, Value>) -> Result<Self, ValidationErrors> {
        let mut fields = TAG_SCHEMA.validate(input)?;
        Ok(Self(fields.take_text("name").unwrap_or_default()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_tag(self, id: i64) -> Tag {
        Tag { id, name: self.0 }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tag_name() {
        let input = json!({ "name": " rust " }).as_object().cloned().unwrap();
        assert_eq!(TagName::from_input(&input).unwrap().as_str(), "rust");
    }

    #[test]
    fn test_tag_name_rules() {
        for name in [json!(""), json!("x".repeat(51)), json!("<tag>"), json!(5)] {
            let input = json!({ "name": name }).as_object().cloned().unwrap();
            assert!(TagName::from_input(&input).is_err());
        }
    }
}
