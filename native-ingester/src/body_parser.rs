use serde_json::{Map, Value};

use crate::error::ParseError;

pub const DEFAULT_UUID_FIELD: &str = "uuid";

/// Extracts the identifier the native store files a content body under.
pub trait ContentBodyParser: Send + Sync {
    fn content_uuid(&self, body: &Map<String, Value>) -> Result<String, ParseError>;
}

/// Reads the content uuid from a top level string field.
#[derive(Debug, Clone)]
pub struct UuidFieldParser {
    field: String,
}

impl UuidFieldParser {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_owned(),
        }
    }
}

impl Default for UuidFieldParser {
    fn default() -> Self {
        Self::new(DEFAULT_UUID_FIELD)
    }
}

impl ContentBodyParser for UuidFieldParser {
    fn content_uuid(&self, body: &Map<String, Value>) -> Result<String, ParseError> {
        match body.get(&self.field) {
            None | Some(Value::Null) => Err(ParseError::MissingField(self.field.clone())),
            Some(Value::String(uuid)) if uuid.trim().is_empty() => {
                Err(ParseError::EmptyField(self.field.clone()))
            }
            Some(Value::String(uuid)) => Ok(uuid.clone()),
            Some(_) => Err(ParseError::NotAString(self.field.clone())),
        }
    }
}
