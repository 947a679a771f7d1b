use serde_json::{Map, Value};
use uuid::Uuid;

use crate::datamodel::ParsedDocument;

/// Field holding the caller-chosen document key.
pub const DOCUMENT_KEY_FIELD: &str = "_id";

/// A document as read back from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub batch_sequence: u64,
    pub body: Map<String, Value>,
}

/// Returns the key a document is stored under.
///
/// Strings and integers in `_id` are used as is. Documents without `_id`
/// get a fresh UUID; the key is stored next to the body, never inside it.
pub fn document_key(document: &ParsedDocument) -> Result<String, String> {
    match document.get(DOCUMENT_KEY_FIELD) {
        None => Ok(Uuid::new_v4().to_string()),
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(Value::Number(number)) if number.is_i64() || number.is_u64() => {
            Ok(number.to_string())
        }
        Some(other) => Err(format!(
            "field '{}' must be a non-empty string or an integer, got {}",
            DOCUMENT_KEY_FIELD, other
        )),
    }
}

/// Sequence numbers are stored in signed 64 bit columns.
#[allow(dead_code)] // Used by the SQL backends when enabled
pub fn sequence_to_i64(sequence: u64) -> i64 {
    i64::try_from(sequence).unwrap_or(i64::MAX)
}

#[allow(dead_code)] // Used by the SQL backends when enabled
pub fn sequence_from_i64(sequence: i64) -> u64 {
    u64::try_from(sequence).unwrap_or_default()
}
