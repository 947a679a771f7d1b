use serde_json::{Map, Value};

/// Structured form of one raw record.
///
/// The body schema belongs to whoever produced the records; the loader only
/// requires it to be a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub batch_sequence: u64,
    pub body: Map<String, Value>,
}

impl ParsedDocument {
    pub fn new(batch_sequence: u64, body: Map<String, Value>) -> Self {
        Self {
            batch_sequence,
            body,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }
}
