use anyhow::{Result, bail};
use std::fmt::Debug;
use thiserror::Error;

use crate::datamodel::ParsedDocument;

pub mod json;

pub use json::JsonRecordParser;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailureReason {
    #[error("empty record")]
    Empty,

    #[error("malformed JSON: {0}")]
    MalformedSyntax(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(String),
}

/// A record that could not be turned into a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseFailure {
    pub raw: String,
    pub reason: ParseFailureReason,
}

impl ParseFailure {
    pub fn new(raw: &str, reason: ParseFailureReason) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// Maps one raw record to a document.
///
/// Implementations must be stateless: workers share a single parser and call
/// it concurrently.
pub trait RecordParser: Send + Sync + Debug {
    fn parse(&self, raw: &str, batch_sequence: u64) -> Result<ParsedDocument, ParseFailure>;
}

pub fn get_parser_from_name(
    name: &str,
    required_fields: Vec<String>,
) -> Result<Box<dyn RecordParser>> {
    match name {
        "json" | "jsonl" => Ok(Box::new(JsonRecordParser::new(required_fields))),
        _ => bail!("Unsupported record format: {}", name),
    }
}
