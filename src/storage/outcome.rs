use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DuplicateKey,
    SchemaViolation,
    Transient,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::DuplicateKey => "duplicate key",
            FailureKind::SchemaViolation => "schema violation",
            FailureKind::Transient => "transient failure",
        };
        f.write_str(name)
    }
}

/// A document the store refused, identified by its index in the written slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub index: usize,
    pub key: Option<String>,
    pub kind: FailureKind,
    pub reason: String,
}

impl DocumentFailure {
    pub fn duplicate_key(index: usize, key: String) -> Self {
        Self {
            index,
            reason: format!("a document with key '{}' already exists", key),
            key: Some(key),
            kind: FailureKind::DuplicateKey,
        }
    }

    pub fn schema_violation(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            key: None,
            kind: FailureKind::SchemaViolation,
            reason: reason.into(),
        }
    }

    pub fn transient(index: usize, key: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            index,
            key,
            kind: FailureKind::Transient,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DocumentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document #{} ({}): {}", self.index, self.kind, self.reason)
    }
}

/// Result of one bulk write that did not hit a fatal error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub persisted: usize,
    pub failures: Vec<DocumentFailure>,
}

impl WriteOutcome {
    pub fn rejected(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
