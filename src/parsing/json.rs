use serde_json::Value;

use super::{ParseFailure, ParseFailureReason, RecordParser};
use crate::datamodel::ParsedDocument;

/// Parses one JSON object per record, as found in JSON-lines dumps.
#[derive(Debug, Clone, Default)]
pub struct JsonRecordParser {
    required_fields: Vec<String>,
}

impl JsonRecordParser {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }
}

impl RecordParser for JsonRecordParser {
    fn parse(&self, raw: &str, batch_sequence: u64) -> Result<ParsedDocument, ParseFailure> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseFailure::new(raw, ParseFailureReason::Empty));
        }

        let value: Value = serde_json::from_str(trimmed).map_err(|err| {
            ParseFailure::new(raw, ParseFailureReason::MalformedSyntax(err.to_string()))
        })?;

        let Value::Object(body) = value else {
            return Err(ParseFailure::new(raw, ParseFailureReason::NotAnObject));
        };

        // A null counts as missing.
        for field in &self.required_fields {
            if body.get(field).is_none_or(Value::is_null) {
                return Err(ParseFailure::new(
                    raw,
                    ParseFailureReason::MissingField(field.clone()),
                ));
            }
        }

        Ok(ParsedDocument::new(batch_sequence, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VARIANT: &str = r#"{"alternate":"C","reference":"T","chromosome":"19","start":45411941,"end":45411941,"geneName":"APOE"}"#;

    #[test]
    fn test_parse_variant() {
        let parser = JsonRecordParser::default();
        let document = parser.parse(VARIANT, 4).unwrap();
        assert_eq!(document.batch_sequence, 4);
        assert_eq!(document.get("geneName"), Some(&json!("APOE")));
        assert_eq!(document.get("start"), Some(&json!(45411941)));
        assert_eq!(document.body.len(), 6);
    }

    #[test]
    fn test_leading_whitespace_is_tolerated() {
        let parser = JsonRecordParser::default();
        let document = parser.parse(&format!("  {VARIANT}\n"), 0).unwrap();
        assert_eq!(document.get("chromosome"), Some(&json!("19")));
    }

    #[test]
    fn test_malformed_json() {
        let parser = JsonRecordParser::default();
        let failure = parser.parse("malformed-json", 1).unwrap_err();
        assert_eq!(failure.raw, "malformed-json");
        assert!(matches!(
            failure.reason,
            ParseFailureReason::MalformedSyntax(_)
        ));
    }

    #[test]
    fn test_empty_record() {
        let parser = JsonRecordParser::default();
        assert_eq!(
            parser.parse("   ", 0).unwrap_err().reason,
            ParseFailureReason::Empty
        );
    }

    #[test]
    fn test_not_an_object() {
        let parser = JsonRecordParser::default();
        for raw in ["[1, 2]", "42", "\"APOE\"", "null"] {
            assert_eq!(
                parser.parse(raw, 0).unwrap_err().reason,
                ParseFailureReason::NotAnObject
            );
        }
    }

    #[test]
    fn test_required_fields() {
        let parser = JsonRecordParser::new(vec!["chromosome".into(), "mutationID".into()]);
        assert_eq!(
            parser.parse(VARIANT, 0).unwrap_err().reason,
            ParseFailureReason::MissingField("mutationID".into())
        );

        let failure = parser
            .parse(r#"{"chromosome":null,"mutationID":"3749517"}"#, 0)
            .unwrap_err();
        assert_eq!(
            failure.reason,
            ParseFailureReason::MissingField("chromosome".into())
        );

        assert!(
            parser
                .parse(r#"{"chromosome":"19","mutationID":"3749517"}"#, 0)
                .is_ok()
        );
    }

    #[test]
    fn test_numbers_are_not_coerced() {
        let parser = JsonRecordParser::default();
        let document = parser
            .parse(r#"{"age":73.0,"idStudy":375,"snp":true}"#, 0)
            .unwrap();
        assert_eq!(document.get("age"), Some(&json!(73.0)));
        assert_eq!(document.get("idStudy"), Some(&json!(375)));
        assert_eq!(document.get("snp"), Some(&json!(true)));
    }
}
