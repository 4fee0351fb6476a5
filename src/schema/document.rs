//! Retrieved documents and the shapes a retriever output may take.

use crate::error::{GalileoError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Scalar value allowed in document metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl MetadataValue {
    /// Convert a JSON value, returning `None` for anything that is not a scalar.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            Value::Number(n) => Some(MetadataValue::Number(n.clone())),
            Value::String(s) => Some(MetadataValue::String(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value.into())
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

/// A document returned by a retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Build a document from loosely typed metadata.
    ///
    /// Entries whose value is not a boolean, string or number are dropped.
    pub fn with_metadata(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        let mut kept = HashMap::with_capacity(metadata.len());
        for (key, value) in metadata {
            match MetadataValue::from_json(&value) {
                Some(v) => {
                    kept.insert(key, v);
                }
                None => debug!(key = %key, "Dropping non-scalar document metadata entry"),
            }
        }
        Self {
            content: content.into(),
            metadata: kept,
        }
    }

    /// Convert a plain record into a document.
    ///
    /// A record with a string `content` field becomes that document (with its
    /// `metadata` object, if any). Any other record is kept whole as the JSON
    /// text of the document content.
    pub fn from_record(mut record: Map<String, Value>) -> Self {
        if let Some(Value::String(content)) = record.get("content") {
            let content = content.clone();
            let metadata = match record.remove("metadata") {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            return Self::with_metadata(content, metadata);
        }
        Self::new(Value::Object(record).to_string())
    }
}

/// The shapes accepted as retriever output before normalization to documents
#[derive(Debug, Clone, PartialEq)]
pub enum RetrieverOutput {
    Texts(Vec<String>),
    Records(Vec<Map<String, Value>>),
    Documents(Vec<Document>),
    /// Unchecked JSON, validated when the span is built
    Raw(Value),
}

const RETRIEVER_SHAPE_ERROR: &str =
    "Retriever output must be a list of strings, a list of records, or a list of documents";

impl RetrieverOutput {
    pub fn into_documents(self) -> Result<Vec<Document>> {
        match self {
            RetrieverOutput::Texts(texts) => Ok(texts.into_iter().map(Document::new).collect()),
            RetrieverOutput::Records(records) => {
                Ok(records.into_iter().map(Document::from_record).collect())
            }
            RetrieverOutput::Documents(docs) => Ok(docs),
            RetrieverOutput::Raw(value) => documents_from_value(value),
        }
    }
}

fn documents_from_value(value: Value) -> Result<Vec<Document>> {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed @ Value::Array(_)) => documents_from_value(parsed),
            _ => Err(GalileoError::ValidationError(format!(
                "{}, got a plain string",
                RETRIEVER_SHAPE_ERROR
            ))),
        },
        Value::Array(items) => {
            if items.iter().all(Value::is_string) {
                let texts = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                RetrieverOutput::Texts(texts).into_documents()
            } else if items.iter().all(Value::is_object) {
                let records = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect();
                RetrieverOutput::Records(records).into_documents()
            } else {
                Err(GalileoError::ValidationError(format!(
                    "{}, got a list of mixed values",
                    RETRIEVER_SHAPE_ERROR
                )))
            }
        }
        other => Err(GalileoError::ValidationError(format!(
            "{}, got {}",
            RETRIEVER_SHAPE_ERROR,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}

impl From<Vec<String>> for RetrieverOutput {
    fn from(value: Vec<String>) -> Self {
        RetrieverOutput::Texts(value)
    }
}

impl From<Vec<&str>> for RetrieverOutput {
    fn from(value: Vec<&str>) -> Self {
        RetrieverOutput::Texts(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Document>> for RetrieverOutput {
    fn from(value: Vec<Document>) -> Self {
        RetrieverOutput::Documents(value)
    }
}

impl From<Vec<Map<String, Value>>> for RetrieverOutput {
    fn from(value: Vec<Map<String, Value>>) -> Self {
        RetrieverOutput::Records(value)
    }
}

impl From<Value> for RetrieverOutput {
    fn from(value: Value) -> Self {
        RetrieverOutput::Raw(value)
    }
}

impl Default for RetrieverOutput {
    fn default() -> Self {
        RetrieverOutput::Documents(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_metadata_drops_non_scalar_values() {
        let metadata = as_map(json!({"a": true, "b": "x", "c": 3, "d": [1, 2], "e": {"n": 1}}));
        let doc = Document::with_metadata("body", metadata);

        assert_eq!(doc.metadata.len(), 3);
        assert_eq!(doc.metadata.get("a"), Some(&MetadataValue::Bool(true)));
        assert_eq!(doc.metadata.get("b"), Some(&MetadataValue::from("x")));
        assert_eq!(doc.metadata.get("c"), Some(&MetadataValue::from(3i64)));
        assert!(!doc.metadata.contains_key("d"));
        assert!(!doc.metadata.contains_key("e"));
    }

    #[test]
    fn test_metadata_drops_null() {
        let doc = Document::with_metadata("body", as_map(json!({"gone": null})));
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn test_texts_become_documents() {
        let docs = RetrieverOutput::from(vec!["doc1", "doc2"]).into_documents().unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "doc1");
        assert_eq!(docs[1].content, "doc2");
        assert!(docs.iter().all(|d| d.metadata.is_empty()));
    }

    #[test]
    fn test_record_with_content_maps_directly() {
        let record = as_map(json!({"content": "hello", "metadata": {"source": "wiki", "bad": [1]}}));
        let doc = Document::from_record(record);

        assert_eq!(doc.content, "hello");
        assert_eq!(doc.metadata.get("source"), Some(&MetadataValue::from("wiki")));
        assert!(!doc.metadata.contains_key("bad"));
    }

    #[test]
    fn test_record_without_content_is_kept_as_json() {
        let doc = Document::from_record(as_map(json!({"title": "t"})));
        assert_eq!(doc.content, r#"{"title":"t"}"#);
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn test_raw_list_of_strings() {
        let docs = RetrieverOutput::from(json!(["a", "b"])).into_documents().unwrap();
        assert_eq!(docs, vec![Document::new("a"), Document::new("b")]);
    }

    #[test]
    fn test_raw_json_text_is_parsed() {
        let docs = RetrieverOutput::from(json!(r#"["a"]"#)).into_documents().unwrap();
        assert_eq!(docs, vec![Document::new("a")]);
    }

    #[test]
    fn test_raw_mixed_list_is_rejected() {
        let result = RetrieverOutput::from(json!(["a", 1])).into_documents();
        assert!(matches!(result, Err(GalileoError::ValidationError(_))));
    }

    #[test]
    fn test_raw_scalar_is_rejected() {
        let result = RetrieverOutput::from(json!(42)).into_documents();
        match result {
            Err(GalileoError::ValidationError(msg)) => assert!(msg.contains("a number")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_string_is_rejected() {
        let result = RetrieverOutput::from(json!("just text")).into_documents();
        assert!(matches!(result, Err(GalileoError::ValidationError(_))));
    }

    #[test]
    fn test_empty_list_is_accepted() {
        let docs = RetrieverOutput::from(json!([])).into_documents().unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_document_serialization() {
        let doc = Document::with_metadata("c", as_map(json!({"n": 1})));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, json!({"content": "c", "metadata": {"n": 1}}));
    }
}
