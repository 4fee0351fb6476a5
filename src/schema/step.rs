//! Step (span) values: the data carried by every node of a trace tree.

use crate::error::{GalileoError, Result};
use crate::schema::document::Document;
use crate::schema::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Kind of a node in a trace tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Trace,
    Workflow,
    Agent,
    Llm,
    Retriever,
    Tool,
}

impl StepType {
    /// Container steps own an ordered list of child steps; leaves never do.
    pub fn is_container(self) -> bool {
        matches!(self, StepType::Trace | StepType::Workflow | StepType::Agent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Trace => "trace",
            StepType::Workflow => "workflow",
            StepType::Agent => "agent",
            StepType::Llm => "llm",
            StepType::Retriever => "retriever",
            StepType::Tool => "tool",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input or output of a step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepIo {
    Text(String),
    Message(Message),
    Messages(Vec<Message>),
    Documents(Vec<Document>),
    Json(Value),
}

impl StepIo {
    /// Capture any serializable value as step input/output.
    ///
    /// Fails with `ValidationError` when the value has no JSON representation
    /// (for example a map keyed by something other than strings).
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| {
            GalileoError::ValidationError(format!("Step input/output is not serializable: {}", e))
        })?;
        Ok(match value {
            Value::String(text) => StepIo::Text(text),
            other => StepIo::Json(other),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StepIo::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Flat text rendering: text as-is, everything else as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            StepIo::Text(text) => text.clone(),
            StepIo::Json(value) => value.to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl Default for StepIo {
    fn default() -> Self {
        StepIo::Text(String::new())
    }
}

impl From<&str> for StepIo {
    fn from(value: &str) -> Self {
        StepIo::Text(value.to_string())
    }
}

impl From<String> for StepIo {
    fn from(value: String) -> Self {
        StepIo::Text(value)
    }
}

impl From<Message> for StepIo {
    fn from(value: Message) -> Self {
        StepIo::Message(value)
    }
}

impl From<Vec<Message>> for StepIo {
    fn from(value: Vec<Message>) -> Self {
        StepIo::Messages(value)
    }
}

impl From<Vec<Document>> for StepIo {
    fn from(value: Vec<Document>) -> Self {
        StepIo::Documents(value)
    }
}

impl From<Value> for StepIo {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => StepIo::Text(text),
            other => StepIo::Json(other),
        }
    }
}

/// Fields only LLM steps carry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A single node of a trace tree, without its structural links
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub input: StepIo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepIo>,
    pub name: String,
    #[serde(rename = "created_at_ns", with = "chrono::serde::ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ns: Option<u64>,
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub llm: Option<LlmDetails>,
}

impl Step {
    /// A fresh step named after its type, created now.
    pub fn new(step_type: StepType, input: StepIo) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_type,
            input,
            output: None,
            name: step_type.as_str().to_string(),
            created_at: Utc::now(),
            duration_ns: None,
            metadata: HashMap::new(),
            tags: Vec::new(),
            status_code: None,
            ground_truth: None,
            tool_call_id: None,
            llm: match step_type {
                StepType::Llm => Some(LlmDetails::default()),
                _ => None,
            },
        }
    }

    pub fn is_container(&self) -> bool {
        self.step_type.is_container()
    }
}

/// Exported, ownership-based form of a non-root step and its subtree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanRecord {
    #[serde(flatten)]
    pub step: Step,
    /// Present for container steps only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<SpanRecord>>,
}

/// Exported form of a whole trace, as handed to the ingestion sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    #[serde(flatten)]
    pub step: Step,
    pub spans: Vec<SpanRecord>,
}

impl TraceRecord {
    /// Number of steps in the trace, root included.
    pub fn step_count(&self) -> usize {
        fn count(spans: &[SpanRecord]) -> usize {
            spans
                .iter()
                .map(|s| 1 + s.spans.as_deref().map(count).unwrap_or(0))
                .sum()
        }
        1 + count(&self.spans)
    }
}
