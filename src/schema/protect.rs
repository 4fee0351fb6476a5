//! Records of a guardrail ("protect") invocation, logged as a tool step.

use crate::error::{GalileoError, Result};
use serde::{Deserialize, Serialize};

/// What was sent to the guardrail service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Timing information returned with a guardrail response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub received_at_ns: i64,
    pub response_at_ns: i64,
}

/// What the guardrail service answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub trace_metadata: TraceMetadata,
}

impl Response {
    /// Time the service spent between receiving the payload and answering.
    pub fn duration_ns(&self) -> Result<u64> {
        let meta = &self.trace_metadata;
        let elapsed = meta.response_at_ns - meta.received_at_ns;
        u64::try_from(elapsed).map_err(|_| {
            GalileoError::ValidationError(format!(
                "Protect response_at_ns ({}) precedes received_at_ns ({})",
                meta.response_at_ns, meta.received_at_ns
            ))
        })
    }
}
