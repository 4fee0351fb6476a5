//! Parameter records for the node-creating operations.
//!
//! Every record implements `Default`, so callers fill in what they know and
//! finish with `..Default::default()`.

use crate::error::{GalileoError, Result};
use crate::schema::{Payload, Response, RetrieverOutput, Step, StepIo, StepType};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Parameters for a new trace (root container)
#[derive(Debug, Clone, Default)]
pub struct TraceParams {
    pub input: StepIo,
    pub output: Option<StepIo>,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_ns: Option<u64>,
    pub metadata: HashMap<String, String>,
    pub tags: Vec<String>,
    pub ground_truth: Option<String>,
}

impl TraceParams {
    pub fn new(input: impl Into<StepIo>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub(crate) fn into_step(self) -> Result<Step> {
        let mut step = Step::new(StepType::Trace, self.input);
        step.output = self.output;
        apply_common(&mut step, self.name, self.created_at, self.duration_ns)?;
        step.metadata = self.metadata;
        step.tags = self.tags;
        step.ground_truth = self.ground_truth;
        Ok(step)
    }
}

/// Parameters for an LLM call
#[derive(Debug, Clone, Default)]
pub struct LlmSpanParams {
    pub input: StepIo,
    pub output: StepIo,
    pub model: Option<String>,
    pub tools: Option<Vec<Value>>,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_ns: Option<u64>,
    pub metadata: HashMap<String, String>,
    pub tags: Vec<String>,
    pub num_input_tokens: Option<u64>,
    pub num_output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub time_to_first_token_ns: Option<u64>,
    pub temperature: Option<f64>,
    pub status_code: Option<i32>,
    pub ground_truth: Option<String>,
}

impl LlmSpanParams {
    pub fn new(
        input: impl Into<StepIo>,
        output: impl Into<StepIo>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub(crate) fn into_step(self) -> Result<Step> {
        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() {
                return Err(GalileoError::ValidationError(format!(
                    "LLM temperature must be a finite number, got {}",
                    temperature
                )));
            }
        }
        if let (Some(input), Some(output), Some(total)) =
            (self.num_input_tokens, self.num_output_tokens, self.total_tokens)
        {
            if input.saturating_add(output) > total {
                return Err(GalileoError::ValidationError(format!(
                    "total_tokens ({}) is smaller than input ({}) plus output ({}) tokens",
                    total, input, output
                )));
            }
        }

        let mut step = Step::new(StepType::Llm, self.input);
        step.output = Some(self.output);
        apply_common(&mut step, self.name, self.created_at, self.duration_ns)?;
        step.metadata = self.metadata;
        step.tags = self.tags;
        step.status_code = self.status_code;
        step.ground_truth = self.ground_truth;
        if let Some(llm) = step.llm.as_mut() {
            llm.model = self.model;
            llm.tools = self.tools;
            llm.num_input_tokens = self.num_input_tokens;
            llm.num_output_tokens = self.num_output_tokens;
            llm.total_tokens = self.total_tokens;
            llm.time_to_first_token_ns = self.time_to_first_token_ns;
            llm.temperature = self.temperature;
        }
        Ok(step)
    }
}

/// Parameters for a retrieval call
#[derive(Debug, Clone, Default)]
pub struct RetrieverSpanParams {
    pub input: StepIo,
    pub documents: RetrieverOutput,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_ns: Option<u64>,
    pub metadata: HashMap<String, String>,
    pub tags: Vec<String>,
    pub status_code: Option<i32>,
}

impl RetrieverSpanParams {
    pub fn new(input: impl Into<StepIo>, documents: impl Into<RetrieverOutput>) -> Self {
        Self {
            input: input.into(),
            documents: documents.into(),
            ..Default::default()
        }
    }

    pub(crate) fn into_step(self) -> Result<Step> {
        let documents = self.documents.into_documents()?;
        let mut step = Step::new(StepType::Retriever, self.input);
        step.output = Some(StepIo::Documents(documents));
        apply_common(&mut step, self.name, self.created_at, self.duration_ns)?;
        step.metadata = self.metadata;
        step.tags = self.tags;
        step.status_code = self.status_code;
        Ok(step)
    }
}

/// Parameters for a tool call
#[derive(Debug, Clone, Default)]
pub struct ToolSpanParams {
    pub input: StepIo,
    pub output: Option<StepIo>,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_ns: Option<u64>,
    pub metadata: HashMap<String, String>,
    pub tags: Vec<String>,
    pub status_code: Option<i32>,
    pub tool_call_id: Option<String>,
}

impl ToolSpanParams {
    pub fn new(input: impl Into<StepIo>, output: impl Into<StepIo>) -> Self {
        Self {
            input: input.into(),
            output: Some(output.into()),
            ..Default::default()
        }
    }

    pub(crate) fn into_step(self) -> Result<Step> {
        let mut step = Step::new(StepType::Tool, self.input);
        step.output = self.output;
        apply_common(&mut step, self.name, self.created_at, self.duration_ns)?;
        step.metadata = self.metadata;
        step.tags = self.tags;
        step.status_code = self.status_code;
        step.tool_call_id = self.tool_call_id;
        Ok(step)
    }
}

/// Parameters for a guardrail invocation, recorded as a tool step
#[derive(Debug, Clone)]
pub struct ProtectSpanParams {
    pub payload: Payload,
    pub response: Response,
    pub created_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub tags: Vec<String>,
    pub status_code: Option<i32>,
}

pub(crate) const PROTECT_STEP_NAME: &str = "GalileoProtect";

impl ProtectSpanParams {
    pub fn new(payload: Payload, response: Response) -> Self {
        Self {
            payload,
            response,
            created_at: None,
            metadata: HashMap::new(),
            tags: Vec::new(),
            status_code: None,
        }
    }

    pub(crate) fn into_step(self) -> Result<Step> {
        let duration_ns = self.response.duration_ns()?;
        let mut step = Step::new(StepType::Tool, StepIo::from_serializable(&self.payload)?);
        step.output = Some(StepIo::from_serializable(&self.response)?);
        apply_common(
            &mut step,
            Some(PROTECT_STEP_NAME.to_string()),
            self.created_at,
            Some(duration_ns),
        )?;
        step.metadata = self.metadata;
        step.tags = self.tags;
        step.status_code = self.status_code;
        Ok(step)
    }
}

/// Parameters for a nested container (workflow or agent)
#[derive(Debug, Clone, Default)]
pub struct WorkflowSpanParams {
    pub input: StepIo,
    pub output: Option<StepIo>,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub duration_ns: Option<u64>,
    pub metadata: HashMap<String, String>,
    pub tags: Vec<String>,
}

impl WorkflowSpanParams {
    pub fn new(input: impl Into<StepIo>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub(crate) fn into_step(self, step_type: StepType) -> Result<Step> {
        let mut step = Step::new(step_type, self.input);
        step.output = self.output;
        apply_common(&mut step, self.name, self.created_at, self.duration_ns)?;
        step.metadata = self.metadata;
        step.tags = self.tags;
        Ok(step)
    }
}

/// Fields a conclude call may overwrite
#[derive(Debug, Clone, Default)]
pub struct ConcludeParams {
    pub output: Option<StepIo>,
    pub duration_ns: Option<u64>,
    pub status_code: Option<i32>,
}

impl ConcludeParams {
    pub fn with_output(output: impl Into<StepIo>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }
}

fn apply_common(
    step: &mut Step,
    name: Option<String>,
    created_at: Option<DateTime<Utc>>,
    duration_ns: Option<u64>,
) -> Result<()> {
    if let Some(name) = name {
        step.name = name;
    }
    if let Some(created_at) = created_at {
        // Timestamps are sent as i64 nanoseconds since the epoch.
        if created_at.timestamp_nanos_opt().is_none() {
            return Err(GalileoError::ValidationError(format!(
                "created_at {} is outside the range of a nanosecond timestamp",
                created_at
            )));
        }
        step.created_at = created_at;
    }
    step.duration_ns = duration_ns;
    Ok(())
}
