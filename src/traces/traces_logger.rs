//! Tree builder holding the buffered traces and the stack of open containers.
//!
//! The builder is either empty (no open node) or open with a stack of
//! containers from the current trace root down to the innermost open workflow
//! or agent. Leaf spans attach to the top of the stack; containers attach and
//! are pushed; `conclude` pops.

use crate::error::{GalileoError, Result};
use crate::schema::{Step, StepIo, StepType, TraceRecord};
use crate::traces::params::{
    ConcludeParams, LlmSpanParams, ProtectSpanParams, RetrieverSpanParams, ToolSpanParams,
    TraceParams, WorkflowSpanParams,
};
use crate::traces::tree::{NodeId, SpanTree, StatusCodeOnConclude};
use tracing::{debug, error};

/// Builds trace trees one open trace at a time
///
/// Not meant to be shared across concurrent executions: use one builder per
/// logical trace session (for example one per request).
#[derive(Debug, Default)]
pub struct TracesLogger {
    tree: SpanTree,
    traces: Vec<NodeId>,
    parent_stack: Vec<NodeId>,
    status_code_on_conclude: StatusCodeOnConclude,
}

impl TracesLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status_policy(status_code_on_conclude: StatusCodeOnConclude) -> Self {
        Self {
            status_code_on_conclude,
            ..Self::default()
        }
    }

    /// The open container that receives the next span, if any.
    pub fn current_parent(&self) -> Option<NodeId> {
        self.parent_stack.last().copied()
    }

    /// Number of open containers, zero when no trace is open.
    pub fn depth(&self) -> usize {
        self.parent_stack.len()
    }

    pub fn is_open(&self) -> bool {
        !self.parent_stack.is_empty()
    }

    /// Ids of the buffered trace roots in creation order.
    pub fn trace_ids(&self) -> &[NodeId] {
        &self.traces
    }

    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    pub fn step(&self, id: NodeId) -> Option<&Step> {
        self.tree.step(id)
    }

    pub fn step_mut(&mut self, id: NodeId) -> Option<&mut Step> {
        self.tree.step_mut(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.tree.children(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent(id)
    }

    /// Start a new trace and make it the current parent.
    pub fn add_trace(&mut self, params: TraceParams) -> Result<NodeId> {
        if self.is_open() {
            return Err(GalileoError::InvalidState(
                "You must conclude the existing trace before adding a new one".to_string(),
            ));
        }
        let trace = self.tree.add_root(params.into_step()?)?;
        self.traces.push(trace);
        self.parent_stack.push(trace);
        debug!(traces = self.traces.len(), "Started trace");
        Ok(trace)
    }

    /// Record a trace made of exactly one LLM call.
    ///
    /// The trace is complete on return; the builder stays empty.
    pub fn add_single_span_trace(&mut self, params: LlmSpanParams) -> Result<NodeId> {
        if self.is_open() {
            return Err(GalileoError::InvalidState(
                "A trace cannot be created within a parent trace or span, it must always be the root"
                    .to_string(),
            ));
        }

        let mut trace = TraceParams {
            input: StepIo::Text(params.input.to_text()),
            output: Some(StepIo::Text(params.output.to_text())),
            name: params.name.clone(),
            created_at: params.created_at,
            duration_ns: params.duration_ns,
            metadata: params.metadata.clone(),
            tags: params.tags.clone(),
            ground_truth: params.ground_truth.clone(),
        }
        .into_step()?;
        trace.status_code = params.status_code;

        // Validate the LLM step before anything lands in the arena.
        let llm = params.into_step()?;
        let root = self.tree.add_root(trace)?;
        self.tree.attach(root, llm)?;
        self.traces.push(root);
        Ok(root)
    }

    pub fn add_llm_span(&mut self, params: LlmSpanParams) -> Result<NodeId> {
        let parent = self.require_parent()?;
        self.tree.add_llm(parent, params)
    }

    pub fn add_retriever_span(&mut self, params: RetrieverSpanParams) -> Result<NodeId> {
        let parent = self.require_parent()?;
        self.tree.add_retriever(parent, params)
    }

    pub fn add_tool_span(&mut self, params: ToolSpanParams) -> Result<NodeId> {
        let parent = self.require_parent()?;
        self.tree.add_tool(parent, params)
    }

    pub fn add_protect_span(&mut self, params: ProtectSpanParams) -> Result<NodeId> {
        let parent = self.require_parent()?;
        self.tree.add_protect(parent, params)
    }

    /// Open a nested workflow; following spans attach to it until concluded.
    pub fn add_workflow_span(&mut self, params: WorkflowSpanParams) -> Result<NodeId> {
        let parent = self.require_parent()?;
        let span = self.tree.add_workflow(parent, params)?;
        self.parent_stack.push(span);
        Ok(span)
    }

    /// Open a nested agent; following spans attach to it until concluded.
    pub fn add_agent_span(&mut self, params: WorkflowSpanParams) -> Result<NodeId> {
        let parent = self.require_parent()?;
        let span = self.tree.add_agent(parent, params)?;
        self.parent_stack.push(span);
        Ok(span)
    }

    /// Conclude the current parent and return the new current parent.
    ///
    /// Returns `None` once the trace root itself has been concluded.
    pub fn conclude(&mut self, params: ConcludeParams) -> Result<Option<NodeId>> {
        let current = self.current_parent().ok_or_else(|| {
            GalileoError::InvalidState("No existing workflow to conclude".to_string())
        })?;

        let root = self.parent_stack.first().copied().unwrap_or(current);
        let parent = self.tree.conclude(current, params, self.status_code_on_conclude)?;
        self.parent_stack.pop();
        let next = self.current_parent();

        let finished_is_root = self
            .tree
            .step(current)
            .is_some_and(|s| s.step_type == StepType::Trace);
        if next.is_none() && !finished_is_root {
            return Err(self.abort_session(
                root,
                "Finished step is not a trace, but has no open parent",
            ));
        }
        if next != parent {
            return Err(self.abort_session(
                root,
                "Finished step does not point back to the enclosing open step",
            ));
        }
        Ok(next)
    }

    /// Conclude every open node, applying the same fields to each.
    pub fn conclude_all(&mut self, params: ConcludeParams) -> Result<()> {
        while self.is_open() {
            self.conclude(params.clone())?;
        }
        Ok(())
    }

    /// The most recent output in the subtree at `id`: the node's own output,
    /// else that of its last child, recursively.
    pub fn last_output(&self, id: NodeId) -> Option<StepIo> {
        let step = self.tree.step(id)?;
        if let Some(output) = step.output.as_ref().filter(|o| !is_blank(o)) {
            return Some(output.clone());
        }
        let last = self.tree.children(id).last()?;
        self.last_output(*last)
    }

    /// Export the buffered traces in creation order.
    pub fn traces(&self) -> Result<Vec<TraceRecord>> {
        self.traces.iter().map(|&id| self.tree.export(id)).collect()
    }

    /// Export the buffered traces and reset to the empty state.
    pub fn take_traces(&mut self) -> Result<Vec<TraceRecord>> {
        let records = self.traces()?;
        self.reset();
        Ok(records)
    }

    /// Drop every buffered trace and any open node.
    pub fn reset(&mut self) {
        self.tree.clear();
        self.traces.clear();
        self.parent_stack.clear();
    }

    fn require_parent(&self) -> Result<NodeId> {
        self.current_parent().ok_or_else(|| {
            GalileoError::InvalidState(
                "A trace needs to be created in order to add a span".to_string(),
            )
        })
    }

    /// Abandon the trace being built after a structural invariant broke.
    fn abort_session(&mut self, root: NodeId, reason: &str) -> GalileoError {
        error!(reason, "Trace tree corrupted, discarding the open trace");
        self.parent_stack.clear();
        self.traces.retain(|&t| t != root);
        GalileoError::CorruptedTree(reason.to_string())
    }
}

fn is_blank(io: &StepIo) -> bool {
    matches!(io, StepIo::Text(text) if text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Document;

    fn open_trace() -> (TracesLogger, NodeId) {
        let mut logger = TracesLogger::new();
        let trace = logger.add_trace(TraceParams::new("hi")).unwrap();
        (logger, trace)
    }

    #[test]
    fn test_new_builder_is_empty() {
        let logger = TracesLogger::new();
        assert!(!logger.is_open());
        assert_eq!(logger.depth(), 0);
        assert_eq!(logger.current_parent(), None);
        assert_eq!(logger.trace_count(), 0);
    }

    #[test]
    fn test_out_of_range_created_at_rejected_at_construction() {
        let far_future = chrono::DateTime::parse_from_rfc3339("2300-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let mut logger = TracesLogger::new();

        let result = logger.add_trace(TraceParams {
            created_at: Some(far_future),
            ..TraceParams::new("hi")
        });

        assert!(matches!(result, Err(GalileoError::ValidationError(_))));
        assert!(!logger.is_open());
        assert_eq!(logger.trace_count(), 0);
    }

    #[test]
    fn test_add_trace_twice_fails() {
        let (mut logger, _) = open_trace();
        let result = logger.add_trace(TraceParams::new("again"));
        assert!(matches!(result, Err(GalileoError::InvalidState(_))));
        assert_eq!(logger.trace_count(), 1);
    }

    #[test]
    fn test_spans_require_open_trace() {
        let mut logger = TracesLogger::new();

        assert!(matches!(
            logger.add_llm_span(LlmSpanParams::new("q", "a", "m")),
            Err(GalileoError::InvalidState(_))
        ));
        assert!(matches!(
            logger.add_retriever_span(RetrieverSpanParams::new("q", vec!["d"])),
            Err(GalileoError::InvalidState(_))
        ));
        assert!(matches!(
            logger.add_tool_span(ToolSpanParams::new("i", "o")),
            Err(GalileoError::InvalidState(_))
        ));
        assert!(matches!(
            logger.add_workflow_span(WorkflowSpanParams::new("w")),
            Err(GalileoError::InvalidState(_))
        ));
        assert!(matches!(
            logger.add_agent_span(WorkflowSpanParams::new("a")),
            Err(GalileoError::InvalidState(_))
        ));
        assert!(matches!(
            logger.conclude(ConcludeParams::default()),
            Err(GalileoError::InvalidState(_))
        ));
    }

    #[test]
    fn test_leaf_spans_do_not_change_depth() {
        let (mut logger, trace) = open_trace();

        let llm = logger.add_llm_span(LlmSpanParams::new("q", "a", "m")).unwrap();
        let tool = logger.add_tool_span(ToolSpanParams::new("i", "o")).unwrap();

        assert_eq!(logger.depth(), 1);
        assert_eq!(logger.current_parent(), Some(trace));
        assert_eq!(logger.children(trace), &[llm, tool]);
        assert_eq!(logger.parent(llm), Some(trace));
    }

    #[test]
    fn test_workflow_and_agent_push_scope() {
        let (mut logger, trace) = open_trace();

        let workflow = logger.add_workflow_span(WorkflowSpanParams::new("w")).unwrap();
        assert_eq!(logger.depth(), 2);
        assert_eq!(logger.current_parent(), Some(workflow));

        let agent = logger.add_agent_span(WorkflowSpanParams::new("a")).unwrap();
        assert_eq!(logger.depth(), 3);
        assert_eq!(logger.parent(agent), Some(workflow));

        assert_eq!(logger.conclude(ConcludeParams::default()).unwrap(), Some(workflow));
        assert_eq!(logger.conclude(ConcludeParams::default()).unwrap(), Some(trace));
        assert_eq!(logger.conclude(ConcludeParams::default()).unwrap(), None);
        assert!(!logger.is_open());
    }

    #[test]
    fn test_concluding_root_empties_builder() {
        let (mut logger, _) = open_trace();

        assert_eq!(logger.conclude(ConcludeParams::default()).unwrap(), None);
        assert!(!logger.is_open());
        assert!(matches!(
            logger.add_llm_span(LlmSpanParams::new("q", "a", "m")),
            Err(GalileoError::InvalidState(_))
        ));
        assert!(logger.add_trace(TraceParams::new("next")).is_ok());
        assert_eq!(logger.trace_count(), 2);
    }

    #[test]
    fn test_conclude_output_leaves_input_unchanged() {
        let (mut logger, trace) = open_trace();

        logger.conclude(ConcludeParams::with_output("x")).unwrap();

        let step = logger.step(trace).unwrap();
        assert_eq!(step.input, StepIo::from("hi"));
        assert_eq!(step.output, Some(StepIo::from("x")));
    }

    #[test]
    fn test_reset_status_policy_clears_status_code() {
        let mut logger = TracesLogger::with_status_policy(StatusCodeOnConclude::Reset);
        let trace = logger.add_trace(TraceParams::new("hi")).unwrap();
        logger.step_mut(trace).unwrap().status_code = Some(200);

        logger.conclude(ConcludeParams::default()).unwrap();
        assert_eq!(logger.step(trace).unwrap().status_code, None);
    }

    #[test]
    fn test_single_span_trace() {
        let mut logger = TracesLogger::new();
        let trace = logger
            .add_single_span_trace(LlmSpanParams {
                num_input_tokens: Some(4),
                ..LlmSpanParams::new("question", "answer", "gpt-4o")
            })
            .unwrap();

        assert!(!logger.is_open());
        assert_eq!(logger.trace_count(), 1);
        let children = logger.children(trace);
        assert_eq!(children.len(), 1);

        let llm = logger.step(children[0]).unwrap();
        assert_eq!(llm.step_type, StepType::Llm);
        assert_eq!(llm.llm.as_ref().unwrap().num_input_tokens, Some(4));

        let root = logger.step(trace).unwrap();
        assert_eq!(root.input, StepIo::from("question"));
        assert_eq!(root.output, Some(StepIo::from("answer")));
    }

    #[test]
    fn test_single_span_trace_rejected_while_open() {
        let (mut logger, _) = open_trace();
        let result = logger.add_single_span_trace(LlmSpanParams::new("q", "a", "m"));
        assert!(matches!(result, Err(GalileoError::InvalidState(_))));
        assert_eq!(logger.trace_count(), 1);
    }

    #[test]
    fn test_single_span_trace_invalid_llm_leaves_no_trace() {
        let mut logger = TracesLogger::new();
        let result = logger.add_single_span_trace(LlmSpanParams {
            temperature: Some(f64::INFINITY),
            ..LlmSpanParams::new("q", "a", "m")
        });
        assert!(matches!(result, Err(GalileoError::ValidationError(_))));
        assert_eq!(logger.trace_count(), 0);
    }

    #[test]
    fn test_full_scenario_tree_shape() {
        let mut logger = TracesLogger::new();
        logger.add_trace(TraceParams::new("hi")).unwrap();
        logger.add_llm_span(LlmSpanParams::new("hi", "hello", "m")).unwrap();
        logger.add_workflow_span(WorkflowSpanParams::new("sub")).unwrap();
        logger.add_tool_span(ToolSpanParams::new("t-in", "t-out")).unwrap();
        logger.conclude(ConcludeParams::default()).unwrap();
        let top = logger.conclude(ConcludeParams::with_output("final")).unwrap();

        assert_eq!(top, None);
        assert!(!logger.is_open());

        let traces = logger.traces().unwrap();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.step.output, Some(StepIo::from("final")));
        assert_eq!(trace.spans.len(), 2);
        assert_eq!(trace.spans[0].step.step_type, StepType::Llm);

        let workflow = &trace.spans[1];
        assert_eq!(workflow.step.step_type, StepType::Workflow);
        assert!(workflow.step.output.is_none());
        let inner = workflow.spans.as_ref().unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].step.step_type, StepType::Tool);
        assert_eq!(inner[0].step.output, Some(StepIo::from("t-out")));
    }

    #[test]
    fn test_retriever_span_from_strings() {
        let (mut logger, _) = open_trace();
        let id = logger
            .add_retriever_span(RetrieverSpanParams::new("query", vec!["doc1", "doc2"]))
            .unwrap();

        let step = logger.step(id).unwrap();
        assert_eq!(
            step.output,
            Some(StepIo::Documents(vec![Document::new("doc1"), Document::new("doc2")]))
        );
    }

    #[test]
    fn test_invalid_retriever_output_is_not_attached() {
        let (mut logger, trace) = open_trace();
        let result = logger.add_retriever_span(RetrieverSpanParams::new(
            "query",
            serde_json::json!([1, 2]),
        ));

        assert!(matches!(result, Err(GalileoError::ValidationError(_))));
        assert!(logger.children(trace).is_empty());
    }

    #[test]
    fn test_orphaned_workflow_is_corruption() {
        let (mut logger, _) = open_trace();
        let workflow = logger.add_workflow_span(WorkflowSpanParams::new("w")).unwrap();

        // Simulate the stack losing the trace root below the workflow.
        logger.parent_stack = vec![workflow];

        let result = logger.conclude(ConcludeParams::default());
        assert!(matches!(result, Err(GalileoError::CorruptedTree(_))));
        assert!(!logger.is_open());
        assert_eq!(logger.trace_count(), 1);
    }

    #[test]
    fn test_broken_parent_link_is_corruption() {
        let (mut logger, trace) = open_trace();
        let workflow = logger.add_workflow_span(WorkflowSpanParams::new("w")).unwrap();
        logger.tree.set_parent(workflow, None);

        let result = logger.conclude(ConcludeParams::default());
        assert!(matches!(result, Err(GalileoError::CorruptedTree(_))));
        assert!(!logger.is_open());
        assert!(!logger.trace_ids().contains(&trace));
    }

    #[test]
    fn test_conclude_all() {
        let (mut logger, trace) = open_trace();
        logger.add_workflow_span(WorkflowSpanParams::new("w")).unwrap();
        logger.add_agent_span(WorkflowSpanParams::new("a")).unwrap();

        logger.conclude_all(ConcludeParams::with_output("done")).unwrap();

        assert!(!logger.is_open());
        assert_eq!(logger.step(trace).unwrap().output, Some(StepIo::from("done")));
    }

    #[test]
    fn test_last_output_walks_to_latest_child() {
        let (mut logger, trace) = open_trace();
        logger.add_llm_span(LlmSpanParams::new("q", "first", "m")).unwrap();
        logger.add_workflow_span(WorkflowSpanParams::new("w")).unwrap();
        logger.add_tool_span(ToolSpanParams::new("i", "latest")).unwrap();

        assert_eq!(logger.last_output(trace), Some(StepIo::from("latest")));
    }

    #[test]
    fn test_last_output_none_for_empty_trace() {
        let (logger, trace) = open_trace();
        assert_eq!(logger.last_output(trace), None);
    }

    #[test]
    fn test_take_traces_resets() {
        let mut logger = TracesLogger::new();
        for i in 0..3 {
            logger.add_trace(TraceParams::new(format!("t{}", i))).unwrap();
            logger.conclude(ConcludeParams::default()).unwrap();
        }

        let records = logger.take_traces().unwrap();
        let inputs: Vec<_> = records.iter().map(|r| r.step.input.to_text()).collect();
        assert_eq!(inputs, vec!["t0", "t1", "t2"]);
        assert_eq!(logger.trace_count(), 0);
        assert!(!logger.is_open());
    }

    #[test]
    fn test_protect_span_is_tool_child() {
        use crate::schema::{Payload, Response, TraceMetadata};

        let (mut logger, trace) = open_trace();
        let id = logger
            .add_protect_span(ProtectSpanParams::new(
                Payload {
                    input: Some("hi".to_string()),
                    output: None,
                },
                Response {
                    text: "hi".to_string(),
                    status: None,
                    trace_metadata: TraceMetadata {
                        id: None,
                        received_at_ns: 10,
                        response_at_ns: 30,
                    },
                },
            ))
            .unwrap();

        assert_eq!(logger.children(trace), &[id]);
        let step = logger.step(id).unwrap();
        assert_eq!(step.step_type, StepType::Tool);
        assert_eq!(step.name, "GalileoProtect");
        assert_eq!(step.duration_ns, Some(20));
    }
}
