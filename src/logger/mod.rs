//! Logger facade: a tree builder bound to a routing identity and a sink.

pub mod config;

pub use config::{LoggerConfig, LoggerIdentity, SinkFailurePolicy};

use crate::error::Result;
use crate::schema::{Step, TraceRecord};
use crate::sink::IngestionSink;
use crate::traces::{
    ConcludeParams, LlmSpanParams, NodeId, ProtectSpanParams, RetrieverSpanParams,
    ToolSpanParams, TraceParams, TracesLogger, WorkflowSpanParams,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Buffers traces and ships them to an [`IngestionSink`] on `flush`
///
/// One logger per logical trace session. Sharing a logger across concurrent
/// executions requires external synchronization.
pub struct GalileoLogger {
    identity: LoggerIdentity,
    on_sink_failure: SinkFailurePolicy,
    builder: TracesLogger,
    sink: Arc<dyn IngestionSink>,
}

impl GalileoLogger {
    /// Fails with `ConfigError` when project or log stream cannot be resolved.
    pub fn new(config: LoggerConfig, sink: Arc<dyn IngestionSink>) -> Result<Self> {
        let identity = config.resolve()?;
        Ok(Self::with_identity(identity, &config, sink))
    }

    /// Logger whose identity comes entirely from the environment (and `.env`).
    pub fn from_env(sink: Arc<dyn IngestionSink>) -> Result<Self> {
        Self::new(LoggerConfig::from_env(), sink)
    }

    fn with_identity(
        identity: LoggerIdentity,
        config: &LoggerConfig,
        sink: Arc<dyn IngestionSink>,
    ) -> Self {
        info!(
            project = %identity.project,
            log_stream = %identity.log_stream,
            "Galileo logger ready"
        );
        Self {
            identity,
            on_sink_failure: config.on_sink_failure,
            builder: TracesLogger::with_status_policy(config.status_code_on_conclude),
            sink,
        }
    }

    pub fn identity(&self) -> &LoggerIdentity {
        &self.identity
    }

    /// Read access to the underlying tree builder.
    pub fn builder(&self) -> &TracesLogger {
        &self.builder
    }

    pub fn start_trace(&mut self, params: TraceParams) -> Result<NodeId> {
        self.builder.add_trace(params)
    }

    pub fn add_single_span_trace(&mut self, params: LlmSpanParams) -> Result<NodeId> {
        self.builder.add_single_span_trace(params)
    }

    pub fn add_llm_span(&mut self, params: LlmSpanParams) -> Result<NodeId> {
        self.builder.add_llm_span(params)
    }

    pub fn add_retriever_span(&mut self, params: RetrieverSpanParams) -> Result<NodeId> {
        self.builder.add_retriever_span(params)
    }

    pub fn add_tool_span(&mut self, params: ToolSpanParams) -> Result<NodeId> {
        self.builder.add_tool_span(params)
    }

    pub fn add_protect_span(&mut self, params: ProtectSpanParams) -> Result<NodeId> {
        self.builder.add_protect_span(params)
    }

    pub fn add_workflow_span(&mut self, params: WorkflowSpanParams) -> Result<NodeId> {
        self.builder.add_workflow_span(params)
    }

    pub fn add_agent_span(&mut self, params: WorkflowSpanParams) -> Result<NodeId> {
        self.builder.add_agent_span(params)
    }

    pub fn conclude(&mut self, params: ConcludeParams) -> Result<Option<NodeId>> {
        self.builder.conclude(params)
    }

    pub fn conclude_all(&mut self, params: ConcludeParams) -> Result<()> {
        self.builder.conclude_all(params)
    }

    pub fn current_parent(&self) -> Option<NodeId> {
        self.builder.current_parent()
    }

    pub fn step(&self, id: NodeId) -> Option<&Step> {
        self.builder.step(id)
    }

    pub fn step_mut(&mut self, id: NodeId) -> Option<&mut Step> {
        self.builder.step_mut(id)
    }

    /// Export the buffered traces without clearing them.
    pub fn traces(&self) -> Result<Vec<TraceRecord>> {
        self.builder.traces()
    }

    /// Send every buffered trace to the sink in one batch.
    ///
    /// A still-open trace is concluded first with the latest output found in
    /// its open subtree. The buffer is cleared only once the sink accepts the
    /// batch; on sink failure the traces stay buffered and, under
    /// [`SinkFailurePolicy::Swallow`], an empty list is returned.
    pub async fn flush(&mut self) -> Result<Vec<TraceRecord>> {
        if self.builder.trace_count() == 0 {
            warn!("No traces to flush");
            return Ok(Vec::new());
        }

        if let Some(current) = self.builder.current_parent() {
            info!("Concluding the open trace before flushing");
            let output = self.builder.last_output(current);
            self.builder.conclude_all(ConcludeParams {
                output,
                ..Default::default()
            })?;
        }

        let records = self.builder.traces()?;
        info!(count = records.len(), "Flushing traces");

        match self.send(&records).await {
            Ok(()) => {
                self.builder.reset();
                Ok(records)
            }
            Err(e) => match self.on_sink_failure {
                SinkFailurePolicy::Swallow => {
                    error!("Failed to flush traces: {}", e);
                    Ok(Vec::new())
                }
                SinkFailurePolicy::Propagate => Err(e),
            },
        }
    }

    /// Final flush before shutdown; failures are logged, never returned.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.flush().await {
            error!("Failed to flush traces on terminate: {}", e);
        }
    }

    async fn send(&self, records: &[TraceRecord]) -> Result<()> {
        self.sink
            .init(
                &self.identity.project,
                self.identity.dataset_id.as_deref(),
                &self.identity.log_stream,
            )
            .await?;
        let ack = self.sink.ingest(records).await?;
        info!(traces = ack.traces_count, "Traces ingested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalileoError;
    use crate::schema::{StepIo, StepType};
    use crate::sink::MemorySink;

    fn logger_with(sink: Arc<MemorySink>) -> GalileoLogger {
        GalileoLogger::new(LoggerConfig::new("proj", "stream"), sink).unwrap()
    }

    #[tokio::test]
    async fn test_flush_without_traces_is_noop() {
        let sink = Arc::new(MemorySink::new());
        let mut logger = logger_with(sink.clone());

        let flushed = logger.flush().await.unwrap();

        assert!(flushed.is_empty());
        assert!(sink.init_calls().await.is_empty());
        assert!(sink.batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_sends_all_traces_in_order() {
        let sink = Arc::new(MemorySink::new());
        let mut logger = logger_with(sink.clone());
        for i in 0..3 {
            logger.start_trace(TraceParams::new(format!("t{}", i))).unwrap();
            logger.conclude(ConcludeParams::default()).unwrap();
        }

        let flushed = logger.flush().await.unwrap();

        assert_eq!(flushed.len(), 3);
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        let inputs: Vec<_> = batches[0].iter().map(|t| t.step.input.to_text()).collect();
        assert_eq!(inputs, vec!["t0", "t1", "t2"]);

        assert_eq!(logger.builder().trace_count(), 0);
        assert!(!logger.builder().is_open());

        let init = &sink.init_calls().await[0];
        assert_eq!(init.project, "proj");
        assert_eq!(init.log_stream, "stream");
    }

    #[tokio::test]
    async fn test_flush_concludes_open_trace_with_last_output() {
        let sink = Arc::new(MemorySink::new());
        let mut logger = logger_with(sink.clone());
        logger.start_trace(TraceParams::new("q")).unwrap();
        logger.add_workflow_span(WorkflowSpanParams::new("w")).unwrap();
        logger
            .add_llm_span(LlmSpanParams::new("q", "answer", "m"))
            .unwrap();

        let flushed = logger.flush().await.unwrap();

        assert_eq!(flushed.len(), 1);
        let trace = &flushed[0];
        assert_eq!(trace.step.output, Some(StepIo::from("answer")));
        assert_eq!(trace.spans[0].step.step_type, StepType::Workflow);
        assert_eq!(trace.spans[0].step.output, Some(StepIo::from("answer")));
        assert!(!logger.builder().is_open());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed_by_default() {
        let sink = Arc::new(MemorySink::failing("ingestion down"));
        let mut logger = logger_with(sink.clone());
        logger
            .add_single_span_trace(LlmSpanParams::new("q", "a", "m"))
            .unwrap();

        let flushed = logger.flush().await.unwrap();

        assert!(flushed.is_empty());
        assert_eq!(logger.builder().trace_count(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_propagates_when_configured() {
        let sink = Arc::new(MemorySink::failing("ingestion down"));
        let config = LoggerConfig::new("proj", "stream")
            .with_sink_failure_policy(SinkFailurePolicy::Propagate);
        let mut logger = GalileoLogger::new(config, sink).unwrap();
        logger
            .add_single_span_trace(LlmSpanParams::new("q", "a", "m"))
            .unwrap();

        let result = logger.flush().await;

        match result {
            Err(e) => assert!(e.is_sink_error()),
            Ok(_) => panic!("expected the sink error"),
        }
    }

    #[tokio::test]
    async fn test_terminate_never_fails() {
        let sink = Arc::new(MemorySink::failing("ingestion down"));
        let config = LoggerConfig::new("proj", "stream")
            .with_sink_failure_policy(SinkFailurePolicy::Propagate);
        let mut logger = GalileoLogger::new(config, sink).unwrap();
        logger.start_trace(TraceParams::new("q")).unwrap();

        logger.terminate().await;
    }

    #[test]
    fn test_missing_identity_fails_construction() {
        let sink = Arc::new(MemorySink::new());
        let config = LoggerConfig {
            project: Some(String::new()),
            log_stream: Some("stream".to_string()),
            ..Default::default()
        };

        let result = GalileoLogger::new(config, sink);
        assert!(matches!(result, Err(GalileoError::ConfigError(_))));
    }

    #[test]
    fn test_builder_errors_reach_caller() {
        let mut logger = logger_with(Arc::new(MemorySink::new()));
        logger.start_trace(TraceParams::new("q")).unwrap();

        assert!(matches!(
            logger.start_trace(TraceParams::new("again")),
            Err(GalileoError::InvalidState(_))
        ));
    }
}
