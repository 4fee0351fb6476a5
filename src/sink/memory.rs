//! In-process sink that keeps every ingested batch.

use crate::error::{GalileoError, Result};
use crate::schema::TraceRecord;
use crate::sink::{IngestAck, IngestionSink};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Identity passed to one `init` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCall {
    pub project: String,
    pub dataset_id: Option<String>,
    pub log_stream: String,
}

/// Sink storing batches in memory, for tests and local inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<TraceRecord>>>,
    init_calls: Mutex<Vec<InitCall>>,
    failure: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `ingest` always fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn batches(&self) -> Vec<Vec<TraceRecord>> {
        self.batches.lock().await.clone()
    }

    /// Every trace received, across batches, in arrival order.
    pub async fn traces(&self) -> Vec<TraceRecord> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    pub async fn init_calls(&self) -> Vec<InitCall> {
        self.init_calls.lock().await.clone()
    }
}

#[async_trait]
impl IngestionSink for MemorySink {
    async fn init(&self, project: &str, dataset_id: Option<&str>, log_stream: &str) -> Result<()> {
        self.init_calls.lock().await.push(InitCall {
            project: project.to_string(),
            dataset_id: dataset_id.map(str::to_string),
            log_stream: log_stream.to_string(),
        });
        Ok(())
    }

    async fn ingest(&self, traces: &[TraceRecord]) -> Result<IngestAck> {
        if let Some(message) = &self.failure {
            return Err(GalileoError::ApiError(message.clone()));
        }
        debug!(count = traces.len(), "Storing batch in memory");
        self.batches.lock().await.push(traces.to_vec());
        Ok(IngestAck {
            traces_count: traces.len(),
            ..Default::default()
        })
    }
}
