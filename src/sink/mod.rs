//! Destinations for finished traces.

pub mod http;
pub mod memory;

use crate::error::Result;
use crate::schema::TraceRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::{GalileoApiClient, GalileoApiConfig};
pub use memory::MemorySink;

/// Acknowledgement returned by a sink after accepting a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestAck {
    #[serde(default)]
    pub traces_count: usize,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub log_stream_id: Option<String>,
}

/// Receives exported traces from a logger
///
/// `init` is called before every `ingest` with the identity the logger was
/// configured for. Sinks are expected to make repeated `init` calls cheap.
#[async_trait]
pub trait IngestionSink: Send + Sync {
    async fn init(&self, project: &str, dataset_id: Option<&str>, log_stream: &str) -> Result<()>;

    async fn ingest(&self, traces: &[TraceRecord]) -> Result<IngestAck>;
}
