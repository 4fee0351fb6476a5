pub mod error;
pub mod logger;
pub mod schema;
pub mod sink;
pub mod traces;

pub use error::{GalileoError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{GalileoError, Result};
    pub use crate::logger::{GalileoLogger, LoggerConfig, SinkFailurePolicy};
    pub use crate::schema::{Document, Message, MessageRole, StepIo, StepType, TraceRecord};
    pub use crate::sink::{GalileoApiClient, IngestionSink, MemorySink};
    pub use crate::traces::{
        ConcludeParams, LlmSpanParams, RetrieverSpanParams, ToolSpanParams, TraceParams,
        TracesLogger, WorkflowSpanParams,
    };
}
