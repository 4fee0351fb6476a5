//! Value types carried by trace trees.

pub mod document;
pub mod message;
pub mod protect;
pub mod step;

pub use document::{Document, MetadataValue, RetrieverOutput};
pub use message::{Message, MessageRole, ToolCall};
pub use protect::{Payload, Response, TraceMetadata};
pub use step::{LlmDetails, SpanRecord, Step, StepIo, StepType, TraceRecord};
