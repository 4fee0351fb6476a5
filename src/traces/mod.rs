//! Building trace trees: the node arena, the per-operation parameter records,
//! and the stack-driven builder on top of them.

pub mod params;
pub mod traces_logger;
pub mod tree;

pub use params::{
    ConcludeParams, LlmSpanParams, ProtectSpanParams, RetrieverSpanParams, ToolSpanParams,
    TraceParams, WorkflowSpanParams,
};
pub use traces_logger::TracesLogger;
pub use tree::{NodeId, SpanTree, StatusCodeOnConclude};
