use galileo::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let sink = Arc::new(MemorySink::new());
    let mut logger = GalileoLogger::new(LoggerConfig::new("demo-project", "default"), sink.clone())?;

    // A single LLM call, recorded as a complete trace
    logger.add_single_span_trace(LlmSpanParams {
        num_input_tokens: Some(12),
        num_output_tokens: Some(9),
        total_tokens: Some(21),
        ..LlmSpanParams::new(
            vec![Message::user("Explain what Rust is in one sentence.")],
            "Rust is a systems language focused on safety and speed.",
            "gpt-4o",
        )
    })?;

    // A retrieval-augmented answer built step by step
    logger.start_trace(TraceParams::new("Who wrote Dune?"))?;
    logger.add_retriever_span(RetrieverSpanParams::new(
        "Who wrote Dune?",
        vec!["Dune is a 1965 novel by Frank Herbert."],
    ))?;
    logger.add_llm_span(LlmSpanParams::new(
        "Who wrote Dune?",
        "Frank Herbert.",
        "gpt-4o",
    ))?;
    logger.conclude(ConcludeParams::with_output("Frank Herbert."))?;

    let flushed = logger.flush().await?;
    println!("Flushed {} traces", flushed.len());
    for trace in sink.traces().await {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    }

    Ok(())
}
