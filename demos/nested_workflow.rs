use galileo::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("galileo=debug")),
        )
        .init();

    // Send to Galileo when credentials are available, otherwise keep traces in memory
    let sink: Arc<dyn IngestionSink> = match GalileoApiClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            println!("{}; keeping traces in memory", e);
            Arc::new(MemorySink::new())
        }
    };

    let config = LoggerConfig {
        project: Some("demo-project".to_string()),
        log_stream: Some("nested-workflow".to_string()),
        ..LoggerConfig::from_env()
    };
    let mut logger = GalileoLogger::new(config, sink)?;

    logger.start_trace(TraceParams {
        tags: vec!["demo".to_string()],
        ..TraceParams::new("Plan a weekend in Lisbon")
    })?;

    logger.add_agent_span(WorkflowSpanParams {
        name: Some("planner".to_string()),
        ..WorkflowSpanParams::new("Plan a weekend in Lisbon")
    })?;
    logger.add_llm_span(LlmSpanParams::new(
        "Plan a weekend in Lisbon",
        "Call the weather tool first.",
        "gpt-4o",
    ))?;
    logger.add_tool_span(ToolSpanParams {
        name: Some("weather".to_string()),
        tool_call_id: Some("call-1".to_string()),
        ..ToolSpanParams::new(r#"{"city":"Lisbon"}"#, r#"{"forecast":"sunny"}"#)
    })?;

    logger.add_workflow_span(WorkflowSpanParams {
        name: Some("itinerary".to_string()),
        ..WorkflowSpanParams::new("sunny weekend")
    })?;
    logger.add_llm_span(LlmSpanParams::new(
        "Draft an itinerary for a sunny weekend",
        "Day 1: Belem. Day 2: Alfama.",
        "gpt-4o",
    ))?;

    // Leave the workflow, agent and trace open; flush concludes them
    let flushed = logger.flush().await?;
    for trace in &flushed {
        println!(
            "Trace '{}' with {} steps, output: {}",
            trace.step.name,
            trace.step_count(),
            trace.step.output.as_ref().map(StepIo::to_text).unwrap_or_default()
        );
    }

    logger.terminate().await;
    Ok(())
}
