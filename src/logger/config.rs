//! Logger identity and failure policies.

use crate::error::{GalileoError, Result};
use crate::traces::StatusCodeOnConclude;
use tracing::debug;

pub const PROJECT_ENV: &str = "GALILEO_PROJECT";
pub const LOG_STREAM_ENV: &str = "GALILEO_LOG_STREAM";

/// What `flush` does when the ingestion sink fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkFailurePolicy {
    /// Log the error and report an empty flush
    #[default]
    Swallow,
    /// Return the sink error to the caller
    Propagate,
}

/// Settings for a [`GalileoLogger`](crate::logger::GalileoLogger)
///
/// `project` and `log_stream` left as `None` fall back to the environment.
#[derive(Debug, Clone, Default)]
pub struct LoggerConfig {
    pub project: Option<String>,
    pub log_stream: Option<String>,
    pub dataset_id: Option<String>,
    pub on_sink_failure: SinkFailurePolicy,
    pub status_code_on_conclude: StatusCodeOnConclude,
}

/// Resolved routing identity of a logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerIdentity {
    pub project: String,
    pub log_stream: String,
    pub dataset_id: Option<String>,
}

impl LoggerConfig {
    pub fn new(project: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            log_stream: Some(log_stream.into()),
            ..Default::default()
        }
    }

    /// Empty config after loading a `.env` file, if one exists.
    pub fn from_env() -> Self {
        if dotenv::dotenv().is_ok() {
            debug!("Loaded .env file");
        }
        Self::default()
    }

    pub fn with_sink_failure_policy(mut self, policy: SinkFailurePolicy) -> Self {
        self.on_sink_failure = policy;
        self
    }

    pub fn with_status_policy(mut self, policy: StatusCodeOnConclude) -> Self {
        self.status_code_on_conclude = policy;
        self
    }

    /// Resolve the identity from explicit values, then process environment.
    pub fn resolve(&self) -> Result<LoggerIdentity> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve the identity using `lookup` for anything not set explicitly.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<LoggerIdentity>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: &Option<String>, key: &str| {
            explicit
                .clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(key))
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    GalileoError::ConfigError(format!(
                        "No {} given and {} is not set",
                        key.trim_start_matches("GALILEO_").to_lowercase(),
                        key
                    ))
                })
        };

        Ok(LoggerIdentity {
            project: pick(&self.project, PROJECT_ENV)?,
            log_stream: pick(&self.log_stream, LOG_STREAM_ENV)?,
            dataset_id: self.dataset_id.clone(),
        })
    }
}
