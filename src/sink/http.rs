//! Sink posting traces to the Galileo REST API.

use crate::error::{GalileoError, Result};
use crate::schema::TraceRecord;
use crate::sink::{IngestAck, IngestionSink};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

const CLIENT_VERSION: &str = concat!("galileo-rust/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the Galileo API.
#[derive(Debug, Clone)]
pub struct GalileoApiConfig {
    pub api_key: String,
    pub api_url: String,
    pub timeout: Option<std::time::Duration>,
}

impl Default for GalileoApiConfig {
    fn default() -> Self {
        let api_url = std::env::var("GALILEO_API_URL").unwrap_or_else(|_| {
            let console = std::env::var("GALILEO_CONSOLE_URL")
                .unwrap_or_else(|_| "https://app.galileo.ai".to_string());
            api_url_from_console(&console)
        });
        Self {
            api_key: std::env::var("GALILEO_API_KEY").unwrap_or_default(),
            api_url,
            timeout: None,
        }
    }
}

/// Derive the API base URL from a console URL.
pub fn api_url_from_console(console_url: &str) -> String {
    let trimmed = console_url.trim_end_matches('/');
    if trimmed.contains("localhost") || trimmed.contains("127.0.0.1") {
        "http://localhost:8088".to_string()
    } else if trimmed.contains("console") {
        trimmed.replacen("console", "api", 1)
    } else {
        format!("{}/api/galileo", trimmed)
    }
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct TracesIngestRequest<'a> {
    log_stream_id: &'a str,
    traces: &'a [TraceRecord],
    logging_method: &'static str,
    client_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dataset_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
struct IngestContext {
    project: String,
    log_stream: String,
    dataset_id: Option<String>,
    project_id: String,
    log_stream_id: String,
}

/// HTTP ingestion sink
///
/// `init` resolves the project and log stream names to ids, creating either
/// one when missing, and caches the result until a different identity is
/// requested. Requests are not retried.
pub struct GalileoApiClient {
    client: Client,
    config: GalileoApiConfig,
    context: RwLock<Option<IngestContext>>,
}

impl GalileoApiClient {
    /// Client configured from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(GalileoApiConfig::default())
    }

    pub fn with_config(config: GalileoApiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(GalileoError::ConfigError(
                "GALILEO_API_KEY must be set to send traces to Galileo".to_string(),
            ));
        }

        let mut client_builder = Client::builder();
        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }
        let client = client_builder.build()?;

        Ok(Self {
            client,
            config,
            context: RwLock::new(None),
        })
    }

    /// Client for an explicit endpoint and key.
    pub fn with_api_key_and_url(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self> {
        Self::with_config(GalileoApiConfig {
            api_key: api_key.into(),
            api_url: api_url.into(),
            timeout: None,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    pub async fn healthcheck(&self) -> Result<()> {
        let response = self.request(self.client.get(self.url("/healthcheck"))).await?;
        check_status(response, "Healthcheck").await?;
        Ok(())
    }

    /// Resolve a project id by name, creating the project when none exists.
    pub async fn get_or_create_project(&self, name: &str) -> Result<String> {
        let response = self
            .request(
                self.client
                    .get(self.url("/projects"))
                    .query(&[("project_name", name), ("type", "gen_ai")]),
            )
            .await?;
        let projects: Vec<NamedEntity> =
            check_status(response, "Project lookup").await?.json().await?;
        if let Some(project) = projects.into_iter().find(|p| p.name == name) {
            debug!(project = name, id = %project.id, "Found project");
            return Ok(project.id);
        }

        info!(project = name, "Creating project");
        let response = self
            .request(
                self.client
                    .post(self.url("/projects"))
                    .json(&json!({"name": name, "type": "gen_ai"})),
            )
            .await?;
        let project: NamedEntity = check_status(response, "Project creation").await?.json().await?;
        Ok(project.id)
    }

    /// Resolve a log stream id by name within a project, creating it when missing.
    pub async fn get_or_create_log_stream(&self, project_id: &str, name: &str) -> Result<String> {
        let path = format!("/projects/{}/log_streams", project_id);
        let response = self.request(self.client.get(self.url(&path))).await?;
        let streams: Vec<NamedEntity> =
            check_status(response, "Log stream lookup").await?.json().await?;
        if let Some(stream) = streams.into_iter().find(|s| s.name == name) {
            debug!(log_stream = name, id = %stream.id, "Found log stream");
            return Ok(stream.id);
        }

        info!(log_stream = name, "Creating log stream");
        let response = self
            .request(self.client.post(self.url(&path)).json(&json!({"name": name})))
            .await?;
        let stream: NamedEntity = check_status(response, "Log stream creation").await?.json().await?;
        Ok(stream.id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn request(&self, builder: RequestBuilder) -> Result<Response> {
        Ok(builder
            .header("Galileo-API-Key", &self.config.api_key)
            .header("X-Galileo-SDK", CLIENT_VERSION)
            .send()
            .await?)
    }
}

#[async_trait]
impl IngestionSink for GalileoApiClient {
    async fn init(&self, project: &str, dataset_id: Option<&str>, log_stream: &str) -> Result<()> {
        {
            let context = self.context.read().await;
            if let Some(ctx) = context.as_ref() {
                if ctx.project == project
                    && ctx.log_stream == log_stream
                    && ctx.dataset_id.as_deref() == dataset_id
                {
                    return Ok(());
                }
            }
        }

        self.healthcheck().await?;
        let project_id = self.get_or_create_project(project).await?;
        let log_stream_id = self.get_or_create_log_stream(&project_id, log_stream).await?;

        *self.context.write().await = Some(IngestContext {
            project: project.to_string(),
            log_stream: log_stream.to_string(),
            dataset_id: dataset_id.map(str::to_string),
            project_id,
            log_stream_id,
        });
        Ok(())
    }

    async fn ingest(&self, traces: &[TraceRecord]) -> Result<IngestAck> {
        let ctx = self.context.read().await.clone().ok_or_else(|| {
            GalileoError::InvalidState("Galileo API client used before init".to_string())
        })?;

        let body = TracesIngestRequest {
            log_stream_id: &ctx.log_stream_id,
            traces,
            logging_method: "api_direct",
            client_version: CLIENT_VERSION,
            dataset_id: ctx.dataset_id.as_deref(),
        };

        info!(count = traces.len(), project = %ctx.project, "Sending traces to Galileo");
        let path = format!("/projects/{}/traces", ctx.project_id);
        let response = self.request(self.client.post(self.url(&path)).json(&body)).await?;
        let mut ack: IngestAck = check_status(response, "Trace ingestion").await?.json().await?;
        if ack.traces_count == 0 {
            ack.traces_count = traces.len();
        }
        ack.project_id.get_or_insert(ctx.project_id);
        ack.log_stream_id.get_or_insert(ctx.log_stream_id);
        Ok(ack)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{} failed with {}: {}", what, status, body);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GalileoError::AuthError(message),
        StatusCode::NOT_FOUND => GalileoError::NotFound(message),
        _ => GalileoError::ApiError(message),
    })
}
