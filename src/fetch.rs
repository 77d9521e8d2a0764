use crate::error::{PipelineError, Result};
use crate::schema::{Schema, SchemaRegistry};
use crate::source::InMemorySource;
use futures::future::try_join_all;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for remote fetches
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Retries after the first failed attempt (default: 3)
    pub max_retries: u32,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Base delay between retries in milliseconds, grown linearly (default: 500)
    pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            max_retries: 3,
            timeout_seconds: 30,
            retry_delay_ms: 500,
        }
    }
}

/// HTTP client for schema documents and CSV extracts kept in object storage.
///
/// Everything is fetched before a run starts; the pipeline itself never
/// touches the network.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Fetcher { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches a URL body as text, retrying network and server errors.
    ///
    /// # Errors
    /// Returns `PipelineError::Fetch` on a client error status or once the
    /// retries are used up.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(FetchFailure::Permanent(message)) => return Err(PipelineError::Fetch(message)),
                Err(FetchFailure::Transient(message)) => {
                    if attempt >= self.config.max_retries {
                        return Err(PipelineError::Fetch(format!(
                            "{} (after {} attempts)",
                            message,
                            attempt + 1
                        )));
                    }
                    attempt += 1;
                    warn!("Fetching {} failed ({}), retry {}", url, message, attempt);
                    let delay = self.config.retry_delay_ms * u64::from(attempt);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> std::result::Result<String, FetchFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchFailure::Permanent(e.to_string())
            } else {
                FetchFailure::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchFailure::Transient(format!("HTTP {} from {}", status.as_u16(), url)));
        }
        if !status.is_success() {
            return Err(FetchFailure::Permanent(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        response
            .text()
            .await
            .map_err(|e| FetchFailure::Transient(e.to_string()))
    }

    /// Fetches `StructType` schema documents concurrently and adds them to
    /// `registry`, keyed by the paired source name.
    pub async fn fetch_schemas(
        &self,
        registry: SchemaRegistry,
        documents: &[(String, String)],
    ) -> Result<SchemaRegistry> {
        let bodies = try_join_all(documents.iter().map(|(name, url)| async move {
            let text = self.fetch_text(url).await?;
            Ok::<_, PipelineError>((name.clone(), Schema::from_json(name, &text)?))
        }))
        .await?;

        info!("Fetched {} schema document(s)", bodies.len());
        Ok(bodies
            .into_iter()
            .fold(registry, |registry, (name, schema)| registry.with_schema(name, schema)))
    }

    /// Downloads CSV documents concurrently into an in-memory source keyed by
    /// the paired location.
    pub async fn prefetch_sources(
        &self,
        documents: &[(String, String)],
        has_headers: bool,
    ) -> Result<InMemorySource> {
        let bodies = try_join_all(documents.iter().map(|(location, url)| async move {
            let text = self.fetch_text(url).await?;
            Ok::<_, PipelineError>((location.clone(), text))
        }))
        .await?;

        let mut source = InMemorySource::new().with_headers(has_headers);
        for (location, text) in bodies {
            source.add_csv(location, text);
        }
        Ok(source)
    }
}

enum FetchFailure {
    Transient(String),
    Permanent(String),
}
