//! Economic reports binary
//!
//! Run with: `cargo run --bin econ-reports`
//!
//! Configuration comes from `ECON_*` environment variables (see
//! `PipelineConfig::from_env`); set `RUST_LOG` to control log output:
//!   RUST_LOG=econ_reports=debug cargo run --bin econ-reports

use econ_reports::{
    reports, CsvSink, CsvSource, Fetcher, PipelineConfig, PipelineContext, ReportWriter, SchemaRegistry,
    SinkKind, SqliteSink, TableSource,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = PipelineConfig::from_env()?;
    tracing::info!(
        "Input root: {}, window: {}, reports: {:?}",
        config.input_root.display(),
        config.window,
        config.reports
    );

    let mut registry = SchemaRegistry::builtin();
    if let Some(dir) = &config.schema_dir {
        registry = registry.load_dir(dir)?;
    }

    let needs_fetch = !config.schema_urls.is_empty() || !config.source_urls.is_empty();
    let fetcher = if needs_fetch { Some(Fetcher::new()?) } else { None };

    if let Some(fetcher) = &fetcher {
        if !config.schema_urls.is_empty() {
            registry = fetcher.fetch_schemas(registry, &config.schema_urls).await?;
        }
    }

    let source: Arc<dyn TableSource> = match &fetcher {
        Some(fetcher) if !config.source_urls.is_empty() => Arc::new(
            fetcher
                .prefetch_sources(&config.source_urls, config.csv_header)
                .await?,
        ),
        _ => Arc::new(CsvSource::new(&config.input_root).with_headers(config.csv_header)),
    };

    let sink: Arc<dyn ReportWriter> = match config.sink {
        SinkKind::Csv => Arc::new(CsvSink::new(&config.output_root)),
        SinkKind::Sqlite => Arc::new(SqliteSink::new(&config.sqlite_path)?),
    };

    let context = PipelineContext::new(Arc::new(registry), config.window, source, sink);

    // the pipeline is synchronous; keep it off the async workers
    let selected = config.reports.clone();
    let runs = tokio::task::spawn_blocking(move || reports::run(&context, &selected)).await??;

    println!("{}", serde_json::to_string_pretty(&runs)?);

    Ok(())
}
