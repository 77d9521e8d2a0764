//! Run configuration.

use crate::error::{PipelineError, Result};
use crate::reports::Report;
use crate::window::DateWindow;
use std::path::PathBuf;

/// Where reports are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Directory of CSV part files per destination
    #[default]
    Csv,
    /// One table per destination in a SQLite database
    Sqlite,
}

impl std::str::FromStr for SinkKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(SinkKind::Csv),
            "sqlite" => Ok(SinkKind::Sqlite),
            other => Err(PipelineError::Config(format!(
                "unknown sink '{}' (expected csv or sqlite)",
                other
            ))),
        }
    }
}

/// Configuration for a report run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Root that source locations resolve against (default: ".")
    pub input_root: PathBuf,
    /// Root of the CSV sink (default: "OUTPUT-Folder")
    pub output_root: PathBuf,
    /// Analysis window (default: 2010-01 to 2020-10)
    pub window: DateWindow,
    /// Reports to run, in order (default: all)
    pub reports: Vec<Report>,
    pub sink: SinkKind,
    /// Database file for the SQLite sink (default: "econ-reports.db")
    pub sqlite_path: PathBuf,
    /// Directory of `StructType` JSON schemas overriding the built-ins
    pub schema_dir: Option<PathBuf>,
    /// Remote schema documents as (source name, url)
    pub schema_urls: Vec<(String, String)>,
    /// Remote CSV documents as (location, url); when set they replace the
    /// files under `input_root`
    pub source_urls: Vec<(String, String)>,
    /// Whether input CSV files start with a header line (default: false)
    pub csv_header: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from("OUTPUT-Folder"),
            window: DateWindow::default(),
            reports: Report::ALL.to_vec(),
            sink: SinkKind::Csv,
            sqlite_path: PathBuf::from("econ-reports.db"),
            schema_dir: None,
            schema_urls: Vec::new(),
            source_urls: Vec::new(),
            csv_header: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with the given roots and window; everything
    /// else takes its default.
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>, window: DateWindow) -> Self {
        PipelineConfig {
            input_root: input_root.into(),
            output_root: output_root.into(),
            window,
            ..PipelineConfig::default()
        }
    }

    /// Reads the `ECON_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PipelineConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = PipelineConfig::default();

        if let Some(root) = var("ECON_INPUT_ROOT") {
            config.input_root = PathBuf::from(root);
        }
        if let Some(root) = var("ECON_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(root);
        }

        let start = var("ECON_WINDOW_START");
        let end = var("ECON_WINDOW_END");
        if start.is_some() || end.is_some() {
            let start = start.unwrap_or_else(|| config.window.start().to_string());
            let end = end.unwrap_or_else(|| config.window.end().to_string());
            config.window = DateWindow::parse(&start, &end)
                .map_err(|e| PipelineError::Config(format!("ECON_WINDOW_START/ECON_WINDOW_END: {}", e)))?;
        }

        if let Some(reports) = var("ECON_REPORTS") {
            config.reports = reports
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<Report>>>()?;
            if config.reports.is_empty() {
                return Err(PipelineError::Config("ECON_REPORTS names no report".to_string()));
            }
        }

        if let Some(sink) = var("ECON_SINK") {
            config.sink = sink.parse()?;
        }
        if let Some(path) = var("ECON_SQLITE_PATH") {
            config.sqlite_path = PathBuf::from(path);
        }
        config.schema_dir = var("ECON_SCHEMA_DIR").map(PathBuf::from);
        if let Some(urls) = var("ECON_SCHEMA_URLS") {
            config.schema_urls = parse_pairs("ECON_SCHEMA_URLS", &urls)?;
        }
        if let Some(urls) = var("ECON_SOURCE_URLS") {
            config.source_urls = parse_pairs("ECON_SOURCE_URLS", &urls)?;
        }
        if let Some(header) = var("ECON_CSV_HEADER") {
            config.csv_header = parse_bool("ECON_CSV_HEADER", &header)?;
        }

        Ok(config)
    }
}

/// Parses `name=url,name=url`.
fn parse_pairs(key: &str, text: &str) -> Result<Vec<(String, String)>> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Ok((name.trim().to_string(), url.trim().to_string()))
            }
            _ => Err(PipelineError::Config(format!(
                "{}: expected name=url, got '{}'",
                key, entry
            ))),
        })
        .collect()
}

fn parse_bool(key: &str, text: &str) -> Result<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(PipelineError::Config(format!("{}: not a boolean: '{}'", key, other))),
    }
}
