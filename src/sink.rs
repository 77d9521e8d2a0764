//! Report writers.
//!
//! A [`ReportWriter`] receives one finished table and a destination name.
//! Every row of the table lands under that destination in a single call.

pub mod sqlite;

use crate::error::{PipelineError, Result};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub use sqlite::SqliteSink;

/// Whether a write replaces or extends what is already at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

/// Physical layout of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileLayout {
    /// One file holding every row
    #[default]
    Coalesced,
    /// Files of at most `rows_per_file` rows each
    Partitioned { rows_per_file: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    pub header: bool,
    pub mode: WriteMode,
    pub layout: FileLayout,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            header: true,
            mode: WriteMode::Overwrite,
            layout: FileLayout::Coalesced,
        }
    }
}

impl WriteOptions {
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_layout(mut self, layout: FileLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Trait for report output abstraction.
pub trait ReportWriter: Send + Sync {
    /// Writes all rows of `table` to `destination`.
    ///
    /// # Errors
    /// Returns an error if the destination cannot be written.
    fn write(&self, table: &Table, destination: &str, options: &WriteOptions) -> Result<()>;
}

/// Text of every cell, missing cells as empty strings.
pub(crate) fn display_row(table: &Table, row: usize) -> Vec<String> {
    table.rows()[row]
        .cells()
        .iter()
        .map(|cell| cell.as_ref().map(ToString::to_string).unwrap_or_default())
        .collect()
}

/// Writes destinations as directories of CSV part files under a root.
///
/// `<root>/<destination>/part-00000.csv`, followed by an empty `_SUCCESS`
/// marker once every part is written.
#[derive(Debug, Clone)]
pub struct CsvSink {
    root: PathBuf,
}

impl CsvSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        CsvSink {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a destination is written to.
    pub fn destination_dir(&self, destination: &str) -> PathBuf {
        self.root.join(destination)
    }

    /// Part files of a destination, in name order.
    pub fn part_files(&self, destination: &str) -> Result<Vec<PathBuf>> {
        let dir = self.destination_dir(destination);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut parts: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.starts_with("part-") && name.ends_with(".csv"))
            })
            .collect();
        parts.sort();
        Ok(parts)
    }

    fn write_part(&self, path: &Path, table: &Table, rows: std::ops::Range<usize>, header: bool) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
        if header {
            writer.write_record(table.column_names())?;
        }
        for row in rows {
            writer.write_record(display_row(table, row))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// A CSV destination must name one directory directly under the sink root.
fn check_destination(destination: &str) -> Result<()> {
    let mut parts = Path::new(destination).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) if !destination.trim().is_empty() => Ok(()),
        _ => Err(PipelineError::Sink(format!(
            "destination '{}' must be a single directory name",
            destination
        ))),
    }
}

impl ReportWriter for CsvSink {
    fn write(&self, table: &Table, destination: &str, options: &WriteOptions) -> Result<()> {
        check_destination(destination)?;

        let dir = self.destination_dir(destination);
        if options.mode == WriteMode::Overwrite && dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;

        let first_part = self.part_files(destination)?.len();
        let rows_per_file = match options.layout {
            FileLayout::Coalesced => table.num_rows().max(1),
            FileLayout::Partitioned { rows_per_file } => rows_per_file.max(1),
        };

        // an empty table still produces one (possibly header-only) part
        let mut ranges: Vec<std::ops::Range<usize>> = (0..table.num_rows())
            .step_by(rows_per_file)
            .map(|start| start..(start + rows_per_file).min(table.num_rows()))
            .collect();
        if ranges.is_empty() {
            ranges.push(0..0);
        }

        for (offset, range) in ranges.iter().enumerate() {
            let path = dir.join(format!("part-{:05}.csv", first_part + offset));
            self.write_part(&path, table, range.clone(), options.header)?;
        }
        std::fs::write(dir.join("_SUCCESS"), b"")?;

        info!(
            "Wrote {} rows to {} ({} part file(s))",
            table.num_rows(),
            dir.display(),
            ranges.len()
        );
        Ok(())
    }
}

/// Keeps written tables in memory, keyed by destination.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<BTreeMap<String, Table>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// The table last written (or accumulated) at `destination`.
    pub fn get(&self, destination: &str) -> Option<Table> {
        self.tables
            .lock()
            .ok()
            .and_then(|tables| tables.get(destination).cloned())
    }

    pub fn destinations(&self) -> Vec<String> {
        self.tables
            .lock()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ReportWriter for MemorySink {
    fn write(&self, table: &Table, destination: &str, options: &WriteOptions) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| PipelineError::Sink("memory sink lock poisoned".to_string()))?;

        let combined = match (options.mode, tables.get(destination)) {
            (WriteMode::Append, Some(existing)) => {
                if existing.columns() != table.columns() {
                    return Err(PipelineError::SchemaMismatch {
                        source: destination.to_string(),
                        detail: "appended table has different columns".to_string(),
                    });
                }
                let rows = existing
                    .rows()
                    .iter()
                    .chain(table.rows())
                    .map(|row| row.cells().to_vec())
                    .collect();
                Table::new(existing.columns().to_vec(), rows)?
            }
            _ => table.clone(),
        };
        tables.insert(destination.to_string(), combined);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::value::{Value, ValueType};

    fn report() -> Table {
        Table::new(
            vec![
                Column::new("YEAR", ValueType::Integer),
                Column::new("Ontario", ValueType::Float),
                Column::new("Quebec", ValueType::Float),
            ],
            vec![
                vec![Some(Value::Integer(2010)), Some(Value::float(116.5)), None],
                vec![Some(Value::Integer(2011)), Some(Value::float(120.0)), Some(Value::float(118.25))],
                vec![Some(Value::Integer(2012)), None, Some(Value::float(1.5))],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_csv_sink_writes_single_part_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        sink.write(&report(), "Canada_CPI_output", &WriteOptions::default()).unwrap();

        let parts = sink.part_files("Canada_CPI_output").unwrap();
        assert_eq!(parts.len(), 1);
        let text = std::fs::read_to_string(&parts[0]).unwrap();
        assert_eq!(
            text,
            "YEAR,Ontario,Quebec\n2010,116.5,\n2011,120.0,118.25\n2012,,1.5\n"
        );
        assert!(dir.path().join("Canada_CPI_output/_SUCCESS").exists());
    }

    #[test]
    fn test_csv_sink_partitioned_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let options = WriteOptions::default()
            .with_header(false)
            .with_layout(FileLayout::Partitioned { rows_per_file: 2 });

        sink.write(&report(), "out", &options).unwrap();
        assert_eq!(sink.part_files("out").unwrap().len(), 2);

        // overwrite replaces earlier parts
        sink.write(&report(), "out", &WriteOptions::default()).unwrap();
        assert_eq!(sink.part_files("out").unwrap().len(), 1);
    }

    #[test]
    fn test_csv_sink_append_adds_parts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let append = WriteOptions::default().with_mode(WriteMode::Append);
        sink.write(&report(), "out", &append).unwrap();
        sink.write(&report(), "out", &append).unwrap();

        let parts = sink.part_files("out").unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[1].ends_with("part-00001.csv"));
    }

    #[test]
    fn test_csv_sink_empty_table_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let empty = report().filter_rows(|_| false);
        sink.write(&empty, "empty", &WriteOptions::default()).unwrap();

        let parts = sink.part_files("empty").unwrap();
        assert_eq!(std::fs::read_to_string(&parts[0]).unwrap(), "YEAR,Ontario,Quebec\n");
    }

    #[test]
    fn test_csv_sink_rejects_destinations_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("outer");
        std::fs::create_dir_all(outer.join("reports")).unwrap();
        std::fs::write(outer.join("inputs.csv"), "2010-01,ON,1\n").unwrap();
        let sink = CsvSink::new(outer.join("reports"));
        let empty = report().filter_rows(|_| false);

        let absolute = outer.to_string_lossy().into_owned();
        for destination in ["..", ".", "", "  ", "a/b", "../inputs", absolute.as_str()] {
            let result = sink.write(&empty, destination, &WriteOptions::default());
            assert!(matches!(result, Err(PipelineError::Sink(_))), "{:?}", destination);
        }
        assert!(outer.join("inputs.csv").exists());
        assert!(outer.join("reports").is_dir());

        sink.write(&empty, "Retail+YahooStock", &WriteOptions::default()).unwrap();
        assert_eq!(sink.part_files("Retail+YahooStock").unwrap().len(), 1);
    }

    #[test]
    fn test_memory_sink_append() {
        let sink = MemorySink::new();
        let append = WriteOptions::default().with_mode(WriteMode::Append);
        sink.write(&report(), "out", &append).unwrap();
        sink.write(&report(), "out", &append).unwrap();
        assert_eq!(sink.get("out").unwrap().num_rows(), 6);

        sink.write(&report(), "out", &WriteOptions::default()).unwrap();
        assert_eq!(sink.get("out").unwrap().num_rows(), 3);
        assert_eq!(sink.destinations(), vec!["out".to_string()]);

        let narrow = report().select(&["YEAR"]).unwrap();
        assert!(sink.write(&narrow, "out", &append).is_err());
    }
}
