use crate::error::{PipelineError, Result};
use crate::schema::Schema;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// One raw input record, before type coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line number in the underlying file (0 when unknown)
    pub line: u64,
    /// Field values in source column order
    pub fields: Vec<String>,
}

/// Stream of raw records.
pub type RecordIter = Box<dyn Iterator<Item = Result<RawRecord>> + Send>;

/// Output of a source read: optional header rows and the record stream.
pub struct SourceBatch {
    /// One header per underlying file when the source reads headers
    pub headers: Vec<Vec<String>>,
    /// Records in source order
    pub records: RecordIter,
}

impl std::fmt::Debug for SourceBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBatch")
            .field("headers", &self.headers)
            .field("records", &"<stream>")
            .finish()
    }
}

/// Trait for tabular source abstraction.
///
/// The pipeline only needs ordered raw records; where they come from (local
/// files, object storage, a test fixture) is the implementation's concern.
pub trait TableSource: Send + Sync {
    /// Reads the records stored at `location`.
    ///
    /// # Errors
    /// Returns an error if the location cannot be resolved or opened.
    fn read(&self, location: &str, schema: &Schema) -> Result<SourceBatch>;
}

fn csv_batch<R>(readers: Vec<R>, has_headers: bool) -> Result<SourceBatch>
where
    R: Read + Send + 'static,
{
    let mut headers = Vec::new();
    let mut streams = Vec::with_capacity(readers.len());

    for reader in readers {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(reader);
        if has_headers {
            let header = csv_reader.headers()?;
            headers.push(header.iter().map(str::to_string).collect());
        }
        streams.push(csv_reader.into_records().map(|result| {
            let record = result?;
            Ok(RawRecord {
                line: record.position().map_or(0, |p| p.line()),
                fields: record.iter().map(str::to_string).collect(),
            })
        }));
    }

    Ok(SourceBatch {
        headers,
        records: Box::new(streams.into_iter().flatten()),
    })
}

/// CSV files on the local filesystem.
///
/// A location naming a directory reads every `*.csv` file in it, in file
/// name order, as one record stream.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
    has_headers: bool,
}

impl CsvSource {
    /// Creates a source resolving locations relative to `root`.
    ///
    /// Files are read without a header row by default, matching how the
    /// StatCan extracts are fed to the reports.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        CsvSource {
            root: root.as_ref().to_path_buf(),
            has_headers: false,
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    fn resolve(&self, location: &str) -> Result<Vec<PathBuf>> {
        let path = self.root.join(location);
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().map_or(false, |ext| ext == "csv"))
                .collect();
            files.sort();
            if files.is_empty() {
                return Err(PipelineError::Io(format!(
                    "no CSV files in {}",
                    path.display()
                )));
            }
            Ok(files)
        } else if path.is_file() {
            Ok(vec![path])
        } else {
            Err(PipelineError::Io(format!("{} does not exist", path.display())))
        }
    }
}

impl TableSource for CsvSource {
    fn read(&self, location: &str, schema: &Schema) -> Result<SourceBatch> {
        let files = self.resolve(location)?;
        tracing::debug!(
            "Reading {} file(s) from '{}' against {} columns",
            files.len(),
            location,
            schema.len()
        );
        let readers = files
            .iter()
            .map(File::open)
            .collect::<std::io::Result<Vec<_>>>()?;
        csv_batch(readers, self.has_headers)
    }
}

/// In-memory CSV documents keyed by location.
///
/// Used by tests and to hold remote bodies fetched before a run.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    data: HashMap<String, String>,
    has_headers: bool,
}

impl InMemorySource {
    /// Creates a new empty in-memory source whose documents carry a header row.
    pub fn new() -> Self {
        InMemorySource {
            data: HashMap::new(),
            has_headers: true,
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Adds (or replaces) the CSV text for a location.
    pub fn add_csv(&mut self, location: impl Into<String>, text: impl Into<String>) {
        self.data.insert(location.into(), text.into());
    }

    pub fn contains(&self, location: &str) -> bool {
        self.data.contains_key(location)
    }

    /// Clears all documents.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl TableSource for InMemorySource {
    fn read(&self, location: &str, _schema: &Schema) -> Result<SourceBatch> {
        let text = self
            .data
            .get(location)
            .ok_or_else(|| PipelineError::Io(format!("no data registered for '{}'", location)))?;
        csv_batch(vec![Cursor::new(text.clone().into_bytes())], self.has_headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn schema() -> Schema {
        Schema::from_pairs(&[("REF_DATE", ValueType::Text), ("VALUE", ValueType::Float)]).unwrap()
    }

    fn collect(batch: SourceBatch) -> Vec<RawRecord> {
        batch.records.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_in_memory_source_reads_header_and_records() {
        let mut source = InMemorySource::new();
        source.add_csv("cpi.csv", "REF_DATE,VALUE\n2010-01,115.1\n2010-02,115.6\n");

        let batch = source.read("cpi.csv", &schema()).unwrap();
        assert_eq!(batch.headers, vec![vec!["REF_DATE".to_string(), "VALUE".to_string()]]);

        let records = collect(batch);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields, vec!["2010-01", "115.1"]);
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn test_in_memory_source_missing_location() {
        let source = InMemorySource::new();
        let result = source.read("absent.csv", &schema());
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_headerless_source_keeps_first_line_as_data() {
        let mut source = InMemorySource::new().with_headers(false);
        source.add_csv("x", "REF_DATE,VALUE\n2010-01,1\n");
        let batch = source.read("x", &schema()).unwrap();
        assert!(batch.headers.is_empty());
        assert_eq!(collect(batch).len(), 2);
    }

    #[test]
    fn test_ragged_records_are_passed_through() {
        let mut source = InMemorySource::new();
        source.add_csv("x", "REF_DATE,VALUE\n2010-01\n");
        let records = collect(source.read("x", &schema()).unwrap());
        assert_eq!(records[0].fields.len(), 1);
    }

    #[test]
    fn test_csv_source_reads_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let table_dir = dir.path().join("20100008");
        std::fs::create_dir(&table_dir).unwrap();
        std::fs::write(table_dir.join("b.csv"), "2010-02,2\n").unwrap();
        std::fs::write(table_dir.join("a.csv"), "2010-01,1\n").unwrap();
        std::fs::write(table_dir.join("README.md"), "skip").unwrap();

        let source = CsvSource::new(dir.path());
        let records = collect(source.read("20100008", &schema()).unwrap());
        let dates: Vec<_> = records.iter().map(|r| r.fields[0].as_str()).collect();
        assert_eq!(dates, vec!["2010-01", "2010-02"]);
    }

    #[test]
    fn test_csv_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvSource::new(dir.path());
        assert!(matches!(
            source.read("nope.csv", &schema()),
            Err(PipelineError::Io(_))
        ));
    }
}
