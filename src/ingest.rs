use crate::error::{PipelineError, Result};
use crate::schema::Schema;
use crate::source::TableSource;
use crate::table::{Row, Table};
use tracing::debug;

/// Table produced by ingestion together with its coercion count.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub table: Table,
    /// Non-empty fields that failed coercion and became missing
    pub coerced_to_missing: usize,
}

/// Reads `location` from `source` into a typed table.
///
/// Each field is coerced to its declared type; a field that does not parse
/// becomes a missing cell instead of failing the row. Row order follows the
/// source.
///
/// # Errors
/// Returns `PipelineError::SchemaMismatch` when a record's field count, or a
/// header's column names, do not line up with `schema`.
pub fn ingest(
    source: &dyn TableSource,
    location: &str,
    source_name: &str,
    schema: &Schema,
) -> Result<Table> {
    ingest_counted(source, location, source_name, schema).map(|ingested| ingested.table)
}

/// Like [`ingest`], also reporting how many fields were coerced to missing.
pub fn ingest_counted(
    source: &dyn TableSource,
    location: &str,
    source_name: &str,
    schema: &Schema,
) -> Result<Ingested> {
    let batch = source.read(location, schema)?;

    for header in &batch.headers {
        check_header(source_name, header, schema)?;
    }

    let columns = schema.columns();
    let mut rows = Vec::new();
    let mut coerced_to_missing = 0usize;

    for record in batch.records {
        let record = record?;
        if record.fields.len() != columns.len() {
            return Err(PipelineError::SchemaMismatch {
                source: source_name.to_string(),
                detail: format!(
                    "record at line {} has {} fields, expected {}",
                    record.line,
                    record.fields.len(),
                    columns.len()
                ),
            });
        }

        let cells = record
            .fields
            .iter()
            .zip(columns)
            .map(|(raw, column)| {
                let cell = column.value_type.coerce(raw);
                if cell.is_none() && !raw.trim().is_empty() {
                    coerced_to_missing += 1;
                }
                cell
            })
            .collect();
        rows.push(Row::new(cells));
    }

    debug!(
        "Ingested {} rows from '{}' ({}), {} fields coerced to missing",
        rows.len(),
        source_name,
        location,
        coerced_to_missing
    );

    Ok(Ingested {
        table: Table::from_parts(columns.to_vec(), rows),
        coerced_to_missing,
    })
}

fn check_header(source_name: &str, header: &[String], schema: &Schema) -> Result<()> {
    let expected = schema.names();
    let matches = header.len() == expected.len()
        && header
            .iter()
            .zip(&expected)
            .all(|(found, wanted)| found.trim().eq_ignore_ascii_case(wanted));

    if matches {
        Ok(())
    } else {
        Err(PipelineError::SchemaMismatch {
            source: source_name.to_string(),
            detail: format!("header {:?} does not match columns {:?}", header, expected),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::value::{Value, ValueType};

    fn schema() -> Schema {
        Schema::from_pairs(&[
            ("REF_DATE", ValueType::Text),
            ("GEO", ValueType::Text),
            ("VALUE", ValueType::Float),
        ])
        .unwrap()
    }

    #[test]
    fn test_ingest_coerces_fields_and_keeps_order() {
        let mut source = InMemorySource::new();
        source.add_csv(
            "cpi.csv",
            "REF_DATE,GEO,VALUE\n2010-01,Ontario,115.1\n2010-01,Quebec,..\n2010-02,Ontario,\n",
        );

        let ingested = ingest_counted(&source, "cpi.csv", "cpi", &schema()).unwrap();
        let table = ingested.table;
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.value(0, "VALUE"), Some(&Value::float(115.1)));
        assert_eq!(table.value(1, "GEO"), Some(&Value::from("Quebec")));
        // `..` is a StatCan suppression marker and does not parse
        assert_eq!(table.value(1, "VALUE"), None);
        assert_eq!(table.value(2, "VALUE"), None);
        assert_eq!(ingested.coerced_to_missing, 1);
    }

    #[test]
    fn test_header_is_matched_case_insensitively() {
        let mut source = InMemorySource::new();
        source.add_csv("x", "ref_date,Geo,value\n2010-01,Ontario,1\n");
        let table = ingest(&source, "x", "cpi", &schema()).unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.column_names(), vec!["REF_DATE", "GEO", "VALUE"]);
    }

    #[test]
    fn test_header_mismatch_is_fatal() {
        let mut source = InMemorySource::new();
        source.add_csv("x", "REF_DATE,VALUE,GEO\n2010-01,1,Ontario\n");
        let err = ingest(&source, "x", "cpi", &schema()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_field_count_mismatch_is_fatal() {
        let mut source = InMemorySource::new().with_headers(false);
        source.add_csv("x", "2010-01,Ontario,1\n2010-02,Ontario\n");
        match ingest(&source, "x", "cpi", &schema()) {
            Err(PipelineError::SchemaMismatch { source, detail }) => {
                assert_eq!(source, "cpi");
                assert!(detail.contains("line 2"));
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_headerless_header_line_becomes_a_data_row() {
        let mut source = InMemorySource::new().with_headers(false);
        source.add_csv("x", "REF_DATE,GEO,VALUE\n2010-01,Ontario,1\n");
        let ingested = ingest_counted(&source, "x", "cpi", &schema()).unwrap();
        assert_eq!(ingested.table.num_rows(), 2);
        assert_eq!(ingested.table.value(0, "VALUE"), None);
        assert_eq!(ingested.coerced_to_missing, 1);
    }
}
