use super::{ReportWriter, WriteMode, WriteOptions};
use crate::error::{PipelineError, Result};
use crate::table::Table;
use crate::value::{Value, ValueType};
use rusqlite::{params_from_iter, types, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed report writer.
///
/// Each destination becomes one SQL table whose columns mirror the report's
/// columns. Overwrite drops and recreates the table; append inserts into it,
/// creating it on first use.
#[derive(Debug)]
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens (or creates) a file-based database.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a sink over an in-memory database.
    ///
    /// Useful for testing.
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::Sink("SQLite connection lock poisoned".to_string()))
    }

    /// Checks if a table exists in the database.
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        Ok(stmt.exists([table_name])?)
    }

    /// Number of rows stored for a destination.
    pub fn row_count(&self, destination: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(destination)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Column names of a destination table, in declaration order.
    pub fn column_names(&self, destination: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT 0", quote_identifier(destination)))?;
        Ok(stmt.column_names().into_iter().map(str::to_string).collect())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Text | ValueType::Date => "TEXT",
        ValueType::Integer => "INTEGER",
        ValueType::Float => "REAL",
    }
}

fn sql_value(cell: &Option<Value>) -> types::Value {
    match cell {
        None => types::Value::Null,
        Some(Value::Text(text)) => types::Value::Text(text.clone()),
        Some(Value::Integer(value)) => types::Value::Integer(*value),
        Some(Value::Float(value)) => types::Value::Real(value.0),
        Some(Value::Date(key)) => types::Value::Text(key.to_string()),
    }
}

impl ReportWriter for SqliteSink {
    fn write(&self, table: &Table, destination: &str, options: &WriteOptions) -> Result<()> {
        let name = quote_identifier(destination);
        let column_defs = table
            .columns()
            .iter()
            .map(|column| format!("{} {}", quote_identifier(&column.name), sql_type(column.value_type)))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=table.num_columns())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if options.mode == WriteMode::Overwrite {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", name), [])?;
        }
        tx.execute(&format!("CREATE TABLE IF NOT EXISTS {} ({})", name, column_defs), [])?;
        {
            let mut stmt = tx.prepare(&format!("INSERT INTO {} VALUES ({})", name, placeholders))?;
            for row in table.rows() {
                stmt.execute(params_from_iter(row.cells().iter().map(sql_value)))?;
            }
        }
        tx.commit()?;

        tracing::info!("Wrote {} rows to SQLite table {}", table.num_rows(), name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_key::DateKey;
    use crate::schema::Column;

    fn report() -> Table {
        Table::new(
            vec![
                Column::new("REF_DATE", ValueType::Date),
                Column::new("Avg Stock Traded", ValueType::Float),
            ],
            vec![
                vec![
                    Some(Value::Date(DateKey::new(2010, 1).unwrap())),
                    Some(Value::float(1.5)),
                ],
                vec![Some(Value::Date(DateKey::new(2010, 2).unwrap())), None],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_overwrite_creates_table() {
        let sink = SqliteSink::new_in_memory().unwrap();
        sink.write(&report(), "Yahoo_output", &WriteOptions::default()).unwrap();
        assert!(sink.table_exists("Yahoo_output").unwrap());
        assert_eq!(sink.row_count("Yahoo_output").unwrap(), 2);
        assert_eq!(
            sink.column_names("Yahoo_output").unwrap(),
            vec!["REF_DATE", "Avg Stock Traded"]
        );

        sink.write(&report(), "Yahoo_output", &WriteOptions::default()).unwrap();
        assert_eq!(sink.row_count("Yahoo_output").unwrap(), 2);
    }

    #[test]
    fn test_append_inserts() {
        let sink = SqliteSink::new_in_memory().unwrap();
        let append = WriteOptions::default().with_mode(WriteMode::Append);
        sink.write(&report(), "Retail+YahooStock", &append).unwrap();
        sink.write(&report(), "Retail+YahooStock", &append).unwrap();
        assert_eq!(sink.row_count("Retail+YahooStock").unwrap(), 4);
    }

    #[test]
    fn test_dates_are_stored_as_text() {
        let sink = SqliteSink::new_in_memory().unwrap();
        sink.write(&report(), "out", &WriteOptions::default()).unwrap();
        let conn = sink.lock().unwrap();
        let first: String = conn
            .query_row("SELECT REF_DATE FROM out ORDER BY REF_DATE LIMIT 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(first, "2010-01");
    }
}
