//! Row-level cleaning: missing-field filters, date normalization, and
//! categorical predicates.
//!
//! None of these operations fail on a bad value. Rows that do not qualify
//! are excluded; only structural problems (an absent column, a column of the
//! wrong type) return an error.

use crate::date_key::DateFormat;
use crate::error::{PipelineError, Result};
use crate::schema::Column;
use crate::table::{Row, Table};
use crate::value::{Value, ValueType};
use serde::Serialize;
use tracing::{debug, warn};

/// Maximum number of unparsable values kept as samples.
pub const MAX_UNPARSABLE_SAMPLES: usize = 10;

/// How `filter_missing` combines the presence of several required columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NullPolicy {
    /// Keep a row when at least one required column has a value.
    ///
    /// A row missing its value column survives as long as, say, its date is
    /// present. This is how the CPI, retail and household reports filter.
    #[default]
    AnyRequiredPresent,
    /// Keep a row only when every required column has a value.
    AllRequiredPresent,
}

/// Removes rows whose required columns are missing, according to `policy`.
///
/// An empty `required` list keeps every row.
pub fn filter_missing(table: &Table, required: &[&str], policy: NullPolicy) -> Result<Table> {
    let indices = required
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<Vec<_>>>()?;

    if indices.is_empty() {
        return Ok(table.clone());
    }

    let filtered = table.filter_rows(|row| match policy {
        NullPolicy::AnyRequiredPresent => indices.iter().any(|&i| row.get(i).is_some()),
        NullPolicy::AllRequiredPresent => indices.iter().all(|&i| row.get(i).is_some()),
    });

    debug!(
        "filter_missing({:?}) kept {} of {} rows",
        policy,
        filtered.num_rows(),
        table.num_rows()
    );
    Ok(filtered)
}

/// A date value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnparsableDate {
    pub column: String,
    /// Row position in the table given to `normalize_date`
    pub row: usize,
    pub value: String,
}

/// Result of [`normalize_date`].
#[derive(Debug, Clone, PartialEq)]
pub struct DateNormalization {
    pub table: Table,
    /// Number of rows dropped because their date did not parse
    pub unparsable: usize,
    /// The first few offending values
    pub samples: Vec<UnparsableDate>,
}

/// Rewrites `column` as a date column truncated to the month.
///
/// Rows whose value does not parse with `format` are dropped and counted.
/// Missing cells stay missing; the window stage drops them. A column that is
/// already date-typed is returned unchanged.
pub fn normalize_date(table: &Table, column: &str, format: &DateFormat) -> Result<DateNormalization> {
    let index = table.require_column(column)?;
    let current = table.columns()[index].value_type;

    if current == ValueType::Date {
        return Ok(DateNormalization {
            table: table.clone(),
            unparsable: 0,
            samples: Vec::new(),
        });
    }
    if current != ValueType::Text {
        return Err(PipelineError::ColumnTypeMismatch {
            column: column.to_string(),
            expected: ValueType::Text.to_string(),
            found: current.to_string(),
        });
    }

    let mut columns = table.columns().to_vec();
    columns[index] = Column::new(column, ValueType::Date);

    let mut rows = Vec::with_capacity(table.num_rows());
    let mut unparsable = 0usize;
    let mut samples = Vec::new();

    for (position, row) in table.rows().iter().enumerate() {
        let mut cells = row.cells().to_vec();
        if let Some(raw) = row.get(index).and_then(Value::as_text) {
            match format.parse(raw) {
                Some(key) => cells[index] = Some(Value::Date(key)),
                None => {
                    unparsable += 1;
                    if samples.len() < MAX_UNPARSABLE_SAMPLES {
                        samples.push(UnparsableDate {
                            column: column.to_string(),
                            row: position,
                            value: raw.to_string(),
                        });
                    }
                    continue;
                }
            }
        }
        rows.push(Row::new(cells));
    }

    if unparsable > 0 {
        warn!(
            "Dropped {} rows with unparsable dates in '{}' (format {:?})",
            unparsable, column, format
        );
    }

    Ok(DateNormalization {
        table: Table::from_parts(columns, rows),
        unparsable,
        samples,
    })
}

/// Row predicate over a single column.
///
/// A missing cell never matches, so `NotEquals` and `Excludes` also drop
/// rows where the column is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    /// Display text equals the given string
    Equals(String),
    NotEquals(String),
    /// Display text contains the substring
    Contains(String),
    /// Display text does not contain the substring
    Excludes(String),
    /// Numeric value strictly greater than the threshold
    GreaterThan(f64),
}

impl Predicate {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };

        match self {
            Predicate::Equals(expected) => text_of(value) == *expected,
            Predicate::NotEquals(expected) => text_of(value) != *expected,
            Predicate::Contains(needle) => text_of(value).contains(needle.as_str()),
            Predicate::Excludes(needle) => !text_of(value).contains(needle.as_str()),
            Predicate::GreaterThan(threshold) => {
                value.as_f64().map_or(false, |v| v > *threshold)
            }
        }
    }
}

fn text_of(value: &Value) -> std::borrow::Cow<'_, str> {
    match value.as_text() {
        Some(text) => std::borrow::Cow::Borrowed(text),
        None => std::borrow::Cow::Owned(value.to_string()),
    }
}

/// Keeps the rows whose `column` satisfies `predicate`, preserving order.
///
/// # Errors
/// Returns `PipelineError::ColumnNotFound` when the column is absent.
pub fn filter(table: &Table, column: &str, predicate: &Predicate) -> Result<Table> {
    let index = table.require_column(column)?;
    if matches!(predicate, Predicate::GreaterThan(_)) && !table.columns()[index].value_type.is_numeric() {
        return Err(PipelineError::ColumnTypeMismatch {
            column: column.to_string(),
            expected: "numeric".to_string(),
            found: table.columns()[index].value_type.to_string(),
        });
    }
    Ok(table.filter_rows(|row| predicate.matches(row.get(index))))
}

/// Keeps rows whose `column` equals `value`.
pub fn filter_equals(table: &Table, column: &str, value: &str) -> Result<Table> {
    filter(table, column, &Predicate::Equals(value.to_string()))
}

/// Keeps rows whose `column` does not contain `substring`.
pub fn filter_excludes(table: &Table, column: &str, substring: &str) -> Result<Table> {
    filter(table, column, &Predicate::Excludes(substring.to_string()))
}

/// Derives an integer year column from a date column.
///
/// When `output` names the date column itself the column is replaced in
/// place; any other existing name is a `DuplicateColumn` error.
pub fn extract_year(table: &Table, date_column: &str, output: &str) -> Result<Table> {
    let index = table.require_typed_column(date_column, ValueType::Date)?;
    let years: Vec<Option<Value>> = table
        .rows()
        .iter()
        .map(|row| {
            row.get(index)
                .and_then(Value::as_date)
                .map(|key| Value::Integer(i64::from(key.year())))
        })
        .collect();

    if output == date_column {
        let mut columns = table.columns().to_vec();
        columns[index] = Column::new(output, ValueType::Integer);
        let rows = table
            .rows()
            .iter()
            .zip(years)
            .map(|(row, year)| {
                let mut cells = row.cells().to_vec();
                cells[index] = year;
                Row::new(cells)
            })
            .collect();
        return Ok(Table::from_parts(columns, rows));
    }

    table.with_column(Column::new(output, ValueType::Integer), years)
}
