//! In-memory tables with a runtime column set.
//!
//! A [`Table`] is immutable once built: every operation in the pipeline
//! returns a new table. The column list is ordinary data, so pivots and
//! derived metrics can add columns whose names are only known at run time.

use crate::error::{PipelineError, Result};
use crate::schema::Column;
use crate::value::{Value, ValueType};
use std::collections::HashSet;

/// A single row; cells are aligned with the owning table's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<Option<Value>>,
}

impl Row {
    pub(crate) fn new(cells: Vec<Option<Value>>) -> Self {
        Row { cells }
    }

    pub fn cells(&self) -> &[Option<Value>] {
        &self.cells
    }

    /// Cell at a column position; `None` when missing.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).and_then(|cell| cell.as_ref())
    }
}

/// Ordered rows sharing one column set.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    /// Builds a table, validating column uniqueness and row width.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Option<Value>>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::DuplicateColumn(column.name.clone()));
            }
        }

        let width = columns.len();
        if let Some(position) = rows.iter().position(|row| row.len() != width) {
            return Err(PipelineError::SchemaMismatch {
                source: "table".to_string(),
                detail: format!(
                    "row {} has {} cells, expected {}",
                    position,
                    rows[position].len(),
                    width
                ),
            });
        }

        Ok(Table {
            columns,
            rows: rows.into_iter().map(Row::new).collect(),
        })
    }

    /// Internal constructor for operations that already uphold the invariants.
    pub(crate) fn from_parts(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|row| row.cells.len() == columns.len()));
        Table { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Position of a column the caller requires.
    ///
    /// # Errors
    /// Returns `PipelineError::ColumnNotFound` if the table lacks the column.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::ColumnNotFound(name.to_string()))
    }

    /// Position of a required column that must hold `expected` values.
    pub fn require_typed_column(&self, name: &str, expected: ValueType) -> Result<usize> {
        let index = self.require_column(name)?;
        let found = self.columns[index].value_type;
        if found != expected {
            return Err(PipelineError::ColumnTypeMismatch {
                column: name.to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(index)
    }

    /// Cell lookup by row position and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// All cells of one column, in row order.
    pub fn column_values(&self, column: &str) -> Result<Vec<Option<&Value>>> {
        let index = self.require_column(column)?;
        Ok(self.rows.iter().map(|row| row.get(index)).collect())
    }

    /// Keeps the rows for which `keep` returns true, preserving order.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Row) -> bool,
    {
        let rows = self.rows.iter().filter(|row| keep(row)).cloned().collect();
        Table::from_parts(self.columns.clone(), rows)
    }

    /// Projects the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|name| self.require_column(name))
            .collect::<Result<Vec<_>>>()?;

        let columns: Vec<Column> = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row.cells[i].clone()).collect())
            .collect();

        // Table::new catches a name selected twice
        Table::new(columns, rows)
    }

    /// Renames one column.
    pub fn rename(&self, from: &str, to: &str) -> Result<Table> {
        let index = self.require_column(from)?;
        if from != to && self.column_index(to).is_some() {
            return Err(PipelineError::DuplicateColumn(to.to_string()));
        }

        let mut columns = self.columns.clone();
        columns[index].name = to.to_string();
        Ok(Table::from_parts(columns, self.rows.clone()))
    }

    /// Removes the named columns; names the table does not have are ignored.
    pub fn drop_columns(&self, names: &[&str]) -> Table {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i].name.as_str()))
            .collect();

        let columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| Row::new(keep.iter().map(|&i| row.cells[i].clone()).collect()))
            .collect();
        Table::from_parts(columns, rows)
    }

    /// Stable ascending sort on one column; missing cells sort first.
    pub fn sort_by(&self, column: &str) -> Result<Table> {
        let index = self.require_column(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| a.cells[index].cmp(&b.cells[index]));
        Ok(Table::from_parts(self.columns.clone(), rows))
    }

    /// Appends a column; `values` must have one cell per row.
    pub fn with_column(&self, column: Column, values: Vec<Option<Value>>) -> Result<Table> {
        if self.column_index(&column.name).is_some() {
            return Err(PipelineError::DuplicateColumn(column.name));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::SchemaMismatch {
                source: column.name.clone(),
                detail: format!(
                    "new column has {} cells for {} rows",
                    values.len(),
                    self.rows.len()
                ),
            });
        }

        let mut columns = self.columns.clone();
        columns.push(column);
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(row, value)| {
                let mut cells = row.cells.clone();
                cells.push(value);
                Row::new(cells)
            })
            .collect();
        Ok(Table::from_parts(columns, rows))
    }
}
