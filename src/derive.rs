use crate::error::{PipelineError, Result};
use crate::schema::Column;
use crate::table::Table;
use crate::value::{Value, ValueType};

/// Appends `output`, the row-wise sum of every numeric column not in `exclude`.
///
/// The summed columns are read from the table when called, so a column added
/// by an upstream pivot is picked up without changing the caller. Missing
/// cells count as zero; names in `exclude` the table does not have are
/// ignored.
///
/// # Errors
/// Returns `PipelineError::DuplicateColumn` if `output` already exists.
pub fn row_sum(table: &Table, exclude: &[&str], output: &str) -> Result<Table> {
    if table.column_index(output).is_some() {
        return Err(PipelineError::DuplicateColumn(output.to_string()));
    }

    let summed: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| column.value_type.is_numeric() && !exclude.contains(&column.name.as_str()))
        .map(|(index, _)| index)
        .collect();

    tracing::debug!(
        "row_sum '{}' over {} of {} columns",
        output,
        summed.len(),
        table.num_columns()
    );

    let totals = table
        .rows()
        .iter()
        .map(|row| {
            let total: f64 = summed
                .iter()
                .map(|&i| row.get(i).and_then(Value::as_f64).unwrap_or(0.0))
                .sum();
            Some(Value::float(total))
        })
        .collect();

    table.with_column(Column::new(output, ValueType::Float), totals)
}
