use crate::error::{PipelineError, Result};
use crate::schema::Column;
use crate::table::Table;
use crate::value::Value;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::warn;

/// What to do when a right-hand column name already exists on the left.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum DuplicateColumns {
    /// Fail with `DuplicateColumn`
    #[default]
    Reject,
    /// Append the suffix to the right-hand name
    Suffix(String),
}

/// Raised when a matched join key occurs more than once on either side.
///
/// The join still completes, emitting the cross product of matches, but row
/// counts no longer line up with the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinKeyDuplicationWarning {
    pub key: String,
    /// Matched key values occurring more than once on the left
    pub left_duplicates: usize,
    /// Matched key values occurring more than once on the right
    pub right_duplicates: usize,
    /// Rows emitted beyond one per matched key value
    pub extra_rows: usize,
}

impl fmt::Display for JoinKeyDuplicationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "join key '{}' is not unique ({} duplicated on the left, {} on the right, {} extra rows)",
            self.key, self.left_duplicates, self.right_duplicates, self.extra_rows
        )
    }
}

/// Output of [`inner_join`].
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub table: Table,
    pub warning: Option<JoinKeyDuplicationWarning>,
    /// Left rows without a partner on the right
    pub unmatched_left: usize,
    /// Right rows without a partner on the left
    pub unmatched_right: usize,
}

/// Inner join of two tables on a shared key column.
///
/// Rows come out in left order; each left row is followed by its matches in
/// right order. Missing keys never match. The right key column is dropped,
/// and the remaining right columns are appended after the left columns.
///
/// # Errors
/// `ColumnNotFound` when either side lacks `key`, `ColumnTypeMismatch` when
/// the key types differ, `DuplicateColumn` when `policy` cannot resolve a
/// name collision.
pub fn inner_join(left: &Table, right: &Table, key: &str, policy: &DuplicateColumns) -> Result<Joined> {
    let left_key = left.require_column(key)?;
    let right_key = right.require_column(key)?;

    let left_type = left.columns()[left_key].value_type;
    let right_type = right.columns()[right_key].value_type;
    if left_type != right_type {
        return Err(PipelineError::ColumnTypeMismatch {
            column: key.to_string(),
            expected: left_type.to_string(),
            found: right_type.to_string(),
        });
    }

    let right_keep: Vec<usize> = (0..right.num_columns()).filter(|&i| i != right_key).collect();
    let mut columns = left.columns().to_vec();
    for &i in &right_keep {
        let column = &right.columns()[i];
        let name = if left.column_index(&column.name).is_some() {
            match policy {
                DuplicateColumns::Reject => {
                    return Err(PipelineError::DuplicateColumn(column.name.clone()));
                }
                DuplicateColumns::Suffix(suffix) => format!("{}{}", column.name, suffix),
            }
        } else {
            column.name.clone()
        };
        columns.push(Column::new(name, column.value_type));
    }

    let mut right_index: HashMap<&Value, Vec<usize>> = HashMap::new();
    for (position, row) in right.rows().iter().enumerate() {
        if let Some(value) = row.get(right_key) {
            right_index.entry(value).or_default().push(position);
        }
    }

    let matched: Vec<Vec<Vec<Option<Value>>>> = left
        .rows()
        .par_iter()
        .map(|left_row| {
            let Some(matches) = left_row.get(left_key).and_then(|value| right_index.get(value)) else {
                return Vec::new();
            };
            matches
                .iter()
                .map(|&position| {
                    let right_row = &right.rows()[position];
                    let mut cells = left_row.cells().to_vec();
                    cells.extend(right_keep.iter().map(|&i| right_row.cells()[i].clone()));
                    cells
                })
                .collect()
        })
        .collect();
    let unmatched_left = matched.iter().filter(|rows| rows.is_empty()).count();
    let rows: Vec<Vec<Option<Value>>> = matched.into_iter().flatten().collect();

    let left_keys: HashSet<&Value> = left.rows().iter().filter_map(|row| row.get(left_key)).collect();
    let unmatched_right = right
        .rows()
        .iter()
        .filter(|row| row.get(right_key).map_or(true, |value| !left_keys.contains(value)))
        .count();

    let warning = duplication_warning(left, left_key, &right_index, key, rows.len());
    if let Some(warning) = &warning {
        warn!("{}", warning);
    }

    Ok(Joined {
        table: Table::new(columns, rows)?,
        warning,
        unmatched_left,
        unmatched_right,
    })
}

fn duplication_warning(
    left: &Table,
    left_key: usize,
    right_index: &HashMap<&Value, Vec<usize>>,
    key: &str,
    output_rows: usize,
) -> Option<JoinKeyDuplicationWarning> {
    let mut left_counts: HashMap<&Value, usize> = HashMap::new();
    for row in left.rows() {
        if let Some(value) = row.get(left_key) {
            if right_index.contains_key(value) {
                *left_counts.entry(value).or_default() += 1;
            }
        }
    }

    let left_duplicates = left_counts.values().filter(|&&count| count > 1).count();
    let right_duplicates = left_counts
        .keys()
        .filter(|value| right_index.get(*value).map_or(false, |rows| rows.len() > 1))
        .count();

    if left_duplicates == 0 && right_duplicates == 0 {
        return None;
    }

    Some(JoinKeyDuplicationWarning {
        key: key.to_string(),
        left_duplicates,
        right_duplicates,
        extra_rows: output_rows.saturating_sub(left_counts.len()),
    })
}
