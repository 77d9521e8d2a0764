//! Group-reduce and pivot.
//!
//! Both operations split the input into fixed-size partitions that are
//! grouped in parallel with rayon. A partial keeps, per group, the row
//! positions it saw; partials are merged in partition order, so every group
//! ends up with its rows in source order. The final reduction therefore
//! sums floats in the same order no matter how the rows were partitioned,
//! and output is identical to a single-threaded run.

use crate::error::{PipelineError, Result};
use crate::schema::Column;
use crate::table::{Row, Table};
use crate::value::{Value, ValueType};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Upper bound on the distinct spread values a pivot may turn into columns.
pub const MAX_PIVOT_COLUMNS: usize = 10_000;

/// Rows per partition for parallel grouping.
pub const PARTITION_ROWS: usize = 8192;

/// Reduction applied to the values of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateFn {
    Sum,
    Average,
    /// Average rounded half away from zero to the given number of decimals
    RoundedAverage(u32),
}

impl AggregateFn {
    /// Column name used when an aggregation has no alias.
    pub fn default_name(&self, column: &str) -> String {
        match self {
            AggregateFn::Sum => format!("sum({})", column),
            AggregateFn::Average => format!("avg({})", column),
            AggregateFn::RoundedAverage(precision) => {
                format!("round(avg({}), {})", column, precision)
            }
        }
    }

    /// Type of the reduced value for an input column type.
    pub fn output_type(&self, input: ValueType) -> ValueType {
        match (self, input) {
            (AggregateFn::Sum, ValueType::Integer) => ValueType::Integer,
            _ => ValueType::Float,
        }
    }

    /// Reduces present values; `None` when there are none.
    pub fn reduce<'a, I>(&self, values: I) -> Option<Value>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let values: Vec<&Value> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }

        match self {
            AggregateFn::Sum => {
                if values.iter().all(|v| matches!(v, Value::Integer(_))) {
                    let total: i128 = values
                        .iter()
                        .filter_map(|v| match v {
                            Value::Integer(i) => Some(i128::from(*i)),
                            _ => None,
                        })
                        .sum();
                    if let Ok(total) = i64::try_from(total) {
                        return Some(Value::Integer(total));
                    }
                    return Some(Value::float(total as f64));
                }
                Some(Value::float(values.iter().filter_map(|v| v.as_f64()).sum()))
            }
            AggregateFn::Average => mean(&values).map(Value::float),
            AggregateFn::RoundedAverage(precision) => {
                mean(&values).map(|avg| Value::float(round_half_away(avg, *precision)))
            }
        }
    }
}

fn mean(values: &[&Value]) -> Option<f64> {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    if numbers.is_empty() {
        return None;
    }
    Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
}

/// Rounds half away from zero on the shortest decimal form of `value`, so
/// `2.675` rounds to `2.68` even though its binary value is slightly lower.
pub fn round_half_away(value: f64, precision: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let text = value.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let places = precision as usize;
    if fraction.len() <= places {
        return value;
    }

    let digits = format!("{}{}", whole, &fraction[..places]);
    let Ok(mut scaled) = digits.parse::<u128>() else {
        let factor = 10f64.powi(precision as i32);
        return (value * factor).round() / factor;
    };
    if fraction.as_bytes()[places] >= b'5' {
        scaled += 1;
    }

    let rounded = format!("{}e-{}", scaled, precision)
        .parse::<f64>()
        .unwrap_or(value.abs());
    if value.is_sign_negative() {
        -rounded
    } else {
        rounded
    }
}

/// One reduced output column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub value_column: String,
    pub function: AggregateFn,
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(value_column: impl Into<String>, function: AggregateFn) -> Self {
        Aggregation {
            value_column: value_column.into(),
            function,
            alias: None,
        }
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.alias = Some(name.into());
        self
    }

    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.function.default_name(&self.value_column))
    }
}

type GroupKey = Vec<Option<Value>>;

/// Groups of row positions in first-occurrence order.
struct Groups {
    keys: Vec<GroupKey>,
    rows: Vec<Vec<usize>>,
}

fn group_rows(table: &Table, key_indices: &[usize], partition_rows: usize) -> Groups {
    let partition_rows = partition_rows.max(1);

    let partials: Vec<Groups> = table
        .rows()
        .par_chunks(partition_rows)
        .enumerate()
        .map(|(partition, chunk)| {
            let offset = partition * partition_rows;
            let mut lookup: HashMap<GroupKey, usize> = HashMap::new();
            let mut groups = Groups {
                keys: Vec::new(),
                rows: Vec::new(),
            };
            for (i, row) in chunk.iter().enumerate() {
                let key: GroupKey = key_indices.iter().map(|&k| row.get(k).cloned()).collect();
                let slot = *lookup.entry(key.clone()).or_insert_with(|| {
                    groups.keys.push(key);
                    groups.rows.push(Vec::new());
                    groups.rows.len() - 1
                });
                groups.rows[slot].push(offset + i);
            }
            groups
        })
        .collect();

    let mut lookup: HashMap<GroupKey, usize> = HashMap::new();
    let mut merged = Groups {
        keys: Vec::new(),
        rows: Vec::new(),
    };
    for partial in partials {
        for (key, rows) in partial.keys.into_iter().zip(partial.rows) {
            match lookup.get(&key) {
                Some(&slot) => merged.rows[slot].extend(rows),
                None => {
                    lookup.insert(key.clone(), merged.keys.len());
                    merged.keys.push(key);
                    merged.rows.push(rows);
                }
            }
        }
    }
    merged
}

fn numeric_column(table: &Table, name: &str) -> Result<usize> {
    let index = table.require_column(name)?;
    let found = table.columns()[index].value_type;
    if !found.is_numeric() {
        return Err(PipelineError::ColumnTypeMismatch {
            column: name.to_string(),
            expected: "numeric".to_string(),
            found: found.to_string(),
        });
    }
    Ok(index)
}

/// Group-by with one or more aggregations.
///
/// ```
/// use econ_reports::aggregate::{AggregateFn, Aggregation, GroupReduce};
///
/// let monthly = GroupReduce::new(&["REF_DATE"])
///     .aggregate(Aggregation::new("High", AggregateFn::Average).alias("Avg Highest Stock"))
///     .order_by("REF_DATE");
/// assert_eq!(monthly.output_names(), vec!["REF_DATE", "Avg Highest Stock"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReduce {
    group_by: Vec<String>,
    aggregations: Vec<Aggregation>,
    order_by: Option<String>,
}

impl GroupReduce {
    pub fn new(group_by: &[&str]) -> Self {
        GroupReduce {
            group_by: group_by.iter().map(|name| name.to_string()).collect(),
            aggregations: Vec::new(),
            order_by: None,
        }
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Sorts the output ascending on `column` instead of first-occurrence order.
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }

    pub fn output_names(&self) -> Vec<String> {
        self.group_by
            .iter()
            .cloned()
            .chain(self.aggregations.iter().map(Aggregation::output_name))
            .collect()
    }

    pub fn apply(&self, table: &Table) -> Result<Table> {
        self.apply_partitioned(table, PARTITION_ROWS)
    }

    pub(crate) fn apply_partitioned(&self, table: &Table, partition_rows: usize) -> Result<Table> {
        let key_indices = self
            .group_by
            .iter()
            .map(|name| table.require_column(name))
            .collect::<Result<Vec<_>>>()?;
        let value_indices = self
            .aggregations
            .iter()
            .map(|agg| numeric_column(table, &agg.value_column))
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<Column> = key_indices
            .iter()
            .map(|&i| table.columns()[i].clone())
            .collect();
        for (agg, &index) in self.aggregations.iter().zip(&value_indices) {
            let input = table.columns()[index].value_type;
            columns.push(Column::new(agg.output_name(), agg.function.output_type(input)));
        }

        let groups = group_rows(table, &key_indices, partition_rows);
        let rows: Vec<Vec<Option<Value>>> = groups
            .keys
            .into_par_iter()
            .zip(groups.rows.into_par_iter())
            .map(|(key, positions)| {
                let mut cells = key;
                for (agg, &index) in self.aggregations.iter().zip(&value_indices) {
                    let values = positions.iter().filter_map(|&p| table.rows()[p].get(index));
                    cells.push(agg.function.reduce(values));
                }
                cells
            })
            .collect();

        debug!(
            "Grouped {} rows into {} groups by {:?}",
            table.num_rows(),
            rows.len(),
            self.group_by
        );

        let reduced = Table::new(columns, rows)?;
        match &self.order_by {
            Some(column) => reduced.sort_by(column),
            None => Ok(reduced),
        }
    }
}

/// Groups by `group_by` and reduces one value column.
pub fn group_reduce(
    table: &Table,
    group_by: &[&str],
    value_column: &str,
    function: AggregateFn,
) -> Result<Table> {
    GroupReduce::new(group_by)
        .aggregate(Aggregation::new(value_column, function))
        .apply(table)
}

/// Long-to-wide reshape of one value column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotSpec {
    pub group_by: Vec<String>,
    pub spread_column: String,
    pub value_column: String,
    pub function: AggregateFn,
    pub order_by: Option<String>,
}

impl PivotSpec {
    pub fn new(
        group_by: &[&str],
        spread_column: impl Into<String>,
        value_column: impl Into<String>,
        function: AggregateFn,
    ) -> Self {
        PivotSpec {
            group_by: group_by.iter().map(|name| name.to_string()).collect(),
            spread_column: spread_column.into(),
            value_column: value_column.into(),
            function,
            order_by: None,
        }
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }
}

/// Pivot output together with the rows it could not place.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivoted {
    pub table: Table,
    /// Rows excluded because their spread value was missing
    pub missing_category: usize,
}

/// Spreads `spec.spread_column` into one column per distinct value.
///
/// Every distinct value seen anywhere in the input becomes a column, named
/// by the value's text and ordered ascending (lexicographic for text). A
/// group without rows for a category gets a missing cell.
///
/// # Errors
/// `PivotCardinality` when there are more than [`MAX_PIVOT_COLUMNS`]
/// distinct values; `DuplicateColumn` when a value's name equals a group-by
/// column.
pub fn pivot(table: &Table, spec: &PivotSpec) -> Result<Table> {
    pivot_counted(table, spec, PARTITION_ROWS).map(|pivoted| pivoted.table)
}

pub(crate) fn pivot_counted(table: &Table, spec: &PivotSpec, partition_rows: usize) -> Result<Pivoted> {
    let key_indices = spec
        .group_by
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<Vec<_>>>()?;
    let spread_index = table.require_column(&spec.spread_column)?;
    let value_index = numeric_column(table, &spec.value_column)?;
    let partition_rows = partition_rows.max(1);

    // first pass: every category in the table
    let categories: BTreeSet<Value> = table
        .rows()
        .par_chunks(partition_rows)
        .map(|chunk| {
            chunk
                .iter()
                .filter_map(|row| row.get(spread_index).cloned())
                .collect::<BTreeSet<Value>>()
        })
        .reduce(BTreeSet::new, |mut left, right| {
            left.extend(right);
            left
        });

    if categories.len() > MAX_PIVOT_COLUMNS {
        return Err(PipelineError::PivotCardinality {
            column: spec.spread_column.clone(),
            limit: MAX_PIVOT_COLUMNS,
            found: categories.len(),
        });
    }
    let categories: Vec<Value> = categories.into_iter().collect();

    let present = table.filter_rows(|row| row.get(spread_index).is_some());
    let missing_category = table.num_rows() - present.num_rows();
    if missing_category > 0 {
        debug!(
            "Pivot on '{}' excluded {} rows without a category",
            spec.spread_column, missing_category
        );
    }

    let value_type = spec
        .function
        .output_type(table.columns()[value_index].value_type);
    let mut columns: Vec<Column> = key_indices
        .iter()
        .map(|&i| table.columns()[i].clone())
        .collect();
    columns.extend(
        categories
            .iter()
            .map(|category| Column::new(category.to_string(), value_type)),
    );

    // second pass: one output row per group key
    let groups = group_rows(&present, &key_indices, partition_rows);
    let rows: Vec<Vec<Option<Value>>> = groups
        .keys
        .into_par_iter()
        .zip(groups.rows.into_par_iter())
        .map(|(key, positions)| {
            let mut by_category: HashMap<&Value, Vec<&Value>> = HashMap::new();
            for &p in &positions {
                let row: &Row = &present.rows()[p];
                if let Some(category) = row.get(spread_index) {
                    let entry = by_category.entry(category).or_default();
                    if let Some(value) = row.get(value_index) {
                        entry.push(value);
                    }
                }
            }

            let mut cells = key;
            cells.extend(categories.iter().map(|category| {
                by_category
                    .get(category)
                    .and_then(|values| spec.function.reduce(values.iter().copied()))
            }));
            cells
        })
        .collect();

    let table = Table::new(columns, rows)?;
    let table = match &spec.order_by {
        Some(column) => table.sort_by(column)?,
        None => table,
    };

    Ok(Pivoted {
        table,
        missing_category,
    })
}
