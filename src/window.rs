use crate::date_key::DateKey;
use crate::error::{PipelineError, Result};
use crate::table::Table;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range of calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct DateWindow {
    start: DateKey,
    end: DateKey,
}

#[derive(Deserialize)]
struct WindowBounds {
    start: DateKey,
    end: DateKey,
}

impl TryFrom<WindowBounds> for DateWindow {
    type Error = PipelineError;

    fn try_from(bounds: WindowBounds) -> Result<Self> {
        DateWindow::new(bounds.start, bounds.end)
    }
}

impl DateWindow {
    /// Creates a window covering `start` through `end`, both included.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidDateRange` if `start` is after `end`.
    pub fn new(start: DateKey, end: DateKey) -> Result<Self> {
        if start > end {
            return Err(PipelineError::InvalidDateRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(DateWindow { start, end })
    }

    /// Parses two `YYYY-MM` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = start.parse::<DateKey>()?;
        let end = end.parse::<DateKey>()?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateKey {
        self.start
    }

    pub fn end(&self) -> DateKey {
        self.end
    }

    pub fn contains(&self, key: DateKey) -> bool {
        self.start <= key && key <= self.end
    }
}

impl Default for DateWindow {
    /// January 2010 through October 2020.
    fn default() -> Self {
        DateWindow {
            start: DateKey::from_valid_month(2010, 1),
            end: DateKey::from_valid_month(2020, 10),
        }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Keeps rows whose `date_column` falls inside `window`.
///
/// Rows with a missing date are dropped.
///
/// # Errors
/// Returns `PipelineError::ColumnTypeMismatch` unless the column holds dates.
pub fn window(table: &Table, date_column: &str, window: &DateWindow) -> Result<Table> {
    let index = table.require_typed_column(date_column, ValueType::Date)?;
    let kept = table.filter_rows(|row| {
        row.get(index)
            .and_then(Value::as_date)
            .map_or(false, |key| window.contains(key))
    });
    tracing::debug!(
        "Window {} on '{}' kept {} of {} rows",
        window,
        date_column,
        kept.num_rows(),
        table.num_rows()
    );
    Ok(kept)
}
