pub mod calls;
pub mod clock;
pub mod duty;
pub mod layout;
pub mod personnel;
pub mod vehicles;

use crate::csv::{Row, tokenize};
use crate::events::{DashboardEvent, SheetUpdate};
use layout::{ColumnMap, SchemaError};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{debug, warn};

/// The spreadsheet tabs the dashboard polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetSource {
    Vehicles,
    Duty,
    Calls,
    Personnel,
}

impl SheetSource {
    pub const ALL: [Self; 4] = [Self::Vehicles, Self::Duty, Self::Calls, Self::Personnel];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Vehicles => "vehicles",
            Self::Duty => "duty",
            Self::Calls => "calls",
            Self::Personnel => "personnel",
        }
    }
}

impl Display for SheetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A record type that is mapped from one spreadsheet tab.
pub trait SheetRecord: Clone + PartialEq + Serialize + Send + Sync + 'static {
    const SOURCE: SheetSource;

    /// Exports with fewer rows than this carry no data.
    const MIN_ROWS: usize;

    /// When set, a fetch that parses to no records leaves the previous set in place.
    const KEEP_PREVIOUS_WHEN_EMPTY: bool = false;

    fn default_layout() -> ColumnMap;

    /// Cells the layout is validated against. Row-oriented sheets use their first row.
    fn header_cells(rows: &[Row]) -> Vec<&str> {
        rows.first()
            .map(|row| row.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn from_rows(rows: &[Row], layout: &ColumnMap) -> Vec<Self>;

    fn into_event(update: SheetUpdate<Self>) -> DashboardEvent;
}

/// Tokenizes an export and maps it into records of type `R`.
///
/// A short export is not an error: it is logged and yields an empty set.
pub fn parse_sheet<R: SheetRecord>(text: &str, layout: &ColumnMap) -> Result<Vec<R>, SchemaError> {
    let rows = tokenize(text);
    if rows.len() < R::MIN_ROWS {
        warn!(
            source = %R::SOURCE,
            rows = rows.len(),
            min_rows = R::MIN_ROWS,
            "sheet export has too few rows, treating as empty"
        );
        return Ok(Vec::new());
    }

    layout.validate(&R::header_cells(&rows))?;
    let records = R::from_rows(&rows, layout);
    debug!(source = %R::SOURCE, count = records.len(), "parsed sheet export");

    Ok(records)
}
