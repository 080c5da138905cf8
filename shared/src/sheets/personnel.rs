use crate::csv::Row;
use crate::events::{DashboardEvent, SheetUpdate};
use crate::sheets::layout::ColumnMap;
use crate::sheets::{SheetRecord, SheetSource};
use serde::{Deserialize, Serialize};

/// Categories in display order, keyed by layout field.
const CATEGORIES: [(&str, &str); 4] = [
    ("machinists", "Maschinisten"),
    ("group_leaders", "Gruppenführer"),
    ("youth_wardens", "Jugendwärte"),
    ("youth_members", "Jugendliche"),
];

/// Available members of one qualification, per response distance band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonnelCategory {
    pub category: String,
    pub near: String,
    pub intermediate: String,
    pub far: String,
}

impl SheetRecord for PersonnelCategory {
    const SOURCE: SheetSource = SheetSource::Personnel;
    /// Header plus the near, intermediate and far band rows.
    const MIN_ROWS: usize = 4;
    const KEEP_PREVIOUS_WHEN_EMPTY: bool = true;

    fn default_layout() -> ColumnMap {
        ColumnMap::new(
            CATEGORIES
                .iter()
                .zip(1..)
                .map(|(&(field, _), index)| ColumnMap::required(field, index))
                .collect(),
        )
    }

    fn from_rows(rows: &[Row], layout: &ColumnMap) -> Vec<Self> {
        let [_, near, intermediate, far, ..] = rows else {
            return Vec::new();
        };

        let count = |row: &Row, field: &str| {
            let cell = layout.cell(row, field);
            (if cell.is_empty() { "0" } else { cell }).to_string()
        };

        CATEGORIES
            .iter()
            .map(|(field, name)| Self {
                category: (*name).to_string(),
                near: count(near, field),
                intermediate: count(intermediate, field),
                far: count(far, field),
            })
            .collect()
    }

    fn into_event(update: SheetUpdate<Self>) -> DashboardEvent {
        DashboardEvent::Personnel(update)
    }
}
