use crate::csv::Row;
use crate::events::{DashboardEvent, SheetUpdate};
use crate::sheets::layout::ColumnMap;
use crate::sheets::{SheetRecord, SheetSource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static CALL_SIGN_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)-").expect("call sign pattern is valid"));

static STATUS_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("status pattern is valid"));

/// One apparatus from the vehicle roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub designation: String,
    pub call_sign: String,
    pub status: String,
    pub license_plate: String,
    pub vehicle_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleKind {
    /// Crew transport.
    Mtw,
    /// Rescue engine.
    Hlf,
    /// Large tanker.
    Gtlf,
}

impl VehicleKind {
    /// Maps the type number of a radio call sign (`27/19-01` -> `19`).
    pub fn from_call_sign(call_sign: &str) -> Self {
        let type_number = CALL_SIGN_TYPE
            .captures(call_sign)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());

        match type_number {
            Some("43") => Self::Hlf,
            Some("26") => Self::Gtlf,
            _ => Self::Mtw,
        }
    }
}

impl VehicleRecord {
    /// Radio status number (1-9) carried in the status cell.
    pub fn status_code(&self) -> Option<u8> {
        STATUS_DIGITS
            .find(&self.status)
            .and_then(|m| m.as_str().parse().ok())
    }

    pub fn kind(&self) -> VehicleKind {
        VehicleKind::from_call_sign(&self.call_sign)
    }

    pub fn radio_name(&self, prefix: &str) -> String {
        format!("{prefix} {} ({})", self.call_sign, self.designation)
    }
}

impl SheetRecord for VehicleRecord {
    const SOURCE: SheetSource = SheetSource::Vehicles;
    const MIN_ROWS: usize = 3;

    /// Indices are rows: the vehicle sheet lists one vehicle per column.
    fn default_layout() -> ColumnMap {
        ColumnMap::new(vec![
            ColumnMap::required("designation", 0),
            ColumnMap::required("call_sign", 1),
            ColumnMap::required("status", 2),
            ColumnMap::optional("license_plate", 3),
            ColumnMap::optional("vehicle_type", 4),
        ])
    }

    /// Row labels live in the first column.
    fn header_cells(rows: &[Row]) -> Vec<&str> {
        rows.iter()
            .map(|row| row.first().map_or("", String::as_str))
            .collect()
    }

    fn from_rows(rows: &[Row], layout: &ColumnMap) -> Vec<Self> {
        let width = rows.first().map_or(0, Vec::len);

        (1..width)
            .filter_map(|col| {
                let column: Vec<String> = rows
                    .iter()
                    .map(|row| row.get(col).cloned().unwrap_or_default())
                    .collect();

                let designation = layout.cell(&column, "designation");
                let call_sign = layout.cell(&column, "call_sign");
                let status = layout.cell(&column, "status");
                if designation.is_empty() && call_sign.is_empty() && status.is_empty() {
                    return None;
                }

                Some(Self {
                    designation: designation.to_string(),
                    call_sign: call_sign.to_string(),
                    status: status.to_string(),
                    license_plate: layout.cell(&column, "license_plate").to_string(),
                    vehicle_type: layout.cell(&column, "vehicle_type").to_string(),
                })
            })
            .collect()
    }

    fn into_event(update: SheetUpdate<Self>) -> DashboardEvent {
        DashboardEvent::Vehicles(update)
    }
}
