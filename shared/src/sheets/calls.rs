use crate::csv::Row;
use crate::events::{DashboardEvent, SheetUpdate};
use crate::sheets::clock::{minutes_of_day, parse_clock_minutes};
use crate::sheets::layout::ColumnMap;
use crate::sheets::{SheetRecord, SheetSource};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Lifecycle of an emergency call as entered in the sheet.
///
/// `Armed` calls are prepared ahead of time and only appear once their start time is
/// reached. Anything the sheet carries that is not one of the known values is kept
/// verbatim in `Other` and never displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallStatus {
    Armed,
    Demo,
    Active,
    Completed,
    Other(String),
}

impl CallStatus {
    /// Display rank: demo, then active, then completed, then everything else.
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Demo => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Armed | Self::Other(_) => 3,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Armed => "armed",
            Self::Demo => "demo",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for CallStatus {
    fn from(value: &str) -> Self {
        let lower = value.trim().to_lowercase();
        match lower.as_str() {
            "armed" => Self::Armed,
            "demo" => Self::Demo,
            "active" => Self::Active,
            "completed" => Self::Completed,
            _ => Self::Other(lower),
        }
    }
}

impl From<String> for CallStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<CallStatus> for String {
    fn from(value: CallStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incident ("Einsatz") from the emergency call sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCall {
    #[serde(rename = "type")]
    pub call_type: String,
    pub description: String,
    /// Alarm time, `HH:MM`.
    pub time: String,
    pub location: String,
    /// Comma-joined vehicle names.
    pub vehicles: String,
    /// When an armed call becomes visible, `HH:MM`.
    pub start_time: String,
    pub status: CallStatus,
}

impl EmergencyCall {
    pub fn should_display(&self, now: NaiveDateTime) -> bool {
        match self.status {
            CallStatus::Demo | CallStatus::Active | CallStatus::Completed => true,
            CallStatus::Armed => {
                let start = if self.start_time.trim().is_empty() {
                    Some(0)
                } else {
                    parse_clock_minutes(&self.start_time)
                };
                start.is_some_and(|start| minutes_of_day(now) >= start)
            }
            CallStatus::Other(_) => false,
        }
    }

    pub fn vehicle_list(&self) -> Vec<&str> {
        self.vehicles
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.status == CallStatus::Completed
    }

    /// Alarm time in minutes; blank or unreadable times count as midnight.
    fn time_minutes(&self) -> u32 {
        parse_clock_minutes(&self.time).unwrap_or(0)
    }
}

/// Orders calls by status priority, latest alarm first within the same status.
pub fn sort_calls(calls: &mut [EmergencyCall]) {
    calls.sort_by(|a, b| {
        a.status
            .priority()
            .cmp(&b.status.priority())
            .then_with(|| b.time_minutes().cmp(&a.time_minutes()))
    });
}

/// The calls as displayed: visible ones only, in display order, at most `limit`.
pub fn displayed_calls(calls: &[EmergencyCall], now: NaiveDateTime, limit: usize) -> Vec<EmergencyCall> {
    let mut visible: Vec<EmergencyCall> = calls
        .iter()
        .filter(|call| call.should_display(now))
        .cloned()
        .collect();
    sort_calls(&mut visible);
    visible.truncate(limit);
    visible
}

impl SheetRecord for EmergencyCall {
    const SOURCE: SheetSource = SheetSource::Calls;
    const MIN_ROWS: usize = 2;

    fn default_layout() -> ColumnMap {
        ColumnMap::new(vec![
            ColumnMap::required("type", 1),
            ColumnMap::required("description", 2),
            ColumnMap::required("time", 4),
            ColumnMap::optional("location", 5),
            ColumnMap::optional("vehicles", 6),
            ColumnMap::required("start_time", 4),
            ColumnMap::required("status", 7),
        ])
    }

    fn from_rows(rows: &[Row], layout: &ColumnMap) -> Vec<Self> {
        rows.iter()
            .skip(1)
            .filter_map(|row| {
                let call_type = layout.cell(row, "type");
                let description = layout.cell(row, "description");
                let time = layout.cell(row, "time");
                if call_type.is_empty() && description.is_empty() && time.is_empty() {
                    return None;
                }

                Some(Self {
                    call_type: call_type.to_string(),
                    description: description.to_string(),
                    time: time.to_string(),
                    location: layout.cell(row, "location").to_string(),
                    vehicles: layout.cell(row, "vehicles").to_string(),
                    start_time: layout.cell(row, "start_time").to_string(),
                    status: CallStatus::from(layout.cell(row, "status")),
                })
            })
            .collect()
    }

    fn into_event(update: SheetUpdate<Self>) -> DashboardEvent {
        DashboardEvent::Calls(update)
    }
}
