use crate::csv::Row;
use crate::events::{DashboardEvent, SheetUpdate};
use crate::sheets::clock::{minutes_of_day, parse_clock_minutes, parse_sheet_date};
use crate::sheets::layout::ColumnMap;
use crate::sheets::{SheetRecord, SheetSource};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A scheduled, non-emergency entry from the duty roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyEvent {
    pub title: String,
    /// `DD.MM.YY`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    pub participants: String,
}

impl DutyEvent {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_sheet_date(&self.date)
    }

    /// Whether the event is over and should drop off the roster display.
    ///
    /// Events whose date cannot be read, or that fall on today without a readable end
    /// time, count as passed so they are never shown.
    pub fn is_passed(&self, now: NaiveDateTime) -> bool {
        let Some(date) = self.parsed_date() else {
            return true;
        };

        match date.cmp(&now.date()) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => {
                parse_clock_minutes(&self.end_time).is_none_or(|end| minutes_of_day(now) >= end)
            }
        }
    }

    /// True while `start <= now < end` on the event's own day.
    pub fn is_current(&self, now: NaiveDateTime) -> bool {
        if self.parsed_date() != Some(now.date()) {
            return false;
        }

        match (
            parse_clock_minutes(&self.start_time),
            parse_clock_minutes(&self.end_time),
        ) {
            (Some(start), Some(end)) => {
                let now = minutes_of_day(now);
                start <= now && now < end
            }
            _ => false,
        }
    }

    /// Start of the event as one timestamp; `None` when date or start is unreadable.
    fn starts_at(&self) -> Option<NaiveDateTime> {
        let date = self.parsed_date()?;
        let minutes = parse_clock_minutes(&self.start_time)?;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(minutes.min(24 * 60 - 1) * 60, 0)?;
        Some(date.and_time(time))
    }

    fn end_minutes(&self) -> u32 {
        parse_clock_minutes(&self.end_time).unwrap_or(0)
    }
}

/// Orders events chronologically by start, then by end time.
///
/// Unreadable starts sort first. The sort is stable.
pub fn sort_duty_events(events: &mut [DutyEvent]) {
    events.sort_by(|a, b| {
        a.starts_at()
            .cmp(&b.starts_at())
            .then_with(|| a.end_minutes().cmp(&b.end_minutes()))
    });
}

/// The roster as displayed: chronological, passed events removed, at most `limit`.
pub fn upcoming_duty_events(events: &[DutyEvent], now: NaiveDateTime, limit: usize) -> Vec<DutyEvent> {
    let mut sorted = events.to_vec();
    sort_duty_events(&mut sorted);
    sorted
        .into_iter()
        .filter(|event| !event.is_passed(now))
        .take(limit)
        .collect()
}

impl SheetRecord for DutyEvent {
    const SOURCE: SheetSource = SheetSource::Duty;
    const MIN_ROWS: usize = 2;

    fn default_layout() -> ColumnMap {
        ColumnMap::new(vec![
            ColumnMap::required("title", 0),
            ColumnMap::optional("participants", 1),
            ColumnMap::required("date", 2),
            ColumnMap::required("start_time", 3),
            ColumnMap::required("end_time", 4),
        ])
    }

    fn from_rows(rows: &[Row], layout: &ColumnMap) -> Vec<Self> {
        rows.iter()
            .skip(1)
            .filter_map(|row| {
                let title = layout.cell(row, "title");
                let start_time = layout.cell(row, "start_time");
                let end_time = layout.cell(row, "end_time");
                if title.is_empty() && start_time.is_empty() && end_time.is_empty() {
                    return None;
                }

                Some(Self {
                    title: title.to_string(),
                    date: layout.cell(row, "date").to_string(),
                    start_time: start_time.to_string(),
                    end_time: end_time.to_string(),
                    participants: layout.cell(row, "participants").to_string(),
                })
            })
            .collect()
    }

    fn into_event(update: SheetUpdate<Self>) -> DashboardEvent {
        DashboardEvent::Duty(update)
    }
}
