use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Parses a `DD.MM.YY` sheet date. Two-digit years are taken as `20YY`.
pub fn parse_sheet_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.trim().split('.');
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(2000_i32.checked_add(year)?, month, day)
}

/// Parses `HH:MM` into minutes since midnight. Extra `:SS` parts are ignored.
///
/// Hours are not capped at 23 so that an end time of `24:00` still sorts after
/// everything else on the same day.
pub fn parse_clock_minutes(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours = parts.next()?.trim().parse::<u32>().ok()?;
    let minutes = parts.next()?.trim().parse::<u32>().ok()?;

    hours.checked_mul(60)?.checked_add(minutes)
}

pub fn minutes_of_day(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_dates_are_twenty_first_century() {
        assert_eq!(
            parse_sheet_date("05.03.25"),
            NaiveDate::from_ymd_opt(2025, 3, 5)
        );
        assert_eq!(
            parse_sheet_date(" 5.3.25 "),
            NaiveDate::from_ymd_opt(2025, 3, 5)
        );
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert_eq!(parse_sheet_date(""), None);
        assert_eq!(parse_sheet_date("morgen"), None);
        assert_eq!(parse_sheet_date("05.03"), None);
        assert_eq!(parse_sheet_date("31.02.25"), None);
        assert_eq!(parse_sheet_date("05.03.25.1"), None);
        assert_eq!(parse_sheet_date("01.01.2147483000"), None);
        assert_eq!(parse_sheet_date("01.01.-2147483647"), None);
    }

    #[test]
    fn clock_minutes() {
        assert_eq!(parse_clock_minutes("09:30"), Some(570));
        assert_eq!(parse_clock_minutes("9:05:59"), Some(545));
        assert_eq!(parse_clock_minutes("24:00"), Some(1440));
        assert_eq!(parse_clock_minutes("9"), None);
        assert_eq!(parse_clock_minutes("ab:cd"), None);
        assert_eq!(parse_clock_minutes(""), None);
    }
}
