/// Outcome of comparing a freshly parsed record set with the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Initial,
    Changed,
    Unchanged,
}

/// Holds the last accepted record set of one source.
///
/// Equality is whole-collection and order-sensitive: moving a row counts as a change
/// even when no value differs.
#[derive(Debug)]
pub struct ChangeDetector<R> {
    previous: Option<Vec<R>>,
}

impl<R> Default for ChangeDetector<R> {
    fn default() -> Self {
        Self { previous: None }
    }
}

impl<R: PartialEq + Clone> ChangeDetector<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `records` with the previous set and keeps them when they differ.
    pub fn observe(&mut self, records: &[R]) -> Change {
        let change = match self.previous.as_deref() {
            None => Change::Initial,
            Some(previous) if previous == records => Change::Unchanged,
            Some(_) => Change::Changed,
        };

        if change != Change::Unchanged {
            self.previous = Some(records.to_vec());
        }
        change
    }

    pub fn current(&self) -> Option<&[R]> {
        self.previous.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::duty::DutyEvent;
    use crate::sheets::layout::ColumnMap;
    use crate::sheets::{SheetRecord, parse_sheet};

    const ROSTER: &str = "Titel,Betrifft,Datum,Beginn,Ende\n\
                          Übungsdienst,Alle,05.03.25,19:00,21:00\n\
                          Wartung,Maschinisten,06.03.25,10:00,12:00";

    fn parse(csv: &str, layout: &ColumnMap) -> Vec<DutyEvent> {
        parse_sheet::<DutyEvent>(csv, layout).unwrap()
    }

    #[test]
    fn identical_text_is_unchanged() {
        let layout = DutyEvent::default_layout();
        let mut detector = ChangeDetector::new();

        assert_eq!(detector.observe(&parse(ROSTER, &layout)), Change::Initial);
        assert_eq!(detector.observe(&parse(ROSTER, &layout)), Change::Unchanged);
    }

    #[test]
    fn single_field_edit_is_a_change() {
        let layout = DutyEvent::default_layout();
        let mut detector = ChangeDetector::new();
        detector.observe(&parse(ROSTER, &layout));

        let edited = ROSTER.replace("21:00", "21:30");
        assert_eq!(detector.observe(&parse(&edited, &layout)), Change::Changed);
        assert_eq!(detector.current().unwrap()[0].end_time, "21:30");
    }

    #[test]
    fn reordering_is_a_change() {
        let mut detector = ChangeDetector::new();
        detector.observe(&[1, 2, 3]);
        assert_eq!(detector.observe(&[3, 2, 1]), Change::Changed);
        assert_eq!(detector.observe(&[3, 2, 1]), Change::Unchanged);
    }

    #[test]
    fn empty_after_data_is_a_change() {
        let mut detector = ChangeDetector::new();
        detector.observe(&["a"]);
        assert_eq!(detector.observe(&[]), Change::Changed);
        assert_eq!(detector.current(), Some(&[][..]));
    }
}
