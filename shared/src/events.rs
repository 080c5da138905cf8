use crate::sheets::SheetSource;
use crate::sheets::calls::EmergencyCall;
use crate::sheets::duty::DutyEvent;
use crate::sheets::personnel::PersonnelCategory;
use crate::sheets::vehicles::VehicleRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// First successful fetch of a source.
    Loaded,
    /// A later fetch whose records differ from the previous set.
    Updated,
}

#[derive(Debug, Clone)]
pub struct SheetUpdate<R> {
    pub kind: UpdateKind,
    pub records: Arc<[R]>,
}

impl<R> SheetUpdate<R> {
    pub fn new(kind: UpdateKind, records: Vec<R>) -> Self {
        Self {
            kind,
            records: records.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    Vehicles(SheetUpdate<VehicleRecord>),
    Duty(SheetUpdate<DutyEvent>),
    Calls(SheetUpdate<EmergencyCall>),
    Personnel(SheetUpdate<PersonnelCategory>),
}

impl DashboardEvent {
    pub const fn source(&self) -> SheetSource {
        match self {
            Self::Vehicles(_) => SheetSource::Vehicles,
            Self::Duty(_) => SheetSource::Duty,
            Self::Calls(_) => SheetSource::Calls,
            Self::Personnel(_) => SheetSource::Personnel,
        }
    }

    pub const fn kind(&self) -> UpdateKind {
        match self {
            Self::Vehicles(u) => u.kind,
            Self::Duty(u) => u.kind,
            Self::Calls(u) => u.kind,
            Self::Personnel(u) => u.kind,
        }
    }
}

/// In-process publish/subscribe channel between pollers and their consumers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DashboardEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publishes to every current subscriber. Publishing with none is not an error.
    pub fn publish(&self, event: DashboardEvent) {
        let source = event.source();
        match self.sender.send(event) {
            Ok(receivers) => trace!(%source, receivers, "published dashboard event"),
            Err(_) => trace!(%source, "published dashboard event without subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_typed_payloads() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(DashboardEvent::Personnel(SheetUpdate::new(
            UpdateKind::Loaded,
            vec![PersonnelCategory {
                category: "Maschinisten".into(),
                near: "1".into(),
                intermediate: "2".into(),
                far: "3".into(),
            }],
        )));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source(), SheetSource::Personnel);
        assert_eq!(event.kind(), UpdateKind::Loaded);
        let DashboardEvent::Personnel(update) = event else {
            panic!("unexpected event");
        };
        assert_eq!(update.records[0].far, "3");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(DashboardEvent::Duty(SheetUpdate::new(UpdateKind::Updated, vec![])));
    }
}
