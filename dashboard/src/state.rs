use crate::map::MapOverlay;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use shared::Config;
use shared::config::{DisplayConfig, SheetsConfig};
use shared::events::DashboardEvent;
use shared::sheets::SheetSource;
use shared::sheets::calls::EmergencyCall;
use shared::sheets::duty::DutyEvent;
use shared::sheets::personnel::PersonnelCategory;
use shared::sheets::vehicles::VehicleRecord;
use shared::weather::WeatherReport;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A source counts as stale after this many missed intervals.
const STALE_AFTER_INTERVALS: i32 = 3;

pub type Records<R> = Arc<RwLock<Option<Arc<[R]>>>>;
pub type SharedHealth = Arc<RwLock<SourceHealth>>;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub interval_seconds: u64,
    pub last_attempted: Option<DateTime<Utc>>,
    pub last_successful: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SourceHealth {
    fn new(interval_seconds: u64) -> Self {
        Self {
            interval_seconds,
            ..Self::default()
        }
    }

    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        // Intervals too large to represent never count as healthy.
        let allowed = i64::try_from(self.interval_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|interval| interval.checked_mul(STALE_AFTER_INTERVALS));
        let Some(allowed) = allowed else {
            return false;
        };
        self.last_successful
            .is_some_and(|successful| now - successful <= allowed)
    }
}

#[derive(Clone)]
pub struct Health {
    pub vehicles: SharedHealth,
    pub duty: SharedHealth,
    pub calls: SharedHealth,
    pub personnel: SharedHealth,
}

impl Health {
    fn new(sheets: &SheetsConfig) -> Self {
        let health = |source| Arc::new(RwLock::new(SourceHealth::new(sheets.source(source).interval_seconds)));
        Self {
            vehicles: health(SheetSource::Vehicles),
            duty: health(SheetSource::Duty),
            calls: health(SheetSource::Calls),
            personnel: health(SheetSource::Personnel),
        }
    }

    pub const fn source(&self, source: SheetSource) -> &SharedHealth {
        match source {
            SheetSource::Vehicles => &self.vehicles,
            SheetSource::Duty => &self.duty,
            SheetSource::Calls => &self.calls,
            SheetSource::Personnel => &self.personnel,
        }
    }
}

/// Latest record sets and derived overlays, shared between the subscriber tasks and the API.
#[derive(Clone)]
pub struct DashboardState {
    pub display: Arc<DisplayConfig>,
    pub vehicles: Records<VehicleRecord>,
    pub duty: Records<DutyEvent>,
    pub calls: Records<EmergencyCall>,
    pub personnel: Records<PersonnelCategory>,
    pub map: Arc<RwLock<Option<MapOverlay>>>,
    pub weather: Arc<RwLock<Option<WeatherReport>>>,
    pub weather_enabled: bool,
    pub health: Health,
}

impl DashboardState {
    pub fn new(config: &Config) -> Self {
        Self {
            display: Arc::new(config.display.clone()),
            vehicles: Arc::default(),
            duty: Arc::default(),
            calls: Arc::default(),
            personnel: Arc::default(),
            map: Arc::default(),
            weather: Arc::default(),
            weather_enabled: config
                .weather
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty()),
            health: Health::new(&config.sheets),
        }
    }

    pub fn apply(&self, event: DashboardEvent) {
        debug!(source = %event.source(), kind = ?event.kind(), "applying dashboard event");
        match event {
            DashboardEvent::Vehicles(update) => *self.vehicles.write() = Some(update.records),
            DashboardEvent::Duty(update) => *self.duty.write() = Some(update.records),
            DashboardEvent::Calls(update) => *self.calls.write() = Some(update.records),
            DashboardEvent::Personnel(update) => *self.personnel.write() = Some(update.records),
        }
    }
}

pub async fn run_state_subscriber(
    state: DashboardState,
    mut events: Receiver<DashboardEvent>,
    shutdown: CancellationToken,
) {
    info!("started dashboard state subscriber");
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => state.apply(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "state subscriber lagged behind the event bus");
                }
                Err(RecvError::Closed) => break,
            },
            () = shutdown.cancelled() => {
                info!("shutdown requested, exiting state subscriber");
                break;
            }
        }
    }
}
