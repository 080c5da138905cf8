use crate::error::FetchError;
use crate::state::SharedHealth;
use chrono::Utc;
use reqwest::Client;
use shared::change::{Change, ChangeDetector};
use shared::config::SheetsConfig;
use shared::events::{EventBus, SheetUpdate, UpdateKind};
use shared::sheets::layout::ColumnMap;
use shared::sheets::{SheetRecord, parse_sheet};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Fetches one sheet export on a fixed interval and publishes its changes.
pub struct SheetPoller<R: SheetRecord> {
    client: Client,
    url: String,
    layout: ColumnMap,
    interval: Duration,
    timeout: Duration,
    bus: EventBus,
    health: SharedHealth,
    detector: ChangeDetector<R>,
}

impl<R: SheetRecord> SheetPoller<R> {
    pub fn new(
        client: Client,
        sheets: &SheetsConfig,
        layout: ColumnMap,
        bus: EventBus,
        health: SharedHealth,
    ) -> Self {
        let source = sheets.source(R::SOURCE);
        Self {
            client,
            url: sheets.export_url(R::SOURCE),
            layout,
            interval: source.interval(),
            timeout: source.timeout(),
            bus,
            health,
            detector: ChangeDetector::new(),
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(name: "poller.started", source = %R::SOURCE, interval = ?self.interval, "started sheet poller");
        let mut initial_loop = true;
        loop {
            if initial_loop {
                initial_loop = false;
            } else {
                tokio::select! {
                    () = sleep(self.interval) => {},
                    () = shutdown.cancelled() => break,
                }
            }

            match self.poll_once(&shutdown).await {
                Ok(Some(kind)) => info!(source = %R::SOURCE, ?kind, "published sheet update"),
                Ok(None) => {}
                Err(FetchError::Cancelled) => break,
                // Logged and recorded in poll_once; the next attempt waits a full interval.
                Err(_) => {}
            }
        }
        info!(name: "poller.stopped", source = %R::SOURCE, "shutdown requested, exiting sheet poller");
    }

    /// One fetch-parse-publish cycle. Returns the kind of update published, if any.
    pub async fn poll_once(&mut self, shutdown: &CancellationToken) -> Result<Option<UpdateKind>, FetchError> {
        let now = Utc::now();
        self.health.write().last_attempted = Some(now);

        let records = match self.fetch(shutdown).await {
            Ok(text) => parse_sheet::<R>(&text, &self.layout).map_err(FetchError::from),
            Err(e) => Err(e),
        };

        match records {
            Ok(records) => {
                self.health.write().last_successful = Some(now);
                Ok(self.publish(records))
            }
            Err(e) => {
                match &e {
                    FetchError::Cancelled => debug!(source = %R::SOURCE, "sheet fetch cancelled"),
                    FetchError::Schema(schema) => {
                        error!(source = %R::SOURCE, error = %schema, "sheet export does not match its column layout");
                    }
                    _ => warn!(source = %R::SOURCE, error = ?e, "failed to fetch sheet export"),
                }
                if !matches!(e, FetchError::Cancelled) {
                    self.health.write().last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    fn publish(&mut self, records: Vec<R>) -> Option<UpdateKind> {
        if records.is_empty() && R::KEEP_PREVIOUS_WHEN_EMPTY {
            debug!(source = %R::SOURCE, "sheet export parsed to no records, keeping previous set");
            return None;
        }

        let kind = match self.detector.observe(&records) {
            Change::Initial => UpdateKind::Loaded,
            Change::Changed => UpdateKind::Updated,
            Change::Unchanged => {
                debug!(source = %R::SOURCE, "found no change to sheet export");
                return None;
            }
        };

        self.bus.publish(R::into_event(SheetUpdate::new(kind, records)));
        Some(kind)
    }

    #[instrument(skip_all, fields(source = %R::SOURCE))]
    async fn fetch(&self, shutdown: &CancellationToken) -> Result<String, FetchError> {
        let request = async {
            self.client
                .get(&self.url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        };

        tokio::select! {
            () = shutdown.cancelled() => Err(FetchError::Cancelled),
            response = timeout(self.timeout, request) => match response {
                Ok(text) => Ok(text?),
                Err(_) => Err(FetchError::Timeout(self.timeout)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceHealth;
    use httptest::matchers::request;
    use httptest::responders::{delay_and_then, status_code};
    use httptest::{Expectation, Server};
    use parking_lot::RwLock;
    use shared::events::DashboardEvent;
    use shared::sheets::calls::EmergencyCall;
    use shared::sheets::personnel::PersonnelCategory;
    use std::sync::Arc;

    const CALLS: &str = "Nr,Einsatzart,Stichwort,Datum,Alarm,Ort,Fahrzeuge,Status\n\
                         1,Brand,B2,05.03.25,08:15,Hauptstraße 5,HLF;MTW,active";

    const PERSONNEL: &str = "Entfernung,Maschinisten,Gruppenführer,Jugendwärte,Jugendliche\n\
                             Nah,2,1,0,4\n\
                             Mittel,1,,0,3\n\
                             Fern,0,2,1,2";

    fn sheets_for(server: &Server, timeout_seconds: u64) -> SheetsConfig {
        let mut sheets = SheetsConfig {
            base_url: server.url_str("/sheets"),
            spreadsheet_id: "test".to_string(),
            ..SheetsConfig::default()
        };
        sheets.calls.timeout_seconds = timeout_seconds;
        sheets.personnel.timeout_seconds = timeout_seconds;
        sheets
    }

    fn make_poller<R: SheetRecord>(sheets: &SheetsConfig, bus: &EventBus) -> (SheetPoller<R>, SharedHealth) {
        let health = Arc::new(RwLock::new(SourceHealth::default()));
        let poller = SheetPoller::new(
            Client::new(),
            sheets,
            R::default_layout(),
            bus.clone(),
            Arc::clone(&health),
        );
        (poller, health)
    }

    #[tokio::test]
    async fn first_fetch_loads_and_repeats_are_silent() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/sheets/test/export"))
                .times(2)
                .respond_with(status_code(200).body(CALLS)),
        );

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let (mut poller, health) = make_poller::<EmergencyCall>(&sheets_for(&server, 10), &bus);
        let shutdown = CancellationToken::new();

        assert_eq!(poller.poll_once(&shutdown).await.unwrap(), Some(UpdateKind::Loaded));
        assert_eq!(poller.poll_once(&shutdown).await.unwrap(), None);

        let DashboardEvent::Calls(update) = events.recv().await.unwrap() else {
            panic!("expected a calls event");
        };
        assert_eq!(update.kind, UpdateKind::Loaded);
        assert_eq!(update.records[0].location, "Hauptstraße 5");
        assert!(events.try_recv().is_err());

        let health = health.read();
        assert!(health.last_successful.is_some());
        assert!(health.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_is_recorded() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET")).respond_with(status_code(500)),
        );

        let bus = EventBus::new();
        let (mut poller, health) = make_poller::<EmergencyCall>(&sheets_for(&server, 10), &bus);

        let result = poller.poll_once(&CancellationToken::new()).await;
        assert!(matches!(result, Err(FetchError::Reqwest(_))));

        let health = health.read();
        assert!(health.last_attempted.is_some());
        assert!(health.last_successful.is_none());
        assert!(health.last_error.is_some());
    }

    #[tokio::test]
    async fn layout_mismatch_is_a_failed_fetch() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .respond_with(status_code(200).body("Kategorie,Nah\nMaschinisten,2\nA,1\nB,2")),
        );

        let bus = EventBus::new();
        let (mut poller, _) = make_poller::<PersonnelCategory>(&sheets_for(&server, 10), &bus);

        let result = poller.poll_once(&CancellationToken::new()).await;
        assert!(matches!(result, Err(FetchError::Schema(_))));
    }

    #[tokio::test]
    async fn slow_export_times_out() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .respond_with(delay_and_then(Duration::from_secs(3), status_code(200).body(CALLS))),
        );

        let bus = EventBus::new();
        let (mut poller, _) = make_poller::<EmergencyCall>(&sheets_for(&server, 1), &bus);

        let result = poller.poll_once(&CancellationToken::new()).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn cancelled_fetch_is_not_an_error_in_health() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .times(..)
                .respond_with(delay_and_then(Duration::from_secs(3), status_code(200).body(CALLS))),
        );

        let bus = EventBus::new();
        let (mut poller, health) = make_poller::<EmergencyCall>(&sheets_for(&server, 10), &bus);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = poller.poll_once(&shutdown).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(health.read().last_error.is_none());
    }

    #[tokio::test]
    async fn empty_personnel_keeps_previous_set() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET")).respond_with(status_code(200).body(PERSONNEL)),
        );

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let (mut poller, _) = make_poller::<PersonnelCategory>(&sheets_for(&server, 10), &bus);

        assert_eq!(
            poller.poll_once(&CancellationToken::new()).await.unwrap(),
            Some(UpdateKind::Loaded)
        );
        assert_eq!(poller.publish(Vec::new()), None);
        assert_eq!(poller.detector.current().unwrap().len(), 4);
        assert_eq!(poller.detector.current().unwrap()[1].intermediate, "0");

        assert!(matches!(events.recv().await.unwrap(), DashboardEvent::Personnel(_)));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_calls_are_published() {
        let bus = EventBus::new();
        let server = Server::run();
        let (mut poller, _) = make_poller::<EmergencyCall>(&sheets_for(&server, 10), &bus);

        let call = shared::sheets::parse_sheet::<EmergencyCall>(CALLS, &EmergencyCall::default_layout()).unwrap();
        assert_eq!(poller.publish(call), Some(UpdateKind::Loaded));
        assert_eq!(poller.publish(Vec::new()), Some(UpdateKind::Updated));
    }

    #[tokio::test]
    async fn run_stops_while_waiting_for_next_poll() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/sheets/test/export"))
                .times(1)
                .respond_with(status_code(200).body(CALLS)),
        );

        let mut sheets = sheets_for(&server, 10);
        sheets.calls.interval_seconds = 3600;
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let (poller, health) = make_poller::<EmergencyCall>(&sheets, &bus);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poller.run(shutdown.clone()));

        // The first poll runs at once; the loop then sleeps for the full interval.
        let DashboardEvent::Calls(update) = events.recv().await.unwrap() else {
            panic!("expected a calls event");
        };
        assert_eq!(update.kind, UpdateKind::Loaded);

        shutdown.cancel();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop after cancellation")
            .unwrap();
        assert!(health.read().last_successful.is_some());
    }
}
