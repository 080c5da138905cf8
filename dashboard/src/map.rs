use crate::state::DashboardState;
use chrono::{Local, NaiveDateTime};
use futures_util::future::join_all;
use serde::Serialize;
use shared::config::{DepotConfig, MapConfig};
use shared::events::{DashboardEvent, UpdateKind};
use shared::geo::{Coordinates, GeocodeError, Geocoder, is_depot_location};
use shared::routing::{Route, Router};
use shared::sheets::calls::{EmergencyCall, displayed_calls};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepotMarker {
    pub address: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMarker {
    pub location: String,
    pub display_name: String,
    pub coordinates: Coordinates,
    pub style: MarkerStyle,
    pub call_type: String,
    pub description: String,
    pub time: String,
    pub route: Option<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MapView {
    /// Fit the viewport to these corners.
    Bounds {
        south_west: Coordinates,
        north_east: Coordinates,
    },
    Center {
        center: Coordinates,
        zoom: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOverlay {
    pub depot: DepotMarker,
    pub markers: Vec<CallMarker>,
    pub view: MapView,
}

/// Turns the displayed calls into map markers anchored at the depot.
pub struct MapBuilder {
    geocoder: Geocoder,
    router: Option<Router>,
    depot: DepotMarker,
    depot_aliases: Arc<[String]>,
    map: MapConfig,
    max_calls: usize,
    last_locations: Option<Vec<String>>,
}

impl MapBuilder {
    pub fn new(
        geocoder: Geocoder,
        router: Option<Router>,
        depot: DepotMarker,
        depot_aliases: Vec<String>,
        map: MapConfig,
        max_calls: usize,
    ) -> Self {
        Self {
            geocoder,
            router,
            depot,
            depot_aliases: depot_aliases.into(),
            map,
            max_calls,
            last_locations: None,
        }
    }

    /// Rebuilds the overlay, or returns `None` when the displayed locations are unchanged.
    ///
    /// Locations only count as rendered once every geocoding request went through.
    pub async fn build(&mut self, calls: &[EmergencyCall], now: NaiveDateTime) -> Option<MapOverlay> {
        let displayed = displayed_calls(calls, now, self.max_calls);
        let locations: Vec<String> = displayed
            .iter()
            .map(|call| call.location.trim().to_string())
            .collect();

        if self.last_locations.as_ref() == Some(&locations) {
            debug!("displayed call locations unchanged, skipping map rebuild");
            return None;
        }

        let outcomes = join_all(
            displayed
                .iter()
                .filter(|call| !call.location.trim().is_empty())
                .map(|call| self.marker_for(call)),
        )
        .await;

        let mut failed = 0;
        let markers: Vec<CallMarker> = outcomes
            .into_iter()
            .filter_map(|outcome| {
                outcome.unwrap_or_else(|_| {
                    failed += 1;
                    None
                })
            })
            .collect();

        if failed == 0 {
            self.last_locations = Some(locations);
        } else {
            self.last_locations = None;
            warn!(failed, "some call locations could not be geocoded, retrying on next rebuild");
        }

        debug!(markers = markers.len(), calls = displayed.len(), "rebuilt map overlay");
        Some(MapOverlay {
            view: self.view_for(&markers),
            depot: self.depot.clone(),
            markers,
        })
    }

    async fn marker_for(&self, call: &EmergencyCall) -> Result<Option<CallMarker>, GeocodeError> {
        let location = call.location.trim();
        let at_depot = is_depot_location(location, &self.depot_aliases);

        let (coordinates, display_name) = if at_depot {
            (self.depot.coordinates, self.depot.address.clone())
        } else {
            let Some(place) = self.geocoder.try_geocode(location).await? else {
                return Ok(None);
            };
            (place.coordinates, place.display_name)
        };

        let route = match &self.router {
            Some(router) if !at_depot => match router.route(self.depot.coordinates, coordinates).await {
                Ok(route) => Some(route),
                Err(e) => {
                    debug!(location, error = ?e, "no route from depot");
                    None
                }
            },
            _ => None,
        };

        Ok(Some(CallMarker {
            location: location.to_string(),
            display_name,
            coordinates,
            style: if call.is_completed() {
                MarkerStyle::Completed
            } else {
                MarkerStyle::Active
            },
            call_type: call.call_type.clone(),
            description: call.description.clone(),
            time: call.time.clone(),
            route,
        }))
    }

    fn view_for(&self, markers: &[CallMarker]) -> MapView {
        if markers.is_empty() {
            return MapView::Center {
                center: Coordinates::new(self.map.center_latitude, self.map.center_longitude),
                zoom: self.map.default_zoom,
            };
        }

        let depot = self.depot.coordinates;
        let (south_west, north_east) = markers.iter().map(|m| m.coordinates).fold(
            (depot, depot),
            |(sw, ne), point| {
                (
                    Coordinates::new(sw.latitude.min(point.latitude), sw.longitude.min(point.longitude)),
                    Coordinates::new(ne.latitude.max(point.latitude), ne.longitude.max(point.longitude)),
                )
            },
        );
        MapView::Bounds {
            south_west,
            north_east,
        }
    }
}

/// Geocodes the depot address, falling back to the configured coordinates.
pub async fn resolve_depot(geocoder: &Geocoder, depot: &DepotConfig) -> DepotMarker {
    let fallback = Coordinates::new(depot.latitude, depot.longitude);
    let coordinates = match geocoder.geocode(&depot.address).await {
        Some(place) => place.coordinates,
        None => {
            warn!(address = %depot.address, "could not geocode depot, using configured coordinates");
            fallback
        }
    };

    DepotMarker {
        address: depot.address.clone(),
        coordinates,
    }
}

/// Keeps `state.map` in step with the calls sheet until shutdown.
///
/// Loaded sets rebuild at once and updates after `debounce`. Every `refresh` the latest
/// set is rebuilt against the current time.
pub async fn run_map_overlay(
    mut builder: MapBuilder,
    state: DashboardState,
    mut events: Receiver<DashboardEvent>,
    debounce: Duration,
    refresh: Duration,
    shutdown: CancellationToken,
) {
    info!(?refresh, "started map overlay task");
    let mut pending: Option<(Arc<[EmergencyCall]>, Instant)> = None;
    let mut latest: Option<Arc<[EmergencyCall]>> = None;
    let mut refresh_timer = interval_at(Instant::now() + refresh, refresh);
    refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = pending.as_ref().map(|(_, deadline)| *deadline);
        tokio::select! {
            received = events.recv() => match received {
                Ok(DashboardEvent::Calls(update)) => match update.kind {
                    UpdateKind::Loaded => {
                        pending = None;
                        rebuild(&mut builder, &state, &update.records).await;
                        latest = Some(update.records);
                    }
                    UpdateKind::Updated => {
                        latest = Some(update.records.clone());
                        pending = Some((update.records, Instant::now() + debounce));
                    }
                },
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "map overlay lagged behind the event bus");
                }
                Err(RecvError::Closed) => break,
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((calls, _)) = pending.take() {
                    rebuild(&mut builder, &state, &calls).await;
                }
            }
            _ = refresh_timer.tick() => {
                if let Some(calls) = &latest {
                    rebuild(&mut builder, &state, calls).await;
                }
            }
            () = shutdown.cancelled() => {
                info!("shutdown requested, exiting map overlay task");
                break;
            }
        }
    }
}

async fn rebuild(builder: &mut MapBuilder, state: &DashboardState, calls: &[EmergencyCall]) {
    if let Some(overlay) = builder.build(calls, Local::now().naive_local()).await {
        *state.map.write() = Some(overlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::{contains, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server, cycle};
    use reqwest::Client;
    use serde_json::json;
    use shared::Config;
    use shared::config::GeocodingConfig;
    use shared::events::{EventBus, SheetUpdate};
    use shared::sheets::calls::CallStatus;

    fn at(time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2025-03-05 {time}"), "%Y-%m-%d %H:%M").unwrap()
    }

    fn noon() -> NaiveDateTime {
        at("12:00")
    }

    /// Nominatim answers 500 once for the Fellbach address, then finds it.
    fn expect_flaky_fellbach(server: &Server) {
        server.expect(
            Expectation::matching(request::query(url_decoded(contains(("q", "Hauptstraße 5, Fellbach")))))
                .times(2)
                .respond_with(cycle![
                    status_code(500),
                    json_encoded(json!([{
                        "lat": "48.81",
                        "lon": "9.275",
                        "display_name": "5, Hauptstraße, Fellbach"
                    }])),
                ]),
        );
    }

    fn call(location: &str, status: &str, time: &str) -> EmergencyCall {
        EmergencyCall {
            call_type: "B2".into(),
            description: "Brand".into(),
            time: time.into(),
            location: location.into(),
            vehicles: "HLF".into(),
            start_time: time.into(),
            status: CallStatus::from(status),
        }
    }

    fn builder(server: &Server) -> MapBuilder {
        let geocoder = Geocoder::new(
            Client::new(),
            GeocodingConfig {
                base_url: server.url_str("/nominatim"),
                ..GeocodingConfig::default()
            },
            DepotConfig::default(),
        );
        let depot = DepotConfig::default();
        MapBuilder::new(
            geocoder,
            None,
            DepotMarker {
                address: depot.address.clone(),
                coordinates: Coordinates::new(depot.latitude, depot.longitude),
            },
            depot.aliases,
            MapConfig::default(),
            4,
        )
    }

    #[tokio::test]
    async fn no_calls_use_default_view() {
        let server = Server::run();
        let overlay = builder(&server).build(&[], noon()).await.unwrap();

        assert!(overlay.markers.is_empty());
        assert_eq!(
            overlay.view,
            MapView::Center {
                center: Coordinates::new(48.846141, 9.157327),
                zoom: 13
            }
        );
    }

    #[tokio::test]
    async fn depot_calls_are_pinned_without_geocoding() {
        let server = Server::run();
        let mut builder = builder(&server);

        let overlay = builder
            .build(&[call("Stammheimerstr. 140", "completed", "09:00")], noon())
            .await
            .unwrap();

        assert_eq!(overlay.markers.len(), 1);
        assert_eq!(overlay.markers[0].coordinates, Coordinates::new(48.7519, 9.1819));
        assert_eq!(overlay.markers[0].style, MarkerStyle::Completed);
        assert!(overlay.markers[0].route.is_none());
    }

    #[tokio::test]
    async fn markers_extend_bounds_and_misses_are_dropped() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::query(url_decoded(contains(("q", "Hauptstraße 5, Fellbach")))))
                .respond_with(json_encoded(json!([{
                    "lat": "48.81",
                    "lon": "9.275",
                    "display_name": "5, Hauptstraße, Fellbach"
                }]))),
        );
        server.expect(
            Expectation::matching(request::query(url_decoded(contains((
                "q",
                "Nirgendwo, Baden-Württemberg, Germany",
            )))))
            .respond_with(json_encoded(json!([]))),
        );

        let overlay = builder(&server)
            .build(
                &[
                    call("Hauptstraße 5, Fellbach", "active", "10:00"),
                    call("Nirgendwo", "demo", "11:00"),
                ],
                noon(),
            )
            .await
            .unwrap();

        assert_eq!(overlay.markers.len(), 1);
        assert_eq!(overlay.markers[0].style, MarkerStyle::Active);
        assert_eq!(
            overlay.view,
            MapView::Bounds {
                south_west: Coordinates::new(48.7519, 9.1819),
                north_east: Coordinates::new(48.81, 9.275),
            }
        );
    }

    #[tokio::test]
    async fn unchanged_locations_skip_rebuild() {
        let server = Server::run();
        let mut builder = builder(&server);
        let calls = [call("Durscht 4", "active", "10:00")];

        assert!(builder.build(&calls, noon()).await.is_some());
        assert!(builder.build(&calls, noon()).await.is_none());

        let moved = [call("Stammheimerstraße 140", "active", "10:00")];
        assert!(builder.build(&moved, noon()).await.is_some());
    }

    #[tokio::test]
    async fn failed_geocoding_is_retried_on_next_build() {
        let server = Server::run();
        expect_flaky_fellbach(&server);
        let mut builder = builder(&server);
        let calls = [call("Hauptstraße 5, Fellbach", "active", "10:00")];

        let first = builder.build(&calls, noon()).await.unwrap();
        assert!(first.markers.is_empty());

        let second = builder.build(&calls, noon()).await.unwrap();
        assert_eq!(second.markers.len(), 1);
        assert_eq!(second.markers[0].coordinates, Coordinates::new(48.81, 9.275));

        assert!(builder.build(&calls, noon()).await.is_none());
    }

    #[tokio::test]
    async fn armed_calls_appear_once_their_start_time_passes() {
        let server = Server::run();
        let mut builder = builder(&server);
        let calls = [call("Durscht 4", "armed", "13:00")];

        let before = builder.build(&calls, noon()).await.unwrap();
        assert!(before.markers.is_empty());
        assert!(builder.build(&calls, at("12:59")).await.is_none());

        let after = builder.build(&calls, at("13:30")).await.unwrap();
        assert_eq!(after.markers.len(), 1);
        assert_eq!(after.markers[0].location, "Durscht 4");
    }

    #[tokio::test]
    async fn refresh_rebuilds_latest_calls() {
        let server = Server::run();
        expect_flaky_fellbach(&server);

        let state = DashboardState::new(&Config::default());
        let bus = EventBus::new();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_map_overlay(
            builder(&server),
            state.clone(),
            bus.subscribe(),
            Duration::from_millis(10),
            Duration::from_millis(50),
            shutdown.clone(),
        ));

        bus.publish(DashboardEvent::Calls(SheetUpdate::new(
            UpdateKind::Loaded,
            vec![call("Hauptstraße 5, Fellbach", "active", "10:00")],
        )));

        // No further events arrive; only the refresh timer can retry the failed lookup.
        let marker_count = || state.map.read().as_ref().map(|overlay| overlay.markers.len());
        for _ in 0..200 {
            if marker_count() == Some(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(marker_count(), Some(1));

        shutdown.cancel();
        handle.await.unwrap();
    }
}
