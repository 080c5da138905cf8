#[warn(clippy::pedantic)]
mod error;
mod health;
mod map;
mod poller;
mod state;
mod v1;
mod weather;

use crate::error::MainError;
use crate::map::{MapBuilder, resolve_depot, run_map_overlay};
use crate::poller::SheetPoller;
use crate::state::{DashboardState, run_state_subscriber};
use axum::Router;
use axum::routing::get;
use reqwest::Client;
use shared::error::InitializationError;
use shared::events::EventBus;
use shared::geo::Geocoder;
use shared::routing;
use shared::sheets::SheetRecord;
use shared::sheets::calls::EmergencyCall;
use shared::sheets::duty::DutyEvent;
use shared::sheets::personnel::PersonnelCategory;
use shared::sheets::vehicles::VehicleRecord;
use shared::weather::WeatherClient;
use shared::{Config, init_tracing, load_config, shutdown_listener};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

type Tasks = JoinSet<Result<(), MainError>>;

#[tokio::main]
async fn main() -> Result<(), MainError> {
    init_tracing()?;

    let config = load_config().map_err(InitializationError::from)?;
    let client = Client::builder()
        .user_agent(&config.geocoding.user_agent)
        .build()
        .map_err(InitializationError::from)?;

    let bus = EventBus::new();
    let state = DashboardState::new(&config);

    // Cancellation token shared across tasks; listener cancels on SIGINT/SIGTERM.
    let shutdown_token = CancellationToken::new();
    let signal_handle = tokio::spawn(shutdown_listener(Some(shutdown_token.clone())));

    let mut tasks = Tasks::new();

    // Subscribers register before the pollers start so no initial load is missed.
    tasks.spawn({
        let state = state.clone();
        let events = bus.subscribe();
        let shutdown = shutdown_token.clone();
        async move {
            run_state_subscriber(state, events, shutdown).await;
            Ok(())
        }
    });
    spawn_map_overlay(&mut tasks, &config, &client, &bus, &state, &shutdown_token);
    spawn_weather(&mut tasks, &config, &client, &state, &shutdown_token);

    spawn_poller::<VehicleRecord>(&mut tasks, &config, &client, &bus, &state, &shutdown_token)?;
    spawn_poller::<DutyEvent>(&mut tasks, &config, &client, &bus, &state, &shutdown_token)?;
    spawn_poller::<EmergencyCall>(&mut tasks, &config, &client, &bus, &state, &shutdown_token)?;
    spawn_poller::<PersonnelCategory>(&mut tasks, &config, &client, &bus, &state, &shutdown_token)?;

    tasks.spawn(run_server(
        config.server.listen_addr.clone(),
        state,
        shutdown_token.clone(),
    ));

    info!(name: "dashboard.started", "initialized firehouse dashboard");

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined.map_err(MainError::from).and_then(|outcome| outcome) {
            error!(error = ?e, "dashboard task failed, shutting down");
            shutdown_token.cancel();
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    signal_handle.abort();

    info!(name: "dashboard.stopped", "firehouse dashboard stopped");
    result
}

fn spawn_poller<R: SheetRecord>(
    tasks: &mut Tasks,
    config: &Config,
    client: &Client,
    bus: &EventBus,
    state: &DashboardState,
    shutdown: &CancellationToken,
) -> Result<(), InitializationError> {
    let layout = R::default_layout()
        .with_overrides(&config.sheets.source(R::SOURCE).columns)
        .map_err(|error| InitializationError::Layout {
            source_name: R::SOURCE.name(),
            error,
        })?;

    let poller = SheetPoller::<R>::new(
        client.clone(),
        &config.sheets,
        layout,
        bus.clone(),
        state.health.source(R::SOURCE).clone(),
    );
    let shutdown = shutdown.clone();
    tasks.spawn(async move {
        poller.run(shutdown).await;
        Ok(())
    });
    Ok(())
}

fn spawn_map_overlay(
    tasks: &mut Tasks,
    config: &Config,
    client: &Client,
    bus: &EventBus,
    state: &DashboardState,
    shutdown: &CancellationToken,
) {
    let geocoder = Geocoder::new(client.clone(), config.geocoding.clone(), config.depot.clone());
    let router = config
        .routing
        .enabled
        .then(|| routing::Router::new(client.clone(), &config.routing));
    let events = bus.subscribe();
    let depot = config.depot.clone();
    let map = config.map.clone();
    let max_calls = config.display.max_calls;
    let state = state.clone();
    let shutdown = shutdown.clone();

    tasks.spawn(async move {
        let depot_marker = resolve_depot(&geocoder, &depot).await;
        let debounce = Duration::from_millis(map.debounce_millis);
        let refresh = Duration::from_secs(map.refresh_seconds.max(1));
        let builder = MapBuilder::new(geocoder, router, depot_marker, depot.aliases, map, max_calls);
        run_map_overlay(builder, state, events, debounce, refresh, shutdown).await;
        Ok(())
    });
}

fn spawn_weather(
    tasks: &mut Tasks,
    config: &Config,
    client: &Client,
    state: &DashboardState,
    shutdown: &CancellationToken,
) {
    let task = weather::run_weather(
        WeatherClient::new(client.clone(), &config.weather),
        config.weather.location.clone(),
        Duration::from_secs(config.weather.interval_seconds),
        state.clone(),
        shutdown.clone(),
    );
    tasks.spawn(async move {
        task.await;
        Ok(())
    });
}

async fn run_server(
    listen_addr: String,
    state: DashboardState,
    shutdown: CancellationToken,
) -> Result<(), MainError> {
    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = TcpListener::bind(&listen_addr).await?;
    info!(name: "server.started", %listen_addr, "starting dashboard API server");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;
    Ok(())
}
