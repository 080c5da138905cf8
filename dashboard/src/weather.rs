use crate::state::DashboardState;
use shared::weather::WeatherClient;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Refreshes the stored weather report until shutdown. Returns at once without an API key.
pub async fn run_weather(
    client: WeatherClient,
    location: String,
    interval: Duration,
    state: DashboardState,
    shutdown: CancellationToken,
) {
    if !client.is_enabled() {
        info!(name: "weather.disabled", "no weather API key configured, weather disabled");
        return;
    }

    info!(name: "weather.started", %location, ?interval, "started weather task");
    let mut initial_loop = true;
    loop {
        if initial_loop {
            initial_loop = false;
        } else {
            tokio::select! {
                () = sleep(interval) => {},
                () = shutdown.cancelled() => break,
            }
        }

        tokio::select! {
            report = client.current(&location) => match report {
                Ok(report) => {
                    debug!(temperature_c = report.temperature_c, "fetched current weather");
                    *state.weather.write() = Some(report);
                }
                // The previous report stays in place.
                Err(e) => warn!(error = ?e, "failed to fetch current weather"),
            },
            () = shutdown.cancelled() => break,
        }
    }
    info!("shutdown requested, exiting weather task");
}
