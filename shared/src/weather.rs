use crate::config::WeatherConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

const ICON_BASE_URL: &str = "https://openweathermap.org/img/wn";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("no weather API key configured")]
    MissingApiKey,
}

/// Current conditions at the configured location, in metric units.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub location: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: u32,
    pub wind_speed_ms: f64,
    pub rain_last_hour_mm: f64,
    pub cloud_cover_pct: u8,
    pub visibility_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    main: OwmMain,
    #[serde(default)]
    wind: OwmWind,
    rain: Option<OwmRain>,
    clouds: Option<OwmClouds>,
    visibility: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: u8,
    pressure: u32,
}

#[derive(Debug, Default, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmRain {
    #[serde(rename = "1h", default)]
    last_hour: f64,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    #[serde(default)]
    all: u8,
}

impl From<OwmCurrent> for WeatherReport {
    fn from(current: OwmCurrent) -> Self {
        let condition = current.weather.into_iter().next();
        Self {
            location: current.name,
            description: condition
                .as_ref()
                .map(|c| c.description.clone())
                .unwrap_or_default(),
            icon_url: condition.map(|c| format!("{ICON_BASE_URL}/{}@2x.png", c.icon)),
            temperature_c: current.main.temp,
            humidity_pct: current.main.humidity,
            pressure_hpa: current.main.pressure,
            wind_speed_ms: current.wind.speed,
            rain_last_hour_mm: current.rain.map_or(0.0, |r| r.last_hour),
            cloud_cover_pct: current.clouds.map_or(0, |c| c.all),
            visibility_km: current.visibility.map(|m| f64::from(m) / 1000.0),
        }
    }
}

/// OpenWeatherMap current-conditions client.
#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl WeatherClient {
    pub fn new(client: Client, config: &WeatherConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self))]
    pub async fn current(&self, location: &str) -> Result<WeatherReport, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let current = self
            .client
            .get(&self.base_url)
            .query(&[("q", location), ("appid", api_key), ("units", "metric")])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<OwmCurrent>()
            .await?;

        Ok(current.into())
    }
}
