use crate::config::RoutingConfig;
use crate::geo::Coordinates;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("router found no route ({code})")]
    NoRoute { code: String },
}

/// Driving route between two points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<Coordinates>,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

/// GeoJSON line string; positions are `[lon, lat]`.
#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// OSRM route service client.
#[derive(Clone)]
pub struct Router {
    client: Client,
    base_url: String,
    profile: String,
    timeout: Duration,
}

impl Router {
    pub fn new(client: Client, config: &RoutingConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    #[instrument(skip(self))]
    pub async fn route(&self, from: Coordinates, to: Coordinates) -> Result<Route, RoutingError> {
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url, self.profile, from.longitude, from.latitude, to.longitude, to.latitude
        );

        let response = self
            .client
            .get(url)
            .query(&[("overview", "full"), ("geometries", "geojson")])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<OsrmResponse>()
            .await?;

        if response.code != "Ok" {
            return Err(RoutingError::NoRoute {
                code: response.code,
            });
        }

        let Some(route) = response.routes.into_iter().next() else {
            return Err(RoutingError::NoRoute {
                code: response.code,
            });
        };

        debug!(
            distance_m = route.distance,
            duration_s = route.duration,
            points = route.geometry.coordinates.len(),
            "found route"
        );

        Ok(Route {
            distance_m: route.distance,
            duration_s: route.duration,
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[lon, lat]| Coordinates::new(lat, lon))
                .collect(),
        })
    }
}
