use crate::config::{DepotConfig, GeocodingConfig};
use parking_lot::RwLock;
use regex::Regex;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Stuttgart postcodes; an address carrying one is specific enough to send as-is.
static POSTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"70\d{3}").expect("postcode pattern is valid"));

static STREET_AND_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\s+(\d+[a-zA-Z]?)(.*)$").expect("street pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedPlace {
    pub coordinates: Coordinates,
    pub display_name: String,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("geocoder returned an unreadable coordinate {0:?}")]
    InvalidCoordinate(String),
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl TryFrom<NominatimPlace> for GeocodedPlace {
    type Error = GeocodeError;

    fn try_from(place: NominatimPlace) -> Result<Self, Self::Error> {
        let latitude = place
            .lat
            .trim()
            .parse()
            .map_err(|_| GeocodeError::InvalidCoordinate(place.lat.clone()))?;
        let longitude = place
            .lon
            .trim()
            .parse()
            .map_err(|_| GeocodeError::InvalidCoordinate(place.lon.clone()))?;

        Ok(Self {
            coordinates: Coordinates::new(latitude, longitude),
            display_name: place.display_name,
        })
    }
}

/// Splits `Musterstraße 12a, Stuttgart` into `("Musterstraße", "12a")`.
///
/// Anything after the house number up to the first comma stays part of the street.
pub fn parse_street_and_number(address: &str) -> Option<(String, String)> {
    let captures = STREET_AND_NUMBER.captures(address.trim())?;
    let rest = captures.get(3).map_or("", |m| m.as_str());
    let rest = rest.split(',').next().unwrap_or_default();
    let street = format!("{}{rest}", captures.get(1)?.as_str()).trim().to_string();
    let house_number = captures.get(2)?.as_str().trim().to_string();

    if street.is_empty() || house_number.is_empty() {
        None
    } else {
        Some((street, house_number))
    }
}

/// Whether free text names the depot itself.
pub fn is_depot_location(text: &str, aliases: &[String]) -> bool {
    let lower = text.to_lowercase();
    aliases
        .iter()
        .any(|alias| !alias.is_empty() && lower.contains(&alias.to_lowercase()))
}

/// Nominatim-compatible geocoder with a per-address cache.
///
/// Failures are logged. Addresses the geocoder does not know are cached as misses;
/// transport errors are not cached.
#[derive(Clone)]
pub struct Geocoder {
    client: Client,
    config: Arc<GeocodingConfig>,
    depot: Arc<DepotConfig>,
    cache: Arc<RwLock<HashMap<String, Option<GeocodedPlace>>>>,
}

impl Geocoder {
    pub fn new(client: Client, config: GeocodingConfig, depot: DepotConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
            depot: Arc::new(depot),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Makes a free-text call location specific enough for a bounded search.
    pub fn normalize_address(&self, address: &str) -> String {
        let base = address.trim();
        if base.is_empty() {
            return String::new();
        }

        let lower = base.to_lowercase();
        if self
            .config
            .nearby_towns
            .iter()
            .any(|town| lower.contains(&town.to_lowercase()))
            || POSTCODE.is_match(base)
        {
            return base.to_string();
        }

        if is_depot_location(base, &self.depot.aliases) {
            return self.depot.canonical_address.clone();
        }

        format!("{base}, {}", self.config.region_suffix)
    }

    pub async fn geocode(&self, address: &str) -> Option<GeocodedPlace> {
        self.try_geocode(address).await.ok().flatten()
    }

    /// Like [`Geocoder::geocode`], but keeps transport errors apart from misses.
    ///
    /// `Ok(None)` is an empty address or one the geocoder does not know.
    pub async fn try_geocode(&self, address: &str) -> Result<Option<GeocodedPlace>, GeocodeError> {
        let normalized = self.normalize_address(address);
        if normalized.is_empty() {
            return Ok(None);
        }

        let cached = self.cache.read().get(&normalized).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        match self.lookup(&normalized).await {
            Ok(place) => {
                if let Some(place) = &place {
                    debug!(address = %normalized, coordinates = ?place.coordinates, "geocoded address");
                } else {
                    warn!(address = %normalized, "no geocoding results for address");
                }
                self.cache.write().insert(normalized, place.clone());
                Ok(place)
            }
            Err(e) => {
                warn!(address = %normalized, error = ?e, "failed to geocode address");
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    async fn lookup(&self, normalized: &str) -> Result<Option<GeocodedPlace>, GeocodeError> {
        let mut results = self
            .search(&[
                ("q", normalized),
                ("countrycodes", self.config.country_codes.as_str()),
            ])
            .await?;

        // Free-text search tends to land on the street centroid; retry with a
        // structured query when the first hit lacks the house number.
        let parsed = parse_street_and_number(normalized);
        let missing_house_number = match (results.first(), &parsed) {
            (None, _) => true,
            (Some(first), Some((_, house_number))) => !first.display_name.contains(house_number.as_str()),
            (Some(_), None) => false,
        };

        if missing_house_number && let Some((street, house_number)) = &parsed {
            let street_query = format!("{house_number} {street}");
            let mut params = vec![
                ("street", street_query.as_str()),
                ("country", self.config.structured_country.as_str()),
            ];
            if let Some(state) = &self.config.structured_state {
                params.push(("state", state.as_str()));
            }

            match self.search(&params).await {
                Ok(structured) if !structured.is_empty() => results = structured,
                Ok(_) => debug!("structured geocoding query found nothing"),
                Err(e) => debug!(error = ?e, "structured geocoding query failed"),
            }
        }

        results
            .into_iter()
            .next()
            .map(GeocodedPlace::try_from)
            .transpose()
    }

    async fn search(&self, params: &[(&str, &str)]) -> Result<Vec<NominatimPlace>, GeocodeError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let places = self
            .client
            .get(url)
            .query(&[
                ("format", "json"),
                ("limit", "1"),
                ("bounded", "1"),
                ("addressdetails", "1"),
                ("viewbox", self.config.viewbox.as_str()),
            ])
            .query(params)
            .header(ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, self.config.user_agent.as_str())
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<NominatimPlace>>()
            .await?;

        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocoder() -> Geocoder {
        Geocoder::new(
            Client::new(),
            GeocodingConfig::default(),
            DepotConfig::default(),
        )
    }

    #[test]
    fn towns_and_postcodes_are_kept() {
        let g = geocoder();
        assert_eq!(
            g.normalize_address(" Hauptstraße 5, Fellbach "),
            "Hauptstraße 5, Fellbach"
        );
        assert_eq!(g.normalize_address("Solitudestr. 1, 70499"), "Solitudestr. 1, 70499");
    }

    #[test]
    fn depot_spellings_become_canonical() {
        let g = geocoder();
        assert_eq!(
            g.normalize_address("Stammheimerstr 140"),
            "Stammheimer Str. 140, 70439 Stuttgart, Germany"
        );
    }

    #[test]
    fn other_addresses_get_region_suffix() {
        assert_eq!(
            geocoder().normalize_address("Feldweg 3"),
            "Feldweg 3, Baden-Württemberg, Germany"
        );
        assert_eq!(geocoder().normalize_address("   "), "");
    }

    #[test]
    fn street_and_number() {
        assert_eq!(
            parse_street_and_number("Musterstraße 12a, Stuttgart"),
            Some(("Musterstraße".to_string(), "12a".to_string()))
        );
        assert_eq!(
            parse_street_and_number("Am Alten Weg 7"),
            Some(("Am Alten Weg".to_string(), "7".to_string()))
        );
        assert_eq!(parse_street_and_number("Marktplatz"), None);
    }

    #[test]
    fn depot_aliases_match_case_insensitively() {
        let aliases = DepotConfig::default().aliases;
        assert!(is_depot_location("STAMMHEIMERSTRASSE? nein, Stammheimerstraße 140", &aliases));
        assert!(is_depot_location("Durscht 4", &aliases));
        assert!(!is_depot_location("Hauptstraße 1", &aliases));
    }
}
