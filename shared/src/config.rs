use crate::error::ConfigError;
use crate::sheets::SheetSource;
use crate::sheets::layout::ColumnOverride;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const ENV_VAR_PREFIX: &str = "FIREHOUSE__";
pub const SETTINGS_FILE: &str = "Settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub sheets: SheetsConfig,
    pub display: DisplayConfig,
    pub depot: DepotConfig,
    pub map: MapConfig,
    pub geocoding: GeocodingConfig,
    pub routing: RoutingConfig,
    pub weather: WeatherConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SheetsConfig {
    pub base_url: String,
    pub spreadsheet_id: String,
    pub vehicles: SheetSourceConfig,
    pub duty: SheetSourceConfig,
    pub calls: SheetSourceConfig,
    pub personnel: SheetSourceConfig,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://docs.google.com/spreadsheets/d".to_string(),
            spreadsheet_id: "1avBbHGh6RDgBvAvMULAhJq-I5fpow_X7fzIEkzL6L4E".to_string(),
            vehicles: SheetSourceConfig::new(None, 20),
            duty: SheetSourceConfig::new(Some("1859359721"), 60),
            calls: SheetSourceConfig::new(Some("2011332130"), 15),
            personnel: SheetSourceConfig::new(Some("1073488461"), 120),
        }
    }
}

impl SheetsConfig {
    pub const fn source(&self, source: SheetSource) -> &SheetSourceConfig {
        match source {
            SheetSource::Vehicles => &self.vehicles,
            SheetSource::Duty => &self.duty,
            SheetSource::Calls => &self.calls,
            SheetSource::Personnel => &self.personnel,
        }
    }

    /// CSV export URL of one tab. Without a gid the export returns the first tab.
    pub fn export_url(&self, source: SheetSource) -> String {
        let base = self.base_url.trim_end_matches('/');
        let mut url = format!("{base}/{}/export?format=csv", self.spreadsheet_id);
        if let Some(gid) = &self.source(source).gid {
            url.push_str("&gid=");
            url.push_str(gid);
        }
        url
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SheetSourceConfig {
    pub gid: Option<String>,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnOverride>,
}

impl SheetSourceConfig {
    fn new(gid: Option<&str>, interval_seconds: u64) -> Self {
        Self {
            gid: gid.map(ToString::to_string),
            interval_seconds,
            timeout_seconds: 10,
            columns: BTreeMap::new(),
        }
    }

    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    pub max_duty_events: usize,
    pub max_calls: usize,
    pub radio_prefix: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_duty_events: 8,
            max_calls: 4,
            radio_prefix: "Florian Stuttgart".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DepotConfig {
    pub address: String,
    /// Address used for the depot when a call location names one of the aliases.
    pub canonical_address: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Lower-case fragments that identify the depot in free-text locations.
    pub aliases: Vec<String>,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            address: "Stammheimerstraße 140, Stuttgart".to_string(),
            canonical_address: "Stammheimer Str. 140, 70439 Stuttgart, Germany".to_string(),
            latitude: 48.7519,
            longitude: 9.1819,
            aliases: vec![
                "stammheimerstr".to_string(),
                "stammheimerstraße".to_string(),
                "durscht 4".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MapConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub default_zoom: u8,
    pub debounce_millis: u64,
    /// Rebuild period for calls whose visibility depends on the clock.
    pub refresh_seconds: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_latitude: 48.846141,
            center_longitude: 9.157327,
            default_zoom: 13,
            debounce_millis: 300,
            refresh_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocodingConfig {
    pub base_url: String,
    /// `min_lon,min_lat,max_lon,max_lat`
    pub viewbox: String,
    pub country_codes: String,
    /// Addresses naming one of these are sent as-is.
    pub nearby_towns: Vec<String>,
    /// Appended to addresses that name no town and no postcode.
    pub region_suffix: String,
    pub structured_state: Option<String>,
    pub structured_country: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            viewbox: "8.85,48.70,9.55,49.05".to_string(),
            country_codes: "de".to_string(),
            nearby_towns: [
                "stuttgart",
                "kornwestheim",
                "korntal",
                "korntal-münchingen",
                "ludwigsburg",
                "fellbach",
                "ditzingen",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            region_suffix: "Baden-Württemberg, Germany".to_string(),
            structured_state: Some("Baden-Württemberg".to_string()),
            structured_country: "Germany".to_string(),
            user_agent: concat!("firehouse-dashboard/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 8,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub base_url: String,
    pub profile: String,
    pub timeout_seconds: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            timeout_seconds: 8,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WeatherConfig {
    pub base_url: String,
    /// Weather is disabled without a key.
    pub api_key: Option<String>,
    pub location: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            api_key: None,
            location: "Stuttgart".to_string(),
            interval_seconds: 600,
            timeout_seconds: 10,
        }
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    Ok(Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(SETTINGS_FILE))
        .merge(Env::prefixed(ENV_VAR_PREFIX).split("__"))
        .extract::<Config>()?)
}
