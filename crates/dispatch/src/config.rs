//! Configuration management for the dispatch station.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub store: StoreConfig,
    pub geocoder: GeocoderConfig,
    pub routing: RoutingConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Nominatim-compatible search endpoint
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Average driving speed used for ETAs, km/h
    pub average_speed_kmh: f64,
    /// Depot latitude used when no depot address is given
    pub depot_latitude: f64,
    /// Depot longitude used when no depot address is given
    pub depot_longitude: f64,
    /// Randomized solver restarts per route
    pub solver_restarts: u32,
    /// Seed for the solver's restart shuffles
    pub solver_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// UTC offset deciding where statistic day boundaries fall, in
    /// whole hours
    pub utc_offset_hours: i8,
}

impl StationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            store: StoreConfig {
                path: "lastmile.db".to_string(),
            },
            geocoder: GeocoderConfig {
                endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
                timeout_secs: 10,
                user_agent: "lastmile-station".to_string(),
            },
            routing: RoutingConfig {
                average_speed_kmh: 35.0,
                depot_latitude: 33.5731,
                depot_longitude: -7.5898,
                solver_restarts: 8,
                solver_seed: 7,
            },
            stats: StatsConfig { utc_offset_hours: 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StationConfig::default_config();
        assert_eq!(config.routing.average_speed_kmh, 35.0);
        assert_eq!(config.routing.depot_latitude, 33.5731);
        assert_eq!(config.geocoder.timeout_secs, 10);
        assert_eq!(config.stats.utc_offset_hours, 0);
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            [store]
            path = "/var/lib/lastmile/parcels.db"

            [geocoder]
            endpoint = "http://localhost:8080/search"
            timeout_secs = 3
            user_agent = "station-test"

            [routing]
            average_speed_kmh = 28.5
            depot_latitude = 48.75
            depot_longitude = 2.25
            solver_restarts = 4
            solver_seed = 11

            [stats]
            utc_offset_hours = 1
        "#;
        let config: StationConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.store.path, "/var/lib/lastmile/parcels.db");
        assert_eq!(config.routing.average_speed_kmh, 28.5);
        assert_eq!(config.routing.solver_seed, 11);
        assert_eq!(config.stats.utc_offset_hours, 1);
    }
}
