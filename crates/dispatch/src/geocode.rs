//! Address geocoding backends.
//!
//! Geocoding is best effort throughout the engine: callers treat any
//! failure as a soft miss, log it and keep going with whatever
//! coordinates they already have.

use std::collections::HashMap;
use std::time::Duration;

use lastmile_geo::GeoPoint;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GeocoderConfig;

#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Transport or decoding failure from the HTTP client
    #[error("Geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Geocoder returned HTTP {status}")]
    Status { status: u16 },

    /// Provider returned coordinates that do not parse
    #[error("Geocoder returned malformed coordinates: {0}")]
    Malformed(String),
}

/// Address resolution backend
pub trait Geocoder: Send + Sync {
    /// Resolve an address to a position; `Ok(None)` means the provider
    /// had no match
    fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}

/// One hit from a Nominatim-compatible search endpoint; coordinates
/// arrive as strings
#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

/// Geocoder backed by a Nominatim-compatible HTTP endpoint
pub struct NominatimGeocoder {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()?;
        if !response.status().is_success() {
            return Err(GeocodeError::Status {
                status: response.status().as_u16(),
            });
        }

        let hits: Vec<NominatimHit> = response.json()?;
        match hits.into_iter().next() {
            Some(hit) => {
                let lat = parse_component(&hit.lat)?;
                let lon = parse_component(&hit.lon)?;
                GeoPoint::new(lat, lon)
                    .map(Some)
                    .map_err(|e| GeocodeError::Malformed(e.to_string()))
            }
            None => Ok(None),
        }
    }
}

fn parse_component(raw: &str) -> Result<f64, GeocodeError> {
    raw.trim()
        .parse()
        .map_err(|_| GeocodeError::Malformed(raw.to_string()))
}

/// Geocoder with a fixed answer table, for tests and offline setups
#[derive(Debug, Clone, Default)]
pub struct FixedGeocoder {
    answers: HashMap<String, GeoPoint>,
}

impl FixedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address and the position it resolves to
    pub fn with(mut self, address: &str, point: GeoPoint) -> Self {
        self.answers.insert(address.to_string(), point);
        self
    }
}

impl Geocoder for FixedGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        Ok(self.answers.get(address).copied())
    }
}
