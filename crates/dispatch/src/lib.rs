//! Dispatch orchestration.
//!
//! Ties the storage, geocoding, ingest and routing layers together into
//! the operations the station binary drives, and owns the runtime
//! concerns around them: configuration and logging setup.

pub mod config;
pub mod geocode;
pub mod logging;
pub mod orchestrator;

pub use config::{GeocoderConfig, RoutingConfig, StationConfig, StatsConfig, StoreConfig};
pub use geocode::{FixedGeocoder, GeocodeError, Geocoder, NominatimGeocoder};
pub use orchestrator::Dispatcher;
