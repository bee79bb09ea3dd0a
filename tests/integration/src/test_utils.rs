//! Shared fixtures for the end-to-end suite

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lastmile_dispatch::{Dispatcher, FixedGeocoder, Geocoder, StationConfig};
use lastmile_domain::{DriverId, NewParcel, Parcel, ParcelStore};
use lastmile_geo::GeoPoint;
use lastmile_sorting::SortingStation;
use lastmile_store::MemoryStore;

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Route test logs through the usual subscriber; safe to call from
/// every test
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

/// A station wired the way the binary wires it: one shared store behind
/// both the dispatcher and the sorting desk.
pub struct TestStation {
    pub store: Arc<dyn ParcelStore>,
    pub dispatcher: Dispatcher,
    pub sorting: SortingStation,
}

impl TestStation {
    /// In-memory station with a geocoder that knows nothing
    pub fn in_memory() -> Self {
        Self::with_geocoder(Arc::new(MemoryStore::new()), Box::new(FixedGeocoder::new()))
    }

    /// Station over an arbitrary backend and geocoder
    pub fn with_geocoder(store: Arc<dyn ParcelStore>, geocoder: Box<dyn Geocoder>) -> Self {
        let config = StationConfig::default_config();
        let dispatcher = Dispatcher::new(store.clone(), geocoder, &config).unwrap();
        let sorting = SortingStation::new(store.clone());
        Self {
            store,
            dispatcher,
            sorting,
        }
    }

    /// Insert one parcel and return the stored row
    pub fn add_parcel(
        &self,
        tracking: &str,
        address: &str,
        position: Option<GeoPoint>,
        driver: Option<DriverId>,
    ) -> Parcel {
        let mut parcel = NewParcel::new(
            tracking.to_string(),
            "GOFO".to_string(),
            address.to_string(),
        );
        parcel.position = position;
        parcel.driver_id = driver;
        self.store
            .insert_parcel(parcel, current_timestamp_ms())
            .unwrap()
    }
}
