//! The operations the station binary drives.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use lastmile_domain::{
    filter_by_zone, DispatchError, DriverId, DriverRoute, ParcelCounts, ParcelId, ParcelStatus,
    ParcelStore, ParcelUpdate, Result, ZoneId,
};
use lastmile_geo::GeoPoint;
use lastmile_ingest::{ingest, IngestError, IngestReport, SourceFormat};
use lastmile_route::{CheapestArcSolver, RouteOptimizer};
use tracing::{debug, info, warn};

use crate::config::StationConfig;
use crate::geocode::Geocoder;

/// Orchestrates assignment, geocoding, zoning and routing over one
/// shared store.
///
/// Every operation is synchronous and stateless between calls; the
/// struct is cheap to share behind an `Arc` when a caller needs to.
pub struct Dispatcher {
    store: Arc<dyn ParcelStore>,
    geocoder: Box<dyn Geocoder>,
    optimizer: RouteOptimizer,
    depot: GeoPoint,
}

impl Dispatcher {
    /// Build the dispatcher from configuration.
    ///
    /// Fails only on startup problems such as depot coordinates outside
    /// the valid range.
    pub fn new(
        store: Arc<dyn ParcelStore>,
        geocoder: Box<dyn Geocoder>,
        config: &StationConfig,
    ) -> anyhow::Result<Self> {
        let depot = GeoPoint::new(
            config.routing.depot_latitude,
            config.routing.depot_longitude,
        )
        .context("Invalid depot coordinates in configuration")?;
        let solver = CheapestArcSolver {
            restarts: config.routing.solver_restarts,
            seed: config.routing.solver_seed,
        };
        let optimizer = RouteOptimizer::new(
            store.clone(),
            Box::new(solver),
            config.routing.average_speed_kmh,
        );
        Ok(Self {
            store,
            geocoder,
            optimizer,
            depot,
        })
    }

    /// Assign parcels to a driver.
    ///
    /// Applies to pending parcels and re-points already assigned ones;
    /// every touched parcel gets a fresh dispatch timestamp. Parcels in
    /// other states are skipped, not failed.
    pub fn assign(
        &self,
        parcel_ids: &[ParcelId],
        driver_id: DriverId,
        now_ms: u64,
    ) -> Result<usize> {
        if self.store.get_driver(driver_id)?.is_none() {
            return Err(DispatchError::driver_not_found(driver_id));
        }

        let parcels = self.store.get_parcels_by_ids(parcel_ids)?;
        let eligible: Vec<ParcelId> = parcels
            .iter()
            .filter(|p| matches!(p.status, ParcelStatus::Pending | ParcelStatus::Assigned))
            .map(|p| p.id)
            .collect();
        let skipped = parcels.len() - eligible.len();
        if skipped > 0 {
            warn!(skipped, "Skipping parcels not eligible for assignment");
        }

        let update = ParcelUpdate {
            status: Some(ParcelStatus::Assigned),
            driver_id: Some(driver_id),
            dispatch_timestamp_ms: Some(now_ms),
            ..Default::default()
        };
        let updated = self.store.bulk_update(&eligible, &update)?;
        info!(driver_id = %driver_id, parcels = updated, "Parcels assigned");
        Ok(updated)
    }

    /// Geocode parcels that lack coordinates; returns how many were
    /// updated.
    ///
    /// A geocoder outage is soft: the parcel keeps its blank position
    /// and the pass moves on.
    pub fn geocode_missing(&self, parcel_ids: &[ParcelId]) -> Result<usize> {
        let parcels = self.store.get_parcels_by_ids(parcel_ids)?;
        let mut updated = 0;
        for parcel in parcels {
            if parcel.position.is_some() || parcel.address.is_empty() {
                continue;
            }
            match self.geocoder.geocode(&parcel.address) {
                Ok(Some(position)) => {
                    let update = ParcelUpdate {
                        position: Some(position),
                        ..Default::default()
                    };
                    self.store.update_parcel(parcel.id, &update)?;
                    updated += 1;
                }
                Ok(None) => {
                    debug!(tracking_no = %parcel.tracking_no, "Address did not geocode");
                }
                Err(e) => {
                    warn!(
                        tracking_no = %parcel.tracking_no,
                        error = %e,
                        "Geocoder unavailable, keeping parcel ungeocoded"
                    );
                }
            }
        }
        info!(requested = parcel_ids.len(), updated, "Geocoding pass finished");
        Ok(updated)
    }

    /// Tag every parcel whose position falls inside the zone's boundary
    pub fn assign_zone(&self, zone_id: ZoneId) -> Result<usize> {
        let zone = self
            .store
            .get_zone(zone_id)?
            .ok_or_else(|| DispatchError::zone_not_found(zone_id))?;
        let parcels = self.store.all_parcels()?;
        let members = filter_by_zone(parcels, &zone);
        let ids: Vec<ParcelId> = members.iter().map(|p| p.id).collect();

        let update = ParcelUpdate {
            zone_id: Some(zone.id),
            ..Default::default()
        };
        let updated = self.store.bulk_update(&ids, &update)?;
        info!(zone_id = %zone_id, parcels = updated, "Zone membership assigned");
        Ok(updated)
    }

    /// Optimize a driver's route.
    ///
    /// `depot_address` overrides the configured depot when it geocodes;
    /// otherwise the configured depot is used.
    pub fn optimize_route(
        &self,
        driver_id: DriverId,
        depot_address: Option<&str>,
    ) -> Result<DriverRoute> {
        let depot = self.resolve_depot(depot_address);
        self.optimizer.optimize(driver_id, depot)
    }

    /// Apply an operator-chosen stop order for a driver
    pub fn apply_manual_route(
        &self,
        driver_id: DriverId,
        ordered_ids: &[ParcelId],
        depot_address: Option<&str>,
    ) -> Result<DriverRoute> {
        let depot = self.resolve_depot(depot_address);
        self.optimizer.apply_manual(driver_id, ordered_ids, depot)
    }

    /// Ingest a carrier feed file, optionally pre-assigning a driver
    pub fn ingest_file(
        &self,
        format: SourceFormat,
        path: &Path,
        driver: Option<DriverId>,
        now_ms: u64,
    ) -> std::result::Result<IngestReport, IngestError> {
        let parser = format.parser();
        let mut file = File::open(path)?;
        ingest(
            self.store.as_ref(),
            parser.as_ref(),
            &mut file,
            driver,
            now_ms,
        )
    }

    /// Inventory counters for dashboards and the status command
    pub fn counts(&self) -> Result<ParcelCounts> {
        Ok(self.store.counts()?)
    }

    fn resolve_depot(&self, depot_address: Option<&str>) -> GeoPoint {
        let address = match depot_address {
            Some(addr) if !addr.trim().is_empty() => addr,
            _ => return self.depot,
        };
        match self.geocoder.geocode(address) {
            Ok(Some(point)) => point,
            Ok(None) => {
                warn!(address, "Depot address did not geocode, using configured depot");
                self.depot
            }
            Err(e) => {
                warn!(
                    address,
                    error = %e,
                    "Geocoder unavailable, using configured depot"
                );
                self.depot
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::{FixedGeocoder, GeocodeError};
    use lastmile_domain::{NewParcel, SorterId};
    use lastmile_geo::{Polygon, Ring};
    use lastmile_store::MemoryStore;

    const NOW_MS: u64 = 1_700_000_000_000;

    struct OutageGeocoder;

    impl Geocoder for OutageGeocoder {
        fn geocode(
            &self,
            _address: &str,
        ) -> std::result::Result<Option<GeoPoint>, GeocodeError> {
            Err(GeocodeError::Status { status: 503 })
        }
    }

    fn dispatcher_with(geocoder: Box<dyn Geocoder>) -> (Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = StationConfig::default_config();
        let dispatcher = Dispatcher::new(store.clone(), geocoder, &config).unwrap();
        (dispatcher, store)
    }

    fn insert(
        store: &MemoryStore,
        tracking: &str,
        address: &str,
        position: Option<GeoPoint>,
        driver: Option<DriverId>,
    ) -> ParcelId {
        let mut parcel = NewParcel::new(
            tracking.to_string(),
            "GOFO".to_string(),
            address.to_string(),
        );
        parcel.position = position;
        parcel.driver_id = driver;
        store.insert_parcel(parcel, NOW_MS).unwrap().id
    }

    #[test]
    fn test_assign_updates_eligible_parcels() {
        let (dispatcher, store) = dispatcher_with(Box::new(FixedGeocoder::new()));
        let driver = store.insert_driver("Rachid").unwrap();
        let other = store.insert_driver("Samira").unwrap();

        let pending = insert(&store, "LM-1", "a", None, None);
        let reassigned = insert(&store, "LM-2", "b", None, Some(other.id));
        let sorted = insert(&store, "LM-3", "c", None, Some(driver.id));
        store.commit_sort(sorted, SorterId(7), NOW_MS).unwrap();

        let later = NOW_MS + 5_000;
        let updated = dispatcher
            .assign(&[pending, reassigned, sorted], driver.id, later)
            .unwrap();
        assert_eq!(updated, 2);

        let p1 = store.get_parcel("LM-1").unwrap().unwrap();
        assert_eq!(p1.status, ParcelStatus::Assigned);
        assert_eq!(p1.driver_id, Some(driver.id));
        assert_eq!(p1.dispatch_timestamp_ms, Some(later));

        let p2 = store.get_parcel("LM-2").unwrap().unwrap();
        assert_eq!(p2.driver_id, Some(driver.id));
        assert_eq!(p2.dispatch_timestamp_ms, Some(later));

        // Sorted parcels stay out of re-assignment
        let p3 = store.get_parcel("LM-3").unwrap().unwrap();
        assert_eq!(p3.status, ParcelStatus::Sorted);
        assert_eq!(p3.dispatch_timestamp_ms, Some(NOW_MS));
    }

    #[test]
    fn test_assign_requires_existing_driver() {
        let (dispatcher, store) = dispatcher_with(Box::new(FixedGeocoder::new()));
        let id = insert(&store, "LM-1", "a", None, None);

        let err = dispatcher
            .assign(&[id], DriverId(404), NOW_MS)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
    }

    #[test]
    fn test_geocode_missing_updates_only_blank_positions() {
        let known = GeoPoint::new(33.58, -7.61).unwrap();
        let geocoder = FixedGeocoder::new().with("12 Rue des Fleurs", known);
        let (dispatcher, store) = dispatcher_with(Box::new(geocoder));

        let already = insert(
            &store,
            "LM-1",
            "5 Avenue Hassan II",
            Some(GeoPoint::new(33.6, -7.6).unwrap()),
            None,
        );
        let resolvable = insert(&store, "LM-2", "12 Rue des Fleurs", None, None);
        let unknown = insert(&store, "LM-3", "No such street", None, None);
        let blank = insert(&store, "LM-4", "", None, None);

        let updated = dispatcher
            .geocode_missing(&[already, resolvable, unknown, blank])
            .unwrap();
        assert_eq!(updated, 1);

        let p2 = store.get_parcel("LM-2").unwrap().unwrap();
        assert_eq!(p2.position, Some(known));
        assert_eq!(store.get_parcel("LM-3").unwrap().unwrap().position, None);
        assert_eq!(store.get_parcel("LM-4").unwrap().unwrap().position, None);
    }

    #[test]
    fn test_geocoder_outage_is_soft() {
        let (dispatcher, store) = dispatcher_with(Box::new(OutageGeocoder));
        let id = insert(&store, "LM-1", "12 Rue des Fleurs", None, None);

        let updated = dispatcher.geocode_missing(&[id]).unwrap();
        assert_eq!(updated, 0);
        assert_eq!(store.get_parcel("LM-1").unwrap().unwrap().position, None);
    }

    #[test]
    fn test_assign_zone_tags_members_only() {
        let (dispatcher, store) = dispatcher_with(Box::new(FixedGeocoder::new()));

        // Square around central Casablanca
        let boundary = Polygon::new(Ring::new(vec![
            GeoPoint::new(33.50, -7.70).unwrap(),
            GeoPoint::new(33.50, -7.50).unwrap(),
            GeoPoint::new(33.70, -7.50).unwrap(),
            GeoPoint::new(33.70, -7.70).unwrap(),
        ]));
        let zone = store.insert_zone("Casa Centre", &boundary).unwrap();

        let inside_a = insert(
            &store,
            "LM-1",
            "a",
            Some(GeoPoint::new(33.58, -7.61).unwrap()),
            None,
        );
        let inside_b = insert(
            &store,
            "LM-2",
            "b",
            Some(GeoPoint::new(33.55, -7.65).unwrap()),
            None,
        );
        let outside = insert(
            &store,
            "LM-3",
            "c",
            Some(GeoPoint::new(34.05, -6.80).unwrap()),
            None,
        );
        let ungeocoded = insert(&store, "LM-4", "d", None, None);

        let updated = dispatcher.assign_zone(zone.id).unwrap();
        assert_eq!(updated, 2);

        let tagged = |id: ParcelId| {
            store
                .get_parcels_by_ids(&[id])
                .unwrap()
                .remove(0)
                .zone_id
        };
        assert_eq!(tagged(inside_a), Some(zone.id));
        assert_eq!(tagged(inside_b), Some(zone.id));
        assert_eq!(tagged(outside), None);
        assert_eq!(tagged(ungeocoded), None);
    }

    #[test]
    fn test_assign_zone_unknown_zone_fails() {
        let (dispatcher, _store) = dispatcher_with(Box::new(FixedGeocoder::new()));
        let err = dispatcher.assign_zone(ZoneId(404)).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
    }

    #[test]
    fn test_optimize_route_depot_override_and_fallback() {
        let override_depot = GeoPoint::new(33.50, -7.40).unwrap();
        let geocoder = FixedGeocoder::new().with("Warehouse 9", override_depot);
        let (dispatcher, store) = dispatcher_with(Box::new(geocoder));
        let driver = store.insert_driver("Rachid").unwrap();

        insert(
            &store,
            "LM-1",
            "a",
            Some(GeoPoint::new(33.58, -7.61).unwrap()),
            Some(driver.id),
        );
        insert(
            &store,
            "LM-2",
            "b",
            Some(GeoPoint::new(33.60, -7.55).unwrap()),
            Some(driver.id),
        );

        let from_config = dispatcher.optimize_route(driver.id, None).unwrap();
        assert_eq!(from_config.stops.len(), 2);

        let from_override = dispatcher
            .optimize_route(driver.id, Some("Warehouse 9"))
            .unwrap();
        assert_ne!(
            from_config.total_distance_km,
            from_override.total_distance_km
        );

        // Unresolvable override falls back to the configured depot
        let fallback = dispatcher
            .optimize_route(driver.id, Some("No such place"))
            .unwrap();
        assert_eq!(fallback.total_distance_km, from_config.total_distance_km);
    }

    #[test]
    fn test_ingest_file_roundtrip() {
        let (dispatcher, store) = dispatcher_with(Box::new(FixedGeocoder::new()));
        let driver = store.insert_driver("Rachid").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gofo.csv");
        std::fs::write(
            &path,
            "Name,Street,City,State/Region,Postal,Country,Note,Latitude,Longitude\n\
             Alice,12 Rue des Fleurs,Casablanca,GC,20000,MA,GF-001,33.58,-7.61\n\
             Bob,3 Rue Atlas,Rabat,,10000,MA,GF-002,34.02,-6.83\n",
        )
        .unwrap();

        let report = dispatcher
            .ingest_file(SourceFormat::Gofo, &path, Some(driver.id), NOW_MS)
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 0);

        let counts = dispatcher.counts().unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.by_status.get("assigned"), Some(&2));
        assert_eq!(counts.by_source.get("GOFO"), Some(&2));
    }
}
