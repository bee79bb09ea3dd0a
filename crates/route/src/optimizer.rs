//! Route construction, persistence and manual override.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lastmile_domain::route::{google_maps_url, waze_url};
use lastmile_domain::{
    DispatchError, DriverId, DriverRoute, Parcel, ParcelId, ParcelStatus, ParcelStore, Result,
    Stop,
};
use lastmile_geo::{DistanceMatrix, GeoPoint};
use tracing::{info, warn};

use crate::solver::{identity_order, TspSolver};

/// Statuses still on the day's round
const ROUTABLE_STATUSES: [ParcelStatus; 2] = [ParcelStatus::Assigned, ParcelStatus::Sorted];

/// Route planner for one driver at a time.
///
/// Loads the driver's routable parcels, orders them and writes the
/// resulting 1-based bag positions back through the store, so scan
/// flows and later reads observe the same order. Distance and duration
/// figures are rounded only at this payload boundary; accumulation
/// stays exact.
pub struct RouteOptimizer {
    store: Arc<dyn ParcelStore>,
    solver: Box<dyn TspSolver>,
    average_speed_kmh: f64,
}

impl RouteOptimizer {
    /// # Arguments
    /// * `store` - Parcel storage backend
    /// * `solver` - Visit-order solver; failures fall back to load order
    /// * `average_speed_kmh` - Speed that turns leg distances into ETAs
    pub fn new(
        store: Arc<dyn ParcelStore>,
        solver: Box<dyn TspSolver>,
        average_speed_kmh: f64,
    ) -> Self {
        Self {
            store,
            solver,
            average_speed_kmh,
        }
    }

    /// Compute the best visit order from the depot and persist it.
    ///
    /// Parcels without coordinates stay off the route and keep their
    /// current bag position. An unavailable solver degrades to the
    /// stored order instead of failing the call.
    pub fn optimize(&self, driver_id: DriverId, depot: GeoPoint) -> Result<DriverRoute> {
        let routable = self.load_routable(driver_id)?;
        if routable.is_empty() {
            info!(driver_id = %driver_id, "No routable parcels, route is empty");
            return Ok(DriverRoute::empty(driver_id));
        }

        let order = if routable.len() == 1 {
            identity_order(2)
        } else {
            let mut points = Vec::with_capacity(routable.len() + 1);
            points.push(depot);
            points.extend(routable.iter().map(|(_, position)| *position));
            let matrix = DistanceMatrix::build(&points);
            match self.solver.solve(&matrix) {
                Ok(order) if is_depot_first_permutation(&order, points.len()) => order,
                Ok(_) => {
                    warn!(
                        driver_id = %driver_id,
                        "Solver returned an invalid order, keeping load order"
                    );
                    identity_order(points.len())
                }
                Err(e) => {
                    warn!(
                        driver_id = %driver_id,
                        error = %e,
                        "Solver unavailable, keeping load order"
                    );
                    identity_order(points.len())
                }
            }
        };

        // order[0] is the depot; the rest maps back to routable parcels
        let ordered: Vec<(Parcel, GeoPoint)> = order
            .iter()
            .skip(1)
            .map(|&idx| routable[idx - 1].clone())
            .collect();
        self.finish(driver_id, depot, ordered)
    }

    /// Persist an operator-chosen visit order.
    ///
    /// `ordered_ids` must cover the driver's routable parcels exactly,
    /// otherwise the call fails with [`DispatchError::RouteMismatch`]
    /// and nothing is written.
    pub fn apply_manual(
        &self,
        driver_id: DriverId,
        ordered_ids: &[ParcelId],
        depot: GeoPoint,
    ) -> Result<DriverRoute> {
        let routable = self.load_routable(driver_id)?;
        let current: BTreeSet<ParcelId> = routable.iter().map(|(parcel, _)| parcel.id).collect();
        let requested: BTreeSet<ParcelId> = ordered_ids.iter().copied().collect();

        // A repeated id counts as an unexpected extra
        let missing = current.difference(&requested).count();
        let duplicates = ordered_ids.len() - requested.len();
        let unexpected = requested.difference(&current).count() + duplicates;
        if missing > 0 || unexpected > 0 {
            return Err(DispatchError::RouteMismatch {
                driver_id,
                missing,
                unexpected,
            });
        }

        let mut by_id: BTreeMap<ParcelId, (Parcel, GeoPoint)> = routable
            .into_iter()
            .map(|entry| (entry.0.id, entry))
            .collect();
        let ordered: Vec<(Parcel, GeoPoint)> = ordered_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        info!(driver_id = %driver_id, stops = ordered.len(), "Applying manual route order");
        self.finish(driver_id, depot, ordered)
    }

    /// Active parcels that can be routed, paired with their positions.
    ///
    /// Parcels without coordinates are logged and left out.
    fn load_routable(&self, driver_id: DriverId) -> Result<Vec<(Parcel, GeoPoint)>> {
        let parcels = self.store.get_parcels(driver_id, &ROUTABLE_STATUSES)?;
        let mut routable = Vec::with_capacity(parcels.len());
        for parcel in parcels {
            match parcel.position {
                Some(position) => routable.push((parcel, position)),
                None => warn!(
                    parcel_id = %parcel.id,
                    tracking_no = %parcel.tracking_no,
                    "Parcel has no coordinates, excluded from route"
                ),
            }
        }
        Ok(routable)
    }

    /// Write 1-based positions and build the route payload
    fn finish(
        &self,
        driver_id: DriverId,
        depot: GeoPoint,
        ordered: Vec<(Parcel, GeoPoint)>,
    ) -> Result<DriverRoute> {
        let assignments: Vec<(ParcelId, u32)> = ordered
            .iter()
            .enumerate()
            .map(|(i, (parcel, _))| (parcel.id, i as u32 + 1))
            .collect();
        self.store.write_sequence(&assignments)?;

        let mut stops = Vec::with_capacity(ordered.len());
        let mut total_km = 0.0;
        let mut previous = depot;
        for (i, (parcel, position)) in ordered.iter().enumerate() {
            let leg_km = previous.haversine_km(position);
            total_km += leg_km;
            stops.push(Stop {
                parcel_id: parcel.id,
                tracking_no: parcel.tracking_no.clone(),
                address: parcel.address.clone(),
                sequence: i as u32 + 1,
                latitude: position.latitude,
                longitude: position.longitude,
                distance_from_previous_km: round2(leg_km),
                duration_from_previous_min: round1(self.leg_minutes(leg_km)),
                google_maps_url: google_maps_url(position.latitude, position.longitude),
                waze_url: waze_url(position.latitude, position.longitude),
            });
            previous = *position;
        }

        info!(
            driver_id = %driver_id,
            stops = stops.len(),
            total_km = round2(total_km),
            "Route computed"
        );
        Ok(DriverRoute {
            driver_id,
            total_distance_km: round2(total_km),
            total_duration_min: round1(self.leg_minutes(total_km)),
            stops,
        })
    }

    /// Minutes to drive `km` at the configured average speed
    fn leg_minutes(&self, km: f64) -> f64 {
        if self.average_speed_kmh <= 0.0 {
            return 0.0;
        }
        km / self.average_speed_kmh * 60.0
    }
}

/// Solver output contract: a permutation of `0..n` starting at the depot
fn is_depot_first_permutation(order: &[usize], n: usize) -> bool {
    if order.len() != n || order.first() != Some(&0) {
        return false;
    }
    let unique: BTreeSet<usize> = order.iter().copied().collect();
    unique.len() == n
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{CheapestArcSolver, SolverError};
    use lastmile_domain::NewParcel;
    use lastmile_store::MemoryStore;

    const SPEED_KMH: f64 = 35.0;
    const NOW_MS: u64 = 1_700_000_000_000;

    /// Solver stub for the degraded path
    struct FailingSolver;

    impl TspSolver for FailingSolver {
        fn solve(
            &self,
            _matrix: &DistanceMatrix,
        ) -> std::result::Result<Vec<usize>, SolverError> {
            Err(SolverError::Infeasible {
                reason: "offline".to_string(),
            })
        }
    }

    /// Solver stub that must never run
    struct PanickySolver;

    impl TspSolver for PanickySolver {
        fn solve(
            &self,
            _matrix: &DistanceMatrix,
        ) -> std::result::Result<Vec<usize>, SolverError> {
            panic!("solver must not run for this route");
        }
    }

    fn depot() -> GeoPoint {
        GeoPoint::new(48.75, 2.25).unwrap()
    }

    fn optimizer(store: Arc<dyn ParcelStore>) -> RouteOptimizer {
        RouteOptimizer::new(store, Box::new(CheapestArcSolver::default()), SPEED_KMH)
    }

    fn insert_at(
        store: &dyn ParcelStore,
        tracking: &str,
        driver: DriverId,
        lat: f64,
        lon: f64,
    ) -> ParcelId {
        let mut parcel = NewParcel::new(
            tracking.to_string(),
            "gofo".to_string(),
            format!("{} street", tracking),
        );
        parcel.driver_id = Some(driver);
        parcel.position = Some(GeoPoint::new(lat, lon).unwrap());
        store.insert_parcel(parcel, NOW_MS).unwrap().id
    }

    #[test]
    fn test_optimize_orders_stops_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();

        // Inserted out of order; the geography runs depot -> A -> B -> C
        let b = insert_at(store.as_ref(), "LM-B", driver.id, 48.85, 2.35);
        let c = insert_at(store.as_ref(), "LM-C", driver.id, 48.90, 2.40);
        let a = insert_at(store.as_ref(), "LM-A", driver.id, 48.80, 2.30);

        let route = optimizer(store.clone()).optimize(driver.id, depot()).unwrap();

        let ids: Vec<ParcelId> = route.stops.iter().map(|s| s.parcel_id).collect();
        assert_eq!(ids, vec![a, b, c]);
        let sequences: Vec<u32> = route.stops.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        assert!(
            (15.0..25.0).contains(&route.total_distance_km),
            "unexpected total distance {}",
            route.total_distance_km
        );
        assert!((25.0..45.0).contains(&route.total_duration_min));
        for stop in &route.stops {
            assert!((stop.distance_from_previous_km * 100.0).fract().abs() < 1e-9);
            assert!((stop.duration_from_previous_min * 10.0).fract().abs() < 1e-9);
            assert!(stop
                .google_maps_url
                .starts_with("https://www.google.com/maps/dir/?api=1&destination="));
            assert!(stop.waze_url.starts_with("https://waze.com/ul?ll="));
        }

        // Order persisted as 1-based bag positions
        let stored = store
            .get_parcels(driver.id, &[ParcelStatus::Assigned])
            .unwrap();
        let stored_ids: Vec<ParcelId> = stored.iter().map(|p| p.id).collect();
        assert_eq!(stored_ids, vec![a, b, c]);
        assert_eq!(stored[0].sequence_order, Some(1));
        assert_eq!(stored[2].sequence_order, Some(3));
    }

    #[test]
    fn test_optimize_without_parcels_yields_empty_route() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();

        let route = optimizer(store).optimize(driver.id, depot()).unwrap();
        assert!(route.stops.is_empty());
        assert_eq!(route.total_distance_km, 0.0);
        assert_eq!(route.total_duration_min, 0.0);
    }

    #[test]
    fn test_single_parcel_route_skips_the_solver() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();
        let a = insert_at(store.as_ref(), "LM-A", driver.id, 48.80, 2.30);

        let planner = RouteOptimizer::new(store.clone(), Box::new(PanickySolver), SPEED_KMH);
        let route = planner.optimize(driver.id, depot()).unwrap();

        assert_eq!(route.stops.len(), 1);
        assert_eq!(route.stops[0].parcel_id, a);
        assert_eq!(route.stops[0].sequence, 1);
        assert_eq!(route.stops[0].distance_from_previous_km, route.total_distance_km);
        assert!(route.total_distance_km > 0.0);
    }

    #[test]
    fn test_parcels_without_coordinates_stay_off_the_route() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();
        let a = insert_at(store.as_ref(), "LM-A", driver.id, 48.80, 2.30);
        let b = insert_at(store.as_ref(), "LM-B", driver.id, 48.85, 2.35);

        let mut blank = NewParcel::new(
            "LM-NOGEO".to_string(),
            "gofo".to_string(),
            "12 rue sans geocodage".to_string(),
        );
        blank.driver_id = Some(driver.id);
        let blank = store.insert_parcel(blank, NOW_MS).unwrap();

        let route = optimizer(store.clone()).optimize(driver.id, depot()).unwrap();
        let ids: Vec<ParcelId> = route.stops.iter().map(|s| s.parcel_id).collect();
        assert_eq!(ids, vec![a, b]);

        let kept = store.get_parcel("LM-NOGEO").unwrap().unwrap();
        assert_eq!(kept.id, blank.id);
        assert_eq!(kept.sequence_order, None);
    }

    #[test]
    fn test_solver_failure_falls_back_to_load_order() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();

        // Geographically B comes last, but load order wins on fallback
        let b = insert_at(store.as_ref(), "LM-B", driver.id, 48.85, 2.35);
        let a = insert_at(store.as_ref(), "LM-A", driver.id, 48.80, 2.30);

        let planner = RouteOptimizer::new(store, Box::new(FailingSolver), SPEED_KMH);
        let route = planner.optimize(driver.id, depot()).unwrap();

        let ids: Vec<ParcelId> = route.stops.iter().map(|s| s.parcel_id).collect();
        assert_eq!(ids, vec![b, a]);
        assert!(route.total_distance_km > 0.0);
    }

    #[test]
    fn test_manual_route_persists_operator_order() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();
        let a = insert_at(store.as_ref(), "LM-A", driver.id, 48.80, 2.30);
        let b = insert_at(store.as_ref(), "LM-B", driver.id, 48.85, 2.35);
        let c = insert_at(store.as_ref(), "LM-C", driver.id, 48.90, 2.40);

        let planner = optimizer(store.clone());
        let route = planner
            .apply_manual(driver.id, &[c, a, b], depot())
            .unwrap();

        let ids: Vec<ParcelId> = route.stops.iter().map(|s| s.parcel_id).collect();
        assert_eq!(ids, vec![c, a, b]);
        assert_eq!(route.stops[0].sequence, 1);

        let stored = store
            .get_parcels(driver.id, &[ParcelStatus::Assigned])
            .unwrap();
        let stored_ids: Vec<ParcelId> = stored.iter().map(|p| p.id).collect();
        assert_eq!(stored_ids, vec![c, a, b]);

        // Manual order is longer than the optimized one
        let optimized = planner.optimize(driver.id, depot()).unwrap();
        assert!(optimized.total_distance_km <= route.total_distance_km);
    }

    #[test]
    fn test_manual_route_rejects_wrong_id_set() {
        let store = Arc::new(MemoryStore::new());
        let driver = store.insert_driver("Rachid").unwrap();
        let a = insert_at(store.as_ref(), "LM-A", driver.id, 48.80, 2.30);
        let b = insert_at(store.as_ref(), "LM-B", driver.id, 48.85, 2.35);

        let planner = optimizer(store.clone());

        let err = planner.apply_manual(driver.id, &[a], depot()).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::RouteMismatch {
                missing: 1,
                unexpected: 0,
                ..
            }
        ));

        let foreign = ParcelId(9_999);
        let err = planner
            .apply_manual(driver.id, &[a, b, foreign], depot())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::RouteMismatch {
                missing: 0,
                unexpected: 1,
                ..
            }
        ));

        let err = planner
            .apply_manual(driver.id, &[a, a, b], depot())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::RouteMismatch {
                missing: 0,
                unexpected: 1,
                ..
            }
        ));

        // Nothing was persisted by the rejected calls
        let stored = store
            .get_parcels(driver.id, &[ParcelStatus::Assigned])
            .unwrap();
        assert!(stored.iter().all(|p| p.sequence_order.is_none()));
    }
}
