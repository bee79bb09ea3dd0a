//! The same bag lifecycle against the durable backend, including a
//! process restart in the middle

use std::sync::Arc;

use lastmile_dispatch::FixedGeocoder;
use lastmile_domain::{ParcelStatus, ParcelStore, SorterId};
use lastmile_geo::GeoPoint;
use lastmile_sorting::ScanAuthority;
use lastmile_store::SqliteStore;

use crate::test_utils::{current_timestamp_ms, init_test_logging, TestStation};

#[test]
fn test_full_cycle_survives_reopen() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("station.db");
    let depot = GeoPoint::new(48.75, 2.25).unwrap();

    let driver_id;
    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let geocoder = FixedGeocoder::new().with("Paris Depot", depot);
        let station = TestStation::with_geocoder(store, Box::new(geocoder));
        let driver = station.store.insert_driver("Dounia").unwrap();
        driver_id = driver.id;

        let a = station.add_parcel(
            "LM-A",
            "8 Rue de la Paix",
            Some(GeoPoint::new(48.80, 2.30).unwrap()),
            None,
        );
        let b = station.add_parcel(
            "LM-B",
            "2 Avenue Foch",
            Some(GeoPoint::new(48.85, 2.35).unwrap()),
            None,
        );

        let now = current_timestamp_ms();
        station
            .dispatcher
            .assign(&[a.id, b.id], driver_id, now)
            .unwrap();
        station
            .dispatcher
            .optimize_route(driver_id, Some("Paris Depot"))
            .unwrap();
        station
            .sorting
            .scan("LM-A", SorterId(1), now + 1_000)
            .unwrap();
        station
            .sorting
            .scan("LM-B", SorterId(1), now + 2_000)
            .unwrap();
        station
            .sorting
            .unscan("LM-B", SorterId(1), ScanAuthority::Standard)
            .unwrap();
        station
            .dispatcher
            .apply_manual_route(driver_id, &[b.id, a.id], Some("Paris Depot"))
            .unwrap();
    }

    // A fresh handle sees exactly what the first process left behind
    let store = SqliteStore::open(&path).unwrap();
    let b = store.get_parcel("LM-B").unwrap().unwrap();
    assert_eq!(b.status, ParcelStatus::Assigned);
    assert_eq!(b.sequence_order, Some(1));
    assert_eq!(b.driver_id, Some(driver_id));
    assert_eq!(b.sorter_id, None);

    let a = store.get_parcel("LM-A").unwrap().unwrap();
    assert_eq!(a.status, ParcelStatus::Sorted);
    assert_eq!(a.sequence_order, Some(2));
    assert_eq!(a.sorter_id, Some(SorterId(1)));

    let counts = store.counts().unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.by_status.get("assigned"), Some(&1));
    assert_eq!(counts.by_status.get("sorted"), Some(&1));
}
