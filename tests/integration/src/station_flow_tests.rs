//! Full bag lifecycle over the in-memory backend

use std::sync::Arc;

use lastmile_dispatch::FixedGeocoder;
use lastmile_domain::{ParcelStatus, ParcelStore, SorterId};
use lastmile_geo::{GeoPoint, Polygon, Ring};
use lastmile_ingest::SourceFormat;
use lastmile_sorting::ScanAuthority;
use lastmile_store::MemoryStore;

use crate::test_utils::{current_timestamp_ms, init_test_logging, TestStation};

#[test]
fn test_assign_optimize_scan_unscan_manual_cycle() {
    init_test_logging();
    let depot = GeoPoint::new(48.75, 2.25).unwrap();
    let geocoder = FixedGeocoder::new().with("Paris Depot", depot);
    let station = TestStation::with_geocoder(Arc::new(MemoryStore::new()), Box::new(geocoder));

    let driver = station.store.insert_driver("Dounia").unwrap();
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
    let assigned = station
        .dispatcher
        .assign(&[a.id, b.id], driver.id, now)
        .unwrap();
    assert_eq!(assigned, 2);

    // Depot, A and B sit on a line, so the best route visits A first
    let route = station
        .dispatcher
        .optimize_route(driver.id, Some("Paris Depot"))
        .unwrap();
    assert_eq!(route.stops.len(), 2);
    assert_eq!(route.stops[0].tracking_no, "LM-A");
    assert_eq!(route.stops[1].tracking_no, "LM-B");
    assert_eq!(route.stops[0].sequence, 1);
    assert_eq!(route.stops[1].sequence, 2);
    assert!(route.total_distance_km > 0.0);
    assert!(route.total_duration_min > 0.0);

    // Scans land in the optimizer's slots
    let first = station
        .sorting
        .scan("LM-A", SorterId(1), now + 1_000)
        .unwrap();
    assert_eq!(first.bag_position, Some(1));
    assert!(!first.already_sorted);
    let second = station
        .sorting
        .scan("LM-B", SorterId(1), now + 2_000)
        .unwrap();
    assert_eq!(second.bag_position, Some(2));

    let summary = station.sorting.driver_bag_summary(driver.id).unwrap();
    assert_eq!(summary.progress_percent, 100.0);

    // Reverting one scan keeps its slot for a later re-scan
    let reverted = station
        .sorting
        .unscan("LM-B", SorterId(1), ScanAuthority::Standard)
        .unwrap();
    assert_eq!(reverted.status, ParcelStatus::Assigned);
    assert_eq!(reverted.sequence_order, Some(2));
    let summary = station.sorting.driver_bag_summary(driver.id).unwrap();
    assert_eq!(summary.progress_percent, 50.0);

    // Operator override replaces the computed order
    let manual = station
        .dispatcher
        .apply_manual_route(driver.id, &[b.id, a.id], Some("Paris Depot"))
        .unwrap();
    assert_eq!(manual.stops[0].tracking_no, "LM-B");
    assert_eq!(manual.stops[0].sequence, 1);
    assert_eq!(manual.stops[1].tracking_no, "LM-A");
    assert_eq!(manual.stops[1].sequence, 2);
    assert!(manual.total_distance_km >= route.total_distance_km);

    let stored_b = station.store.get_parcel("LM-B").unwrap().unwrap();
    assert_eq!(stored_b.sequence_order, Some(1));
    let stored_a = station.store.get_parcel("LM-A").unwrap().unwrap();
    assert_eq!(stored_a.sequence_order, Some(2));
}

#[test]
fn test_feed_to_bag_flow() {
    init_test_logging();
    let geocoded = GeoPoint::new(33.57, -7.59).unwrap();
    let geocoder = FixedGeocoder::new().with("12 Rue des Fleurs, 20000, Casablanca", geocoded);
    let station = TestStation::with_geocoder(Arc::new(MemoryStore::new()), Box::new(geocoder));
    let driver = station.store.insert_driver("Rachid").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gofo.csv");
    std::fs::write(
        &path,
        "Note,Street,City,Postal,Latitude,Longitude\n\
         GF-001,5 Avenue Hassan II,Casablanca,20000,33.58,-7.61\n\
         GF-002,9 Rue Atlas,Casablanca,20250,33.60,-7.55\n\
         GF-003,12 Rue des Fleurs,Casablanca,20000,,\n",
    )
    .unwrap();

    let now = current_timestamp_ms();
    let report = station
        .dispatcher
        .ingest_file(SourceFormat::Gofo, &path, Some(driver.id), now)
        .unwrap();
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.inserted, 3);
    assert!(report.errors.is_empty());

    // The row without coordinates resolves through the geocoder
    let ids: Vec<_> = station
        .store
        .all_parcels()
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    let geocoded_count = station.dispatcher.geocode_missing(&ids).unwrap();
    assert_eq!(geocoded_count, 1);
    assert_eq!(
        station.store.get_parcel("GF-003").unwrap().unwrap().position,
        Some(geocoded)
    );

    let boundary = Polygon::new(Ring::new(vec![
        GeoPoint::new(33.50, -7.70).unwrap(),
        GeoPoint::new(33.50, -7.50).unwrap(),
        GeoPoint::new(33.70, -7.50).unwrap(),
        GeoPoint::new(33.70, -7.70).unwrap(),
    ]));
    let zone = station.store.insert_zone("Casa Centre", &boundary).unwrap();
    assert_eq!(station.dispatcher.assign_zone(zone.id).unwrap(), 3);

    let route = station.dispatcher.optimize_route(driver.id, None).unwrap();
    assert_eq!(route.stops.len(), 3);

    let receipt = station
        .sorting
        .scan("GF-001", SorterId(3), now + 1_000)
        .unwrap();
    assert_eq!(receipt.zone_name.as_deref(), Some("Casa Centre"));
    assert_eq!(receipt.driver_name.as_deref(), Some("Rachid"));

    let summary = station.sorting.driver_bag_summary(driver.id).unwrap();
    assert_eq!(summary.total_parcels, 3);
    assert_eq!(summary.progress_percent, 33.3);
}
