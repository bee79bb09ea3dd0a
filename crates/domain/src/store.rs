//! Storage abstraction for parcels, drivers and zones.
//!
//! The engine is written against this trait; `lastmile-store` ships an
//! in-memory implementation for tests and small deployments and a
//! SQLite implementation for the warehouse station.
//!
//! # Atomicity
//!
//! The composite operations `commit_sort` and `commit_unsort` carry the
//! concurrency contract of the sorting desk: guard evaluation and every
//! resulting write (including the lazy bag-position allocation) must be
//! applied atomically, so two racing scans can never both transition the
//! same parcel or draw the same bag position.

use crate::driver::Driver;
use crate::ids::{DriverId, ParcelId, SorterId, ZoneId};
use crate::parcel::{NewParcel, Parcel, ParcelStatus, ParcelUpdate};
use crate::zone::Zone;
use lastmile_geo::Polygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors surfaced by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Parcel not found: {id}")]
    NotFound { id: ParcelId },

    #[error("Duplicate tracking number: {tracking_no}")]
    DuplicateTracking { tracking_no: String },

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Outcome of a bulk insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkInsertOutcome {
    /// Parcels actually inserted
    pub inserted: Vec<Parcel>,

    /// Tracking numbers skipped because they already exist
    pub duplicates: Vec<String>,
}

/// Inventory counters grouped by lifecycle status and source feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParcelCounts {
    /// Total parcels on record
    pub total: u64,

    /// Parcel count per lifecycle status
    pub by_status: BTreeMap<String, u64>,

    /// Parcel count per source feed
    pub by_source: BTreeMap<String, u64>,
}

/// Storage interface the engine runs against
pub trait ParcelStore: Send + Sync {
    /// Insert one parcel; a pre-assigned driver makes it `assigned`
    /// with `now_ms` as the dispatch timestamp
    fn insert_parcel(&self, parcel: NewParcel, now_ms: u64) -> Result<Parcel, StoreError>;

    /// Insert many parcels in one transaction, skipping tracking
    /// numbers that already exist
    fn bulk_insert(
        &self,
        parcels: Vec<NewParcel>,
        now_ms: u64,
    ) -> Result<BulkInsertOutcome, StoreError>;

    /// Look up a parcel by tracking number
    fn get_parcel(&self, tracking_no: &str) -> Result<Option<Parcel>, StoreError>;

    /// Load parcels by id; unknown ids are silently skipped
    fn get_parcels_by_ids(&self, ids: &[ParcelId]) -> Result<Vec<Parcel>, StoreError>;

    /// A driver's parcels in the given statuses, ordered by bag
    /// position with unsequenced parcels last, then by id
    fn get_parcels(
        &self,
        driver_id: DriverId,
        statuses: &[ParcelStatus],
    ) -> Result<Vec<Parcel>, StoreError>;

    /// Every parcel on record, ordered by id
    fn all_parcels(&self) -> Result<Vec<Parcel>, StoreError>;

    /// Apply a partial update to one parcel
    fn update_parcel(&self, id: ParcelId, update: &ParcelUpdate) -> Result<Parcel, StoreError>;

    /// Apply the same partial update to many parcels; returns how many
    /// rows were touched
    fn bulk_update(&self, ids: &[ParcelId], update: &ParcelUpdate) -> Result<usize, StoreError>;

    /// Persist explicit bag positions in one transaction
    fn write_sequence(&self, assignments: &[(ParcelId, u32)]) -> Result<(), StoreError>;

    /// Highest bag position currently assigned to a driver's parcels
    fn max_sequence_order(&self, driver_id: DriverId) -> Result<Option<u32>, StoreError>;

    /// Atomically sort a parcel: requires status `assigned`, records the
    /// sorter and sort timestamp and, when no bag position is set,
    /// allocates `max + 1` for the parcel's driver. Returns the final
    /// bag position, or `None` when the guard failed.
    fn commit_sort(
        &self,
        id: ParcelId,
        sorter_id: SorterId,
        at_ms: u64,
    ) -> Result<Option<u32>, StoreError>;

    /// Atomically revert a sorted parcel to `assigned`, clearing the
    /// sorter and sort timestamp together while keeping the bag
    /// position. With `expected_sorter` set, the revert only applies
    /// when that operator did the sort. Returns false when the guard
    /// failed.
    fn commit_unsort(
        &self,
        id: ParcelId,
        expected_sorter: Option<SorterId>,
    ) -> Result<bool, StoreError>;

    /// Parcels whose sort record names the given operator. The record
    /// survives delivery and is cleared by unscan, so this is the input
    /// for per-operator statistics.
    fn parcels_sorted_by(&self, sorter_id: SorterId) -> Result<Vec<Parcel>, StoreError>;

    /// Register a driver
    fn insert_driver(&self, name: &str) -> Result<Driver, StoreError>;

    /// Look up a driver
    fn get_driver(&self, id: DriverId) -> Result<Option<Driver>, StoreError>;

    /// Register a delivery zone
    fn insert_zone(&self, name: &str, boundary: &Polygon) -> Result<Zone, StoreError>;

    /// Look up a zone
    fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>, StoreError>;

    /// All registered zones, ordered by id
    fn zones(&self) -> Result<Vec<Zone>, StoreError>;

    /// Inventory counters
    fn counts(&self) -> Result<ParcelCounts, StoreError>;
}
