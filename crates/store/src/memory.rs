//! In-memory parcel store.
//!
//! Reference implementation of the storage contract. Every operation
//! takes the single interior lock, so the composite guarded operations
//! are trivially atomic. Used by tests, fixtures and small tooling.

use lastmile_domain::store::{BulkInsertOutcome, ParcelCounts, ParcelStore, StoreError};
use lastmile_domain::{
    Driver, DriverId, NewParcel, Parcel, ParcelId, ParcelStatus, ParcelUpdate, SorterId, Zone,
    ZoneId,
};
use lastmile_geo::Polygon;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    parcels: BTreeMap<i64, Parcel>,
    drivers: BTreeMap<i64, Driver>,
    zones: BTreeMap<i64, Zone>,
    next_parcel_id: i64,
    next_driver_id: i64,
    next_zone_id: i64,
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

impl Inner {
    fn insert_one(&mut self, parcel: NewParcel, now_ms: u64) -> Result<Parcel, StoreError> {
        if self
            .parcels
            .values()
            .any(|p| p.tracking_no == parcel.tracking_no)
        {
            return Err(StoreError::DuplicateTracking {
                tracking_no: parcel.tracking_no,
            });
        }
        self.next_parcel_id += 1;
        let status = parcel.initial_status();
        let stored = Parcel {
            id: ParcelId(self.next_parcel_id),
            tracking_no: parcel.tracking_no,
            source: parcel.source,
            address: parcel.address,
            position: parcel.position,
            status,
            driver_id: parcel.driver_id,
            sorter_id: None,
            zone_id: parcel.zone_id,
            sequence_order: None,
            dispatch_timestamp_ms: parcel.driver_id.map(|_| now_ms),
            sort_timestamp_ms: None,
        };
        self.parcels.insert(stored.id.0, stored.clone());
        Ok(stored)
    }

    fn next_bag_position(&self, driver_id: Option<DriverId>) -> u32 {
        self.parcels
            .values()
            .filter(|p| p.driver_id == driver_id)
            .filter_map(|p| p.sequence_order)
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl ParcelStore for MemoryStore {
    fn insert_parcel(&self, parcel: NewParcel, now_ms: u64) -> Result<Parcel, StoreError> {
        self.lock()?.insert_one(parcel, now_ms)
    }

    fn bulk_insert(
        &self,
        parcels: Vec<NewParcel>,
        now_ms: u64,
    ) -> Result<BulkInsertOutcome, StoreError> {
        let mut inner = self.lock()?;
        let mut outcome = BulkInsertOutcome {
            inserted: Vec::new(),
            duplicates: Vec::new(),
        };
        for parcel in parcels {
            match inner.insert_one(parcel, now_ms) {
                Ok(stored) => outcome.inserted.push(stored),
                Err(StoreError::DuplicateTracking { tracking_no }) => {
                    outcome.duplicates.push(tracking_no)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    fn get_parcel(&self, tracking_no: &str) -> Result<Option<Parcel>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .parcels
            .values()
            .find(|p| p.tracking_no == tracking_no)
            .cloned())
    }

    fn get_parcels_by_ids(&self, ids: &[ParcelId]) -> Result<Vec<Parcel>, StoreError> {
        let inner = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.parcels.get(&id.0).cloned())
            .collect())
    }

    fn get_parcels(
        &self,
        driver_id: DriverId,
        statuses: &[ParcelStatus],
    ) -> Result<Vec<Parcel>, StoreError> {
        let inner = self.lock()?;
        let mut parcels: Vec<Parcel> = inner
            .parcels
            .values()
            .filter(|p| p.driver_id == Some(driver_id) && statuses.contains(&p.status))
            .cloned()
            .collect();
        // Bag position first (unsequenced last), then insertion id
        parcels.sort_by_key(|p| {
            (
                p.sequence_order.is_none(),
                p.sequence_order.unwrap_or(0),
                p.id.0,
            )
        });
        Ok(parcels)
    }

    fn all_parcels(&self) -> Result<Vec<Parcel>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.parcels.values().cloned().collect())
    }

    fn update_parcel(&self, id: ParcelId, update: &ParcelUpdate) -> Result<Parcel, StoreError> {
        let mut inner = self.lock()?;
        let parcel = inner
            .parcels
            .get_mut(&id.0)
            .ok_or(StoreError::NotFound { id })?;
        update.apply(parcel);
        Ok(parcel.clone())
    }

    fn bulk_update(&self, ids: &[ParcelId], update: &ParcelUpdate) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let mut touched = 0;
        for id in ids {
            if let Some(parcel) = inner.parcels.get_mut(&id.0) {
                update.apply(parcel);
                touched += 1;
            }
        }
        Ok(touched)
    }

    fn write_sequence(&self, assignments: &[(ParcelId, u32)]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for (id, sequence) in assignments {
            if let Some(parcel) = inner.parcels.get_mut(&id.0) {
                parcel.sequence_order = Some(*sequence);
            }
        }
        Ok(())
    }

    fn max_sequence_order(&self, driver_id: DriverId) -> Result<Option<u32>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .parcels
            .values()
            .filter(|p| p.driver_id == Some(driver_id))
            .filter_map(|p| p.sequence_order)
            .max())
    }

    fn commit_sort(
        &self,
        id: ParcelId,
        sorter_id: SorterId,
        at_ms: u64,
    ) -> Result<Option<u32>, StoreError> {
        let mut inner = self.lock()?;
        let current = match inner.parcels.get(&id.0) {
            Some(p) => p.clone(),
            None => return Ok(None),
        };
        if current.status != ParcelStatus::Assigned {
            return Ok(None);
        }
        let sequence = match current.sequence_order {
            Some(s) => s,
            None => inner.next_bag_position(current.driver_id),
        };
        if let Some(parcel) = inner.parcels.get_mut(&id.0) {
            parcel.status = ParcelStatus::Sorted;
            parcel.sorter_id = Some(sorter_id);
            parcel.sort_timestamp_ms = Some(at_ms);
            parcel.sequence_order = Some(sequence);
        }
        Ok(Some(sequence))
    }

    fn commit_unsort(
        &self,
        id: ParcelId,
        expected_sorter: Option<SorterId>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let parcel = match inner.parcels.get_mut(&id.0) {
            Some(p) => p,
            None => return Ok(false),
        };
        if parcel.status != ParcelStatus::Sorted {
            return Ok(false);
        }
        if let Some(expected) = expected_sorter {
            if parcel.sorter_id != Some(expected) {
                return Ok(false);
            }
        }
        parcel.status = ParcelStatus::Assigned;
        parcel.sorter_id = None;
        parcel.sort_timestamp_ms = None;
        Ok(true)
    }

    fn parcels_sorted_by(&self, sorter_id: SorterId) -> Result<Vec<Parcel>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .parcels
            .values()
            .filter(|p| p.sorter_id == Some(sorter_id) && p.sort_timestamp_ms.is_some())
            .cloned()
            .collect())
    }

    fn insert_driver(&self, name: &str) -> Result<Driver, StoreError> {
        let mut inner = self.lock()?;
        inner.next_driver_id += 1;
        let driver = Driver {
            id: DriverId(inner.next_driver_id),
            name: name.to_string(),
        };
        inner.drivers.insert(driver.id.0, driver.clone());
        Ok(driver)
    }

    fn get_driver(&self, id: DriverId) -> Result<Option<Driver>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.drivers.get(&id.0).cloned())
    }

    fn insert_zone(&self, name: &str, boundary: &Polygon) -> Result<Zone, StoreError> {
        let mut inner = self.lock()?;
        inner.next_zone_id += 1;
        let zone = Zone {
            id: ZoneId(inner.next_zone_id),
            name: name.to_string(),
            boundary: boundary.clone(),
        };
        inner.zones.insert(zone.id.0, zone.clone());
        Ok(zone)
    }

    fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.zones.get(&id.0).cloned())
    }

    fn zones(&self) -> Result<Vec<Zone>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.zones.values().cloned().collect())
    }

    fn counts(&self) -> Result<ParcelCounts, StoreError> {
        let inner = self.lock()?;
        let mut counts = ParcelCounts::default();
        for parcel in inner.parcels.values() {
            counts.total += 1;
            *counts
                .by_status
                .entry(parcel.status.as_str().to_string())
                .or_insert(0) += 1;
            *counts.by_source.entry(parcel.source.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
