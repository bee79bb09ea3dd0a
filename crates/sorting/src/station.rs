//! Barcode scan processing for the sorting desk.
//!
//! A scan answers one question for the operator: whose bag does this
//! parcel go into, and at which position. Scans are idempotent, racing
//! scans serialise through the store's atomic commit, and an undo is
//! guarded so one operator cannot silently revert another's work.

use std::sync::Arc;

use lastmile_domain::{
    DispatchError, DriverId, Parcel, ParcelId, ParcelStatus, ParcelStore, Result, SorterId,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::info;

/// Capability level for undo operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanAuthority {
    /// May undo only its own scans
    Standard,
    /// May undo any scan
    Elevated,
}

/// Answer displayed at the sorting desk after a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReceipt {
    /// Tracking number as stored (scanner padding trimmed)
    pub tracking_no: String,

    /// Scanned parcel
    pub parcel_id: ParcelId,

    /// Driver whose bag the parcel goes into
    pub driver_id: Option<DriverId>,

    /// Driver display name, when the driver record still exists
    pub driver_name: Option<String>,

    /// 1-based position in the driver's bag
    pub bag_position: Option<u32>,

    /// Zone name, when the parcel belongs to one
    pub zone_name: Option<String>,

    /// True when the parcel was already sorted and nothing changed
    pub already_sorted: bool,
}

/// Sorting progress for one driver's bag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverBagSummary {
    /// Driver the bag belongs to
    pub driver_id: DriverId,

    /// Parcels on the active round (assigned + sorted)
    pub total_parcels: u64,

    /// Parcels already in the bag
    pub sorted: u64,

    /// Parcels still waiting at the desk
    pub pending_sort: u64,

    /// sorted / total as a percentage, rounded to 1 decimal
    pub progress_percent: f64,
}

/// Daily scan statistics for one operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SorterStats {
    /// Operator the stats belong to
    pub sorter_id: SorterId,

    /// Scans whose sort timestamp falls on the requested day
    pub scanned: u64,

    /// Most recent scan by this operator, any day
    pub last_scan_ms: Option<u64>,
}

/// Stateless scan processor over a shared parcel store
pub struct SortingStation {
    store: Arc<dyn ParcelStore>,
}

impl SortingStation {
    pub fn new(store: Arc<dyn ParcelStore>) -> Self {
        Self { store }
    }

    /// Process a barcode scan.
    ///
    /// Re-scanning a sorted parcel is a success that echoes the stored
    /// bag position without touching state. A fresh scan commits
    /// atomically; when the optimizer has not assigned a position yet
    /// the parcel takes the next free slot in the driver's bag.
    ///
    /// # Arguments
    /// * `tracking_no` - Raw scanner input, surrounding whitespace ok
    /// * `sorter_id` - Operator at the desk
    /// * `now_ms` - Scan timestamp (Unix epoch milliseconds)
    pub fn scan(&self, tracking_no: &str, sorter_id: SorterId, now_ms: u64) -> Result<ScanReceipt> {
        let tracking = tracking_no.trim();
        let parcel = self
            .store
            .get_parcel(tracking)?
            .ok_or_else(|| DispatchError::parcel_not_found(tracking))?;

        if parcel.status == ParcelStatus::Sorted {
            info!(tracking_no = %tracking, "Parcel already sorted, echoing bag position");
            return self.receipt(tracking, &parcel, parcel.sequence_order, true);
        }

        if parcel.driver_id.is_none() {
            return Err(DispatchError::Unassigned {
                tracking_no: tracking.to_string(),
            });
        }

        if !parcel.status.can_transition_to(ParcelStatus::Sorted) {
            return Err(DispatchError::InvalidTransition {
                tracking_no: tracking.to_string(),
                from: parcel.status,
                to: ParcelStatus::Sorted,
            });
        }

        match self.store.commit_sort(parcel.id, sorter_id, now_ms)? {
            Some(position) => {
                info!(
                    tracking_no = %tracking,
                    sorter_id = %sorter_id,
                    bag_position = position,
                    "Parcel sorted"
                );
                self.receipt(tracking, &parcel, Some(position), false)
            }
            None => {
                // The guard refused: the parcel moved between the read
                // and the commit. A racing scan already sorted it, which
                // stays an idempotent success.
                let current = self.reload(tracking)?;
                if current.status == ParcelStatus::Sorted {
                    self.receipt(tracking, &current, current.sequence_order, true)
                } else {
                    Err(DispatchError::InvalidTransition {
                        tracking_no: tracking.to_string(),
                        from: current.status,
                        to: ParcelStatus::Sorted,
                    })
                }
            }
        }
    }

    /// Undo a scan, reverting the parcel to `assigned`.
    ///
    /// Standard authority may only revert its own scans; elevated
    /// authority may revert anyone's. The bag position survives so a
    /// later re-scan lands in the same slot.
    pub fn unscan(
        &self,
        tracking_no: &str,
        sorter_id: SorterId,
        authority: ScanAuthority,
    ) -> Result<Parcel> {
        let tracking = tracking_no.trim();
        let parcel = self
            .store
            .get_parcel(tracking)?
            .ok_or_else(|| DispatchError::parcel_not_found(tracking))?;

        if parcel.status != ParcelStatus::Sorted {
            return Err(DispatchError::NotSorted {
                tracking_no: tracking.to_string(),
            });
        }
        if authority == ScanAuthority::Standard && parcel.sorter_id != Some(sorter_id) {
            return Err(DispatchError::NotOwner {
                tracking_no: tracking.to_string(),
            });
        }

        let expected_sorter = match authority {
            ScanAuthority::Standard => Some(sorter_id),
            ScanAuthority::Elevated => None,
        };
        if self.store.commit_unsort(parcel.id, expected_sorter)? {
            info!(tracking_no = %tracking, sorter_id = %sorter_id, "Scan reverted");
            self.reload(tracking)
        } else {
            // The guard refused after our read; classify from the
            // current state
            let current = self.reload(tracking)?;
            if current.status == ParcelStatus::Sorted {
                Err(DispatchError::NotOwner {
                    tracking_no: tracking.to_string(),
                })
            } else {
                Err(DispatchError::NotSorted {
                    tracking_no: tracking.to_string(),
                })
            }
        }
    }

    /// Sorting progress for a driver's bag
    pub fn driver_bag_summary(&self, driver_id: DriverId) -> Result<DriverBagSummary> {
        let parcels = self
            .store
            .get_parcels(driver_id, &[ParcelStatus::Assigned, ParcelStatus::Sorted])?;
        let total = parcels.len() as u64;
        let sorted = parcels
            .iter()
            .filter(|p| p.status == ParcelStatus::Sorted)
            .count() as u64;
        let progress_percent = if total == 0 {
            0.0
        } else {
            (sorted as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Ok(DriverBagSummary {
            driver_id,
            total_parcels: total,
            sorted,
            pending_sort: total - sorted,
            progress_percent,
        })
    }

    /// Scan statistics for one operator on one calendar day.
    ///
    /// `utc_offset` decides where the day boundary falls; pass
    /// [`UtcOffset::UTC`] for epoch days.
    pub fn sorter_stats(
        &self,
        sorter_id: SorterId,
        day: Date,
        utc_offset: UtcOffset,
    ) -> Result<SorterStats> {
        let parcels = self.store.parcels_sorted_by(sorter_id)?;
        let mut scanned = 0u64;
        let mut last_scan_ms: Option<u64> = None;
        for parcel in &parcels {
            if let Some(ts) = parcel.sort_timestamp_ms {
                if scan_day(ts, utc_offset) == Some(day) {
                    scanned += 1;
                }
                if last_scan_ms.map_or(true, |prev| ts > prev) {
                    last_scan_ms = Some(ts);
                }
            }
        }
        Ok(SorterStats {
            sorter_id,
            scanned,
            last_scan_ms,
        })
    }

    /// Desk answer for a parcel; driver and zone lookups are soft, a
    /// missing record just leaves the name empty
    fn receipt(
        &self,
        tracking_no: &str,
        parcel: &Parcel,
        bag_position: Option<u32>,
        already_sorted: bool,
    ) -> Result<ScanReceipt> {
        let driver_name = match parcel.driver_id {
            Some(id) => self.store.get_driver(id)?.map(|d| d.name),
            None => None,
        };
        let zone_name = match parcel.zone_id {
            Some(id) => self.store.get_zone(id)?.map(|z| z.name),
            None => None,
        };
        Ok(ScanReceipt {
            tracking_no: tracking_no.to_string(),
            parcel_id: parcel.id,
            driver_id: parcel.driver_id,
            driver_name,
            bag_position,
            zone_name,
            already_sorted,
        })
    }

    fn reload(&self, tracking_no: &str) -> Result<Parcel> {
        self.store
            .get_parcel(tracking_no)?
            .ok_or_else(|| DispatchError::parcel_not_found(tracking_no))
    }
}

/// Calendar day of a millisecond timestamp in the given offset
fn scan_day(timestamp_ms: u64, utc_offset: UtcOffset) -> Option<Date> {
    let seconds = (timestamp_ms / 1000) as i64;
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .map(|utc| utc.to_offset(utc_offset).date())
}
