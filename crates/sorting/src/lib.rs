//! Sorting-station operations: barcode scans, undo, bag summaries and
//! per-operator statistics.
//!
//! All state lives behind [`lastmile_domain::ParcelStore`]; the station
//! itself is stateless and safe to share across scanner threads.

pub mod station;

pub use station::{DriverBagSummary, ScanAuthority, ScanReceipt, SorterStats, SortingStation};
