//! Feed-to-store ingestion pipeline.

use std::io::Read;

use lastmile_domain::{DriverId, ParcelStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IngestError;
use crate::parser::ParcelSourceParser;

/// Outcome of one feed ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Data rows read from the feed
    pub total_rows: usize,

    /// Parcels newly inserted
    pub inserted: usize,

    /// Rows skipped because the tracking number already exists
    pub duplicates: usize,

    /// Per-row problems, human readable for the operator
    pub errors: Vec<String>,
}

/// Parse a feed and load it into the store.
///
/// Duplicate tracking numbers are skipped, never updated. With `driver`
/// set every inserted parcel is pre-assigned and enters the round as
/// `assigned` with `now_ms` as its dispatch timestamp.
pub fn ingest(
    store: &dyn ParcelStore,
    parser: &dyn ParcelSourceParser,
    input: &mut dyn Read,
    driver: Option<DriverId>,
    now_ms: u64,
) -> Result<IngestReport, IngestError> {
    let feed = parser.parse(input)?;
    let mut parcels = feed.parcels;
    if let Some(driver_id) = driver {
        for parcel in &mut parcels {
            parcel.driver_id = Some(driver_id);
        }
    }

    let outcome = store.bulk_insert(parcels, now_ms)?;
    let report = IngestReport {
        total_rows: feed.total_rows,
        inserted: outcome.inserted.len(),
        duplicates: outcome.duplicates.len(),
        errors: feed.errors,
    };
    info!(
        source = parser.source(),
        total_rows = report.total_rows,
        inserted = report.inserted,
        duplicates = report.duplicates,
        errors = report.errors.len(),
        "Feed ingested"
    );
    Ok(report)
}
