//! Per-carrier CSV feed parsers.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use lastmile_domain::NewParcel;
use lastmile_geo::GeoPoint;
use tracing::warn;

use crate::error::IngestError;

const SOURCE_GOFO: &str = "GOFO";
const SOURCE_CAINIAO: &str = "CAINIAO";

/// Parser output before storage
#[derive(Debug, Default)]
pub struct ParsedFeed {
    /// Data rows read (header excluded)
    pub total_rows: usize,

    /// Valid insert payloads
    pub parcels: Vec<NewParcel>,

    /// Per-row problems, human readable
    pub errors: Vec<String>,
}

/// Feed parser for one carrier's export format.
///
/// Implementations are stateless; `parse` reads the whole feed and
/// reports per-row problems in the output instead of failing fast.
pub trait ParcelSourceParser {
    /// Source tag written into stored parcels
    fn source(&self) -> &'static str;

    /// Parse a raw feed into insert payloads
    fn parse(&self, input: &mut dyn Read) -> Result<ParsedFeed, IngestError>;
}

/// Supported carrier feed formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Gofo,
    Cainiao,
}

impl SourceFormat {
    /// Parser implementation for this format
    pub fn parser(&self) -> Box<dyn ParcelSourceParser> {
        match self {
            SourceFormat::Gofo => Box::new(GofoParser),
            SourceFormat::Cainiao => Box::new(CainiaoParser),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gofo" => Ok(SourceFormat::Gofo),
            "cainiao" => Ok(SourceFormat::Cainiao),
            other => Err(format!("Unknown source format: {}", other)),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Gofo => f.write_str("gofo"),
            SourceFormat::Cainiao => f.write_str("cainiao"),
        }
    }
}

/// GOFO export: tracking number in `Note`, address split over street,
/// postal and city columns, coordinates in decimal columns
#[derive(Debug, Clone, Copy, Default)]
pub struct GofoParser;

impl ParcelSourceParser for GofoParser {
    fn source(&self) -> &'static str {
        SOURCE_GOFO
    }

    fn parse(&self, input: &mut dyn Read) -> Result<ParsedFeed, IngestError> {
        let mut reader = csv::ReaderBuilder::new().from_reader(input);
        let headers = reader.headers()?.clone();
        let [note, street, city, postal, latitude, longitude] = resolve_columns(
            SOURCE_GOFO,
            &headers,
            ["Note", "Street", "City", "Postal", "Latitude", "Longitude"],
        )?;

        let mut feed = ParsedFeed::default();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            feed.total_rows += 1;

            let tracking = field_at(&record, note);
            if tracking.is_empty() {
                feed.errors
                    .push(format!("Row {}: missing tracking number", row + 2));
                continue;
            }

            let address = join_address([
                field_at(&record, street),
                field_at(&record, postal),
                field_at(&record, city),
            ]);
            let mut parcel =
                NewParcel::new(tracking.to_string(), SOURCE_GOFO.to_string(), address);
            parcel.position = build_position(
                tracking,
                field_at(&record, latitude),
                field_at(&record, longitude),
            );
            feed.parcels.push(parcel);
        }
        Ok(feed)
    }
}

/// CAINIAO export: tracking in `Tracking No.`, address built from
/// detail address, sort code and city, both coordinates in a single
/// `lat,lon` column
#[derive(Debug, Clone, Copy, Default)]
pub struct CainiaoParser;

impl ParcelSourceParser for CainiaoParser {
    fn source(&self) -> &'static str {
        SOURCE_CAINIAO
    }

    fn parse(&self, input: &mut dyn Read) -> Result<ParsedFeed, IngestError> {
        let mut reader = csv::ReaderBuilder::new().from_reader(input);
        let headers = reader.headers()?.clone();
        let [tracking_col, detail_col] = resolve_columns(
            SOURCE_CAINIAO,
            &headers,
            ["Tracking No.", "Receiver's Detail Address"],
        )?;
        // These columns vary between exports; absent means blank
        let sort_code_col = header_index(&headers, "Sort Code");
        let city_col = header_index(&headers, "Receiver's City");
        let coords_col = header_index(&headers, "Receiver to (Latitude,Longitude)");

        let mut feed = ParsedFeed::default();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            feed.total_rows += 1;

            let tracking = field_at(&record, tracking_col);
            if tracking.is_empty() {
                feed.errors
                    .push(format!("Row {}: missing tracking number", row + 2));
                continue;
            }

            let address = join_address([
                field_at(&record, detail_col),
                opt_field(&record, sort_code_col),
                opt_field(&record, city_col),
            ]);
            let mut parcel =
                NewParcel::new(tracking.to_string(), SOURCE_CAINIAO.to_string(), address);
            parcel.position = match opt_field(&record, coords_col).split_once(',') {
                Some((lat_raw, lon_raw)) => build_position(tracking, lat_raw, lon_raw),
                None => None,
            };
            feed.parcels.push(parcel);
        }
        Ok(feed)
    }
}

/// Resolve required header names to column indices, or fail with the
/// full list of what is missing
fn resolve_columns<const N: usize>(
    source: &'static str,
    headers: &csv::StringRecord,
    names: [&str; N],
) -> Result<[usize; N], IngestError> {
    let mut indices = [0usize; N];
    let mut missing = Vec::new();
    for (slot, name) in indices.iter_mut().zip(names.iter()) {
        match header_index(headers, name) {
            Some(idx) => *slot = idx,
            None => missing.push(name.to_string()),
        }
    }
    if missing.is_empty() {
        Ok(indices)
    } else {
        Err(IngestError::MissingColumns {
            source,
            columns: missing,
        })
    }
}

/// Column index by header name; tolerates surrounding whitespace and a
/// UTF-8 BOM on the first header
fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
}

/// Trimmed field at a known column
fn field_at<'a>(record: &'a csv::StringRecord, idx: usize) -> &'a str {
    record.get(idx).map(str::trim).unwrap_or("")
}

/// Trimmed field at an optional column
fn opt_field<'a>(record: &'a csv::StringRecord, idx: Option<usize>) -> &'a str {
    idx.map(|i| field_at(record, i)).unwrap_or("")
}

/// Join non-blank address parts with a comma
fn join_address(parts: [&str; 3]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Position from raw coordinate strings; anything blank, unparsable or
/// out of range leaves the parcel ungeocoded
fn build_position(tracking_no: &str, lat_raw: &str, lon_raw: &str) -> Option<GeoPoint> {
    let lat = parse_coordinate(lat_raw)?;
    let lon = parse_coordinate(lon_raw)?;
    match GeoPoint::new(lat, lon) {
        Ok(point) => Some(point),
        Err(e) => {
            warn!(
                tracking_no = %tracking_no,
                error = %e,
                "Discarding out-of-range coordinates"
            );
            None
        }
    }
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
