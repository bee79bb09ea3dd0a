//! Carrier feed intake.
//!
//! Each supported carrier exports a CSV feed with its own column
//! conventions; a [`ParcelSourceParser`] turns one feed into insert
//! payloads and [`ingest`] loads them into the store, skipping tracking
//! numbers that already exist.

pub mod error;
pub mod parser;
pub mod pipeline;

pub use error::IngestError;
pub use parser::{CainiaoParser, GofoParser, ParcelSourceParser, ParsedFeed, SourceFormat};
pub use pipeline::{ingest, IngestReport};
