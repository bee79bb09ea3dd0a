//! End-to-end tests for the dispatch station
//!
//! This suite drives the public crate APIs the way the station binary
//! wires them:
//! - assignment, routing and manual overrides through `Dispatcher`
//! - scanning, reverts and bag progress through `SortingStation`
//! - carrier feed ingest from CSV files on disk
//! - the same lifecycle against the durable SQLite backend

pub mod test_utils;

#[cfg(test)]
mod station_flow_tests;

#[cfg(test)]
mod sqlite_flow_tests;
