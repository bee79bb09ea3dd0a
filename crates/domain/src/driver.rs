//! Driver roster model.

use crate::ids::DriverId;
use serde::{Deserialize, Serialize};

/// A delivery driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    /// Unique driver identifier
    pub id: DriverId,

    /// Display name shown on scan receipts and route sheets
    pub name: String,
}
