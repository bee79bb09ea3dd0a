//! Ingestion error taxonomy.

use lastmile_domain::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Feed file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input is not parsable CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Header row lacks columns the format requires
    #[error("Missing columns in {source} feed: {columns:?}")]
    MissingColumns {
        // `r#` keeps thiserror 1.x from treating this field (the feed
        // name) as the error's source(); the identifier is still `source`.
        r#source: &'static str,
        columns: Vec<String>,
    },

    /// Storage failure during insert
    #[error(transparent)]
    Store(#[from] StoreError),
}
