//! SQLite parcel store.
//!
//! Durable storage for the warehouse station:
//! - WAL journal mode for crash recovery and concurrent readers
//! - Schema applied on open, multi-row writes inside transactions
//! - Sorting-desk guards executed as single guarded UPDATE statements,
//!   so a racing scan can never double-commit a parcel or hand out the
//!   same bag position twice
//!
//! The connection sits behind a mutex so the store can be shared across
//! threads behind the [`ParcelStore`] trait.

use lastmile_domain::store::{BulkInsertOutcome, ParcelCounts, ParcelStore, StoreError};
use lastmile_domain::{
    Driver, DriverId, NewParcel, Parcel, ParcelId, ParcelStatus, ParcelUpdate, SorterId, Zone,
    ZoneId,
};
use lastmile_geo::{GeoPoint, Polygon};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const PARCEL_COLUMNS: &str = "id, tracking_no, source, address, latitude, longitude, status, \
     driver_id, sorter_id, zone_id, sequence_order, dispatch_timestamp_ms, sort_timestamp_ms";

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a store at the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    /// * `Ok(SqliteStore)` - Successfully opened store
    /// * `Err(StoreError)` - Failed to open or initialize the database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        info!(path = %path.display(), "Opening parcel store");

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(sql_err)?;

        // Enable WAL mode for better concurrency and durability
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(sql_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(sql_err)?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an ephemeral in-memory store (tests and dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema
    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS parcels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tracking_no TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                address TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                status TEXT NOT NULL DEFAULT 'pending',
                driver_id INTEGER,
                sorter_id INTEGER,
                zone_id INTEGER,
                sequence_order INTEGER,
                dispatch_timestamp_ms INTEGER,
                sort_timestamp_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_parcels_tracking ON parcels(tracking_no);
            CREATE INDEX IF NOT EXISTS idx_parcels_driver ON parcels(driver_id);
            CREATE INDEX IF NOT EXISTS idx_parcels_sorter ON parcels(sorter_id);

            CREATE TABLE IF NOT EXISTS drivers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS zones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                boundary TEXT NOT NULL
            );
            "#,
        )
        .map_err(sql_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }
}

fn sql_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map one result row onto the parcel model
fn row_to_parcel(row: &Row) -> rusqlite::Result<Parcel> {
    let status_text: String = row.get(6)?;
    let status = status_text
        .parse::<ParcelStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;

    let latitude: Option<f64> = row.get(4)?;
    let longitude: Option<f64> = row.get(5)?;
    let position = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(Parcel {
        id: ParcelId(row.get(0)?),
        tracking_no: row.get(1)?,
        source: row.get(2)?,
        address: row.get(3)?,
        position,
        status,
        driver_id: row.get::<_, Option<i64>>(7)?.map(DriverId),
        sorter_id: row.get::<_, Option<i64>>(8)?.map(SorterId),
        zone_id: row.get::<_, Option<i64>>(9)?.map(ZoneId),
        sequence_order: row.get::<_, Option<i64>>(10)?.map(|s| s as u32),
        dispatch_timestamp_ms: row.get::<_, Option<i64>>(11)?.map(|t| t as u64),
        sort_timestamp_ms: row.get::<_, Option<i64>>(12)?.map(|t| t as u64),
    })
}

fn query_parcel_by_id(conn: &Connection, id: ParcelId) -> Result<Option<Parcel>, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM parcels WHERE id = ?1", PARCEL_COLUMNS),
        params![id.0],
        row_to_parcel,
    )
    .optional()
    .map_err(sql_err)
}

/// Insert one parcel inside an open transaction, rejecting duplicates
fn insert_one_tx(tx: &Transaction, parcel: NewParcel, now_ms: u64) -> Result<Parcel, StoreError> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM parcels WHERE tracking_no = ?1",
            params![parcel.tracking_no],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)?;
    if exists.is_some() {
        return Err(StoreError::DuplicateTracking {
            tracking_no: parcel.tracking_no,
        });
    }

    let status = parcel.initial_status();
    let dispatch_ts = parcel.driver_id.map(|_| now_ms as i64);
    tx.execute(
        r#"
        INSERT INTO parcels (
            tracking_no, source, address, latitude, longitude,
            status, driver_id, zone_id, dispatch_timestamp_ms
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            parcel.tracking_no,
            parcel.source,
            parcel.address,
            parcel.position.map(|p| p.latitude),
            parcel.position.map(|p| p.longitude),
            status.as_str(),
            parcel.driver_id.map(|d| d.0),
            parcel.zone_id.map(|z| z.0),
            dispatch_ts,
        ],
    )
    .map_err(sql_err)?;

    let id = ParcelId(tx.last_insert_rowid());
    query_parcel_by_id(tx, id)?.ok_or(StoreError::NotFound { id })
}

/// Write every column of an already-loaded parcel back to its row
fn write_parcel_tx(tx: &Transaction, parcel: &Parcel) -> Result<(), StoreError> {
    tx.execute(
        r#"
        UPDATE parcels
        SET tracking_no = ?2, source = ?3, address = ?4, latitude = ?5, longitude = ?6,
            status = ?7, driver_id = ?8, sorter_id = ?9, zone_id = ?10,
            sequence_order = ?11, dispatch_timestamp_ms = ?12, sort_timestamp_ms = ?13
        WHERE id = ?1
        "#,
        params![
            parcel.id.0,
            parcel.tracking_no,
            parcel.source,
            parcel.address,
            parcel.position.map(|p| p.latitude),
            parcel.position.map(|p| p.longitude),
            parcel.status.as_str(),
            parcel.driver_id.map(|d| d.0),
            parcel.sorter_id.map(|s| s.0),
            parcel.zone_id.map(|z| z.0),
            parcel.sequence_order.map(|s| s as i64),
            parcel.dispatch_timestamp_ms.map(|t| t as i64),
            parcel.sort_timestamp_ms.map(|t| t as i64),
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

impl ParcelStore for SqliteStore {
    fn insert_parcel(&self, parcel: NewParcel, now_ms: u64) -> Result<Parcel, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql_err)?;
        let inserted = insert_one_tx(&tx, parcel, now_ms)?;
        tx.commit().map_err(sql_err)?;
        Ok(inserted)
    }

    fn bulk_insert(
        &self,
        parcels: Vec<NewParcel>,
        now_ms: u64,
    ) -> Result<BulkInsertOutcome, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql_err)?;
        let mut outcome = BulkInsertOutcome {
            inserted: Vec::new(),
            duplicates: Vec::new(),
        };
        for parcel in parcels {
            match insert_one_tx(&tx, parcel, now_ms) {
                Ok(stored) => outcome.inserted.push(stored),
                Err(StoreError::DuplicateTracking { tracking_no }) => {
                    outcome.duplicates.push(tracking_no)
                }
                Err(e) => return Err(e),
            }
        }
        tx.commit().map_err(sql_err)?;
        debug!(
            inserted = outcome.inserted.len(),
            duplicates = outcome.duplicates.len(),
            "Bulk insert committed"
        );
        Ok(outcome)
    }

    fn get_parcel(&self, tracking_no: &str) -> Result<Option<Parcel>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM parcels WHERE tracking_no = ?1",
                PARCEL_COLUMNS
            ),
            params![tracking_no],
            row_to_parcel,
        )
        .optional()
        .map_err(sql_err)
    }

    fn get_parcels_by_ids(&self, ids: &[ParcelId]) -> Result<Vec<Parcel>, StoreError> {
        let conn = self.lock()?;
        let mut parcels = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(parcel) = query_parcel_by_id(&conn, *id)? {
                parcels.push(parcel);
            }
        }
        Ok(parcels)
    }

    fn get_parcels(
        &self,
        driver_id: DriverId,
        statuses: &[ParcelStatus],
    ) -> Result<Vec<Parcel>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        // Status names come from the closed enum, never from callers
        let status_list = statuses
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM parcels WHERE driver_id = ?1 AND status IN ({}) \
             ORDER BY sequence_order IS NULL, sequence_order, id",
            PARCEL_COLUMNS, status_list
        );
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let parcels = stmt
            .query_map(params![driver_id.0], row_to_parcel)
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(parcels)
    }

    fn all_parcels(&self) -> Result<Vec<Parcel>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM parcels ORDER BY id",
                PARCEL_COLUMNS
            ))
            .map_err(sql_err)?;
        let parcels = stmt
            .query_map([], row_to_parcel)
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(parcels)
    }

    fn update_parcel(&self, id: ParcelId, update: &ParcelUpdate) -> Result<Parcel, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql_err)?;
        let mut parcel = query_parcel_by_id(&tx, id)?.ok_or(StoreError::NotFound { id })?;
        update.apply(&mut parcel);
        write_parcel_tx(&tx, &parcel)?;
        tx.commit().map_err(sql_err)?;
        Ok(parcel)
    }

    fn bulk_update(&self, ids: &[ParcelId], update: &ParcelUpdate) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql_err)?;
        let mut touched = 0;
        for id in ids {
            if let Some(mut parcel) = query_parcel_by_id(&tx, *id)? {
                update.apply(&mut parcel);
                write_parcel_tx(&tx, &parcel)?;
                touched += 1;
            }
        }
        tx.commit().map_err(sql_err)?;
        Ok(touched)
    }

    fn write_sequence(&self, assignments: &[(ParcelId, u32)]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql_err)?;
        {
            let mut stmt = tx
                .prepare("UPDATE parcels SET sequence_order = ?2 WHERE id = ?1")
                .map_err(sql_err)?;
            for (id, sequence) in assignments {
                stmt.execute(params![id.0, *sequence as i64]).map_err(sql_err)?;
            }
        }
        tx.commit().map_err(sql_err)?;
        Ok(())
    }

    fn max_sequence_order(&self, driver_id: DriverId) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(sequence_order) FROM parcels WHERE driver_id = ?1",
                params![driver_id.0],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        Ok(max.map(|m| m as u32))
    }

    fn commit_sort(
        &self,
        id: ParcelId,
        sorter_id: SorterId,
        at_ms: u64,
    ) -> Result<Option<u32>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql_err)?;

        // Guard and writes in one statement: the status check, the sort
        // record and the lazy bag-position allocation cannot be split by
        // a concurrent writer.
        let changed = tx
            .execute(
                r#"
                UPDATE parcels
                SET status = 'sorted',
                    sorter_id = ?2,
                    sort_timestamp_ms = ?3,
                    sequence_order = COALESCE(
                        sequence_order,
                        (SELECT COALESCE(MAX(p.sequence_order), 0) + 1
                         FROM parcels p
                         WHERE p.driver_id = parcels.driver_id)
                    )
                WHERE id = ?1 AND status = 'assigned'
                "#,
                params![id.0, sorter_id.0, at_ms as i64],
            )
            .map_err(sql_err)?;

        if changed == 0 {
            return Ok(None);
        }

        let sequence: Option<i64> = tx
            .query_row(
                "SELECT sequence_order FROM parcels WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;

        debug!(parcel_id = %id, sorter_id = %sorter_id, "Parcel committed to bag");
        Ok(sequence.map(|s| s as u32))
    }

    fn commit_unsort(
        &self,
        id: ParcelId,
        expected_sorter: Option<SorterId>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                r#"
                UPDATE parcels
                SET status = 'assigned', sorter_id = NULL, sort_timestamp_ms = NULL
                WHERE id = ?1 AND status = 'sorted' AND (?2 IS NULL OR sorter_id = ?2)
                "#,
                params![id.0, expected_sorter.map(|s| s.0)],
            )
            .map_err(sql_err)?;
        Ok(changed == 1)
    }

    fn parcels_sorted_by(&self, sorter_id: SorterId) -> Result<Vec<Parcel>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM parcels \
                 WHERE sorter_id = ?1 AND sort_timestamp_ms IS NOT NULL \
                 ORDER BY sort_timestamp_ms, id",
                PARCEL_COLUMNS
            ))
            .map_err(sql_err)?;
        let parcels = stmt
            .query_map(params![sorter_id.0], row_to_parcel)
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(parcels)
    }

    fn insert_driver(&self, name: &str) -> Result<Driver, StoreError> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO drivers (name) VALUES (?1)", params![name])
            .map_err(sql_err)?;
        Ok(Driver {
            id: DriverId(conn.last_insert_rowid()),
            name: name.to_string(),
        })
    }

    fn get_driver(&self, id: DriverId) -> Result<Option<Driver>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name FROM drivers WHERE id = ?1",
            params![id.0],
            |row| {
                Ok(Driver {
                    id: DriverId(row.get(0)?),
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(sql_err)
    }

    fn insert_zone(&self, name: &str, boundary: &Polygon) -> Result<Zone, StoreError> {
        let boundary_json =
            serde_json::to_string(boundary).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO zones (name, boundary) VALUES (?1, ?2)",
            params![name, boundary_json],
        )
        .map_err(sql_err)?;
        Ok(Zone {
            id: ZoneId(conn.last_insert_rowid()),
            name: name.to_string(),
            boundary: boundary.clone(),
        })
    }

    fn get_zone(&self, id: ZoneId) -> Result<Option<Zone>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT id, name, boundary FROM zones WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(sql_err)?;
        match row {
            Some((id, name, boundary_json)) => {
                let boundary = serde_json::from_str(&boundary_json)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(Some(Zone {
                    id: ZoneId(id),
                    name,
                    boundary,
                }))
            }
            None => Ok(None),
        }
    }

    fn zones(&self) -> Result<Vec<Zone>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, boundary FROM zones ORDER BY id")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;

        let mut zones = Vec::with_capacity(rows.len());
        for (id, name, boundary_json) in rows {
            let boundary = serde_json::from_str(&boundary_json)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            zones.push(Zone {
                id: ZoneId(id),
                name,
                boundary,
            });
        }
        Ok(zones)
    }

    fn counts(&self) -> Result<ParcelCounts, StoreError> {
        let conn = self.lock()?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM parcels", [], |row| row.get(0))
            .map_err(sql_err)?;

        let mut counts = ParcelCounts {
            total: total as u64,
            ..Default::default()
        };

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM parcels GROUP BY status")
            .map_err(sql_err)?;
        let by_status = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        for (status, count) in by_status {
            counts.by_status.insert(status, count as u64);
        }

        let mut stmt = conn
            .prepare("SELECT source, COUNT(*) FROM parcels GROUP BY source")
            .map_err(sql_err)?;
        let by_source = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sql_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_err)?;
        for (source, count) in by_source {
            counts.by_source.insert(source, count as u64);
        }

        Ok(counts)
    }
}
