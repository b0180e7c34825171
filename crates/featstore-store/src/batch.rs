//! Upsert rows and the shared batch buffer.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rusqlite::{Statement, Transaction};
use tracing::{debug, warn};

use featstore_types::{BigId, FeatureKey, StoredFeature};

use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::range::{ValidRange, start_seconds};

/// Lifecycle of the batch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing pending.
    Idle,
    /// Upserts queued, waiting for a flush.
    Accumulating(usize),
    /// A flush is executing.
    Flushing,
}

/// Every value bound by one upsert, owned so it can wait in a batch.
#[derive(Debug, Clone)]
pub(crate) struct UpsertRow {
    pub(crate) key: FeatureKey,
    pub(crate) uid: String,
    parent_id: i64,
    name: String,
    description: Option<String>,
    geometry: Option<Vec<u8>>,
    bbox: [Option<f64>; 4],
    valid_time: String,
    valid_begin: i64,
    valid_end: i64,
    pub(crate) data: String,
}

impl UpsertRow {
    pub(crate) fn new<F: StoredFeature>(key: FeatureKey, parent: BigId, feature: &F, data: String) -> Self {
        let range = ValidRange::for_key(&key, feature.valid_time());
        let (geometry, bbox) = match feature.geometry() {
            Some(geometry) => {
                let bbox = geometry
                    .bbox()
                    .map_or([None; 4], |b| [Some(b.min_x), Some(b.min_y), Some(b.max_x), Some(b.max_y)]);
                (Some(geometry.to_wkb().to_vec()), bbox)
            }
            None => (None, [None; 4]),
        };
        Self {
            key,
            uid: feature.unique_identifier().to_string(),
            parent_id: parent.as_i64(),
            name: feature.name().to_string(),
            description: feature.description().map(str::to_string),
            geometry,
            bbox,
            valid_time: range.to_string(),
            valid_begin: start_seconds(key.valid_start_time()),
            valid_end: range.end_seconds(),
            data,
        }
    }

    /// Run the upsert, binding insert values then update values.
    pub(crate) fn execute(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        stmt.execute(rusqlite::params![
            self.key.internal_id().as_i64(),
            self.parent_id,
            self.uid,
            self.name,
            self.description,
            self.geometry,
            min_x,
            min_y,
            max_x,
            max_y,
            self.valid_time,
            self.valid_begin,
            self.valid_end,
            self.data,
            // update clause
            self.parent_id,
            self.uid,
            self.name,
            self.description,
            self.geometry,
            min_x,
            min_y,
            max_x,
            max_y,
            self.valid_time,
            self.valid_end,
            self.data,
        ])
    }
}

/// Upserts waiting to be executed as one transaction.
///
/// One buffer is shared by all writer threads. The same mutex guards
/// queuing and flushing, so every queued row is either part of exactly one
/// committed transaction or discarded.
pub(crate) struct Batch {
    pending: Mutex<Vec<UpsertRow>>,
    max_size: usize,
    flushing: AtomicBool,
}

impl Batch {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            max_size: max_size.max(1),
            flushing: AtomicBool::new(false),
        }
    }

    /// Queue a row. Returns true once the buffer is full and must be flushed.
    pub(crate) fn push(&self, row: UpsertRow) -> bool {
        let mut pending = self.pending.lock();
        pending.push(row);
        pending.len() >= self.max_size
    }

    /// Serialized body of the most recent queued upsert for `key`.
    pub(crate) fn pending_data(&self, key: &FeatureKey) -> Option<String> {
        self.pending
            .lock()
            .iter()
            .rev()
            .find(|row| row.key == *key)
            .map(|row| row.data.clone())
    }

    /// Execute every queued row in one transaction, in queue order.
    ///
    /// The buffer is empty afterwards whatever the outcome. Returns the
    /// keys written.
    pub(crate) fn commit(&self, pool: &ConnectionPool, upsert_sql: &str) -> Result<Vec<FeatureKey>> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let rows = std::mem::take(&mut *pending);

        self.flushing.store(true, Ordering::Release);
        let result = execute_rows(pool, upsert_sql, &rows);
        self.flushing.store(false, Ordering::Release);
        drop(pending);

        result?;
        debug!("Committed batch of {} features", rows.len());
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    /// Drop queued rows without executing them. Returns how many were lost.
    pub(crate) fn discard(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub(crate) fn state(&self) -> BatchState {
        if self.flushing.load(Ordering::Acquire) {
            return BatchState::Flushing;
        }
        match self.pending.lock().len() {
            0 => BatchState::Idle,
            n => BatchState::Accumulating(n),
        }
    }
}

fn execute_rows(pool: &ConnectionPool, upsert_sql: &str, rows: &[UpsertRow]) -> Result<()> {
    let batch_name = || format!("batch of {} features", rows.len());
    let mut conn = pool
        .get()
        .map_err(|e| Error::persistence("commit", batch_name(), e))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::persistence("commit", batch_name(), e))?;

    match insert_rows(&tx, upsert_sql, rows) {
        Ok(()) => tx
            .commit()
            .map_err(|e| Error::persistence("commit", batch_name(), e)),
        Err((uid, e)) => {
            if let Err(rollback) = tx.rollback() {
                warn!("Failed to roll back batch: {}", rollback);
            }
            Err(Error::persistence("commit", uid, e))
        }
    }
}

fn insert_rows(
    tx: &Transaction<'_>,
    upsert_sql: &str,
    rows: &[UpsertRow],
) -> std::result::Result<(), (String, rusqlite::Error)> {
    let mut stmt = tx
        .prepare_cached(upsert_sql)
        .map_err(|e| (String::from("batch"), e))?;
    for row in rows {
        row.execute(&mut stmt).map_err(|e| (row.uid.clone(), e))?;
    }
    Ok(())
}
