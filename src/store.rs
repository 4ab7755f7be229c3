//! Local record store for RosterCore.
//!
//! One SQLite table per entity kind. Each row keeps the full record as JSON
//! in `data` next to the columns queries filter on (server id, owner, date
//! range, sync state). Those columns are rewritten from the record on every
//! write, so they never drift from `data`.
//!
//! UUIDs are stored as BLOB (16 bytes). Dates are zero-padded `YYYY-MM-DD`
//! text so range filters can compare them as strings. Timestamps are Unix
//! seconds.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RosterError, RosterResult, ValidationError};
use crate::models::{EntityKind, LeaveRequest, Record, SyncStatus};
use crate::validation::{Validate, DATE_FORMAT};

/// Filter for [`Store::list`]. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub owner_id: Option<i64>,
    /// Keep records whose date range ends on or after this day
    pub start_date: Option<NaiveDate>,
    /// Keep records whose date range starts on or before this day
    pub end_date: Option<NaiveDate>,
    pub sync_status: Option<SyncStatus>,
}

impl RecordFilter {
    pub fn owner(owner_id: i64) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Default::default()
        }
    }

    pub fn status(status: SyncStatus) -> Self {
        Self {
            sync_status: Some(status),
            ..Default::default()
        }
    }
}

/// Writes applied together in one transaction.
#[derive(Debug, Clone)]
pub struct RecordBatch<R> {
    pub upserts: Vec<R>,
    /// Local ids to remove (with their owned records)
    pub deletions: Vec<Uuid>,
}

impl<R> Default for RecordBatch<R> {
    fn default() -> Self {
        Self {
            upserts: Vec::new(),
            deletions: Vec::new(),
        }
    }
}

impl<R> RecordBatch<R> {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }
}

/// Number of records per sync state for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusCounts {
    pub pending: usize,
    pub synced: usize,
    pub error: usize,
    pub conflict: usize,
}

impl SyncStatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.synced + self.error + self.conflict
    }

    /// Records that still need the server's attention
    pub fn unsynced(&self) -> usize {
        self.pending + self.error + self.conflict
    }
}

/// Kinds whose records are deleted together with their owner.
pub fn owned_kinds(kind: EntityKind) -> &'static [EntityKind] {
    match kind {
        EntityKind::Project => &[EntityKind::Task],
        EntityKind::Employee => &[
            EntityKind::WorkEntry,
            EntityKind::LeaveRequest,
            EntityKind::TaskAssignment,
        ],
        _ => &[],
    }
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

/// Insert or replace the row for `record`, keyed by local id.
fn write_row<R: Record>(conn: &Connection, record: &R) -> RosterResult<()> {
    let data = serde_json::to_string(record)?;
    let sync = record.sync();
    let sql = format!(
        "INSERT INTO {} (local_id, server_id, owner_id, record_date, record_end_date, data,
                         sync_status, last_modified, sync_error, sync_retry_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(local_id) DO UPDATE SET
            server_id = excluded.server_id,
            owner_id = excluded.owner_id,
            record_date = excluded.record_date,
            record_end_date = excluded.record_end_date,
            data = excluded.data,
            sync_status = excluded.sync_status,
            last_modified = excluded.last_modified,
            sync_error = excluded.sync_error,
            sync_retry_count = excluded.sync_retry_count",
        R::KIND.table_name()
    );

    conn.execute(
        &sql,
        params![
            record.local_id().as_bytes().to_vec(),
            record.server_id(),
            record.owner_id(),
            format_date(record.record_date()),
            format_date(record.record_end_date()),
            data,
            sync.status.as_str(),
            sync.last_modified.map(|t| t.timestamp()),
            sync.sync_error,
            sync.retry_count,
        ],
    )?;
    Ok(())
}

/// Delete one row and everything it owns. Returns whether the row existed.
fn delete_row(conn: &Connection, kind: EntityKind, local_id: Uuid) -> RosterResult<bool> {
    let table = kind.table_name();
    let server_id: Option<Option<i64>> = conn
        .query_row(
            &format!("SELECT server_id FROM {} WHERE local_id = ?", table),
            params![local_id.as_bytes().to_vec()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(server_id) = server_id else {
        return Ok(false);
    };

    // Children reference their owner by server id; a draft owner has none
    if let Some(server_id) = server_id {
        for child in owned_kinds(kind) {
            let removed = conn.execute(
                &format!("DELETE FROM {} WHERE owner_id = ?", child.table_name()),
                params![server_id],
            )?;
            if removed > 0 {
                tracing::debug!("Cascade deleted {} {} of {} {}", removed, child, kind, server_id);
            }
        }
    }

    conn.execute(
        &format!("DELETE FROM {} WHERE local_id = ?", table),
        params![local_id.as_bytes().to_vec()],
    )?;
    Ok(true)
}

fn parse_record<R: Record>(data: &str) -> RosterResult<R> {
    Ok(serde_json::from_str(data)?)
}

/// SQLite-backed cache of all entity kinds
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> RosterResult<Self> {
        let conn = Connection::open(db_path)?;

        // WAL lets readers run while a sync batch is being written
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let mut store = Self { conn };
        store.init_database()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> RosterResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.init_database()?;
        Ok(store)
    }

    /// Create the per-kind tables and their indexes
    pub fn init_database(&mut self) -> RosterResult<()> {
        let mut created = 0;
        for kind in EntityKind::ALL {
            let table = kind.table_name();
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                params![table],
                |row| row.get(0),
            )?;
            if exists {
                continue;
            }

            self.conn.execute_batch(&format!(
                r#"
                CREATE TABLE {table} (
                    local_id BLOB PRIMARY KEY,
                    server_id INTEGER UNIQUE,
                    owner_id INTEGER,
                    record_date TEXT,
                    record_end_date TEXT,
                    data TEXT NOT NULL,
                    sync_status TEXT NOT NULL DEFAULT 'pending',
                    last_modified INTEGER,
                    sync_error TEXT,
                    sync_retry_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id);
                CREATE INDEX IF NOT EXISTS idx_{table}_date
                    ON {table}(record_date, record_end_date);
                CREATE INDEX IF NOT EXISTS idx_{table}_sync_status ON {table}(sync_status);
                "#
            ))?;
            created += 1;
        }

        if created > 0 {
            tracing::info!("Created {} record tables", created);
        }
        Ok(())
    }

    // ========================================================================
    // Single-record writes
    // ========================================================================

    /// Insert a new record. Fails if the local id already exists.
    pub fn insert<R: Record + Validate>(&self, record: &R) -> RosterResult<()> {
        record.validate()?;
        if self.exists::<R>(record.local_id())? {
            return Err(RosterError::Conflict(format!(
                "{} {} already exists",
                R::KIND,
                record.local_id()
            )));
        }
        write_row(&self.conn, record)
    }

    /// Overwrite an existing record as-is. Returns false if it does not exist.
    pub fn update<R: Record + Validate>(&self, record: &R) -> RosterResult<bool> {
        record.validate()?;
        if !self.exists::<R>(record.local_id())? {
            return Ok(false);
        }
        write_row(&self.conn, record)?;
        Ok(true)
    }

    /// Save a user edit: mark the record pending and insert or update it.
    pub fn save_draft<R: Record + Validate>(&self, record: &mut R) -> RosterResult<()> {
        record.validate()?;
        record.sync_mut().mark_pending();
        write_row(&self.conn, record)
    }

    /// Delete a record and, for owners, the records it owns.
    pub fn delete<R: Record>(&self, local_id: Uuid) -> RosterResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = delete_row(&tx, R::KIND, local_id)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Make a record that hit the retry ceiling eligible for push again.
    pub fn reset_retry<R: Record>(&self, local_id: Uuid) -> RosterResult<bool> {
        let Some(mut record) = self.get::<R>(local_id)? else {
            return Ok(false);
        };
        record.sync_mut().reset_retry();
        write_row(&self.conn, &record)?;
        Ok(true)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    fn exists<R: Record>(&self, local_id: Uuid) -> RosterResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE local_id = ?)",
            R::KIND.table_name()
        );
        Ok(self
            .conn
            .query_row(&sql, params![local_id.as_bytes().to_vec()], |row| row.get(0))?)
    }

    pub fn get<R: Record>(&self, local_id: Uuid) -> RosterResult<Option<R>> {
        let sql = format!("SELECT data FROM {} WHERE local_id = ?", R::KIND.table_name());
        let data: Option<String> = self
            .conn
            .query_row(&sql, params![local_id.as_bytes().to_vec()], |row| row.get(0))
            .optional()?;
        data.map(|d| parse_record(&d)).transpose()
    }

    pub fn find_by_server_id<R: Record>(&self, server_id: i64) -> RosterResult<Option<R>> {
        let sql = format!("SELECT data FROM {} WHERE server_id = ?", R::KIND.table_name());
        let data: Option<String> = self
            .conn
            .query_row(&sql, params![server_id], |row| row.get(0))
            .optional()?;
        data.map(|d| parse_record(&d)).transpose()
    }

    /// List records matching `filter`, ordered by date then creation.
    ///
    /// Records without a date never match a date filter.
    pub fn list<R: Record>(&self, filter: &RecordFilter) -> RosterResult<Vec<R>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(owner_id) = filter.owner_id {
            clauses.push("owner_id = ?");
            values.push(SqlValue::Integer(owner_id));
        }
        if let Some(start) = filter.start_date {
            clauses.push("record_end_date >= ?");
            values.push(SqlValue::Text(start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = filter.end_date {
            clauses.push("record_date <= ?");
            values.push(SqlValue::Text(end.format(DATE_FORMAT).to_string()));
        }
        if let Some(status) = filter.sync_status {
            clauses.push("sync_status = ?");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT data FROM {} {} ORDER BY record_date IS NULL, record_date, local_id",
            R::KIND.table_name(),
            where_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            records.push(parse_record(&data?)?);
        }
        Ok(records)
    }

    pub fn list_all<R: Record>(&self) -> RosterResult<Vec<R>> {
        self.list(&RecordFilter::default())
    }

    pub fn list_by_owner<R: Record>(&self, owner_id: i64) -> RosterResult<Vec<R>> {
        self.list(&RecordFilter::owner(owner_id))
    }

    /// Records a push at `now` should send: pending, plus errored records
    /// under the retry ceiling whose backoff has passed.
    pub fn pending_for_push<R: Record>(
        &self,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> RosterResult<Vec<R>> {
        let sql = format!(
            "SELECT data FROM {}
             WHERE sync_status = 'pending'
                OR (sync_status = 'error' AND sync_retry_count < ?)
             ORDER BY local_id",
            R::KIND.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![max_retries], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            let record: R = parse_record(&data?)?;
            if record.sync().needs_push(max_retries, now) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Local records the server has never acknowledged (no server id yet).
    pub fn list_unlinked<R: Record>(&self) -> RosterResult<Vec<R>> {
        let sql = format!(
            "SELECT data FROM {} WHERE server_id IS NULL ORDER BY local_id",
            R::KIND.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            records.push(parse_record(&data?)?);
        }
        Ok(records)
    }

    pub fn count<R: Record>(&self) -> RosterResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::KIND.table_name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn sync_status_counts(&self, kind: EntityKind) -> RosterResult<SyncStatusCounts> {
        let sql = format!(
            "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
            kind.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = SyncStatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match SyncStatus::from_str(&status) {
                Some(SyncStatus::Pending) => counts.pending = count,
                Some(SyncStatus::Synced) => counts.synced = count,
                Some(SyncStatus::Error) => counts.error = count,
                Some(SyncStatus::Conflict) => counts.conflict = count,
                None => tracing::warn!("Unknown sync status '{}' in {}", status, kind),
            }
        }
        Ok(counts)
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Apply a batch atomically: either every write lands or none does.
    pub fn apply_batch<R: Record + Validate>(&self, batch: &RecordBatch<R>) -> RosterResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        for record in &batch.upserts {
            record.validate()?;
        }

        let tx = self.conn.unchecked_transaction()?;
        for record in &batch.upserts {
            write_row(&tx, record)?;
        }
        for local_id in &batch.deletions {
            delete_row(&tx, R::KIND, *local_id)?;
        }
        tx.commit()?;

        tracing::debug!(
            "Applied {} batch: {} upserts, {} deletions",
            R::KIND,
            batch.upserts.len(),
            batch.deletions.len()
        );
        Ok(())
    }

    /// Write `record` and drop `duplicate`, another local row holding the
    /// same server record, in one transaction.
    ///
    /// Records owned through the shared server id stay in place.
    pub fn replace_duplicate<R: Record + Validate>(
        &self,
        record: &R,
        duplicate: Uuid,
    ) -> RosterResult<()> {
        record.validate()?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE local_id = ?", R::KIND.table_name()),
            params![duplicate.as_bytes().to_vec()],
        )?;
        write_row(&tx, record)?;
        tx.commit()?;

        tracing::info!(
            "Merged duplicate {} {} into {}",
            R::KIND,
            duplicate,
            record.local_id()
        );
        Ok(())
    }

    // ========================================================================
    // Leave requests
    // ========================================================================

    /// First active request of the same employee overlapping the given days.
    pub fn find_overlapping_leave(
        &self,
        employee_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> RosterResult<Option<LeaveRequest>> {
        let filter = RecordFilter {
            owner_id: Some(employee_id),
            start_date: Some(start_date),
            end_date: Some(end_date),
            sync_status: None,
        };
        let candidates: Vec<LeaveRequest> = self.list(&filter)?;
        Ok(candidates
            .into_iter()
            .find(|other| other.is_active() && Some(other.local_id) != exclude))
    }

    /// Create a leave request after checking it does not overlap an
    /// existing pending or approved request of the same employee.
    pub fn create_leave_request(&self, request: &mut LeaveRequest) -> RosterResult<()> {
        request.validate()?;

        if let Some(existing) = self.find_overlapping_leave(
            request.employee_id,
            request.start_date,
            request.end_date,
            Some(request.local_id),
        )? {
            return Err(ValidationError::OverlappingLeave {
                start: existing.start_date,
                end: existing.end_date,
            }
            .into());
        }

        request.total_days = request.calculate_work_days();
        request.sync_mut().mark_pending();
        self.insert(&*request)
    }
}
