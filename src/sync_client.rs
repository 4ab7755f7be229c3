//! Sync client for RosterCore.
//!
//! This module moves records between the local store and the backend:
//! - Push local drafts (pending, or errored below the retry ceiling)
//! - Pull server collections and reconcile them with local records
//! - Resolve conflicts with the configured per-kind strategy
//!
//! The store lock is only taken between network calls, never across one.
//! Every pulled collection is written in a single transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::conflicts::{has_remote_diff, resolve, ConflictPolicy, ResolutionStrategy};
use crate::error::{RosterError, RosterResult, ValidationError};
use crate::models::{
    retry_delay, Employee, EntityKind, LeaveRequest, Project, Record, SyncStatus, Task,
    TaskAssignment, WorkEntry,
};
use crate::remote::{RemoteService, SyncScope};
use crate::store::{RecordBatch, RecordFilter, Store};
use crate::validation::Validate;
use crate::wire::WireModel;

/// Run `$body` with `$T` bound to the record type of `$kind`.
macro_rules! for_kind {
    ($kind:expr, $T:ident => $body:expr) => {
        match $kind {
            EntityKind::Employee => {
                type $T = Employee;
                $body
            }
            EntityKind::Project => {
                type $T = Project;
                $body
            }
            EntityKind::Task => {
                type $T = Task;
                $body
            }
            EntityKind::TaskAssignment => {
                type $T = TaskAssignment;
                $body
            }
            EntityKind::WorkEntry => {
                type $T = WorkEntry;
                $body
            }
            EntityKind::LeaveRequest => {
                type $T = LeaveRequest;
                $body
            }
        }
    };
}

/// Wait after the first failed push of a record, unless configured otherwise
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Result of a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub success: bool,
    /// Nothing was attempted because sync is switched off
    pub skipped: bool,
    /// Server records inserted or applied locally
    pub pulled: usize,
    /// Local records accepted by the server
    pub pushed: usize,
    /// Local records whose push failed
    pub failed: usize,
    pub conflicts: usize,
    /// Synced local records removed because the server no longer has them
    pub pruned: usize,
    /// Server records skipped because they could not be decoded or validated
    pub rejected: usize,
    pub errors: Vec<String>,
}

impl SyncSummary {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            success: true,
            skipped: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: SyncSummary) {
        self.success &= other.success;
        self.pulled += other.pulled;
        self.pushed += other.pushed;
        self.failed += other.failed;
        self.conflicts += other.conflicts;
        self.pruned += other.pruned;
        self.rejected += other.rejected;
        self.errors.extend(other.errors);
    }

    fn reject(&mut self, message: String) {
        tracing::warn!("Rejected server record: {}", message);
        self.rejected += 1;
        self.success = false;
        self.errors.push(message);
    }
}

/// Kinds owned by an employee, whose local rows carry the employee as owner
fn owned_by_employee(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::WorkEntry | EntityKind::LeaveRequest | EntityKind::TaskAssignment
    )
}

/// Whether the local store can select exactly what `scope` fetched.
///
/// Pruning is only safe when it can: otherwise records outside the fetched
/// slice would look deleted.
fn prunable(kind: EntityKind, scope: &SyncScope) -> bool {
    scope.status.is_none() && (scope.employee_id.is_none() || owned_by_employee(kind))
}

/// The local equivalent of a fetch scope
fn scope_filter(kind: EntityKind, scope: &SyncScope) -> RecordFilter {
    RecordFilter {
        owner_id: scope.employee_id.filter(|_| owned_by_employee(kind)),
        start_date: scope.start_date,
        end_date: scope.end_date,
        sync_status: None,
    }
}

/// Take the draft that the server stored as `wire`, matched on the
/// business key the server deduplicates creates on.
fn take_unlinked_match<T: WireModel>(unlinked: &mut Vec<T>, wire: &T::Wire) -> Option<T> {
    let key = T::from_wire(wire).ok()?.dedupe_key()?;
    let index = unlinked
        .iter()
        .position(|draft| draft.dedupe_key().as_deref() == Some(key.as_str()))?;
    Some(unlinked.swap_remove(index))
}

/// Sync client
pub struct SyncClient<R> {
    store: Arc<Mutex<Store>>,
    remote: Arc<R>,
    policy: ConflictPolicy,
    max_retry_count: u32,
    retry_backoff: Duration,
    enabled: AtomicBool,
}

impl<R: RemoteService> SyncClient<R> {
    /// Create a new sync client
    pub fn new(
        store: Arc<Mutex<Store>>,
        remote: Arc<R>,
        policy: ConflictPolicy,
        max_retry_count: u32,
    ) -> Self {
        Self {
            store,
            remote,
            policy,
            max_retry_count,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a sync client with the conflict policy, retry settings and
    /// on/off switch from `config`
    pub fn from_config(store: Arc<Mutex<Store>>, remote: Arc<R>, config: &Config) -> Self {
        let client = Self::new(
            store,
            remote,
            config.conflict_policy(),
            config.max_retry_count(),
        )
        .with_retry_backoff(config.sync_config().retry_backoff());
        client.set_enabled(config.is_sync_enabled());
        client
    }

    /// Set the wait after a record's first failed push; it doubles per failure.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Switch network sync on or off. While off, every operation returns
    /// [`SyncSummary::disabled`] without touching the store or the server.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!("Sync {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    fn lock_store(&self) -> RosterResult<MutexGuard<'_, Store>> {
        self.store.lock().map_err(|_| RosterError::LockPoisoned)
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Push queued drafts of `kind`, then pull its server collection.
    pub async fn sync(&self, kind: EntityKind, scope: &SyncScope) -> RosterResult<SyncSummary> {
        if !self.is_enabled() {
            return Ok(SyncSummary::disabled());
        }
        tracing::info!("Syncing {}", kind);
        let mut summary = self.push(kind).await?;
        summary.merge(self.pull(kind, scope).await?);

        tracing::info!(
            "Synced {}: pushed {}, pulled {}, conflicts {}, failed {}",
            kind,
            summary.pushed,
            summary.pulled,
            summary.conflicts,
            summary.failed
        );
        Ok(summary)
    }

    /// Sync every kind in dependency order.
    ///
    /// A failing kind is recorded in the summary and the rest still run;
    /// an expired login stops the whole run.
    pub async fn sync_all(&self, scope: &SyncScope) -> RosterResult<SyncSummary> {
        if !self.is_enabled() {
            tracing::debug!("Sync disabled, skipping full sync");
            return Ok(SyncSummary::disabled());
        }
        let mut summary = SyncSummary::success();
        for kind in EntityKind::ALL {
            match self.sync(kind, scope).await {
                Ok(result) => summary.merge(result),
                Err(RosterError::Unauthorized) => return Err(RosterError::Unauthorized),
                Err(e) => {
                    tracing::error!("Sync of {} failed: {}", kind, e);
                    summary.merge(SyncSummary::failure(format!("{}: {}", kind, e)));
                }
            }
        }
        Ok(summary)
    }

    /// Fetch the server collection of `kind` and reconcile it locally.
    pub async fn pull(&self, kind: EntityKind, scope: &SyncScope) -> RosterResult<SyncSummary> {
        if !self.is_enabled() {
            return Ok(SyncSummary::disabled());
        }
        let values = self.remote.fetch(kind, scope).await?;
        self.apply_pulled(kind, values, scope)
    }

    /// Fetch several kinds concurrently, then apply them one at a time in
    /// the order given.
    pub async fn pull_many(
        &self,
        kinds: &[EntityKind],
        scope: &SyncScope,
    ) -> RosterResult<SyncSummary> {
        if !self.is_enabled() {
            return Ok(SyncSummary::disabled());
        }
        let fetched = join_all(kinds.iter().map(|kind| self.remote.fetch(*kind, scope))).await;

        let mut summary = SyncSummary::success();
        for (kind, result) in kinds.iter().copied().zip(fetched) {
            let applied = result.and_then(|values| self.apply_pulled(kind, values, scope));
            match applied {
                Ok(result) => summary.merge(result),
                Err(RosterError::Unauthorized) => return Err(RosterError::Unauthorized),
                Err(e) => {
                    tracing::error!("Pull of {} failed: {}", kind, e);
                    summary.merge(SyncSummary::failure(format!("{}: {}", kind, e)));
                }
            }
        }
        Ok(summary)
    }

    /// Push queued drafts of `kind` one by one.
    ///
    /// A failed record is marked `error` and the rest of the queue continues.
    pub async fn push(&self, kind: EntityKind) -> RosterResult<SyncSummary> {
        if !self.is_enabled() {
            return Ok(SyncSummary::disabled());
        }
        for_kind!(kind, T => self.push_kind::<T>().await)
    }

    // ========================================================================
    // Pull
    // ========================================================================

    fn apply_pulled(
        &self,
        kind: EntityKind,
        values: Vec<Value>,
        scope: &SyncScope,
    ) -> RosterResult<SyncSummary> {
        for_kind!(kind, T => self.apply_pulled_kind::<T>(values, scope))
    }

    fn apply_pulled_kind<T: WireModel + Validate>(
        &self,
        values: Vec<Value>,
        scope: &SyncScope,
    ) -> RosterResult<SyncSummary> {
        let mut summary = SyncSummary::success();

        // Decode, keeping the last copy when the server repeats an id
        let mut wires: Vec<(i64, T::Wire)> = Vec::new();
        let mut positions: HashMap<i64, usize> = HashMap::new();
        let mut undecodable = 0;
        for value in values {
            let wire = match T::decode(value) {
                Ok(wire) => wire,
                Err(e) => {
                    undecodable += 1;
                    summary.reject(e.to_string());
                    continue;
                }
            };
            let Some(server_id) = T::wire_server_id(&wire) else {
                undecodable += 1;
                summary.reject(format!("{}: record without id", T::KIND));
                continue;
            };
            match positions.get(&server_id) {
                Some(&index) => wires[index].1 = wire,
                None => {
                    positions.insert(server_id, wires.len());
                    wires.push((server_id, wire));
                }
            }
        }

        let store = self.lock_store()?;
        let mut batch: RecordBatch<T> = RecordBatch::default();
        // Drafts whose push may have reached the server without us hearing back
        let mut unlinked: Vec<T> = store
            .list_unlinked::<T>()?
            .into_iter()
            .filter(|draft| draft.dedupe_key().is_some())
            .collect();

        for (server_id, wire) in &wires {
            let local = match store.find_by_server_id::<T>(*server_id)? {
                Some(local) => Some(local),
                None => take_unlinked_match(&mut unlinked, wire).map(|mut draft| {
                    tracing::info!(
                        "Linking {} draft {} to server record {}",
                        T::KIND,
                        draft.local_id(),
                        server_id
                    );
                    draft.set_server_id(*server_id);
                    draft
                }),
            };
            let reconciled = match local {
                None => T::from_wire(wire).map(Some),
                Some(local) => self.reconcile(local, wire, &mut summary),
            };

            let record = match reconciled.and_then(|r| match r {
                Some(record) => record.validate().map(|_| Some(record)),
                None => Ok(None),
            }) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    summary.reject(format!("{} {}: {}", T::KIND, server_id, e));
                    continue;
                }
            };

            if record.sync().status == SyncStatus::Synced {
                summary.pulled += 1;
            }
            batch.upserts.push(record);
        }

        if scope.prune_missing {
            if !prunable(T::KIND, scope) {
                tracing::warn!("Scope cannot be matched locally, not pruning {}", T::KIND);
            } else if undecodable > 0 {
                tracing::warn!("Skipping prune of {}: unreadable server records", T::KIND);
            } else {
                let filter = scope_filter(T::KIND, scope);
                for local in store.list::<T>(&filter)? {
                    let missing = local
                        .server_id()
                        .is_some_and(|id| !positions.contains_key(&id));
                    if local.sync().status == SyncStatus::Synced && missing {
                        batch.deletions.push(local.local_id());
                    }
                }
                summary.pruned = batch.deletions.len();
            }
        }

        store.apply_batch(&batch)?;

        tracing::debug!(
            "Pulled {} {}: {} applied, {} conflicts, {} pruned",
            wires.len(),
            T::KIND,
            summary.pulled,
            summary.conflicts,
            summary.pruned
        );
        Ok(summary)
    }

    /// Reconcile a server record with its local copy.
    ///
    /// Returns the record to store, or None when nothing changes.
    fn reconcile<T: WireModel>(
        &self,
        mut local: T,
        remote: &T::Wire,
        summary: &mut SyncSummary,
    ) -> Result<Option<T>, ValidationError> {
        let changed = has_remote_diff(&local, remote);

        if local.sync().status == SyncStatus::Synced {
            if !changed {
                return Ok(None);
            }
            return resolve(&local, remote, ResolutionStrategy::ServerWins).map(|r| Some(r.record));
        }

        if !changed {
            // The server already holds the local edit
            local.sync_mut().mark_synced(T::wire_updated_at(remote));
            return Ok(Some(local));
        }

        summary.conflicts += 1;
        local.sync_mut().mark_conflict();
        let strategy = self.policy.strategy_for(T::KIND);
        tracing::info!(
            "Conflict on {} {}, resolving with {}",
            T::KIND,
            local.local_id(),
            strategy.as_str()
        );

        match resolve(&local, remote, strategy) {
            Ok(resolution) => Ok(Some(resolution.record)),
            Err(e) => {
                // Left in conflict for the user to sort out
                local.sync_mut().sync_error = Some(e.to_string());
                Ok(Some(local))
            }
        }
    }

    // ========================================================================
    // Push
    // ========================================================================

    async fn push_kind<T: WireModel + Validate>(&self) -> RosterResult<SyncSummary> {
        let queue: Vec<T> = {
            let store = self.lock_store()?;
            store.pending_for_push(self.max_retry_count, Utc::now())?
        };

        let mut summary = SyncSummary::success();
        if queue.is_empty() {
            return Ok(summary);
        }
        tracing::info!("Pushing {} {} records", queue.len(), T::KIND);

        for record in queue {
            let payload = record.encode()?;
            let result = match self.remote.push(T::KIND, payload).await {
                Ok(response) => self.record_pushed(&record, response),
                Err(RosterError::Unauthorized) => return Err(RosterError::Unauthorized),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => summary.pushed += 1,
                Err(e) => {
                    tracing::warn!("Push of {} {} failed: {}", T::KIND, record.local_id(), e);
                    self.record_push_failure(&record, &e)?;
                    summary.failed += 1;
                    summary.success = false;
                    summary
                        .errors
                        .push(format!("{} {}: {}", T::KIND, record.local_id(), e));
                }
            }
        }

        Ok(summary)
    }

    /// Store the server's copy of a pushed record.
    ///
    /// If a pull already stored that server record as a separate row, the
    /// draft takes its place.
    fn record_pushed<T: WireModel + Validate>(
        &self,
        sent: &T,
        response: Value,
    ) -> RosterResult<()> {
        let wire = T::decode(response)?;
        let server_id = T::wire_server_id(&wire).ok_or_else(|| {
            RosterError::decoding(format!("{}: push response without id", T::KIND))
        })?;

        let store = self.lock_store()?;
        let Some(mut current) = store.get::<T>(sent.local_id())? else {
            // Deleted locally while the push was in flight
            return Ok(());
        };

        let duplicate = store
            .find_by_server_id::<T>(server_id)?
            .map(|other| other.local_id())
            .filter(|id| *id != current.local_id());

        current.set_server_id(server_id);
        if current.sync().last_modified == sent.sync().last_modified {
            current.apply_wire(&wire)?;
            current.sync_mut().mark_synced(T::wire_updated_at(&wire));
        } else {
            // Edited while in flight; the newer edit stays queued
            current.sync_mut().requeue();
        }

        match duplicate {
            Some(duplicate) => store.replace_duplicate(&current, duplicate)?,
            None => {
                store.update(&current)?;
            }
        }
        Ok(())
    }

    /// Mark a failed push on the record and hold it back for the backoff
    /// delay. Errors a retry cannot fix exhaust the retry budget at once.
    fn record_push_failure<T: Record + Validate>(
        &self,
        sent: &T,
        error: &RosterError,
    ) -> RosterResult<()> {
        let store = self.lock_store()?;
        let Some(mut current) = store.get::<T>(sent.local_id())? else {
            return Ok(());
        };

        let sync = current.sync_mut();
        sync.mark_error(error.to_string());
        if error.is_retryable() {
            let delay = retry_delay(self.retry_backoff, sync.retry_count);
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            sync.schedule_retry(Utc::now() + delay);
        } else {
            sync.retry_count = sync.retry_count.max(self.max_retry_count);
        }
        store.update(&current)?;
        Ok(())
    }
}
