//! Conflict resolution for RosterCore sync.
//!
//! A conflict exists when a pulled server record differs from a local record
//! that still has unpushed changes. Resolution is whole-record: one side wins
//! every field. The winning side is picked per entity kind by a
//! [`ConflictPolicy`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::EntityKind;
use crate::wire::WireModel;

/// How to settle a conflict between a local draft and a server record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The server record overwrites local fields
    #[default]
    ServerWins,
    /// Local fields are kept and pushed again
    LocalWins,
    /// The newer side wins, compared by modification time
    Merge,
}

impl ResolutionStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "server_wins" | "server" | "remote" => Some(ResolutionStrategy::ServerWins),
            "local_wins" | "local" | "client_wins" | "client" => {
                Some(ResolutionStrategy::LocalWins)
            }
            "merge" | "latest_wins" | "latest" => Some(ResolutionStrategy::Merge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::ServerWins => "server_wins",
            ResolutionStrategy::LocalWins => "local_wins",
            ResolutionStrategy::Merge => "merge",
        }
    }
}

/// Which side a resolution kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Server,
    Local,
}

/// The record to persist after resolving a conflict
#[derive(Debug, Clone)]
pub struct Resolution<R> {
    pub record: R,
    pub winner: Winner,
    pub strategy: ResolutionStrategy,
}

/// Pick the winner for `Merge`.
///
/// The server wins only when both timestamps are known and the server's is
/// not older. This departs from a plain "strictly newer wins" rule at one
/// point: an exact tie goes to the server, so a record whose local
/// timestamp was copied from the server is never pushed back unchanged.
fn merge_winner(local: Option<DateTime<Utc>>, remote: Option<DateTime<Utc>>) -> Winner {
    match (local, remote) {
        (Some(local), Some(remote)) if remote >= local => Winner::Server,
        _ => Winner::Local,
    }
}

/// Resolve a local record against the server's version of it.
///
/// Server wins: remote fields overwrite local ones, status `synced`,
/// `last_modified` taken from the server. Local wins: local fields are kept
/// and the record is queued for push again.
pub fn resolve<R: WireModel>(
    local: &R,
    remote: &R::Wire,
    strategy: ResolutionStrategy,
) -> Result<Resolution<R>, ValidationError> {
    let winner = match strategy {
        ResolutionStrategy::ServerWins => Winner::Server,
        ResolutionStrategy::LocalWins => Winner::Local,
        ResolutionStrategy::Merge => {
            merge_winner(local.sync().last_modified, R::wire_updated_at(remote))
        }
    };

    let mut record = local.clone();
    match winner {
        Winner::Server => {
            record.apply_wire(remote)?;
            record.sync_mut().mark_synced(R::wire_updated_at(remote));
        }
        Winner::Local => {
            if record.server_id().is_none() {
                if let Some(server_id) = R::wire_server_id(remote) {
                    record.set_server_id(server_id);
                }
            }
            record.sync_mut().requeue();
        }
    }

    tracing::debug!(
        "Resolved {} conflict with {}: {:?} wins",
        R::KIND,
        strategy.as_str(),
        winner
    );

    Ok(Resolution {
        record,
        winner,
        strategy,
    })
}

/// Whether applying `remote` would change any wire-visible field of `local`.
///
/// `updated_at` is ignored, and fields absent from `remote` count as unchanged.
/// A remote record that cannot be applied counts as a difference.
pub fn has_remote_diff<R: WireModel>(local: &R, remote: &R::Wire) -> bool {
    let mut projected = local.clone();
    if projected.apply_wire(remote).is_err() {
        return true;
    }
    projected.to_wire() != local.to_wire()
}

/// Strategy per entity kind, with a default for kinds without an override
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    pub default: ResolutionStrategy,
    #[serde(default)]
    pub overrides: HashMap<EntityKind, ResolutionStrategy>,
}

impl ConflictPolicy {
    pub fn new(default: ResolutionStrategy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: EntityKind, strategy: ResolutionStrategy) -> Self {
        self.overrides.insert(kind, strategy);
        self
    }

    pub fn strategy_for(&self, kind: EntityKind) -> ResolutionStrategy {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Employee, EmployeeRole, Record, SyncStatus, WorkEntry};
    use crate::wire::{EmployeeWire, WorkEntryWire};
    use chrono::{Duration, NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, hour, 0, 0).unwrap()
    }

    fn local_entry(modified: Option<DateTime<Utc>>) -> WorkEntry {
        let mut entry = WorkEntry::new(4, Some(9), NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        entry.server_id = Some(77);
        entry.total_hours = dec!(7.5);
        entry.sync.last_modified = modified;
        entry
    }

    fn remote_entry(updated_at: Option<DateTime<Utc>>) -> WorkEntryWire {
        WorkEntryWire {
            id: Some(77),
            total_hours: Some(dec!(8)),
            notes: Some(Some("Approved by site manager".into())),
            updated_at,
            ..Default::default()
        }
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(
            ResolutionStrategy::from_str("client_wins"),
            Some(ResolutionStrategy::LocalWins)
        );
        assert_eq!(ResolutionStrategy::from_str("LATEST"), Some(ResolutionStrategy::Merge));
        assert_eq!(ResolutionStrategy::from_str("coin_flip"), None);
        assert_eq!(ResolutionStrategy::default().as_str(), "server_wins");
    }

    #[test]
    fn test_server_wins_overwrites_and_syncs() {
        let local = local_entry(Some(ts(9)));
        let resolution =
            resolve(&local, &remote_entry(Some(ts(8))), ResolutionStrategy::ServerWins).unwrap();

        assert_eq!(resolution.winner, Winner::Server);
        assert_eq!(resolution.record.total_hours, dec!(8));
        assert_eq!(resolution.record.sync.status, SyncStatus::Synced);
        assert_eq!(resolution.record.sync.last_modified, Some(ts(8)));
        assert_eq!(resolution.record.local_id, local.local_id);
    }

    #[test]
    fn test_server_wins_without_timestamp_uses_now() {
        let local = local_entry(None);
        let before = Utc::now();
        let resolution =
            resolve(&local, &remote_entry(None), ResolutionStrategy::ServerWins).unwrap();

        let stamped = resolution.record.sync.last_modified.unwrap();
        assert!(stamped >= before);
    }

    #[test]
    fn test_local_wins_keeps_fields_and_requeues() {
        let mut local = local_entry(Some(ts(9)));
        local.sync.mark_conflict();
        let resolution =
            resolve(&local, &remote_entry(Some(ts(10))), ResolutionStrategy::LocalWins).unwrap();

        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.record.total_hours, dec!(7.5));
        assert_eq!(resolution.record.sync.status, SyncStatus::Pending);
    }

    #[test]
    fn test_merge_newer_remote_wins() {
        let local = local_entry(Some(ts(9)));
        let resolution =
            resolve(&local, &remote_entry(Some(ts(10))), ResolutionStrategy::Merge).unwrap();
        assert_eq!(resolution.winner, Winner::Server);
    }

    #[test]
    fn test_merge_older_remote_loses() {
        let local = local_entry(Some(ts(9)));
        let resolution =
            resolve(&local, &remote_entry(Some(ts(8))), ResolutionStrategy::Merge).unwrap();
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.record.total_hours, dec!(7.5));
    }

    #[test]
    fn test_merge_tie_goes_to_server() {
        let local = local_entry(Some(ts(9)));
        let resolution =
            resolve(&local, &remote_entry(Some(ts(9))), ResolutionStrategy::Merge).unwrap();
        assert_eq!(resolution.winner, Winner::Server);
    }

    #[test]
    fn test_merge_without_remote_timestamp_keeps_local() {
        let local = local_entry(Some(ts(9)));
        let resolution =
            resolve(&local, &remote_entry(None), ResolutionStrategy::Merge).unwrap();
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.record.sync.status, SyncStatus::Pending);
    }

    #[test]
    fn test_merge_without_local_timestamp_keeps_local() {
        let local = local_entry(None);
        let resolution =
            resolve(&local, &remote_entry(Some(ts(9))), ResolutionStrategy::Merge).unwrap();
        assert_eq!(resolution.winner, Winner::Local);
    }

    #[test]
    fn test_local_wins_adopts_server_id_for_draft() {
        let mut local = local_entry(Some(ts(9)));
        local.server_id = None;
        let resolution =
            resolve(&local, &remote_entry(Some(ts(8))), ResolutionStrategy::LocalWins).unwrap();
        assert_eq!(resolution.record.server_id(), Some(77));
    }

    #[test]
    fn test_invalid_remote_enum_fails_resolution() {
        let local = Employee::new("Ole", "ole@ksr.dk", EmployeeRole::Worker);
        let remote = EmployeeWire {
            role: Some("pilot".into()),
            ..Default::default()
        };
        assert!(resolve(&local, &remote, ResolutionStrategy::ServerWins).is_err());
        assert!(has_remote_diff(&local, &remote));
    }

    #[test]
    fn test_has_remote_diff_ignores_updated_at_and_absent_fields() {
        let local = local_entry(Some(ts(9)));

        let mut same = local.to_wire();
        same.updated_at = Some(ts(9) + Duration::hours(3));
        same.notes = None;
        assert!(!has_remote_diff(&local, &same));

        assert!(has_remote_diff(&local, &remote_entry(Some(ts(9)))));
    }

    #[test]
    fn test_policy_overrides() {
        let policy = ConflictPolicy::default()
            .with_override(EntityKind::WorkEntry, ResolutionStrategy::LocalWins)
            .with_override(EntityKind::LeaveRequest, ResolutionStrategy::Merge);

        assert_eq!(policy.strategy_for(EntityKind::WorkEntry), ResolutionStrategy::LocalWins);
        assert_eq!(policy.strategy_for(EntityKind::LeaveRequest), ResolutionStrategy::Merge);
        assert_eq!(policy.strategy_for(EntityKind::Project), ResolutionStrategy::ServerWins);
    }
}
