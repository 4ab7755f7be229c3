//! RosterCore - offline-first data core for a crane-rental workforce app.
//!
//! This library provides the core functionality for the roster client:
//! - Data models (Employee, Project, Task, TaskAssignment, WorkEntry, LeaveRequest)
//! - Local record store (SQLite) with per-record sync metadata
//! - Mapping to and from the backend's JSON wire format
//! - Sync client (push drafts, pull collections, resolve conflicts)
//! - Reload coordination for screens (debounce, loading ceiling, alerts)
//! - Configuration management
//!
//! The library never installs a tracing subscriber; the host application
//! decides where logs go.
//!
//! # Feature Flags
//!
//! - `desktop`: Default the config directory to the platform config dir.

pub mod config;
pub mod conflicts;
pub mod error;
pub mod models;
pub mod reload;
pub mod remote;
pub mod store;
pub mod sync_client;
pub mod validation;
pub mod wire;

// Re-export commonly used types
pub use config::Config;
pub use conflicts::{ConflictPolicy, ResolutionStrategy};
pub use error::{RosterError, RosterResult, ValidationError};
pub use models::{
    Employee, EntityKind, LeaveRequest, Project, Record, SyncMetadata, SyncStatus, Task,
    TaskAssignment, WorkEntry,
};
pub use reload::{Alert, ReloadTrigger, Reloader};
pub use remote::{HttpRemote, RemoteService, SyncScope, TokenSource};
pub use store::Store;
pub use sync_client::{SyncClient, SyncSummary};
