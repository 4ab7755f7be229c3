//! Data models for RosterCore.
//!
//! This module defines the cached entities (Employee, Project, Task,
//! TaskAssignment, WorkEntry, LeaveRequest) and the sync metadata carried by
//! every one of them.
//!
//! Every record has a device-generated `local_id` (UUID7) and an optional
//! `server_id` assigned by the backend once the record has been pushed or
//! pulled. References between records are server ids and never own the
//! referenced record, except where noted on the field.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hours per day paid at the regular rate before overtime starts.
pub const REGULAR_HOURS_LIMIT: i64 = 8;

/// Declares a closed status/type enum with its wire spelling.
///
/// Local serde uses snake_case; the wire spelling is whatever the backend
/// stores and is only used by the mapper.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            /// Spelling used by the remote service
            pub fn as_wire(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire ),+
                }
            }

            /// Parse the remote spelling (None if unknown)
            pub fn from_wire(s: &str) -> Option<Self> {
                match s {
                    $( $wire => Some($name::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

// ============================================================================
// Entity kinds and sync metadata
// ============================================================================

/// The cached entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Employee,
    Project,
    Task,
    TaskAssignment,
    WorkEntry,
    LeaveRequest,
}

impl EntityKind {
    /// All kinds in dependency order: referenced records come first.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Employee,
        EntityKind::Project,
        EntityKind::Task,
        EntityKind::TaskAssignment,
        EntityKind::WorkEntry,
        EntityKind::LeaveRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Employee => "employee",
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::TaskAssignment => "task_assignment",
            EntityKind::WorkEntry => "work_entry",
            EntityKind::LeaveRequest => "leave_request",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        EntityKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Table holding records of this kind in the local store
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Employee => "employees",
            EntityKind::Project => "projects",
            EntityKind::Task => "tasks",
            EntityKind::TaskAssignment => "task_assignments",
            EntityKind::WorkEntry => "work_entries",
            EntityKind::LeaveRequest => "leave_requests",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntityKind::Employee => "Employees",
            EntityKind::Project => "Projects",
            EntityKind::Task => "Tasks",
            EntityKind::TaskAssignment => "Task Assignments",
            EntityKind::WorkEntry => "Work Entries",
            EntityKind::LeaveRequest => "Leave Requests",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a record's local state matches the server's last known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local changes not yet confirmed by the server
    Pending,
    Synced,
    /// Last push failed; see `sync_error`
    Error,
    /// A pending local record collided with a changed server version
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
            SyncStatus::Conflict => "conflict",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            "error" => Some(SyncStatus::Error),
            "conflict" => Some(SyncStatus::Conflict),
            _ => None,
        }
    }

    /// Whether the record holds local work the server has not accepted yet.
    pub fn has_local_changes(&self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }
}

/// Sync bookkeeping attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub status: SyncStatus,
    /// Local edit time for drafts, server `updated_at` for synced records
    pub last_modified: Option<DateTime<Utc>>,
    /// Human-readable reason of the last failed push
    pub sync_error: Option<String>,
    pub retry_count: u32,
    /// Earliest time an errored record may be pushed again
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Wait before the next automatic push after `retry_count` failures.
///
/// `base` after the first failure, doubling with each further one.
pub fn retry_delay(base: std::time::Duration, retry_count: u32) -> std::time::Duration {
    let doublings = retry_count.saturating_sub(1).min(16);
    base.saturating_mul(1 << doublings)
}

impl SyncMetadata {
    /// Metadata for a record created or edited on this device
    pub fn pending() -> Self {
        Self {
            status: SyncStatus::Pending,
            last_modified: Some(Utc::now()),
            sync_error: None,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    /// Metadata for a record hydrated from the server
    pub fn synced(updated_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SyncStatus::Synced,
            last_modified: updated_at,
            sync_error: None,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    /// User saved a local change.
    pub fn mark_pending(&mut self) {
        self.status = SyncStatus::Pending;
        self.last_modified = Some(Utc::now());
        self.next_retry_at = None;
    }

    /// Keep local fields but queue them for the next push.
    pub fn requeue(&mut self) {
        self.status = SyncStatus::Pending;
        self.next_retry_at = None;
    }

    /// The server accepted or supplied this state.
    pub fn mark_synced(&mut self, updated_at: Option<DateTime<Utc>>) {
        self.status = SyncStatus::Synced;
        self.last_modified = updated_at.or_else(|| Some(Utc::now()));
        self.sync_error = None;
        self.retry_count = 0;
        self.next_retry_at = None;
    }

    /// A push failed. Local data is left untouched.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Error;
        self.sync_error = Some(message.into());
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Hold automatic pushes of this record until `at`.
    pub fn schedule_retry(&mut self, at: DateTime<Utc>) {
        self.next_retry_at = Some(at);
    }

    pub fn mark_conflict(&mut self) {
        self.status = SyncStatus::Conflict;
    }

    /// Whether automatic pushes gave up on this record.
    pub fn is_retry_exhausted(&self, max_retries: u32) -> bool {
        self.status == SyncStatus::Error && self.retry_count >= max_retries
    }

    /// Whether a push cycle running at `now` should send this record.
    pub fn needs_push(&self, max_retries: u32, now: DateTime<Utc>) -> bool {
        match self.status {
            SyncStatus::Pending => true,
            SyncStatus::Error => {
                let due = self.next_retry_at.map_or(true, |at| at <= now);
                self.retry_count < max_retries && due
            }
            SyncStatus::Synced | SyncStatus::Conflict => false,
        }
    }

    /// Allow a record that hit the retry ceiling to be pushed again.
    pub fn reset_retry(&mut self) {
        self.retry_count = 0;
        self.next_retry_at = None;
        if self.status == SyncStatus::Error {
            self.status = SyncStatus::Pending;
        }
    }
}

/// Common surface of every cached record.
///
/// The store and the sync client are generic over this trait.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + 'static {
    const KIND: EntityKind;

    fn local_id(&self) -> Uuid;
    fn server_id(&self) -> Option<i64>;
    fn set_server_id(&mut self, server_id: i64);
    fn sync(&self) -> &SyncMetadata;
    fn sync_mut(&mut self) -> &mut SyncMetadata;

    /// Server id of the owning record (employee or project), if any
    fn owner_id(&self) -> Option<i64> {
        None
    }

    /// First day this record covers, used for date-range scoping
    fn record_date(&self) -> Option<NaiveDate> {
        None
    }

    /// Last day this record covers
    fn record_end_date(&self) -> Option<NaiveDate> {
        self.record_date()
    }

    /// Business key the server deduplicates creates on, for kinds that have one
    fn dedupe_key(&self) -> Option<String> {
        None
    }
}

macro_rules! impl_record_ids {
    () => {
        fn local_id(&self) -> Uuid {
            self.local_id
        }

        fn server_id(&self) -> Option<i64> {
            self.server_id
        }

        fn set_server_id(&mut self, server_id: i64) {
            self.server_id = Some(server_id);
        }

        fn sync(&self) -> &SyncMetadata {
            &self.sync
        }

        fn sync_mut(&mut self) -> &mut SyncMetadata {
            &mut self.sync
        }
    };
}

// ============================================================================
// Employee
// ============================================================================

string_enum! {
    /// Employee role. The backend stores the Danish job titles.
    pub enum EmployeeRole {
        Worker => "arbejder",
        Manager => "byggeleder",
        Chief => "chef",
        System => "system",
    }
}

/// Hourly billing rates for an operator. All optional; unset means the
/// project default applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRates {
    pub normal: Option<Decimal>,
    pub overtime1: Option<Decimal>,
    pub overtime2: Option<Decimal>,
    pub weekend: Option<Decimal>,
}

/// A person who can be scheduled, log hours or approve them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub local_id: Uuid,
    pub server_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub role: EmployeeRole,
    pub is_activated: bool,
    pub profile_picture_url: Option<String>,
    pub rates: BillingRates,
    pub created_at: Option<DateTime<Utc>>,
    pub sync: SyncMetadata,
}

impl Employee {
    /// Create a new local employee draft
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: EmployeeRole) -> Self {
        Self {
            local_id: Uuid::now_v7(),
            server_id: None,
            name: name.into(),
            email: email.into(),
            phone_number: None,
            address: None,
            role,
            is_activated: true,
            profile_picture_url: None,
            rates: BillingRates::default(),
            created_at: Some(Utc::now()),
            sync: SyncMetadata::pending(),
        }
    }
}

impl Record for Employee {
    const KIND: EntityKind = EntityKind::Employee;
    impl_record_ids!();
}

// ============================================================================
// Project
// ============================================================================

string_enum! {
    pub enum ProjectStatus {
        Active => "active",
        Completed => "completed",
        OnHold => "on_hold",
        Cancelled => "cancelled",
    }
}

/// A customer engagement that groups tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub local_id: Uuid,
    pub server_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub customer_id: Option<i64>,
    pub customer_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ProjectStatus,
    pub budget: Option<Decimal>,
    /// Weak reference to the supervising Employee (server id)
    pub supervisor_id: Option<i64>,
    pub created_by: Option<i64>,
    pub client_equipment_type: Option<String>,
    pub operator_requirements: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub sync: SyncMetadata,
}

impl Project {
    pub fn new(title: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            local_id: Uuid::now_v7(),
            server_id: None,
            title: title.into(),
            description: None,
            customer_id: None,
            customer_name: customer_name.into(),
            start_date: None,
            end_date: None,
            status: ProjectStatus::Active,
            budget: None,
            supervisor_id: None,
            created_by: None,
            client_equipment_type: None,
            operator_requirements: None,
            created_at: Some(Utc::now()),
            sync: SyncMetadata::pending(),
        }
    }

    /// Past its end date without being completed
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.end_date {
            Some(end) => end < today && self.status != ProjectStatus::Completed,
            None => false,
        }
    }

    /// Days until the end date (negative once passed)
    pub fn days_remaining(&self, today: NaiveDate) -> Option<i64> {
        self.end_date.map(|end| (end - today).num_days())
    }
}

impl Record for Project {
    const KIND: EntityKind = EntityKind::Project;
    impl_record_ids!();

    fn record_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    fn record_end_date(&self) -> Option<NaiveDate> {
        self.end_date.or(self.start_date)
    }
}

// ============================================================================
// Task
// ============================================================================

string_enum! {
    pub enum TaskStatus {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        Overdue => "overdue",
    }
}

string_enum! {
    pub enum TaskPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

/// A unit of crane work within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub local_id: Uuid,
    pub server_id: Option<i64>,
    /// Owning project (server id). Deleting the project deletes the task.
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub deadline: Option<NaiveDate>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub required_operators: i32,
    pub estimated_hours: Option<Decimal>,
    pub client_equipment_info: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub sync: SyncMetadata,
}

impl Task {
    pub fn new(project_id: i64, name: impl Into<String>) -> Self {
        Self {
            local_id: Uuid::now_v7(),
            server_id: None,
            project_id,
            name: name.into(),
            description: None,
            start_date: None,
            deadline: None,
            status: TaskStatus::Planned,
            priority: TaskPriority::Medium,
            required_operators: 1,
            estimated_hours: None,
            client_equipment_info: None,
            created_at: Some(Utc::now()),
            sync: SyncMetadata::pending(),
        }
    }

    /// Advance the status from the calendar.
    ///
    /// A planned task whose start date has arrived is in progress; an
    /// in-progress task past its deadline is overdue. Returns true if the
    /// status changed.
    pub fn update_status(&mut self, today: NaiveDate) -> bool {
        let before = self.status;

        if self.status == TaskStatus::Planned && self.start_date.is_some_and(|d| d <= today) {
            self.status = TaskStatus::InProgress;
        }

        if self.status == TaskStatus::InProgress && self.deadline.is_some_and(|d| d < today) {
            self.status = TaskStatus::Overdue;
        }

        self.status != before
    }

    pub fn can_assign_operator(&self) -> bool {
        matches!(self.status, TaskStatus::Planned | TaskStatus::InProgress)
    }
}

impl Record for Task {
    const KIND: EntityKind = EntityKind::Task;
    impl_record_ids!();

    fn owner_id(&self) -> Option<i64> {
        Some(self.project_id)
    }

    fn record_date(&self) -> Option<NaiveDate> {
        self.start_date.or(self.deadline)
    }

    fn record_end_date(&self) -> Option<NaiveDate> {
        self.deadline.or(self.start_date)
    }
}

// ============================================================================
// TaskAssignment
// ============================================================================

string_enum! {
    pub enum AssignmentStatus {
        Assigned => "assigned",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

/// An operator booked onto a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub local_id: Uuid,
    pub server_id: Option<i64>,
    /// Weak reference to the task (server id)
    pub task_id: i64,
    /// Owning employee (server id)
    pub employee_id: i64,
    pub assigned_at: Option<DateTime<Utc>>,
    pub crane_model_id: Option<i64>,
    pub status: AssignmentStatus,
    pub sync: SyncMetadata,
}

impl TaskAssignment {
    pub fn new(task_id: i64, employee_id: i64) -> Self {
        Self {
            local_id: Uuid::now_v7(),
            server_id: None,
            task_id,
            employee_id,
            assigned_at: Some(Utc::now()),
            crane_model_id: None,
            status: AssignmentStatus::Assigned,
            sync: SyncMetadata::pending(),
        }
    }
}

impl Record for TaskAssignment {
    const KIND: EntityKind = EntityKind::TaskAssignment;
    impl_record_ids!();

    fn owner_id(&self) -> Option<i64> {
        Some(self.employee_id)
    }

    fn record_date(&self) -> Option<NaiveDate> {
        self.assigned_at.map(|t| t.date_naive())
    }
}

// ============================================================================
// WorkEntry
// ============================================================================

string_enum! {
    /// Approval state of a timesheet line
    pub enum EntryStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        NeedsModification => "needs_modification",
    }
}

/// Hours an operator logged on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub local_id: Uuid,
    pub server_id: Option<i64>,
    /// Owning employee (server id)
    pub employee_id: i64,
    /// Weak reference for display (server id)
    pub project_id: Option<i64>,
    /// Weak reference for display (server id)
    pub task_id: Option<i64>,
    pub work_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Break length in hours
    pub break_duration: Decimal,
    pub total_hours: Decimal,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    pub notes: Option<String>,
    pub status: EntryStatus,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub sync: SyncMetadata,
}

impl WorkEntry {
    pub fn new(employee_id: i64, task_id: Option<i64>, work_date: NaiveDate) -> Self {
        Self {
            local_id: Uuid::now_v7(),
            server_id: None,
            employee_id,
            project_id: None,
            task_id,
            work_date,
            start_time: None,
            end_time: None,
            break_duration: Decimal::ZERO,
            total_hours: Decimal::ZERO,
            regular_hours: Decimal::ZERO,
            overtime_hours: Decimal::ZERO,
            notes: None,
            status: EntryStatus::Pending,
            approved_by: None,
            approved_at: None,
            submitted_at: None,
            rejection_reason: None,
            created_at: Some(Utc::now()),
            sync: SyncMetadata::pending(),
        }
    }

    /// Recompute total, regular and overtime hours from the clock times.
    ///
    /// Does nothing unless both start and end are set. Hours are rounded to
    /// two decimal places.
    pub fn calculate_total_hours(&mut self) {
        let (Some(start), Some(end)) = (self.start_time, self.end_time) else {
            return;
        };

        let worked = Decimal::from((end - start).num_seconds()) / Decimal::from(3600);
        let total = (worked - self.break_duration).max(Decimal::ZERO).round_dp(2);
        let limit = Decimal::from(REGULAR_HOURS_LIMIT);

        self.total_hours = total;
        self.regular_hours = total.min(limit);
        self.overtime_hours = total - self.regular_hours;
    }

    /// Key the server deduplicates pushes on
    pub fn natural_key(&self) -> (i64, Option<i64>, NaiveDate) {
        (self.employee_id, self.task_id, self.work_date)
    }

    pub fn is_approved(&self) -> bool {
        self.status == EntryStatus::Approved
    }
}

impl Record for WorkEntry {
    const KIND: EntityKind = EntityKind::WorkEntry;
    impl_record_ids!();

    fn owner_id(&self) -> Option<i64> {
        Some(self.employee_id)
    }

    fn record_date(&self) -> Option<NaiveDate> {
        Some(self.work_date)
    }

    fn dedupe_key(&self) -> Option<String> {
        let (employee_id, task_id, work_date) = self.natural_key();
        let task = task_id.map_or_else(|| "-".to_string(), |id| id.to_string());
        Some(format!("{}/{}/{}", employee_id, task, work_date.format("%Y-%m-%d")))
    }
}

// ============================================================================
// LeaveRequest
// ============================================================================

string_enum! {
    pub enum LeaveType {
        Vacation => "VACATION",
        Sick => "SICK",
        Personal => "PERSONAL",
        Parental => "PARENTAL",
        Compensatory => "COMPENSATORY",
        Emergency => "EMERGENCY",
    }
}

string_enum! {
    pub enum LeaveStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Cancelled => "CANCELLED",
        Expired => "EXPIRED",
    }
}

/// A request for time off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub local_id: Uuid,
    pub server_id: Option<i64>,
    /// Owning employee (server id)
    pub employee_id: i64,
    pub leave_type: LeaveType,
    pub status: LeaveStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub half_day: bool,
    pub total_days: i32,
    pub reason: Option<String>,
    pub sick_note_url: Option<String>,
    /// Weak reference to the approving employee (server id)
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub emergency_leave: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub sync: SyncMetadata,
}

impl LeaveRequest {
    /// Create a pending request. `total_days` is computed from the range.
    pub fn new(
        employee_id: i64,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        let mut request = Self {
            local_id: Uuid::now_v7(),
            server_id: None,
            employee_id,
            leave_type,
            status: LeaveStatus::Pending,
            start_date,
            end_date,
            half_day: false,
            total_days: 0,
            reason: None,
            sick_note_url: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            emergency_leave: false,
            created_at: Some(Utc::now()),
            sync: SyncMetadata::pending(),
        };
        request.total_days = request.calculate_work_days();
        request
    }

    /// Count Monday-Friday days in the range. A half-day request counts half,
    /// but never less than one day when any weekday is covered.
    pub fn calculate_work_days(&self) -> i32 {
        if self.start_date > self.end_date {
            return 0;
        }

        let work_days = self
            .start_date
            .iter_days()
            .take_while(|d| *d <= self.end_date)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .count() as i32;

        if self.half_day && work_days > 0 {
            (work_days / 2).max(1)
        } else {
            work_days
        }
    }

    pub fn can_edit(&self) -> bool {
        self.status == LeaveStatus::Pending
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self.status, LeaveStatus::Pending | LeaveStatus::Approved)
    }

    /// Whether the request still blocks other requests for the same days
    pub fn is_active(&self) -> bool {
        matches!(self.status, LeaveStatus::Pending | LeaveStatus::Approved)
    }

    /// Inclusive date-range overlap with another request
    pub fn overlaps(&self, other: &LeaveRequest) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }

    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.start_date > today
    }

    pub fn is_ongoing(&self, today: NaiveDate) -> bool {
        self.start_date <= today && today <= self.end_date
    }
}

impl Record for LeaveRequest {
    const KIND: EntityKind = EntityKind::LeaveRequest;
    impl_record_ids!();

    fn owner_id(&self) -> Option<i64> {
        Some(self.employee_id)
    }

    fn record_date(&self) -> Option<NaiveDate> {
        Some(self.start_date)
    }

    fn record_end_date(&self) -> Option<NaiveDate> {
        Some(self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_entity_kind_roundtrip_names() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::WorkEntry.table_name(), "work_entries");
    }

    #[test]
    fn test_role_wire_spelling() {
        assert_eq!(EmployeeRole::Worker.as_wire(), "arbejder");
        assert_eq!(EmployeeRole::from_wire("byggeleder"), Some(EmployeeRole::Manager));
        assert_eq!(EmployeeRole::from_wire("worker"), None);
        assert_eq!(LeaveType::from_wire("SICK"), Some(LeaveType::Sick));
    }

    #[test]
    fn test_new_records_are_pending_drafts() {
        let employee = Employee::new("Ole", "ole@ksr.dk", EmployeeRole::Worker);
        assert!(!employee.local_id.is_nil());
        assert!(employee.server_id.is_none());
        assert_eq!(employee.sync.status, SyncStatus::Pending);
        assert!(employee.sync.last_modified.is_some());
    }

    #[test]
    fn test_sync_metadata_error_then_retry_success() {
        let mut meta = SyncMetadata::pending();
        meta.mark_error("timeout");
        meta.mark_error("timeout");
        assert_eq!(meta.status, SyncStatus::Error);
        assert_eq!(meta.retry_count, 2);
        assert_eq!(meta.sync_error.as_deref(), Some("timeout"));

        meta.mark_synced(None);
        assert_eq!(meta.status, SyncStatus::Synced);
        assert_eq!(meta.retry_count, 0);
        assert!(meta.sync_error.is_none());
    }

    #[test]
    fn test_sync_metadata_retry_ceiling() {
        let mut meta = SyncMetadata::pending();
        for _ in 0..3 {
            meta.mark_error("server unavailable");
        }
        let now = Utc::now();
        assert!(meta.is_retry_exhausted(3));
        assert!(!meta.needs_push(3, now));
        assert!(meta.needs_push(4, now));

        meta.reset_retry();
        assert_eq!(meta.status, SyncStatus::Pending);
        assert!(meta.needs_push(3, now));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let base = std::time::Duration::from_secs(2);
        let delays: Vec<u64> = (1..=5).map(|n| retry_delay(base, n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
        assert_eq!(retry_delay(std::time::Duration::ZERO, 4), std::time::Duration::ZERO);
    }

    #[test]
    fn test_scheduled_retry_waits_until_due() {
        let failed_at = Utc::now();
        let mut meta = SyncMetadata::pending();
        meta.mark_error("timeout");
        meta.schedule_retry(failed_at + Duration::seconds(2));

        assert!(!meta.needs_push(5, failed_at));
        assert!(!meta.needs_push(5, failed_at + Duration::seconds(1)));
        assert!(meta.needs_push(5, failed_at + Duration::seconds(2)));

        meta.mark_synced(None);
        assert!(meta.next_retry_at.is_none());
    }

    #[test]
    fn test_task_update_status_started_yesterday() {
        let today = date(2025, 6, 10);
        let mut task = Task::new(1, "Lift steel beams");
        task.start_date = Some(today - Duration::days(1));

        assert!(task.update_status(today));
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_task_update_status_becomes_overdue() {
        let today = date(2025, 6, 10);
        let mut task = Task::new(1, "Tower crane assembly");
        task.status = TaskStatus::InProgress;
        task.deadline = Some(date(2025, 6, 9));

        assert!(task.update_status(today));
        assert_eq!(task.status, TaskStatus::Overdue);
    }

    #[test]
    fn test_task_update_status_future_start_unchanged() {
        let today = date(2025, 6, 10);
        let mut task = Task::new(1, "Mobile crane lift");
        task.start_date = Some(date(2025, 6, 11));

        assert!(!task.update_status(today));
        assert_eq!(task.status, TaskStatus::Planned);
        assert!(task.can_assign_operator());
    }

    #[test]
    fn test_work_entry_calculates_overtime() {
        let mut entry = WorkEntry::new(7, Some(3), date(2025, 6, 10));
        entry.start_time = Some(Utc.with_ymd_and_hms(2025, 6, 10, 6, 0, 0).unwrap());
        entry.end_time = Some(Utc.with_ymd_and_hms(2025, 6, 10, 17, 0, 0).unwrap());
        entry.break_duration = dec!(0.5);

        entry.calculate_total_hours();

        assert_eq!(entry.total_hours, dec!(10.5));
        assert_eq!(entry.regular_hours, dec!(8));
        assert_eq!(entry.overtime_hours, dec!(2.5));
    }

    #[test]
    fn test_work_entry_break_longer_than_shift_clamps_to_zero() {
        let mut entry = WorkEntry::new(7, None, date(2025, 6, 10));
        entry.start_time = Some(Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap());
        entry.end_time = Some(Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap());
        entry.break_duration = dec!(2);

        entry.calculate_total_hours();

        assert_eq!(entry.total_hours, Decimal::ZERO);
        assert_eq!(entry.overtime_hours, Decimal::ZERO);
    }

    #[test]
    fn test_leave_work_days_skip_weekends() {
        // Monday 2025-06-02 to Sunday 2025-06-08
        let leave = LeaveRequest::new(1, LeaveType::Vacation, date(2025, 6, 2), date(2025, 6, 8));
        assert_eq!(leave.total_days, 5);

        let mut half = leave.clone();
        half.half_day = true;
        half.end_date = date(2025, 6, 2);
        assert_eq!(half.calculate_work_days(), 1);
    }

    #[test]
    fn test_leave_overlap_is_inclusive() {
        let a = LeaveRequest::new(1, LeaveType::Vacation, date(2025, 6, 2), date(2025, 6, 6));
        let b = LeaveRequest::new(1, LeaveType::Personal, date(2025, 6, 6), date(2025, 6, 9));
        let c = LeaveRequest::new(1, LeaveType::Personal, date(2025, 6, 7), date(2025, 6, 9));

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_leave_permissions_follow_status() {
        let mut leave = LeaveRequest::new(1, LeaveType::Sick, date(2025, 6, 2), date(2025, 6, 3));
        assert!(leave.can_edit());
        leave.status = LeaveStatus::Approved;
        assert!(!leave.can_edit());
        assert!(leave.can_cancel());
        leave.status = LeaveStatus::Rejected;
        assert!(!leave.can_cancel());
        assert!(!leave.is_active());
    }

    #[test]
    fn test_project_overdue() {
        let mut project = Project::new("Harbour extension", "Aarhus Havn");
        project.end_date = Some(date(2025, 5, 31));
        assert!(project.is_overdue(date(2025, 6, 1)));
        assert_eq!(project.days_remaining(date(2025, 5, 29)), Some(2));

        project.status = ProjectStatus::Completed;
        assert!(!project.is_overdue(date(2025, 6, 1)));
    }
}
