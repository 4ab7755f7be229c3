//! Mapping between local records and the server's JSON representation.
//!
//! Each entity has a `*Wire` struct mirroring the backend payload. Every
//! field is optional so the same struct decodes both full records and
//! partial updates; when applying a wire record to an existing local one,
//! absent fields keep their local value. Fields that are optional locally
//! are [`Nullable`]: an explicit `null` from the server clears them.
//!
//! Enum-typed fields travel as strings and are parsed here, so an unknown
//! value is a validation failure naming the field, not a decoding failure.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{RosterError, RosterResult, ValidationError};
use crate::models::{
    AssignmentStatus, BillingRates, Employee, EmployeeRole, EntryStatus, LeaveRequest,
    LeaveStatus, LeaveType, Project, ProjectStatus, Record, SyncMetadata, Task, TaskAssignment,
    TaskPriority, TaskStatus, WorkEntry,
};

/// Conversion between a local record and its wire form.
pub trait WireModel: Record + Sized {
    type Wire: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static;

    /// Project the local record onto the wire shape.
    fn to_wire(&self) -> Self::Wire;

    /// Build a new local record (status `synced`) from a wire record.
    fn from_wire(wire: &Self::Wire) -> Result<Self, ValidationError>;

    /// Overwrite local fields with the fields present on `wire`.
    ///
    /// Sync metadata is left alone; the caller decides the resulting status.
    fn apply_wire(&mut self, wire: &Self::Wire) -> Result<(), ValidationError>;

    fn wire_server_id(wire: &Self::Wire) -> Option<i64>;

    fn wire_updated_at(wire: &Self::Wire) -> Option<DateTime<Utc>>;

    /// Decode a JSON value into the wire shape.
    fn decode(value: Value) -> RosterResult<Self::Wire> {
        serde_json::from_value(value)
            .map_err(|e| RosterError::decoding(format!("{}: {}", Self::KIND, e)))
    }

    /// Encode this record for a push.
    fn encode(&self) -> RosterResult<Value> {
        Ok(serde_json::to_value(self.to_wire())?)
    }
}

/// A wire field that can be absent (`None`), null (`Some(None)`) or set.
pub type Nullable<T> = Option<Option<T>>;

mod nullable {
    pub use serde_with::rust::double_option::{deserialize, serialize};
}

/// Copy a present wire value into a local field.
///
/// Works for required fields from `Option<T>` and for optional fields from
/// [`Nullable<T>`], where a null clears the local value.
macro_rules! take {
    ($dst:expr, $src:expr) => {
        if let Some(v) = &$src {
            $dst = v.clone();
        }
    };
}

/// Copy a present wire value into an optional local field, never clearing it.
macro_rules! take_opt {
    ($dst:expr, $src:expr) => {
        if let Some(v) = &$src {
            $dst = Some(v.clone());
        }
    };
}

fn parse_enum<T>(
    value: &Option<String>,
    field: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, ValidationError> {
    match value {
        Some(s) => parse(s)
            .map(Some)
            .ok_or_else(|| ValidationError::enum_value(field)),
        None => Ok(None),
    }
}

fn require<T: Clone>(value: &Option<T>, field: &str) -> Result<T, ValidationError> {
    value.clone().ok_or_else(|| ValidationError::missing(field))
}

/// Accept either a plain date or a full timestamp for date-only fields.
fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    parse_date(&raw).map(Some).map_err(serde::de::Error::custom)
}

/// [`de_opt_date`] for [`Nullable`] date fields; only called when the key is present.
fn de_nullable_date<'de, D>(deserializer: D) -> Result<Nullable<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_date(deserializer).map(Some)
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| format!("invalid date: {}", raw))
}

// ============================================================================
// Employee
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeWire {
    #[serde(rename = "employee_id", alias = "id")]
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub phone_number: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub address: Nullable<String>,
    pub role: Option<String>,
    pub is_activated: Option<bool>,
    #[serde(
        default,
        alias = "profilePictureUrl",
        skip_serializing_if = "Option::is_none",
        with = "nullable"
    )]
    pub profile_picture_url: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub operator_normal_rate: Nullable<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub operator_overtime_rate1: Nullable<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub operator_overtime_rate2: Nullable<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub operator_weekend_rate: Nullable<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub created_at: Nullable<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireModel for Employee {
    type Wire = EmployeeWire;

    fn to_wire(&self) -> EmployeeWire {
        EmployeeWire {
            id: self.server_id,
            name: Some(self.name.clone()),
            email: Some(self.email.clone()),
            phone_number: Some(self.phone_number.clone()),
            address: Some(self.address.clone()),
            role: Some(self.role.as_wire().to_string()),
            is_activated: Some(self.is_activated),
            profile_picture_url: Some(self.profile_picture_url.clone()),
            operator_normal_rate: Some(self.rates.normal),
            operator_overtime_rate1: Some(self.rates.overtime1),
            operator_overtime_rate2: Some(self.rates.overtime2),
            operator_weekend_rate: Some(self.rates.weekend),
            created_at: Some(self.created_at),
            updated_at: self.sync.last_modified,
        }
    }

    fn from_wire(wire: &EmployeeWire) -> Result<Self, ValidationError> {
        let mut employee = Employee {
            local_id: Uuid::now_v7(),
            server_id: None,
            name: require(&wire.name, "name")?,
            email: require(&wire.email, "email")?,
            phone_number: None,
            address: None,
            role: EmployeeRole::Worker,
            is_activated: true,
            profile_picture_url: None,
            rates: BillingRates::default(),
            created_at: None,
            sync: SyncMetadata::synced(wire.updated_at),
        };
        employee.apply_wire(wire)?;
        Ok(employee)
    }

    fn apply_wire(&mut self, wire: &EmployeeWire) -> Result<(), ValidationError> {
        let role = parse_enum(&wire.role, "role", EmployeeRole::from_wire)?;

        take_opt!(self.server_id, wire.id);
        take!(self.name, wire.name);
        take!(self.email, wire.email);
        take!(self.phone_number, wire.phone_number);
        take!(self.address, wire.address);
        take!(self.role, role);
        take!(self.is_activated, wire.is_activated);
        take!(self.profile_picture_url, wire.profile_picture_url);
        take!(self.rates.normal, wire.operator_normal_rate);
        take!(self.rates.overtime1, wire.operator_overtime_rate1);
        take!(self.rates.overtime2, wire.operator_overtime_rate2);
        take!(self.rates.weekend, wire.operator_weekend_rate);
        take!(self.created_at, wire.created_at);
        Ok(())
    }

    fn wire_server_id(wire: &EmployeeWire) -> Option<i64> {
        wire.id
    }

    fn wire_updated_at(wire: &EmployeeWire) -> Option<DateTime<Utc>> {
        wire.updated_at
    }
}

// ============================================================================
// Project
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectWire {
    #[serde(rename = "project_id", alias = "id")]
    pub id: Option<i64>,
    #[serde(rename = "name", alias = "title")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub description: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub customer_id: Nullable<i64>,
    pub customer_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_nullable_date"
    )]
    pub start_date: Nullable<NaiveDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_nullable_date"
    )]
    pub end_date: Nullable<NaiveDate>,
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub budget: Nullable<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub supervisor_id: Nullable<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub created_by: Nullable<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub client_equipment_type: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub operator_requirements: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub created_at: Nullable<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireModel for Project {
    type Wire = ProjectWire;

    fn to_wire(&self) -> ProjectWire {
        ProjectWire {
            id: self.server_id,
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            customer_id: Some(self.customer_id),
            customer_name: Some(self.customer_name.clone()),
            start_date: Some(self.start_date),
            end_date: Some(self.end_date),
            status: Some(self.status.as_wire().to_string()),
            budget: Some(self.budget),
            supervisor_id: Some(self.supervisor_id),
            created_by: Some(self.created_by),
            client_equipment_type: Some(self.client_equipment_type.clone()),
            operator_requirements: Some(self.operator_requirements.clone()),
            created_at: Some(self.created_at),
            updated_at: self.sync.last_modified,
        }
    }

    fn from_wire(wire: &ProjectWire) -> Result<Self, ValidationError> {
        let mut project = Project {
            local_id: Uuid::now_v7(),
            server_id: None,
            title: require(&wire.title, "title")?,
            description: None,
            customer_id: None,
            customer_name: wire.customer_name.clone().unwrap_or_default(),
            start_date: None,
            end_date: None,
            status: ProjectStatus::Active,
            budget: None,
            supervisor_id: None,
            created_by: None,
            client_equipment_type: None,
            operator_requirements: None,
            created_at: None,
            sync: SyncMetadata::synced(wire.updated_at),
        };
        project.apply_wire(wire)?;
        Ok(project)
    }

    fn apply_wire(&mut self, wire: &ProjectWire) -> Result<(), ValidationError> {
        let status = parse_enum(&wire.status, "status", ProjectStatus::from_wire)?;

        take_opt!(self.server_id, wire.id);
        take!(self.title, wire.title);
        take!(self.description, wire.description);
        take!(self.customer_id, wire.customer_id);
        take!(self.customer_name, wire.customer_name);
        take!(self.start_date, wire.start_date);
        take!(self.end_date, wire.end_date);
        take!(self.status, status);
        take!(self.budget, wire.budget);
        take!(self.supervisor_id, wire.supervisor_id);
        take!(self.created_by, wire.created_by);
        take!(self.client_equipment_type, wire.client_equipment_type);
        take!(self.operator_requirements, wire.operator_requirements);
        take!(self.created_at, wire.created_at);
        Ok(())
    }

    fn wire_server_id(wire: &ProjectWire) -> Option<i64> {
        wire.id
    }

    fn wire_updated_at(wire: &ProjectWire) -> Option<DateTime<Utc>> {
        wire.updated_at
    }
}

// ============================================================================
// Task
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskWire {
    #[serde(rename = "task_id", alias = "id")]
    pub id: Option<i64>,
    pub project_id: Option<i64>,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub description: Nullable<String>,
    #[serde(
        default,
        alias = "startDate",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_nullable_date"
    )]
    pub start_date: Nullable<NaiveDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_nullable_date"
    )]
    pub deadline: Nullable<NaiveDate>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(alias = "requiredOperators")]
    pub required_operators: Option<i32>,
    #[serde(
        default,
        alias = "estimatedHours",
        skip_serializing_if = "Option::is_none",
        with = "nullable"
    )]
    pub estimated_hours: Nullable<Decimal>,
    #[serde(
        default,
        alias = "clientEquipmentInfo",
        skip_serializing_if = "Option::is_none",
        with = "nullable"
    )]
    pub client_equipment_info: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub created_at: Nullable<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireModel for Task {
    type Wire = TaskWire;

    fn to_wire(&self) -> TaskWire {
        TaskWire {
            id: self.server_id,
            project_id: Some(self.project_id),
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            start_date: Some(self.start_date),
            deadline: Some(self.deadline),
            status: Some(self.status.as_wire().to_string()),
            priority: Some(self.priority.as_wire().to_string()),
            required_operators: Some(self.required_operators),
            estimated_hours: Some(self.estimated_hours),
            client_equipment_info: Some(self.client_equipment_info.clone()),
            created_at: Some(self.created_at),
            updated_at: self.sync.last_modified,
        }
    }

    fn from_wire(wire: &TaskWire) -> Result<Self, ValidationError> {
        let mut task = Task {
            local_id: Uuid::now_v7(),
            server_id: None,
            project_id: require(&wire.project_id, "projectId")?,
            name: require(&wire.name, "name")?,
            description: None,
            start_date: None,
            deadline: None,
            status: TaskStatus::Planned,
            priority: TaskPriority::Medium,
            required_operators: 1,
            estimated_hours: None,
            client_equipment_info: None,
            created_at: None,
            sync: SyncMetadata::synced(wire.updated_at),
        };
        task.apply_wire(wire)?;
        Ok(task)
    }

    fn apply_wire(&mut self, wire: &TaskWire) -> Result<(), ValidationError> {
        let status = parse_enum(&wire.status, "status", TaskStatus::from_wire)?;
        let priority = parse_enum(&wire.priority, "priority", TaskPriority::from_wire)?;

        take_opt!(self.server_id, wire.id);
        take!(self.project_id, wire.project_id);
        take!(self.name, wire.name);
        take!(self.description, wire.description);
        take!(self.start_date, wire.start_date);
        take!(self.deadline, wire.deadline);
        take!(self.status, status);
        take!(self.priority, priority);
        take!(self.required_operators, wire.required_operators);
        take!(self.estimated_hours, wire.estimated_hours);
        take!(self.client_equipment_info, wire.client_equipment_info);
        take!(self.created_at, wire.created_at);
        Ok(())
    }

    fn wire_server_id(wire: &TaskWire) -> Option<i64> {
        wire.id
    }

    fn wire_updated_at(wire: &TaskWire) -> Option<DateTime<Utc>> {
        wire.updated_at
    }
}

// ============================================================================
// TaskAssignment
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignmentWire {
    #[serde(rename = "assignment_id", alias = "id")]
    pub id: Option<i64>,
    pub task_id: Option<i64>,
    pub employee_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub assigned_at: Nullable<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub crane_model_id: Nullable<i64>,
    pub status: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireModel for TaskAssignment {
    type Wire = TaskAssignmentWire;

    fn to_wire(&self) -> TaskAssignmentWire {
        TaskAssignmentWire {
            id: self.server_id,
            task_id: Some(self.task_id),
            employee_id: Some(self.employee_id),
            assigned_at: Some(self.assigned_at),
            crane_model_id: Some(self.crane_model_id),
            status: Some(self.status.as_wire().to_string()),
            updated_at: self.sync.last_modified,
        }
    }

    fn from_wire(wire: &TaskAssignmentWire) -> Result<Self, ValidationError> {
        let mut assignment = TaskAssignment {
            local_id: Uuid::now_v7(),
            server_id: None,
            task_id: require(&wire.task_id, "taskId")?,
            employee_id: require(&wire.employee_id, "employeeId")?,
            assigned_at: None,
            crane_model_id: None,
            status: AssignmentStatus::Assigned,
            sync: SyncMetadata::synced(wire.updated_at),
        };
        assignment.apply_wire(wire)?;
        Ok(assignment)
    }

    fn apply_wire(&mut self, wire: &TaskAssignmentWire) -> Result<(), ValidationError> {
        let status = parse_enum(&wire.status, "status", AssignmentStatus::from_wire)?;

        take_opt!(self.server_id, wire.id);
        take!(self.task_id, wire.task_id);
        take!(self.employee_id, wire.employee_id);
        take!(self.assigned_at, wire.assigned_at);
        take!(self.crane_model_id, wire.crane_model_id);
        take!(self.status, status);
        Ok(())
    }

    fn wire_server_id(wire: &TaskAssignmentWire) -> Option<i64> {
        wire.id
    }

    fn wire_updated_at(wire: &TaskAssignmentWire) -> Option<DateTime<Utc>> {
        wire.updated_at
    }
}

// ============================================================================
// WorkEntry
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkEntryWire {
    #[serde(rename = "entry_id", alias = "id")]
    pub id: Option<i64>,
    pub employee_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub project_id: Nullable<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub task_id: Nullable<i64>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub work_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub start_time: Nullable<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub end_time: Nullable<DateTime<Utc>>,
    pub break_duration: Option<Decimal>,
    pub total_hours: Option<Decimal>,
    pub regular_hours: Option<Decimal>,
    pub overtime_hours: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub notes: Nullable<String>,
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub approved_by: Nullable<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub approved_at: Nullable<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub submitted_at: Nullable<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub rejection_reason: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub created_at: Nullable<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireModel for WorkEntry {
    type Wire = WorkEntryWire;

    fn to_wire(&self) -> WorkEntryWire {
        WorkEntryWire {
            id: self.server_id,
            employee_id: Some(self.employee_id),
            project_id: Some(self.project_id),
            task_id: Some(self.task_id),
            work_date: Some(self.work_date),
            start_time: Some(self.start_time),
            end_time: Some(self.end_time),
            break_duration: Some(self.break_duration),
            total_hours: Some(self.total_hours),
            regular_hours: Some(self.regular_hours),
            overtime_hours: Some(self.overtime_hours),
            notes: Some(self.notes.clone()),
            status: Some(self.status.as_wire().to_string()),
            approved_by: Some(self.approved_by),
            approved_at: Some(self.approved_at),
            submitted_at: Some(self.submitted_at),
            rejection_reason: Some(self.rejection_reason.clone()),
            created_at: Some(self.created_at),
            updated_at: self.sync.last_modified,
        }
    }

    fn from_wire(wire: &WorkEntryWire) -> Result<Self, ValidationError> {
        let mut entry = WorkEntry {
            local_id: Uuid::now_v7(),
            server_id: None,
            employee_id: require(&wire.employee_id, "employeeId")?,
            project_id: None,
            task_id: None,
            work_date: require(&wire.work_date, "workDate")?,
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
            created_at: None,
            sync: SyncMetadata::synced(wire.updated_at),
        };
        entry.apply_wire(wire)?;
        Ok(entry)
    }

    fn apply_wire(&mut self, wire: &WorkEntryWire) -> Result<(), ValidationError> {
        let status = parse_enum(&wire.status, "status", EntryStatus::from_wire)?;

        take_opt!(self.server_id, wire.id);
        take!(self.employee_id, wire.employee_id);
        take!(self.project_id, wire.project_id);
        take!(self.task_id, wire.task_id);
        take!(self.work_date, wire.work_date);
        take!(self.start_time, wire.start_time);
        take!(self.end_time, wire.end_time);
        take!(self.break_duration, wire.break_duration);
        take!(self.total_hours, wire.total_hours);
        take!(self.regular_hours, wire.regular_hours);
        take!(self.overtime_hours, wire.overtime_hours);
        take!(self.notes, wire.notes);
        take!(self.status, status);
        take!(self.approved_by, wire.approved_by);
        take!(self.approved_at, wire.approved_at);
        take!(self.submitted_at, wire.submitted_at);
        take!(self.rejection_reason, wire.rejection_reason);
        take!(self.created_at, wire.created_at);
        Ok(())
    }

    fn wire_server_id(wire: &WorkEntryWire) -> Option<i64> {
        wire.id
    }

    fn wire_updated_at(wire: &WorkEntryWire) -> Option<DateTime<Utc>> {
        wire.updated_at
    }
}

// ============================================================================
// LeaveRequest
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequestWire {
    pub id: Option<i64>,
    pub employee_id: Option<i64>,
    #[serde(rename = "type")]
    pub leave_type: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub end_date: Option<NaiveDate>,
    pub half_day: Option<bool>,
    pub total_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub reason: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub sick_note_url: Nullable<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub approved_by: Nullable<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub approved_at: Nullable<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub rejection_reason: Nullable<String>,
    pub emergency_leave: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub created_at: Nullable<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WireModel for LeaveRequest {
    type Wire = LeaveRequestWire;

    fn to_wire(&self) -> LeaveRequestWire {
        LeaveRequestWire {
            id: self.server_id,
            employee_id: Some(self.employee_id),
            leave_type: Some(self.leave_type.as_wire().to_string()),
            status: Some(self.status.as_wire().to_string()),
            start_date: Some(self.start_date),
            end_date: Some(self.end_date),
            half_day: Some(self.half_day),
            total_days: Some(self.total_days),
            reason: Some(self.reason.clone()),
            sick_note_url: Some(self.sick_note_url.clone()),
            approved_by: Some(self.approved_by),
            approved_at: Some(self.approved_at),
            rejection_reason: Some(self.rejection_reason.clone()),
            emergency_leave: Some(self.emergency_leave),
            created_at: Some(self.created_at),
            updated_at: self.sync.last_modified,
        }
    }

    fn from_wire(wire: &LeaveRequestWire) -> Result<Self, ValidationError> {
        let leave_type = parse_enum(&wire.leave_type, "type", LeaveType::from_wire)?
            .ok_or_else(|| ValidationError::missing("type"))?;

        let mut request = LeaveRequest {
            local_id: Uuid::now_v7(),
            server_id: None,
            employee_id: require(&wire.employee_id, "employeeId")?,
            leave_type,
            status: LeaveStatus::Pending,
            start_date: require(&wire.start_date, "startDate")?,
            end_date: require(&wire.end_date, "endDate")?,
            half_day: false,
            total_days: 0,
            reason: None,
            sick_note_url: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            emergency_leave: false,
            created_at: None,
            sync: SyncMetadata::synced(wire.updated_at),
        };
        request.apply_wire(wire)?;
        if wire.total_days.is_none() {
            request.total_days = request.calculate_work_days();
        }
        Ok(request)
    }

    fn apply_wire(&mut self, wire: &LeaveRequestWire) -> Result<(), ValidationError> {
        let leave_type = parse_enum(&wire.leave_type, "type", LeaveType::from_wire)?;
        let status = parse_enum(&wire.status, "status", LeaveStatus::from_wire)?;

        take_opt!(self.server_id, wire.id);
        take!(self.employee_id, wire.employee_id);
        take!(self.leave_type, leave_type);
        take!(self.status, status);
        take!(self.start_date, wire.start_date);
        take!(self.end_date, wire.end_date);
        take!(self.half_day, wire.half_day);
        take!(self.total_days, wire.total_days);
        take!(self.reason, wire.reason);
        take!(self.sick_note_url, wire.sick_note_url);
        take!(self.approved_by, wire.approved_by);
        take!(self.approved_at, wire.approved_at);
        take!(self.rejection_reason, wire.rejection_reason);
        take!(self.emergency_leave, wire.emergency_leave);
        take!(self.created_at, wire.created_at);
        Ok(())
    }

    fn wire_server_id(wire: &LeaveRequestWire) -> Option<i64> {
        wire.id
    }

    fn wire_updated_at(wire: &LeaveRequestWire) -> Option<DateTime<Utc>> {
        wire.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Wire-visible projection; local ids and sync status are device-only.
    fn same_wire<T: WireModel>(a: &T, b: &T) -> bool {
        a.to_wire() == b.to_wire()
    }

    #[test]
    fn test_work_entry_round_trip() {
        let mut entry = WorkEntry::new(4, Some(9), date(2025, 6, 10));
        entry.server_id = Some(120);
        entry.project_id = Some(2);
        entry.start_time = Some(Utc.with_ymd_and_hms(2025, 6, 10, 6, 0, 0).unwrap());
        entry.end_time = Some(Utc.with_ymd_and_hms(2025, 6, 10, 15, 30, 0).unwrap());
        entry.break_duration = dec!(0.5);
        entry.calculate_total_hours();
        entry.notes = Some("Crane 3".into());

        let back = WorkEntry::from_wire(&entry.to_wire()).unwrap();

        assert!(same_wire(&entry, &back));
        assert_eq!(back.total_hours, dec!(9));
        assert_eq!(back.overtime_hours, dec!(1));
        assert_eq!(back.sync.status, SyncStatus::Synced);
    }

    #[test]
    fn test_employee_round_trip_through_json() {
        let mut employee = Employee::new("Ole", "ole@ksr.dk", EmployeeRole::Chief);
        employee.server_id = Some(7);
        employee.rates.normal = Some(dec!(425.50));

        let value = employee.encode().unwrap();
        assert_eq!(value["role"], "chef");
        assert_eq!(value["employee_id"], 7);

        let wire = Employee::decode(value).unwrap();
        let back = Employee::from_wire(&wire).unwrap();
        assert!(same_wire(&employee, &back));
        assert_eq!(back.rates.normal, Some(dec!(425.50)));
    }

    #[test]
    fn test_decimal_accepts_numbers_and_strings() {
        let wire = Employee::decode(json!({
            "employee_id": 1,
            "name": "Ole",
            "email": "ole@ksr.dk",
            "role": "arbejder",
            "operator_normal_rate": 400.25,
            "operator_weekend_rate": "612.00"
        }))
        .unwrap();

        assert_eq!(wire.operator_normal_rate, Some(Some(dec!(400.25))));
        assert_eq!(wire.operator_weekend_rate, Some(Some(dec!(612.00))));
    }

    #[test]
    fn test_unknown_role_is_invalid_enum() {
        let wire = EmployeeWire {
            id: Some(1),
            name: Some("Ole".into()),
            email: Some("ole@ksr.dk".into()),
            role: Some("admiral".into()),
            ..Default::default()
        };
        assert_eq!(
            Employee::from_wire(&wire),
            Err(ValidationError::InvalidEnumValue("role".into()))
        );
    }

    #[test]
    fn test_apply_wire_keeps_absent_fields() {
        let mut project = Project::new("Harbour", "Aarhus Havn");
        project.description = Some("Quay 4".into());
        project.budget = Some(dec!(150000));

        let partial = ProjectWire {
            id: Some(31),
            status: Some("on_hold".into()),
            ..Default::default()
        };
        project.apply_wire(&partial).unwrap();

        assert_eq!(project.server_id, Some(31));
        assert_eq!(project.status, ProjectStatus::OnHold);
        assert_eq!(project.description.as_deref(), Some("Quay 4"));
        assert_eq!(project.budget, Some(dec!(150000)));
        assert_eq!(project.title, "Harbour");
    }

    #[test]
    fn test_null_clears_and_absent_keeps() {
        let mut task = Task::new(3, "Lift");
        task.description = Some("Steel".into());
        task.estimated_hours = Some(dec!(6));
        task.deadline = Some(date(2025, 6, 20));

        let wire = Task::decode(json!({ "task_id": 5, "description": null, "deadline": null }))
            .unwrap();
        assert_eq!(wire.description, Some(None));
        assert_eq!(wire.estimated_hours, None);
        task.apply_wire(&wire).unwrap();

        assert_eq!(task.description, None);
        assert_eq!(task.deadline, None);
        assert_eq!(task.estimated_hours, Some(dec!(6)));
        assert_eq!(task.server_id, Some(5));
    }

    #[test]
    fn test_approval_clears_stale_rejection_reason() {
        let mut entry = WorkEntry::new(4, Some(9), date(2025, 6, 10));
        entry.server_id = Some(1);
        entry.status = EntryStatus::Rejected;
        entry.rejection_reason = Some("Wrong crane".into());

        let wire = WorkEntry::decode(json!({
            "entry_id": 1,
            "status": "approved",
            "approved_by": 2,
            "rejection_reason": null
        }))
        .unwrap();
        entry.apply_wire(&wire).unwrap();

        assert_eq!(entry.status, EntryStatus::Approved);
        assert_eq!(entry.approved_by, Some(2));
        assert_eq!(entry.rejection_reason, None);
    }

    #[test]
    fn test_encode_sends_null_for_cleared_fields() {
        let entry = WorkEntry::new(4, None, date(2025, 6, 10));
        let value = entry.encode().unwrap();

        assert!(value["task_id"].is_null());
        assert!(value.as_object().unwrap().contains_key("notes"));
        assert_eq!(value["work_date"], "2025-06-10");
    }

    #[test]
    fn test_shape_mismatch_is_decoding_error() {
        let err = WorkEntry::decode(json!({ "employee_id": "seven" })).unwrap_err();
        assert!(matches!(err, RosterError::Decoding(_)));
    }

    #[test]
    fn test_leave_uppercase_enums_and_timestamp_dates() {
        let wire = LeaveRequest::decode(json!({
            "id": 12,
            "employee_id": 4,
            "type": "VACATION",
            "status": "APPROVED",
            "start_date": "2025-06-02T00:00:00.000Z",
            "end_date": "2025-06-06",
            "half_day": false,
            "emergency_leave": false,
            "updated_at": "2025-05-20T08:00:00Z"
        }))
        .unwrap();

        let leave = LeaveRequest::from_wire(&wire).unwrap();
        assert_eq!(leave.leave_type, LeaveType::Vacation);
        assert_eq!(leave.status, LeaveStatus::Approved);
        assert_eq!(leave.start_date, date(2025, 6, 2));
        assert_eq!(leave.total_days, 5);
        assert_eq!(
            leave.sync.last_modified,
            Some(Utc.with_ymd_and_hms(2025, 5, 20, 8, 0, 0).unwrap())
        );

        let lower = LeaveRequestWire {
            status: Some("approved".into()),
            ..wire
        };
        assert_eq!(
            LeaveRequest::from_wire(&lower),
            Err(ValidationError::InvalidEnumValue("status".into()))
        );
    }

    #[test]
    fn test_from_wire_requires_owner() {
        let wire = TaskWire {
            id: Some(1),
            name: Some("Lift".into()),
            ..Default::default()
        };
        assert_eq!(Task::from_wire(&wire), Err(ValidationError::missing("projectId")));
    }
}
