//! Input validation for RosterCore.
//!
//! Every entity implements [`Validate`]. The store runs it on insert and
//! update, so invalid records never reach the sync queue. Validators are pure
//! and report the first violated invariant as a [`ValidationError`].

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::models::{Employee, LeaveRequest, Project, Task, TaskAssignment, WorkEntry};

// Limits
pub const MAX_REQUIRED_OPERATORS: i32 = 50;
pub const MAX_ESTIMATED_HOURS: i64 = 1000;
pub const MAX_DAILY_HOURS: i64 = 24;

/// Date format used in the store and on the wire.
/// Must stay zero-padded: dates are compared as strings in SQL.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Z0-9a-z._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,64}$")
            .unwrap_or_else(|e| panic!("email pattern does not compile: {e}"))
    })
}

/// Per-entity invariant check.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Validate an email address (whole-string match).
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email_regex().is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

/// Reject empty or whitespace-only required text.
pub fn validate_required(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::missing(field));
    }
    Ok(())
}

fn validate_non_negative(value: Option<Decimal>, field: &str) -> Result<(), ValidationError> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(ValidationError::range(field)),
        _ => Ok(()),
    }
}

fn validate_order<T: PartialOrd>(
    start: Option<T>,
    end: Option<T>,
    start_field: &'static str,
    end_field: &'static str,
) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start_field,
                end: end_field,
            });
        }
    }
    Ok(())
}

impl Validate for Employee {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required(&self.name, "name")?;
        validate_required(&self.email, "email")?;
        validate_email(&self.email)?;
        validate_non_negative(self.rates.normal, "normalRate")?;
        validate_non_negative(self.rates.overtime1, "overtimeRate1")?;
        validate_non_negative(self.rates.overtime2, "overtimeRate2")?;
        validate_non_negative(self.rates.weekend, "weekendRate")?;
        Ok(())
    }
}

impl Validate for Project {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required(&self.title, "title")?;
        validate_required(&self.customer_name, "customerName")?;
        validate_order(self.start_date, self.end_date, "startDate", "endDate")?;
        validate_non_negative(self.budget, "budget")?;
        Ok(())
    }
}

impl Validate for Task {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_required(&self.name, "name")?;
        validate_order(self.start_date, self.deadline, "startDate", "deadline")?;

        if !(0..=MAX_REQUIRED_OPERATORS).contains(&self.required_operators) {
            return Err(ValidationError::range("requiredOperators"));
        }

        if let Some(hours) = self.estimated_hours {
            if hours < Decimal::ZERO || hours > Decimal::from(MAX_ESTIMATED_HOURS) {
                return Err(ValidationError::range("estimatedHours"));
            }
        }
        Ok(())
    }
}

impl Validate for TaskAssignment {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for WorkEntry {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.total_hours < Decimal::ZERO || self.total_hours > Decimal::from(MAX_DAILY_HOURS) {
            return Err(ValidationError::range("totalHours"));
        }
        if self.break_duration < Decimal::ZERO {
            return Err(ValidationError::range("breakDuration"));
        }
        validate_order(self.start_time, self.end_time, "startTime", "endTime")?;
        Ok(())
    }
}

impl Validate for LeaveRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_order(
            Some(self.start_date),
            Some(self.end_date),
            "startDate",
            "endDate",
        )?;
        if self.total_days < 0 {
            return Err(ValidationError::range("totalDays"));
        }
        Ok(())
    }
}
