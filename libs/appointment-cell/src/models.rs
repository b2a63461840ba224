// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use patient_cell::models::{PatientError, QuickPatientPayload};
use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_utils::patch::double_option;
use shared_utils::time::{ClientInstant, TimeError};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub practitioner_id: Option<i64>,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_min: i32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            start_at: self.start_at,
            end_at: self.end_at,
            duration_min: self.duration_min,
        }
    }

    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        window.overlaps(self.start_at, self.end_at)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(AppointmentError::InvalidEnumValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    Consultation,
    FollowUp,
    Procedure,
    Other,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::FollowUp => "follow_up",
            AppointmentType::Procedure => "procedure",
            AppointmentType::Other => "other",
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentType {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consultation" => Ok(AppointmentType::Consultation),
            "follow_up" => Ok(AppointmentType::FollowUp),
            "procedure" => Ok(AppointmentType::Procedure),
            "other" => Ok(AppointmentType::Other),
            other => Err(AppointmentError::InvalidEnumValue {
                field: "appointment_type",
                value: other.to_string(),
            }),
        }
    }
}

// ==============================================================================
// SCHEDULING
// ==============================================================================

/// The three stored scheduling columns. `end_at` is always `start_at + duration_min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub duration_min: i32,
}

impl Schedule {
    pub fn new(start_at: DateTime<Utc>, duration_min: i32) -> Result<Self, AppointmentError> {
        if duration_min <= 0 {
            return Err(AppointmentError::Validation(
                "duration_min must be a positive number of minutes".to_string(),
            ));
        }
        Ok(Self {
            start_at,
            end_at: start_at + Duration::minutes(i64::from(duration_min)),
            duration_min,
        })
    }

    /// Apply a partial move/resize. A new start keeps the current duration unless
    /// one is given; a new duration alone keeps the current start. Returns `None`
    /// when neither changes.
    pub fn reschedule(
        &self,
        start_at: Option<DateTime<Utc>>,
        duration_min: Option<i32>,
    ) -> Result<Option<Self>, AppointmentError> {
        match (start_at, duration_min) {
            (None, None) => Ok(None),
            (start, duration) => Schedule::new(
                start.unwrap_or(self.start_at),
                duration.unwrap_or(self.duration_min),
            )
            .map(Some),
        }
    }
}

/// Closed query window `[start, end]` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True when `[start_at, end_at]` touches the window at any point.
    pub fn overlaps(&self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> bool {
        start_at <= self.end && end_at >= self.start
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub new_patient: Option<QuickPatientPayload>,
    pub practitioner_id: Option<i64>,
    pub title: String,
    pub start_at: ClientInstant,
    pub duration_min: i32,
    pub status: Option<String>,
    #[serde(alias = "type", alias = "appt_type")]
    pub appointment_type: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub practitioner_id: Option<Option<i64>>,
    pub title: Option<String>,
    pub start_at: Option<ClientInstant>,
    pub duration_min: Option<i32>,
    pub status: Option<String>,
    #[serde(alias = "type", alias = "appt_type")]
    pub appointment_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub treatment: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

/// Calendar query parameters. `start` and `end` are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub doctor_id: Option<i64>,
    pub status: Option<String>,
    pub name: Option<String>,
    pub q: Option<String>,
}

impl AppointmentQuery {
    pub fn name_filter(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.q.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Row written for a new appointment. `patient_id` is absent when the patient is
/// created in the same transaction.
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    pub practitioner_id: Option<i64>,
    pub title: String,
    pub start_at: String,
    pub end_at: String,
    pub duration_min: i32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub treatment: Option<String>,
    pub notes: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Either patient_id or new_patient is required")]
    MissingReference,

    #[error("{0}")]
    ReferenceNotFound(String),

    #[error("new_patient.{field} is required")]
    IncompleteQuickPatient { field: &'static str },

    #[error("Invalid date '{0}' (use YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Invalid value '{value}' for {field}")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error(transparent)]
    MalformedBoundary(#[from] TimeError),

    #[error("Query parameters 'start' and 'end' are required (ISO-8601 or YYYY-MM-DD)")]
    MissingWindow,

    #[error("Appointment {0} not found")]
    NotFound(i64),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for AppointmentError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(msg) => AppointmentError::Conflict(msg),
            DatabaseError::ForeignKeyViolation(msg) => {
                AppointmentError::ReferenceNotFound(format!("Referenced record does not exist: {}", msg))
            }
            other => AppointmentError::Database(other),
        }
    }
}

impl From<PatientError> for AppointmentError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(id) => AppointmentError::ReferenceNotFound(format!("Patient {} not found", id)),
            PatientError::MissingReference => AppointmentError::MissingReference,
            PatientError::IncompleteQuickPatient { field } => AppointmentError::IncompleteQuickPatient { field },
            PatientError::InvalidDate(raw) => AppointmentError::InvalidDate(raw),
            PatientError::InvalidEnumValue { field, value } => AppointmentError::InvalidEnumValue { field, value },
            PatientError::MalformedBoundary(e) => AppointmentError::MalformedBoundary(e),
            PatientError::Conflict(msg) => AppointmentError::Conflict(msg),
            PatientError::Validation(msg) => AppointmentError::Validation(msg),
            PatientError::Database(e) => AppointmentError::Database(e),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(_) | AppointmentError::ReferenceNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            AppointmentError::MissingReference
            | AppointmentError::IncompleteQuickPatient { .. }
            | AppointmentError::InvalidDate(_)
            | AppointmentError::InvalidEnumValue { .. }
            | AppointmentError::MalformedBoundary(_)
            | AppointmentError::MissingWindow => AppError::BadRequest(err.to_string()),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Conflict(_) => AppError::Conflict(err.to_string()),
            AppointmentError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}
