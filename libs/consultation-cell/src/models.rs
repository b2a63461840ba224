use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use patient_cell::models::PatientError;
use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_utils::patch::double_option;
use shared_utils::time::{ClientInstant, TimeError};
use shared_utils::validation::{check_length, check_optional_length};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: i64,
    pub patient_id: i64,
    pub practitioner_id: Option<i64>,
    pub title: String,
    pub datetime: DateTime<Utc>,
    pub notes: Option<String>,
    pub products: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConsultationRequest {
    pub patient_id: i64,
    pub practitioner_id: Option<i64>,
    pub title: String,
    /// Offset-less values are clinic time.
    pub datetime: ClientInstant,
    pub notes: Option<String>,
    pub products: Option<String>,
}

impl CreateConsultationRequest {
    pub fn validate(&self) -> Result<(), ConsultationError> {
        check_length("title", self.title.trim(), 1, 200)
            .and_then(|_| check_texts(self.notes.as_deref(), self.products.as_deref()))
            .map_err(ConsultationError::Validation)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateConsultationRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub practitioner_id: Option<Option<i64>>,
    pub title: Option<String>,
    pub datetime: Option<ClientInstant>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub products: Option<Option<String>>,
}

impl UpdateConsultationRequest {
    pub fn validate(&self) -> Result<(), ConsultationError> {
        if let Some(title) = self.title.as_deref() {
            check_length("title", title.trim(), 1, 200).map_err(ConsultationError::Validation)?;
        }
        check_texts(
            self.notes.as_ref().and_then(|n| n.as_deref()),
            self.products.as_ref().and_then(|p| p.as_deref()),
        )
        .map_err(ConsultationError::Validation)
    }
}

fn check_texts(notes: Option<&str>, products: Option<&str>) -> Result<(), String> {
    check_optional_length("notes", notes, 4000)?;
    check_optional_length("products", products, 2000)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsultationListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub name: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ConsultationListQuery {
    pub fn name_filter(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.q.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum ConsultationError {
    #[error("Consultation {0} not found")]
    NotFound(i64),

    #[error("{0}")]
    ReferenceNotFound(String),

    #[error(transparent)]
    MalformedBoundary(#[from] TimeError),

    #[error("{0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for ConsultationError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(msg) => ConsultationError::Conflict(msg),
            DatabaseError::ForeignKeyViolation(msg) => {
                ConsultationError::ReferenceNotFound(format!("Referenced record does not exist: {}", msg))
            }
            other => ConsultationError::Database(other),
        }
    }
}

impl From<PatientError> for ConsultationError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(id) => ConsultationError::ReferenceNotFound(format!("Patient {} not found", id)),
            PatientError::Database(e) => ConsultationError::Database(e),
            other => ConsultationError::Validation(other.to_string()),
        }
    }
}

impl From<ConsultationError> for AppError {
    fn from(err: ConsultationError) -> Self {
        match err {
            ConsultationError::NotFound(_) | ConsultationError::ReferenceNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            ConsultationError::MalformedBoundary(_) => AppError::BadRequest(err.to_string()),
            ConsultationError::Validation(msg) => AppError::ValidationError(msg),
            ConsultationError::Conflict(_) => AppError::Conflict(err.to_string()),
            ConsultationError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}
