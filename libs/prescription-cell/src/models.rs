use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use patient_cell::models::{PatientError, QuickPatientPayload};
use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_utils::patch::double_option;
use shared_utils::time::ClientInstant;
use shared_utils::validation::check_optional_length;

/// Vital signs taken when the prescription is issued. Every reading is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub temp_c: Option<f64>,
    pub bp_sys: Option<i32>,
    pub bp_dia: Option<i32>,
    pub heart_rate: Option<i32>,
    pub resp_rate: Option<i32>,
    pub bmi: Option<f64>,
    pub spo2: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub patient_id: i64,
    pub consultation_id: Option<i64>,
    pub practitioner_id: Option<i64>,
    pub issued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub vitals: Vitals,
    pub diagnosis: Option<String>,
    pub prescription_text: Option<String>,
    pub care_instructions: Option<String>,
    pub products: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub patient_id: Option<i64>,
    pub new_patient: Option<QuickPatientPayload>,
    pub consultation_id: Option<i64>,
    pub practitioner_id: Option<i64>,
    /// Defaults to the current clinic time.
    pub issued_at: Option<ClientInstant>,
    #[serde(flatten)]
    pub vitals: Vitals,
    pub diagnosis: Option<String>,
    pub prescription_text: Option<String>,
    pub care_instructions: Option<String>,
    pub products: Option<String>,
}

impl CreatePrescriptionRequest {
    pub fn validate(&self) -> Result<(), PrescriptionError> {
        check_texts(
            self.diagnosis.as_deref(),
            self.prescription_text.as_deref(),
            self.care_instructions.as_deref(),
            self.products.as_deref(),
        )
    }
}

/// Partial update. `null` clears a nullable column; an absent key leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePrescriptionRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub practitioner_id: Option<Option<i64>>,
    pub issued_at: Option<ClientInstant>,
    #[serde(default, deserialize_with = "double_option")]
    pub temp_c: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bp_sys: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bp_dia: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub heart_rate: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub resp_rate: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bmi: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub spo2: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub diagnosis: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub prescription_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub care_instructions: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub products: Option<Option<String>>,
}

impl UpdatePrescriptionRequest {
    pub fn validate(&self) -> Result<(), PrescriptionError> {
        check_texts(
            self.diagnosis.as_ref().and_then(|v| v.as_deref()),
            self.prescription_text.as_ref().and_then(|v| v.as_deref()),
            self.care_instructions.as_ref().and_then(|v| v.as_deref()),
            self.products.as_ref().and_then(|v| v.as_deref()),
        )
    }
}

fn check_texts(
    diagnosis: Option<&str>,
    prescription_text: Option<&str>,
    care_instructions: Option<&str>,
    products: Option<&str>,
) -> Result<(), PrescriptionError> {
    check_optional_length("diagnosis", diagnosis, 1000)
        .and_then(|_| check_optional_length("prescription_text", prescription_text, 4000))
        .and_then(|_| check_optional_length("care_instructions", care_instructions, 4000))
        .and_then(|_| check_optional_length("products", products, 2000))
        .map_err(PrescriptionError::Validation)
}

/// Row sent to the store. `patient_id` is left out when the patient is
/// inserted in the same call.
#[derive(Debug, Clone, Serialize)]
pub struct NewPrescription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    pub consultation_id: Option<i64>,
    pub practitioner_id: Option<i64>,
    pub issued_at: String,
    #[serde(flatten)]
    pub vitals: Vitals,
    pub diagnosis: Option<String>,
    pub prescription_text: Option<String>,
    pub care_instructions: Option<String>,
    pub products: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub patient_id: Option<i64>,
}

#[derive(Debug, Error)]
pub enum PrescriptionError {
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

    #[error("Prescription {0} not found")]
    NotFound(i64),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for PrescriptionError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(msg) => PrescriptionError::Conflict(msg),
            DatabaseError::ForeignKeyViolation(msg) => {
                PrescriptionError::ReferenceNotFound(format!("Referenced record does not exist: {}", msg))
            }
            other => PrescriptionError::Database(other),
        }
    }
}

impl From<PatientError> for PrescriptionError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(id) => PrescriptionError::ReferenceNotFound(format!("Patient {} not found", id)),
            PatientError::MissingReference => PrescriptionError::MissingReference,
            PatientError::IncompleteQuickPatient { field } => PrescriptionError::IncompleteQuickPatient { field },
            PatientError::InvalidDate(raw) => PrescriptionError::InvalidDate(raw),
            PatientError::InvalidEnumValue { field, value } => PrescriptionError::InvalidEnumValue { field, value },
            PatientError::Conflict(msg) => PrescriptionError::Conflict(msg),
            PatientError::Validation(msg) => PrescriptionError::Validation(msg),
            PatientError::MalformedBoundary(e) => PrescriptionError::Validation(e.to_string()),
            PatientError::Database(e) => PrescriptionError::Database(e),
        }
    }
}

impl From<PrescriptionError> for AppError {
    fn from(err: PrescriptionError) -> Self {
        match err {
            PrescriptionError::NotFound(_) | PrescriptionError::ReferenceNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            PrescriptionError::MissingReference
            | PrescriptionError::IncompleteQuickPatient { .. }
            | PrescriptionError::InvalidDate(_)
            | PrescriptionError::InvalidEnumValue { .. } => AppError::BadRequest(err.to_string()),
            PrescriptionError::Validation(msg) => AppError::ValidationError(msg),
            PrescriptionError::Conflict(_) => AppError::Conflict(err.to_string()),
            PrescriptionError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}
