use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::DatabaseError;
use shared_models::error::AppError;
use shared_utils::patch::double_option;
use shared_utils::time::TimeError;
use shared_utils::validation::{check_length, check_optional_length};

pub const DEFAULT_PAST_HISTORY: &str = "No pathological history";
pub const DEFAULT_ALLERGIES: &str = "No known allergies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "O")]
    Other,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Female => "F",
            Sex::Male => "M",
            Sex::Other => "O",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "F" => Ok(Sex::Female),
            "M" => Ok(Sex::Male),
            "O" => Ok(Sex::Other),
            _ => Err(format!("invalid sex '{}' (use F, M or O)", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
    pub phone: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub bmi: Option<f64>,
    pub age_years: Option<i32>,
    pub past_history: Option<String>,
    pub allergies: Option<String>,
    pub treatments_of_interest: Option<String>,
    pub privacy_notice_accepted: bool,
    pub informed_consent_accepted: bool,
    pub emergency_full_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub emergency_relation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Human-facing identifier such as `P-0007`. Not stored.
    pub fn display_id(&self) -> String {
        format!("P-{:04}", self.id)
    }

    pub fn recalc_age_and_bmi(&mut self, today: NaiveDate) {
        self.age_years = Some(age_in_years(self.date_of_birth, today));
        self.bmi = body_mass_index(self.weight_kg, self.height_m);
    }
}

/// Patient as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub display_id: String,
}

impl From<Patient> for PatientView {
    fn from(patient: Patient) -> Self {
        let display_id = patient.display_id();
        Self { patient, display_id }
    }
}

/// Whole years elapsed since `date_of_birth`, never negative.
pub fn age_in_years(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0)
}

/// kg / m², one decimal. Only defined when both measurements are positive.
pub fn body_mass_index(weight_kg: Option<f64>, height_m: Option<f64>) -> Option<f64> {
    match (weight_kg, height_m) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some((w / (h * h) * 10.0).round() / 10.0),
        _ => None,
    }
}

pub(crate) fn text_or_default(value: Option<String>, default: &str) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text,
        _ => default.to_string(),
    }
}

/// Row sent to the store when inserting a patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
    pub phone: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub bmi: Option<f64>,
    pub age_years: i32,
    pub past_history: String,
    pub allergies: String,
    pub treatments_of_interest: String,
    pub privacy_notice_accepted: bool,
    pub informed_consent_accepted: bool,
    pub emergency_full_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub emergency_relation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub sex: String,
    pub phone: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub weight_kg: f64,
    pub height_m: f64,
    pub treatments_of_interest: String,
    pub past_history: Option<String>,
    pub allergies: Option<String>,
    pub privacy_notice_accepted: bool,
    pub informed_consent_accepted: bool,
    pub emergency_full_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub emergency_relation: Option<String>,
}

impl CreatePatientRequest {
    pub fn into_new_patient(self, today: NaiveDate) -> Result<NewPatient, PatientError> {
        let sex = self.sex.parse::<Sex>().map_err(|_| PatientError::InvalidEnumValue {
            field: "sex",
            value: self.sex.clone(),
        })?;

        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        check_length("first_name", &first_name, 1, 100).map_err(PatientError::Validation)?;
        check_length("last_name", &last_name, 1, 150).map_err(PatientError::Validation)?;
        check_length("treatments_of_interest", &self.treatments_of_interest, 1, 2000)
            .map_err(PatientError::Validation)?;
        check_measurements(Some(self.weight_kg), Some(self.height_m))?;
        check_optional_texts(
            self.address.as_deref(),
            self.past_history.as_deref(),
            self.allergies.as_deref(),
            self.emergency_full_name.as_deref(),
            self.emergency_relation.as_deref(),
        )?;

        let weight_kg = Some(self.weight_kg);
        let height_m = Some(self.height_m);

        Ok(NewPatient {
            first_name,
            last_name,
            date_of_birth: self.date_of_birth,
            sex,
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            photo_url: self.photo_url,
            address: self.address,
            weight_kg,
            height_m,
            bmi: body_mass_index(weight_kg, height_m),
            age_years: age_in_years(self.date_of_birth, today),
            past_history: text_or_default(self.past_history, DEFAULT_PAST_HISTORY),
            allergies: text_or_default(self.allergies, DEFAULT_ALLERGIES),
            treatments_of_interest: self.treatments_of_interest,
            privacy_notice_accepted: self.privacy_notice_accepted,
            informed_consent_accepted: self.informed_consent_accepted,
            emergency_full_name: self.emergency_full_name,
            emergency_phone: self.emergency_phone,
            emergency_relation: self.emergency_relation,
        })
    }
}

fn check_measurements(weight_kg: Option<f64>, height_m: Option<f64>) -> Result<(), PatientError> {
    if let Some(w) = weight_kg {
        if w <= 0.0 || w > 500.0 {
            return Err(PatientError::Validation("weight_kg out of range".to_string()));
        }
    }
    if let Some(h) = height_m {
        if h <= 0.0 || h > 2.6 {
            return Err(PatientError::Validation("height_m out of range".to_string()));
        }
    }
    Ok(())
}

fn check_optional_texts(
    address: Option<&str>,
    past_history: Option<&str>,
    allergies: Option<&str>,
    emergency_full_name: Option<&str>,
    emergency_relation: Option<&str>,
) -> Result<(), PatientError> {
    check_optional_length("address", address, 500)
        .and_then(|_| check_optional_length("past_history", past_history, 2000))
        .and_then(|_| check_optional_length("allergies", allergies, 2000))
        .and_then(|_| check_optional_length("emergency_full_name", emergency_full_name, 200))
        .and_then(|_| check_optional_length("emergency_relation", emergency_relation, 100))
        .map_err(PatientError::Validation)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub photo_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub treatments_of_interest: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub past_history: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub allergies: Option<Option<String>>,
    pub privacy_notice_accepted: Option<bool>,
    pub informed_consent_accepted: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub emergency_full_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub emergency_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub emergency_relation: Option<Option<String>>,
}

impl UpdatePatientRequest {
    /// Merge the present fields into `patient`, re-apply text defaults and
    /// recompute age and BMI from the merged record.
    pub fn apply_to(self, patient: &mut Patient, today: NaiveDate) -> Result<(), PatientError> {
        if let Some(raw) = self.sex {
            patient.sex = raw.parse::<Sex>().map_err(|_| PatientError::InvalidEnumValue {
                field: "sex",
                value: raw.clone(),
            })?;
        }
        if let Some(first_name) = self.first_name {
            let first_name = first_name.trim().to_string();
            check_length("first_name", &first_name, 1, 100).map_err(PatientError::Validation)?;
            patient.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            let last_name = last_name.trim().to_string();
            check_length("last_name", &last_name, 1, 150).map_err(PatientError::Validation)?;
            patient.last_name = last_name;
        }
        if let Some(treatments) = self.treatments_of_interest {
            check_length("treatments_of_interest", &treatments, 1, 2000)
                .map_err(PatientError::Validation)?;
            patient.treatments_of_interest = Some(treatments);
        }
        check_measurements(self.weight_kg, self.height_m)?;
        check_optional_texts(
            self.address.as_ref().and_then(|v| v.as_deref()),
            self.past_history.as_ref().and_then(|v| v.as_deref()),
            self.allergies.as_ref().and_then(|v| v.as_deref()),
            self.emergency_full_name.as_ref().and_then(|v| v.as_deref()),
            self.emergency_relation.as_ref().and_then(|v| v.as_deref()),
        )?;

        if let Some(date_of_birth) = self.date_of_birth {
            patient.date_of_birth = date_of_birth;
        }
        if let Some(phone) = self.phone {
            patient.phone = phone.trim().to_string();
        }
        if let Some(email) = self.email {
            patient.email = email.trim().to_lowercase();
        }
        if let Some(photo_url) = self.photo_url {
            patient.photo_url = photo_url;
        }
        if let Some(address) = self.address {
            patient.address = address;
        }
        if let Some(weight_kg) = self.weight_kg {
            patient.weight_kg = Some(weight_kg);
        }
        if let Some(height_m) = self.height_m {
            patient.height_m = Some(height_m);
        }
        if let Some(past_history) = self.past_history {
            patient.past_history = past_history;
        }
        if let Some(allergies) = self.allergies {
            patient.allergies = allergies;
        }
        if let Some(accepted) = self.privacy_notice_accepted {
            patient.privacy_notice_accepted = accepted;
        }
        if let Some(accepted) = self.informed_consent_accepted {
            patient.informed_consent_accepted = accepted;
        }
        if let Some(name) = self.emergency_full_name {
            patient.emergency_full_name = name;
        }
        if let Some(phone) = self.emergency_phone {
            patient.emergency_phone = phone;
        }
        if let Some(relation) = self.emergency_relation {
            patient.emergency_relation = relation;
        }

        patient.past_history = Some(text_or_default(patient.past_history.take(), DEFAULT_PAST_HISTORY));
        patient.allergies = Some(text_or_default(patient.allergies.take(), DEFAULT_ALLERGIES));
        patient.recalc_age_and_bmi(today);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub name: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl PatientListQuery {
    /// Whitespace-separated name terms; each one must match first or last name.
    pub fn name_terms(&self) -> Vec<String> {
        self.name
            .as_deref()
            .or(self.q.as_deref())
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Inline patient data sent with an appointment or prescription instead of a `patient_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuickPatientPayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub treatments_of_interest: Option<String>,
    pub past_history: Option<String>,
    pub allergies: Option<String>,
    pub privacy_notice_accepted: Option<bool>,
    pub informed_consent_accepted: Option<bool>,
    pub emergency_full_name: Option<String>,
    pub emergency_phone: Option<String>,
    pub emergency_relation: Option<String>,
}

/// A validated patient that has not been written yet. It is persisted by the
/// same store transaction that writes the record referencing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PendingPatient {
    row: NewPatient,
}

impl PendingPatient {
    pub(crate) fn new(row: NewPatient) -> Self {
        Self { row }
    }

    pub fn row(&self) -> &NewPatient {
        &self.row
    }

    pub fn bmi(&self) -> Option<f64> {
        self.row.bmi
    }
}

/// How a parent record points at its patient.
#[derive(Debug, Clone, PartialEq)]
pub enum PatientRef {
    Existing(i64),
    Pending(PendingPatient),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConsultation {
    pub id: i64,
    pub title: String,
    pub datetime: DateTime<Utc>,
    pub notes: Option<String>,
    pub products: Option<String>,
    pub practitioner_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub consultation: HistoryConsultation,
    pub is_last: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientHistory {
    pub patient: PatientView,
    pub past_history: String,
    pub allergies: String,
    pub consultations: Vec<HistoryEntry>,
}

#[derive(Debug, Error)]
pub enum PatientError {
    #[error("Patient {0} not found")]
    NotFound(i64),

    #[error("Either patient_id or new_patient is required")]
    MissingReference,

    #[error("new_patient.{field} is required")]
    IncompleteQuickPatient { field: &'static str },

    #[error("Invalid date '{0}' (use YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Invalid value '{value}' for {field}")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error(transparent)]
    MalformedBoundary(#[from] TimeError),

    #[error("Patient already exists: {0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for PatientError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(msg) => PatientError::Conflict(msg),
            other => PatientError::Database(other),
        }
    }
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(_) => AppError::NotFound(err.to_string()),
            PatientError::MissingReference
            | PatientError::IncompleteQuickPatient { .. }
            | PatientError::InvalidDate(_)
            | PatientError::InvalidEnumValue { .. }
            | PatientError::MalformedBoundary(_) => AppError::BadRequest(err.to_string()),
            PatientError::Validation(msg) => AppError::ValidationError(msg),
            PatientError::Conflict(_) => AppError::Conflict(err.to_string()),
            PatientError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn age_is_floored_and_never_negative() {
        let dob = date("1990-05-17");
        assert_eq!(age_in_years(dob, date("2024-05-16")), 33);
        assert_eq!(age_in_years(dob, date("2024-05-17")), 34);
        assert_eq!(age_in_years(date("2030-01-01"), date("2024-05-17")), 0);
    }

    #[test]
    fn bmi_needs_both_positive_measurements() {
        assert_eq!(body_mass_index(Some(60.0), Some(1.65)), Some(22.0));
        assert_eq!(body_mass_index(Some(81.0), Some(1.8)), Some(25.0));
        assert_eq!(body_mass_index(Some(70.0), None), None);
        assert_eq!(body_mass_index(Some(70.0), Some(0.0)), None);
        assert_eq!(body_mass_index(Some(0.0), Some(1.7)), None);
    }

    #[test]
    fn sex_is_case_normalized() {
        assert_eq!(" f ".parse::<Sex>(), Ok(Sex::Female));
        assert_eq!("m".parse::<Sex>(), Ok(Sex::Male));
        assert!("x".parse::<Sex>().is_err());
        assert_eq!(serde_json::to_value(Sex::Other).unwrap(), "O");
    }

    #[test]
    fn display_id_is_zero_padded() {
        let mut patient: Patient = serde_json::from_value(serde_json::json!({
            "id": 7, "first_name": "Ana", "last_name": "Ruiz", "date_of_birth": "1990-01-01",
            "sex": "F", "phone": "1", "email": "a@b.c", "photo_url": null, "address": null,
            "weight_kg": null, "height_m": null, "bmi": null, "age_years": null,
            "past_history": null, "allergies": null, "treatments_of_interest": null,
            "privacy_notice_accepted": false, "informed_consent_accepted": false,
            "emergency_full_name": null, "emergency_phone": null, "emergency_relation": null,
            "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(patient.display_id(), "P-0007");

        let update = UpdatePatientRequest {
            weight_kg: Some(60.0),
            height_m: Some(1.65),
            allergies: Some(Some("  ".to_string())),
            ..Default::default()
        };
        update.apply_to(&mut patient, date("2024-06-01")).unwrap();
        assert_eq!(patient.bmi, Some(22.0));
        assert_eq!(patient.age_years, Some(34));
        assert_eq!(patient.allergies.as_deref(), Some(DEFAULT_ALLERGIES));
        assert_eq!(patient.past_history.as_deref(), Some(DEFAULT_PAST_HISTORY));
    }

    #[test]
    fn create_request_applies_defaults_and_checks_ranges() {
        let request: CreatePatientRequest = serde_json::from_value(serde_json::json!({
            "first_name": " Ana ", "last_name": "Ruiz", "date_of_birth": "1990-05-17",
            "sex": "f", "phone": " 5512345678 ", "email": " Ana@Example.COM ",
            "weight_kg": 60.0, "height_m": 1.65, "treatments_of_interest": "Facial",
            "privacy_notice_accepted": true, "informed_consent_accepted": true
        }))
        .unwrap();

        let row = request.clone().into_new_patient(date("2024-06-01")).unwrap();
        assert_eq!(row.first_name, "Ana");
        assert_eq!(row.email, "ana@example.com");
        assert_eq!(row.phone, "5512345678");
        assert_eq!(row.past_history, DEFAULT_PAST_HISTORY);
        assert_eq!(row.age_years, 34);

        let mut heavy = request;
        heavy.weight_kg = 501.0;
        assert_matches!(heavy.into_new_patient(date("2024-06-01")), Err(PatientError::Validation(_)));
    }

    #[test]
    fn name_terms_split_on_whitespace() {
        let query = PatientListQuery {
            q: Some("  ana   ruiz ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.name_terms(), vec!["ana", "ruiz"]);
    }
}
