use chrono::NaiveDate;
use tracing::{debug, warn};

use shared_utils::time::{ClientInstant, ClinicTimezone};

use crate::models::{
    age_in_years, body_mass_index, text_or_default, NewPatient, PatientError, PatientRef,
    PendingPatient, QuickPatientPayload, Sex, DEFAULT_ALLERGIES, DEFAULT_PAST_HISTORY,
};

/// Builds minimal patients from inline payloads.
///
/// Nothing is written here: the returned [`PendingPatient`] is handed to the
/// parent service, which stores it together with its own row.
#[derive(Debug, Clone, Copy)]
pub struct QuickPatientProvisioner {
    clock: ClinicTimezone,
}

impl QuickPatientProvisioner {
    pub fn new(clock: ClinicTimezone) -> Self {
        Self { clock }
    }

    /// Pick the patient a new record points at. An explicit id wins over an inline payload.
    pub fn resolve(
        &self,
        patient_id: Option<i64>,
        new_patient: Option<&QuickPatientPayload>,
    ) -> Result<PatientRef, PatientError> {
        match (patient_id, new_patient) {
            (Some(id), _) => Ok(PatientRef::Existing(id)),
            (None, Some(payload)) => self.provision(payload).map(PatientRef::Pending),
            (None, None) => Err(PatientError::MissingReference),
        }
    }

    pub fn provision(&self, payload: &QuickPatientPayload) -> Result<PendingPatient, PatientError> {
        let required = [
            ("first_name", &payload.first_name),
            ("last_name", &payload.last_name),
            ("date_of_birth", &payload.date_of_birth),
            ("sex", &payload.sex),
            ("phone", &payload.phone),
            ("email", &payload.email),
        ];
        for (field, value) in required {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                warn!("Quick patient rejected, missing {}", field);
                return Err(PatientError::IncompleteQuickPatient { field });
            }
        }

        let raw_dob = payload.date_of_birth.as_deref().unwrap_or_default();
        let date_of_birth = parse_birth_date(raw_dob)?;

        let raw_sex = payload.sex.as_deref().unwrap_or_default();
        let sex = raw_sex.parse::<Sex>().map_err(|_| PatientError::InvalidEnumValue {
            field: "new_patient.sex",
            value: raw_sex.to_string(),
        })?;

        let row = NewPatient {
            first_name: trimmed(&payload.first_name),
            last_name: trimmed(&payload.last_name),
            date_of_birth,
            sex,
            phone: trimmed(&payload.phone),
            email: trimmed(&payload.email).to_lowercase(),
            photo_url: None,
            address: None,
            weight_kg: payload.weight_kg,
            height_m: payload.height_m,
            bmi: body_mass_index(payload.weight_kg, payload.height_m),
            age_years: age_in_years(date_of_birth, self.clock.today()),
            past_history: text_or_default(payload.past_history.clone(), DEFAULT_PAST_HISTORY),
            allergies: text_or_default(payload.allergies.clone(), DEFAULT_ALLERGIES),
            treatments_of_interest: payload.treatments_of_interest.clone().unwrap_or_default(),
            privacy_notice_accepted: payload.privacy_notice_accepted.unwrap_or(false),
            informed_consent_accepted: payload.informed_consent_accepted.unwrap_or(false),
            emergency_full_name: payload.emergency_full_name.clone(),
            emergency_phone: payload.emergency_phone.clone(),
            emergency_relation: payload.emergency_relation.clone(),
        };

        debug!("Quick patient staged for {}", row.email);
        Ok(PendingPatient::new(row))
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().unwrap_or_default().trim().to_string()
}

/// `YYYY-MM-DD`, or any ISO-8601 date-time whose calendar date is taken as-is.
fn parse_birth_date(raw: &str) -> Result<NaiveDate, PatientError> {
    let value = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    match value.parse::<ClientInstant>() {
        Ok(ClientInstant::Naive(naive)) => Ok(naive.date()),
        Ok(ClientInstant::Aware(aware)) => Ok(aware.date_naive()),
        Err(_) => Err(PatientError::InvalidDate(raw.to_string())),
    }
}
