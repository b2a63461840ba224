use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::query::{ilike_any, PostgrestQuery};
use shared_database::{DatabaseError, SupabaseClient};
use shared_models::pagination::{Page, PageParams};
use shared_utils::time::{format_utc, ClinicTimezone, RangeEdge};

use crate::models::{
    CreatePatientRequest, HistoryConsultation, HistoryEntry, Patient, PatientError,
    PatientHistory, PatientListQuery, PatientView, UpdatePatientRequest, DEFAULT_ALLERGIES,
    DEFAULT_PAST_HISTORY,
};

const NAME_COLUMNS: &[&str] = &["first_name", "last_name"];

pub struct PatientService {
    supabase: SupabaseClient,
    clock: ClinicTimezone,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            clock: ClinicTimezone::new(config.clinic_timezone),
        }
    }

    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let row = request.into_new_patient(self.clock.today())?;
        debug!("Creating patient {}", row.email);

        let rows: Vec<Patient> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/patients", Some(auth_token), Some(json!(row)))
            .await?;

        let patient = first_row(rows, "patient insert")?;
        info!("Patient {} created", patient.id);
        Ok(patient)
    }

    /// `None` when no patient has this id.
    pub async fn find_patient(
        &self,
        patient_id: i64,
        auth_token: &str,
    ) -> Result<Option<Patient>, PatientError> {
        let path = PostgrestQuery::table("patients")
            .select("*")
            .eq("id", patient_id)
            .limit(1)
            .build();

        let rows: Vec<Patient> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows.into_iter().next())
    }

    pub async fn get_patient(&self, patient_id: i64, auth_token: &str) -> Result<Patient, PatientError> {
        debug!("Fetching patient {}", patient_id);

        self.find_patient(patient_id, auth_token)
            .await?
            .ok_or(PatientError::NotFound(patient_id))
    }

    pub async fn list_patients(
        &self,
        query: PatientListQuery,
        auth_token: &str,
    ) -> Result<Page<PatientView>, PatientError> {
        debug!("Listing patients with query: {:?}", query);

        let paging = PageParams {
            page: query.page,
            page_size: query.page_size,
        };

        let mut request = PostgrestQuery::table("patients").select("*");

        let terms = query.name_terms();
        match terms.as_slice() {
            [] => {}
            [term] => request = request.param("or", &ilike_any(NAME_COLUMNS, term)),
            many => {
                let clauses = many
                    .iter()
                    .map(|term| format!("or{}", ilike_any(NAME_COLUMNS, term)))
                    .collect::<Vec<_>>()
                    .join(",");
                request = request.param("and", &format!("({})", clauses));
            }
        }

        if let Some(from) = query.from.as_deref() {
            let from = self.clock.resolve_boundary(from, RangeEdge::Start)?;
            request = request.filter("created_at", "gte", format_utc(from));
        }
        if let Some(to) = query.to.as_deref() {
            let to = self.clock.resolve_boundary(to, RangeEdge::End)?;
            request = request.filter("created_at", "lte", format_utc(to));
        }

        let path = request
            .order("id.desc")
            .limit(paging.page_size())
            .offset(paging.offset())
            .build();

        let (rows, total): (Vec<Patient>, _) = self
            .supabase
            .request_with_count(&path, Some(auth_token))
            .await?;

        let items = rows.into_iter().map(PatientView::from).collect();
        Ok(Page::new(items, paging, total))
    }

    pub async fn update_patient(
        &self,
        patient_id: i64,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient {}", patient_id);

        let mut patient = self.get_patient(patient_id, auth_token).await?;
        request.apply_to(&mut patient, self.clock.today())?;

        let changes = json!({
            "first_name": patient.first_name,
            "last_name": patient.last_name,
            "date_of_birth": patient.date_of_birth,
            "sex": patient.sex,
            "phone": patient.phone,
            "email": patient.email,
            "photo_url": patient.photo_url,
            "address": patient.address,
            "weight_kg": patient.weight_kg,
            "height_m": patient.height_m,
            "bmi": patient.bmi,
            "age_years": patient.age_years,
            "past_history": patient.past_history,
            "allergies": patient.allergies,
            "treatments_of_interest": patient.treatments_of_interest,
            "privacy_notice_accepted": patient.privacy_notice_accepted,
            "informed_consent_accepted": patient.informed_consent_accepted,
            "emergency_full_name": patient.emergency_full_name,
            "emergency_phone": patient.emergency_phone,
            "emergency_relation": patient.emergency_relation,
            "updated_at": format_utc(Utc::now()),
        });

        let path = PostgrestQuery::table("patients").eq("id", patient_id).build();
        let rows: Vec<Patient> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Some(changes))
            .await?;

        let updated = rows.into_iter().next().ok_or(PatientError::NotFound(patient_id))?;
        info!("Patient {} updated", patient_id);
        Ok(updated)
    }

    /// Hard delete. Consultations, prescriptions and appointments go with the patient.
    pub async fn delete_patient(&self, patient_id: i64, auth_token: &str) -> Result<(), PatientError> {
        let path = PostgrestQuery::table("patients").eq("id", patient_id).build();
        let rows: Vec<Patient> = self
            .supabase
            .request_returning(Method::DELETE, &path, Some(auth_token), None)
            .await?;

        if rows.is_empty() {
            return Err(PatientError::NotFound(patient_id));
        }

        info!("Patient {} deleted", patient_id);
        Ok(())
    }

    pub async fn patient_history(
        &self,
        patient_id: i64,
        auth_token: &str,
    ) -> Result<PatientHistory, PatientError> {
        let patient = self.get_patient(patient_id, auth_token).await?;

        let path = PostgrestQuery::table("consultations")
            .select("id,title,datetime,notes,products,practitioner_id")
            .eq("patient_id", patient_id)
            .order("datetime.desc,id.desc")
            .build();

        let consultations: Vec<HistoryConsultation> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let consultations = consultations
            .into_iter()
            .enumerate()
            .map(|(i, consultation)| HistoryEntry {
                consultation,
                is_last: i == 0,
            })
            .collect();

        Ok(PatientHistory {
            past_history: non_blank(patient.past_history.as_deref(), DEFAULT_PAST_HISTORY),
            allergies: non_blank(patient.allergies.as_deref(), DEFAULT_ALLERGIES),
            patient: patient.into(),
            consultations,
        })
    }
}

fn non_blank(value: Option<&str>, default: &str) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => default.to_string(),
    }
}

fn first_row(rows: Vec<Patient>, what: &str) -> Result<Patient, PatientError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| PatientError::Database(DatabaseError::NotFound(format!("{} returned no rows", what))))
}
