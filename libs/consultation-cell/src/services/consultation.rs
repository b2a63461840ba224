use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use patient_cell::services::PatientService;
use shared_config::AppConfig;
use shared_database::query::{ilike_any, PostgrestQuery};
use shared_database::{DatabaseError, SupabaseClient};
use shared_models::pagination::{Page, PageParams};
use shared_utils::time::{format_utc, ClinicTimezone, RangeEdge};

use crate::models::{
    Consultation, ConsultationError, ConsultationListQuery, CreateConsultationRequest,
    UpdateConsultationRequest,
};

pub struct ConsultationService {
    supabase: SupabaseClient,
    patients: PatientService,
    clock: ClinicTimezone,
}

impl ConsultationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
            clock: ClinicTimezone::new(config.clinic_timezone),
        }
    }

    pub async fn create_consultation(
        &self,
        request: CreateConsultationRequest,
        auth_token: &str,
    ) -> Result<Consultation, ConsultationError> {
        request.validate()?;

        if self.patients.find_patient(request.patient_id, auth_token).await?.is_none() {
            warn!("Consultation rejected, patient {} does not exist", request.patient_id);
            return Err(ConsultationError::ReferenceNotFound(format!(
                "Patient {} not found",
                request.patient_id
            )));
        }

        let row = json!({
            "patient_id": request.patient_id,
            "practitioner_id": request.practitioner_id,
            "title": request.title.trim(),
            "datetime": format_utc(self.clock.to_utc(request.datetime)),
            "notes": request.notes,
            "products": request.products,
        });

        let rows: Vec<Consultation> = self
            .supabase
            .request_returning(Method::POST, "/rest/v1/consultations", Some(auth_token), Some(row))
            .await?;

        let consultation = rows.into_iter().next().ok_or_else(|| {
            ConsultationError::Database(DatabaseError::NotFound(
                "consultation insert returned no rows".to_string(),
            ))
        })?;

        info!("Consultation {} created for patient {}", consultation.id, consultation.patient_id);
        Ok(consultation)
    }

    pub async fn get_consultation(
        &self,
        consultation_id: i64,
        auth_token: &str,
    ) -> Result<Consultation, ConsultationError> {
        let path = PostgrestQuery::table("consultations")
            .select("*")
            .eq("id", consultation_id)
            .limit(1)
            .build();

        let rows: Vec<Consultation> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter()
            .next()
            .ok_or(ConsultationError::NotFound(consultation_id))
    }

    /// Newest first. `from`/`to` accept a bare date (whole local day) or an instant.
    pub async fn list_consultations(
        &self,
        query: ConsultationListQuery,
        auth_token: &str,
    ) -> Result<Page<Consultation>, ConsultationError> {
        debug!("Listing consultations with query: {:?}", query);

        let paging = PageParams {
            page: query.page,
            page_size: query.page_size,
        };

        let mut request = PostgrestQuery::table("consultations");
        request = match query.name_filter() {
            Some(name) => request
                .select("*,patients!inner(first_name,last_name)")
                .param("patients.or", &ilike_any(&["first_name", "last_name"], name)),
            None => request.select("*"),
        };

        if let Some(from) = query.from.as_deref() {
            let from = self.clock.resolve_boundary(from, RangeEdge::Start)?;
            request = request.filter("datetime", "gte", format_utc(from));
        }
        if let Some(to) = query.to.as_deref() {
            let to = self.clock.resolve_boundary(to, RangeEdge::End)?;
            request = request.filter("datetime", "lte", format_utc(to));
        }

        let path = request
            .order("datetime.desc,id.desc")
            .limit(paging.page_size())
            .offset(paging.offset())
            .build();

        let (items, total): (Vec<Consultation>, _) = self
            .supabase
            .request_with_count(&path, Some(auth_token))
            .await?;

        Ok(Page::new(items, paging, total))
    }

    pub async fn update_consultation(
        &self,
        consultation_id: i64,
        request: UpdateConsultationRequest,
        auth_token: &str,
    ) -> Result<Consultation, ConsultationError> {
        request.validate()?;

        let mut changes = Map::new();
        if let Some(practitioner_id) = request.practitioner_id {
            changes.insert("practitioner_id".to_string(), json!(practitioner_id));
        }
        if let Some(title) = request.title.as_deref() {
            changes.insert("title".to_string(), json!(title.trim()));
        }
        if let Some(datetime) = request.datetime {
            changes.insert("datetime".to_string(), json!(format_utc(self.clock.to_utc(datetime))));
        }
        if let Some(notes) = request.notes {
            changes.insert("notes".to_string(), json!(notes));
        }
        if let Some(products) = request.products {
            changes.insert("products".to_string(), json!(products));
        }
        changes.insert("updated_at".to_string(), json!(format_utc(Utc::now())));

        let path = PostgrestQuery::table("consultations").eq("id", consultation_id).build();
        let rows: Vec<Consultation> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Some(Value::Object(changes)))
            .await?;

        let updated = rows
            .into_iter()
            .next()
            .ok_or(ConsultationError::NotFound(consultation_id))?;

        info!("Consultation {} updated", consultation_id);
        Ok(updated)
    }

    pub async fn delete_consultation(
        &self,
        consultation_id: i64,
        auth_token: &str,
    ) -> Result<(), ConsultationError> {
        let path = PostgrestQuery::table("consultations").eq("id", consultation_id).build();
        let rows: Vec<Consultation> = self
            .supabase
            .request_returning(Method::DELETE, &path, Some(auth_token), None)
            .await?;

        if rows.is_empty() {
            return Err(ConsultationError::NotFound(consultation_id));
        }

        info!("Consultation {} deleted", consultation_id);
        Ok(())
    }
}
