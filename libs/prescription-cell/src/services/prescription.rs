use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use consultation_cell::models::ConsultationError;
use consultation_cell::services::ConsultationService;
use patient_cell::models::PatientRef;
use patient_cell::services::{PatientService, QuickPatientProvisioner};
use shared_config::AppConfig;
use shared_database::query::PostgrestQuery;
use shared_database::{DatabaseError, SupabaseClient};
use shared_models::pagination::{Page, PageParams};
use shared_utils::time::{format_utc, ClinicTimezone};

use crate::models::{
    CreatePrescriptionRequest, NewPrescription, Prescription, PrescriptionError,
    PrescriptionListQuery, UpdatePrescriptionRequest,
};

const CREATE_WITH_PATIENT_FN: &str = "create_prescription_with_patient";

pub struct PrescriptionService {
    supabase: SupabaseClient,
    patients: PatientService,
    consultations: ConsultationService,
    provisioner: QuickPatientProvisioner,
    clock: ClinicTimezone,
}

impl PrescriptionService {
    pub fn new(config: &AppConfig) -> Self {
        let clock = ClinicTimezone::new(config.clinic_timezone);
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
            consultations: ConsultationService::new(config),
            provisioner: QuickPatientProvisioner::new(clock),
            clock,
        }
    }

    /// Issue a prescription for an existing patient or for one supplied inline.
    ///
    /// `issued_at` falls back to the current clinic time and `bmi` to the
    /// patient's. A linked consultation has to belong to the same patient.
    pub async fn create_prescription(
        &self,
        request: CreatePrescriptionRequest,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        request.validate()?;

        let patient = self
            .provisioner
            .resolve(request.patient_id, request.new_patient.as_ref())?;

        let issued_at = match request.issued_at {
            Some(instant) => self.clock.to_utc(instant),
            None => self.clock.now_local().with_timezone(&Utc),
        };

        let mut row = NewPrescription {
            patient_id: None,
            consultation_id: request.consultation_id,
            practitioner_id: request.practitioner_id,
            issued_at: format_utc(issued_at),
            vitals: request.vitals,
            diagnosis: request.diagnosis,
            prescription_text: request.prescription_text,
            care_instructions: request.care_instructions,
            products: request.products,
        };

        let prescription = match patient {
            PatientRef::Existing(patient_id) => {
                let patient = self.patients.find_patient(patient_id, auth_token).await?.ok_or_else(|| {
                    warn!("Prescription rejected, patient {} does not exist", patient_id);
                    PrescriptionError::ReferenceNotFound(format!("Patient {} not found", patient_id))
                })?;

                if let Some(consultation_id) = row.consultation_id {
                    self.check_consultation(consultation_id, patient_id, auth_token).await?;
                }

                row.patient_id = Some(patient_id);
                if row.vitals.bmi.is_none() {
                    row.vitals.bmi = patient.bmi;
                }

                debug!("Creating prescription for patient {} at {}", patient_id, row.issued_at);
                let rows: Vec<Prescription> = self
                    .supabase
                    .request_returning(Method::POST, "/rest/v1/prescriptions", Some(auth_token), Some(json!(row)))
                    .await?;
                rows.into_iter().next().ok_or_else(|| {
                    PrescriptionError::Database(DatabaseError::NotFound(
                        "prescription insert returned no rows".to_string(),
                    ))
                })?
            }
            PatientRef::Pending(pending) => {
                // A patient that does not exist yet cannot own a consultation.
                if let Some(consultation_id) = row.consultation_id {
                    warn!("Prescription rejected, consultation {} given with a new patient", consultation_id);
                    return Err(PrescriptionError::ReferenceNotFound(format!(
                        "Consultation {} does not belong to this patient",
                        consultation_id
                    )));
                }
                if row.vitals.bmi.is_none() {
                    row.vitals.bmi = pending.bmi();
                }

                debug!("Creating prescription with new patient {}", pending.row().email);
                self.supabase
                    .rpc(
                        CREATE_WITH_PATIENT_FN,
                        Some(auth_token),
                        json!({ "patient": pending, "prescription": row }),
                    )
                    .await?
            }
        };

        info!(
            "Prescription {} issued for patient {} at {}",
            prescription.id, prescription.patient_id, prescription.issued_at
        );
        Ok(prescription)
    }

    async fn check_consultation(
        &self,
        consultation_id: i64,
        patient_id: i64,
        auth_token: &str,
    ) -> Result<(), PrescriptionError> {
        let consultation = match self.consultations.get_consultation(consultation_id, auth_token).await {
            Ok(consultation) => consultation,
            Err(ConsultationError::NotFound(_)) => {
                return Err(PrescriptionError::ReferenceNotFound(format!(
                    "Consultation {} not found",
                    consultation_id
                )))
            }
            Err(ConsultationError::Database(e)) => return Err(PrescriptionError::Database(e)),
            Err(other) => return Err(PrescriptionError::Validation(other.to_string())),
        };

        if consultation.patient_id != patient_id {
            warn!(
                "Consultation {} belongs to patient {}, not {}",
                consultation_id, consultation.patient_id, patient_id
            );
            return Err(PrescriptionError::ReferenceNotFound(format!(
                "Consultation {} does not belong to this patient",
                consultation_id
            )));
        }
        Ok(())
    }

    pub async fn get_prescription(
        &self,
        prescription_id: i64,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        let path = PostgrestQuery::table("prescriptions")
            .select("*")
            .eq("id", prescription_id)
            .limit(1)
            .build();

        let rows: Vec<Prescription> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter()
            .next()
            .ok_or(PrescriptionError::NotFound(prescription_id))
    }

    /// Newest first, optionally for one patient.
    pub async fn list_prescriptions(
        &self,
        query: PrescriptionListQuery,
        auth_token: &str,
    ) -> Result<Page<Prescription>, PrescriptionError> {
        debug!("Listing prescriptions with query: {:?}", query);

        let paging = PageParams {
            page: query.page,
            page_size: query.page_size,
        };

        let mut request = PostgrestQuery::table("prescriptions").select("*");
        if let Some(patient_id) = query.patient_id {
            request = request.eq("patient_id", patient_id);
        }

        let path = request
            .order("issued_at.desc,id.desc")
            .limit(paging.page_size())
            .offset(paging.offset())
            .build();

        let (items, total): (Vec<Prescription>, _) = self
            .supabase
            .request_with_count(&path, Some(auth_token))
            .await?;

        Ok(Page::new(items, paging, total))
    }

    pub async fn update_prescription(
        &self,
        prescription_id: i64,
        request: UpdatePrescriptionRequest,
        auth_token: &str,
    ) -> Result<Prescription, PrescriptionError> {
        request.validate()?;

        let mut changes = Map::new();
        let mut set = |column: &str, value: Value| {
            changes.insert(column.to_string(), value);
        };

        if let Some(issued_at) = request.issued_at {
            set("issued_at", json!(format_utc(self.clock.to_utc(issued_at))));
        }
        if let Some(v) = request.practitioner_id {
            set("practitioner_id", json!(v));
        }
        if let Some(v) = request.temp_c {
            set("temp_c", json!(v));
        }
        if let Some(v) = request.bp_sys {
            set("bp_sys", json!(v));
        }
        if let Some(v) = request.bp_dia {
            set("bp_dia", json!(v));
        }
        if let Some(v) = request.heart_rate {
            set("heart_rate", json!(v));
        }
        if let Some(v) = request.resp_rate {
            set("resp_rate", json!(v));
        }
        if let Some(v) = request.bmi {
            set("bmi", json!(v));
        }
        if let Some(v) = request.spo2 {
            set("spo2", json!(v));
        }
        if let Some(v) = request.diagnosis {
            set("diagnosis", json!(v));
        }
        if let Some(v) = request.prescription_text {
            set("prescription_text", json!(v));
        }
        if let Some(v) = request.care_instructions {
            set("care_instructions", json!(v));
        }
        if let Some(v) = request.products {
            set("products", json!(v));
        }
        set("updated_at", json!(format_utc(Utc::now())));

        let path = PostgrestQuery::table("prescriptions").eq("id", prescription_id).build();
        let rows: Vec<Prescription> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Some(Value::Object(changes)))
            .await?;

        let updated = rows
            .into_iter()
            .next()
            .ok_or(PrescriptionError::NotFound(prescription_id))?;

        info!("Prescription {} updated", prescription_id);
        Ok(updated)
    }

    pub async fn delete_prescription(
        &self,
        prescription_id: i64,
        auth_token: &str,
    ) -> Result<(), PrescriptionError> {
        let path = PostgrestQuery::table("prescriptions").eq("id", prescription_id).build();
        let rows: Vec<Prescription> = self
            .supabase
            .request_returning(Method::DELETE, &path, Some(auth_token), None)
            .await?;

        if rows.is_empty() {
            return Err(PrescriptionError::NotFound(prescription_id));
        }

        info!("Prescription {} deleted", prescription_id);
        Ok(())
    }
}
