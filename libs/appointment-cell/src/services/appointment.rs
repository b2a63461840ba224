use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use patient_cell::models::PatientRef;
use patient_cell::services::{PatientService, QuickPatientProvisioner};
use shared_config::AppConfig;
use shared_database::query::{ilike_any, PostgrestQuery};
use shared_database::{DatabaseError, SupabaseClient};
use shared_utils::time::{format_utc, ClinicTimezone, RangeEdge};
use shared_utils::validation::{check_length, check_optional_length};

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, AppointmentType,
    CreateAppointmentRequest, NewAppointment, Schedule, TimeWindow, UpdateAppointmentRequest,
};

const CREATE_WITH_PATIENT_FN: &str = "create_appointment_with_patient";

pub struct AppointmentService {
    supabase: SupabaseClient,
    patients: PatientService,
    provisioner: QuickPatientProvisioner,
    clock: ClinicTimezone,
}

impl AppointmentService {
    pub fn new(config: &AppConfig) -> Self {
        let clock = ClinicTimezone::new(config.clinic_timezone);
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
            provisioner: QuickPatientProvisioner::new(clock),
            clock,
        }
    }

    /// Create an appointment for an existing patient or for a patient supplied inline.
    ///
    /// Every validation runs before the first write. An inline patient is inserted by
    /// the same database function as the appointment, so both rows commit or neither does.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let title = request.title.trim().to_string();
        check_length("title", &title, 1, 200).map_err(AppointmentError::Validation)?;
        check_texts(request.treatment.as_deref(), request.notes.as_deref())?;

        let status = match request.status.as_deref() {
            Some(raw) => raw.parse::<AppointmentStatus>()?,
            None => AppointmentStatus::default(),
        };
        let appointment_type = match request.appointment_type.as_deref() {
            Some(raw) => raw.parse::<AppointmentType>()?,
            None => AppointmentType::default(),
        };

        let schedule = Schedule::new(self.clock.to_utc(request.start_at), request.duration_min)?;
        let patient = self
            .provisioner
            .resolve(request.patient_id, request.new_patient.as_ref())?;

        let mut row = NewAppointment {
            patient_id: None,
            practitioner_id: request.practitioner_id,
            title,
            start_at: format_utc(schedule.start_at),
            end_at: format_utc(schedule.end_at),
            duration_min: schedule.duration_min,
            status,
            appointment_type,
            treatment: request.treatment,
            notes: request.notes,
        };

        let appointment = match patient {
            PatientRef::Existing(patient_id) => {
                if self.patients.find_patient(patient_id, auth_token).await?.is_none() {
                    warn!("Appointment rejected, patient {} does not exist", patient_id);
                    return Err(AppointmentError::ReferenceNotFound(format!(
                        "Patient {} not found",
                        patient_id
                    )));
                }
                row.patient_id = Some(patient_id);

                debug!("Creating appointment for patient {} at {}", patient_id, row.start_at);
                let rows: Vec<Appointment> = self
                    .supabase
                    .request_returning(Method::POST, "/rest/v1/appointments", Some(auth_token), Some(json!(row)))
                    .await?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| {
                        AppointmentError::Database(DatabaseError::NotFound(
                            "appointment insert returned no rows".to_string(),
                        ))
                    })?
            }
            PatientRef::Pending(pending) => {
                debug!("Creating appointment with new patient {}", pending.row().email);
                self.supabase
                    .rpc(
                        CREATE_WITH_PATIENT_FN,
                        Some(auth_token),
                        json!({ "patient": pending, "appointment": row }),
                    )
                    .await?
            }
        };

        info!(
            "Appointment {} created for patient {} ({} - {})",
            appointment.id, appointment.patient_id, appointment.start_at, appointment.end_at
        );
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);

        let path = PostgrestQuery::table("appointments")
            .select("*")
            .eq("id", appointment_id)
            .limit(1)
            .build();

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter()
            .next()
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    /// Partial update. Fields absent from the request are left untouched and
    /// `end_at` is re-derived whenever the start or the duration moves.
    pub async fn update_appointment(
        &self,
        appointment_id: i64,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut changes = Map::new();

        if let Some(title) = request.title.as_deref() {
            let title = title.trim();
            check_length("title", title, 1, 200).map_err(AppointmentError::Validation)?;
            changes.insert("title".to_string(), json!(title));
        }
        check_texts(
            request.treatment.as_ref().and_then(|t| t.as_deref()),
            request.notes.as_ref().and_then(|n| n.as_deref()),
        )?;
        if let Some(raw) = request.status.as_deref() {
            changes.insert("status".to_string(), json!(raw.parse::<AppointmentStatus>()?));
        }
        if let Some(raw) = request.appointment_type.as_deref() {
            changes.insert("appointment_type".to_string(), json!(raw.parse::<AppointmentType>()?));
        }
        if let Some(practitioner_id) = request.practitioner_id {
            changes.insert("practitioner_id".to_string(), json!(practitioner_id));
        }
        if let Some(treatment) = request.treatment {
            changes.insert("treatment".to_string(), json!(treatment));
        }
        if let Some(notes) = request.notes {
            changes.insert("notes".to_string(), json!(notes));
        }

        let existing = self.get_appointment(appointment_id, auth_token).await?;

        let new_start = request.start_at.map(|instant| self.clock.to_utc(instant));
        if let Some(schedule) = existing.schedule().reschedule(new_start, request.duration_min)? {
            changes.insert("start_at".to_string(), json!(format_utc(schedule.start_at)));
            changes.insert("end_at".to_string(), json!(format_utc(schedule.end_at)));
            changes.insert("duration_min".to_string(), json!(schedule.duration_min));
        }

        changes.insert("updated_at".to_string(), json!(format_utc(Utc::now())));

        debug!("Updating appointment {} fields: {:?}", appointment_id, changes.keys().collect::<Vec<_>>());

        let path = PostgrestQuery::table("appointments").eq("id", appointment_id).build();
        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Some(Value::Object(changes)))
            .await?;

        let updated = rows
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        info!("Appointment {} updated", appointment_id);
        Ok(updated)
    }

    pub async fn delete_appointment(
        &self,
        appointment_id: i64,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = PostgrestQuery::table("appointments").eq("id", appointment_id).build();
        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::DELETE, &path, Some(auth_token), None)
            .await?;

        if rows.is_empty() {
            return Err(AppointmentError::NotFound(appointment_id));
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Appointments whose interval intersects the window, earliest first.
    pub async fn query_overlapping(
        &self,
        query: AppointmentQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let window = self.resolve_window(&query)?;

        let status = query
            .status
            .as_deref()
            .map(str::parse::<AppointmentStatus>)
            .transpose()?;

        let mut request = PostgrestQuery::table("appointments");
        request = match query.name_filter() {
            Some(name) => request
                .select("*,patients!inner(first_name,last_name)")
                .param("patients.or", &ilike_any(&["first_name", "last_name"], name)),
            None => request.select("*"),
        };

        request = request
            .filter("start_at", "lte", format_utc(window.end))
            .filter("end_at", "gte", format_utc(window.start));

        if let Some(doctor_id) = query.doctor_id {
            request = request.eq("practitioner_id", doctor_id);
        }
        if let Some(status) = status {
            request = request.eq("status", status);
        }

        let path = request.order("start_at.asc,id.asc").build();
        debug!("Querying appointments between {} and {}", window.start, window.end);

        let appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(appointments)
    }

    fn resolve_window(&self, query: &AppointmentQuery) -> Result<TimeWindow, AppointmentError> {
        let (start, end) = match (query.start.as_deref(), query.end.as_deref()) {
            (Some(start), Some(end)) if !start.trim().is_empty() && !end.trim().is_empty() => (start, end),
            _ => return Err(AppointmentError::MissingWindow),
        };

        Ok(TimeWindow::new(
            self.clock.resolve_boundary(start, RangeEdge::Start)?,
            self.clock.resolve_boundary(end, RangeEdge::End)?,
        ))
    }
}

fn check_texts(treatment: Option<&str>, notes: Option<&str>) -> Result<(), AppointmentError> {
    check_optional_length("treatment", treatment, 300)
        .and_then(|_| check_optional_length("notes", notes, 4000))
        .map_err(AppointmentError::Validation)
}
