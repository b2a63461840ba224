use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, DEFAULT_CLINIC_TIMEZONE};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            clinic_timezone: DEFAULT_CLINIC_TIMEZONE,
            cors_origins: vec!["http://localhost:3000".to_string()],
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("staff@clinic.test", "doctor")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn manager(email: &str) -> Self {
        Self::new(email, "manager")
    }

    pub fn nurse(email: &str) -> Self {
        Self::new(email, "nurse")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Mints a Supabase-shaped token: the top-level role is `authenticated` and the
    /// staff role travels in `app_metadata`.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "aud": "authenticated",
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// PostgREST row fixtures in the shape the clinic tables return.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_row(id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "first_name": "Ana",
            "last_name": "García",
            "date_of_birth": "1990-05-17",
            "sex": "F",
            "phone": "5512345678",
            "email": "ana@example.com",
            "photo_url": null,
            "address": null,
            "weight_kg": 60.0,
            "height_m": 1.65,
            "bmi": 22.0,
            "age_years": 34,
            "past_history": "No pathological history",
            "allergies": "No known allergies",
            "treatments_of_interest": "Facial",
            "privacy_notice_accepted": true,
            "informed_consent_accepted": true,
            "emergency_full_name": null,
            "emergency_phone": null,
            "emergency_relation": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(id: i64, patient_id: i64, start_at: &str, end_at: &str, duration_min: i64) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "practitioner_id": null,
            "title": "Consulta",
            "start_at": start_at,
            "end_at": end_at,
            "duration_min": duration_min,
            "status": "pending",
            "appointment_type": "consultation",
            "treatment": null,
            "notes": null,
            "created_at": "2024-03-01T00:00:00Z",
            "updated_at": "2024-03-01T00:00:00Z"
        })
    }

    pub fn consultation_row(id: i64, patient_id: i64, datetime: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "practitioner_id": null,
            "title": "Valoración",
            "datetime": datetime,
            "notes": null,
            "products": null,
            "created_at": "2024-03-01T00:00:00Z",
            "updated_at": "2024-03-01T00:00:00Z"
        })
    }

    pub fn prescription_row(id: i64, patient_id: i64, issued_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "consultation_id": null,
            "practitioner_id": null,
            "issued_at": issued_at,
            "temp_c": null,
            "bp_sys": null,
            "bp_dia": null,
            "heart_rate": null,
            "resp_rate": null,
            "bmi": 22.0,
            "spo2": null,
            "diagnosis": null,
            "prescription_text": null,
            "care_instructions": null,
            "products": null,
            "created_at": "2024-03-01T00:00:00Z",
            "updated_at": "2024-03-01T00:00:00Z"
        })
    }

    /// PostgREST error body, e.g. `("23505", "duplicate key value ...")`.
    pub fn error_response(code: &str, message: &str) -> serde_json::Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
