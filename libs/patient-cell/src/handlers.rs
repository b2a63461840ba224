use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::Value;

use shared_config::AppConfig;
use shared_models::auth::{StaffRole, User};
use shared_models::error::AppError;
use shared_models::response;
use shared_utils::extractor::require_role;

use crate::models::{CreatePatientRequest, PatientListQuery, PatientView, UpdatePatientRequest};
use crate::services::PatientService;

#[axum::debug_handler]
pub async fn create_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = PatientService::new(&config);
    let patient = service.create_patient(request, auth.token()).await?;

    Ok(response::created(PatientView::from(patient)))
}

#[axum::debug_handler]
pub async fn list_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientListQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = PatientService::new(&config);
    let page = service.list_patients(query, auth.token()).await?;

    Ok(response::ok(page))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = PatientService::new(&config);
    let patient = service.get_patient(patient_id, auth.token()).await?;

    Ok(response::ok(PatientView::from(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = PatientService::new(&config);
    let patient = service.update_patient(patient_id, request, auth.token()).await?;

    Ok(response::ok(PatientView::from(patient)))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = PatientService::new(&config);
    service.delete_patient(patient_id, auth.token()).await?;

    Ok(response::deleted(patient_id))
}

#[axum::debug_handler]
pub async fn patient_history(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = PatientService::new(&config);
    let history = service.patient_history(patient_id, auth.token()).await?;

    Ok(response::ok(history))
}
