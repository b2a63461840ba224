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

use crate::models::{PrescriptionListQuery, CreatePrescriptionRequest, UpdatePrescriptionRequest};
use crate::services::PrescriptionService;

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = PrescriptionService::new(&state);
    let prescription = service.create_prescription(request, auth.token()).await?;

    Ok(response::created(prescription))
}

#[axum::debug_handler]
pub async fn list_prescriptions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PrescriptionListQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = PrescriptionService::new(&state);
    let page = service.list_prescriptions(query, auth.token()).await?;

    Ok(response::ok(page))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = PrescriptionService::new(&state);
    let prescription = service.get_prescription(prescription_id, auth.token()).await?;

    Ok(response::ok(prescription))
}

#[axum::debug_handler]
pub async fn update_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<i64>,
    Json(request): Json<UpdatePrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = PrescriptionService::new(&state);
    let prescription = service
        .update_prescription(prescription_id, request, auth.token())
        .await?;

    Ok(response::ok(prescription))
}

#[axum::debug_handler]
pub async fn delete_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(prescription_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = PrescriptionService::new(&state);
    service.delete_prescription(prescription_id, auth.token()).await?;

    Ok(response::deleted(prescription_id))
}
