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

use crate::models::{ConsultationListQuery, CreateConsultationRequest, UpdateConsultationRequest};
use crate::services::ConsultationService;

#[axum::debug_handler]
pub async fn create_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = ConsultationService::new(&state);
    let consultation = service.create_consultation(request, auth.token()).await?;

    Ok(response::created(consultation))
}

#[axum::debug_handler]
pub async fn list_consultations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ConsultationListQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = ConsultationService::new(&state);
    let page = service.list_consultations(query, auth.token()).await?;

    Ok(response::ok(page))
}

#[axum::debug_handler]
pub async fn get_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = ConsultationService::new(&state);
    let consultation = service.get_consultation(consultation_id, auth.token()).await?;

    Ok(response::ok(consultation))
}

#[axum::debug_handler]
pub async fn update_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<i64>,
    Json(request): Json<UpdateConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = ConsultationService::new(&state);
    let consultation = service
        .update_consultation(consultation_id, request, auth.token())
        .await?;

    Ok(response::ok(consultation))
}

#[axum::debug_handler]
pub async fn delete_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = ConsultationService::new(&state);
    service.delete_consultation(consultation_id, auth.token()).await?;

    Ok(response::deleted(consultation_id))
}
