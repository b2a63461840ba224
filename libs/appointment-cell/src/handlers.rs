// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{StaffRole, User};
use shared_models::error::AppError;
use shared_models::response;
use shared_utils::extractor::require_role;

use crate::models::{AppointmentQuery, CreateAppointmentRequest, UpdateAppointmentRequest};
use crate::services::AppointmentService;

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = AppointmentService::new(&state);
    let appointment = service.create_appointment(request, auth.token()).await?;

    Ok(response::created(appointment))
}

/// Calendar view: everything overlapping `[start, end]`.
#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = AppointmentService::new(&state);
    let items = service.query_overlapping(query, auth.token()).await?;

    Ok(response::ok(json!({ "items": items })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::READERS)?;

    let service = AppointmentService::new(&state);
    let appointment = service.get_appointment(appointment_id, auth.token()).await?;

    Ok(response::ok(appointment))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = AppointmentService::new(&state);
    let appointment = service
        .update_appointment(appointment_id, request, auth.token())
        .await?;

    Ok(response::ok(appointment))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, StaffRole::WRITERS)?;

    let service = AppointmentService::new(&state);
    service.delete_appointment(appointment_id, auth.token()).await?;

    Ok(response::deleted(appointment_id))
}
