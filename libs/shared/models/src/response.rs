use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

/// `200 {"status": "ok", "data": ...}`
pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "status": "ok", "data": data }))
}

/// `201 {"status": "created", "data": ...}`
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({ "status": "created", "data": data })))
}

pub fn deleted(id: i64) -> Json<Value> {
    Json(json!({ "deleted": true, "id": id }))
}
