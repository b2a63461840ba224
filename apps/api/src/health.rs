use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::response;

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    pub db: Option<String>,
}

impl HealthQuery {
    fn wants_db(&self) -> bool {
        matches!(self.db.as_deref().map(str::trim), Some("1") | Some("true"))
    }
}

/// Liveness check. `?db=1` also pings PostgREST.
pub async fn health_check(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<HealthQuery>,
) -> Json<Value> {
    let db = if query.wants_db() {
        let reachable = SupabaseClient::new(&state).ping().await;
        debug!("Database reachable: {}", reachable);
        Some(reachable)
    } else {
        None
    };

    response::ok(json!({ "service": "up", "db": db }))
}
