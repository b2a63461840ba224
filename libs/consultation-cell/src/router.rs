use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn consultation_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_consultation).get(handlers::list_consultations))
        .route(
            "/{consultation_id}",
            get(handlers::get_consultation)
                .patch(handlers::update_consultation)
                .delete(handlers::delete_consultation),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
