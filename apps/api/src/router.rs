use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::{warn, Level};

use appointment_cell::router::appointment_routes;
use consultation_cell::router::consultation_routes;
use patient_cell::router::create_patient_router;
use prescription_cell::router::prescription_routes;
use shared_config::AppConfig;

use crate::health::health_check;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .route("/health", get(health_check).with_state(state.clone()))
        .nest("/patients", create_patient_router(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/consultations", consultation_routes(state.clone()))
        .nest("/prescriptions", prescription_routes(state))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request ids, tracing, security headers and CORS around the whole API.
pub fn with_middleware(router: Router, config: &AppConfig) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("0"),
            ))
            .layer(cors_layer(config)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn get_json(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    #[tokio::test]
    async fn health_skips_database_unless_asked() {
        let app = create_router(TestConfig::default().to_arc());

        let (status, body) = get_json(app, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["data"]["service"], "up");
        assert!(body["data"]["db"].is_null());
    }

    #[tokio::test]
    async fn health_reports_database_reachability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let app = create_router(TestConfig::with_supabase_url(&server.uri()).to_arc());
        let (_, body) = get_json(app, "/health?db=1", None).await;
        assert_eq!(body["data"]["db"], true);

        let down = create_router(TestConfig::with_supabase_url("http://127.0.0.1:9").to_arc());
        let (_, body) = get_json(down, "/health?db=1", None).await;
        assert_eq!(body["data"]["db"], false);
    }

    #[tokio::test]
    async fn responses_carry_a_uuid_request_id() {
        let config = TestConfig::default().to_arc();
        let app = with_middleware(create_router(config.clone()), &config);

        let mut ids = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-content-type-options"], "nosniff");

            let id = response.headers()["x-request-id"].to_str().unwrap().to_string();
            assert!(uuid::Uuid::parse_str(&id).is_ok(), "{id}");
            ids.push(id);
        }
        assert_ne!(ids[0], ids[1]);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "client-supplied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "client-supplied");
    }

    #[tokio::test]
    async fn cells_are_mounted_behind_auth() {
        let app = create_router(TestConfig::default().to_arc());

        for uri in ["/patients", "/appointments?start=2024-03-10&end=2024-03-10", "/consultations", "/prescriptions"] {
            let (status, _) = get_json(app.clone(), uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn nested_routes_reach_their_cells() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/prescriptions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Range", "0-0/1")
                    .set_body_json(serde_json::json!([MockSupabaseResponses::prescription_row(
                        1,
                        3,
                        "2024-03-10T15:00:00Z"
                    )])),
            )
            .mount(&server)
            .await;

        let config = TestConfig::with_supabase_url(&server.uri());
        let token = JwtTestUtils::create_test_token(&TestUser::nurse("n@clinic.test"), &config.jwt_secret, None);
        let app = create_router(config.to_arc());

        let (status, body) = get_json(app, "/prescriptions/1", Some(&token)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], 1);
    }
}
