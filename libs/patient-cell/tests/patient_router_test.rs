use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::router::create_patient_router;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct Harness {
    server: MockServer,
    app: Router,
    secret: String,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(&server.uri());
        let secret = config.jwt_secret.clone();
        let app = create_patient_router(config.to_arc());
        Self { server, app, secret }
    }

    fn token(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.secret, None)
    }

    async fn send(&self, method: &str, uri: &str, user: &TestUser, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token(user)))
            .header("Content-Type", "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }
}

fn create_payload() -> Value {
    json!({
        "first_name": "Ana",
        "last_name": "García",
        "date_of_birth": "1990-05-17",
        "sex": "f",
        "phone": "5512345678",
        "email": " ANA@example.com ",
        "weight_kg": 60.0,
        "height_m": 1.65,
        "treatments_of_interest": "Facial",
        "past_history": "",
        "privacy_notice_accepted": true,
        "informed_consent_accepted": true
    })
}

#[tokio::test]
async fn doctor_creates_patient_with_normalized_fields() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "email": "ana@example.com",
            "sex": "F",
            "bmi": 22.0,
            "past_history": "No pathological history",
            "allergies": "No known allergies"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([MockSupabaseResponses::patient_row(7)])))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .send("POST", "/", &TestUser::doctor("doc@clinic.test"), Some(create_payload()))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "created");
    assert_eq!(body["data"]["id"], 7);
    assert_eq!(body["data"]["display_id"], "P-0007");
}

#[tokio::test]
async fn nurse_cannot_create_patients() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .send("POST", "/", &TestUser::nurse("nurse@clinic.test"), Some(create_payload()))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("nurse"));
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::error_response(
            "23505",
            "duplicate key value violates unique constraint \"patients_email_key\"",
        )))
        .mount(&h.server)
        .await;

    let (status, _) = h
        .send("POST", "/", &TestUser::admin("admin@clinic.test"), Some(create_payload()))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_patient_is_not_found() {
    let h = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", "eq.404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;

    let (status, body) = h.send("GET", "/404", &TestUser::nurse("n@clinic.test"), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Patient 404 not found");
}

#[tokio::test]
async fn list_filters_by_name_terms_and_local_created_range() {
    let h = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("and", "(or(first_name.ilike.\"*ana*\",last_name.ilike.\"*ana*\"),or(first_name.ilike.\"*gar*\",last_name.ilike.\"*gar*\"))"))
        .and(query_param("created_at", "gte.2024-03-10T06:00:00.000000Z"))
        .and(query_param("created_at", "lte.2024-03-11T05:59:59.999999Z"))
        .and(query_param("order", "id.desc"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "0"))
        .and(header("Prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "0-0/1")
                .set_body_json(json!([MockSupabaseResponses::patient_row(3)])),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .send("GET", "/?name=ana%20gar&from=2024-03-10&to=2024-03-10", &TestUser::nurse("n@clinic.test"), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["display_id"], "P-0003");
}

#[tokio::test]
async fn malformed_range_bound_is_rejected() {
    let h = Harness::start().await;

    let (status, body) = h
        .send("GET", "/?from=yesterday", &TestUser::doctor("d@clinic.test"), None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("yesterday"));
}

#[tokio::test]
async fn history_flags_most_recent_consultation() {
    let h = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", "eq.3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::patient_row(3)])))
        .mount(&h.server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("patient_id", "eq.3"))
        .and(query_param("order", "datetime.desc,id.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::consultation_row(12, 3, "2024-03-10T15:00:00Z"),
            MockSupabaseResponses::consultation_row(9, 3, "2024-02-01T15:00:00Z")
        ])))
        .mount(&h.server)
        .await;

    let (status, body) = h.send("GET", "/3/history", &TestUser::manager("m@clinic.test"), None).await;

    assert_eq!(status, StatusCode::OK);
    let consultations = body["data"]["consultations"].as_array().unwrap();
    assert_eq!(consultations.len(), 2);
    assert_eq!(consultations[0]["id"], 12);
    assert_eq!(consultations[0]["is_last"], true);
    assert_eq!(consultations[1]["is_last"], false);
    assert_eq!(body["data"]["allergies"], "No known allergies");
}

#[tokio::test]
async fn update_recomputes_bmi_from_merged_record() {
    let h = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", "eq.3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::patient_row(3)])))
        .mount(&h.server)
        .await;

    let mut updated = MockSupabaseResponses::patient_row(3);
    updated["weight_kg"] = json!(81.0);
    updated["height_m"] = json!(1.8);
    updated["bmi"] = json!(25.0);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", "eq.3"))
        .and(body_partial_json(json!({"weight_kg": 81.0, "height_m": 1.8, "bmi": 25.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .send("PATCH", "/3", &TestUser::doctor("d@clinic.test"), Some(json!({"weight_kg": 81.0, "height_m": 1.8})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["bmi"], 25.0);
}

#[tokio::test]
async fn delete_of_unknown_patient_is_not_found() {
    let h = Harness::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", "eq.8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;

    let (status, _) = h.send("DELETE", "/8", &TestUser::admin("a@clinic.test"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let h = Harness::start().await;

    let request = Request::builder().uri("/1").body(Body::empty()).unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
