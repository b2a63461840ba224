use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request as MockRequest, ResponseTemplate};

use prescription_cell::router::prescription_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct TestApp {
    server: MockServer,
    router: Router,
    secret: String,
}

impl TestApp {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_supabase_url(&server.uri());
        let secret = config.jwt_secret.clone();
        let router = prescription_routes(config.to_arc());
        Self { server, router, secret }
    }

    async fn send(&self, user: &TestUser, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = JwtTestUtils::create_test_token(user, &self.secret, None);
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    async fn mount_patient(&self, id: i64) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::patient_row(id)])))
            .mount(&self.server)
            .await;
    }

    async fn inserted_rows(&self, table: &str) -> Vec<Value> {
        let target = format!("/rest/v1/{}", table);
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r: &MockRequest| r.method.as_str() == "POST" && r.url.path() == target)
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

#[tokio::test]
async fn create_defaults_bmi_from_patient_and_normalizes_issue_time() {
    let app = TestApp::new().await;
    app.mount_patient(3).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/prescriptions"))
        .and(body_partial_json(json!({
            "patient_id": 3,
            "bmi": 22.0,
            "issued_at": "2024-03-10T15:00:00.000000Z"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::prescription_row(40, 3, "2024-03-10T15:00:00Z")
        ])))
        .expect(1)
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(
            &TestUser::doctor("d@clinic.test"),
            "POST",
            "/",
            Some(json!({"patient_id": 3, "issued_at": "2024-03-10T09:00:00", "diagnosis": "Dermatitis"})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "created");
    assert_eq!(body["data"]["id"], 40);
}

#[tokio::test]
async fn create_without_issue_time_stamps_now() {
    let app = TestApp::new().await;
    app.mount_patient(3).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/prescriptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::prescription_row(41, 3, "2024-03-10T15:00:00Z")
        ])))
        .mount(&app.server)
        .await;

    let before = chrono::Utc::now() - chrono::Duration::seconds(5);
    let (status, _) = app
        .send(&TestUser::doctor("d@clinic.test"), "POST", "/", Some(json!({"patient_id": 3, "bmi": 25.1})))
        .await;
    let after = chrono::Utc::now() + chrono::Duration::seconds(5);

    assert_eq!(status, StatusCode::CREATED);
    let rows = app.inserted_rows("prescriptions").await;
    assert_eq!(rows.len(), 1);

    let issued_at = rows[0]["issued_at"].as_str().unwrap();
    assert!(issued_at.ends_with('Z'));
    let issued_at = chrono::DateTime::parse_from_rfc3339(issued_at).unwrap().with_timezone(&chrono::Utc);
    assert!(issued_at >= before && issued_at <= after);
    assert_eq!(rows[0]["bmi"], 25.1);
}

#[tokio::test]
async fn create_with_new_patient_uses_single_rpc() {
    let app = TestApp::new().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/create_prescription_with_patient"))
        .and(body_partial_json(json!({
            "patient": {"email": "luis@example.com", "bmi": 24.2},
            "prescription": {"bmi": 24.2, "diagnosis": "Acné"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(MockSupabaseResponses::prescription_row(42, 9, "2024-03-10T15:00:00Z")))
        .expect(1)
        .mount(&app.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(
            &TestUser::manager("m@clinic.test"),
            "POST",
            "/",
            Some(json!({
                "new_patient": {
                    "first_name": "Luis",
                    "last_name": "Pérez",
                    "date_of_birth": "1985-01-20",
                    "sex": "m",
                    "phone": "5598765432",
                    "email": " Luis@Example.com ",
                    "weight_kg": 70.0,
                    "height_m": 1.70
                },
                "diagnosis": "Acné"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["patient_id"], 9);
    assert!(app.inserted_rows("prescriptions").await.is_empty());
}

#[tokio::test]
async fn incomplete_new_patient_is_rejected_before_any_write() {
    let app = TestApp::new().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(
            &TestUser::doctor("d@clinic.test"),
            "POST",
            "/",
            Some(json!({"new_patient": {"first_name": "Luis", "last_name": "Pérez"}})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "new_patient.date_of_birth is required");
}

#[tokio::test]
async fn missing_patient_reference_is_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(&TestUser::doctor("d@clinic.test"), "POST", "/", Some(json!({"diagnosis": "x"})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Either patient_id or new_patient is required");
}

#[tokio::test]
async fn consultation_of_another_patient_is_rejected() {
    let app = TestApp::new().await;
    app.mount_patient(3).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("id", "eq.8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::consultation_row(8, 4, "2024-03-09T18:00:00Z")
        ])))
        .mount(&app.server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(
            &TestUser::doctor("d@clinic.test"),
            "POST",
            "/",
            Some(json!({"patient_id": 3, "consultation_id": 8})),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Consultation 8 does not belong to this patient");
}

#[tokio::test]
async fn unknown_consultation_is_not_found() {
    let app = TestApp::new().await;
    app.mount_patient(3).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(
            &TestUser::doctor("d@clinic.test"),
            "POST",
            "/",
            Some(json!({"patient_id": 3, "consultation_id": 99})),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Consultation 99 not found");
}

#[tokio::test]
async fn list_filters_by_patient_newest_first() {
    let app = TestApp::new().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/prescriptions"))
        .and(query_param("patient_id", "eq.3"))
        .and(query_param("order", "issued_at.desc,id.desc"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "0"))
        .and(header("Prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Range", "0-1/2")
                .set_body_json(json!([
                    MockSupabaseResponses::prescription_row(2, 3, "2024-03-10T15:00:00Z"),
                    MockSupabaseResponses::prescription_row(1, 3, "2024-03-01T15:00:00Z")
                ])),
        )
        .expect(1)
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(&TestUser::nurse("n@clinic.test"), "GET", "/?patient_id=3", None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["page_size"], 20);
    assert_eq!(body["data"]["items"][0]["id"], 2);
    assert_eq!(body["data"]["items"][0]["bmi"], 22.0);
}

#[tokio::test]
async fn update_renormalizes_issue_time_and_clears_vitals() {
    let app = TestApp::new().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/prescriptions"))
        .and(query_param("id", "eq.5"))
        .and(body_partial_json(json!({"issued_at": "2024-03-11T00:15:00.000000Z", "spo2": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::prescription_row(5, 3, "2024-03-11T00:15:00Z")
        ])))
        .expect(1)
        .mount(&app.server)
        .await;

    let (status, body) = app
        .send(
            &TestUser::admin("a@clinic.test"),
            "PATCH",
            "/5",
            Some(json!({"issued_at": "2024-03-10 18:15", "spo2": null})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["issued_at"], "2024-03-11T00:15:00Z");
}

#[tokio::test]
async fn delete_reports_id_and_missing_rows() {
    let app = TestApp::new().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/prescriptions"))
        .and(query_param("id", "eq.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::prescription_row(5, 3, "2024-03-10T15:00:00Z")
        ])))
        .mount(&app.server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/prescriptions"))
        .and(query_param("id", "eq.6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&app.server)
        .await;

    let user = TestUser::doctor("d@clinic.test");

    let (status, body) = app.send(&user, "DELETE", "/5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deleted": true, "id": 5}));

    let (status, body) = app.send(&user, "DELETE", "/6", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Prescription 6 not found");
}

#[tokio::test]
async fn nurse_cannot_issue_prescriptions() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(&TestUser::nurse("n@clinic.test"), "POST", "/", Some(json!({"patient_id": 3})))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}
