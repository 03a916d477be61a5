use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use review_cell::router::review_routes;
use shared_utils::test_utils::{JwtTestUtils, MockRows, TestConfig, TestUser};

fn create_test_app(mock_server: &MockServer) -> (Router, TestConfig) {
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    (review_routes(config.to_arc()), config)
}

fn authed_request(method: &str, uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn submitting_a_review_requires_authentication() {
    let mock_server = MockServer::start().await;
    let (app, _config) = create_test_app(&mock_server);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/appointments/{}", Uuid::new_v4()))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"rating": 5}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_admins_can_moderate() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);

    let patient = TestUser::patient("pat@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

    let request = authed_request(
        "PATCH",
        &format!("/{}", Uuid::new_v4()),
        &token,
        json!({"status": "approved"}),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_moderation_goes_through() {
    let mock_server = MockServer::start().await;
    let (app, config) = create_test_app(&mock_server);
    let review_id = Uuid::new_v4();

    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, None);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::review(
                review_id, Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 5, "approved"
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = authed_request(
        "PATCH",
        &format!("/{}", review_id),
        &token,
        json!({"status": "approved"}),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json_response["success"], true);
    assert_eq!(json_response["data"]["status"], "approved");
}

#[tokio::test]
async fn approved_reviews_are_publicly_readable() {
    let mock_server = MockServer::start().await;
    let (app, _config) = create_test_app(&mock_server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::review(
                Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), doctor_id, 4, "approved"
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/doctors/{}", doctor_id))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json_response["data"]["total"], 1);
    assert_eq!(json_response["data"]["average_rating"], 4.0);
}
