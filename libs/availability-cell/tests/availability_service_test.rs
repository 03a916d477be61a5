use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::models::{
    AvailabilityError, CreateAvailabilityRequest, DaySchedule, Slot, UpdateSlotRequest,
};
use availability_cell::services::AvailabilityService;
use shared_utils::test_utils::{MockRows, TestConfig};

fn service_for(mock_server: &MockServer) -> AvailabilityService {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    AvailabilityService::new(&config)
}

fn batch_request(dates: &[&str], times: &[&str]) -> CreateAvailabilityRequest {
    CreateAvailabilityRequest {
        available_dates: dates.iter().map(|d| d.to_string()).collect(),
        available_times: times.iter().map(|t| t.to_string()).collect(),
        location: "Clinic A".to_string(),
        session_duration: None,
    }
}

fn test_slot(doctor_id: Uuid, date: &str, time: &str) -> Slot {
    Slot {
        id: Uuid::new_v4(),
        doctor_id,
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        start_time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
        location: "Clinic A".to_string(),
        duration_minutes: 30,
        is_booked: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn create_availability_inserts_dates_times_product() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    let created = json!([
        MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-01", "09:00:00", false),
        MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-01", "10:00:00", false),
        MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-02", "09:00:00", false),
        MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-02", "10:00:00", false),
    ]);

    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(created))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let slots = service
        .create_availability(
            doctor_id,
            batch_request(&["2025-06-01", "2025-06-02"], &["09:00", "10:00"]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(slots.len(), 4);
    assert!(slots.iter().all(|s| !s.is_booked));

    // The bulk insert must carry exactly the Cartesian product
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn create_availability_clamps_session_duration() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-01", "09:00:00", false)
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let mut request = batch_request(&["2025-06-01"], &["09:00"]);
    request.session_duration = Some(5);

    service
        .create_availability(doctor_id, request, None)
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body[0]["duration_minutes"], 15);
}

#[tokio::test]
async fn create_availability_rejects_invalid_date_before_any_write() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let result = service
        .create_availability(
            Uuid::new_v4(),
            batch_request(&["2025-06-01", "not-a-date"], &["09:00"]),
            None,
        )
        .await;

    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    // Whole batch fails before any insert is attempted
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn create_availability_rejects_empty_inputs() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);
    let doctor_id = Uuid::new_v4();

    let result = service
        .create_availability(doctor_id, batch_request(&[], &["09:00"]), None)
        .await;
    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    let result = service
        .create_availability(doctor_id, batch_request(&["2025-06-01"], &[]), None)
        .await;
    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    let mut request = batch_request(&["2025-06-01"], &["09:00"]);
    request.location = "   ".to_string();
    let result = service.create_availability(doctor_id, request, None).await;
    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));
}

#[tokio::test]
async fn create_availability_surfaces_uniqueness_violation_as_duplicate() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service
        .create_availability(
            Uuid::new_v4(),
            batch_request(&["2025-06-01"], &["09:00"]),
            None,
        )
        .await;

    assert_matches!(result, Err(AvailabilityError::DuplicateSlot));
}

#[tokio::test]
async fn doctor_availability_is_grouped_into_day_buckets() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-01", "09:00:00", false),
            MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-01", "10:00:00", true),
            MockRows::slot(Uuid::new_v4(), doctor_id, "2025-06-02", "09:00:00", false),
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let days = service.get_doctor_availability(doctor_id, None).await.unwrap();

    assert_eq!(days.len(), 2);
    assert_eq!(days[0].slots.len(), 2);
    assert_eq!(days[1].slots.len(), 1);
    assert!(days[0].slots[1].is_booked);
}

#[tokio::test]
async fn update_slot_patches_only_the_given_fields() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::slot(slot_id, doctor_id, "2025-06-01", "10:00:00", false)
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let request = UpdateSlotRequest {
        start_time: Some("10:00".to_string()),
        duration_minutes: Some(500),
        ..Default::default()
    };
    let slot = service.update_slot(slot_id, request, None).await.unwrap();

    assert_eq!(slot.start_time.to_string(), "10:00:00");

    // Only the requested fields plus the timestamp go over the wire, and the
    // out-of-range duration is clamped rather than rejected
    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["start_time"], "10:00:00");
    assert_eq!(body["duration_minutes"], 120);
    assert!(body.get("date").is_none());
    assert!(body.get("location").is_none());
    assert!(body.get("updated_at").is_some());
}

#[tokio::test]
async fn update_slot_with_no_fields_is_rejected() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let result = service
        .update_slot(Uuid::new_v4(), UpdateSlotRequest::default(), None)
        .await;

    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn update_slot_rejects_blank_location_and_bad_time() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let request = UpdateSlotRequest {
        location: Some("   ".to_string()),
        ..Default::default()
    };
    let result = service.update_slot(Uuid::new_v4(), request, None).await;
    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    let request = UpdateSlotRequest {
        start_time: Some("25:99".to_string()),
        ..Default::default()
    };
    let result = service.update_slot(Uuid::new_v4(), request, None).await;
    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn update_slot_uniqueness_violation_is_a_duplicate() {
    let mock_server = MockServer::start().await;

    // Moving the slot onto another slot's (doctor, date, time) key
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let request = UpdateSlotRequest {
        start_time: Some("09:00".to_string()),
        ..Default::default()
    };
    let result = service.update_slot(Uuid::new_v4(), request, None).await;

    assert_matches!(result, Err(AvailabilityError::DuplicateSlot));
}

#[tokio::test]
async fn update_missing_slot_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let request = UpdateSlotRequest {
        location: Some("Clinic B".to_string()),
        ..Default::default()
    };
    let result = service.update_slot(Uuid::new_v4(), request, None).await;

    assert_matches!(result, Err(AvailabilityError::NotFound));
}

#[tokio::test]
async fn delete_refuses_booked_slot() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockRows::slot(slot_id, Uuid::new_v4(), "2025-06-01", "09:00:00", true)
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service.delete_slot(slot_id, None).await;

    assert_matches!(result, Err(AvailabilityError::SlotBooked));

    // No DELETE may reach the store
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method != wiremock::http::Method::DELETE));
}

#[tokio::test]
async fn delete_missing_slot_is_not_found() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service.delete_slot(slot_id, None).await;

    assert_matches!(result, Err(AvailabilityError::NotFound));
}

#[test]
fn grouping_preserves_date_and_time_order() {
    let doctor_id = Uuid::new_v4();
    let slots = vec![
        test_slot(doctor_id, "2025-06-01", "09:00"),
        test_slot(doctor_id, "2025-06-01", "10:00"),
        test_slot(doctor_id, "2025-06-03", "09:00"),
    ];

    let days = DaySchedule::group(&slots);

    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date.to_string(), "2025-06-01");
    assert_eq!(days[0].slots.len(), 2);
    assert!(days[0].slots[0].start_time < days[0].slots[1].start_time);
    assert_eq!(days[1].date.to_string(), "2025-06-03");
}

#[test]
fn grouping_empty_input_is_empty() {
    assert!(DaySchedule::group(&[]).is_empty());
}
