use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AppointmentError, BookAppointmentRequest, UpdateStatusRequest};
use crate::services::BookingService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
        AppointmentError::SlotAlreadyBooked => {
            AppError::Conflict("Slot is already booked".to_string())
        }
        AppointmentError::InvalidStatusTransition(status) => {
            AppError::Conflict(format!("Appointment cannot change from status: {}", status))
        }
        AppointmentError::NotOwner => {
            AppError::Forbidden("Appointment belongs to another patient".to_string())
        }
        AppointmentError::CancellationWindowClosed => AppError::BadRequest(e.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn parse_actor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Authenticated user id is not a valid reference".to_string()))
}

/// Patients book a free slot; the claim itself is atomic in the service.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !user.is_patient() {
        return Err(AppError::Forbidden(
            "Only patients can book appointments".to_string(),
        ));
    }

    let patient_id = parse_actor_id(&user)?;
    let service = BookingService::new(&state);

    let appointment = service
        .book_slot(slot_id, patient_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    // Only the two participants or an admin can view
    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;
    if !is_patient && !is_doctor && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "data": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if patient_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to view these appointments".to_string(),
        ));
    }

    let service = BookingService::new(&state);
    let appointments = service
        .list_for_patient(patient_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if doctor_id.to_string() != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to view these appointments".to_string(),
        ));
    }

    let service = BookingService::new(&state);
    let appointments = service
        .list_for_doctor(doctor_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": appointments
    })))
}

/// Doctor (or admin) moves the appointment along the state machine:
/// confirm, complete or cancel.
#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = BookingService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    let is_doctor = user.is_doctor() && appointment.doctor_id.to_string() == user.id;
    if !is_doctor && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the appointment's doctor or an admin can update its status".to_string(),
        ));
    }

    let updated = service
        .update_status(appointment_id, request.status, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": updated,
        "message": "Appointment status updated"
    })))
}

/// Patient self-service cancellation under the 24-hour rule.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_patient() {
        return Err(AppError::Forbidden(
            "Only patients can cancel their own appointments here".to_string(),
        ));
    }

    let service = BookingService::new(&state);
    let appointment = service
        .cancel_by_patient(appointment_id, &user.id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": appointment,
        "message": "Appointment cancelled and slot released"
    })))
}
