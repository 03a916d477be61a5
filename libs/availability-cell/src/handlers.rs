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

use crate::models::{AvailabilityError, CreateAvailabilityRequest, Slot, UpdateSlotRequest};
use crate::services::AvailabilityService;

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::NotFound => AppError::NotFound("Slot not found".to_string()),
        AvailabilityError::SlotBooked => AppError::Conflict(
            "Slot is booked; cancel the appointment before deleting it".to_string(),
        ),
        AvailabilityError::DuplicateSlot => AppError::Conflict(
            "Doctor already has a slot at one of the requested date/time combinations".to_string(),
        ),
        AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Doctors publish their own slots; the doctor identity comes from the token,
/// never from the request body.
#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden(
            "Only doctors can publish availability".to_string(),
        ));
    }

    let doctor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Authenticated user id is not a valid reference".to_string()))?;

    let service = AvailabilityService::new(&state);
    let slots = service
        .create_availability(doctor_id, request, Some(auth.token()))
        .await
        .map_err(map_availability_error)?;

    let count = slots.len();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": slots,
            "message": format!("{} slots published", count)
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let days = service
        .get_doctor_availability(doctor_id, None)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "data": days
    })))
}

async fn authorize_slot_access(
    service: &AvailabilityService,
    slot_id: Uuid,
    user: &User,
    token: &str,
) -> Result<Slot, AppError> {
    let slot = service
        .get_slot(slot_id, Some(token))
        .await
        .map_err(map_availability_error)?;

    let is_owner = user.is_doctor() && slot.doctor_id.to_string() == user.id;
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to manage this slot".to_string(),
        ));
    }

    Ok(slot)
}

#[axum::debug_handler]
pub async fn update_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = AvailabilityService::new(&state);

    authorize_slot_access(&service, slot_id, &user, token).await?;

    let slot = service
        .update_slot(slot_id, request, Some(token))
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "data": slot,
        "message": "Slot updated"
    })))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = AvailabilityService::new(&state);

    authorize_slot_access(&service, slot_id, &user, token).await?;

    let slot = service
        .delete_slot(slot_id, Some(token))
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "data": slot,
        "message": "Slot deleted"
    })))
}
