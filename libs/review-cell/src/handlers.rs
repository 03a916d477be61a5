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

use crate::models::{ModerateReviewRequest, ReviewError, SubmitReviewRequest};
use crate::services::ReviewService;

fn map_review_error(e: ReviewError) -> AppError {
    match e {
        ReviewError::NotFound => AppError::NotFound("Review not found".to_string()),
        ReviewError::AppointmentNotEligible => AppError::NotFound(
            "No completed appointment found for this patient".to_string(),
        ),
        ReviewError::AlreadyReviewed => {
            AppError::Conflict("A review already exists for this appointment".to_string())
        }
        ReviewError::ValidationError(msg) => AppError::ValidationError(msg),
        ReviewError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn submit_review(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !user.is_patient() {
        return Err(AppError::Forbidden(
            "Only patients can submit reviews".to_string(),
        ));
    }

    let patient_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Authenticated user id is not a valid reference".to_string()))?;

    let service = ReviewService::new(&state);
    let review = service
        .submit_review(appointment_id, patient_id, request, auth.token())
        .await
        .map_err(map_review_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": review,
            "message": "Review submitted for moderation"
        })),
    ))
}

#[axum::debug_handler]
pub async fn moderate_review(
    State(state): State<Arc<AppConfig>>,
    Path(review_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ModerateReviewRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins can moderate reviews".to_string(),
        ));
    }

    let service = ReviewService::new(&state);
    let review = service
        .moderate_review(review_id, request, auth.token())
        .await
        .map_err(map_review_error)?;

    Ok(Json(json!({
        "success": true,
        "data": review,
        "message": "Review moderated"
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_reviews(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ReviewService::new(&state);
    let summary = service
        .get_doctor_reviews(doctor_id, None)
        .await
        .map_err(map_review_error)?;

    Ok(Json(json!({
        "success": true,
        "data": summary
    })))
}
