use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DoctorReviewSummary, ModerateReviewRequest, Review, ReviewError, ReviewStatus,
    SubmitReviewRequest, MAX_COMMENT_CHARS, MAX_RATING, MIN_RATING,
};

pub struct ReviewService {
    supabase: SupabaseClient,
}

impl ReviewService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create a review for a completed appointment owned by the requesting
    /// patient. The eligibility lookup is one filtered query, so a wrong
    /// owner, a wrong status and a missing id all come back as the same
    /// not-eligible answer.
    pub async fn submit_review(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        request: SubmitReviewRequest,
        auth_token: &str,
    ) -> Result<Review, ReviewError> {
        debug!("Patient {} reviewing appointment {}", patient_id, appointment_id);

        if request.rating < MIN_RATING || request.rating > MAX_RATING {
            return Err(ReviewError::ValidationError(format!(
                "Rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            )));
        }
        if let Some(ref comment) = request.comment {
            if comment.chars().count() > MAX_COMMENT_CHARS {
                return Err(ReviewError::ValidationError(format!(
                    "Comment must be at most {} characters",
                    MAX_COMMENT_CHARS
                )));
            }
        }

        let appointment_path = format!(
            "/rest/v1/appointments?id=eq.{}&patient_id=eq.{}&status=eq.completed",
            appointment_id, patient_id
        );
        let appointments: Vec<Value> = self
            .supabase
            .request(Method::GET, &appointment_path, Some(auth_token), None)
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        let appointment = appointments
            .into_iter()
            .next()
            .ok_or(ReviewError::AppointmentNotEligible)?;

        let doctor_id = appointment["doctor_id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| {
                ReviewError::DatabaseError("Appointment row is missing doctor_id".to_string())
            })?;

        let existing_path = format!("/rest/v1/reviews?appointment_id=eq.{}", appointment_id);
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &existing_path, Some(auth_token), None)
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(ReviewError::AlreadyReviewed);
        }

        let now = Utc::now().to_rfc3339();
        let review_row = json!({
            "appointment_id": appointment_id.to_string(),
            "patient_id": patient_id.to_string(),
            "doctor_id": doctor_id.to_string(),
            "rating": request.rating,
            "comment": request.comment,
            "status": ReviewStatus::Pending.to_string(),
            "created_at": now,
            "updated_at": now
        });

        let created: Vec<Review> = self
            .supabase
            .insert_returning("/rest/v1/reviews", Some(auth_token), review_row)
            .await
            .map_err(|e| {
                let message = e.to_string();
                // The unique index on appointment_id closes the lookup/insert race
                if message.starts_with("Conflict") {
                    ReviewError::AlreadyReviewed
                } else {
                    ReviewError::DatabaseError(message)
                }
            })?;

        let review = created.into_iter().next().ok_or_else(|| {
            ReviewError::DatabaseError("Review insert returned no rows".to_string())
        })?;

        self.clear_needs_review(appointment_id, auth_token).await;

        info!("Review {} created for appointment {}", review.id, appointment_id);
        Ok(review)
    }

    /// Admin moderation: approve or reject a pending review.
    pub async fn moderate_review(
        &self,
        review_id: Uuid,
        request: ModerateReviewRequest,
        auth_token: &str,
    ) -> Result<Review, ReviewError> {
        debug!("Moderating review {} to {}", review_id, request.status);

        if request.status == ReviewStatus::Pending {
            return Err(ReviewError::ValidationError(
                "Moderation status must be approved or rejected".to_string(),
            ));
        }

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(request.status.to_string()));
        if request.status == ReviewStatus::Rejected {
            update_data.insert("rejection_reason".to_string(), json!(request.rejection_reason));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/reviews?id=eq.{}", review_id);
        let updated: Vec<Review> = self
            .supabase
            .update_returning(&path, Some(auth_token), Value::Object(update_data))
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(ReviewError::NotFound)
    }

    /// Approved reviews only feed the public listing and its aggregate.
    pub async fn get_doctor_reviews(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<DoctorReviewSummary, ReviewError> {
        let path = format!(
            "/rest/v1/reviews?doctor_id=eq.{}&status=eq.approved&order=created_at.desc",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        let reviews: Vec<Review> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Review>, _>>()
            .map_err(|e| ReviewError::DatabaseError(format!("Failed to parse reviews: {}", e)))?;

        let total = reviews.len();
        let average_rating = if total == 0 {
            None
        } else {
            Some(reviews.iter().map(|r| r.rating as f64).sum::<f64>() / total as f64)
        };

        Ok(DoctorReviewSummary {
            doctor_id,
            average_rating,
            total,
            reviews,
        })
    }

    /// Best-effort flag clear; the review itself is already committed.
    async fn clear_needs_review(&self, appointment_id: Uuid, auth_token: &str) {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let cleared: Result<Vec<Value>, _> = self
            .supabase
            .update_returning(
                &path,
                Some(auth_token),
                json!({
                    "needs_review": false,
                    "updated_at": Utc::now().to_rfc3339()
                }),
            )
            .await;

        if let Err(e) = cleared {
            warn!(
                "Failed to clear needs_review on appointment {}: {}",
                appointment_id, e
            );
        }
    }
}
