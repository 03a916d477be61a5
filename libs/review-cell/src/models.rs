use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
pub const MAX_COMMENT_CHARS: usize = 500;

/// Patient-authored feedback tied to exactly one completed appointment;
/// `appointment_id` is unique at the store level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewStatus::Pending => write!(f, "pending"),
            ReviewStatus::Approved => write!(f, "approved"),
            ReviewStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerateReviewRequest {
    pub status: ReviewStatus,
    #[serde(alias = "rejectionReason")]
    pub rejection_reason: Option<String>,
}

/// Public, approved-only view of a doctor's reviews with a read-time
/// aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReviewSummary {
    pub doctor_id: Uuid,
    pub average_rating: Option<f64>,
    pub total: usize,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReviewError {
    #[error("Review not found")]
    NotFound,

    #[error("No completed appointment found for this patient")]
    AppointmentNotEligible,

    #[error("A review already exists for this appointment")]
    AlreadyReviewed,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
