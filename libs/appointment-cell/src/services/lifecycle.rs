use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CANCELLATION_NOTICE_HOURS,
};

/// Pure rules of the appointment state machine. No I/O lives here so every
/// guard is testable with plain values.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(*current_status));
        }

        Ok(())
    }

    /// All valid next statuses for a given current status
    pub fn valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// The cutoff rule: cancellation is permitted at or beyond exactly
    /// 24 hours of notice, rejected below it.
    pub fn within_cancellation_window(
        &self,
        starts_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        starts_at - now >= Duration::hours(CANCELLATION_NOTICE_HOURS)
    }

    /// All guards for a patient-initiated cancellation, in the order callers
    /// must be able to distinguish them: ownership, terminal state, cutoff.
    pub fn validate_patient_cancellation(
        &self,
        appointment: &Appointment,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if appointment.patient_id.to_string() != patient_id {
            return Err(AppointmentError::NotOwner);
        }

        if appointment.status.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        if !self.within_cancellation_window(appointment.starts_at(), now) {
            return Err(AppointmentError::CancellationWindowClosed);
        }

        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
