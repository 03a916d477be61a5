use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::Slot;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct BookingService {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// Book a slot for a patient.
    ///
    /// The claim is a single conditional update: flip `is_booked` from false
    /// to true, filtered on the current value, and read back the rows the
    /// store actually touched. Zero rows means another request won the slot
    /// and no appointment is created. The appointment insert happens only
    /// after a successful claim.
    pub async fn book_slot(
        &self,
        slot_id: Uuid,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking slot {} for patient {}", slot_id, patient_id);

        let slot = self.get_slot(slot_id, auth_token).await?;
        if slot.is_booked {
            return Err(AppointmentError::SlotAlreadyBooked);
        }

        let claimed = self.claim_slot(slot_id, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let appointment_row = json!({
            "patient_id": patient_id.to_string(),
            "doctor_id": claimed.doctor_id.to_string(),
            "slot_id": claimed.id.to_string(),
            "date": claimed.date.to_string(),
            "start_time": claimed.start_time.format("%H:%M:%S").to_string(),
            "status": AppointmentStatus::Pending.to_string(),
            "needs_review": false,
            "patient_notes": request.notes,
            "created_at": now,
            "updated_at": now
        });

        let inserted: Result<Vec<Appointment>, _> = self
            .supabase
            .insert_returning("/rest/v1/appointments", Some(auth_token), appointment_row)
            .await;

        let appointment = match inserted {
            Ok(mut rows) if !rows.is_empty() => rows.remove(0),
            Ok(_) => {
                self.release_slot(slot_id, auth_token).await;
                return Err(AppointmentError::DatabaseError(
                    "Appointment insert returned no rows".to_string(),
                ));
            }
            Err(e) => {
                // Undo the claim so the slot goes back into the pool
                self.release_slot(slot_id, auth_token).await;
                return Err(AppointmentError::DatabaseError(e.to_string()));
            }
        };

        info!(
            "Appointment {} booked for patient {} (slot {})",
            appointment.id, patient_id, slot_id
        );
        Ok(appointment)
    }

    /// Doctor- or admin-driven status change: confirm, complete or cancel.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {} to {}", appointment_id, new_status);

        if new_status == AppointmentStatus::Pending {
            return Err(AppointmentError::ValidationError(
                "Target status must be confirmed, completed or cancelled".to_string(),
            ));
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(&current.status, &new_status)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(new_status.to_string()));
        if new_status == AppointmentStatus::Completed {
            // Completion opens the review window
            update_data.insert("needs_review".to_string(), json!(true));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        // The filter re-checks the status at write time, so a concurrent
        // transition into a terminal state cannot be overwritten.
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=not.in.(completed,cancelled)",
            appointment_id
        );
        let updated: Vec<Appointment> = self
            .supabase
            .update_returning(&path, Some(auth_token), Value::Object(update_data))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = match updated.into_iter().next() {
            Some(appointment) => appointment,
            None => {
                let latest = self.get_appointment(appointment_id, auth_token).await?;
                return Err(AppointmentError::InvalidStatusTransition(latest.status));
            }
        };

        if new_status == AppointmentStatus::Cancelled {
            self.release_slot(appointment.slot_id, auth_token).await;
        }

        info!("Appointment {} is now {}", appointment_id, new_status);
        Ok(appointment)
    }

    /// Patient self-service cancellation, subject to ownership and the
    /// 24-hour cutoff. Releases the slot back into the pool.
    pub async fn cancel_by_patient(
        &self,
        appointment_id: Uuid,
        patient_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Patient {} cancelling appointment {}", patient_id, appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_patient_cancellation(&current, patient_id, Utc::now())?;

        // Same write-time status re-check as update_status: if the doctor
        // completed the appointment in the meantime, the cancel must lose.
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=not.in.(completed,cancelled)",
            appointment_id
        );
        let updated: Vec<Appointment> = self
            .supabase
            .update_returning(
                &path,
                Some(auth_token),
                json!({
                    "status": AppointmentStatus::Cancelled.to_string(),
                    "updated_at": Utc::now().to_rfc3339()
                }),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = match updated.into_iter().next() {
            Some(appointment) => appointment,
            None => {
                let latest = self.get_appointment(appointment_id, auth_token).await?;
                return Err(AppointmentError::InvalidStatusTransition(latest.status));
            }
        };

        self.release_slot(appointment.slot_id, auth_token).await;

        info!("Appointment {} cancelled by patient {}", appointment_id, patient_id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone()).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })
    }

    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_appointments("patient_id", patient_id, auth_token).await
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_appointments("doctor_id", doctor_id, auth_token).await
    }

    async fn list_appointments(
        &self,
        filter_column: &str,
        id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?{}=eq.{}&order=date.desc,start_time.desc",
            filter_column, id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }

    async fn get_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, AppointmentError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::SlotNotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// Atomic claim: only succeeds if `is_booked` is still false at the store.
    async fn claim_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, AppointmentError> {
        let path = format!("/rest/v1/slots?id=eq.{}&is_booked=eq.false", slot_id);
        let claimed: Vec<Slot> = self
            .supabase
            .update_returning(
                &path,
                Some(auth_token),
                json!({
                    "is_booked": true,
                    "updated_at": Utc::now().to_rfc3339()
                }),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        claimed
            .into_iter()
            .next()
            .ok_or(AppointmentError::SlotAlreadyBooked)
    }

    /// Best-effort release; failure is logged, not surfaced, since the caller
    /// is already reporting a primary outcome.
    async fn release_slot(&self, slot_id: Uuid, auth_token: &str) {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let released: Result<Vec<Slot>, _> = self
            .supabase
            .update_returning(
                &path,
                Some(auth_token),
                json!({
                    "is_booked": false,
                    "updated_at": Utc::now().to_rfc3339()
                }),
            )
            .await;

        if let Err(e) = released {
            warn!("Failed to release slot {}: {}", slot_id, e);
        }
    }
}
