use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    parse_calendar_date, parse_time_of_day, AvailabilityError, CreateAvailabilityRequest,
    DaySchedule, Slot, UpdateSlotRequest, DEFAULT_SESSION_MINUTES, MAX_SESSION_MINUTES,
    MIN_SESSION_MINUTES,
};

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Publish a batch of slots: the Cartesian product of the requested dates
    /// and times, inserted as one bulk statement. Validation happens entirely
    /// before the write, so an invalid date fails the whole batch with no
    /// slots committed; a uniqueness violation aborts the same way because the
    /// bulk insert is a single statement.
    pub async fn create_availability(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
        auth_token: Option<&str>,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        debug!("Creating availability batch for doctor: {}", doctor_id);

        if request.available_dates.is_empty() {
            return Err(AvailabilityError::ValidationError(
                "At least one date is required".to_string(),
            ));
        }
        if request.available_times.is_empty() {
            return Err(AvailabilityError::ValidationError(
                "At least one time is required".to_string(),
            ));
        }
        if request.location.trim().is_empty() {
            return Err(AvailabilityError::ValidationError(
                "Location must not be empty".to_string(),
            ));
        }

        let dates = request
            .available_dates
            .iter()
            .map(|d| parse_calendar_date(d))
            .collect::<Result<Vec<_>, _>>()?;

        let times = request
            .available_times
            .iter()
            .map(|t| parse_time_of_day(t))
            .collect::<Result<Vec<_>, _>>()?;

        // Out-of-range durations are clamped by the data model, not rejected.
        let duration_minutes = request
            .session_duration
            .unwrap_or(DEFAULT_SESSION_MINUTES)
            .clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES);

        let now = Utc::now().to_rfc3339();
        let mut rows = Vec::with_capacity(dates.len() * times.len());
        for date in &dates {
            for time in &times {
                rows.push(json!({
                    "doctor_id": doctor_id.to_string(),
                    "date": date.to_string(),
                    "start_time": time.format("%H:%M:%S").to_string(),
                    "location": request.location,
                    "duration_minutes": duration_minutes,
                    "is_booked": false,
                    "created_at": now,
                    "updated_at": now
                }));
            }
        }

        let created: Vec<Slot> = self
            .supabase
            .insert_returning("/rest/v1/slots", auth_token, Value::Array(rows))
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.starts_with("Conflict") {
                    warn!("Slot batch for doctor {} hit the uniqueness constraint", doctor_id);
                    AvailabilityError::DuplicateSlot
                } else {
                    AvailabilityError::DatabaseError(message)
                }
            })?;

        debug!("Created {} slots for doctor {}", created.len(), doctor_id);
        Ok(created)
    }

    /// All slots for a doctor, grouped into day buckets for display.
    pub async fn get_doctor_availability(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<DaySchedule>, AvailabilityError> {
        debug!("Fetching availability for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&order=date.asc,start_time.asc",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let slots: Vec<Slot> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Slot>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slots: {}", e)))?;

        Ok(DaySchedule::group(&slots))
    }

    pub async fn get_slot(
        &self,
        slot_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Slot, AvailabilityError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AvailabilityError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// Partial update of a single slot's date, time, location or duration.
    pub async fn update_slot(
        &self,
        slot_id: Uuid,
        request: UpdateSlotRequest,
        auth_token: Option<&str>,
    ) -> Result<Slot, AvailabilityError> {
        debug!("Updating slot: {}", slot_id);

        let mut update_data = serde_json::Map::new();

        if let Some(date) = request.date {
            update_data.insert("date".to_string(), json!(date.to_string()));
        }
        if let Some(ref start_time) = request.start_time {
            let time = parse_time_of_day(start_time)?;
            update_data.insert(
                "start_time".to_string(),
                json!(time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(ref location) = request.location {
            if location.trim().is_empty() {
                return Err(AvailabilityError::ValidationError(
                    "Location must not be empty".to_string(),
                ));
            }
            update_data.insert("location".to_string(), json!(location));
        }
        if let Some(duration) = request.duration_minutes {
            update_data.insert(
                "duration_minutes".to_string(),
                json!(duration.clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES)),
            );
        }

        if update_data.is_empty() {
            return Err(AvailabilityError::ValidationError(
                "No fields to update".to_string(),
            ));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        let result: Vec<Slot> = self
            .supabase
            .update_returning(&path, auth_token, Value::Object(update_data))
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.starts_with("Conflict") {
                    AvailabilityError::DuplicateSlot
                } else {
                    AvailabilityError::DatabaseError(message)
                }
            })?;

        result.into_iter().next().ok_or(AvailabilityError::NotFound)
    }

    /// Delete an unbooked slot. A booked slot is refused so the appointment
    /// holding it never ends up with a dangling slot reference.
    pub async fn delete_slot(
        &self,
        slot_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Slot, AvailabilityError> {
        debug!("Deleting slot: {}", slot_id);

        let slot = self.get_slot(slot_id, auth_token).await?;

        if slot.is_booked {
            warn!("Refusing to delete booked slot {}", slot_id);
            return Err(AvailabilityError::SlotBooked);
        }

        let path = format!("/rest/v1/slots?id=eq.{}&is_booked=eq.false", slot_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, auth_token, None, Some(headers))
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        // The filter re-checks is_booked at delete time; a concurrent booking
        // between the read and the delete leaves the row in place.
        if deleted.is_empty() {
            return Err(AvailabilityError::SlotBooked);
        }

        Ok(slot)
    }
}
