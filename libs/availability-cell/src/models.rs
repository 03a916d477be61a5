use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_SESSION_MINUTES: i32 = 15;
pub const MAX_SESSION_MINUTES: i32 = 120;
pub const DEFAULT_SESSION_MINUTES: i32 = 30;

/// A doctor-published bookable time window. `(doctor_id, date, start_time)`
/// is unique at the store level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub location: String,
    pub duration_minutes: i32,
    pub is_booked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAvailabilityRequest {
    #[serde(alias = "availableDates")]
    pub available_dates: Vec<String>,

    #[serde(alias = "availableTimes")]
    pub available_times: Vec<String>,

    pub location: String,

    #[serde(alias = "sessionDuration")]
    pub session_duration: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSlotRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "sessionDuration")]
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub id: Uuid,
    pub start_time: NaiveTime,
    pub location: String,
    pub duration_minutes: i32,
    pub is_booked: bool,
}

impl From<&Slot> for SlotView {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id,
            start_time: slot.start_time,
            location: slot.location.clone(),
            duration_minutes: slot.duration_minutes,
            is_booked: slot.is_booked,
        }
    }
}

/// Read-time grouping of a doctor's slots by calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub slots: Vec<SlotView>,
}

impl DaySchedule {
    /// Group slots into day buckets. Input is expected ordered by date then
    /// start time; the grouping preserves that order.
    pub fn group(slots: &[Slot]) -> Vec<DaySchedule> {
        let mut days: Vec<DaySchedule> = Vec::new();

        for slot in slots {
            match days.last_mut() {
                Some(day) if day.date == slot.date => day.slots.push(slot.into()),
                _ => days.push(DaySchedule {
                    date: slot.date,
                    slots: vec![slot.into()],
                }),
            }
        }

        days
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Slot not found")]
    NotFound,

    #[error("Slot is booked; cancel the appointment before deleting it")]
    SlotBooked,

    #[error("Doctor already has a slot at one of the requested date/time combinations")]
    DuplicateSlot,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Accepts "HH:MM" from clients, "HH:MM:SS" from the store.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, AvailabilityError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AvailabilityError::ValidationError(format!("Invalid time of day: {}", value)))
}

pub fn parse_calendar_date(value: &str) -> Result<NaiveDate, AvailabilityError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AvailabilityError::ValidationError(format!("Invalid calendar date: {}", value)))
}
