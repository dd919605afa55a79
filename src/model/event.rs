use chrono::{
    serde::{ts_milliseconds, ts_milliseconds_option},
    DateTime, Utc,
};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Upcoming,
    Active,
    Complete,
    Cancelled,
}

impl EventStatus {
    /// The status an event should have at `now`, derived from its schedule
    /// alone. `Cancelled` is never returned here: cancellation is an explicit
    /// organizer action, invisible to schedule-based recomputation.
    pub fn compute(
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        if now < start_at {
            return Self::Upcoming;
        }
        match end_at {
            Some(end_at) if now > end_at => Self::Complete,
            // An event without an end time stays active here; the scheduler's
            // timeout rule is what eventually completes it.
            _ => Self::Active,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, Eq, PartialEq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum EventType {
    Game,
    #[default]
    Event,
    Training,
}

#[derive(FromRow, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub description: Option<String>,
    pub sport: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds_option")]
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: EventStatus,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds_option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(FromRow, Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParticipant {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    #[serde(with = "ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCreateInput {
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    pub title: String,
    pub description: Option<String>,
    pub sport: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub start_at: DateTime<Utc>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Fields left out of an update payload keep their current value. The status
/// is never part of the payload: it is recomputed from the updated times.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdateInput {
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sport: Option<String>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub end_at: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn upcoming_before_start() {
        let now = Utc::now();
        let status = EventStatus::compute(now + Duration::hours(1), None, now);
        assert_eq!(status, EventStatus::Upcoming);

        let status =
            EventStatus::compute(now + Duration::hours(1), Some(now + Duration::hours(2)), now);
        assert_eq!(status, EventStatus::Upcoming);
    }

    #[test]
    fn active_between_start_and_end() {
        let now = Utc::now();
        let status =
            EventStatus::compute(now - Duration::hours(1), Some(now + Duration::hours(1)), now);
        assert_eq!(status, EventStatus::Active);
    }

    #[test]
    fn active_exactly_at_boundaries() {
        let now = Utc::now();
        // now == start_at starts the event; now == end_at has not ended it yet.
        assert_eq!(
            EventStatus::compute(now, Some(now + Duration::hours(1)), now),
            EventStatus::Active
        );
        assert_eq!(
            EventStatus::compute(now - Duration::hours(1), Some(now), now),
            EventStatus::Active
        );
    }

    #[test]
    fn complete_after_end() {
        let now = Utc::now();
        let status = EventStatus::compute(
            now - Duration::hours(2),
            Some(now - Duration::minutes(1)),
            now,
        );
        assert_eq!(status, EventStatus::Complete);
    }

    #[test]
    fn open_ended_stays_active() {
        let now = Utc::now();
        // No end time: still active even long after the start. Completing
        // these is the scheduler's timeout rule, not the pure computation.
        let status = EventStatus::compute(now - Duration::hours(5), None, now);
        assert_eq!(status, EventStatus::Active);
    }
}
