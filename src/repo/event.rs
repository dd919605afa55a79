use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    config,
    model::event::{Event, EventCreateInput, EventParticipant, EventStatus},
    service::event_status::EventStore,
};

#[derive(Clone)]
pub struct EventRepo;

impl EventRepo {
    pub async fn create_one(
        input: EventCreateInput,
        organizer_id: Uuid,
        status: EventStatus,
        db: &mut PgConnection,
    ) -> sqlx::Result<Event> {
        sqlx::query_as::<_, Event>(
            r#"INSERT INTO event (organizer_id, type, title, description, sport, start_at, end_at, capacity, location_name, latitude, longitude, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *"#,
        )
        .bind(organizer_id)
        .bind(input.event_type)
        .bind(input.title)
        .bind(input.description)
        .bind(input.sport)
        .bind(input.start_at)
        .bind(input.end_at)
        .bind(input.capacity)
        .bind(input.location_name)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(status)
        .fetch_one(db)
        .await
    }

    pub async fn get_by_id(id: Uuid, db: &mut PgConnection) -> sqlx::Result<Event> {
        sqlx::query_as::<_, Event>(r#"SELECT * FROM event WHERE id = $1 AND deleted_at IS NULL"#)
            .bind(id)
            .fetch_one(db)
            .await
    }

    /// Persists an already-edited event row. The caller recomputes the
    /// status from the edited times before saving; a client-supplied status
    /// never reaches this.
    pub async fn update_one(event: &Event, db: &mut PgConnection) -> sqlx::Result<Event> {
        sqlx::query_as::<_, Event>(
            r#"UPDATE event
               SET type = $2, title = $3, description = $4, sport = $5, start_at = $6, end_at = $7,
                   capacity = $8, location_name = $9, latitude = $10, longitude = $11, status = $12,
                   updated_at = now()
               WHERE id = $1 AND deleted_at IS NULL RETURNING *"#,
        )
        .bind(event.id)
        .bind(event.event_type)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.sport)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.capacity)
        .bind(&event.location_name)
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(event.status)
        .fetch_one(db)
        .await
    }

    /// Cancellation is terminal: the row is marked cancelled and soft
    /// deleted in one statement, so no later sweep or update can revive it.
    pub async fn cancel_one(id: Uuid, db: &mut PgConnection) -> sqlx::Result<Event> {
        sqlx::query_as::<_, Event>(
            r#"UPDATE event SET status = 'cancelled', updated_at = now(), deleted_at = now()
               WHERE id = $1 AND deleted_at IS NULL RETURNING *"#,
        )
        .bind(id)
        .fetch_one(db)
        .await
    }

    pub async fn add_participant(
        event_id: Uuid,
        user_id: Uuid,
        db: &mut PgConnection,
    ) -> sqlx::Result<EventParticipant> {
        sqlx::query_as::<_, EventParticipant>(
            r#"INSERT INTO event_participant (event_id, user_id, role) VALUES ($1, $2, 'participant') RETURNING *"#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(db)
        .await
    }

    pub async fn remove_participant(
        event_id: Uuid,
        user_id: Uuid,
        db: &mut PgConnection,
    ) -> sqlx::Result<u64> {
        sqlx::query(r#"DELETE FROM event_participant WHERE event_id = $1 AND user_id = $2"#)
            .bind(event_id)
            .bind(user_id)
            .execute(db)
            .await
            .map(|r| r.rows_affected())
    }

    pub async fn list_participants(
        event_id: Uuid,
        db: &mut PgConnection,
    ) -> sqlx::Result<Vec<EventParticipant>> {
        sqlx::query_as::<_, EventParticipant>(
            r#"SELECT * FROM event_participant WHERE event_id = $1 ORDER BY joined_at"#,
        )
        .bind(event_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_participant_ids(
        event_id: Uuid,
        db: &mut PgConnection,
    ) -> sqlx::Result<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            r#"SELECT user_id FROM event_participant WHERE event_id = $1"#,
        )
        .bind(event_id)
        .fetch_all(db)
        .await
    }

    pub async fn count_participants(event_id: Uuid, db: &mut PgConnection) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM event_participant WHERE event_id = $1"#,
        )
        .bind(event_id)
        .fetch_one(db)
        .await
    }

    pub async fn activate_started(now: DateTime<Utc>, db: &mut PgConnection) -> sqlx::Result<u64> {
        sqlx::query(
            r#"UPDATE event SET status = 'active', updated_at = now()
               WHERE status = 'upcoming' AND start_at <= $1 AND deleted_at IS NULL"#,
        )
        .bind(now)
        .execute(db)
        .await
        .map(|r| r.rows_affected())
    }

    pub async fn complete_ended(now: DateTime<Utc>, db: &mut PgConnection) -> sqlx::Result<u64> {
        sqlx::query(
            r#"UPDATE event SET status = 'complete', updated_at = now()
               WHERE status = 'active' AND end_at IS NOT NULL AND end_at <= $1 AND deleted_at IS NULL"#,
        )
        .bind(now)
        .execute(db)
        .await
        .map(|r| r.rows_affected())
    }

    pub async fn complete_overrunning(
        cutoff: DateTime<Utc>,
        db: &mut PgConnection,
    ) -> sqlx::Result<u64> {
        sqlx::query(
            r#"UPDATE event SET status = 'complete', updated_at = now()
               WHERE status = 'active' AND end_at IS NULL AND start_at <= $1 AND deleted_at IS NULL"#,
        )
        .bind(cutoff)
        .execute(db)
        .await
        .map(|r| r.rows_affected())
    }

    pub async fn find_stale(now: DateTime<Utc>, db: &mut PgConnection) -> sqlx::Result<Vec<Event>> {
        let cutoff = now - chrono::Duration::minutes(config::OPEN_ENDED_EVENT_TIMEOUT_MINUTES);
        sqlx::query_as::<_, Event>(
            r#"SELECT * FROM event
               WHERE deleted_at IS NULL AND (
                   (status = 'upcoming' AND start_at <= $1)
                   OR (status = 'active' AND end_at IS NOT NULL AND end_at <= $1)
                   OR (status = 'active' AND end_at IS NULL AND start_at <= $2)
               )
               ORDER BY start_at"#,
        )
        .bind(now)
        .bind(cutoff)
        .fetch_all(db)
        .await
    }
}

#[async_trait]
impl EventStore for PgPool {
    async fn activate_started(&self, now: DateTime<Utc>) -> sqlx::Result<u64> {
        let mut conn = self.acquire().await?;
        EventRepo::activate_started(now, &mut conn).await
    }

    async fn complete_ended(&self, now: DateTime<Utc>) -> sqlx::Result<u64> {
        let mut conn = self.acquire().await?;
        EventRepo::complete_ended(now, &mut conn).await
    }

    async fn complete_overrunning(&self, cutoff: DateTime<Utc>) -> sqlx::Result<u64> {
        let mut conn = self.acquire().await?;
        EventRepo::complete_overrunning(cutoff, &mut conn).await
    }

    async fn find_stale(&self, now: DateTime<Utc>) -> sqlx::Result<Vec<Event>> {
        let mut conn = self.acquire().await?;
        EventRepo::find_stale(now, &mut conn).await
    }
}
