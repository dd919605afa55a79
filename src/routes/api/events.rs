use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use macros::JsonErrorResponse;
use serde_json::json;
use uuid::Uuid;

use crate::{
    model::{
        event::{EventCreateInput, EventStatus, EventUpdateInput},
        notification::{NotificationCreateInput, NotificationType},
    },
    repo::event::EventRepo,
    service::notification::NotificationService,
    utils::{error::ErrorResponse, extractors::AuthUser, response::Metadata},
    AppState,
};

pub async fn post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<EventCreateInput>,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    // Creation may happen after the start time has already passed, so the
    // initial status comes from the schedule, never from the client.
    let status = EventStatus::compute(payload.start_at, payload.end_at, Utc::now());
    let event = EventRepo::create_one(payload, user_id, status, &mut conn)
        .await
        .map_err(|_| EventError::DatabaseError)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "event": event,
            "_metadata": Metadata::default(),
        })),
    )
        .into_response())
}

pub async fn get_by_id(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let event = EventRepo::get_by_id(id, &mut conn)
        .await
        .map_err(|_| EventError::NotFound)?;
    let participants = EventRepo::count_participants(id, &mut conn)
        .await
        .unwrap_or(0);
    Ok(Json(json!({
        "event": event,
        "participants": participants,
        "_metadata": Metadata::default(),
    }))
    .into_response())
}

pub async fn put(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<EventUpdateInput>,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let mut event = EventRepo::get_by_id(id, &mut conn)
        .await
        .map_err(|_| EventError::NotFound)?;
    if event.organizer_id != user_id {
        return Err(EventError::Forbidden);
    }

    if let Some(event_type) = payload.event_type {
        event.event_type = event_type;
    }
    if let Some(title) = payload.title {
        event.title = title;
    }
    if let Some(description) = payload.description {
        event.description = Some(description);
    }
    if let Some(sport) = payload.sport {
        event.sport = Some(sport);
    }
    if let Some(start_at) = payload.start_at {
        event.start_at = start_at;
    }
    if let Some(end_at) = payload.end_at {
        event.end_at = Some(end_at);
    }
    if let Some(capacity) = payload.capacity {
        event.capacity = Some(capacity);
    }
    if let Some(location_name) = payload.location_name {
        event.location_name = Some(location_name);
    }
    if let Some(latitude) = payload.latitude {
        event.latitude = Some(latitude);
    }
    if let Some(longitude) = payload.longitude {
        event.longitude = Some(longitude);
    }

    // The times may have moved; recompute instead of trusting any client
    // value.
    event.status = EventStatus::compute(event.start_at, event.end_at, Utc::now());

    let event = EventRepo::update_one(&event, &mut conn)
        .await
        .map_err(|_| EventError::DatabaseError)?;

    if let Err(e) =
        NotificationService::notify_event_participants(&event, "Activity updated", &state.hub, &mut conn)
            .await
    {
        tracing::error!("failed to notify participants of update: {e}");
    }

    Ok(Json(json!({
        "event": event,
        "_metadata": Metadata::default(),
    }))
    .into_response())
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let event = EventRepo::get_by_id(id, &mut conn)
        .await
        .map_err(|_| EventError::NotFound)?;
    if event.organizer_id != user_id {
        return Err(EventError::Forbidden);
    }

    let event = EventRepo::cancel_one(id, &mut conn)
        .await
        .map_err(|_| EventError::DatabaseError)?;

    if let Err(e) =
        NotificationService::notify_event_participants(&event, "Activity cancelled", &state.hub, &mut conn)
            .await
    {
        tracing::error!("failed to notify participants of cancellation: {e}");
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn join(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let event = EventRepo::get_by_id(id, &mut conn)
        .await
        .map_err(|_| EventError::NotFound)?;

    if let Some(capacity) = event.capacity {
        let count = EventRepo::count_participants(id, &mut conn)
            .await
            .map_err(|_| EventError::DatabaseError)?;
        if count >= capacity as i64 {
            return Err(EventError::EventFull);
        }
    }

    let participant = EventRepo::add_participant(id, user_id, &mut conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                EventError::AlreadyJoined
            }
            _ => EventError::DatabaseError,
        })?;

    if user_id != event.organizer_id {
        let input = NotificationCreateInput {
            user_id: event.organizer_id,
            actor_id: Some(user_id),
            notification_type: NotificationType::Message,
            payload: json!({
                "title": "New participant joined",
                "body": event.title,
                "target_type": "activity",
                "target_id": event.id,
            }),
        };
        if let Err(e) = NotificationService::create_and_publish(input, &state.hub, &mut conn).await
        {
            tracing::error!("failed to notify organizer of join: {e}");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "participant": participant,
            "_metadata": Metadata::default(),
        })),
    )
        .into_response())
}

pub async fn leave(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let removed = EventRepo::remove_participant(id, user_id, &mut conn)
        .await
        .map_err(|_| EventError::DatabaseError)?;
    if removed == 0 {
        return Err(EventError::NotParticipating);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn participants(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> EventResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let participants = EventRepo::list_participants(id, &mut conn)
        .await
        .map_err(|_| EventError::DatabaseError)?;
    let count = participants.len() as i64;
    Ok(Json(json!({
        "participants": participants,
        "_metadata": Metadata {
            total_count: Some(count),
            ..Default::default()
        },
    }))
    .into_response())
}

#[derive(thiserror::Error, Debug, JsonErrorResponse)]
pub enum EventError {
    #[error("Event not found")]
    #[status_code(StatusCode::NOT_FOUND)]
    NotFound,

    #[error("You can only modify your own events")]
    #[status_code(StatusCode::FORBIDDEN)]
    Forbidden,

    #[error("Event is full")]
    #[status_code(StatusCode::CONFLICT)]
    EventFull,

    #[error("Already joined this event")]
    #[status_code(StatusCode::CONFLICT)]
    AlreadyJoined,

    #[error("Not a participant of this event")]
    #[status_code(StatusCode::BAD_REQUEST)]
    NotParticipating,

    #[error("Database error")]
    #[status_code(StatusCode::INTERNAL_SERVER_ERROR)]
    DatabaseError,
}

pub type EventResult = Result<Response, EventError>;
