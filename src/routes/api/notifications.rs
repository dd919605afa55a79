use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures::{future, stream, Stream, StreamExt};
use macros::JsonErrorResponse;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    repo::{notification::NotificationRepo, DatabasePagination},
    service::auth::{AuthError, AuthService},
    utils::{error::ErrorResponse, extractors::AuthUser, response::Metadata},
    AppState,
};

fn default_limit() -> i64 {
    20
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    unread_only: bool,
}

pub async fn get(
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> NotificationResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| NotificationError::DatabaseError)?;
    let options = DatabasePagination {
        limit: query.limit.clamp(1, 100),
        offset: query.offset.max(0),
    };
    let notifications =
        NotificationRepo::list_for_user(user_id, query.unread_only, options, &mut conn)
            .await
            .map_err(|_| NotificationError::DatabaseError)?;
    let count = NotificationRepo::count_for_user(user_id, query.unread_only, &mut conn)
        .await
        .map_err(|_| NotificationError::DatabaseError)?;
    Ok(Json(json!({
        "notifications": notifications,
        "_metadata": Metadata {
            total_count: Some(count),
            ..Default::default()
        },
    }))
    .into_response())
}

pub async fn mark_read(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> NotificationResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| NotificationError::DatabaseError)?;
    let updated = NotificationRepo::mark_read(id, user_id, &mut conn)
        .await
        .map_err(|_| NotificationError::DatabaseError)?;
    if updated == 0 {
        return Err(NotificationError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> NotificationResult {
    let mut conn = state
        .db
        .acquire()
        .await
        .map_err(|_| NotificationError::DatabaseError)?;
    NotificationRepo::mark_all_read(user_id, &mut conn)
        .await
        .map_err(|_| NotificationError::DatabaseError)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Deserialize)]
pub struct StreamQuery {
    token: Option<String>,
}

/// Server-sent events stream of the caller's notifications. One subscription
/// per connection; everything published for the user while the connection is
/// open is pushed as a `data:` frame.
pub async fn stream(
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    // Browser EventSource clients cannot set headers, so the token may come
    // in as a query parameter instead. Both paths share the same validation.
    let token = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .or_else(|| query.token.clone())
        .ok_or_else(|| AuthError::MissingToken.into_response())?;
    let claims = AuthService::validate_token(&token).map_err(|e| e.into_response())?;

    let subscription = state.hub.subscribe(claims.sub);
    tracing::debug!(
        user_id = %subscription.user_id(),
        connections = state.hub.subscriber_count(claims.sub),
        "notification stream opened"
    );

    // The leading comment confirms the stream is open before anything is
    // published. When the client goes away the stream is dropped, and
    // dropping the subscription unregisters it from the hub.
    let stream = stream::once(future::ready(Ok::<_, Infallible>(
        Event::default().comment("ok"),
    )))
    .chain(subscription.filter_map(|notification| async move {
        match Event::default().json_data(&notification) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                tracing::error!("failed to serialize notification: {e}");
                None
            }
        }
    }));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(thiserror::Error, Debug, JsonErrorResponse)]
pub enum NotificationError {
    #[error("Notification not found")]
    #[status_code(StatusCode::NOT_FOUND)]
    NotFound,

    #[error("Database error")]
    #[status_code(StatusCode::INTERNAL_SERVER_ERROR)]
    DatabaseError,
}

pub type NotificationResult = Result<Response, NotificationError>;
