use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::AppState;

pub mod api;

pub fn create_router() -> Router<AppState> {
    Router::new().nest(
        "/api/rest",
        Router::new()
            .route("/events", post(api::events::post))
            .route(
                "/events/:id",
                get(api::events::get_by_id)
                    .put(api::events::put)
                    .delete(api::events::delete),
            )
            .route("/events/:id/join", post(api::events::join))
            .route("/events/:id/leave", delete(api::events::leave))
            .route("/events/:id/participants", get(api::events::participants))
            .route("/notifications", get(api::notifications::get))
            .route(
                "/notifications/:id/read",
                patch(api::notifications::mark_read),
            )
            .route(
                "/notifications/mark-all-read",
                post(api::notifications::mark_all_read),
            )
            .route("/notifications/stream", get(api::notifications::stream))
            .route("/admin/events/sweep", post(api::admin::sweep))
            .route("/admin/events/stale", get(api::admin::stale_events)),
    )
}
