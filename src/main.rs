use std::{env, sync::Arc};

use axum::{routing::get, Router};
use events::NotificationHub;
use service::event_status::EventStatusUpdater;
use tokio::net::TcpListener;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use sqlx::PgPool;

mod config;
mod events;
mod model;
mod repo;
mod routes;
mod service;
mod utils;

#[derive(Clone)]
struct AppState {
    db: PgPool,
    hub: NotificationHub,
    updater: Arc<EventStatusUpdater>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&db_url).await.unwrap();
    init_db(&pool).await;

    // The hub and the updater are built here and handed down; nothing else
    // creates them.
    let hub = NotificationHub::new();
    let updater = Arc::new(EventStatusUpdater::new(
        Arc::new(pool.clone()),
        config::SWEEP_INTERVAL,
    ));
    updater.start().await;

    let state = AppState {
        db: pool,
        hub,
        updater: updater.clone(),
    };

    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .merge(routes::create_router())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    let listener = TcpListener::bind((
        env::var("LISTEN_ADDRESS").unwrap_or("0.0.0.0".to_string()),
        env::var("PORT")
            .map(|p| p.parse().unwrap_or(3000))
            .unwrap_or(3000),
    ))
    .await
    .unwrap();
    tracing::info!("Listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    updater.stop().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
}

async fn init_db(db: &PgPool) {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .expect("Failed to run migrations");
}
