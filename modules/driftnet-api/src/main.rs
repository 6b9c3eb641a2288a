//! Read-only status API over the harvest store: session window bounds,
//! record counts, most recent records. Never writes.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use driftnet_common::{Config, HarvestLog, Post};
use driftnet_harvester::store::{CheckpointStore, PgCheckpointStore, PgPostStore, PostStore};

pub struct AppState {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub posts: Arc<dyn PostStore>,
}

#[derive(Serialize)]
struct SessionStatus {
    id: Uuid,
    started_at: DateTime<Utc>,
    timeline_start_date: DateTime<Utc>,
    smallest_date: DateTime<Utc>,
    total_posts: i64,
}

async fn session_status(state: &AppState, log: HarvestLog) -> impl IntoResponse {
    match state.posts.count().await {
        Ok(total_posts) => Json(SessionStatus {
            id: log.id,
            started_at: log.started_at,
            timeline_start_date: log.timeline_start_date,
            smallest_date: log.smallest_date,
            total_posts,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to count posts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to count posts"})),
            )
                .into_response()
        }
    }
}

async fn latest_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.checkpoints.latest().await {
        Ok(Some(log)) => session_status(&state, log).await.into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No harvest session yet"})),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to look up latest session");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to look up latest session"})),
            )
                .into_response()
        }
    }
}

async fn session_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.checkpoints.get(id).await {
        Ok(Some(log)) => session_status(&state, log).await.into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("No harvest session {id}")})),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to look up session");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to look up session"})),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct RecentPosts {
    posts: Vec<Post>,
}

async fn recent_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    match state.posts.recent(limit).await {
        Ok(posts) => Json(RecentPosts { posts }).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to fetch recent posts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to fetch recent posts"})),
            )
                .into_response()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("driftnet=info".parse()?))
        .init();

    let config = Config::api_from_env();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let state = Arc::new(AppState {
        checkpoints: Arc::new(PgCheckpointStore::new(pool.clone())),
        posts: Arc::new(PgPostStore::new(pool)),
    });

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/sessions/latest", get(latest_session))
        .route("/sessions/{id}", get(session_by_id))
        .route("/posts/recent", get(recent_posts))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Driftnet status API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
