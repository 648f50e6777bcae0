use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::{Stream, StreamExt};
use serde_json::json;

use crate::error::ServiceError;

use super::AppState;

pub fn streaming_router() -> Router<AppState> {
    Router::new()
        .route("/api/gameservers/{id}/logs", get(stream_logs))
        .route("/api/gameservers/{id}/stats", get(stream_stats))
}

/// `event: log` SSE stream of a container's combined stdout/stderr. Ends
/// with a terminal `event: error` frame on driver failure (spec §7: "Streams
/// that fail mid-flight emit a final `event: error` SSE frame and close").
async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let upstream = state.service.stream_gameserver_logs(&id).await?;

    let events = upstream.map(|item| match item {
        Ok(chunk) => Ok(Event::default().event("log").data(String::from_utf8_lossy(&chunk).to_string())),
        Err(err) => Ok(Event::default().event("error").data(err.to_string())),
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// `event: stats` SSE stream, JSON body `{cpu, memoryUsageGB, memoryLimitGB}`
/// per spec §6's documented SSE payload shape.
async fn stream_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let upstream = state.service.stream_gameserver_stats(&id).await?;

    let events = upstream.map(|item| match item {
        Ok(sample) => {
            let payload = json!({
                "cpu": sample.cpu_percent,
                "memoryUsageGB": sample.memory_usage_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
                "memoryLimitGB": sample.memory_limit_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            });
            Ok(Event::default().event("stats").data(payload.to_string()))
        }
        Err(err) => Ok(Event::default().event("error").data(err.to_string())),
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
