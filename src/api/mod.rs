//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::http::HeaderName;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::ledger::LedgerEngine;
use crate::store::LedgerStore;

pub use routes::create_router;

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Full application: `/health` plus the ledger routes under `/api/v1`
pub fn app<S: LedgerStore>(engine: Arc<LedgerEngine<S>>) -> Router {
    let request_id = HeaderName::from_static(middleware::REQUEST_ID_HEADER);

    let api_routes =
        create_router::<S>().layer(axum::middleware::from_fn(middleware::logging_middleware));

    // ServiceBuilder runs top to bottom: request id -> trace -> routes
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(engine)
}
