//! HTTP router assembly.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

/// Build the full application router.
///
/// # Routes
///
/// Public:
/// - `GET /health`
/// - `POST /webhooks/stripe`
///
/// Admin (Bearer API key):
/// - `GET /api/v1/events`
/// - `GET /api/v1/events/{stripe_id}`
/// - `GET /api/v1/transfers?year=&month=`
/// - `POST /api/v1/transfers/{stripe_id}/refresh`
/// - `GET /api/v1/charges/{stripe_id}`
/// - `GET /api/v1/webhooks/kinds`
/// - `POST /api/v1/resync`
/// - `POST /api/v1/resync/availability`
/// - `POST /api/v1/resync/customers/{stripe_id}`
pub fn build_router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        .route("/api/v1/events", get(handlers::events::list_events))
        .route("/api/v1/events/{stripe_id}", get(handlers::events::get_event))
        .route(
            "/api/v1/transfers",
            get(handlers::transfers::list_transfers),
        )
        .route(
            "/api/v1/transfers/{stripe_id}/refresh",
            post(handlers::transfers::refresh_transfer),
        )
        .route(
            "/api/v1/charges/{stripe_id}",
            get(handlers::charges::get_charge),
        )
        .route(
            "/api/v1/webhooks/kinds",
            get(handlers::webhooks::list_webhook_kinds),
        )
        .route("/api/v1/resync", post(handlers::resync::resync_all))
        .route(
            "/api/v1/resync/availability",
            post(handlers::resync::update_charge_availability),
        )
        .route(
            "/api/v1/resync/customers/{stripe_id}",
            post(handlers::resync::resync_customer),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        // The processor authenticates by event re-fetch, not by API key
        .route(
            "/webhooks/stripe",
            post(handlers::webhooks::receive_stripe_webhook),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
