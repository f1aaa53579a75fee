//! Billing webhook sync service.
//!
//! Receives payment processor webhooks, keeps an append-only event log, and
//! mirrors the objects each event concerns (customers, charges, invoices,
//! subscriptions, cards, transfers, connected accounts) into PostgreSQL.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, behind the [`store::BillingStore`] trait
//! - **Processor API**: reqwest client behind the [`stripe::StripeApi`] trait
//! - **Dispatch**: [`webhooks::WebhookRegistry`] maps event kinds to handlers
//! - **Admin API**: API key with SHA-256 hashing

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod stripe;
pub mod webhooks;

#[cfg(test)]
mod test_support;

pub use routes::build_router;
pub use state::AppState;
