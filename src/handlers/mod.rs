//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into the store, services or webhook registry
//! 3. Returns HTTP response (JSON, status code)

/// Admin charge lookups
pub mod charges;
/// Admin event log endpoints
pub mod events;
pub mod health;
/// Admin resync from the processor's list endpoints
pub mod resync;
/// Admin transfer endpoints
pub mod transfers;
/// Processor webhook receiver
pub mod webhooks;
