//! Request middleware for the admin API.
//!
//! The webhook receiver is public; only `/api/v1` routes pass through
//! [`auth::auth_middleware`].

/// Bearer API key check against the store
pub mod auth;
