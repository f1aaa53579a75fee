//! Data models representing database entities.
//!
//! Every mirrored processor object is unique by its processor id
//! (`stripe_id`); `*Upsert` structs carry the fields a sync writes.

/// Connected account model
pub mod account;
/// Admin API key model
pub mod api_key;
pub mod card;
pub mod charge;
pub mod customer;
/// Webhook event log
pub mod event;
pub mod invoice;
pub mod subscription;
pub mod transfer;
