//! Business logic services.
//!
//! Services mirror processor objects into the local store. They are called
//! by webhook handlers and the admin API, and take the store and processor
//! client as trait objects so they run unchanged against test doubles.

pub mod account_service;
pub mod amounts;
pub mod charge_service;
pub mod customer_service;
pub mod exception_service;
pub mod invoice_service;
pub mod resync_service;
pub mod source_service;
pub mod subscription_service;
pub mod transfer_service;
