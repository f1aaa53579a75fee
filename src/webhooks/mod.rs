//! Webhook dispatch: registry, handlers and signals.
//!
//! The receiver stores every posted event, then asks the
//! [`WebhookRegistry`] for a [`Webhook`] bound to it and runs
//! [`Webhook::process`].

pub mod handler;
pub mod kinds;
pub mod registry;
pub mod signal;

pub use handler::{ProcessOutcome, Webhook, WebhookContext, WebhookHandler};
pub use registry::{RegistryError, WebhookRegistry};
pub use signal::{LogReceiver, Signal, SignalReceiver};
