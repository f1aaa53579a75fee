//! Kind-to-handler registry.
//!
//! Built once at startup and shared read-only through `AppState`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::event::Event;
use crate::webhooks::handler::{Webhook, WebhookHandler};
use crate::webhooks::kinds;
use crate::webhooks::signal::{Signal, SignalReceiver};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a webhook handler for {0} is already registered")]
    Duplicate(String),
}

/// Handlers and signals keyed by event kind.
#[derive(Default)]
pub struct WebhookRegistry {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
    signals: HashMap<String, Arc<Signal>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every supported kind.
    pub fn with_default_handlers() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for handler in kinds::default_handlers() {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    /// Register `handler` under the kind it declares and create that kind's
    /// signal.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: the kind already has a handler
    pub fn register(&mut self, handler: Arc<dyn WebhookHandler>) -> Result<(), RegistryError> {
        let kind = handler.name().to_string();
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::Duplicate(kind));
        }

        self.signals
            .insert(kind.clone(), Arc::new(Signal::new(kind.clone())));
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn WebhookHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Signal for `kind`, or `None` when no handler is registered for it.
    pub fn get_signal(&self, kind: &str) -> Option<Arc<Signal>> {
        self.signals.get(kind).cloned()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// `(kind, description)` for every registered handler, sorted by kind.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        let mut described: Vec<(&str, &str)> = self
            .handlers
            .iter()
            .map(|(kind, handler)| (kind.as_str(), handler.description()))
            .collect();
        described.sort_unstable_by_key(|(kind, _)| *kind);
        described
    }

    /// Connect `receiver` to every registered kind's signal.
    pub fn connect_all(&self, receiver: Arc<dyn SignalReceiver>) {
        for signal in self.signals.values() {
            signal.connect(receiver.clone());
        }
    }

    /// Bind the handler registered for the event's kind to the event.
    ///
    /// Returns `Ok(None)` when the kind has no handler.
    pub fn webhook_for(&self, event: Event) -> AppResult<Option<Webhook>> {
        let Some(handler) = self.get(&event.kind) else {
            return Ok(None);
        };
        let signal = self.get_signal(&event.kind);
        Webhook::new(handler, signal, event).map(Some)
    }
}
