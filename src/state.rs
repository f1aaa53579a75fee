//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::store::BillingStore;
use crate::stripe::StripeApi;
use crate::webhooks::{WebhookContext, WebhookRegistry};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub stripe: Arc<dyn StripeApi>,
    pub registry: Arc<WebhookRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BillingStore>,
        stripe: Arc<dyn StripeApi>,
        registry: Arc<WebhookRegistry>,
    ) -> Self {
        Self {
            store,
            stripe,
            registry,
        }
    }

    pub fn webhook_context(&self) -> WebhookContext<'_> {
        WebhookContext {
            store: self.store.as_ref(),
            stripe: self.stripe.as_ref(),
        }
    }
}
