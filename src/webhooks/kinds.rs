//! Concrete handlers and the default kind table.
//!
//! Handlers are parameterised by the kind they are registered under, so one
//! type serves a whole family (`transfer.created`, `transfer.paid`, ...).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::customer::Customer;
use crate::models::event::Event;
use crate::services::{
    account_service, charge_service, customer_service, invoice_service, source_service,
    subscription_service, transfer_service,
};
use crate::stripe::objects::StripeCustomer;
use crate::webhooks::handler::{WebhookContext, WebhookHandler};

fn data_object_id(event: &Event) -> AppResult<&str> {
    event
        .data_object()
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::MalformedPayload(format!("event {} has no data.object.id", event.stripe_id))
        })
}

async fn linked_customer(ctx: WebhookContext<'_>, event: &Event) -> AppResult<Option<Customer>> {
    match event.customer_id {
        Some(id) => ctx.store.find_customer(id).await,
        None => Ok(None),
    }
}

macro_rules! named_handler {
    ($(#[$doc:meta])* $ty:ident) => {
        $(#[$doc])*
        pub struct $ty {
            name: &'static str,
            description: &'static str,
        }

        impl $ty {
            pub fn new(name: &'static str, description: &'static str) -> Self {
                Self { name, description }
            }
        }
    };
}

named_handler!(
    /// Kinds that are recorded but need no mirroring.
    NoopWebhook
);
named_handler!(
    /// `account.updated`: get-or-create the connected account.
    AccountUpdatedWebhook
);
named_handler!(
    /// `charge.*`: re-fetch the charge and sync it. Dispute events sync the
    /// disputed charge.
    ChargeWebhook
);
named_handler!(
    /// `customer.created` / `customer.updated`: sync from the event object.
    CustomerUpdatedWebhook
);
named_handler!(
    /// `customer.deleted`: purge the local customer.
    CustomerDeletedWebhook
);
named_handler!(
    /// `customer.source.created` / `customer.source.updated`.
    CustomerSourceWebhook
);
named_handler!(
    /// `customer.source.deleted`: drop the local card.
    CustomerSourceDeletedWebhook
);
named_handler!(
    /// `customer.subscription.*`: sync the subscription, then the customer.
    CustomerSubscriptionWebhook
);
named_handler!(
    /// `invoice.*`: sync the invoice and any charge that paid it.
    InvoiceWebhook
);
named_handler!(
    /// `transfer.*`: sync the transfer from the event object.
    TransferWebhook
);

#[async_trait]
impl WebhookHandler for NoopWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }
}

#[async_trait]
impl WebhookHandler for AccountUpdatedWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        account_service::sync_account(ctx.store, event.data_object()).await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for ChargeWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        let object = event.data_object();
        let charge_id = if object.get("object").and_then(Value::as_str) == Some("dispute") {
            object.get("charge").and_then(Value::as_str).ok_or_else(|| {
                AppError::MalformedPayload(format!("dispute in {} has no charge", event.stripe_id))
            })?
        } else {
            data_object_id(event)?
        };

        charge_service::sync_charge(
            ctx.store,
            ctx.stripe,
            charge_id,
            event.stripe_account.as_deref(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for CustomerUpdatedWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        let Some(customer) = linked_customer(ctx, event).await? else {
            return Ok(());
        };
        let object: StripeCustomer = serde_json::from_value(event.data_object().clone())?;

        customer_service::sync_customer(
            ctx.store,
            ctx.stripe,
            &customer,
            Some(object),
            event.stripe_account.as_deref(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for CustomerDeletedWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        if let Some(customer) = linked_customer(ctx, event).await? {
            customer_service::purge_customer(ctx.store, &customer).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for CustomerSourceWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        let customer = linked_customer(ctx, event).await?.ok_or_else(|| {
            AppError::NotFound(format!("Customer for event {}", event.stripe_id))
        })?;

        source_service::sync_payment_source(ctx.store, &customer, event.data_object()).await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for CustomerSourceDeletedWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        source_service::delete_card(ctx.store, data_object_id(event)?).await
    }
}

#[async_trait]
impl WebhookHandler for CustomerSubscriptionWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        let Some(customer) = linked_customer(ctx, event).await? else {
            return Ok(());
        };

        subscription_service::sync_subscription(ctx.store, &customer, event.data_object())
            .await?;
        customer_service::sync_customer(
            ctx.store,
            ctx.stripe,
            &customer,
            None,
            event.stripe_account.as_deref(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for InvoiceWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        invoice_service::sync_invoice(
            ctx.store,
            ctx.stripe,
            event.data_object(),
            event.stripe_account.as_deref(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookHandler for TransferWebhook {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn process_webhook(&self, ctx: WebhookContext<'_>, event: &Event) -> AppResult<()> {
        transfer_service::sync_transfer(ctx.store, event.data_object(), Some(event)).await?;
        Ok(())
    }
}

/// Which handler type serves a default kind.
#[derive(Clone, Copy)]
enum Family {
    Noop,
    Account,
    Charge,
    CustomerUpdated,
    CustomerDeleted,
    Source,
    SourceDeleted,
    Subscription,
    Invoice,
    Transfer,
}

const DEFAULT_KINDS: &[(&str, Family, &str)] = &[
    (
        "account.updated",
        Family::Account,
        "Occurs whenever an account status or property has changed.",
    ),
    (
        "account.application.deauthorized",
        Family::Noop,
        "Occurs whenever a user deauthorizes an application. Sent to the related application only.",
    ),
    (
        "account.external_account.created",
        Family::Noop,
        "Occurs whenever an external account is created.",
    ),
    (
        "account.external_account.deleted",
        Family::Noop,
        "Occurs whenever an external account is deleted.",
    ),
    (
        "account.external_account.updated",
        Family::Noop,
        "Occurs whenever an external account is updated.",
    ),
    (
        "application_fee.created",
        Family::Noop,
        "Occurs whenever an application fee is created on a charge.",
    ),
    (
        "application_fee.refunded",
        Family::Noop,
        "Occurs whenever an application fee is refunded, whether from refunding a charge or from refunding the application fee directly, including partial refunds.",
    ),
    (
        "application_fee.refund.updated",
        Family::Noop,
        "Occurs whenever an application fee refund is updated.",
    ),
    (
        "balance.available",
        Family::Noop,
        "Occurs whenever your Stripe balance has been updated (e.g. when a charge collected is available to be paid out).",
    ),
    (
        "charge.captured",
        Family::Charge,
        "Occurs whenever a previously uncaptured charge is captured.",
    ),
    ("charge.failed", Family::Charge, "Occurs whenever a failed charge attempt occurs."),
    (
        "charge.refunded",
        Family::Charge,
        "Occurs whenever a charge is refunded, including partial refunds.",
    ),
    (
        "charge.succeeded",
        Family::Charge,
        "Occurs whenever a new charge is created and is successful.",
    ),
    (
        "charge.updated",
        Family::Charge,
        "Occurs whenever a charge description or metadata is updated.",
    ),
    (
        "charge.dispute.closed",
        Family::Charge,
        "Occurs when the dispute is resolved and the dispute status changes to won or lost.",
    ),
    (
        "charge.dispute.created",
        Family::Charge,
        "Occurs whenever a customer disputes a charge with their bank (chargeback).",
    ),
    (
        "charge.dispute.funds_reinstated",
        Family::Charge,
        "Occurs when funds are reinstated to your account after a dispute is won.",
    ),
    (
        "charge.dispute.funds_withdrawn",
        Family::Charge,
        "Occurs when funds are removed from your account due to a dispute.",
    ),
    (
        "charge.dispute.updated",
        Family::Charge,
        "Occurs when the dispute is updated (usually with evidence).",
    ),
    ("coupon.created", Family::Noop, "Occurs whenever a coupon is created."),
    ("coupon.deleted", Family::Noop, "Occurs whenever a coupon is deleted."),
    ("coupon.updated", Family::Noop, "Occurs whenever a coupon is updated."),
    ("customer.created", Family::CustomerUpdated, "Occurs whenever a new customer is created."),
    ("customer.deleted", Family::CustomerDeleted, "Occurs whenever a customer is deleted."),
    (
        "customer.updated",
        Family::CustomerUpdated,
        "Occurs whenever any property of a customer changes.",
    ),
    (
        "customer.discount.created",
        Family::Noop,
        "Occurs whenever a coupon is attached to a customer.",
    ),
    (
        "customer.discount.deleted",
        Family::Noop,
        "Occurs whenever a customer's discount is removed.",
    ),
    (
        "customer.discount.updated",
        Family::Noop,
        "Occurs whenever a customer is switched from one coupon to another.",
    ),
    (
        "customer.source.created",
        Family::Source,
        "Occurs whenever a new source is created for the customer.",
    ),
    (
        "customer.source.deleted",
        Family::SourceDeleted,
        "Occurs whenever a source is removed from a customer.",
    ),
    ("customer.source.updated", Family::Source, "Occurs whenever a source's details are changed."),
    (
        "customer.subscription.created",
        Family::Subscription,
        "Occurs whenever a customer with no subscription is signed up for a plan.",
    ),
    (
        "customer.subscription.deleted",
        Family::Subscription,
        "Occurs whenever a customer ends their subscription.",
    ),
    (
        "customer.subscription.trial_will_end",
        Family::Subscription,
        "Occurs three days before the trial period of a subscription is scheduled to end.",
    ),
    (
        "customer.subscription.updated",
        Family::Subscription,
        "Occurs whenever a subscription changes. Examples would include switching from one plan to another, or switching status from trial to active.",
    ),
    ("invoice.created", Family::Invoice, "Occurs whenever a new invoice is created."),
    (
        "invoice.payment_failed",
        Family::Invoice,
        "Occurs whenever an invoice attempts to be paid, and the payment fails.",
    ),
    (
        "invoice.payment_succeeded",
        Family::Invoice,
        "Occurs whenever an invoice attempts to be paid, and the payment succeeds.",
    ),
    (
        "invoice.updated",
        Family::Invoice,
        "Occurs whenever an invoice changes (for example, the amount could change).",
    ),
    // Upcoming invoices have no id yet.
    (
        "invoice.upcoming",
        Family::Noop,
        "Occurs X number of days before a subscription is scheduled to create an invoice that is charged automatically.",
    ),
    ("invoiceitem.created", Family::Noop, "Occurs whenever an invoice item is created."),
    ("invoiceitem.deleted", Family::Noop, "Occurs whenever an invoice item is deleted."),
    ("invoiceitem.updated", Family::Noop, "Occurs whenever an invoice item is updated."),
    ("plan.created", Family::Noop, "Occurs whenever a plan is created."),
    ("plan.deleted", Family::Noop, "Occurs whenever a plan is deleted."),
    ("plan.updated", Family::Noop, "Occurs whenever a plan is updated."),
    ("recipient.created", Family::Noop, "Occurs whenever a recipient is created."),
    ("recipient.deleted", Family::Noop, "Occurs whenever a recipient is deleted."),
    ("recipient.updated", Family::Noop, "Occurs whenever a recipient is updated."),
    ("transfer.created", Family::Transfer, "Occurs whenever a new transfer is created."),
    (
        "transfer.failed",
        Family::Transfer,
        "Occurs whenever Stripe attempts to send a transfer and that transfer fails.",
    ),
    (
        "transfer.paid",
        Family::Transfer,
        "Occurs whenever a sent transfer is expected to be available in the destination bank account.",
    ),
    (
        "transfer.reversed",
        Family::Transfer,
        "Occurs whenever a transfer is reversed, including partial reversals.",
    ),
    (
        "transfer.updated",
        Family::Transfer,
        "Occurs whenever the description or metadata of a transfer is updated.",
    ),
    (
        "ping",
        Family::Noop,
        "May be sent by Stripe at any time to see if a provided webhook URL is working.",
    ),
];

/// One handler per supported kind.
pub fn default_handlers() -> Vec<Arc<dyn WebhookHandler>> {
    DEFAULT_KINDS
        .iter()
        .map(|&(name, family, description)| -> Arc<dyn WebhookHandler> {
            match family {
                Family::Noop => Arc::new(NoopWebhook::new(name, description)),
                Family::Account => Arc::new(AccountUpdatedWebhook::new(name, description)),
                Family::Charge => Arc::new(ChargeWebhook::new(name, description)),
                Family::CustomerUpdated => Arc::new(CustomerUpdatedWebhook::new(name, description)),
                Family::CustomerDeleted => Arc::new(CustomerDeletedWebhook::new(name, description)),
                Family::Source => Arc::new(CustomerSourceWebhook::new(name, description)),
                Family::SourceDeleted => {
                    Arc::new(CustomerSourceDeletedWebhook::new(name, description))
                }
                Family::Subscription => {
                    Arc::new(CustomerSubscriptionWebhook::new(name, description))
                }
                Family::Invoice => Arc::new(InvoiceWebhook::new(name, description)),
                Family::Transfer => Arc::new(TransferWebhook::new(name, description)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BillingStore, MemoryStore};
    use crate::test_support::{MockStripe, event};
    use serde_json::json;

    #[test]
    fn default_kinds_are_unique() {
        let mut names: Vec<_> = DEFAULT_KINDS.iter().map(|(name, _, _)| *name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[tokio::test]
    async fn charge_webhook_refetches_charge() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        store.get_or_create_customer("cus_1").await.unwrap();
        stripe
            .add_charge(json!({"id": "ch_1", "amount": 100, "currency": "usd", "customer": "cus_1"}))
            .await;
        let ev = event(
            "charge.captured",
            json!({"data": {"object": {"id": "ch_1", "customer": "cus_1"}}}),
        );
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        ChargeWebhook::new("charge.captured", "")
            .process_webhook(ctx, &ev)
            .await
            .unwrap();

        assert_eq!(stripe.calls().await, vec!["charge:ch_1".to_string()]);
        assert!(store.find_charge_by_stripe_id("ch_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dispute_syncs_disputed_charge() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        store.get_or_create_customer("cus_1").await.unwrap();
        stripe
            .add_charge(json!({"id": "ch_2", "amount": 100, "currency": "usd",
                               "customer": "cus_1", "dispute": {"id": "dp_1"}}))
            .await;
        let ev = event(
            "charge.dispute.created",
            json!({"data": {"object": {"id": "dp_1", "object": "dispute", "charge": "ch_2"}}}),
        );
        let ctx = WebhookContext { store: &store, stripe: &stripe };

        ChargeWebhook::new("charge.dispute.created", "")
            .process_webhook(ctx, &ev)
            .await
            .unwrap();

        let charge = store.find_charge_by_stripe_id("ch_2").await.unwrap().unwrap();
        assert!(charge.disputed);
    }

    #[tokio::test]
    async fn subscription_webhook_needs_linked_customer() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let ctx = WebhookContext { store: &store, stripe: &stripe };
        let object = json!({"data": {"object": {"id": "sub_1", "status": "active", "customer": "cus_1"}}});
        let handler = CustomerSubscriptionWebhook::new("customer.subscription.created", "");

        let unlinked = event("customer.subscription.created", object.clone());
        handler.process_webhook(ctx, &unlinked).await.unwrap();
        assert!(stripe.calls().await.is_empty());
        assert!(store.find_subscription_by_stripe_id("sub_1").await.unwrap().is_none());

        let customer = store.get_or_create_customer("cus_1").await.unwrap();
        stripe.add_customer(json!({"id": "cus_1", "currency": "usd"})).await;
        let mut linked = event("customer.subscription.created", object);
        linked.customer_id = Some(customer.id);
        handler.process_webhook(ctx, &linked).await.unwrap();

        assert_eq!(stripe.calls().await, vec!["customer:cus_1".to_string()]);
        assert!(store.find_subscription_by_stripe_id("sub_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn source_created_then_deleted() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let ctx = WebhookContext { store: &store, stripe: &stripe };
        let customer = store.get_or_create_customer("cus_1").await.unwrap();
        let card = json!({"data": {"object": {
            "id": "card_9", "object": "card", "customer": "cus_1", "brand": "Visa", "last4": "4242"
        }}});

        let mut created = event("customer.source.created", card.clone());
        created.customer_id = Some(customer.id);
        CustomerSourceWebhook::new("customer.source.created", "")
            .process_webhook(ctx, &created)
            .await
            .unwrap();
        let stored = store.find_card_by_stripe_id("card_9").await.unwrap().unwrap();
        assert_eq!(stored.last4, "4242");

        let deleted = event("customer.source.deleted", card);
        CustomerSourceDeletedWebhook::new("customer.source.deleted", "")
            .process_webhook(ctx, &deleted)
            .await
            .unwrap();
        assert!(store.find_card_by_stripe_id("card_9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn customer_deleted_purges() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let ctx = WebhookContext { store: &store, stripe: &stripe };
        let customer = store.get_or_create_customer("cus_1").await.unwrap();
        let mut ev = event("customer.deleted", json!({"data": {"object": {"id": "cus_1"}}}));
        ev.customer_id = Some(customer.id);

        CustomerDeletedWebhook::new("customer.deleted", "")
            .process_webhook(ctx, &ev)
            .await
            .unwrap();

        let purged = store.find_customer(customer.id).await.unwrap().unwrap();
        assert!(purged.date_purged.is_some());
    }

    #[tokio::test]
    async fn account_updated_creates_account_once() {
        let store = MemoryStore::new();
        let stripe = MockStripe::new();
        let ctx = WebhookContext { store: &store, stripe: &stripe };
        let ev = event("account.updated", json!({"data": {"object": {"id": "acct_1"}}}));
        let handler = AccountUpdatedWebhook::new("account.updated", "");

        handler.process_webhook(ctx, &ev).await.unwrap();
        handler.process_webhook(ctx, &ev).await.unwrap();

        let account = store.get_or_create_account("acct_1").await.unwrap();
        assert_eq!(account.stripe_id, "acct_1");
    }
}
