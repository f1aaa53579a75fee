//! PostgreSQL implementation of [`BillingStore`].
//!
//! Upserts use `INSERT ... ON CONFLICT (stripe_id) DO UPDATE ... RETURNING *`
//! so each sync is a single statement. Get-or-create uses a no-op update on
//! conflict so the existing row is returned.

use async_trait::async_trait;
use uuid::Uuid;

use super::BillingStore;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{
    account::Account,
    api_key::ApiKey,
    card::{Card, CardUpsert},
    charge::{Charge, ChargeUpsert},
    customer::{Customer, CustomerUpdate},
    event::{Event, EventEnvelope, EventProcessingException, NewEventProcessingException},
    invoice::{Invoice, InvoiceUpsert},
    subscription::{Subscription, SubscriptionUpsert},
    transfer::{Transfer, TransferUpsert},
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_active_api_key(&self, key_hash: &str) -> AppResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT id, key_hash, owner_name, created_at, is_active
             FROM api_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find_event_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE stripe_id = $1")
            .bind(stripe_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    async fn insert_event(&self, envelope: &EventEnvelope) -> AppResult<Option<Event>> {
        // DO NOTHING + RETURNING yields no row when the stripe_id exists,
        // which is how a racing duplicate is detected.
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                stripe_id,
                kind,
                livemode,
                stripe_account,
                webhook_message,
                request,
                pending_webhooks,
                api_version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (stripe_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&envelope.stripe_id)
        .bind(&envelope.kind)
        .bind(envelope.livemode)
        .bind(&envelope.stripe_account)
        .bind(&envelope.raw)
        .bind(&envelope.request)
        .bind(envelope.pending_webhooks)
        .bind(&envelope.api_version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn save_event(&self, event: &Event) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET validated_message = $2,
                valid = $3,
                processed = $4,
                customer_id = $5
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.validated_message)
        .bind(event.valid)
        .bind(event.processed)
        .bind(event.customer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_events(&self, limit: i64) -> AppResult<Vec<Event>> {
        let events =
            sqlx::query_as::<_, Event>("SELECT * FROM events ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        Ok(events)
    }

    async fn insert_exception(
        &self,
        exception: NewEventProcessingException,
    ) -> AppResult<EventProcessingException> {
        let row = sqlx::query_as::<_, EventProcessingException>(
            r#"
            INSERT INTO event_processing_exceptions (event_id, data, message, traceback)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(exception.event_id)
        .bind(exception.data)
        .bind(exception.message)
        .bind(exception.traceback)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn exceptions_for_event(
        &self,
        event_id: Uuid,
    ) -> AppResult<Vec<EventProcessingException>> {
        let rows = sqlx::query_as::<_, EventProcessingException>(
            "SELECT * FROM event_processing_exceptions WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_customer_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Customer>> {
        let customer =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE stripe_id = $1")
                .bind(stripe_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(customer)
    }

    async fn find_customer(&self, id: Uuid) -> AppResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    async fn get_or_create_customer(&self, stripe_id: &str) -> AppResult<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (stripe_id)
            VALUES ($1)
            ON CONFLICT (stripe_id) DO UPDATE SET stripe_id = EXCLUDED.stripe_id
            RETURNING *
            "#,
        )
        .bind(stripe_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn update_customer(&self, id: Uuid, update: CustomerUpdate) -> AppResult<Customer> {
        sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET account_balance = $2,
                currency = $3,
                delinquent = $4,
                default_source = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.account_balance)
        .bind(update.currency)
        .bind(update.delinquent)
        .bind(update.default_source)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {id}")))
    }

    async fn purge_customer(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE customers SET date_purged = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_transfer(&self, t: TransferUpsert) -> AppResult<Transfer> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (
                stripe_id, amount, amount_reversed, application_fee, created,
                currency, date, description, destination, destination_payment,
                event_id, failure_code, failure_message, livemode, metadata,
                method, reversed, source_transaction, source_type,
                statement_descriptor, status, transfer_group, transfer_type
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            ON CONFLICT (stripe_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                amount_reversed = EXCLUDED.amount_reversed,
                application_fee = EXCLUDED.application_fee,
                created = EXCLUDED.created,
                currency = EXCLUDED.currency,
                date = EXCLUDED.date,
                description = EXCLUDED.description,
                destination = EXCLUDED.destination,
                destination_payment = EXCLUDED.destination_payment,
                event_id = EXCLUDED.event_id,
                failure_code = EXCLUDED.failure_code,
                failure_message = EXCLUDED.failure_message,
                livemode = EXCLUDED.livemode,
                metadata = EXCLUDED.metadata,
                method = EXCLUDED.method,
                reversed = EXCLUDED.reversed,
                source_transaction = EXCLUDED.source_transaction,
                source_type = EXCLUDED.source_type,
                statement_descriptor = EXCLUDED.statement_descriptor,
                status = EXCLUDED.status,
                transfer_group = EXCLUDED.transfer_group,
                transfer_type = EXCLUDED.transfer_type
            RETURNING *
            "#,
        )
        .bind(t.stripe_id)
        .bind(t.amount)
        .bind(t.amount_reversed)
        .bind(t.application_fee)
        .bind(t.created)
        .bind(t.currency)
        .bind(t.date)
        .bind(t.description)
        .bind(t.destination)
        .bind(t.destination_payment)
        .bind(t.event_id)
        .bind(t.failure_code)
        .bind(t.failure_message)
        .bind(t.livemode)
        .bind(t.metadata)
        .bind(t.method)
        .bind(t.reversed)
        .bind(t.source_transaction)
        .bind(t.source_type)
        .bind(t.statement_descriptor)
        .bind(t.status)
        .bind(t.transfer_group)
        .bind(t.transfer_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(transfer)
    }

    async fn find_transfer_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Transfer>> {
        let transfer =
            sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE stripe_id = $1")
                .bind(stripe_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(transfer)
    }

    async fn update_transfer_status(&self, id: Uuid, status: &str) -> AppResult<Transfer> {
        sqlx::query_as::<_, Transfer>(
            "UPDATE transfers SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transfer {id}")))
    }

    async fn transfers_during(&self, year: i32, month: u32) -> AppResult<Vec<Transfer>> {
        let month = i32::try_from(month)
            .map_err(|_| AppError::InvalidRequest(format!("invalid month {month}")))?;

        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT * FROM transfers
            WHERE EXTRACT(YEAR FROM date AT TIME ZONE 'UTC')::int = $1
              AND EXTRACT(MONTH FROM date AT TIME ZONE 'UTC')::int = $2
            ORDER BY date
            "#,
        )
        .bind(year)
        .bind(month)
        .fetch_all(&self.pool)
        .await?;

        Ok(transfers)
    }

    async fn upsert_charge(&self, c: ChargeUpsert) -> AppResult<Charge> {
        // Description, refunded amount and availability are only overwritten
        // when the processor object carried them.
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            INSERT INTO charges (
                stripe_id, customer_id, invoice_id, source, currency, amount,
                amount_refunded, description, paid, disputed, refunded,
                captured, available, available_on, charge_created
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, COALESCE($8, ''), $9, $10, $11,
                $12, COALESCE($13, FALSE), $14, $15
            )
            ON CONFLICT (stripe_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                invoice_id = EXCLUDED.invoice_id,
                source = EXCLUDED.source,
                currency = EXCLUDED.currency,
                amount = EXCLUDED.amount,
                amount_refunded = COALESCE($7, charges.amount_refunded),
                description = COALESCE($8, charges.description),
                paid = EXCLUDED.paid,
                disputed = EXCLUDED.disputed,
                refunded = EXCLUDED.refunded,
                captured = EXCLUDED.captured,
                available = COALESCE($13, charges.available),
                available_on = CASE WHEN $13::boolean IS NULL
                    THEN charges.available_on ELSE $14 END,
                charge_created = EXCLUDED.charge_created
            RETURNING *
            "#,
        )
        .bind(c.stripe_id)
        .bind(c.customer_id)
        .bind(c.invoice_id)
        .bind(c.source)
        .bind(c.currency)
        .bind(c.amount)
        .bind(c.amount_refunded)
        .bind(c.description)
        .bind(c.paid)
        .bind(c.disputed)
        .bind(c.refunded)
        .bind(c.captured)
        .bind(c.available)
        .bind(c.available_on)
        .bind(c.charge_created)
        .fetch_one(&self.pool)
        .await?;

        Ok(charge)
    }

    async fn find_charge_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Charge>> {
        let charge = sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE stripe_id = $1")
            .bind(stripe_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(charge)
    }

    async fn charges_awaiting_availability(&self) -> AppResult<Vec<Charge>> {
        let charges = sqlx::query_as::<_, Charge>(
            r#"
            SELECT * FROM charges
            WHERE paid AND captured AND NOT (available AND refunded)
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(charges)
    }

    async fn upsert_invoice(&self, i: InvoiceUpsert) -> AppResult<Invoice> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                stripe_id, customer_id, charge, subscription_id, amount_due,
                attempted, attempt_count, closed, paid, period_start,
                period_end, subtotal, total, date, currency
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (stripe_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                charge = EXCLUDED.charge,
                subscription_id = EXCLUDED.subscription_id,
                amount_due = EXCLUDED.amount_due,
                attempted = EXCLUDED.attempted,
                attempt_count = EXCLUDED.attempt_count,
                closed = EXCLUDED.closed,
                paid = EXCLUDED.paid,
                period_start = EXCLUDED.period_start,
                period_end = EXCLUDED.period_end,
                subtotal = EXCLUDED.subtotal,
                total = EXCLUDED.total,
                date = EXCLUDED.date,
                currency = EXCLUDED.currency
            RETURNING *
            "#,
        )
        .bind(i.stripe_id)
        .bind(i.customer_id)
        .bind(i.charge)
        .bind(i.subscription_id)
        .bind(i.amount_due)
        .bind(i.attempted)
        .bind(i.attempt_count)
        .bind(i.closed)
        .bind(i.paid)
        .bind(i.period_start)
        .bind(i.period_end)
        .bind(i.subtotal)
        .bind(i.total)
        .bind(i.date)
        .bind(i.currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(invoice)
    }

    async fn find_invoice_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE stripe_id = $1")
            .bind(stripe_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    async fn upsert_subscription(&self, s: SubscriptionUpsert) -> AppResult<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                stripe_id, customer_id, plan, quantity, status, start,
                cancel_at_period_end, canceled_at, current_period_start,
                current_period_end, ended_at, trial_start, trial_end,
                application_fee_percent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (stripe_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                plan = EXCLUDED.plan,
                quantity = EXCLUDED.quantity,
                status = EXCLUDED.status,
                start = EXCLUDED.start,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                ended_at = EXCLUDED.ended_at,
                trial_start = EXCLUDED.trial_start,
                trial_end = EXCLUDED.trial_end,
                application_fee_percent = EXCLUDED.application_fee_percent
            RETURNING *
            "#,
        )
        .bind(s.stripe_id)
        .bind(s.customer_id)
        .bind(s.plan)
        .bind(s.quantity)
        .bind(s.status)
        .bind(s.start)
        .bind(s.cancel_at_period_end)
        .bind(s.canceled_at)
        .bind(s.current_period_start)
        .bind(s.current_period_end)
        .bind(s.ended_at)
        .bind(s.trial_start)
        .bind(s.trial_end)
        .bind(s.application_fee_percent)
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn find_subscription_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> AppResult<Option<Subscription>> {
        let subscription =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE stripe_id = $1")
                .bind(stripe_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(subscription)
    }

    async fn upsert_card(&self, c: CardUpsert) -> AppResult<Card> {
        let card = sqlx::query_as::<_, Card>(
            r#"
            INSERT INTO cards (
                stripe_id, customer_id, name, brand, country, exp_month,
                exp_year, fingerprint, funding, last4, cvc_check
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (stripe_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                name = EXCLUDED.name,
                brand = EXCLUDED.brand,
                country = EXCLUDED.country,
                exp_month = EXCLUDED.exp_month,
                exp_year = EXCLUDED.exp_year,
                fingerprint = EXCLUDED.fingerprint,
                funding = EXCLUDED.funding,
                last4 = EXCLUDED.last4,
                cvc_check = EXCLUDED.cvc_check
            RETURNING *
            "#,
        )
        .bind(c.stripe_id)
        .bind(c.customer_id)
        .bind(c.name)
        .bind(c.brand)
        .bind(c.country)
        .bind(c.exp_month)
        .bind(c.exp_year)
        .bind(c.fingerprint)
        .bind(c.funding)
        .bind(c.last4)
        .bind(c.cvc_check)
        .fetch_one(&self.pool)
        .await?;

        Ok(card)
    }

    async fn find_card_by_stripe_id(&self, stripe_id: &str) -> AppResult<Option<Card>> {
        let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE stripe_id = $1")
            .bind(stripe_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(card)
    }

    async fn delete_card(&self, stripe_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cards WHERE stripe_id = $1")
            .bind(stripe_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_account(&self, stripe_id: &str) -> AppResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (stripe_id)
            VALUES ($1)
            ON CONFLICT (stripe_id) DO UPDATE SET stripe_id = EXCLUDED.stripe_id
            RETURNING *
            "#,
        )
        .bind(stripe_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }
}
