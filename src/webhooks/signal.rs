//! Per-kind notification channels.
//!
//! Each registered event kind owns a [`Signal`]. Host code connects
//! [`SignalReceiver`]s to it and is told about every event of that kind
//! once the event has been processed. Delivery is in-process and in
//! connection order.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::models::event::Event;

/// Something that wants to hear about processed events.
#[async_trait]
pub trait SignalReceiver: Send + Sync {
    async fn receive(&self, event: &Event) -> anyhow::Result<()>;
}

/// Observer list for one event kind.
pub struct Signal {
    kind: String,
    receivers: RwLock<Vec<Arc<dyn SignalReceiver>>>,
}

impl Signal {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            receivers: RwLock::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn connect(&self, receiver: Arc<dyn SignalReceiver>) {
        self.receivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(receiver);
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `event` to every receiver.
    ///
    /// A failing receiver is logged and does not stop delivery to the
    /// others. Returns how many receivers succeeded.
    pub async fn send(&self, event: &Event) -> usize {
        // Snapshot so the lock is not held across awaits.
        let receivers: Vec<_> = self
            .receivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for receiver in receivers {
            match receiver.receive(event).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    kind = %self.kind,
                    event_id = %event.stripe_id,
                    error = %e,
                    "Signal receiver failed"
                ),
            }
        }
        delivered
    }
}

/// Receiver that writes one structured log line per processed event.
pub struct LogReceiver;

#[async_trait]
impl SignalReceiver for LogReceiver {
    async fn receive(&self, event: &Event) -> anyhow::Result<()> {
        tracing::info!(
            event_id = %event.stripe_id,
            kind = %event.kind,
            customer_id = ?event.customer_id,
            "Webhook processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingReceiver, event};
    use serde_json::json;

    struct FailingReceiver;

    #[async_trait]
    impl SignalReceiver for FailingReceiver {
        async fn receive(&self, _event: &Event) -> anyhow::Result<()> {
            anyhow::bail!("receiver down")
        }
    }

    #[tokio::test]
    async fn failing_receiver_does_not_block_others() {
        let signal = Signal::new("ping");
        let recorder = Arc::new(RecordingReceiver::default());
        signal.connect(Arc::new(FailingReceiver));
        signal.connect(recorder.clone());
        signal.connect(Arc::new(LogReceiver));

        let delivered = signal.send(&event("ping", json!({"id": "evt_1"}))).await;

        assert_eq!(delivered, 2);
        assert_eq!(recorder.received(), vec!["evt_1".to_string()]);
        assert_eq!(signal.receiver_count(), 3);
    }
}
