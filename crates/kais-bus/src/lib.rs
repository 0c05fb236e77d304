//! In-process subject-based publish/subscribe bus (§4.1).

pub mod subject;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use kais_core::{Envelope, Error, Result};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

pub type Handler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Subscription {
    pattern: String,
    tx: mpsc::UnboundedSender<Envelope>,
    worker: tokio::task::JoinHandle<()>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Subject-addressed publish/subscribe bus. The subscription table is the only
/// shared mutable structure (§5): a read-mostly lock, read on publish, written
/// on subscribe/unsubscribe.
pub struct MessageBus {
    subscriptions: Arc<RwLock<HashMap<Uuid, Subscription>>>,
    message_count: AtomicU64,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self { subscriptions: Arc::new(RwLock::new(HashMap::new())), message_count: AtomicU64::new(0) }
    }

    /// Registers `handler` to run, in publish order, for every envelope published to
    /// a subject matching `pattern`. A handler's failures are logged but never
    /// propagate to the publisher or to other subscriptions (§4.1, §5).
    pub async fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> Result<SubscriptionId> {
        let pattern = pattern.into();
        subject::validate_pattern(&pattern)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let id = Uuid::new_v4();
        let pattern_for_worker = pattern.clone();
        let worker = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let Err(err) = handler(envelope).await {
                    warn!(pattern = %pattern_for_worker, %err, "bus handler failed");
                }
            }
        });

        self.subscriptions.write().await.insert(id, Subscription { pattern, tx, worker });
        Ok(SubscriptionId(id))
    }

    /// Convenience subscription that hands matching envelopes to the caller as a
    /// stream instead of a callback — the shape the agent runtime's inbox uses.
    pub async fn subscribe_channel(
        &self,
        pattern: impl Into<String>,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<Envelope>)> {
        let pattern = pattern.into();
        subject::validate_pattern(&pattern)?;

        let (tx, rx) = mpsc::unbounded_channel::<Envelope>();
        let (passthrough_tx, passthrough_rx) = mpsc::unbounded_channel::<Envelope>();
        let worker = tokio::spawn(async move {
            let mut rx = rx;
            while let Some(envelope) = rx.recv().await {
                if passthrough_tx.send(envelope).is_err() {
                    break;
                }
            }
        });

        let id = Uuid::new_v4();
        self.subscriptions.write().await.insert(id, Subscription { pattern, tx, worker });
        Ok((SubscriptionId(id), passthrough_rx))
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let removed = self.subscriptions.write().await.remove(&id.0);
        match removed {
            Some(sub) => {
                drop(sub.tx);
                sub.worker.abort();
                Ok(())
            }
            None => Err(Error::validation("unknown subscription")),
        }
    }

    /// Publishes `envelope` to every subscription whose pattern matches `subject`.
    /// At-least-once, best-effort in-process fan-out (§4.1).
    pub async fn publish(&self, subject: &str, envelope: Envelope) -> Result<()> {
        subject::validate_subject(subject)?;
        self.message_count.fetch_add(1, Ordering::Relaxed);

        let subscriptions = self.subscriptions.read().await;
        let mut delivered = 0usize;
        for sub in subscriptions.values() {
            if subject::matches(&sub.pattern, subject) {
                if sub.tx.send(envelope.clone()).is_err() {
                    warn!(pattern = %sub.pattern, "subscription worker gone, dropping envelope");
                } else {
                    delivered += 1;
                }
            }
        }
        debug!(subject, delivered, "published envelope");
        Ok(())
    }

    /// Waits for all subscription workers to drain their queued envelopes and
    /// removes every subscription. Used on graceful shutdown.
    pub async fn drain(&self) {
        let mut subscriptions = self.subscriptions.write().await;
        let drained: Vec<Subscription> = subscriptions.drain().map(|(_, v)| v).collect();
        drop(subscriptions);
        for sub in drained {
            drop(sub.tx);
            let _ = sub.worker.await;
        }
    }

    pub async fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kais_core::EnvelopeType;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn matching_subscription_invoked_exactly_once_per_publish() {
        let bus = MessageBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(
            "cell.>",
            Arc::new(move |_env| {
                let count = count_clone.clone();
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

        let e1 = Envelope::new("a", "b", EnvelopeType::Message, serde_json::json!({})).unwrap();
        let e2 = Envelope::new("a", "b", EnvelopeType::Message, serde_json::json!({})).unwrap();
        bus.publish("cell.default.coder.inbox", e1).await.unwrap();
        bus.publish("cell.prod.reviewer.inbox", e2).await.unwrap();

        // allow the spawned worker tasks to drain
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_matching_subscription_not_invoked() {
        let bus = MessageBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(
            "cell.*.inbox",
            Arc::new(move |_env| {
                let count = count_clone.clone();
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

        let e = Envelope::new("a", "b", EnvelopeType::Message, serde_json::json!({})).unwrap();
        bus.publish("cell.default.coder.inbox", e).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = MessageBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = bus
            .subscribe(
                "cell.inbox",
                Arc::new(move |_env| {
                    let count = count_clone.clone();
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();

        bus.unsubscribe(id).await.unwrap();
        let e = Envelope::new("a", "b", EnvelopeType::Message, serde_json::json!({})).unwrap();
        bus.publish("cell.inbox", e).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn subscription_and_message_counts_tracked() {
        let bus = MessageBus::new();
        bus.subscribe("cell.>", Arc::new(|_| Box::pin(async { Ok(()) }))).await.unwrap();
        assert_eq!(bus.subscription_count().await, 1);
        let e = Envelope::new("a", "b", EnvelopeType::Message, serde_json::json!({})).unwrap();
        bus.publish("cell.default.inbox", e).await.unwrap();
        assert_eq!(bus.message_count().await, 1);
    }
}
