//! In-memory event bus for tests/dev.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bus::{EventBus, PublishError, Subscription};
use crate::topic::topic_matches;

/// In-memory topic bus.
///
/// - No IO
/// - Best-effort fan-out to every subscriber whose pattern matches
/// - Dead subscribers are dropped on the next publish
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<M>)>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    async fn publish(&self, topic: &str, message: M) -> Result<(), PublishError> {
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| PublishError::Unavailable("subscriber lock poisoned".to_string()))?;

        subs.retain(|(pattern, tx)| {
            if !topic_matches(pattern, topic) {
                return !tx.is_closed();
            }
            tx.send(message.clone()).is_ok()
        });

        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push((pattern.to_string(), tx));
        }

        Subscription::new(rx)
    }
}
