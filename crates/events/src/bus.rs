//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **event channel** between producers (the monitoring
//! orchestrator) and consumers (the notification dispatcher).
//!
//! ## Design Philosophy
//!
//! The bus is intentionally **lightweight** and makes minimal assumptions:
//!
//! - **Transport-agnostic**: Works with in-memory channels, Redis Streams, a broker, etc.
//! - **Topic routed**: Messages are published under a routing key such as
//!   `price.change.detected`; subscribers register a topic pattern (`*` matches one
//!   word, `#` matches zero or more words).
//! - **At-least-once delivery**: Messages may be delivered more than once; consumers
//!   must tolerate duplicates.
//! - **No ordering guarantees** across publishers.
//!
//! A failed publish is surfaced as [`PublishError`]; what to do about it is the
//! caller's decision (the orchestrator logs and moves on).

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure to hand a message to the channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialization(String),

    #[error("event channel unavailable: {0}")]
    Unavailable(String),
}

/// A subscription to a topic pattern.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut subscription = bus.subscribe(routing_keys::PRICE_CHANGE_DETECTED);
///
/// loop {
///     tokio::select! {
///         msg = subscription.recv() => match msg {
///             Some(envelope) => handle(envelope).await,
///             None => break,
///         },
///         _ = shutdown.changed() => break,
///     }
/// }
/// ```
///
/// Subscriptions are designed for a single consumer task.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. `None` once the bus side has gone away.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Topic-routed publish/subscribe channel.
///
/// The trait requires `Send + Sync`; implementations are shared between the
/// orchestrator's worker tasks and the dispatcher loop.
#[async_trait]
pub trait EventBus<M: Send + 'static>: Send + Sync {
    /// Publish `message` under the routing key `topic`.
    async fn publish(&self, topic: &str, message: M) -> Result<(), PublishError>;

    /// Subscribe to every message whose routing key matches `pattern`.
    fn subscribe(&self, pattern: &str) -> Subscription<M>;
}

#[async_trait]
impl<M, B> EventBus<M> for Arc<B>
where
    M: Send + 'static,
    B: EventBus<M> + ?Sized,
{
    async fn publish(&self, topic: &str, message: M) -> Result<(), PublishError> {
        (**self).publish(topic, message).await
    }

    fn subscribe(&self, pattern: &str) -> Subscription<M> {
        (**self).subscribe(pattern)
    }
}
