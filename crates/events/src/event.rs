use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// A pipeline event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **identified** (every instance carries its own `event_id`)
/// - published under a fixed **routing key**
pub trait Event: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing key the event is published under (e.g. "price.change.detected").
    fn routing_key(&self) -> &'static str;

    /// Stable event type name (e.g. "PriceChangeEvent").
    fn event_type(&self) -> &'static str;

    fn event_id(&self) -> uuid::Uuid;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
