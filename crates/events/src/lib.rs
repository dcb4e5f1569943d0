//! Domain events and the event channel that carries them between the
//! monitoring orchestrator and the notification dispatcher.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod price_change;
pub mod topic;
pub mod user_created;

pub use bus::{EventBus, PublishError, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use price_change::{NotificationChannel, PriceChangeEvent};
pub use topic::{routing_keys, topic_matches};
pub use user_created::UserCreatedEvent;

/// The message type carried on the wire: a JSON payload inside an envelope.
pub type JsonEnvelope = EventEnvelope<serde_json::Value>;
