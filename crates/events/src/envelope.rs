use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::PublishError;
use crate::event::Event;

/// Envelope for an event, carrying routing metadata alongside the payload.
///
/// This is the unit the event channel transports.
///
/// Notes:
/// - `routing_key` decides which subscriptions receive the envelope.
/// - `payload` is the serialized event (camelCase JSON on the wire).
/// - `correlation_id` is optional and only used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    routing_key: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        routing_key: impl Into<String>,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            routing_key: routing_key.into(),
            event_type: event_type.into(),
            occurred_at,
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap a typed event into a JSON envelope.
    pub fn from_event<T: Event>(event: &T) -> Result<Self, PublishError> {
        let payload =
            serde_json::to_value(event).map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(Self::new(
            event.event_id(),
            event.routing_key(),
            event.event_type(),
            event.occurred_at(),
            payload,
        ))
    }

    /// Decode the payload as a typed event.
    pub fn decode<T: Event>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_created::UserCreatedEvent;
    use pricewatch_core::UserId;

    #[test]
    fn envelope_wire_format_is_camel_case() {
        let event = UserCreatedEvent::new(UserId::new(5), "ana", "ana@example.com");
        let envelope = EventEnvelope::from_event(&event).unwrap();
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["routingKey"], "user.created");
        assert_eq!(json["eventType"], "UserCreatedEvent");
        assert!(json.get("correlationId").is_none());
        assert_eq!(json["payload"]["userId"], 5);
    }

    #[test]
    fn decode_recovers_typed_event() {
        let event = UserCreatedEvent::new(UserId::new(5), "ana", "ana@example.com");
        let envelope = EventEnvelope::from_event(&event)
            .unwrap()
            .with_correlation_id("req-1");

        let text = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope<serde_json::Value> = serde_json::from_str(&text).unwrap();

        assert_eq!(back.correlation_id(), Some("req-1"));
        assert_eq!(back.decode::<UserCreatedEvent>().unwrap(), event);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            "user.created",
            "UserCreatedEvent",
            Utc::now(),
            serde_json::json!({ "unexpected": true }),
        );
        assert!(envelope.decode::<UserCreatedEvent>().is_err());
    }
}
