use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricewatch_core::UserId;

use crate::event::Event;
use crate::topic::routing_keys;

/// Emitted by the user registry when an account is created; drives the
/// welcome notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedEvent {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default = "Uuid::now_v7")]
    pub event_id: Uuid,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl UserCreatedEvent {
    pub fn new(user_id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: email.into(),
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
        }
    }
}

impl Event for UserCreatedEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::USER_CREATED
    }

    fn event_type(&self) -> &'static str {
        "UserCreatedEvent"
    }

    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
