use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricewatch_core::{ProductId, UserId};

use crate::event::Event;
use crate::topic::routing_keys;

/// Channel a notification should be delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    #[default]
    Email,
    Sms,
    Push,
    Telegram,
}

impl NotificationChannel {
    pub const ALL: [NotificationChannel; 4] = [
        NotificationChannel::Email,
        NotificationChannel::Sms,
        NotificationChannel::Push,
        NotificationChannel::Telegram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "EMAIL",
            NotificationChannel::Sms => "SMS",
            NotificationChannel::Push => "PUSH",
            NotificationChannel::Telegram => "TELEGRAM",
        }
    }
}

impl core::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected price movement or a reached target for one product.
///
/// Produced by the monitoring orchestrator; at most two per monitoring attempt
/// (a change and a target reached are reported separately).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChangeEvent {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_url: String,
    pub previous_price: Option<Decimal>,
    pub current_price: Decimal,
    pub target_price: Option<Decimal>,
    pub user_id: UserId,
    #[serde(default)]
    pub notification_channel: NotificationChannel,
    #[serde(default = "Uuid::now_v7")]
    pub event_id: Uuid,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl PriceChangeEvent {
    /// `true` when a target is set and the current price is at or below it.
    pub fn is_target_reached(&self) -> bool {
        self.target_price
            .is_some_and(|target| self.current_price <= target)
    }

    pub fn is_price_decrease(&self) -> bool {
        self.previous_price
            .is_some_and(|previous| self.current_price < previous)
    }

    pub fn is_price_increase(&self) -> bool {
        self.previous_price
            .is_some_and(|previous| self.current_price > previous)
    }

    /// `current - previous`, absent when there is no previous price.
    pub fn price_difference(&self) -> Option<Decimal> {
        self.previous_price.map(|previous| self.current_price - previous)
    }

    /// Savings versus the target, only when the target has been reached.
    pub fn savings(&self) -> Option<Decimal> {
        match self.target_price {
            Some(target) if self.current_price <= target => Some(target - self.current_price),
            _ => None,
        }
    }
}

impl Event for PriceChangeEvent {
    fn routing_key(&self) -> &'static str {
        routing_keys::PRICE_CHANGE_DETECTED
    }

    fn event_type(&self) -> &'static str {
        "PriceChangeEvent"
    }

    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
