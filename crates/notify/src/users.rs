//! Contract with the external user registry.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pricewatch_core::UserId;
use pricewatch_events::NotificationChannel;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("user not found: {0}")]
    NotFound(UserId),

    #[error("user registry unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected user registry response: {0}")]
    Decode(String),
}

/// Contact details and channel preferences of a user.
///
/// Missing preference flags default to email on, SMS and push off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContact {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email_notifications: Option<bool>,
    #[serde(default)]
    pub sms_notifications: Option<bool>,
    #[serde(default)]
    pub push_notifications: Option<bool>,
}

impl UserContact {
    pub fn with_email(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: Some(email.into()),
            phone_number: None,
            email_notifications: None,
            sms_notifications: None,
            push_notifications: None,
        }
    }

    /// Whether the user accepts notifications on `channel`. Chat has no
    /// preference flag.
    pub fn allows(&self, channel: NotificationChannel) -> bool {
        match channel {
            NotificationChannel::Email => self.email_notifications.unwrap_or(true),
            NotificationChannel::Sms => self.sms_notifications.unwrap_or(false),
            NotificationChannel::Push => self.push_notifications.unwrap_or(false),
            NotificationChannel::Telegram => true,
        }
    }

    /// Address to deliver to on `channel`, if the user has one.
    pub fn recipient(&self, channel: NotificationChannel) -> Option<String> {
        match channel {
            NotificationChannel::Email => self.email.clone(),
            NotificationChannel::Sms => self.phone_number.clone(),
            NotificationChannel::Push | NotificationChannel::Telegram => Some(self.id.to_string()),
        }
        .filter(|r| !r.trim().is_empty())
    }
}

#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn contact(&self, user_id: UserId) -> Result<UserContact, ResolutionError>;
}

/// In-memory user registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserRegistry {
    users: RwLock<HashMap<UserId, UserContact>>,
}

impl InMemoryUserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contact: UserContact) {
        if let Ok(mut users) = self.users.write() {
            users.insert(contact.id, contact);
        }
    }
}

#[async_trait]
impl UserRegistry for InMemoryUserRegistry {
    async fn contact(&self, user_id: UserId) -> Result<UserContact, ResolutionError> {
        let users = self
            .users
            .read()
            .map_err(|_| ResolutionError::Unavailable("lock poisoned".to_string()))?;
        users
            .get(&user_id)
            .cloned()
            .ok_or(ResolutionError::NotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_flags_use_defaults() {
        let json = serde_json::json!({ "id": 4, "email": "ana@example.com" });
        let contact: UserContact = serde_json::from_value(json).unwrap();

        assert!(contact.allows(NotificationChannel::Email));
        assert!(!contact.allows(NotificationChannel::Sms));
        assert!(!contact.allows(NotificationChannel::Push));
        assert!(contact.allows(NotificationChannel::Telegram));
    }

    #[test]
    fn explicit_flags_and_nulls() {
        let json = serde_json::json!({
            "id": 4,
            "email": "ana@example.com",
            "phoneNumber": "+55 11 99999-0000",
            "emailNotifications": false,
            "smsNotifications": true,
            "pushNotifications": null
        });
        let contact: UserContact = serde_json::from_value(json).unwrap();

        assert!(!contact.allows(NotificationChannel::Email));
        assert!(contact.allows(NotificationChannel::Sms));
        assert!(!contact.allows(NotificationChannel::Push));
        assert_eq!(
            contact.recipient(NotificationChannel::Sms).as_deref(),
            Some("+55 11 99999-0000")
        );
    }

    #[test]
    fn blank_email_is_no_recipient() {
        let contact = UserContact::with_email(UserId::new(1), "  ");
        assert_eq!(contact.recipient(NotificationChannel::Email), None);
        assert_eq!(
            contact.recipient(NotificationChannel::Push).as_deref(),
            Some("1")
        );
    }
}
