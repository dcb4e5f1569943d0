//! Channel senders: one implementation per delivery channel.

mod email;

pub use email::{EmailSender, MailTransport, OutgoingMail, RecordingMailTransport};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use pricewatch_events::NotificationChannel;

use crate::request::NotificationRequest;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel {0} is not supported")]
    UnsupportedChannel(NotificationChannel),

    #[error("failed to render notification: {0}")]
    Render(String),
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn send(&self, request: &NotificationRequest) -> Result<(), SendError>;
}

/// Registered for channels without a delivery integration (SMS, push, chat).
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedChannelSender {
    channel: NotificationChannel,
}

impl UnsupportedChannelSender {
    pub fn new(channel: NotificationChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for UnsupportedChannelSender {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    async fn send(&self, request: &NotificationRequest) -> Result<(), SendError> {
        warn!(
            channel = %self.channel,
            recipient = %request.recipient,
            "notification channel not supported; nothing sent"
        );
        Err(SendError::UnsupportedChannel(self.channel))
    }
}
