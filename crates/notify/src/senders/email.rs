use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use pricewatch_events::NotificationChannel;

use super::{ChannelSender, SendError};
use crate::request::NotificationRequest;
use crate::templates::render;

/// A fully rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from_address: String,
    pub from_name: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivers rendered mail (SMTP in production).
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, mail: OutgoingMail) -> Result<(), SendError>;
}

/// Keeps every delivered mail in memory. Can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingMailTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    failure: Mutex<Option<String>>,
}

impl RecordingMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make subsequent deliveries fail with `reason` (`None` restores).
    pub fn fail_with(&self, reason: Option<&str>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = reason.map(str::to_string);
        }
    }
}

#[async_trait]
impl MailTransport for RecordingMailTransport {
    async fn deliver(&self, mail: OutgoingMail) -> Result<(), SendError> {
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(reason) = failure {
            return Err(SendError::Transport(reason));
        }
        self.sent
            .lock()
            .map_err(|_| SendError::Transport("lock poisoned".to_string()))?
            .push(mail);
        Ok(())
    }
}

/// Renders the request's template and hands it to a [`MailTransport`].
#[derive(Clone)]
pub struct EmailSender {
    transport: Arc<dyn MailTransport>,
    from_address: String,
    from_name: String,
}

impl std::fmt::Debug for EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSender")
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .finish_non_exhaustive()
    }
}

impl EmailSender {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        from_address: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            from_address: from_address.into(),
            from_name: from_name.into(),
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn send(&self, request: &NotificationRequest) -> Result<(), SendError> {
        let html = render(request)?;
        self.transport
            .deliver(OutgoingMail {
                from_address: self.from_address.clone(),
                from_name: self.from_name.clone(),
                to: request.recipient.clone(),
                subject: request.subject.clone(),
                html,
            })
            .await?;

        info!(
            recipient = %request.recipient,
            template = request.template.name(),
            "email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Priority;

    #[tokio::test]
    async fn renders_and_delivers() {
        let transport = Arc::new(RecordingMailTransport::new());
        let sender = EmailSender::new(transport.clone(), "noreply@pricewatcher.com", "Price Watcher");

        let request = NotificationRequest::system("ana@example.com", "Teste", "Olá", Priority::Low);
        sender.send(&request).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ana@example.com");
        assert_eq!(sent[0].from_name, "Price Watcher");
        assert!(sent[0].html.contains("<p>Olá</p>"));
    }

    #[tokio::test]
    async fn transport_errors_surface_as_send_errors() {
        let transport = Arc::new(RecordingMailTransport::new());
        transport.fail_with(Some("smtp down"));
        let sender = EmailSender::new(transport.clone(), "noreply@pricewatcher.com", "Price Watcher");

        let request = NotificationRequest::welcome("ana@example.com", "Ana");
        assert_eq!(
            sender.send(&request).await,
            Err(SendError::Transport("smtp down".to_string()))
        );
        assert!(transport.sent().is_empty());
    }
}
