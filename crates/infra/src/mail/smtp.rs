//! SMTP delivery through `lettre`'s async tokio transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, instrument};

use pricewatch_notify::{MailTransport, OutgoingMail, SendError};

use crate::config::SmtpSettings;

#[derive(Clone)]
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport").finish_non_exhaustive()
    }
}

impl SmtpMailTransport {
    /// STARTTLS relay on the configured host and port.
    pub fn new(settings: &SmtpSettings) -> Result<Self, SendError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| SendError::Transport(e.to_string()))?
            .port(settings.port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Build the MIME message for `mail`. Address errors surface as
/// [`SendError::Transport`].
pub fn build_message(mail: &OutgoingMail) -> Result<Message, SendError> {
    let from = Mailbox::new(
        Some(mail.from_name.clone()),
        mail.from_address
            .parse()
            .map_err(|e| SendError::Transport(format!("invalid from address: {e}")))?,
    );
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| SendError::Transport(format!("invalid recipient {}: {e}", mail.to)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(&mail.subject)
        .header(ContentType::TEXT_HTML)
        .body(mail.html.clone())
        .map_err(|e| SendError::Transport(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    #[instrument(skip(self, mail), fields(to = %mail.to), err)]
    async fn deliver(&self, mail: OutgoingMail) -> Result<(), SendError> {
        let message = build_message(&mail)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        debug!(code = %response.code(), "smtp accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            from_address: "noreply@pricewatcher.com".to_string(),
            from_name: "Price Watcher".to_string(),
            to: to.to_string(),
            subject: "📉 Preço reduzido: Air Fryer".to_string(),
            html: "<p>R$ 299,90</p>".to_string(),
        }
    }

    #[test]
    fn builds_html_message_with_named_sender() {
        let message = build_message(&mail("ana@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Price Watcher"));
        assert!(raw.contains("<noreply@pricewatcher.com>"));
        assert!(raw.contains("ana@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
    }

    #[test]
    fn invalid_recipient_is_a_transport_error() {
        let err = build_message(&mail("not an address")).unwrap_err();
        assert!(matches!(err, SendError::Transport(msg) if msg.contains("invalid recipient")));
    }

    #[test]
    fn transport_builds_from_settings() {
        let settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 2525,
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            from_address: "noreply@pricewatcher.com".to_string(),
            from_name: "Price Watcher".to_string(),
        };
        assert!(SmtpMailTransport::new(&settings).is_ok());
    }
}
