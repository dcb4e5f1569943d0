//! Event consumption loop and per-event dispatch decisions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pricewatch_core::UserId;
use pricewatch_events::{
    routing_keys, EventBus, JsonEnvelope, NotificationChannel, PriceChangeEvent, UserCreatedEvent,
};

use crate::rate_limit::{RateLimitError, RateLimiter, Reservation};
use crate::request::{NotificationRequest, Priority};
use crate::senders::{ChannelSender, SendError, UnsupportedChannelSender};
use crate::users::{ResolutionError, UserRegistry};

pub const TEST_EMAIL_SUBJECT: &str = "Test Notification from Price Watcher";
pub const TEST_EMAIL_MESSAGE: &str = "This is a test notification to verify email functionality.";

/// Why an event did not turn into a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Malformed(String),
    UnknownRoutingKey(String),
    Unresolvable(ResolutionError),
    ChannelDisabled(NotificationChannel),
    NoRecipient(NotificationChannel),
    RateLimitExceeded(UserId),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Malformed(e) => write!(f, "malformed payload: {e}"),
            DropReason::UnknownRoutingKey(k) => write!(f, "unknown routing key {k}"),
            DropReason::Unresolvable(e) => write!(f, "{e}"),
            DropReason::ChannelDisabled(c) => write!(f, "user disabled {c} notifications"),
            DropReason::NoRecipient(c) => write!(f, "user has no {c} address"),
            DropReason::RateLimitExceeded(u) => write!(f, "rate limit exceeded for user {u}"),
        }
    }
}

/// Outcome of handing one event to the dispatcher.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The send runs on its own task; the handle can be awaited or dropped.
    Dispatched(JoinHandle<Result<(), SendError>>),
    Dropped(DropReason),
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched(_))
    }

    /// Wait for the spawned send, if any.
    pub async fn finished(self) -> Result<Result<(), SendError>, DropReason> {
        match self {
            DispatchOutcome::Dispatched(handle) => Ok(handle
                .await
                .unwrap_or_else(|e| Err(SendError::Transport(format!("send task failed: {e}"))))),
            DispatchOutcome::Dropped(reason) => Err(reason),
        }
    }
}

/// Turns price and user events into notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    users: Arc<dyn UserRegistry>,
    limiter: RateLimiter,
    senders: HashMap<NotificationChannel, Arc<dyn ChannelSender>>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("limiter", &self.limiter)
            .field("channels", &self.senders.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Every channel starts out unsupported; register real senders with
    /// [`with_sender`](Self::with_sender).
    pub fn new(users: Arc<dyn UserRegistry>, limiter: RateLimiter) -> Self {
        let senders = NotificationChannel::ALL
            .into_iter()
            .map(|channel| {
                let sender: Arc<dyn ChannelSender> = Arc::new(UnsupportedChannelSender::new(channel));
                (channel, sender)
            })
            .collect();
        Self {
            users,
            limiter,
            senders,
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    /// Consume `price.change.detected` and `user.created` until `shutdown`
    /// changes or the bus goes away. Sends still running at that point are
    /// awaited before returning.
    pub async fn run(
        self,
        bus: Arc<dyn EventBus<JsonEnvelope>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut prices = bus.subscribe(routing_keys::PRICE_CHANGE_DETECTED);
        let mut users = bus.subscribe(routing_keys::USER_CREATED);
        let mut sends: Vec<JoinHandle<Result<(), SendError>>> = Vec::new();
        info!("notification dispatcher started");

        loop {
            let envelope = tokio::select! {
                msg = prices.recv() => match msg {
                    Some(envelope) => envelope,
                    None => break,
                },
                msg = users.recv() => match msg {
                    Some(envelope) => envelope,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };

            // Drops are logged by handle_envelope.
            if let DispatchOutcome::Dispatched(send) = self.handle_envelope(envelope).await {
                sends.retain(|running| !running.is_finished());
                sends.push(send);
            }
        }

        sends.retain(|running| !running.is_finished());
        if !sends.is_empty() {
            info!(in_flight = sends.len(), "waiting for in-flight notifications");
        }
        for send in sends {
            if let Err(err) = send.await {
                warn!(error = %err, "notification send task failed");
            }
        }

        info!("notification dispatcher stopped");
    }

    pub fn spawn(
        self,
        bus: Arc<dyn EventBus<JsonEnvelope>>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(bus, shutdown))
    }

    /// Decode and dispatch one envelope. Malformed payloads are skipped.
    pub async fn handle_envelope(&self, envelope: JsonEnvelope) -> DispatchOutcome {
        let outcome = match envelope.routing_key() {
            routing_keys::PRICE_CHANGE_DETECTED => match envelope.decode::<PriceChangeEvent>() {
                Ok(event) => self.dispatch_price_change(&event).await,
                Err(err) => DispatchOutcome::Dropped(DropReason::Malformed(err.to_string())),
            },
            routing_keys::USER_CREATED => match envelope.decode::<UserCreatedEvent>() {
                Ok(event) => self.dispatch_welcome(&event).await,
                Err(err) => DispatchOutcome::Dropped(DropReason::Malformed(err.to_string())),
            },
            other => DispatchOutcome::Dropped(DropReason::UnknownRoutingKey(other.to_string())),
        };

        if let DispatchOutcome::Dropped(reason) = &outcome {
            warn!(
                event_id = %envelope.event_id(),
                routing_key = envelope.routing_key(),
                %reason,
                "notification dropped"
            );
        }
        outcome
    }

    pub async fn dispatch_price_change(&self, event: &PriceChangeEvent) -> DispatchOutcome {
        let contact = match self.users.contact(event.user_id).await {
            Ok(contact) => contact,
            Err(err) => return DispatchOutcome::Dropped(DropReason::Unresolvable(err)),
        };

        let channel = event.notification_channel;
        if !contact.allows(channel) {
            return DispatchOutcome::Dropped(DropReason::ChannelDisabled(channel));
        }
        let Some(recipient) = contact.recipient(channel) else {
            return DispatchOutcome::Dropped(DropReason::NoRecipient(channel));
        };

        debug!(
            product_id = %event.product_id,
            user_id = %event.user_id,
            %channel,
            "dispatching price change notification"
        );
        self.dispatch(NotificationRequest::price_change(event, channel, recipient))
            .await
    }

    pub async fn dispatch_welcome(&self, event: &UserCreatedEvent) -> DispatchOutcome {
        self.dispatch(NotificationRequest::welcome(&event.email, &event.username))
            .await
    }

    /// Rate-limit (when the request carries a user) and hand off to the
    /// channel sender on a separate task. The user's slot is taken before
    /// the task starts.
    pub async fn dispatch(&self, request: NotificationRequest) -> DispatchOutcome {
        let reservation = match request.user_id {
            Some(user_id) => match self.limiter.reserve(user_id).await {
                Some(reservation) => Some(reservation),
                None => return DispatchOutcome::Dropped(DropReason::RateLimitExceeded(user_id)),
            },
            None => None,
        };

        let this = self.clone();
        DispatchOutcome::Dispatched(tokio::spawn(async move {
            this.deliver(&request, reservation).await
        }))
    }

    /// Send now. A successful send commits the reservation; a failed one
    /// hands the slot back. Failures are logged and not retried.
    async fn deliver(
        &self,
        request: &NotificationRequest,
        reservation: Option<Reservation>,
    ) -> Result<(), SendError> {
        let sender = self
            .senders
            .get(&request.channel)
            .cloned()
            .ok_or(SendError::UnsupportedChannel(request.channel))?;

        match sender.send(request).await {
            Ok(()) => {
                if let Some(reservation) = reservation {
                    reservation.commit().await;
                }
                info!(
                    channel = %request.channel,
                    category = ?request.category,
                    priority = ?request.priority,
                    "notification sent"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    channel = %request.channel,
                    recipient = %request.recipient,
                    error = %err,
                    "failed to send notification"
                );
                Err(err)
            }
        }
    }

    /// Welcome mail outside the event flow (admin surface).
    pub async fn send_welcome(&self, email: &str, username: &str) -> Result<(), SendError> {
        self.deliver(&NotificationRequest::welcome(email, username), None)
            .await
    }

    /// Low-priority system mail used to verify the email setup.
    pub async fn send_test_email(
        &self,
        email: &str,
        subject: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), SendError> {
        let request = NotificationRequest::system(
            email,
            subject.unwrap_or(TEST_EMAIL_SUBJECT),
            message.unwrap_or(TEST_EMAIL_MESSAGE),
            Priority::Low,
        );
        self.deliver(&request, None).await
    }

    pub fn limit_per_hour(&self) -> u32 {
        self.limiter.max_per_hour()
    }

    /// Notifications counted for `user_id` in the current hour bucket.
    pub async fn notifications_last_hour(&self, user_id: UserId) -> Result<u32, RateLimitError> {
        self.limiter.current_count(user_id).await
    }
}
