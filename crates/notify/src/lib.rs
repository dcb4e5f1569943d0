//! Notification Dispatcher: consumes pipeline events, applies per-user rate
//! limiting and hands rendered notifications to channel senders.

pub mod dispatcher;
pub mod rate_limit;
pub mod request;
pub mod senders;
pub mod templates;
pub mod users;

pub use dispatcher::{DispatchOutcome, DropReason, NotificationDispatcher};
pub use rate_limit::{
    InMemoryRateLimitStore, RateLimitError, RateLimitStore, RateLimiter, Reservation,
};
pub use request::{Category, NotificationRequest, Priority, Template, TemplateData};
pub use senders::{
    ChannelSender, EmailSender, MailTransport, OutgoingMail, RecordingMailTransport, SendError,
    UnsupportedChannelSender,
};
pub use users::{InMemoryUserRegistry, ResolutionError, UserContact, UserRegistry};
