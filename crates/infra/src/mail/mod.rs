//! Outbound mail transports.

pub mod smtp;

pub use smtp::SmtpMailTransport;
