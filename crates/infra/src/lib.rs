//! Infrastructure layer: configuration, Redis, Postgres, HTTP and SMTP
//! adapters for the monitor and notification pipelines.

pub mod config;
pub mod event_bus;
pub mod mail;
pub mod observation_store;
pub mod rate_limit;
pub mod registry;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, ConfigError};
pub use mail::SmtpMailTransport;
pub use observation_store::PostgresObservationStore;
pub use registry::{HttpProductRegistry, HttpUserRegistry};
