//! Persistent observation stores.
//!
//! The trait and the in-memory store live in `pricewatch-monitor`.

pub mod postgres;

pub use postgres::PostgresObservationStore;
