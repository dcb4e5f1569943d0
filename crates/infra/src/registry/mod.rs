//! Clients for the external product and user registries.

pub mod http;

pub use http::{HttpProductRegistry, HttpUserRegistry};
