//! `pricewatch-core`: shared building blocks for the price-watching pipeline.
//!
//! Pure primitives only (identifiers, time source, domain errors); no IO.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use id::{ObservationId, ProductId, UserId};
