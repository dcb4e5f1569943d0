//! Monitoring Orchestrator: periodic, bounded-concurrency price checks that
//! record observations and publish change events.

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use error::{RegistryError, StoreError};
pub use orchestrator::{MonitorOrchestrator, PriceSource, TickPhase, TickReport};
pub use registry::{InMemoryProductRegistry, MonitoredProduct, ProductRegistry, ProductStatus};
pub use scheduler::{MonitorScheduler, ScheduleConfig};
pub use store::{InMemoryObservationStore, NewObservation, ObservationStore, PriceObservation};
