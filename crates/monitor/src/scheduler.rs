use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::orchestrator::MonitorOrchestrator;

/// Fixed-delay schedule: the first tick fires after `initial_delay`, each
/// following tick `fixed_delay` after the previous one finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub initial_delay: Duration,
    pub fixed_delay: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            fixed_delay: Duration::from_secs(300),
        }
    }
}

/// Owns the monitoring timer.
#[derive(Debug)]
pub struct MonitorScheduler {
    orchestrator: MonitorOrchestrator,
    config: ScheduleConfig,
}

impl MonitorScheduler {
    pub fn new(orchestrator: MonitorOrchestrator, config: ScheduleConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Tick until `shutdown` changes (or its sender is dropped). A tick that
    /// has started always runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            initial_delay_ms = self.config.initial_delay.as_millis() as u64,
            fixed_delay_ms = self.config.fixed_delay.as_millis() as u64,
            "monitor scheduler started"
        );

        let mut delay = self.config.initial_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }

            let report = self.orchestrator.run_tick().await;
            debug!(?report, "scheduled tick complete");
            delay = self.config.fixed_delay;
        }

        info!("monitor scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use pricewatch_core::{ProductId, UserId};
    use pricewatch_events::{InMemoryEventBus, JsonEnvelope};
    use pricewatch_extraction::ExtractionError;

    use crate::orchestrator::PriceSource;
    use crate::registry::{InMemoryProductRegistry, MonitoredProduct};
    use crate::store::{InMemoryObservationStore, ObservationStore};

    struct FixedPrice;

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn price_of(&self, _: &MonitoredProduct) -> Result<Decimal, ExtractionError> {
            Ok(Decimal::from(10))
        }
    }

    fn setup() -> (MonitorOrchestrator, Arc<InMemoryObservationStore>) {
        let registry = Arc::new(InMemoryProductRegistry::new());
        registry.insert(MonitoredProduct {
            id: ProductId::new(1),
            name: "Cafeteira".to_string(),
            url: "https://shop.test/cafeteira".to_string(),
            selector: None,
            store: None,
            target_price: None,
            user_id: UserId::new(1),
        });
        let store = Arc::new(InMemoryObservationStore::new());
        let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());
        let orchestrator =
            MonitorOrchestrator::new(registry, store.clone(), Arc::new(FixedPrice), bus);
        (orchestrator, store)
    }

    async fn observations(store: &InMemoryObservationStore) -> usize {
        store
            .history(ProductId::new(1), chrono::DateTime::<chrono::Utc>::MIN_UTC)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_initial_then_fixed_delay() {
        let (orchestrator, store) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = MonitorScheduler::new(orchestrator, ScheduleConfig::default()).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(observations(&store).await, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(observations(&store).await, 1);

        tokio::time::sleep(Duration::from_secs(298)).await;
        assert_eq!(observations(&store).await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(observations(&store).await, 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_flag_suppresses_ticks() {
        let (orchestrator, store) = setup();
        orchestrator.set_enabled(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = MonitorScheduler::new(orchestrator.clone(), ScheduleConfig::default())
            .spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(observations(&store).await, 0);

        orchestrator.set_enabled(true);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(observations(&store).await, 1);

        drop(shutdown_tx);
        handle.await.unwrap();
    }
}
