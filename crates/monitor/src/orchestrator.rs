//! Monitoring tick: fan out one bounded-concurrency task per active product,
//! record what each one saw and publish change events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use pricewatch_core::{Clock, ProductId, SystemClock};
use pricewatch_events::{Event, EventBus, JsonEnvelope, NotificationChannel, PriceChangeEvent};
use pricewatch_extraction::{ExtractionError, PriceExtractor};

use crate::error::StoreError;
use crate::registry::{MonitoredProduct, ProductRegistry, ProductStatus};
use crate::store::{NewObservation, ObservationStore, PriceObservation};

pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Where a product's current price comes from.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price_of(&self, product: &MonitoredProduct) -> Result<Decimal, ExtractionError>;
}

#[async_trait]
impl PriceSource for PriceExtractor {
    async fn price_of(&self, product: &MonitoredProduct) -> Result<Decimal, ExtractionError> {
        self.extract(
            &product.url,
            product.store.as_deref(),
            product.selector.as_deref(),
        )
        .await
    }
}

/// Where the orchestrator is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickPhase {
    Idle,
    FetchingActiveProducts,
    Dispatching,
}

/// Aggregated per-task outcomes of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// The tick was a no-op because monitoring is disabled.
    pub skipped: bool,
    pub products: usize,
    pub checked: usize,
    pub available: usize,
    pub unavailable: usize,
    /// Tasks whose observation could not be recorded.
    pub failed: usize,
    pub events_published: usize,
    pub panicked: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn absorb(&mut self, outcome: &CheckOutcome) {
        self.checked += 1;
        if outcome.observation.available {
            self.available += 1;
        } else {
            self.unavailable += 1;
        }
        self.events_published += outcome.events_published;
    }
}

/// Result of checking a single product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub observation: PriceObservation,
    pub events_published: usize,
}

/// Drives price checks for every active product.
///
/// Cheap to clone; clones share the enabled flag and phase.
#[derive(Clone)]
pub struct MonitorOrchestrator {
    registry: Arc<dyn ProductRegistry>,
    store: Arc<dyn ObservationStore>,
    source: Arc<dyn PriceSource>,
    bus: Arc<dyn EventBus<JsonEnvelope>>,
    clock: Arc<dyn Clock>,
    enabled: Arc<AtomicBool>,
    phase: Arc<watch::Sender<TickPhase>>,
    max_concurrent: usize,
}

impl std::fmt::Debug for MonitorOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorOrchestrator")
            .field("enabled", &self.is_enabled())
            .field("phase", &self.phase())
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl MonitorOrchestrator {
    pub fn new(
        registry: Arc<dyn ProductRegistry>,
        store: Arc<dyn ObservationStore>,
        source: Arc<dyn PriceSource>,
        bus: Arc<dyn EventBus<JsonEnvelope>>,
    ) -> Self {
        let (phase, _) = watch::channel(TickPhase::Idle);
        Self {
            registry,
            store,
            source,
            bus,
            clock: Arc::new(SystemClock),
            enabled: Arc::new(AtomicBool::new(true)),
            phase: Arc::new(phase),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.set_enabled(enabled);
        self
    }

    /// Takes effect at the start of the next tick; a running tick finishes.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> TickPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<TickPhase> {
        self.phase.subscribe()
    }

    /// Run one monitoring pass over every active product.
    pub async fn run_tick(&self) -> TickReport {
        if !self.is_enabled() {
            debug!("price monitoring disabled; skipping tick");
            return TickReport::skipped();
        }

        self.phase.send_replace(TickPhase::FetchingActiveProducts);
        let products = match self.registry.active_products().await {
            Ok(products) => products,
            Err(err) => {
                error!(error = %err, "failed to fetch active products");
                Vec::new()
            }
        };

        self.phase.send_replace(TickPhase::Dispatching);
        info!(products = products.len(), "starting price monitoring tick");

        let mut report = TickReport {
            products: products.len(),
            ..TickReport::default()
        };
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for product in products {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    error!(error = %err, "worker pool closed; remaining products skipped");
                    break;
                }
            };
            let this = self.clone();
            let product_id = product.id;
            tasks.spawn(async move {
                let _permit = permit;
                let checked = tokio::spawn(async move { this.check_product(&product).await }).await;
                (product_id, checked)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(outcome)))) => report.absorb(&outcome),
                Ok((product_id, Ok(Err(err)))) => {
                    report.failed += 1;
                    error!(%product_id, error = %err, "failed to record observation");
                }
                Ok((product_id, Err(err))) => {
                    report.panicked += 1;
                    error!(%product_id, error = %err, "price check task panicked");
                }
                Err(err) => {
                    report.panicked += 1;
                    error!(error = %err, "price check worker failed");
                }
            }
        }

        self.phase.send_replace(TickPhase::Idle);
        info!(
            checked = report.checked,
            available = report.available,
            unavailable = report.unavailable,
            failed = report.failed,
            events_published = report.events_published,
            panicked = report.panicked,
            "price monitoring tick finished"
        );
        report
    }

    /// Check one product now: extract, record, push back, publish.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn check_product(&self, product: &MonitoredProduct) -> Result<CheckOutcome, StoreError> {
        let checked_at = self.clock.now();
        match self.source.price_of(product).await {
            Ok(price) => self.on_price(product, price, checked_at).await,
            Err(err) => self.on_failure(product, &err, checked_at).await,
        }
    }

    async fn on_price(
        &self,
        product: &MonitoredProduct,
        price: Decimal,
        checked_at: DateTime<Utc>,
    ) -> Result<CheckOutcome, StoreError> {
        let observation = self
            .store
            .record(NewObservation::available(
                product.id,
                price,
                product.store.clone(),
                checked_at,
            ))
            .await?;

        if let Err(err) = self.registry.update_current_price(product.id, price).await {
            warn!(error = %err, "failed to push current price to product registry");
        }

        let mut events_published = 0;

        if observation.is_change() {
            info!(previous = ?observation.previous_price, current = %price, "price change detected");
            if self.publish(self.price_event(product, &observation, price)).await {
                events_published += 1;
            }
        }

        if product.target_price.is_some_and(|target| price <= target) {
            info!(current = %price, target = ?product.target_price, "target price reached");
            if let Err(err) = self
                .registry
                .update_status(product.id, ProductStatus::PriceAchieved)
                .await
            {
                warn!(error = %err, "failed to push PRICE_ACHIEVED status to product registry");
            }
            if self.publish(self.price_event(product, &observation, price)).await {
                events_published += 1;
            }
        }

        Ok(CheckOutcome {
            observation,
            events_published,
        })
    }

    async fn on_failure(
        &self,
        product: &MonitoredProduct,
        err: &ExtractionError,
        checked_at: DateTime<Utc>,
    ) -> Result<CheckOutcome, StoreError> {
        let message = err.to_string();
        warn!(error = %message, url = %product.url, "price check failed");

        let observation = self
            .store
            .record(NewObservation::unavailable(
                product.id,
                message.as_str(),
                product.store.clone(),
                checked_at,
            ))
            .await?;

        if let Err(err) = self
            .registry
            .record_error(product.id, &message, checked_at)
            .await
        {
            warn!(error = %err, "failed to push error to product registry");
        }

        Ok(CheckOutcome {
            observation,
            events_published: 0,
        })
    }

    fn price_event(
        &self,
        product: &MonitoredProduct,
        observation: &PriceObservation,
        price: Decimal,
    ) -> PriceChangeEvent {
        PriceChangeEvent {
            product_id: product.id,
            product_name: product.name.clone(),
            product_url: product.url.clone(),
            previous_price: observation.previous_price,
            current_price: price,
            target_price: product.target_price,
            user_id: product.user_id,
            notification_channel: NotificationChannel::default(),
            event_id: Uuid::now_v7(),
            timestamp: observation.checked_at,
        }
    }

    /// Publish failures are logged and swallowed. Returns whether the event
    /// reached the channel.
    async fn publish(&self, event: PriceChangeEvent) -> bool {
        let envelope = match JsonEnvelope::from_event(&event) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(event_id = %event.event_id, error = %err, "failed to encode price change event");
                return false;
            }
        };

        match self.bus.publish(event.routing_key(), envelope).await {
            Ok(()) => {
                debug!(event_id = %event.event_id, "price change event published");
                true
            }
            Err(err) => {
                warn!(event_id = %event.event_id, error = %err, "failed to publish price change event");
                false
            }
        }
    }

    /// Observations for `product_id` over the last `days` days, newest first.
    pub async fn history(
        &self,
        product_id: ProductId,
        days: u32,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        let since = self.clock.now() - chrono::Duration::days(i64::from(days));
        self.store.history(product_id, since).await
    }

    pub async fn latest(&self, product_id: ProductId) -> Result<Option<PriceObservation>, StoreError> {
        self.store.latest(product_id).await
    }

    /// Products whose price changed within the last `hours` hours.
    pub async fn products_with_changes(&self, hours: u32) -> Result<Vec<ProductId>, StoreError> {
        let since = self.clock.now() - chrono::Duration::hours(i64::from(hours));
        self.store.products_with_changes(since).await
    }
}
