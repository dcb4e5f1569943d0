//! Backend selection and background workers.
//!
//! `REDIS_URL` switches the event channel and rate-limit counters to Redis,
//! `DATABASE_URL` the observation store to Postgres. Without registry URLs the
//! in-memory registries start empty.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pricewatch_core::{Clock, SystemClock};
use pricewatch_events::{EventBus, InMemoryEventBus, JsonEnvelope};
use pricewatch_extraction::PriceExtractor;
use pricewatch_infra::event_bus::RedisStreamsEventBus;
use pricewatch_infra::rate_limit::RedisRateLimitStore;
use pricewatch_infra::{
    AppConfig, HttpProductRegistry, HttpUserRegistry, PostgresObservationStore, SmtpMailTransport,
};
use pricewatch_monitor::{
    InMemoryObservationStore, InMemoryProductRegistry, MonitorOrchestrator, MonitorScheduler,
    ObservationStore, PriceSource, ProductRegistry, ScheduleConfig,
};
use pricewatch_notify::{
    EmailSender, InMemoryRateLimitStore, InMemoryUserRegistry, MailTransport,
    NotificationDispatcher, RateLimitStore, RateLimiter, RecordingMailTransport, UserRegistry,
};

/// The collaborators the pipeline runs against.
pub struct Backends {
    pub registry: Arc<dyn ProductRegistry>,
    pub users: Arc<dyn UserRegistry>,
    pub store: Arc<dyn ObservationStore>,
    pub bus: Arc<dyn EventBus<JsonEnvelope>>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub mail: Arc<dyn MailTransport>,
    pub source: Arc<dyn PriceSource>,
    pub clock: Arc<dyn Clock>,
}

/// Shared handles used by the HTTP handlers and the background workers.
#[derive(Clone)]
pub struct AppServices {
    pub orchestrator: MonitorOrchestrator,
    pub dispatcher: NotificationDispatcher,
    pub bus: Arc<dyn EventBus<JsonEnvelope>>,
}

impl AppServices {
    pub fn assemble(config: &AppConfig, backends: Backends) -> Self {
        let orchestrator = MonitorOrchestrator::new(
            backends.registry,
            backends.store,
            backends.source,
            backends.bus.clone(),
        )
        .with_clock(backends.clock.clone())
        .with_max_concurrent(config.monitor.max_concurrent)
        .with_enabled(config.monitor.enabled);

        let limiter = RateLimiter::new(
            backends.rate_limits,
            backends.clock,
            config.rate_limit_per_hour,
        );
        let dispatcher = NotificationDispatcher::new(backends.users, limiter).with_sender(Arc::new(
            EmailSender::new(
                backends.mail,
                config.mail_from_address.clone(),
                config.mail_from_name.clone(),
            ),
        ));

        Self {
            orchestrator,
            dispatcher,
            bus: backends.bus,
        }
    }

    /// Start the monitor scheduler and the notification loop. Both stop
    /// when `shutdown` flips.
    pub fn spawn_workers(
        &self,
        schedule: ScheduleConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        vec![
            MonitorScheduler::new(self.orchestrator.clone(), schedule).spawn(shutdown.clone()),
            self.dispatcher.clone().spawn(self.bus.clone(), shutdown),
        ]
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry: Arc<dyn ProductRegistry> = match &config.product_registry_url {
        Some(url) => Arc::new(HttpProductRegistry::new(url.as_str())?),
        None => {
            warn!("PRICEWATCH_PRODUCT_REGISTRY_URL not set; using an empty in-memory product registry");
            Arc::new(InMemoryProductRegistry::new())
        }
    };

    let users: Arc<dyn UserRegistry> = match &config.user_registry_url {
        Some(url) => Arc::new(HttpUserRegistry::new(url.as_str())?),
        None => {
            warn!("PRICEWATCH_USER_REGISTRY_URL not set; using an empty in-memory user registry");
            Arc::new(InMemoryUserRegistry::new())
        }
    };

    let store: Arc<dyn ObservationStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresObservationStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to create observation schema")?;
            info!("using Postgres observation store");
            Arc::new(store)
        }
        None => Arc::new(InMemoryObservationStore::new()),
    };

    let bus: Arc<dyn EventBus<JsonEnvelope>> = match &config.redis_url {
        Some(url) => {
            let mut bus = RedisStreamsEventBus::new(url, config.consumer_group.clone())?
                .with_stream_key(config.event_stream.as_str());
            if let Some(name) = &config.consumer_name {
                bus = bus.with_consumer_name(name.as_str());
            }
            info!(stream = %config.event_stream, "using Redis Streams event channel");
            Arc::new(bus)
        }
        None => Arc::new(InMemoryEventBus::<JsonEnvelope>::new()),
    };

    let rate_limits: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisRateLimitStore::new(url)?),
        None => Arc::new(InMemoryRateLimitStore::new(clock.clone())),
    };

    let mail: Arc<dyn MailTransport> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailTransport::new(smtp)?),
        None => {
            warn!("PRICEWATCH_SMTP_HOST not set; outgoing mail is kept in process");
            Arc::new(RecordingMailTransport::new())
        }
    };

    let source: Arc<dyn PriceSource> = Arc::new(
        PriceExtractor::http(&config.scrape.extractor()).context("failed to build HTTP client")?,
    );

    Ok(AppServices::assemble(
        config,
        Backends {
            registry,
            users,
            store,
            bus,
            rate_limits,
            mail,
            source,
            clock,
        },
    ))
}
