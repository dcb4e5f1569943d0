//! End-to-end pipeline over in-memory backends.
//!
//! Registry → Extractor → Observation store → Event bus → Dispatcher → Mail

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use tokio::sync::watch;

use pricewatch_core::{ManualClock, ProductId, UserId};
use pricewatch_events::{EventBus, InMemoryEventBus, JsonEnvelope};
use pricewatch_extraction::{FetchError, PageFetcher, PriceExtractor, RetryPolicy};
use pricewatch_monitor::{
    InMemoryObservationStore, InMemoryProductRegistry, MonitorOrchestrator, MonitoredProduct,
    ProductStatus,
};
use pricewatch_notify::{
    EmailSender, InMemoryRateLimitStore, InMemoryUserRegistry, NotificationDispatcher,
    RateLimiter, RecordingMailTransport, UserContact,
};

/// Serves one product page whose price the test changes between ticks.
struct ShopPage {
    html: Mutex<String>,
}

impl ShopPage {
    fn new() -> Self {
        Self {
            html: Mutex::new(String::new()),
        }
    }

    fn set_price(&self, price: &str) {
        *self.html.lock().unwrap() =
            format!(r#"<html><body><span class="a-offscreen">R$ {price}</span></body></html>"#);
    }
}

#[async_trait]
impl PageFetcher for ShopPage {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if url.contains("gone") {
            return Err(FetchError::Status { status: 404 });
        }
        Ok(self.html.lock().unwrap().clone())
    }
}

struct Pipeline {
    orchestrator: MonitorOrchestrator,
    registry: Arc<InMemoryProductRegistry>,
    page: Arc<ShopPage>,
    transport: Arc<RecordingMailTransport>,
    shutdown: watch::Sender<bool>,
    dispatcher: tokio::task::JoinHandle<()>,
}

async fn pipeline() -> Pipeline {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 11, 29, 9, 0, 0).unwrap(),
    ));
    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());

    let registry = Arc::new(InMemoryProductRegistry::new());
    registry.insert(MonitoredProduct {
        id: ProductId::new(1),
        name: "Smart TV 50".to_string(),
        url: "https://www.amazon.com.br/dp/tv50".to_string(),
        selector: None,
        store: Some("amazon".to_string()),
        target_price: Some(dec!(2500.00)),
        user_id: UserId::new(10),
    });
    registry.insert(MonitoredProduct {
        id: ProductId::new(2),
        name: "Old Blender".to_string(),
        url: "https://shop.test/gone".to_string(),
        selector: None,
        store: None,
        target_price: None,
        user_id: UserId::new(10),
    });

    let page = Arc::new(ShopPage::new());
    let extractor = PriceExtractor::new(page.clone(), RetryPolicy::no_retry());
    let orchestrator = MonitorOrchestrator::new(
        registry.clone(),
        Arc::new(InMemoryObservationStore::new()),
        Arc::new(extractor),
        bus.clone(),
    )
    .with_clock(clock.clone());

    let users = Arc::new(InMemoryUserRegistry::new());
    users.insert(UserContact::with_email(UserId::new(10), "bia@example.com"));
    let limiter = RateLimiter::new(
        Arc::new(InMemoryRateLimitStore::new(clock.clone())),
        clock,
        10,
    );
    let transport = Arc::new(RecordingMailTransport::new());
    let (shutdown, shutdown_rx) = watch::channel(false);
    let dispatcher = NotificationDispatcher::new(users, limiter)
        .with_sender(Arc::new(EmailSender::new(
            transport.clone(),
            "noreply@pricewatcher.com",
            "Price Watcher",
        )))
        .spawn(bus.clone(), shutdown_rx);

    while bus.subscriber_count() < 2 {
        tokio::task::yield_now().await;
    }

    Pipeline {
        orchestrator,
        registry,
        page,
        transport,
        shutdown,
        dispatcher,
    }
}

async fn wait_for_mail(transport: &RecordingMailTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.sent().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("notifications were not delivered in time");
}

#[tokio::test]
async fn price_drop_below_target_reaches_the_users_inbox() {
    let p = pipeline().await;

    p.page.set_price("2.999,90");
    let first = p.orchestrator.run_tick().await;
    assert_eq!(first.products, 2);
    assert_eq!(first.available, 1);
    assert_eq!(first.unavailable, 1);
    assert_eq!(first.events_published, 0);

    p.page.set_price("2.399,00");
    let second = p.orchestrator.run_tick().await;
    // Change and target reached each publish one event.
    assert_eq!(second.events_published, 2);

    wait_for_mail(&p.transport, 2).await;
    let sent = p.transport.sent();
    assert!(sent.iter().all(|m| m.to == "bia@example.com"));
    assert!(sent
        .iter()
        .all(|m| m.subject == "🎉 Meta de preço atingida: Smart TV 50"));
    assert!(sent[0].html.contains("R$ 2.399,00"));
    assert!(sent[0].html.contains("R$ 101,00"));

    let tv = p.registry.get(ProductId::new(1)).unwrap();
    assert_eq!(tv.current_price, Some(dec!(2399.00)));
    assert_eq!(tv.status, ProductStatus::PriceAchieved);
    let blender = p.registry.get(ProductId::new(2)).unwrap();
    assert!(blender.last_error.is_some());

    let latest = p.orchestrator.latest(ProductId::new(1)).await.unwrap().unwrap();
    assert_eq!(latest.previous_price, Some(dec!(2999.90)));
    assert_eq!(
        p.orchestrator.products_with_changes(24).await.unwrap(),
        vec![ProductId::new(1)]
    );

    p.shutdown.send(true).unwrap();
    p.dispatcher.await.unwrap();
}

#[tokio::test]
async fn unchanged_price_above_target_stays_quiet() {
    let p = pipeline().await;

    p.page.set_price("2.999,90");
    p.orchestrator.run_tick().await;
    let again = p.orchestrator.run_tick().await;

    assert_eq!(again.events_published, 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(p.transport.sent().is_empty());

    p.shutdown.send(true).unwrap();
    p.dispatcher.await.unwrap();
}

#[tokio::test]
async fn a_published_event_reaches_every_matching_subscriber() {
    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());
    let mut all = bus.subscribe("#");
    let mut users = bus.subscribe("user.*");

    let created = pricewatch_events::UserCreatedEvent::new(UserId::new(3), "caio", "caio@example.com");
    bus.publish(
        pricewatch_events::routing_keys::USER_CREATED,
        JsonEnvelope::from_event(&created).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(all.try_recv().unwrap().routing_key(), "user.created");
    assert_eq!(users.try_recv().unwrap().routing_key(), "user.created");
}
