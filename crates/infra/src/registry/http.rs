//! JSON-over-HTTP registry clients.
//!
//! Product registry:
//! - `GET /active-products`
//! - `PATCH /products/{id}/current-price` `{currentPrice}`
//! - `PATCH /products/{id}/status` `{status}`
//! - `PATCH /products/{id}/error` `{error, lastCheckedAt}`
//!
//! User registry: `GET /users/{id}`; 404 means the user cannot be resolved.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use pricewatch_core::{ProductId, UserId};
use pricewatch_monitor::{MonitoredProduct, ProductRegistry, ProductStatus, RegistryError};
use pricewatch_notify::{ResolutionError, UserContact, UserRegistry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder().timeout(REQUEST_TIMEOUT).build()
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[derive(Debug, Clone)]
pub struct HttpProductRegistry {
    client: Client,
    base_url: String,
}

impl HttpProductRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RegistryError> {
        let client = build_client().map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn patch<B: Serialize + Sync>(
        &self,
        product_id: ProductId,
        path: &str,
        body: &B,
    ) -> Result<(), RegistryError> {
        let url = join(&self.base_url, &format!("/products/{product_id}/{path}"));
        let response = self
            .client
            .patch(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(product_id)),
            status => Err(RegistryError::Unavailable(format!(
                "PATCH {url} returned {status}"
            ))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentPriceBody {
    current_price: Decimal,
}

#[derive(Serialize)]
struct StatusBody {
    status: ProductStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    last_checked_at: DateTime<Utc>,
}

#[async_trait]
impl ProductRegistry for HttpProductRegistry {
    #[instrument(skip(self), fields(base_url = %self.base_url), err)]
    async fn active_products(&self) -> Result<Vec<MonitoredProduct>, RegistryError> {
        let url = join(&self.base_url, "/active-products");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        let products: Vec<MonitoredProduct> = response
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        debug!(count = products.len(), "fetched active products");
        Ok(products)
    }

    async fn update_current_price(
        &self,
        product_id: ProductId,
        current_price: Decimal,
    ) -> Result<(), RegistryError> {
        self.patch(product_id, "current-price", &CurrentPriceBody { current_price })
            .await
    }

    async fn update_status(
        &self,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<(), RegistryError> {
        self.patch(product_id, "status", &StatusBody { status }).await
    }

    async fn record_error(
        &self,
        product_id: ProductId,
        error: &str,
        last_checked_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.patch(
            product_id,
            "error",
            &ErrorBody {
                error,
                last_checked_at,
            },
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct HttpUserRegistry {
    client: Client,
    base_url: String,
}

impl HttpUserRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ResolutionError> {
        let client = build_client().map_err(|e| ResolutionError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl UserRegistry for HttpUserRegistry {
    #[instrument(skip(self), err)]
    async fn contact(&self, user_id: UserId) -> Result<UserContact, ResolutionError> {
        let url = join(&self.base_url, &format!("/users/{user_id}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolutionError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ResolutionError::NotFound(user_id)),
            status if !status.is_success() => Err(ResolutionError::Unavailable(format!(
                "GET {url} returned {status}"
            ))),
            _ => response
                .json()
                .await
                .map_err(|e| ResolutionError::Decode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, patch};
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    async fn stub_server() -> (String, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route(
                "/active-products",
                get(|| async {
                    Json(json!([
                        {
                            "id": 7,
                            "name": "Notebook",
                            "url": "https://shop.test/notebook",
                            "targetPrice": "3500.00",
                            "store": "amazon",
                            "userId": 3,
                            "selector": null
                        }
                    ]))
                }),
            )
            .route(
                "/products/:id/:field",
                patch(
                    |State(calls): State<Calls>,
                     Path((id, field)): Path<(i64, String)>,
                     Json(body): Json<Value>| async move {
                        if id == 404 {
                            return AxumStatus::NOT_FOUND;
                        }
                        calls.lock().unwrap().push((format!("{id}/{field}"), body));
                        AxumStatus::NO_CONTENT
                    },
                ),
            )
            .route(
                "/users/:id",
                get(|Path(id): Path<i64>| async move {
                    if id == 1 {
                        Ok(Json(json!({ "id": 1, "email": "ana@example.com", "smsNotifications": true })))
                    } else {
                        Err(AxumStatus::NOT_FOUND)
                    }
                }),
            )
            .with_state(calls.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), calls)
    }

    #[tokio::test]
    async fn lists_active_products() {
        let (base, _) = stub_server().await;
        let registry = HttpProductRegistry::new(base).unwrap();

        let products = registry.active_products().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, ProductId::new(7));
        assert_eq!(products[0].target_price, Some(dec!(3500.00)));
        assert_eq!(products[0].user_id, UserId::new(3));
    }

    #[tokio::test]
    async fn pushes_updates_as_camel_case_json() {
        let (base, calls) = stub_server().await;
        let registry = HttpProductRegistry::new(format!("{base}/")).unwrap();
        let id = ProductId::new(7);

        registry.update_current_price(id, dec!(3299.90)).await.unwrap();
        registry.update_status(id, ProductStatus::PriceAchieved).await.unwrap();
        registry
            .record_error(id, "price not found", Utc::now())
            .await
            .unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "7/current-price");
        assert_eq!(calls[0].1["currentPrice"], json!("3299.90"));
        assert_eq!(calls[1].1["status"], json!("PRICE_ACHIEVED"));
        assert_eq!(calls[2].0, "7/error");
        assert_eq!(calls[2].1["error"], json!("price not found"));
        assert!(calls[2].1.get("lastCheckedAt").is_some());
    }

    #[tokio::test]
    async fn missing_product_maps_to_not_found() {
        let (base, _) = stub_server().await;
        let registry = HttpProductRegistry::new(base).unwrap();

        let err = registry
            .update_status(ProductId::new(404), ProductStatus::Unavailable)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotFound(ProductId::new(404)));
    }

    #[tokio::test]
    async fn resolves_users_and_defaults_preferences() {
        let (base, _) = stub_server().await;
        let users = HttpUserRegistry::new(base).unwrap();

        let contact = users.contact(UserId::new(1)).await.unwrap();
        assert_eq!(contact.email.as_deref(), Some("ana@example.com"));
        assert_eq!(contact.email_notifications, None);
        assert!(contact.allows(pricewatch_events::NotificationChannel::Email));
        assert!(contact.allows(pricewatch_events::NotificationChannel::Sms));

        assert_eq!(
            users.contact(UserId::new(2)).await.unwrap_err(),
            ResolutionError::NotFound(UserId::new(2))
        );
    }

    #[tokio::test]
    async fn unreachable_registry_is_unavailable() {
        let registry = HttpProductRegistry::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            registry.active_products().await,
            Err(RegistryError::Unavailable(_))
        ));
    }
}
