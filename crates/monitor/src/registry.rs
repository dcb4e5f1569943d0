//! Contract with the external product registry.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pricewatch_core::{ProductId, UserId};

use crate::error::RegistryError;

/// A product under price watch, as handed out by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredProduct {
    pub id: ProductId,
    pub name: String,
    pub url: String,
    #[serde(default, alias = "selectorHint")]
    pub selector: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    Paused,
    Unavailable,
    PriceAchieved,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "ACTIVE",
            ProductStatus::Paused => "PAUSED",
            ProductStatus::Unavailable => "UNAVAILABLE",
            ProductStatus::PriceAchieved => "PRICE_ACHIEVED",
        }
    }
}

/// Product registry collaborator.
///
/// The push-back operations are best effort from the orchestrator's point of
/// view: failures are logged and never roll back a recorded observation.
#[async_trait]
pub trait ProductRegistry: Send + Sync {
    async fn active_products(&self) -> Result<Vec<MonitoredProduct>, RegistryError>;

    async fn update_current_price(
        &self,
        product_id: ProductId,
        current_price: Decimal,
    ) -> Result<(), RegistryError>;

    async fn update_status(
        &self,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<(), RegistryError>;

    async fn record_error(
        &self,
        product_id: ProductId,
        error: &str,
        last_checked_at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;
}

/// Registry-side view of a product, including the fields pushed back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub product: MonitoredProduct,
    pub status: ProductStatus,
    pub current_price: Option<Decimal>,
    pub last_error: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// In-memory product registry.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProductRegistry {
    products: RwLock<BTreeMap<ProductId, ProductRecord>>,
}

impl InMemoryProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an `ACTIVE` product.
    pub fn insert(&self, product: MonitoredProduct) {
        if let Ok(mut products) = self.products.write() {
            products.insert(
                product.id,
                ProductRecord {
                    product,
                    status: ProductStatus::Active,
                    current_price: None,
                    last_error: None,
                    last_checked_at: None,
                },
            );
        }
    }

    pub fn get(&self, product_id: ProductId) -> Option<ProductRecord> {
        self.products
            .read()
            .ok()
            .and_then(|products| products.get(&product_id).cloned())
    }

    fn update(
        &self,
        product_id: ProductId,
        f: impl FnOnce(&mut ProductRecord),
    ) -> Result<(), RegistryError> {
        let mut products = self
            .products
            .write()
            .map_err(|_| RegistryError::Unavailable("lock poisoned".to_string()))?;
        let record = products
            .get_mut(&product_id)
            .ok_or(RegistryError::NotFound(product_id))?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl ProductRegistry for InMemoryProductRegistry {
    async fn active_products(&self) -> Result<Vec<MonitoredProduct>, RegistryError> {
        let products = self
            .products
            .read()
            .map_err(|_| RegistryError::Unavailable("lock poisoned".to_string()))?;
        Ok(products
            .values()
            .filter(|r| r.status == ProductStatus::Active)
            .map(|r| r.product.clone())
            .collect())
    }

    async fn update_current_price(
        &self,
        product_id: ProductId,
        current_price: Decimal,
    ) -> Result<(), RegistryError> {
        self.update(product_id, |r| r.current_price = Some(current_price))
    }

    async fn update_status(
        &self,
        product_id: ProductId,
        status: ProductStatus,
    ) -> Result<(), RegistryError> {
        self.update(product_id, |r| r.status = status)
    }

    async fn record_error(
        &self,
        product_id: ProductId,
        error: &str,
        last_checked_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.update(product_id, |r| {
            r.last_error = Some(error.to_string());
            r.last_checked_at = Some(last_checked_at);
        })
    }
}
