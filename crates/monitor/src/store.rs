//! Append-only record of price observations.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pricewatch_core::{ObservationId, ProductId};

use crate::error::StoreError;

pub const DEFAULT_CURRENCY: &str = "BRL";

/// One monitoring attempt for one product, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub id: ObservationId,
    pub product_id: ProductId,
    /// Absent when the attempt failed.
    pub price: Option<Decimal>,
    pub previous_price: Option<Decimal>,
    /// Store identifier the price was read from.
    pub source: Option<String>,
    pub currency: String,
    pub available: bool,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl PriceObservation {
    /// `true` when both prices are known and differ.
    pub fn is_change(&self) -> bool {
        matches!((self.previous_price, self.price), (Some(prev), Some(now)) if prev != now)
    }
}

/// An observation ready to be recorded (previous price not yet resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObservation {
    pub product_id: ProductId,
    pub price: Option<Decimal>,
    pub source: Option<String>,
    pub currency: String,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl NewObservation {
    pub fn available(
        product_id: ProductId,
        price: Decimal,
        source: Option<String>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            price: Some(price),
            source,
            currency: DEFAULT_CURRENCY.to_string(),
            error: None,
            checked_at,
        }
    }

    pub fn unavailable(
        product_id: ProductId,
        error: impl Into<String>,
        source: Option<String>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            price: None,
            source,
            currency: DEFAULT_CURRENCY.to_string(),
            error: Some(error.into()),
            checked_at,
        }
    }

    /// Assign an id and the previous price, producing the stored form.
    pub fn into_observation(self, previous_price: Option<Decimal>) -> PriceObservation {
        PriceObservation {
            id: ObservationId::new(),
            product_id: self.product_id,
            available: self.price.is_some(),
            price: self.price,
            previous_price,
            source: self.source,
            currency: self.currency,
            error: self.error,
            checked_at: self.checked_at,
        }
    }
}

/// Observation persistence.
///
/// `record` reads the latest observation and inserts the new one as a single
/// unit: the stored `previous_price` is the `price` of the latest prior
/// observation for that product (absent if there is none or it was
/// unavailable).
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn record(&self, observation: NewObservation) -> Result<PriceObservation, StoreError>;

    async fn latest(&self, product_id: ProductId) -> Result<Option<PriceObservation>, StoreError>;

    /// Observations checked at or after `since`, newest first.
    async fn history(
        &self,
        product_id: ProductId,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>, StoreError>;

    /// Distinct products with at least one price change observed since `since`.
    async fn products_with_changes(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProductId>, StoreError>;
}

/// In-memory observation store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    streams: RwLock<HashMap<ProductId, Vec<PriceObservation>>>,
}

impl InMemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

#[async_trait]
impl ObservationStore for InMemoryObservationStore {
    async fn record(&self, observation: NewObservation) -> Result<PriceObservation, StoreError> {
        let mut streams = self.streams.write().map_err(|_| Self::poisoned())?;
        let stream = streams.entry(observation.product_id).or_default();

        let previous_price = stream.last().and_then(|o| o.price);
        let stored = observation.into_observation(previous_price);
        stream.push(stored.clone());

        Ok(stored)
    }

    async fn latest(&self, product_id: ProductId) -> Result<Option<PriceObservation>, StoreError> {
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        Ok(streams.get(&product_id).and_then(|s| s.last().cloned()))
    }

    async fn history(
        &self,
        product_id: ProductId,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        Ok(streams
            .get(&product_id)
            .map(|s| {
                s.iter()
                    .rev()
                    .filter(|o| o.checked_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn products_with_changes(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProductId>, StoreError> {
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        let mut ids: Vec<ProductId> = streams
            .iter()
            .filter(|(_, s)| s.iter().any(|o| o.checked_at >= since && o.is_change()))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
