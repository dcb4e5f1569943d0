use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricewatch_core::{ProductId, UserId};
use pricewatch_monitor::PriceObservation;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

impl HistoryQuery {
    pub fn days(&self) -> u32 {
        self.days.unwrap_or(30)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangesQuery {
    pub hours: Option<u32>,
}

impl ChangesQuery {
    pub fn hours(&self) -> u32 {
        self.hours.unwrap_or(24)
    }
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub email: String,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeRequest {
    pub email: String,
    pub user_name: Option<String>,
}

impl WelcomeRequest {
    pub fn user_name(&self) -> &str {
        self.user_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("New User")
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckProductResponse {
    pub product_id: ProductId,
    pub observation: PriceObservation,
    pub events_published: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    pub hours: u32,
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub user_id: UserId,
    pub notifications_last_hour: u32,
    pub limit_per_hour: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
