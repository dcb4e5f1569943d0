use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};

use crate::error::{ExtractionError, FetchError};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::parse::{bare_amounts, currency_tokens, parse_price};
use crate::retry::RetryPolicy;
use crate::selectors::{Store, GENERIC};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Fetch settings for the HTTP-backed extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Fetches product pages and pulls a price out of them.
#[derive(Clone)]
pub struct PriceExtractor {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PriceExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceExtractor")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PriceExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, retry: RetryPolicy) -> Self {
        Self { fetcher, retry }
    }

    pub fn http(config: &ExtractorConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(config.timeout, &config.user_agent)?;
        Ok(Self::new(Arc::new(fetcher), config.retry))
    }

    /// Fetch `url` (retrying transient failures) and extract its price.
    #[instrument(skip(self), err)]
    pub async fn extract(
        &self,
        url: &str,
        store_hint: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Decimal, ExtractionError> {
        let fetcher = &self.fetcher;
        let html = self
            .retry
            .run(|| fetcher.fetch(url), FetchError::is_retryable)
            .await?;

        let store = Store::from_hint(store_hint.unwrap_or_default());
        extract_from_html(&html, store, selector).ok_or_else(|| ExtractionError::PriceNotFound {
            url: url.to_string(),
        })
    }

    /// One fetch, no retries. Never fails.
    pub async fn is_url_accessible(&self, url: &str) -> bool {
        match self.fetcher.fetch(url).await {
            Ok(_) => true,
            Err(err) => {
                debug!(url, error = %err, "url not accessible");
                false
            }
        }
    }
}

/// Run the selector cascade and regex scan over already-fetched markup.
///
/// Stops at the first positive price: custom selector, store selectors,
/// generic selectors, then currency-shaped tokens in the raw markup.
pub fn extract_from_html(html: &str, store: Store, custom: Option<&str>) -> Option<Decimal> {
    let document = Html::parse_document(html);

    if let Some(custom) = custom.map(str::trim).filter(|s| !s.is_empty()) {
        match Selector::parse(custom) {
            Ok(selector) => {
                if let Some(price) = first_price(&document, &selector) {
                    debug!(selector = custom, %price, "price found with custom selector");
                    return Some(price);
                }
            }
            Err(err) => warn!(selector = custom, error = ?err, "invalid custom selector; skipping"),
        }
    }

    store
        .selectors()
        .iter()
        .chain(GENERIC.iter())
        .find_map(|raw| {
            let selector = Selector::parse(raw).ok()?;
            let price = first_price(&document, &selector)?;
            debug!(selector = raw, ?store, %price, "price found with known selector");
            Some(price)
        })
        .or_else(|| scan_markup(html))
}

fn first_price(document: &Html, selector: &Selector) -> Option<Decimal> {
    document
        .select(selector)
        .filter_map(|element| parse_price(&element_text(element)).ok())
        .find(|price| *price > Decimal::ZERO)
}

fn element_text(element: ElementRef<'_>) -> String {
    let text = element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !text.is_empty() {
        return text;
    }

    ["content", "data-price", "value"]
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(str::to_string)
        .unwrap_or_default()
}

fn scan_markup(html: &str) -> Option<Decimal> {
    currency_tokens(html)
        .chain(bare_amounts(html))
        .filter_map(|token| parse_price(token).ok())
        .find(|price| *price > Decimal::ZERO)
}
