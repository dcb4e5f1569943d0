//! Price Extraction Engine.
//!
//! Fetches a product page and pulls a price out of it using, in order, a
//! caller-supplied CSS selector, the retailer's known selectors, a generic
//! selector list, and finally a regex scan over the raw markup.

pub mod engine;
pub mod error;
pub mod fetch;
pub mod parse;
pub mod retry;
pub mod selectors;

pub use engine::{ExtractorConfig, PriceExtractor};
pub use error::{ExtractionError, FetchError, PriceParseError};
pub use fetch::{HttpFetcher, PageFetcher};
pub use parse::parse_price;
pub use retry::RetryPolicy;
pub use selectors::Store;
