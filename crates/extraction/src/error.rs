use thiserror::Error;

/// Failure to turn a piece of text into a price.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot parse price from {input:?}: {reason}")]
pub struct PriceParseError {
    pub input: String,
    pub reason: &'static str,
}

impl PriceParseError {
    pub(crate) fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Failure to download a product page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connect, timeout, reset or body-read failure. Worth retrying.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The server answered with a 4xx/5xx status.
    #[error("page returned HTTP {status}")]
    Status { status: u16 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return FetchError::Status {
                status: status.as_u16(),
            };
        }
        if err.is_builder() {
            return FetchError::InvalidUrl(err.to_string());
        }
        FetchError::Transient(err.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no price found on {url}")]
    PriceNotFound { url: String },

    #[error(transparent)]
    PriceParse(#[from] PriceParseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
