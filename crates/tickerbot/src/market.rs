//! Market data lookups.

mod yahoo;

use async_trait::async_trait;
use reqwest::StatusCode;

pub use yahoo::YahooFinance;

/// Quote metadata for one symbol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Quote {
    /// The latest traded price, `None` when the symbol is not tradable.
    pub regular_market_price: Option<f64>,
    /// Currency the prices are quoted in.
    pub currency: Option<String>,
}

/// A source of current market data.
///
/// Unknown symbols and empty histories are normal outcomes and must be
/// reported as `None`, not as errors.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetches the current quote metadata for `symbol`.
    async fn quote(&self, symbol: &str) -> Result<Quote, MarketError>;

    /// Fetches today's price history for `symbol` and returns its latest
    /// close, if there is any.
    async fn intraday_close(
        &self,
        symbol: &str,
    ) -> Result<Option<f64>, MarketError>;
}

/// Errors from a market data provider.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// The request could not be sent or the answer could not be read.
    #[error("market data request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The provider answered with an unexpected status.
    #[error("market data provider answered {0}")]
    Status(StatusCode),
    /// The provider answered with something that is not a chart.
    #[error("unexpected market data payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// The configured provider address is unusable.
    #[error("invalid market data address: {0}")]
    InvalidBaseUrl(String),
}
