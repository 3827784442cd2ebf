use std::sync::Arc;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use tickerbot_core::tool::{Error as ToolError, Tool, ToolResult};

use crate::market::MarketData;

const DEFAULT_CURRENCY: &str = "USD";

/// Input of [`StockPriceTool`].
#[derive(Deserialize, JsonSchema)]
pub struct StockPriceParameters {
    /// The symbol to look up, normalized before use.
    #[schemars(description = "The stock ticker symbol, e.g. AAPL or MSFT.")]
    pub ticker: String,
}

/// A tool that fetches the current price of a stock.
pub struct StockPriceTool {
    market: Arc<dyn MarketData>,
    parameter_schema: Value,
}

impl StockPriceTool {
    /// Creates the tool on top of the given market data source.
    #[inline]
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        StockPriceTool {
            market,
            parameter_schema: schema_for!(StockPriceParameters).to_value(),
        }
    }
}

impl Tool for StockPriceTool {
    type Input = StockPriceParameters;

    fn name(&self) -> &str {
        "StockPrice"
    }

    fn description(&self) -> &str {
        "Fetches the current stock price using Yahoo Finance."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: StockPriceParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let market = Arc::clone(&self.market);
        async move { get_stock_price(market.as_ref(), &input.ticker).await }
    }
}

/// Canonical form of a ticker: no surrounding whitespace, no quote
/// characters, upper case.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().replace(['\'', '"'], "").trim().to_uppercase()
}

/// Looks up the current price of `ticker` and describes it in a sentence.
///
/// A symbol without a market price or without today's history is not an
/// error, the returned sentence says so instead.
pub async fn get_stock_price(
    market: &dyn MarketData,
    ticker: &str,
) -> ToolResult {
    let ticker = normalize_ticker(ticker);
    if ticker.is_empty() {
        return Err(
            ToolError::invalid_input().with_reason("ticker symbol is empty")
        );
    }

    let quote = market.quote(&ticker).await.map_err(|err| {
        ToolError::execution_error().with_reason(format!("{err}"))
    })?;
    if quote.regular_market_price.is_none() {
        return Ok(format!(
            "Stock {ticker} is unavailable or might have been removed from Yahoo Finance."
        ));
    }

    let close = market.intraday_close(&ticker).await.map_err(|err| {
        ToolError::execution_error().with_reason(format!("{err}"))
    })?;
    let Some(price) = close else {
        return Ok(format!(
            "No available data for {ticker}. The market might be closed or insufficient data exists."
        ));
    };

    let currency = quote.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);
    Ok(format!(
        "The current price of {ticker} is {:.2} {currency}.",
        round_cents(price)
    ))
}

/// Rounds half away from zero, `{:.2}` alone would turn 172.345 into
/// 172.34 because of its binary representation.
#[inline]
fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}
