use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::{MarketData, MarketError, Quote};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

// Yahoo rejects requests without a browser-like user agent.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; tickerbot/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartResult {
    fn latest_close(&self) -> Option<f64> {
        self.indicators
            .quote
            .first()?
            .close
            .iter()
            .rev()
            .find_map(|close| *close)
    }
}

/// Decodes a chart payload, `None` means the provider has no data for
/// the symbol.
fn parse_chart(body: &str) -> Result<Option<ChartResult>, serde_json::Error> {
    let envelope: ChartEnvelope = serde_json::from_str(body)?;
    Ok(envelope.chart.result.and_then(|mut r| r.pop()))
}

/// A [`MarketData`] implementation backed by the Yahoo Finance chart API.
#[derive(Clone, Debug)]
pub struct YahooFinance {
    client: Client,
    base_url: Url,
}

impl YahooFinance {
    /// Creates a client for the public API.
    #[inline]
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client for a custom API host.
    pub fn with_base_url(base_url: &str) -> Result<Self, MarketError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            MarketError::InvalidBaseUrl(format!("{base_url}: {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(MarketError::InvalidBaseUrl(base_url.into()));
        }
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, base_url })
    }

    fn chart_url(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Url, MarketError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                MarketError::InvalidBaseUrl(self.base_url.to_string())
            })?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        url.query_pairs_mut()
            .append_pair("range", "1d")
            .append_pair("interval", interval);
        Ok(url)
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<ChartResult>, MarketError> {
        let url = self.chart_url(symbol, interval)?;
        debug!("fetching chart: {url}");
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!("no chart for {symbol}");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(MarketError::Status(status));
        }

        let body = resp.text().await?;
        Ok(parse_chart(&body)?)
    }
}

#[async_trait]
impl MarketData for YahooFinance {
    async fn quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        let Some(chart) = self.fetch_chart(symbol, "1d").await? else {
            return Ok(Quote::default());
        };
        Ok(Quote {
            regular_market_price: chart.meta.regular_market_price,
            currency: chart.meta.currency,
        })
    }

    async fn intraday_close(
        &self,
        symbol: &str,
    ) -> Result<Option<f64>, MarketError> {
        let chart = self.fetch_chart(symbol, "5m").await?;
        Ok(chart.and_then(|chart| chart.latest_close()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::tools::get_stock_price;

    /// Answers every connection with the same status and JSON body.
    async fn serve(status: &'static str, body: &'static str) -> YahooFinance {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut head: Vec<u8> = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let count = socket.read(&mut chunk).await.unwrap();
                    if count == 0 {
                        break;
                    }
                    head.extend_from_slice(&chunk[..count]);
                }
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(resp.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        YahooFinance::with_base_url(&format!("http://{addr}")).unwrap()
    }

    #[test]
    fn test_parse_chart() {
        let chart = parse_chart(include_str!("../../fixtures/chart_aapl.json"))
            .unwrap()
            .unwrap();
        assert_eq!(chart.meta.regular_market_price, Some(172.345));
        assert_eq!(chart.meta.currency.as_deref(), Some("USD"));
        // The last interval has no close yet.
        assert_eq!(chart.latest_close(), Some(172.345));
    }

    #[test]
    fn test_parse_not_found() {
        let chart =
            parse_chart(include_str!("../../fixtures/chart_not_found.json"))
                .unwrap();
        assert!(chart.is_none());
    }

    #[test]
    fn test_empty_history() {
        let chart = parse_chart(
            r#"{"chart":{"result":[{"meta":{"currency":"USD",
                "regularMarketPrice":12.5},"indicators":{"quote":[{}]}}],
                "error":null}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chart.latest_close(), None);
    }

    #[test]
    fn test_chart_url() {
        let yahoo = YahooFinance::with_base_url("http://localhost:9000/api/")
            .unwrap();
        let url = yahoo.chart_url("BRK-B", "5m").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/api/v8/finance/chart/BRK-B?range=1d&interval=5m"
        );

        // Symbols are a single path segment.
        let url = yahoo.chart_url("A/B", "1d").unwrap();
        assert!(url.path().ends_with("/chart/A%2FB"));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = YahooFinance::with_base_url("mailto:quotes@example.com")
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidBaseUrl(_)));
    }

    #[tokio::test]
    async fn test_http_quote() {
        let yahoo =
            serve("200 OK", include_str!("../../fixtures/chart_aapl.json"))
                .await;
        let quote = yahoo.quote("AAPL").await.unwrap();
        assert_eq!(quote.regular_market_price, Some(172.345));
        assert_eq!(quote.currency.as_deref(), Some("USD"));
        assert_eq!(yahoo.intraday_close("AAPL").await.unwrap(), Some(172.345));
    }

    #[tokio::test]
    async fn test_http_not_found() {
        let yahoo = serve(
            "404 Not Found",
            r#"{"chart":{"result":null,"error":{"code":"Not Found",
                "description":"No data found, symbol may be delisted"}}}"#,
        )
        .await;
        assert_eq!(yahoo.quote("ZZZZ").await.unwrap(), Quote::default());
        assert_eq!(yahoo.intraday_close("ZZZZ").await.unwrap(), None);

        let message = get_stock_price(&yahoo, "zzzz").await.unwrap();
        assert_eq!(
            message,
            "Stock ZZZZ is unavailable or might have been removed from Yahoo Finance."
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let yahoo = serve("500 Internal Server Error", "{}").await;
        let err = yahoo.quote("AAPL").await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Status(StatusCode::INTERNAL_SERVER_ERROR)
        ));
    }
}
