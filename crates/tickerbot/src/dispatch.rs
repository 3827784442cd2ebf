use std::sync::Arc;

use tickerbot_core::tool::Error as ToolError;
use tickerbot_core::{Agent, AgentBuilder, AgentError, ModelClient};

use crate::market::MarketData;
use crate::tools::{StockPriceTool, get_stock_price, normalize_ticker};

/// Errors from handling one request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The agent ended without an answer.
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// The price lookup failed.
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// The input does not contain anything that looks like a ticker.
    #[error("no ticker symbol found in `{0}`")]
    NoTicker(String),
}

/// Routes one input line to a price lookup.
pub enum Dispatcher {
    /// Let the model decide how to call the `StockPrice` tool.
    Agent(Agent),
    /// Pick the ticker out of the line and look it up without a model.
    Direct(Arc<dyn MarketData>),
}

impl Dispatcher {
    /// Builds an agent dispatcher on top of an existing model client.
    pub fn agent(
        model_client: ModelClient,
        market: Arc<dyn MarketData>,
        max_iterations: usize,
    ) -> Self {
        let agent = AgentBuilder::with_model_client(model_client)
            .with_system_prompt(include_str!("./system_prompt.md"))
            .with_tool(StockPriceTool::new(market))
            .allowed_tools(["StockPrice"])
            .return_direct(true)
            .max_iterations(max_iterations)
            .build();
        Dispatcher::Agent(agent)
    }

    /// Handles one non-empty input line and returns the answer.
    pub async fn handle_request(
        &self,
        line: &str,
    ) -> Result<String, DispatchError> {
        match self {
            Dispatcher::Agent(agent) => {
                let question = format!(
                    "What is the current stock price of {}?",
                    line.trim().to_uppercase()
                );
                Ok(agent.run(&question).await?)
            }
            Dispatcher::Direct(market) => {
                let Some(ticker) = extract_ticker(line) else {
                    return Err(DispatchError::NoTicker(line.to_owned()));
                };
                debug!("direct lookup for `{ticker}`");
                Ok(get_stock_price(market.as_ref(), &ticker).await?)
            }
        }
    }
}

/// Picks a ticker symbol out of free text.
///
/// A line with a single word is taken as the symbol in any case. In longer
/// text the last word written in capitals wins, so `price of BRK-B please`
/// yields `BRK-B`. One-letter words only count when nothing longer is
/// found, and never as `I` or `A`.
pub fn extract_ticker(line: &str) -> Option<String> {
    let words: Vec<&str> = line
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !is_ticker_char(c)))
        .filter(|word| !word.is_empty())
        .collect();

    if let [word] = words.as_slice() {
        let ticker = normalize_ticker(word);
        return (!ticker.is_empty()).then_some(ticker);
    }

    let candidates: Vec<&str> = words
        .into_iter()
        .rev()
        .filter(|word| looks_like_ticker(word))
        .collect();
    // Single capitals in prose are mostly the words "I" and "A".
    candidates
        .iter()
        .find(|word| word.len() > 1)
        .or_else(|| {
            candidates
                .iter()
                .find(|word| !matches!(**word, "I" | "A"))
        })
        .map(|word| (*word).to_owned())
}

#[inline]
fn is_ticker_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '^' || c == '='
}

fn looks_like_ticker(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_uppercase())
        && word.chars().all(|c| {
            c.is_ascii_uppercase()
                || c.is_ascii_digit()
                || matches!(c, '.' | '-' | '^' | '=')
        })
}
