//! A command-line assistant for current stock prices.
//!
//! A local language model decides how to call the `StockPrice` tool, which
//! looks the symbol up on Yahoo Finance. The crate also works as a library:
//! build a [`Session`] and drive it with the loops in [`repl`].

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod dispatch;
pub mod market;
pub mod repl;
mod session;
pub mod tools;

pub use dispatch::{DispatchError, Dispatcher, extract_ticker};
pub use session::Session;

/// Re-exports of [`tickerbot_core`] crate.
pub mod core {
    pub use tickerbot_core::*;
}
