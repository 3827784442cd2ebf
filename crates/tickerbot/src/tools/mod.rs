//! Tools the model can call.

mod stock_price;

pub use stock_price::{
    StockPriceParameters, StockPriceTool, get_stock_price, normalize_ticker,
};
