pub mod http_source;
pub mod price_source;

// Re-export for convenient access (e.g. `use crate::market_data::PriceSource`).
pub use http_source::{HttpPriceSource, DEFAULT_PRICE_API_BASE};
pub use price_source::{Granularity, HistoryRequest, PriceSource};
