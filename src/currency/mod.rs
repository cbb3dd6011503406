//! Currency conversion to the reference currency with a TTL rate cache.

mod cache;
mod converter;

pub use cache::{RateCache, DEFAULT_RATE_TTL};
pub use converter::{CurrencyConverter, CurrencyError, RATES_API_BASE_URL, SUPPORTED_CURRENCIES};
