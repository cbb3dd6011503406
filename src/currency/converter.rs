//! CurrencyConverter - normalizes donation amounts to the reference currency.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use super::cache::RateCache;
use crate::config::{Config, Settings};

/// Default base URL of the free exchange-rate API.
pub const RATES_API_BASE_URL: &str = "https://api.exchangerate-api.com/v4/latest";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Currencies the provider is known to send.
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "CNY", "SEK", "NOK", "MXN", "SGD", "HKD",
    "KRW", "TRY", "PLN", "CZK", "HUF", "ILS", "CLP", "PHP", "AED", "SAR", "MYR", "THB", "UAH",
    "KZT", "BYN", "RUB",
];

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

pub struct CurrencyConverter {
    settings: Settings,
    api_base: String,
    http_client: reqwest::Client,
    cache: RateCache,
}

impl CurrencyConverter {
    pub fn new(settings: Settings) -> Result<Self, CurrencyError> {
        Self::with_base_url(settings, RATES_API_BASE_URL.to_string(), Duration::from_secs(300))
    }

    /// Create a converter against a custom rate API, with a custom cache lifetime.
    pub fn with_base_url(
        settings: Settings,
        api_base: String,
        cache_ttl: Duration,
    ) -> Result<Self, CurrencyError> {
        let http_client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        log::info!("CurrencyConverter initialized with in-memory caching (ttl {:?})", cache_ttl);
        Ok(Self {
            settings,
            api_base: api_base.trim_end_matches('/').to_string(),
            http_client,
            cache: RateCache::new(cache_ttl),
        })
    }

    pub fn from_config(config: &Config, settings: Settings) -> Result<Self, CurrencyError> {
        Self::with_base_url(
            settings,
            config.currency.api_base.clone(),
            Duration::from_secs(config.currency.cache_ttl_secs),
        )
    }

    pub fn reference_currency(&self) -> String {
        self.settings.reference_currency()
    }

    /// Convert `amount` into the reference currency. `None` if no rate could be obtained.
    pub async fn convert_to_reference(&self, amount: f64, from_currency: &str) -> Option<f64> {
        match self.try_convert(amount, from_currency).await {
            Ok(converted) => Some(converted),
            Err(e) => {
                log::error!("Error converting {} {}: {}", amount, from_currency, e);
                None
            }
        }
    }

    pub async fn try_convert(&self, amount: f64, from_currency: &str) -> Result<f64, CurrencyError> {
        let reference = self.reference_currency();
        let from = normalize(from_currency, &reference);
        if from == reference {
            return Ok(amount);
        }

        let rate = self.exchange_rate(&from, &reference).await?;
        let converted = amount * rate;
        log::info!(
            "Converted {} {} to {:.2} {} (rate: {})",
            amount,
            from,
            converted,
            reference,
            rate
        );
        Ok(converted)
    }

    /// Rate for `from -> to`, served from the cache while it is fresh.
    pub async fn exchange_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();
        if let Some(rate) = self.cache.get(&from, &to) {
            return Ok(rate);
        }

        let rate = self.fetch_rate(&from, &to).await?;
        self.cache.insert(&from, &to, rate);
        Ok(rate)
    }

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError> {
        let url = format!("{}/{}", self.api_base, from);
        log::debug!("Fetching exchange rates from {}", url);
        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CurrencyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let rates: RatesResponse = response.json().await?;
        match rates.rates.get(to) {
            Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
            _ => Err(CurrencyError::MissingRate(to.to_string())),
        }
    }

    pub fn supported_currencies(&self) -> &'static [&'static str] {
        SUPPORTED_CURRENCIES
    }

    /// True if one USD converts to a positive amount.
    pub async fn health_check(&self) -> bool {
        matches!(self.convert_to_reference(1.0, "USD").await, Some(v) if v > 0.0)
    }

    pub fn cached_rate_count(&self) -> usize {
        self.cache.len()
    }
}

/// Upper-case a currency code; an empty code means the reference currency.
fn normalize(code: &str, reference: &str) -> String {
    let code = code.trim();
    if code.is_empty() {
        reference.to_string()
    } else {
        code.to_uppercase()
    }
}

/// Errors that can occur while converting currencies.
#[derive(Debug, thiserror::Error)]
pub enum CurrencyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Rate for {0} not found in API response")]
    MissingRate(String),
}
