//! Configuration file handling for donation-celebrator.
//!
//! Loads configuration from `~/.config/donation-celebrator/config.toml` or a custom path,
//! then applies environment overrides. Values that operators change while the poller is
//! running (threshold, OAuth tokens, system prompt) are copied into [`Settings`].

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::currency::RATES_API_BASE_URL;
use crate::donation_alerts::{DA_API_BASE_URL, DA_OAUTH_BASE_URL};
use crate::video::prompt::{default_tiers, tiered_prompt, PromptTier};
use crate::video::AIML_API_BASE_URL;

/// Environment variable holding the AIML API key.
pub const AIML_API_KEY_ENV: &str = "AIMLAPI_KEY";
/// Environment variable holding the DonationAlerts OAuth client id.
pub const DA_CLIENT_ID_ENV: &str = "DA_CLIENT_ID";
/// Environment variable holding the DonationAlerts OAuth client secret.
pub const DA_CLIENT_SECRET_ENV: &str = "DA_CLIENT_SECRET";
/// Environment variable holding a DonationAlerts access token.
pub const DA_ACCESS_TOKEN_ENV: &str = "DA_ACCESS_TOKEN";
/// Environment variable holding a DonationAlerts refresh token.
pub const DA_REFRESH_TOKEN_ENV: &str = "DA_REFRESH_TOKEN";

/// Configuration file structure for donation-celebrator.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub donation_alerts: DonationAlertsConfig,
    #[serde(default)]
    pub threshold: ThresholdConfig,
    #[serde(default)]
    pub currency: CurrencyConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    /// Amount-tiered fallback prompts. Empty means the built-in tiers.
    #[serde(default)]
    pub prompts: Vec<PromptTier>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DonationAlertsConfig {
    pub api_base: String,
    pub oauth_base: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Default for DonationAlertsConfig {
    fn default() -> Self {
        Self {
            api_base: DA_API_BASE_URL.to_string(),
            oauth_base: DA_OAUTH_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:5002/api/da/oauth/callback".to_string(),
            access_token: None,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum amount in the reference currency that triggers a video.
    pub amount: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self { amount: 1000.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CurrencyConfig {
    pub reference: String,
    pub api_base: String,
    pub cache_ttl_secs: u64,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            reference: "RUB".to_string(),
            api_base: RATES_API_BASE_URL.to_string(),
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VideoConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub videos_dir: PathBuf,
    /// Prepended to every prompt when non-empty.
    pub system_prompt: String,
    pub resolution: Option<String>,
    pub duration: Option<u32>,
    pub negative_prompt: Option<String>,
    pub seed: Option<u64>,
    pub enhance_prompt: bool,
    pub generate_audio: bool,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            api_base: AIML_API_BASE_URL.to_string(),
            model: "google/veo3".to_string(),
            api_key: None,
            videos_dir: PathBuf::from("generated_videos"),
            system_prompt: String::new(),
            resolution: None,
            duration: None,
            negative_prompt: None,
            seed: None,
            enhance_prompt: true,
            generate_audio: true,
            poll_interval_secs: 10,
            max_wait_secs: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollerConfig {
    pub min_request_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub page_limit: u32,
    pub freshness_window_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_request_interval_ms: 2000,
            error_backoff_ms: 5000,
            rate_limit_backoff_ms: 10_000,
            page_limit: 10,
            freshness_window_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from a file path and apply environment overrides.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override secrets from the environment (already populated from `.env`).
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_value(AIML_API_KEY_ENV) {
            self.video.api_key = Some(key);
        }
        if let Some(id) = env_value(DA_CLIENT_ID_ENV) {
            self.donation_alerts.client_id = Some(id);
        }
        if let Some(secret) = env_value(DA_CLIENT_SECRET_ENV) {
            self.donation_alerts.client_secret = Some(secret);
        }
        if let Some(token) = env_value(DA_ACCESS_TOKEN_ENV) {
            self.donation_alerts.access_token = Some(token);
        }
        if let Some(token) = env_value(DA_REFRESH_TOKEN_ENV) {
            self.donation_alerts.refresh_token = Some(token);
        }
    }

    /// Prompt tiers from the file, or the built-in ones when none are configured.
    pub fn prompt_tiers(&self) -> Vec<PromptTier> {
        if self.prompts.is_empty() {
            default_tiers()
        } else {
            self.prompts.clone()
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("donation-celebrator").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/donation-celebrator/config.toml")
        })
}

/// Render a secret for logs: never the value, only its length and a short fingerprint.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    let digest = Sha256::digest(secret.as_bytes());
    format!("*** (len={}, sha256:{})", secret.len(), hex::encode(&digest[..4]))
}

/// The operator-mutable part of the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub donation_threshold: f64,
    pub reference_currency: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    /// Unix timestamp at which the access token expires, when the provider reported one.
    pub token_expires_at: Option<i64>,
    pub system_prompt: String,
    pub prompt_tiers: Vec<PromptTier>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            donation_threshold: config.threshold.amount,
            reference_currency: config.currency.reference.to_uppercase(),
            access_token: config.donation_alerts.access_token.clone(),
            refresh_token: config.donation_alerts.refresh_token.clone(),
            client_id: config.donation_alerts.client_id.clone(),
            client_secret: config.donation_alerts.client_secret.clone(),
            redirect_uri: config.donation_alerts.redirect_uri.clone(),
            token_expires_at: None,
            system_prompt: config.video.system_prompt.clone(),
            prompt_tiers: config.prompt_tiers(),
        }
    }
}

/// Shared handle to [`RuntimeSettings`].
///
/// Cloning is cheap; every clone sees the same values. Readers take a short read lock
/// and never hold it across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    inner: Arc<RwLock<RuntimeSettings>>,
}

impl Settings {
    pub fn new(runtime: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(runtime)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(RuntimeSettings::from_config(config))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, RuntimeSettings> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the settings in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut RuntimeSettings) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self) -> RuntimeSettings {
        self.read().clone()
    }

    pub fn threshold(&self) -> f64 {
        self.read().donation_threshold
    }

    pub fn set_threshold(&self, amount: f64) {
        self.update(|s| s.donation_threshold = amount);
    }

    pub fn reference_currency(&self) -> String {
        self.read().reference_currency.clone()
    }

    /// The current access token, if one is set and non-empty.
    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone().filter(|t| !t.is_empty())
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.update(|s| s.access_token = Some(token));
    }

    pub fn system_prompt(&self) -> String {
        self.read().system_prompt.clone()
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.update(|s| s.system_prompt = prompt);
    }

    /// Lowest-priority prompt source: the canned template for this amount.
    pub fn video_prompt_template(&self, amount: f64) -> String {
        let guard = self.read();
        tiered_prompt(&guard.prompt_tiers, amount, &guard.reference_currency)
    }
}
