//! DonationAlertsClient - authenticated access to the DonationAlerts REST API.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{mask_secret, Config, Settings};
use crate::donation::Donation;

/// Default base URL for the DonationAlerts REST API.
pub const DA_API_BASE_URL: &str = "https://www.donationalerts.com/api/v1";

/// Default base URL for the DonationAlerts OAuth endpoints.
pub const DA_OAUTH_BASE_URL: &str = "https://www.donationalerts.com/oauth";

/// Scopes needed to read the user and list donations.
pub const OAUTH_SCOPES: &str = "oauth-user-show oauth-donation-index";

/// How long to back off after an HTTP 429.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct DonationsEnvelope {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl DonationsEnvelope {
    /// Decode each record on its own so one malformed entry does not drop the page.
    fn into_donations(self) -> Vec<Donation> {
        self.data
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Donation>(record) {
                Ok(donation) => Some(donation),
                Err(e) => {
                    log::warn!("Skipping unreadable donation record: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Tokens obtained from the OAuth token endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp at which the access token expires.
    pub expires_at: Option<i64>,
}

/// Client for the donation listing and OAuth token endpoints.
///
/// Tokens and client credentials are read from the shared [`Settings`] on every call and
/// written back there after a refresh or code exchange.
pub struct DonationAlertsClient {
    settings: Settings,
    api_base: String,
    oauth_base: String,
    http_client: reqwest::Client,
    rate_limit_backoff: Duration,
}

impl DonationAlertsClient {
    /// Create a client against the public DonationAlerts endpoints.
    pub fn new(settings: Settings) -> Result<Self, DonationAlertsError> {
        Self::with_base_urls(
            settings,
            DA_API_BASE_URL.to_string(),
            DA_OAUTH_BASE_URL.to_string(),
        )
    }

    /// Create a client with custom base URLs.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_urls(
        settings: Settings,
        api_base: String,
        oauth_base: String,
    ) -> Result<Self, DonationAlertsError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            settings,
            api_base: api_base.trim_end_matches('/').to_string(),
            oauth_base: oauth_base.trim_end_matches('/').to_string(),
            http_client,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        })
    }

    pub fn from_config(config: &Config, settings: Settings) -> Result<Self, DonationAlertsError> {
        let client = Self::with_base_urls(
            settings,
            config.donation_alerts.api_base.clone(),
            config.donation_alerts.oauth_base.clone(),
        )?;
        Ok(client.with_rate_limit_backoff(Duration::from_millis(config.poller.rate_limit_backoff_ms)))
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the access token. Takes effect on the next request.
    pub fn set_api_token(&self, token: impl Into<String>) {
        let token = token.into();
        log::info!("DonationAlerts access token set: {}", mask_secret(&token));
        self.settings.set_access_token(token);
    }

    pub fn has_token(&self) -> bool {
        self.settings.access_token().is_some()
    }

    /// The URL to send the operator to for authorization.
    pub fn authorize_url(&self, state: Option<&str>) -> Result<String, DonationAlertsError> {
        let (client_id, redirect_uri) = {
            let settings = self.settings.read();
            (settings.client_id.clone(), settings.redirect_uri.clone())
        };
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or(DonationAlertsError::MissingCredentials)?;

        let mut params = vec![
            ("client_id", client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", OAUTH_SCOPES),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }

        let url = reqwest::Url::parse_with_params(&format!("{}/authorize", self.oauth_base), &params)
            .map_err(|e| DonationAlertsError::InvalidUrl(e.to_string()))?;
        Ok(url.to_string())
    }

    /// Fetch one page of donations. Every failure is logged and reported as `None`.
    pub async fn fetch_donations(&self, page: u32, limit: u32) -> Option<Vec<Donation>> {
        match self.try_fetch_donations(page, limit).await {
            Ok(donations) => Some(donations),
            Err(e) => {
                log::error!("Failed to fetch donations: {}", e);
                None
            }
        }
    }

    /// Fetch one page of donations.
    ///
    /// On 401 the access token is refreshed once and the request retried once. On 429
    /// the call sleeps for the rate-limit back-off before returning
    /// `DonationAlertsError::RateLimited`.
    pub async fn try_fetch_donations(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Donation>, DonationAlertsError> {
        let token = self
            .settings
            .access_token()
            .ok_or(DonationAlertsError::MissingToken)?;

        let mut response = self.get_donations(&token, page, limit).await?;

        match response.status().as_u16() {
            200 => {}
            401 => {
                log::warn!("API authentication failed (401). Attempting to refresh access token...");
                if !self.refresh_access_token().await {
                    return Err(DonationAlertsError::Unauthorized);
                }
                let token = self
                    .settings
                    .access_token()
                    .ok_or(DonationAlertsError::MissingToken)?;
                response = self.get_donations(&token, page, limit).await?;
                if response.status().as_u16() != 200 {
                    return Err(api_error(response).await);
                }
            }
            429 => {
                log::warn!(
                    "API rate limit hit - backing off {:?}",
                    self.rate_limit_backoff
                );
                tokio::time::sleep(self.rate_limit_backoff).await;
                return Err(DonationAlertsError::RateLimited);
            }
            _ => return Err(api_error(response).await),
        }

        let envelope: DonationsEnvelope = response.json().await?;
        let donations = envelope.into_donations();
        log::debug!("Fetched {} donations (page {})", donations.len(), page);
        Ok(donations)
    }

    async fn get_donations(
        &self,
        token: &str,
        page: u32,
        limit: u32,
    ) -> Result<reqwest::Response, DonationAlertsError> {
        let response = self
            .http_client
            .get(format!("{}/alerts/donations", self.api_base))
            .query(&[("page", page), ("limit", limit)])
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;
        Ok(response)
    }

    /// Refresh the access token with the stored refresh token. Returns whether it worked.
    pub async fn refresh_access_token(&self) -> bool {
        match self.try_refresh_access_token().await {
            Ok(grant) => {
                log::info!(
                    "Access token refreshed successfully: {}",
                    mask_secret(&grant.access_token)
                );
                true
            }
            Err(e) => {
                log::error!("Token refresh failed: {}", e);
                false
            }
        }
    }

    pub async fn try_refresh_access_token(&self) -> Result<TokenGrant, DonationAlertsError> {
        let (client_id, client_secret, refresh_token) = {
            let settings = self.settings.read();
            (
                non_empty(&settings.client_id),
                non_empty(&settings.client_secret),
                non_empty(&settings.refresh_token),
            )
        };
        let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (client_id, client_secret, refresh_token)
        else {
            return Err(DonationAlertsError::MissingCredentials);
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        let grant = self.request_token(&form, Some(refresh_token.as_str())).await?;
        self.store_grant(&grant);
        Ok(grant)
    }

    /// Exchange an authorization code for tokens and store them.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, DonationAlertsError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DonationAlertsError::MissingCode);
        }

        let (client_id, client_secret, redirect_uri) = {
            let settings = self.settings.read();
            (
                non_empty(&settings.client_id),
                non_empty(&settings.client_secret),
                settings.redirect_uri.clone(),
            )
        };
        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            return Err(DonationAlertsError::MissingCredentials);
        };

        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code", code),
        ];
        let grant = self.request_token(&form, None).await?;
        self.store_grant(&grant);
        log::info!("Authorization code exchanged: {}", mask_secret(&grant.access_token));
        Ok(grant)
    }

    async fn request_token(
        &self,
        form: &[(&str, &str)],
        previous_refresh_token: Option<&str>,
    ) -> Result<TokenGrant, DonationAlertsError> {
        let response = self
            .http_client
            .post(format!("{}/token", self.oauth_base))
            .form(form)
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(api_error(response).await);
        }

        let token: TokenResponse = response.json().await?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(DonationAlertsError::MissingAccessToken)?;

        Ok(TokenGrant {
            access_token,
            refresh_token: token
                .refresh_token
                .filter(|t| !t.is_empty())
                .or_else(|| previous_refresh_token.map(str::to_string)),
            expires_at: token
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| chrono::Utc::now().timestamp() + secs),
        })
    }

    fn store_grant(&self, grant: &TokenGrant) {
        self.settings.update(|settings| {
            settings.access_token = Some(grant.access_token.clone());
            if grant.refresh_token.is_some() {
                settings.refresh_token = grant.refresh_token.clone();
            }
            if grant.expires_at.is_some() {
                settings.token_expires_at = grant.expires_at;
            }
        });
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

async fn api_error(response: reqwest::Response) -> DonationAlertsError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    DonationAlertsError::Api { status, body }
}

/// Errors that can occur during DonationAlerts API operations.
#[derive(Debug, thiserror::Error)]
pub enum DonationAlertsError {
    #[error("No DonationAlerts access token configured")]
    MissingToken,

    #[error("OAuth client credentials or refresh token not configured")]
    MissingCredentials,

    #[error("Authorization code is empty")]
    MissingCode,

    #[error("Authentication failed and the token could not be refreshed")]
    Unauthorized,

    #[error("Rate limited by the API")]
    RateLimited,

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Token response missing access_token")]
    MissingAccessToken,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}
