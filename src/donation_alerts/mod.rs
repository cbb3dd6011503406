//! DonationAlerts provider integration: donation listing and OAuth tokens.

mod client;

pub use client::{
    DonationAlertsClient, DonationAlertsError, TokenGrant, DA_API_BASE_URL, DA_OAUTH_BASE_URL,
    DEFAULT_RATE_LIMIT_BACKOFF, OAUTH_SCOPES,
};
