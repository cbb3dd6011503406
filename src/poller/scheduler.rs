//! DonationPoller - the background loop that fetches and processes donations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::dispatch::CelebrationHandler;
use super::pipeline::DonationOutcome;
use super::stats::{ConnectionReport, PollerStats, StatsCounters};
use crate::config::{mask_secret, Config};
use crate::currency::CurrencyConverter;
use crate::donation::{Donation, ProcessedIds, RecentDonation, RecentDonations, FRESHNESS_WINDOW};
use crate::donation_alerts::{DonationAlertsClient, DonationAlertsError};

/// How long `stop()` waits for the loop task before giving up on it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Pacing and filtering knobs for the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerTiming {
    /// Minimum gap between two provider requests.
    pub min_request_interval: Duration,
    /// Sleep after a failed cycle.
    pub error_backoff: Duration,
    pub page_limit: u32,
    pub freshness_window: Duration,
}

impl Default for PollerTiming {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
            page_limit: 10,
            freshness_window: FRESHNESS_WINDOW,
        }
    }
}

impl PollerTiming {
    pub fn from_config(config: &Config) -> Self {
        let poller = &config.poller;
        Self {
            min_request_interval: Duration::from_millis(poller.min_request_interval_ms),
            error_backoff: Duration::from_millis(poller.error_backoff_ms),
            page_limit: poller.page_limit.max(1),
            freshness_window: Duration::from_secs(poller.freshness_window_secs),
        }
    }
}

/// State shared between the poller handle, its loop task and dispatched generations.
pub(super) struct PollerShared {
    pub(super) client: DonationAlertsClient,
    pub(super) converter: Arc<CurrencyConverter>,
    pub(super) handler: Arc<dyn CelebrationHandler>,
    pub(super) timing: PollerTiming,
    pub(super) running: AtomicBool,
    pub(super) processed: ProcessedIds,
    pub(super) recent: RecentDonations,
    pub(super) stats: StatsCounters,
    last_request: Mutex<Option<Instant>>,
}

impl PollerShared {
    /// Sleep out whatever remains of the minimum request interval.
    async fn pace(&self) {
        let last = *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = last {
            let since = last.elapsed();
            if since < self.timing.min_request_interval {
                tokio::time::sleep(self.timing.min_request_interval - since).await;
            }
        }
    }

    fn stamp_request(&self) {
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    async fn fetch(&self) -> Result<Vec<Donation>, DonationAlertsError> {
        self.stamp_request();
        let donations = self
            .client
            .try_fetch_donations(1, self.timing.page_limit)
            .await?;
        log::debug!("Fetched {} donations from API", donations.len());
        Ok(donations)
    }

    /// One loop iteration: pace, fetch, process, stamp the poll time.
    ///
    /// A failed fetch is logged by the client and leaves an empty batch.
    async fn poll_cycle(self: &Arc<Self>) -> Vec<DonationOutcome> {
        self.pace().await;
        self.stamp_request();
        let donations = self
            .client
            .fetch_donations(1, self.timing.page_limit)
            .await
            .unwrap_or_default();
        let outcomes = self.process_all(&donations).await;
        self.stats.record_poll();
        outcomes
    }

    pub(super) async fn process_all(self: &Arc<Self>, donations: &[Donation]) -> Vec<DonationOutcome> {
        let mut outcomes = Vec::with_capacity(donations.len());
        for donation in donations {
            outcomes.push(self.process_donation(donation).await);
        }
        outcomes
    }

    async fn run(self: Arc<Self>) {
        log::info!("Polling loop started");
        while self.running.load(Ordering::SeqCst) {
            // Each cycle runs on its own task so a panic inside it is contained.
            let shared = Arc::clone(&self);
            let cycle = tokio::spawn(async move { shared.poll_cycle().await });
            if let Err(e) = cycle.await {
                log::error!("Error in polling loop: {}", e);
                self.stats.record_api_error();
                tokio::time::sleep(self.timing.error_backoff).await;
            }
        }
        log::info!("Polling loop exited");
    }
}

/// Owns the polling loop, the dedupe set and the recent-donations history.
///
/// Cloning yields another handle to the same poller.
#[derive(Clone)]
pub struct DonationPoller {
    shared: Arc<PollerShared>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DonationPoller {
    pub fn new(
        client: DonationAlertsClient,
        converter: Arc<CurrencyConverter>,
        handler: Arc<dyn CelebrationHandler>,
        timing: PollerTiming,
    ) -> Self {
        log::info!("DonationAlerts poller initialized");
        Self {
            shared: Arc::new(PollerShared {
                client,
                converter,
                handler,
                timing,
                running: AtomicBool::new(false),
                processed: ProcessedIds::new(),
                recent: RecentDonations::new(),
                stats: StatsCounters::default(),
                last_request: Mutex::new(None),
            }),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the provider access token. Used from the next fetch on.
    pub fn set_api_token(&self, token: impl Into<String>) {
        let token = token.into();
        log::info!("API token updated: {}", mask_secret(&token));
        self.shared.client.settings().set_access_token(token);
    }

    pub fn has_token(&self) -> bool {
        self.shared.client.has_token()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start the loop on a background task. Does nothing when already running or when no
    /// token is configured.
    pub fn start(&self) {
        if !self.has_token() {
            log::error!("Cannot start polling: API token not configured");
            return;
        }
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Polling is already running");
            return;
        }

        let handle = tokio::spawn(Arc::clone(&self.shared).run());
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        log::info!("Started DonationAlerts polling service");
    }

    /// Ask the loop to exit and wait up to [`STOP_TIMEOUT`] for it.
    ///
    /// Generations already dispatched keep running.
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(handle) = handle {
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Polling task ended abnormally: {}", e),
                Err(_) => log::warn!("Polling loop did not stop within {:?}", STOP_TIMEOUT),
            }
        }
        log::info!("Stopped DonationAlerts polling service");
    }

    /// Run a single pace-fetch-process cycle outside the loop.
    pub async fn poll_once(&self) -> Vec<DonationOutcome> {
        self.shared.poll_cycle().await
    }

    /// Run the per-donation pipeline over `donations` in order.
    pub async fn process_donations(&self, donations: &[Donation]) -> Vec<DonationOutcome> {
        self.shared.process_all(donations).await
    }

    pub async fn process_donation(&self, donation: &Donation) -> DonationOutcome {
        self.shared.process_donation(donation).await
    }

    /// Up to `limit` most recently observed donations, oldest first.
    pub fn get_recent_donations(&self, limit: usize) -> Vec<RecentDonation> {
        self.shared.recent.latest(limit)
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.shared.processed.contains(id)
    }

    pub fn stats(&self) -> PollerStats {
        let stats = &self.shared.stats;
        PollerStats {
            is_running: self.is_running(),
            has_token: self.has_token(),
            total_donations_processed: stats.donations_processed(),
            total_videos_generated: stats.videos_generated(),
            last_poll_time: stats.last_poll_time(),
            api_errors: stats.api_errors(),
            processed_donations_count: self.shared.processed.len(),
        }
    }

    /// Fetch one page and report whether the provider answered.
    pub async fn test_api_connection(&self) -> ConnectionReport {
        if !self.has_token() {
            return ConnectionReport::Failed {
                error: "API token not configured".to_string(),
            };
        }

        match self.shared.fetch().await {
            Ok(donations) => ConnectionReport::Connected {
                status: "Connected successfully".to_string(),
                total_donations: donations.len(),
                api_errors: self.shared.stats.api_errors(),
                last_poll: self.shared.stats.last_poll_time(),
            },
            Err(e) => ConnectionReport::Failed {
                error: format!("Failed to fetch donations: {e}"),
            },
        }
    }
}
