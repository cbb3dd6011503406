use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;

/// Monotonic poller counters. Never reset while the process lives.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    donations_processed: AtomicU64,
    videos_generated: AtomicU64,
    api_errors: AtomicU64,
    last_poll: Mutex<Option<DateTime<Local>>>,
}

impl StatsCounters {
    pub(crate) fn record_donation(&self) {
        self.donations_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_video(&self) {
        self.videos_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_api_error(&self) {
        self.api_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_poll(&self) {
        *self.last_poll.lock().unwrap_or_else(PoisonError::into_inner) = Some(Local::now());
    }

    pub(crate) fn donations_processed(&self) -> u64 {
        self.donations_processed.load(Ordering::Relaxed)
    }

    pub(crate) fn videos_generated(&self) -> u64 {
        self.videos_generated.load(Ordering::Relaxed)
    }

    pub(crate) fn api_errors(&self) -> u64 {
        self.api_errors.load(Ordering::Relaxed)
    }

    /// Last completed poll as an RFC 3339 string.
    pub(crate) fn last_poll_time(&self) -> Option<String> {
        self.last_poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.to_rfc3339())
    }
}

/// Point-in-time view of the poller for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollerStats {
    pub is_running: bool,
    pub has_token: bool,
    pub total_donations_processed: u64,
    pub total_videos_generated: u64,
    pub last_poll_time: Option<String>,
    pub api_errors: u64,
    pub processed_donations_count: usize,
}

/// Result of a one-off connection check against the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectionReport {
    Connected {
        status: String,
        total_donations: usize,
        api_errors: u64,
        last_poll: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl ConnectionReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}
