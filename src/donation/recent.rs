use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use serde::Serialize;

use super::record::Donation;

/// Maximum number of donations kept for the history view.
pub const MAX_RECENT_DONATIONS: usize = 100;

/// A donation as shown in the history view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDonation {
    pub id: String,
    pub username: String,
    pub amount: f64,
    pub currency: String,
    pub message: String,
    pub created_at: String,
}

impl RecentDonation {
    /// Fill display defaults: `Anonymous`, the reference currency, and the current local
    /// time when the provider sent no timestamp.
    pub fn from_donation(donation: &Donation, reference_currency: &str) -> Self {
        Self {
            id: donation.id().unwrap_or_default().to_string(),
            username: donation.username_or_anonymous().to_string(),
            amount: donation.amount,
            currency: donation.currency_or(reference_currency),
            message: donation.message_text().to_string(),
            created_at: donation
                .created_at
                .clone()
                .filter(|ts| !ts.trim().is_empty())
                .unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

/// Bounded, insertion-ordered history of observed donations.
#[derive(Debug)]
pub struct RecentDonations {
    entries: Mutex<VecDeque<RecentDonation>>,
    capacity: usize,
}

impl Default for RecentDonations {
    fn default() -> Self {
        Self::with_capacity(MAX_RECENT_DONATIONS)
    }
}

impl RecentDonations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, entry: RecentDonation) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Up to `limit` of the newest entries, oldest first.
    pub fn latest(&self, limit: usize) -> Vec<RecentDonation> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
