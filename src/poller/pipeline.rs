//! Per-donation processing: dedupe, classify, freshness, conversion, threshold, dispatch.

use std::sync::Arc;

use chrono::Utc;

use super::scheduler::PollerShared;
use crate::donation::{
    classify, is_fresh, parse_created_at, Donation, DonationSnapshot, RecentDonation,
    TestClassification,
};

/// What the pipeline decided for one donation.
#[derive(Debug, Clone, PartialEq)]
pub enum DonationOutcome {
    /// No usable id; nothing recorded.
    MissingId,
    /// Already in the dedupe set; nothing recorded.
    AlreadyProcessed,
    /// Test alert, or flags that could not be read.
    Test,
    /// Too old, or the timestamp could not be parsed.
    Stale,
    BelowThreshold { amount_converted: f64 },
    /// A generation task was spawned.
    Dispatched { amount_converted: f64 },
}

impl DonationOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

impl PollerShared {
    pub(super) async fn process_donation(self: &Arc<Self>, donation: &Donation) -> DonationOutcome {
        let Some(id) = donation.id() else {
            return DonationOutcome::MissingId;
        };
        if self.processed.contains(id) {
            return DonationOutcome::AlreadyProcessed;
        }

        let settings = self.client.settings();
        let reference = settings.reference_currency();
        self.recent.push(RecentDonation::from_donation(donation, &reference));

        match classify(donation) {
            TestClassification::Real => {}
            TestClassification::Test => {
                log::info!("Skipping test donation {}", id);
                self.processed.mark(id);
                return DonationOutcome::Test;
            }
            TestClassification::Unclassifiable => {
                log::warn!("Could not classify donation {}; treating it as a test", id);
                self.processed.mark(id);
                return DonationOutcome::Test;
            }
        }

        let raw_created_at = donation.created_at.as_deref().unwrap_or("");
        let created_at = parse_created_at(raw_created_at);
        if !is_fresh(created_at.as_ref(), self.timing.freshness_window, Utc::now()) {
            log::info!("Skipping stale donation {}: created_at={}", id, raw_created_at);
            self.processed.mark(id);
            return DonationOutcome::Stale;
        }

        let username = donation.username_or_anonymous().to_string();
        let currency = donation.currency_or(&reference);
        let amount = donation.amount;
        log::info!("Processing donation: {} - {} {}", username, amount, currency);
        self.stats.record_donation();

        let amount_converted = if currency == reference {
            amount
        } else {
            match self.converter.convert_to_reference(amount, &currency).await {
                Some(converted) => converted,
                None => {
                    log::warn!(
                        "Currency conversion failed for {} {}; using the unconverted amount",
                        amount,
                        currency
                    );
                    amount
                }
            }
        };

        let threshold = settings.threshold();
        if amount_converted < threshold {
            log::info!(
                "Donation below threshold: {:.2} {} < {} {}",
                amount_converted,
                reference,
                threshold,
                reference
            );
            self.processed.mark(id);
            return DonationOutcome::BelowThreshold { amount_converted };
        }

        log::info!(
            "Donation qualifies for video: {:.2} {} >= {} {}",
            amount_converted,
            reference,
            threshold,
            reference
        );

        // Marked before the task exists, so a donation never gets two generations.
        if !self.processed.mark(id) {
            return DonationOutcome::AlreadyProcessed;
        }

        let snapshot = DonationSnapshot {
            id: id.to_string(),
            username,
            amount,
            currency,
            amount_converted,
            message: donation.message_text().to_string(),
            created_at: raw_created_at.to_string(),
        };
        self.dispatch(snapshot);

        DonationOutcome::Dispatched { amount_converted }
    }

    fn dispatch(self: &Arc<Self>, snapshot: DonationSnapshot) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            log::info!("Starting background video generation for donation {}", snapshot.id);
            match shared.handler.celebrate(&snapshot).await {
                Some(path) => {
                    shared.stats.record_video();
                    log::info!("Video generated for donation {}: {}", snapshot.id, path.display());
                }
                None => log::warn!(
                    "Video generation returned no file for donation {}",
                    snapshot.id
                ),
            }
        });
    }
}
