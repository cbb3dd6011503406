//! Donation records and the bookkeeping the poller keeps about them.

mod classify;
mod processed;
mod recent;
mod record;
mod timestamp;

pub use classify::{classify, TestClassification, TEST_FLAG_FIELDS};
pub use processed::{ProcessedIds, MAX_PROCESSED_IDS};
pub use recent::{RecentDonation, RecentDonations, MAX_RECENT_DONATIONS};
pub use record::{Donation, DonationSnapshot, ANONYMOUS};
pub use timestamp::{is_fresh, parse_created_at, CreatedAt, FRESHNESS_WINDOW};
