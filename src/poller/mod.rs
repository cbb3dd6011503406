//! Donation polling and the idempotent per-donation pipeline.
//!
//! The poller fetches a page of donations on a background task, filters out duplicates,
//! test alerts and stale entries, converts the amount to the reference currency and hands
//! every donation that clears the threshold to a [`CelebrationHandler`] on its own
//! detached task.

mod dispatch;
mod pipeline;
mod scheduler;
mod stats;

pub use dispatch::CelebrationHandler;
pub use pipeline::DonationOutcome;
pub use scheduler::{DonationPoller, PollerTiming, STOP_TIMEOUT};
pub use stats::{ConnectionReport, PollerStats};
