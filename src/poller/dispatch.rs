use std::path::PathBuf;

use async_trait::async_trait;

use crate::donation::DonationSnapshot;

/// Receives qualifying donations from the poller.
///
/// Each call runs on its own detached task; the poller never awaits it and only looks at
/// the result to count generated videos.
#[async_trait]
pub trait CelebrationHandler: Send + Sync {
    /// Produce a celebration for `donation`, returning the file on success.
    async fn celebrate(&self, donation: &DonationSnapshot) -> Option<PathBuf>;
}
