use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default lifetime of a cached exchange rate.
pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: f64,
    expires_at: Instant,
}

/// In-memory exchange-rate cache keyed by the ordered currency pair.
///
/// Expired entries are only dropped when they are looked up.
#[derive(Debug)]
pub struct RateCache {
    entries: Mutex<HashMap<(String, String), CachedRate>>,
    ttl: Duration,
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_TTL)
    }
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached rate for `from -> to`, if present and not expired.
    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (from.to_string(), to.to_string());
        let cached = *entries.get(&key)?;

        if Instant::now() < cached.expires_at {
            log::debug!("Using cached rate for {}->{}: {}", from, to, cached.rate);
            Some(cached.rate)
        } else {
            entries.remove(&key);
            None
        }
    }

    pub fn insert(&self, from: &str, to: &str, rate: f64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            (from.to_string(), to.to_string()),
            CachedRate {
                rate,
                expires_at: Instant::now() + self.ttl,
            },
        );
        log::debug!(
            "Cached exchange rate: {}->{} = {} (ttl {:?})",
            from,
            to,
            rate,
            self.ttl
        );
    }

    /// Number of entries currently stored, expired ones included.
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
