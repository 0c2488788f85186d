//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use prefsync_protocol::PreferenceType;
use std::collections::BTreeMap;
use std::time::Duration;

/// Fallback debounce delay when no delay is configured at all.
const FALLBACK_DEBOUNCE: Duration = Duration::from_millis(1_000);

/// Configuration for sync operations.
///
/// Debounce delays are tiered by write frequency: reading position changes
/// continuously while scrolling and waits longest; favorites, goals and theme
/// are discrete user actions and sync quickly.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Debounce delay per preference type.
    pub debounce: BTreeMap<PreferenceType, Duration>,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Minimum interval between the starts of two merge operations.
    pub merge_interval: Duration,
}

impl SyncConfig {
    /// Creates a configuration with the default tiers.
    pub fn new() -> Self {
        let mut debounce = BTreeMap::new();
        debounce.insert(PreferenceType::Favorites, Duration::from_millis(1_000));
        debounce.insert(PreferenceType::Goals, Duration::from_millis(1_000));
        debounce.insert(PreferenceType::Theme, Duration::from_millis(1_000));
        debounce.insert(PreferenceType::Reading, Duration::from_millis(3_000));

        Self {
            debounce,
            retry: RetryConfig::default(),
            merge_interval: Duration::from_millis(5_000),
        }
    }

    /// Sets the debounce delay for a type.
    pub fn with_debounce(mut self, pref_type: PreferenceType, delay: Duration) -> Self {
        self.debounce.insert(pref_type, delay);
        self
    }

    /// Removes the configured delay for a type, so it uses the shortest tier.
    pub fn without_debounce(mut self, pref_type: PreferenceType) -> Self {
        self.debounce.remove(&pref_type);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the minimum interval between merges.
    pub fn with_merge_interval(mut self, interval: Duration) -> Self {
        self.merge_interval = interval;
        self
    }

    /// Returns the debounce delay for a type.
    ///
    /// Types without a configured delay use the shortest configured one.
    pub fn debounce_for(&self, pref_type: PreferenceType) -> Duration {
        self.debounce
            .get(&pref_type)
            .copied()
            .or_else(|| self.debounce.values().min().copied())
            .unwrap_or(FALLBACK_DEBOUNCE)
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for a zero debounce delay, or for
    /// retries enabled with an empty backoff schedule.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some((pref_type, _)) = self.debounce.iter().find(|(_, d)| d.is_zero()) {
            return Err(SyncError::InvalidConfig(format!(
                "debounce delay for {pref_type} is zero"
            )));
        }
        if self.retry.max_retries > 0 && self.retry.backoff.is_empty() {
            return Err(SyncError::InvalidConfig(
                "retries enabled with an empty backoff schedule".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
///
/// Backoff is a fixed ascending list rather than a computed curve, so retry
/// timing is fully deterministic.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before each retry; retries past the end reuse the last entry.
    pub backoff: Vec<Duration>,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(max_retries: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff: Vec::new(),
        }
    }

    /// Returns the delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let index = usize::try_from(retry).unwrap_or(usize::MAX);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_millis(1_000),
                Duration::from_millis(5_000),
                Duration::from_millis(15_000),
            ],
        )
    }
}
