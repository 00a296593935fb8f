use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Scrub job configuration.
///
/// ```toml
/// [scrub]
/// batch_size = 32
/// liveness = "not_before"
/// dry_run = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrubConfig {
    /// Units processed concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deleted rows fetched per metadata page. Must be at least `batch_size`.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Which active versions protect a deleted version's blobs.
    #[serde(default)]
    pub liveness: LivenessPolicy,

    /// Log what would be deleted without deleting blobs or purging rows.
    #[serde(default)]
    pub dry_run: bool,

    /// Stop starting new batches after this many seconds (0 = unlimited).
    #[serde(default)]
    pub max_duration_secs: u64,

    /// Pause between passes in worker mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            liveness: LivenessPolicy::default(),
            dry_run: false,
            max_duration_secs: 0,
            interval_secs: default_interval_secs(),
        }
    }
}

impl ScrubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "scrub.batch_size must be at least 1".into(),
            ));
        }
        if self.page_size < self.batch_size {
            return Err(ConfigError::Validation(format!(
                "scrub.page_size ({}) must be at least scrub.batch_size ({})",
                self.page_size, self.batch_size
            )));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scrub.interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Bound on a single pass, `None` when unlimited.
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_page_size() -> usize {
    1024
}

fn default_interval_secs() -> u64 {
    3600
}

/// Liveness policy for the "is this content still referenced" check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessPolicy {
    /// Only active versions created at or after the deleted version count.
    #[default]
    NotBefore,
    /// Any active version with the same content counts.
    AnyTime,
}

impl LivenessPolicy {
    /// The `not_before` bound to pass to the liveness query.
    pub fn not_before(&self, created_at: i64) -> Option<i64> {
        match self {
            LivenessPolicy::NotBefore => Some(created_at),
            LivenessPolicy::AnyTime => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScrubConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.page_size, 1024);
        assert_eq!(config.liveness, LivenessPolicy::NotBefore);
        assert!(!config.dry_run);
        assert_eq!(config.max_duration(), None);
        assert_eq!(config.interval(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = ScrubConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_smaller_than_batch_rejected() {
        let config = ScrubConfig {
            batch_size: 64,
            page_size: 32,
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("page_size"), "unexpected error: {err}");
    }

    #[test]
    fn test_max_duration() {
        let config = ScrubConfig {
            max_duration_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.max_duration(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_liveness_policy_bound() {
        assert_eq!(LivenessPolicy::NotBefore.not_before(100), Some(100));
        assert_eq!(LivenessPolicy::AnyTime.not_before(100), None);
    }
}
