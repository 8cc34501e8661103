//! Configuration for the delegation store and its in-memory engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default grace period between `not_after` and physical removal (10 minutes).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(600);

/// Default interval between TTL purge passes (1 minute).
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Largest accepted grace period (365 days).
pub const MAX_GRACE_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Smallest accepted purge interval.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for [`DelegationStore`](crate::DelegationStore).
///
/// Durations are written in humantime form when serialized (`"10m"`,
/// `"1m"`).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use delegation_store::DelegationStoreConfig;
///
/// let config = DelegationStoreConfig::builder()
///     .purge_interval(Duration::from_secs(30))
///     .build()?;
///
/// assert_eq!(config.grace_period(), Duration::from_secs(600));
/// assert_eq!(config.purge_interval(), Duration::from_secs(30));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegationStoreConfig {
    /// How long an expired credential stays in storage before it is purged.
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub(crate) grace_period: Duration,

    /// How often the in-memory engine scans for expired documents.
    #[serde(with = "humantime_serde", default = "default_purge_interval")]
    pub(crate) purge_interval: Duration,
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

fn default_purge_interval() -> Duration {
    DEFAULT_PURGE_INTERVAL
}

impl Default for DelegationStoreConfig {
    fn default() -> Self {
        Self { grace_period: DEFAULT_GRACE_PERIOD, purge_interval: DEFAULT_PURGE_INTERVAL }
    }
}

#[bon::bon]
impl DelegationStoreConfig {
    /// Creates a new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `purge_interval` is below
    /// [`MIN_PURGE_INTERVAL`] or `grace_period` is above [`MAX_GRACE_PERIOD`].
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_GRACE_PERIOD)] grace_period: Duration,
        #[builder(default = DEFAULT_PURGE_INTERVAL)] purge_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { grace_period, purge_interval };
        config.validate()?;
        Ok(config)
    }

    /// Checks a configuration obtained through deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `purge_interval` is below
    /// [`MIN_PURGE_INTERVAL`] or `grace_period` is above [`MAX_GRACE_PERIOD`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_period > MAX_GRACE_PERIOD {
            return Err(ConfigError::AboveMaximum {
                field: "grace_period",
                max: format!("{MAX_GRACE_PERIOD:?}"),
                value: format!("{:?}", self.grace_period),
            });
        }
        if self.purge_interval < MIN_PURGE_INTERVAL {
            return Err(ConfigError::BelowMinimum {
                field: "purge_interval",
                min: format!("{MIN_PURGE_INTERVAL:?}"),
                value: format!("{:?}", self.purge_interval),
            });
        }
        Ok(())
    }

    /// Returns the TTL grace period.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns the purge interval.
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        self.purge_interval
    }
}
