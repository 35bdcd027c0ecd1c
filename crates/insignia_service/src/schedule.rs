//! When the expiry sweeper runs.

use chrono::{DateTime, Duration, Utc};
use insignia_error::{ConfigError, InsigniaResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default sweep cadence: daily at 03:00 UTC.
pub const DEFAULT_SWEEP_CRON: &str = "0 0 3 * * *";

/// Sweep cadence.
///
/// Deserializes from a tagged table:
///
/// ```
/// use insignia_service::SweepSchedule;
///
/// let schedule: SweepSchedule = toml::from_str(r#"
///     type = "interval"
///     seconds = 600
/// "#).unwrap();
/// assert_eq!(schedule, SweepSchedule::Interval { seconds: 600 });
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SweepSchedule {
    /// Cron expression (6 or 7 fields: sec min hour day month weekday [year])
    Cron {
        /// Cron expression string
        expression: String,
    },

    /// Fixed interval in seconds
    Interval {
        /// Interval duration in seconds
        seconds: u64,
    },
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self::Cron {
            expression: DEFAULT_SWEEP_CRON.to_string(),
        }
    }
}

impl SweepSchedule {
    /// Reject schedules that would never fire.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an unparsable cron expression or a zero interval.
    pub fn validate(&self) -> InsigniaResult<()> {
        match self {
            SweepSchedule::Cron { expression } => {
                cron::Schedule::from_str(expression).map_err(|e| {
                    ConfigError::new(format!("invalid sweep cron expression '{expression}': {e}"))
                })?;
            }
            SweepSchedule::Interval { seconds: 0 } => {
                return Err(ConfigError::new("sweep interval must be at least one second").into());
            }
            SweepSchedule::Interval { .. } => {}
        }
        Ok(())
    }

    /// Next run strictly after `after`, or `None` if the schedule has no
    /// further runs.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            SweepSchedule::Interval { seconds } => {
                let seconds = i64::try_from(*seconds).ok()?;
                after.checked_add_signed(Duration::try_seconds(seconds)?)
            }
            SweepSchedule::Cron { expression } => cron::Schedule::from_str(expression)
                .ok()?
                .after(&after)
                .next(),
        }
    }
}
