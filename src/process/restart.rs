use crate::config::RespawnSettings;
use std::time::Duration;

/// Restart pacing for a supervised child.
///
/// A child that dies within `too_fast` of being started waits `delay`
/// before the next attempt; anything that lived longer restarts at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub too_fast: Duration,
    pub delay: Duration,
}

impl RestartPolicy {
    pub fn new(too_fast: Duration, delay: Duration) -> Self {
        Self { too_fast, delay }
    }

    pub fn from_settings(settings: &RespawnSettings) -> Self {
        Self::new(settings.too_fast(), settings.delay())
    }

    /// Delay to insert before the next spawn, given the monotonic start and
    /// death times of the previous child.
    ///
    /// Either reading may be missing when the clock failed; that counts as
    /// too fast.
    pub fn delay_after(&self, started: Option<Duration>, died: Option<Duration>) -> Option<Duration> {
        match (started, died) {
            (Some(started), Some(died)) => {
                let lived = died.saturating_sub(started);
                if lived < self.too_fast {
                    Some(self.delay)
                } else {
                    None
                }
            }
            _ => Some(self.delay),
        }
    }

    /// Delay before retrying after fork(2) failed
    pub fn fork_retry_delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from_settings(&RespawnSettings::default())
    }
}
