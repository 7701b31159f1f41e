// SPDX-License-Identifier: Apache-2.0 OR MIT

use ::std::time::Duration;

/// Polling interval used by [`WaitForConfig::default()`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest polling interval a gate accepts. Shorter ones are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// How often a gate re-checks its condition and how long it keeps trying.
///
/// Values are normalised on construction:
///
/// * an interval below [`MIN_INTERVAL`] (including zero) becomes
///   [`MIN_INTERVAL`];
/// * a zero timeout means "no timeout".
///
/// Two configs compare equal when their normalised values do. A gate only
/// restarts its timers when handed a config that is not equal to the
/// active one.
///
/// With the `serde` feature the config (de)serialises as
/// `{ "interval_ms": 50, "timeout_ms": null }`; both fields are optional and
/// go through [`from_millis()`](Self::from_millis). Durations are rounded up
/// to whole milliseconds when serialised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(from = "WaitForConfigMillis", into = "WaitForConfigMillis")
)]
pub struct WaitForConfig {
    interval: Duration,
    timeout: Option<Duration>,
}

#[cfg(feature = "serde")]
#[derive(::serde::Serialize, ::serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WaitForConfigMillis {
    interval_ms: i64,
    timeout_ms: Option<i64>,
}

impl Default for WaitForConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: None,
        }
    }
}

impl WaitForConfig {
    /// Builds a normalised config.
    #[must_use]
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            timeout: timeout.filter(|timeout| !timeout.is_zero()),
        }
    }

    /// Builds a config from signed millisecond counts, the way hosts
    /// usually pass them around.
    ///
    /// A non-positive interval is clamped to [`MIN_INTERVAL`]; a
    /// non-positive timeout disables the timeout.
    #[must_use]
    pub fn from_millis(interval_ms: i64, timeout_ms: Option<i64>) -> Self {
        let millis = |value: i64| Duration::from_millis(u64::try_from(value).unwrap_or(0));
        Self::new(millis(interval_ms), timeout_ms.map(millis))
    }

    /// Returns a copy polling every `interval`.
    #[must_use]
    pub fn with_interval(self, interval: Duration) -> Self {
        Self::new(interval, self.timeout)
    }

    /// Returns a copy that gives up after `timeout`.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self::new(self.interval, Some(timeout))
    }

    /// Returns a copy that polls until the condition holds.
    #[must_use]
    pub fn without_timeout(self) -> Self {
        Self::new(self.interval, None)
    }

    /// Time between two checks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `None` means the gate polls until the condition holds.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(feature = "serde")]
impl Default for WaitForConfigMillis {
    fn default() -> Self {
        WaitForConfig::default().into()
    }
}

#[cfg(feature = "serde")]
impl From<WaitForConfigMillis> for WaitForConfig {
    fn from(value: WaitForConfigMillis) -> Self {
        Self::from_millis(value.interval_ms, value.timeout_ms)
    }
}

#[cfg(feature = "serde")]
impl From<WaitForConfig> for WaitForConfigMillis {
    fn from(value: WaitForConfig) -> Self {
        // Rounded up: a sub-millisecond timeout must not come back as "none".
        let millis = |duration: Duration| {
            i64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(i64::MAX)
        };
        Self {
            interval_ms: millis(value.interval),
            timeout_ms: value.timeout.map(millis),
        }
    }
}
