//! Scheduler configuration

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Setting keys recognized by [`Settings::apply_value`]
pub const SETTING_KEYS: [&str; 6] = ["queueLimit", "delay", "timeout", "maxAttempts", "maxAsync", "retryGate"];

/// When a failed or aborted request may be put back on its thread
///
/// Every gate still requires `attempts < maxAttempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryGate {
    /// Retry while the queue is below its limit
    #[default]
    WithinLimit,
    /// Retry only when the queue is at or above its limit
    AtLimit,
    /// Retry regardless of queue length
    Always,
}

impl RetryGate {
    /// Whether a retry is allowed for a queue of `len` with the given limit
    pub fn allows(&self, len: usize, limit: Option<usize>) -> bool {
        match self {
            Self::WithinLimit => limit.is_none_or(|limit| len < limit),
            Self::AtLimit => limit.is_some_and(|limit| len >= limit),
            Self::Always => true,
        }
    }
}

impl fmt::Display for RetryGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithinLimit => write!(f, "within-limit"),
            Self::AtLimit => write!(f, "at-limit"),
            Self::Always => write!(f, "always"),
        }
    }
}

/// Global scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Max queued requests per thread (unbounded when unset)
    #[serde(default)]
    pub queue_limit: Option<usize>,

    /// Delay before each dispatch, in milliseconds
    #[serde(rename = "delay", default)]
    pub delay_ms: u64,

    /// Per-attempt timeout in milliseconds (none when unset or 0)
    #[serde(rename = "timeout", default)]
    pub timeout_ms: Option<u64>,

    /// Max dispatch attempts per request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Max requests in flight across all threads (unbounded when unset)
    #[serde(default)]
    pub max_async: Option<usize>,

    #[serde(default)]
    pub retry_gate: RetryGate,
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_limit: None,
            delay_ms: 0,
            timeout_ms: None,
            max_attempts: default_max_attempts(),
            max_async: None,
            retry_gate: RetryGate::default(),
        }
    }
}

impl Settings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.timeout_ms)
    }

    /// Apply the recognized keys of a patch
    pub fn apply(&mut self, patch: &SettingsPatch) {
        debug!(?patch, "Settings::apply: called");
        if let Some(limit) = patch.queue_limit {
            self.queue_limit = limit;
        }
        if let Some(delay) = patch.delay_ms {
            self.delay_ms = delay;
        }
        if let Some(timeout) = patch.timeout_ms {
            self.timeout_ms = timeout;
        }
        if let Some(max_attempts) = patch.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(max_async) = patch.max_async {
            self.max_async = max_async;
        }
        if let Some(gate) = patch.retry_gate {
            self.retry_gate = gate;
        }
    }

    /// Apply settings from a loosely typed object, ignoring unknown keys
    pub fn apply_value(&mut self, value: &serde_json::Value) -> Result<(), serde_json::Error> {
        if let Some(map) = value.as_object() {
            for key in map.keys().filter(|k| !SETTING_KEYS.contains(&k.as_str())) {
                debug!(%key, "Settings::apply_value: ignoring unrecognized key");
            }
        }
        let patch: SettingsPatch = serde_json::from_value(value.clone())?;
        self.apply(&patch);
        Ok(())
    }
}

/// Partial settings update; unset fields leave the current value alone
///
/// The bounded settings are tri-state: absent leaves the value alone, an
/// explicit `null` makes it unbounded again (`Some(None)`), and a number sets
/// it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub queue_limit: Option<Option<usize>>,
    #[serde(rename = "delay", default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(
        rename = "timeout",
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<Option<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub max_async: Option<Option<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_gate: Option<RetryGate>,
}

impl SettingsPatch {
    /// Bound (`Some`) or unbound (`None`) the global concurrency limit
    pub fn max_async(mut self, max_async: Option<usize>) -> Self {
        self.max_async = Some(max_async);
        self
    }

    /// Bound or unbound the per-thread queue limit
    pub fn queue_limit(mut self, limit: Option<usize>) -> Self {
        self.queue_limit = Some(limit);
        self
    }

    /// Set or clear the per-attempt timeout
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = Some(timeout.map(|t| t.as_millis() as u64));
        self
    }
}

/// A present key, `null` included, deserializes to `Some`
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A zero timeout means no timeout
fn timeout_from_ms(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}

/// Per-thread overrides of the global settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadOptions {
    /// Max queued requests for this thread
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(rename = "delay", default)]
    pub delay_ms: Option<u64>,
    #[serde(rename = "timeout", default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_gate: Option<RetryGate>,
}

impl ThreadOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis() as u64);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn retry_gate(mut self, gate: RetryGate) -> Self {
        self.retry_gate = Some(gate);
        self
    }

    /// Resolve against the global settings
    pub fn resolve(&self, settings: &Settings) -> ThreadSettings {
        ThreadSettings {
            limit: self.limit.or(settings.queue_limit),
            delay: self.delay_ms.map(Duration::from_millis).unwrap_or_else(|| settings.delay()),
            timeout: timeout_from_ms(self.timeout_ms).or_else(|| settings.timeout()),
            max_attempts: self.max_attempts.unwrap_or(settings.max_attempts),
            retry_gate: self.retry_gate.unwrap_or(settings.retry_gate),
        }
    }
}

/// Effective settings of one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSettings {
    pub limit: Option<usize>,
    pub delay: Duration,
    pub timeout: Option<Duration>,
    pub max_attempts: u32,
    pub retry_gate: RetryGate,
}

impl From<&Settings> for ThreadSettings {
    fn from(settings: &Settings) -> Self {
        ThreadOptions::default().resolve(settings)
    }
}
