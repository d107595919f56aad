//! Runtime configuration
//!
//! Defaults come from [`crate::constants`]. The monitor accepts environment
//! overrides (useful when running `winunlock monitor` by hand); the agent
//! reads its policy from the shared registry namespace because LogonUI does
//! not inherit any environment we control.

use crate::constants::*;
use crate::core::store::ConfigStore;
use std::time::Duration;
use tracing::warn;

/// Timing and matching parameters of the session monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Wait after a disconnect before arming and locking
    pub settle_delay: Duration,
    /// Wait after forcing the lock before returning to idle
    pub lock_delay: Duration,
    /// Maximum latency for observing the stop signal
    pub poll_interval: Duration,
    /// Bound on every OS call made during a cycle
    pub os_call_timeout: Duration,
    /// Station name prefix identifying remote sessions
    pub remote_station_prefix: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DISCONNECT_SETTLE_DELAY_MS),
            lock_delay: Duration::from_millis(LOCK_SETTLE_DELAY_MS),
            poll_interval: Duration::from_millis(MONITOR_POLL_INTERVAL_MS),
            os_call_timeout: Duration::from_millis(OS_CALL_TIMEOUT_MS),
            remote_station_prefix: REMOTE_STATION_PREFIX.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `WINUNLOCK_*_MS` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Duration {
            match lookup(key) {
                None => default,
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(ms) => Duration::from_millis(ms),
                    Err(_) => {
                        warn!("Ignoring malformed {}={:?}, using {:?}", key, raw, default);
                        default
                    }
                },
            }
        };

        let poll_interval = millis("WINUNLOCK_POLL_INTERVAL_MS", defaults.poll_interval)
            .max(Duration::from_millis(1));

        Self {
            settle_delay: millis("WINUNLOCK_SETTLE_DELAY_MS", defaults.settle_delay),
            lock_delay: millis("WINUNLOCK_LOCK_DELAY_MS", defaults.lock_delay),
            poll_interval,
            os_call_timeout: millis("WINUNLOCK_OS_TIMEOUT_MS", defaults.os_call_timeout),
            remote_station_prefix: defaults.remote_station_prefix,
        }
    }
}

/// Security policy of the unlock agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentPolicy {
    /// Only submit the stored credential after consuming a monitor request
    pub require_armed_request: bool,
    /// Fall back to the plaintext `Username`/`Password` values
    pub allow_legacy_plaintext: bool,
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            require_armed_request: true,
            allow_legacy_plaintext: false,
        }
    }
}

impl AgentPolicy {
    /// Read policy overrides from the store, keeping defaults for anything
    /// absent or unreadable.
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| match store.read_dword(name) {
            Ok(Some(value)) => value != 0,
            Ok(None) => default,
            Err(e) => {
                warn!("Failed to read policy value {}: {}", name, e);
                default
            }
        };

        Self {
            require_armed_request: flag(
                VALUE_REQUIRE_ARMED_REQUEST,
                defaults.require_armed_request,
            ),
            allow_legacy_plaintext: flag(
                VALUE_ALLOW_LEGACY_PLAINTEXT,
                defaults.allow_legacy_plaintext,
            ),
        }
    }
}
