use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Smallest accepted active polling interval, seconds.
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 4;

/// All scheduling parameters. The persistence medium (ini file, registry,
/// environment) is the consumer's concern; [`WatchCfg::from_map`] accepts
/// whatever string key/value store it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchCfg {
    /// Active-mode base polling interval, seconds. ±30% jitter applies.
    pub update_interval_secs: u64,
    /// Master switch for the reduced-frequency idle regime.
    pub idle_enabled: bool,
    /// Minutes of user inactivity before entering idle mode. 0 is a debug
    /// shortcut meaning five seconds.
    pub idle_threshold_mins: u64,
    /// Fixed polling interval while idle, minutes.
    pub idle_interval_mins: u64,
    /// Hard bound on a single provider fetch, seconds.
    pub fetch_timeout_secs: u64,
    /// Delay before the first poll after startup, milliseconds.
    pub startup_delay_ms: u64,
    /// Event channel capacity.
    pub event_buffer: usize,
}

impl Default for WatchCfg {
    fn default() -> Self {
        Self {
            update_interval_secs: 7,
            idle_enabled: true,
            idle_threshold_mins: 15,
            idle_interval_mins: 60,
            fetch_timeout_secs: 20,
            startup_delay_ms: 200,
            event_buffer: 64,
        }
    }
}

impl WatchCfg {
    /// Build from a key/value map. Unknown keys are ignored, unparsable or
    /// missing values keep their defaults, out-of-range values are clamped.
    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let cfg = Self {
            update_interval_secs: get_or(m, "update_interval_secs", d.update_interval_secs),
            idle_enabled: get_or(m, "idle_enabled", d.idle_enabled),
            idle_threshold_mins: get_or(m, "idle_threshold_mins", d.idle_threshold_mins),
            idle_interval_mins: get_or(m, "idle_interval_mins", d.idle_interval_mins),
            fetch_timeout_secs: get_or(m, "fetch_timeout_secs", d.fetch_timeout_secs),
            startup_delay_ms: get_or(m, "startup_delay_ms", d.startup_delay_ms),
            event_buffer: get_or(m, "event_buffer", d.event_buffer),
        };
        cfg.clamped()
    }

    fn clamped(mut self) -> Self {
        self.update_interval_secs = self.update_interval_secs.max(MIN_UPDATE_INTERVAL_SECS);
        self.idle_interval_mins = self.idle_interval_mins.max(1);
        self.fetch_timeout_secs = self.fetch_timeout_secs.max(1);
        self.event_buffer = self.event_buffer.max(1);
        self
    }

    /// Inactivity threshold for the idle transition, honoring the zero
    /// debug shortcut of five seconds.
    pub fn idle_threshold(&self) -> Duration {
        if self.idle_threshold_mins == 0 {
            Duration::from_secs(5)
        } else {
            Duration::from_secs(self.idle_threshold_mins * 60)
        }
    }

    /// Fixed timer interval while in idle mode.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_mins * 60)
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_in_range() {
        let d = WatchCfg::default();
        assert!(d.update_interval_secs >= MIN_UPDATE_INTERVAL_SECS);
        assert!(d.idle_interval_mins >= 1);
    }

    #[test]
    fn from_map_overrides_known_keys() {
        let cfg = WatchCfg::from_map(&map(&[
            ("update_interval_secs", "12"),
            ("idle_enabled", "false"),
            ("idle_interval_mins", "5"),
        ]));
        assert_eq!(cfg.update_interval_secs, 12);
        assert!(!cfg.idle_enabled);
        assert_eq!(cfg.idle_interval_mins, 5);
        // untouched keys keep defaults
        assert_eq!(cfg.idle_threshold_mins, 15);
    }

    #[test]
    fn from_map_clamps_low_interval() {
        let cfg = WatchCfg::from_map(&map(&[("update_interval_secs", "2")]));
        assert_eq!(cfg.update_interval_secs, MIN_UPDATE_INTERVAL_SECS);
    }

    #[test]
    fn from_map_ignores_garbage() {
        let cfg = WatchCfg::from_map(&map(&[("update_interval_secs", "soon")]));
        assert_eq!(cfg.update_interval_secs, WatchCfg::default().update_interval_secs);
    }

    #[test]
    fn idle_threshold_debug_shortcut() {
        let mut cfg = WatchCfg::default();
        cfg.idle_threshold_mins = 0;
        assert_eq!(cfg.idle_threshold(), Duration::from_secs(5));
        cfg.idle_threshold_mins = 2;
        assert_eq!(cfg.idle_threshold(), Duration::from_secs(120));
    }

    #[test]
    fn idle_interval_minutes_to_duration() {
        let mut cfg = WatchCfg::default();
        cfg.idle_interval_mins = 3;
        assert_eq!(cfg.idle_interval(), Duration::from_secs(180));
    }
}
