//! Configuration for the allocation engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Booking and waitlist rules
    pub engine: EngineConfig,
    /// Expiry reaper
    pub reaper: ReaperConfig,
    /// Process-level settings
    pub server: ServerConfig,
}

/// Booking and waitlist rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest quantity for one booking or waitlist entry
    pub max_tickets_per_request: u32,
    /// How long a waitlist offer stays open, in seconds
    pub offer_window_secs: u64,
    /// Page size for bookings and waitlist listings when none is given
    pub default_page_limit: usize,
    /// Page size for notification listings when none is given
    pub notification_page_limit: usize,
    /// Rows in the most-popular ranking when none is given
    pub popular_limit: usize,
}

impl EngineConfig {
    /// Offer window as a chrono duration
    #[must_use]
    pub fn offer_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.offer_window_secs).unwrap_or(i64::MAX / 1_000))
    }

    /// Offer window in whole minutes, as shown to users
    #[must_use]
    pub const fn offer_window_minutes(&self) -> u64 {
        self.offer_window_secs / 60
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tickets_per_request: crate::types::MAX_TICKETS_PER_REQUEST,
            offer_window_secs: 1800,
            default_page_limit: 10,
            notification_page_limit: 20,
            popular_limit: 10,
        }
    }
}

/// Expiry reaper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Offer expired seats to the queue after each sweep
    pub redistribute: bool,
}

impl ReaperConfig {
    /// Sweep interval
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            redistribute: false,
        }
    }
}

/// Process-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Prometheus exporter listen address
    pub metrics_addr: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info,boxoffice_engine=debug".to_string(),
            metrics_addr: "0.0.0.0:9090".to_string(),
            shutdown_timeout: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            engine: EngineConfig {
                max_tickets_per_request: parse_var(&lookup, "BOXOFFICE_MAX_TICKETS")
                    .filter(|n: &u32| *n > 0)
                    .unwrap_or(defaults.engine.max_tickets_per_request),
                offer_window_secs: parse_var(&lookup, "BOXOFFICE_OFFER_WINDOW_SECS")
                    .unwrap_or(defaults.engine.offer_window_secs),
                default_page_limit: parse_var(&lookup, "BOXOFFICE_DEFAULT_PAGE_LIMIT")
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(defaults.engine.default_page_limit),
                notification_page_limit: parse_var(&lookup, "BOXOFFICE_NOTIFICATION_PAGE_LIMIT")
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(defaults.engine.notification_page_limit),
                popular_limit: parse_var(&lookup, "BOXOFFICE_POPULAR_LIMIT")
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(defaults.engine.popular_limit),
            },
            reaper: ReaperConfig {
                interval_secs: parse_var(&lookup, "REAPER_INTERVAL_SECS")
                    .filter(|n: &u64| *n > 0)
                    .unwrap_or(defaults.reaper.interval_secs),
                redistribute: parse_var(&lookup, "REAPER_REDISTRIBUTE").unwrap_or(defaults.reaper.redistribute),
            },
            server: ServerConfig {
                log_level: lookup("RUST_LOG").unwrap_or(defaults.server.log_level),
                metrics_addr: lookup("METRICS_ADDR").unwrap_or(defaults.server.metrics_addr),
                shutdown_timeout: parse_var(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(defaults.server.shutdown_timeout),
            },
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None);

        assert_eq!(config.engine.max_tickets_per_request, 10);
        assert_eq!(config.engine.offer_window(), chrono::Duration::minutes(30));
        assert_eq!(config.engine.offer_window_minutes(), 30);
        assert_eq!(config.engine.default_page_limit, 10);
        assert_eq!(config.engine.notification_page_limit, 20);
        assert_eq!(config.reaper.interval(), Duration::from_secs(60));
        assert!(!config.reaper.redistribute);
        assert_eq!(config.server.metrics_addr, "0.0.0.0:9090");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("BOXOFFICE_OFFER_WINDOW_SECS", "600"),
            ("REAPER_INTERVAL_SECS", "5"),
            ("REAPER_REDISTRIBUTE", "true"),
            ("RUST_LOG", "debug"),
        ]));

        assert_eq!(config.engine.offer_window_minutes(), 10);
        assert_eq!(config.reaper.interval_secs, 5);
        assert!(config.reaper.redistribute);
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("BOXOFFICE_MAX_TICKETS", "0"),
            ("BOXOFFICE_DEFAULT_PAGE_LIMIT", "lots"),
            ("REAPER_INTERVAL_SECS", "-3"),
        ]));

        assert_eq!(config.engine.max_tickets_per_request, 10);
        assert_eq!(config.engine.default_page_limit, 10);
        assert_eq!(config.reaper.interval_secs, 60);
    }
}
