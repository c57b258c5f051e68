// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven settings for both services.
//!
//! Every knob has a default suitable for a local experiment, overridable
//! through the environment keys documented on each field. CLI flags layer on
//! top of these in the binary.

use crate::duration::FlexDuration;
use crate::error::Error;
use crate::limits::{Algorithm, LimitConfig, ValidationBounds};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Store host (`REDIS_HOST`).
    pub host: String,
    /// Store port (`REDIS_PORT`).
    pub port: u16,
    /// Availability probe period (`STORE_PROBE_INTERVAL`).
    pub probe_interval: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            probe_interval: Duration::from_secs(5),
        }
    }
}

impl StoreSettings {
    /// Reads the store settings from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::default();
        if let Some(host) = env_var("REDIS_HOST") {
            settings.host = host;
        }
        if let Some(port) = env_parse::<u16>("REDIS_PORT")? {
            settings.port = port;
        }
        if let Some(interval) = env_duration("STORE_PROBE_INTERVAL")? {
            settings.probe_interval = interval;
        }
        Ok(settings)
    }

    /// The redis connection URL for these settings.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Settings for the adaptive reconfiguration loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveSettings {
    /// Whether the loop posts to the advisor (`ADAPTIVE_ENABLED`).
    pub enabled: bool,
    /// Advisor endpoint (`ADAPTIVE_URL`); empty disables posting with a warning.
    pub advisor_url: Option<String>,
    /// Tick period (`ADAPTIVE_INTERVAL`).
    pub interval: Duration,
    /// Per-post request timeout (`ADAPTIVE_TIMEOUT`).
    pub timeout: Duration,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            advisor_url: None,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

impl AdaptiveSettings {
    /// Reads the adaptive loop settings from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::default();
        if let Some(raw) = env_var("ADAPTIVE_ENABLED") {
            settings.enabled = parse_bool("ADAPTIVE_ENABLED", &raw)?;
        }
        settings.advisor_url = env_var("ADAPTIVE_URL");
        if let Some(interval) = env_duration("ADAPTIVE_INTERVAL")? {
            settings.interval = interval;
        }
        if let Some(timeout) = env_duration("ADAPTIVE_TIMEOUT")? {
            settings.timeout = timeout;
        }
        Ok(settings)
    }
}

/// Settings for the limiting proxy service.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSettings {
    /// HTTP bind address (`LIMITER_BIND_ADDRESS`).
    pub bind_address: String,
    /// Upstream target every admitted request is forwarded to (`TARGET_URL`).
    pub target_url: String,
    /// Whether to admit when the store is unreachable (`RATE_LIMIT_FAIL_OPEN`).
    pub fail_open: bool,
    /// The startup limiter budget (`RATE_LIMIT_*`).
    pub defaults: LimitConfig,
    /// Operator validation bounds (`RATE_LIMIT_MIN_*` / `RATE_LIMIT_MAX_*`).
    pub bounds: ValidationBounds,
    /// Period of the persisted-config refresh (`CONFIG_REFRESH_INTERVAL`).
    pub refresh_interval: Duration,
    /// Shared store connection settings.
    pub store: StoreSettings,
    /// Adaptive loop settings.
    pub adaptive: AdaptiveSettings,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            target_url: "http://127.0.0.1:8082".to_string(),
            fail_open: true,
            defaults: LimitConfig::default(),
            bounds: ValidationBounds::default(),
            refresh_interval: Duration::from_secs(30),
            store: StoreSettings::default(),
            adaptive: AdaptiveSettings::default(),
        }
    }
}

impl LimiterSettings {
    /// Reads the limiter settings from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::default();
        if let Some(addr) = env_var("LIMITER_BIND_ADDRESS") {
            settings.bind_address = addr;
        }
        if let Some(target) = env_var("TARGET_URL") {
            settings.target_url = target;
        }
        if let Some(raw) = env_var("RATE_LIMIT_FAIL_OPEN") {
            settings.fail_open = parse_bool("RATE_LIMIT_FAIL_OPEN", &raw)?;
        }
        if let Some(raw) = env_var("RATE_LIMIT_ALGORITHM") {
            settings.defaults.algorithm =
                Algorithm::parse(&raw).ok_or_else(|| Error::InvalidEnv {
                    key: "RATE_LIMIT_ALGORITHM".to_string(),
                    details: format!("unknown algorithm '{raw}'"),
                })?;
        }
        if let Some(limit) = env_parse::<u64>("RATE_LIMIT_LIMIT")? {
            settings.defaults.limit = limit;
        }
        if let Some(window) = env_parse::<u64>("RATE_LIMIT_WINDOW_SECONDS")? {
            settings.defaults.window_seconds = window;
        }
        if let Some(capacity) = env_parse::<u64>("RATE_LIMIT_CAPACITY")? {
            settings.defaults.capacity = capacity;
        }
        if let Some(fill_rate) = env_parse::<f64>("RATE_LIMIT_FILL_RATE")? {
            settings.defaults.fill_rate = fill_rate;
        }
        settings.bounds = bounds_from_env(settings.bounds)?;
        if let Some(interval) = env_duration("CONFIG_REFRESH_INTERVAL")? {
            settings.refresh_interval = interval;
        }
        settings.store = StoreSettings::from_env()?;
        settings.adaptive = AdaptiveSettings::from_env()?;
        Ok(settings)
    }
}

/// Which scheduler realization drives a load test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerChoice {
    /// One cooperative worker sleeping `next_delay` between sends.
    #[default]
    Interval,
    /// Fixed-period ticker emitting `floor(rps * tick + carry)` per tick.
    Tick,
}

impl FromStr for SchedulerChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" => Ok(SchedulerChoice::Interval),
            "tick" => Ok(SchedulerChoice::Tick),
            other => Err(Error::InvalidEnv {
                key: "LOADGEN_SCHEDULER".to_string(),
                details: format!("unknown scheduler '{other}'"),
            }),
        }
    }
}

/// Settings for the load generator service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadgenSettings {
    /// HTTP bind address (`LOADGEN_BIND_ADDRESS`).
    pub bind_address: String,
    /// Scheduler realization (`LOADGEN_SCHEDULER`: `interval` or `tick`).
    pub scheduler: SchedulerChoice,
    /// Optional start request applied at boot (`LOADGEN_CONFIG_FILE`).
    pub config_file: Option<PathBuf>,
    /// Outbound connect timeout (`LOADGEN_CONNECT_TIMEOUT`).
    pub connect_timeout: Duration,
    /// Outbound request timeout (`LOADGEN_REQUEST_TIMEOUT`).
    pub request_timeout: Duration,
    /// Sleep applied when the profile rate is zero (`LOADGEN_IDLE_DELAY`, min 1 ms).
    pub idle_delay: Duration,
    /// Tick period of the tick scheduler (`LOADGEN_TICK_PERIOD`).
    pub tick_period: Duration,
}

impl Default for LoadgenSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            scheduler: SchedulerChoice::Interval,
            config_file: None,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            idle_delay: Duration::from_millis(100),
            tick_period: Duration::from_millis(100),
        }
    }
}

impl LoadgenSettings {
    /// Reads the load generator settings from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let mut settings = Self::default();
        if let Some(addr) = env_var("LOADGEN_BIND_ADDRESS") {
            settings.bind_address = addr;
        }
        if let Some(raw) = env_var("LOADGEN_SCHEDULER") {
            settings.scheduler = raw.parse()?;
        }
        settings.config_file = env_var("LOADGEN_CONFIG_FILE").map(PathBuf::from);
        if let Some(timeout) = env_duration("LOADGEN_CONNECT_TIMEOUT")? {
            settings.connect_timeout = timeout;
        }
        if let Some(timeout) = env_duration("LOADGEN_REQUEST_TIMEOUT")? {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = env_duration("LOADGEN_IDLE_DELAY")? {
            settings.idle_delay = delay.max(Duration::from_millis(1));
        }
        if let Some(period) = env_duration("LOADGEN_TICK_PERIOD")? {
            settings.tick_period = period.max(Duration::from_millis(1));
        }
        Ok(settings)
    }
}

fn bounds_from_env(mut bounds: ValidationBounds) -> Result<ValidationBounds, Error> {
    if let Some(v) = env_parse::<u64>("RATE_LIMIT_MIN_LIMIT")? {
        bounds.min_limit = v.max(1);
    }
    if let Some(v) = env_parse::<u64>("RATE_LIMIT_MAX_LIMIT")? {
        bounds.max_limit = v;
    }
    if let Some(v) = env_parse::<u64>("RATE_LIMIT_MIN_WINDOW_SECONDS")? {
        bounds.min_window = v.max(1);
    }
    if let Some(v) = env_parse::<u64>("RATE_LIMIT_MAX_WINDOW_SECONDS")? {
        bounds.max_window = v;
    }
    if let Some(v) = env_parse::<u64>("RATE_LIMIT_MIN_CAPACITY")? {
        bounds.min_capacity = v.max(1);
    }
    if let Some(v) = env_parse::<u64>("RATE_LIMIT_MAX_CAPACITY")? {
        bounds.max_capacity = v;
    }
    if let Some(v) = env_parse::<f64>("RATE_LIMIT_MIN_FILL_RATE")? {
        if v <= 0.0 {
            return Err(Error::InvalidEnv {
                key: "RATE_LIMIT_MIN_FILL_RATE".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }
        bounds.min_fill_rate = v;
    }
    if let Some(v) = env_parse::<f64>("RATE_LIMIT_MAX_FILL_RATE")? {
        bounds.max_fill_rate = v;
    }
    Ok(bounds)
}

fn env_var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, Error>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| Error::InvalidEnv {
            key: key.to_string(),
            details: e.to_string(),
        }),
        None => Ok(None),
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>, Error> {
    match env_var(key) {
        Some(raw) => FlexDuration::parse(&raw)
            .map(|d| Some(d.get()))
            .map_err(|e| Error::InvalidEnv {
                key: key.to_string(),
                details: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidEnv {
            key: key.to_string(),
            details: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_url_formats_host_and_port() {
        let settings = StoreSettings {
            host: "cache.internal".to_string(),
            port: 6380,
            ..StoreSettings::default()
        };
        assert_eq!(settings.url(), "redis://cache.internal:6380/");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "true").expect("parse"));
        assert!(parse_bool("K", "1").expect("parse"));
        assert!(parse_bool("K", "ON").expect("parse"));
        assert!(!parse_bool("K", "false").expect("parse"));
        assert!(!parse_bool("K", "0").expect("parse"));
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn scheduler_choice_parses() {
        assert_eq!(
            "interval".parse::<SchedulerChoice>().expect("parse"),
            SchedulerChoice::Interval
        );
        assert_eq!(
            "Tick".parse::<SchedulerChoice>().expect("parse"),
            SchedulerChoice::Tick
        );
        assert!("cron".parse::<SchedulerChoice>().is_err());
    }

    #[test]
    fn defaults_are_self_consistent() {
        let limiter = LimiterSettings::default();
        assert!(limiter.fail_open);
        assert!(limiter.defaults.limit >= limiter.bounds.min_limit);
        assert!(limiter.defaults.limit <= limiter.bounds.max_limit);
        let loadgen = LoadgenSettings::default();
        assert!(loadgen.idle_delay >= Duration::from_millis(1));
    }
}
