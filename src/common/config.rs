//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};
use crate::harness::{TimeoutSpec, MAX_TIMEOUT};

/// Environment variable overriding the configured timeout scale
pub const SCALE_ENV_VAR: &str = "READINESS_TIMEOUT_SCALE";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Timeout settings
///
/// Base durations are multiplied by `scale` so slow emulators and CI
/// machines can stretch every budget at once. The poll interval is never
/// scaled.
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Slow-environment multiplier
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Delay between condition checks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Budget for ordinary polls
    #[serde(default = "default_default")]
    pub default_secs: u64,

    /// Budget for startup-class waits
    #[serde(default = "default_startup")]
    pub startup_secs: u64,

    /// Budget for the slowest waits
    #[serde(default = "default_long")]
    pub long_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            poll_interval_ms: default_poll_interval(),
            default_secs: default_default(),
            startup_secs: default_startup(),
            long_secs: default_long(),
        }
    }
}

fn default_scale() -> f64 {
    1.0
}
fn default_poll_interval() -> u64 {
    50
}
fn default_default() -> u64 {
    3
}
fn default_startup() -> u64 {
    5
}
fn default_long() -> u64 {
    10
}

impl Timeouts {
    /// Check that every value can produce a usable `TimeoutSpec`
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::Config(format!(
                "timeout scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.long_secs <= self.startup_secs {
            return Err(Error::Config(format!(
                "long_secs ({}) must be greater than startup_secs ({})",
                self.long_secs, self.startup_secs
            )));
        }
        for (name, secs) in [
            ("default_secs", self.default_secs),
            ("startup_secs", self.startup_secs),
            ("long_secs", self.long_secs),
        ] {
            let scaled = secs as f64 * self.scale;
            if scaled > MAX_TIMEOUT.as_secs_f64() {
                return Err(Error::Config(format!(
                    "{} scaled by {} is {}s, above the {}s limit",
                    name,
                    self.scale,
                    scaled,
                    MAX_TIMEOUT.as_secs()
                )));
            }
        }
        Ok(())
    }

    /// Apply the `READINESS_TIMEOUT_SCALE` override, if set
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(SCALE_ENV_VAR) {
            self.scale = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not a number: '{}'", SCALE_ENV_VAR, raw))
            })?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn scaled(&self, secs: u64) -> TimeoutSpec {
        TimeoutSpec::new(Duration::from_secs(secs), self.poll_interval()).scaled(self.scale)
    }

    /// Budget for ordinary polls
    pub fn default_spec(&self) -> TimeoutSpec {
        self.scaled(self.default_secs)
    }

    /// Budget for startup-class waits
    pub fn startup_spec(&self) -> TimeoutSpec {
        self.scaled(self.startup_secs)
    }

    /// Budget for the slowest waits
    pub fn long_spec(&self) -> TimeoutSpec {
        self.scaled(self.long_secs)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if the file doesn't exist. The scale
    /// environment override is applied either way.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::read(&path)?,
            _ => Self::default(),
        };
        config.timeouts.apply_env()?;
        config.timeouts.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.timeouts.apply_env()?;
        config.timeouts.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text without touching the environment
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.timeouts.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.poll_interval(), Duration::from_millis(50));
        assert_eq!(timeouts.default_spec().timeout, Duration::from_secs(3));
        assert_eq!(timeouts.startup_spec().timeout, Duration::from_secs(5));
        assert_eq!(timeouts.long_spec().timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_scale_stretches_timeouts_not_interval() {
        let config = Config::parse("[timeouts]\nscale = 2.5\n").unwrap();
        let spec = config.timeouts.startup_spec();
        assert_eq!(spec.timeout, Duration::from_millis(12_500));
        assert_eq!(spec.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("[timeouts]\npoll_interval_ms = 10\n").unwrap();
        assert_eq!(config.timeouts.poll_interval_ms, 10);
        assert_eq!(config.timeouts.long_secs, 10);
    }

    #[test]
    fn test_rejects_non_positive_scale() {
        let err = Config::parse("[timeouts]\nscale = 0.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let err = Config::parse("[timeouts]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_oversized_scale() {
        let err = Config::parse("[timeouts]\nscale = 1e300\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // Even unvalidated values never panic when turned into budgets
        let timeouts = Timeouts {
            scale: 1e300,
            ..Timeouts::default()
        };
        assert_eq!(timeouts.long_spec().timeout, MAX_TIMEOUT);
    }

    #[test]
    fn test_rejects_oversized_budget() {
        let err = Config::parse("[timeouts]\nlong_secs = 10000000000\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_background_budget_not_longest() {
        let err = Config::parse("[timeouts]\nlong_secs = 1\nstartup_secs = 5\n").unwrap_err();
        match err {
            Error::Config(message) => assert!(message.contains("long_secs"), "{message}"),
            other => panic!("Expected Config, got {other:?}"),
        }
        assert!(Config::parse("[timeouts]\nlong_secs = 5\nstartup_secs = 5\n").is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::parse("[timeouts\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\ndefault_secs = 7").unwrap();

        let config = Config::read(file.path()).unwrap();
        assert_eq!(config.timeouts.default_secs, 7);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::read(Path::new("/nonexistent/readiness/config.toml")).unwrap_err();
        match err {
            Error::FileRead { path, .. } => assert!(path.contains("nonexistent")),
            other => panic!("Expected FileRead, got {other:?}"),
        }
    }
}
