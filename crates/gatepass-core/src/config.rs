//! Configuration loading (TOML).
//!
//! Every field has a default except the token secret, which must be supplied.
//!
//! ```toml
//! [token]
//! secret_hex = "00112233445566778899aabbccddeeff"
//! ttl_secs = 300
//!
//! [monitor]
//! fast_interval_secs = 30
//! slow_interval_secs = 10800
//! throttle_hours = 24
//!
//! [passes]
//! number_prefix = "GP"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_BYTES: usize = 16;

/// Upper bound for `token.ttl_secs` (one day).
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Upper bound for monitor intervals (one week).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for `monitor.throttle_hours` (one year).
pub const MAX_THROTTLE_HOURS: u64 = 365 * 24;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatePassConfig {
    pub token: TokenConfig,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub passes: PassesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenConfig {
    /// HMAC key, hex encoded.
    pub secret_hex: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// Overdue monitor cadences and escalation throttle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub fast_interval_secs: u64,
    pub slow_interval_secs: u64,
    pub throttle_hours: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            fast_interval_secs: 30,
            slow_interval_secs: 3 * 60 * 60,
            throttle_hours: 24,
        }
    }
}

impl MonitorSettings {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_interval_secs)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_secs(self.slow_interval_secs)
    }

    /// Saturates at [`MAX_THROTTLE_HOURS`] for settings that skipped validation.
    pub fn throttle(&self) -> chrono::Duration {
        let hours = self.throttle_hours.min(MAX_THROTTLE_HOURS) as i64;
        chrono::Duration::hours(hours)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PassesConfig {
    pub number_prefix: String,
}

impl Default for PassesConfig {
    fn default() -> Self {
        Self {
            number_prefix: "GP".to_string(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

impl TokenConfig {
    pub fn ttl(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.ttl_secs)
            .ok()
            .filter(|secs| (1..=MAX_TOKEN_TTL_SECS as i64).contains(secs))
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "token ttl_secs must be within 1..={MAX_TOKEN_TTL_SECS}, got {}",
                    self.ttl_secs
                ))
            })
    }
}

impl GatePassConfig {
    /// Defaults plus the given secret.
    pub fn with_secret_hex(secret_hex: impl Into<String>) -> Self {
        Self {
            token: TokenConfig {
                secret_hex: secret_hex.into(),
                ttl_secs: default_ttl_secs(),
            },
            monitor: MonitorSettings::default(),
            passes: PassesConfig::default(),
        }
    }

    /// Load configuration from file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from string
    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config: GatePassConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.secret_bytes()?;
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Validation(format!(
                "token secret must be at least {MIN_SECRET_BYTES} bytes, got {}",
                secret.len()
            )));
        }
        self.token.ttl()?;
        let monitor = &self.monitor;
        for (name, secs) in [
            ("fast_interval_secs", monitor.fast_interval_secs),
            ("slow_interval_secs", monitor.slow_interval_secs),
        ] {
            if !(1..=MAX_INTERVAL_SECS).contains(&secs) {
                return Err(ConfigError::Validation(format!(
                    "monitor {name} must be within 1..={MAX_INTERVAL_SECS}, got {secs}"
                )));
            }
        }
        if monitor.throttle_hours > MAX_THROTTLE_HOURS {
            return Err(ConfigError::Validation(format!(
                "monitor throttle_hours must be at most {MAX_THROTTLE_HOURS}, got {}",
                monitor.throttle_hours
            )));
        }
        if self.passes.number_prefix.is_empty() || self.passes.number_prefix.contains(':') {
            return Err(ConfigError::Validation(
                "pass number prefix must be non-empty and free of ':'".into(),
            ));
        }
        Ok(())
    }

    pub fn secret_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(self.token.secret_hex.trim())
            .map_err(|e| ConfigError::Validation(format!("token secret_hex: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "00112233445566778899aabbccddeeff";

    #[test]
    fn defaults_fill_everything_but_the_secret() {
        let config = GatePassConfig::load_str(&format!("[token]\nsecret_hex = \"{SECRET}\"\n")).unwrap();
        assert_eq!(config.token.ttl_secs, 300);
        assert_eq!(config.monitor, MonitorSettings::default());
        assert_eq!(config.monitor.slow_interval(), Duration::from_secs(10800));
        assert_eq!(config.passes.number_prefix, "GP");
    }

    #[test]
    fn missing_secret_is_a_parse_error() {
        let err = GatePassConfig::load_str("[monitor]\nfast_interval_secs = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = GatePassConfig::with_secret_hex("abcd").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("at least 16 bytes")));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let toml = format!("[token]\nsecret_hex = \"{SECRET}\"\n[monitor]\nfast_interval_secs = 0\n");
        assert!(matches!(GatePassConfig::load_str(&toml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn huge_throttle_is_rejected() {
        let toml = format!(
            "[token]\nsecret_hex = \"{SECRET}\"\n[monitor]\nthrottle_hours = 9000000000000000\n"
        );
        let err = GatePassConfig::load_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("throttle_hours")));
    }

    #[test]
    fn unvalidated_huge_throttle_saturates() {
        let settings = MonitorSettings {
            throttle_hours: u64::MAX,
            ..MonitorSettings::default()
        };
        assert_eq!(settings.throttle(), chrono::Duration::hours(MAX_THROTTLE_HOURS as i64));
    }

    #[test]
    fn ttl_out_of_range_is_rejected() {
        for ttl in [0, MAX_TOKEN_TTL_SECS + 1, u64::MAX] {
            let mut config = GatePassConfig::with_secret_hex(SECRET);
            config.token.ttl_secs = ttl;
            assert!(
                matches!(config.validate(), Err(ConfigError::Validation(msg)) if msg.contains("ttl_secs")),
                "ttl {ttl}"
            );
        }
        let config = GatePassConfig::with_secret_hex(SECRET);
        assert_eq!(config.token.ttl().unwrap(), chrono::Duration::seconds(300));
    }

    #[test]
    fn huge_interval_is_rejected() {
        let toml = format!(
            "[token]\nsecret_hex = \"{SECRET}\"\n[monitor]\nslow_interval_secs = 18446744073709551615\n"
        );
        assert!(matches!(GatePassConfig::load_str(&toml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = GatePassConfig::load_file("/nonexistent/gatepass.toml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
