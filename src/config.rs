//! Throttle configuration: two already-validated ceilings.
//!
//! Human-readable size strings ("512KiB", "1MB") are the business of the
//! host's config layer; by the time values arrive here they are plain
//! integers in bytes per second. `0` or an absent field means unlimited.

use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced while loading throttle settings, before any listener is
/// built. The data path itself never originates configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set but is not a byte count.
    #[error("invalid {var}={value:?}: expected bytes per second as an integer")]
    InvalidRate {
        /// Variable name that failed to parse.
        var: &'static str,
        /// The offending value, verbatim.
        value: String,
    },
}

/// Upload/download ceilings in bytes per second, `0` = unlimited.
///
/// "Upload" is the accepting side writing to the peer, "download" the
/// accepting side reading from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Max bytes/second written per connection.
    pub up: u64,
    /// Max bytes/second read per connection.
    pub down: u64,
}

impl ThrottleConfig {
    /// Config with both ceilings set.
    pub fn new(up: u64, down: u64) -> Self {
        Self { up, down }
    }

    /// Config that throttles nothing.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// True when neither direction is limited.
    pub fn is_unlimited(&self) -> bool {
        self.up == 0 && self.down == 0
    }

    /// Load ceilings from `BWLIMIT_UP` / `BWLIMIT_DOWN`.
    ///
    /// Unset or empty variables mean unlimited; anything else must parse as
    /// an integer byte count or the whole load fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            up: env_rate("BWLIMIT_UP")?,
            down: env_rate("BWLIMIT_DOWN")?,
        })
    }
}

fn env_rate(var: &'static str) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            trimmed
                .parse()
                .map_err(|_| ConfigError::InvalidRate { var, value })
        }
        Err(_) => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let cfg: ThrottleConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.is_unlimited());

        let cfg: ThrottleConfig = serde_json::from_str(r#"{"up":1024,"down":2048}"#).unwrap();
        assert_eq!(cfg, ThrottleConfig::new(1024, 2048));
    }

    #[test]
    fn rejects_unknown_fields() {
        let res: Result<ThrottleConfig, _> = serde_json::from_str(r#"{"sideways":1}"#);
        assert!(res.is_err());
    }

    // Single test so the process-global environment is mutated from one
    // place only; the default harness runs #[test] fns in parallel.
    #[test]
    fn loads_and_validates_env() {
        std::env::remove_var("BWLIMIT_UP");
        std::env::remove_var("BWLIMIT_DOWN");
        assert!(ThrottleConfig::from_env().unwrap().is_unlimited());

        std::env::set_var("BWLIMIT_UP", "1024");
        std::env::set_var("BWLIMIT_DOWN", " 2048 ");
        assert_eq!(
            ThrottleConfig::from_env().unwrap(),
            ThrottleConfig::new(1024, 2048)
        );

        std::env::set_var("BWLIMIT_DOWN", "");
        assert_eq!(ThrottleConfig::from_env().unwrap().down, 0);

        std::env::set_var("BWLIMIT_DOWN", "2KiB");
        let err = ThrottleConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRate { var: "BWLIMIT_DOWN", .. }));

        std::env::remove_var("BWLIMIT_UP");
        std::env::remove_var("BWLIMIT_DOWN");
    }
}
