//! Runtime configuration.
//!
//! The only knob is whether development checks run. With checks on, misuse
//! such as duplicate list keys or reading through an unconfigured binding
//! produces a `tracing` warning carrying the offending values. With checks
//! off those paths are skipped entirely and misuse degrades to a silent
//! no-op. Checks default to on in debug builds and off in release builds;
//! the `SPRIG_DEV_CHECKS` environment variable overrides the default.

use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Environment variable consulted by [`Config::from_env`].
pub const DEV_CHECKS_ENV: &str = "SPRIG_DEV_CHECKS";

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Process-wide runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Emit usage warnings (duplicate keys, unconfigured binding).
    pub dev_checks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev_checks: cfg!(debug_assertions),
        }
    }
}

impl Config {
    /// Build a configuration from the build profile and `SPRIG_DEV_CHECKS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(DEV_CHECKS_ENV) {
            match parse_flag(&raw) {
                Some(flag) => config.dev_checks = flag,
                None => tracing::warn!(
                    variable = DEV_CHECKS_ENV,
                    value = %raw,
                    "ignoring unrecognized flag value"
                ),
            }
        }
        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Install the configuration. Must happen before the first call to [`current`].
pub fn init(config: Config) -> Result<()> {
    CONFIG.set(config).map_err(|_| Error::ConfigAlreadySet)
}

/// The active configuration, falling back to [`Config::from_env`].
pub fn current() -> Config {
    *CONFIG.get_or_init(Config::from_env)
}

/// Shorthand for `current().dev_checks`.
pub(crate) fn dev_checks() -> bool {
    current().dev_checks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_spellings() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn default_follows_build_profile() {
        assert_eq!(Config::default().dev_checks, cfg!(debug_assertions));
    }
}
