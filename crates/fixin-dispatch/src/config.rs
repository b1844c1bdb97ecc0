//! Dispatch engine configuration.
//!
//! Defaults match the production service: a 5.00 credit acceptance fee, a
//! 30 minute pending window and a 3 second bound on lock waits. Override via
//! environment variables or explicit construction.

use std::time::Duration;

use fixin_core::Credits;

/// Tunables for [`crate::DispatchEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Credits debited from an agent when it accepts a request.
    pub acceptance_fee: Credits,
    /// How long a request stays eligible for acceptance after creation.
    pub pending_expiry: chrono::Duration,
    /// Upper bound on waiting for a request or agent lock.
    pub lock_timeout: Duration,
    /// Period of the expiry reaper. `None` disables it.
    pub reaper_interval: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            acceptance_fee: Credits::from_cents(500),
            pending_expiry: chrono::Duration::minutes(30),
            lock_timeout: Duration::from_secs(3),
            reaper_interval: None,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables (all optional):
    /// - `FIXIN_ACCEPTANCE_FEE` (default: `5.00`)
    /// - `FIXIN_PENDING_EXPIRY_SECS` (default: 1800)
    /// - `FIXIN_LOCK_TIMEOUT_MS` (default: 3000)
    /// - `FIXIN_REAPER_INTERVAL_SECS` (default: unset, reaper disabled; `0` also disables)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup("FIXIN_ACCEPTANCE_FEE") {
            cfg.acceptance_fee = raw
                .parse()
                .map_err(|_| ConfigError::Invalid("FIXIN_ACCEPTANCE_FEE", raw))?;
        }
        if let Some(secs) = parse_u64(&lookup, "FIXIN_PENDING_EXPIRY_SECS")? {
            if secs == 0 {
                return Err(ConfigError::Invalid(
                    "FIXIN_PENDING_EXPIRY_SECS",
                    secs.to_string(),
                ));
            }
            let secs = i64::try_from(secs).map_err(|_| {
                ConfigError::Invalid("FIXIN_PENDING_EXPIRY_SECS", secs.to_string())
            })?;
            cfg.pending_expiry = chrono::Duration::seconds(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "FIXIN_LOCK_TIMEOUT_MS")? {
            cfg.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "FIXIN_REAPER_INTERVAL_SECS")? {
            cfg.reaper_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(cfg)
    }
}

fn parse_u64<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key, raw)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = DispatchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, DispatchConfig::default());
        assert_eq!(cfg.acceptance_fee.to_string(), "5.00");
        assert_eq!(cfg.pending_expiry, chrono::Duration::minutes(30));
        assert!(cfg.reaper_interval.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = DispatchConfig::from_lookup(lookup(&[
            ("FIXIN_ACCEPTANCE_FEE", "7.5"),
            ("FIXIN_PENDING_EXPIRY_SECS", "60"),
            ("FIXIN_LOCK_TIMEOUT_MS", "250"),
            ("FIXIN_REAPER_INTERVAL_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(cfg.acceptance_fee, Credits::from_cents(750));
        assert_eq!(cfg.pending_expiry, chrono::Duration::seconds(60));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.reaper_interval, Some(Duration::from_secs(15)));
    }

    #[test]
    fn zero_reaper_interval_disables() {
        let cfg =
            DispatchConfig::from_lookup(lookup(&[("FIXIN_REAPER_INTERVAL_SECS", "0")])).unwrap();
        assert!(cfg.reaper_interval.is_none());
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(DispatchConfig::from_lookup(lookup(&[("FIXIN_ACCEPTANCE_FEE", "-1")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[("FIXIN_LOCK_TIMEOUT_MS", "soon")])).is_err());
        assert!(
            DispatchConfig::from_lookup(lookup(&[("FIXIN_PENDING_EXPIRY_SECS", "0")])).is_err()
        );
    }
}
