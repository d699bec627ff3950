//! Application-level configuration loading, including the liveness and timer tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POINTING_POKER_CONFIG_PATH";

const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10_000;
const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_AUTO_FLIP_DELAY_MS: u64 = 1_000;
const DEFAULT_AUTO_FLIP_TICK_MS: u64 = 100;
const DEFAULT_REJOIN_GRACE_MS: u64 = 300;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How often the presence monitor sweeps every room.
    pub heartbeat_sweep_interval: Duration,
    /// Elapsed time since the last heartbeat after which a user is evicted.
    pub heartbeat_timeout: Duration,
    /// Delay between a room becoming flippable and the automatic flip.
    pub auto_flip_delay: Duration,
    /// Tick used by the auto-flip elapsed-time recheck loop.
    pub auto_flip_tick: Duration,
    /// Grace period before broadcasting after a rejoin, letting the new
    /// connection settle.
    pub rejoin_grace: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    heartbeat_sweep_interval_ms: Option<u64>,
    heartbeat_timeout_ms: Option<u64>,
    auto_flip_delay_ms: Option<u64>,
    auto_flip_tick_ms: Option<u64>,
    rejoin_grace_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            heartbeat_sweep_interval: Duration::from_millis(
                value
                    .heartbeat_sweep_interval_ms
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
            ),
            heartbeat_timeout: Duration::from_millis(
                value
                    .heartbeat_timeout_ms
                    .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            ),
            auto_flip_delay: Duration::from_millis(
                value.auto_flip_delay_ms.unwrap_or(DEFAULT_AUTO_FLIP_DELAY_MS),
            ),
            auto_flip_tick: Duration::from_millis(
                value.auto_flip_tick_ms.unwrap_or(DEFAULT_AUTO_FLIP_TICK_MS),
            ),
            rejoin_grace: Duration::from_millis(
                value.rejoin_grace_ms.unwrap_or(DEFAULT_REJOIN_GRACE_MS),
            ),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.auto_flip_delay, Duration::from_millis(1_000));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert!(config.auto_flip_tick < config.auto_flip_delay);
    }

    #[test]
    fn partial_raw_config_falls_back_per_field() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"heartbeat_timeout_ms": 5000}"#).expect("valid json");
        let config: AppConfig = raw.into();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(
            config.heartbeat_sweep_interval,
            Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS)
        );
    }
}
