//! Engine configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Tunable intervals for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How often the active predicate is sampled. Default: 1000 (1 second).
    pub tick_interval_ms: u64,

    /// How often accumulated time is drained to the store.
    /// Default: 30000 (30 seconds).
    pub flush_interval_ms: u64,

    /// Maximum time since the last qualifying input for which the user still
    /// counts as active. Default: 60 seconds.
    pub idle_threshold_secs: i64,

    /// How long teardown waits for the final flush before letting the host
    /// unload. Default: 250 milliseconds.
    pub teardown_flush_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            flush_interval_ms: 30_000,
            idle_threshold_secs: 60,
            teardown_flush_wait_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    ///
    /// Layering: built-in defaults, then the platform config file, then the
    /// given file, then `TA_`-prefixed environment variables.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TA_"));

        figment.extract()
    }

    /// The tick sampling interval.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The flush interval.
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// The idle threshold for the active predicate.
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_threshold_secs)
    }

    /// The bounded wait for the teardown flush.
    pub const fn teardown_flush_wait(&self) -> Duration {
        Duration::from_millis(self.teardown_flush_wait_ms)
    }
}

/// Returns the platform-specific config directory for the activity engine.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ta"))
}
