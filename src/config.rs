use crate::error::{PacedError, Result};
use crate::locking::{
    CooldownResolution, CooldownResolver, DEFAULT_COOLDOWN, HoldPolicy, RateLimitedMutexBuilder,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "paced.toml";
pub const COOLDOWN_ENV_VAR: &str = "PACED_COOLDOWN_MS";

const DEFAULT_COOLDOWN_MS: u64 = 1_000;
const DEFAULT_LEASE_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PacedConfig {
    #[serde(default)]
    pub mutex: MutexConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HoldMode {
    #[default]
    Exclusive,
    Lease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default)]
    pub hold: HoldMode,

    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            hold: HoldMode::Exclusive,
            lease_ms: DEFAULT_LEASE_MS,
        }
    }
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_lease_ms() -> u64 {
    DEFAULT_LEASE_MS
}

impl MutexConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn hold_policy(&self) -> Result<HoldPolicy> {
        match self.hold {
            HoldMode::Exclusive => Ok(HoldPolicy::Exclusive),
            HoldMode::Lease if self.lease_ms == 0 => Err(PacedError::InvalidConfig(
                "mutex.lease_ms must be greater than zero when hold = \"lease\"".to_string(),
            )),
            HoldMode::Lease => Ok(HoldPolicy::Lease(Duration::from_millis(self.lease_ms))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub close_delay_ms: u64,
}

impl CacheConfig {
    /// `None` means closes go straight to the cache.
    pub fn close_delay(&self) -> Option<Duration> {
        (self.close_delay_ms > 0).then(|| Duration::from_millis(self.close_delay_ms))
    }
}

impl PacedConfig {
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            log::debug!("Config file not found at {config_path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: PacedConfig = toml::from_str(&contents)
            .map_err(|e| PacedError::ConfigFile(format!("Failed to parse {CONFIG_FILE_NAME}: {e}")))?;
        config.mutex.hold_policy()?;

        log::debug!("Loaded config from {config_path:?}");
        Ok(config)
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| PacedError::ConfigFile(format!("Failed to serialize config: {e}")))?;

        fs::write(&config_path, contents)?;
        log::debug!("Saved config to {config_path:?}");
        Ok(())
    }

    /// Resolves the cooldown from the CLI flag, `PACED_COOLDOWN_MS` and this file.
    pub fn resolve_cooldown(&self, cli_override: Option<&str>) -> Result<CooldownResolution> {
        let env_value = env::var(COOLDOWN_ENV_VAR).ok();
        CooldownResolver::new(
            cli_override,
            env_value.as_deref(),
            self.mutex.cooldown(),
            DEFAULT_COOLDOWN,
        )
        .resolve()
    }

    pub fn mutex_builder(&self, cli_override: Option<&str>) -> Result<RateLimitedMutexBuilder> {
        let cooldown = self.resolve_cooldown(cli_override)?;
        log::debug!(
            "Using cooldown of {}ms from {}",
            cooldown.value.as_millis(),
            cooldown.source
        );
        Ok(crate::locking::RateLimitedMutex::builder()
            .cooldown(cooldown.value)
            .hold_policy(self.mutex.hold_policy()?))
    }
}

/// `<platform config dir>/paced`, e.g. `~/.config/paced` on Linux.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("paced"))
}
