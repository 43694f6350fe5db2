//! Configuration loading
//!
//! Bootstrap configuration is a single TOML file. Every section and field has
//! a built-in default, so a missing file (or a partial one) never prevents
//! startup.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`MINT_CONFIG`)
//! 3. Platform config directory (`<config_dir>/mint/config.toml`)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "MINT_CONFIG";

/// Highest accepted batch rate; intervals are whole milliseconds
pub const MAX_BATCHES_PER_SECOND: u32 = 1000;

/// `1000 / rate` milliseconds, never shorter than 1 ms
fn interval_for_rate(per_second: u32) -> Duration {
    let millis = 1000 / u64::from(per_second.max(1));
    Duration::from_millis(millis.max(1))
}

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Client-side streaming settings
    pub stream: StreamSettings,

    /// Static defaults used when building a ProcessingConfig
    pub processing: ProcessingDefaults,

    /// Synthetic headset server settings
    pub simulator: SimulatorSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Streaming coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// WebSocket URL of the signal stream
    pub url: String,

    /// Render window capacity (points)
    pub chart_size: usize,

    /// Drain ticks per second
    pub batches_per_second: u32,

    /// Grace period for the close handshake before a forced close
    pub close_timeout_ms: u64,

    /// Maximum streaming session length; `None` disables the limit
    pub session_limit_secs: Option<u64>,

    /// How many accumulated points one drain tick moves into the window
    pub drain_policy: DrainPolicy,
}

/// Amount of accumulated data moved per drain tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Up to `chart_size` oldest points per tick; bursts are spread over
    /// several ticks
    #[default]
    Paced,

    /// Everything pending in one tick; the window keeps the newest points
    Latest,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            chart_size: 20,
            batches_per_second: 10,
            close_timeout_ms: 5000,
            session_limit_secs: Some(300),
            drain_policy: DrainPolicy::Paced,
        }
    }
}

impl StreamSettings {
    /// Drain cadence: `1000 / batches_per_second` milliseconds (at least 1 ms)
    pub fn drain_interval(&self) -> Duration {
        interval_for_rate(self.batches_per_second)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn session_limit(&self) -> Option<Duration> {
        self.session_limit_secs.map(Duration::from_secs)
    }
}

/// Fixed acquisition parameters forwarded in every ProcessingConfig.
///
/// These are static defaults, not derived from the shape of received batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingDefaults {
    pub sfreq: f64,
    pub n_channels: u32,
}

impl Default for ProcessingDefaults {
    fn default() -> Self {
        Self {
            sfreq: 256.0,
            n_channels: 4,
        }
    }
}

/// Synthetic headset server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub host: String,
    pub port: u16,

    /// Points per batch
    pub batch_size: usize,

    /// Channels per point
    pub channels: usize,

    /// Nominal sampling rate in Hz (spacing of generated timestamps)
    pub sample_rate: f64,

    /// Batches sent per second on each connection
    pub batches_per_second: u32,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            batch_size: 20,
            channels: 4,
            sample_rate: 256.0,
            batches_per_second: 10,
        }
    }
}

impl SimulatorSettings {
    /// Send cadence per connection (at least 1 ms)
    pub fn batch_interval(&self) -> Duration {
        interval_for_rate(self.batches_per_second)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.stream.chart_size == 0 {
            return Err(Error::Config("stream.chart_size must be at least 1".to_string()));
        }
        check_rate("stream", self.stream.batches_per_second)?;
        check_rate("simulator", self.simulator.batches_per_second)?;
        if self.simulator.channels == 0 || self.simulator.batch_size == 0 {
            return Err(Error::Config(
                "simulator.channels and simulator.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_rate(section: &str, per_second: u32) -> Result<()> {
    if (1..=MAX_BATCHES_PER_SECOND).contains(&per_second) {
        return Ok(());
    }
    Err(Error::Config(format!(
        "{}.batches_per_second must be between 1 and {} (got {})",
        section, MAX_BATCHES_PER_SECOND, per_second
    )))
}

/// Resolves which config file (if any) to load
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Config file path by priority, or `None` when only defaults apply
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path().filter(|path| path.exists())
    }

    /// Load configuration, falling back to defaults when no file exists
    ///
    /// A missing file is logged and ignored. A file that exists but fails to
    /// parse or validate is an error.
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.resolve_path() else {
            info!("No config file found, using built-in defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(TomlConfig::default());
        }

        let config = TomlConfig::from_file(&path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// `<platform config dir>/mint/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mint").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stream_settings() {
        let settings = StreamSettings::default();
        assert_eq!(settings.chart_size, 20);
        assert_eq!(settings.batches_per_second, 10);
        assert_eq!(settings.close_timeout(), Duration::from_millis(5000));
        assert_eq!(settings.session_limit(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_drain_interval() {
        let mut settings = StreamSettings::default();
        assert_eq!(settings.drain_interval(), Duration::from_millis(100));

        settings.batches_per_second = 4;
        assert_eq!(settings.drain_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_processing_defaults() {
        let defaults = ProcessingDefaults::default();
        assert_eq!(defaults.sfreq, 256.0);
        assert_eq!(defaults.n_channels, 4);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [stream]
            chart_size = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.chart_size, 64);
        assert_eq!(config.stream.batches_per_second, 10);
        assert_eq!(config.stream.drain_policy, DrainPolicy::Paced);
        assert_eq!(config.simulator, SimulatorSettings::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_drain_policy_from_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
            [stream]
            drain_policy = "latest"
            "#,
        )
        .unwrap();
        assert_eq!(config.stream.drain_policy, DrainPolicy::Latest);
    }

    #[test]
    fn test_validate_rejects_zero_chart_size() {
        let mut config = TomlConfig::default();
        config.stream.chart_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_rates_above_one_per_millisecond() {
        let mut config = TomlConfig::default();
        config.stream.batches_per_second = 2000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.simulator.batches_per_second = 1001;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.stream.batches_per_second = MAX_BATCHES_PER_SECOND;
        config.simulator.batches_per_second = MAX_BATCHES_PER_SECOND;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_intervals_never_zero() {
        let stream = StreamSettings {
            batches_per_second: 2000,
            ..Default::default()
        };
        assert_eq!(stream.drain_interval(), Duration::from_millis(1));

        let simulator = SimulatorSettings {
            batches_per_second: u32::MAX,
            ..Default::default()
        };
        assert_eq!(simulator.batch_interval(), Duration::from_millis(1));
        assert_eq!(SimulatorSettings::default().batch_interval(), Duration::from_millis(100));
    }
}
