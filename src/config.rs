//! Host-side settings of the terminal.
//!
//! These are tunables and wiring that the operator does not change through the console:
//! where the device record lives, loop timing, which link driver to use and the GPIO pins.
//! The device record itself (WiFi, broker, topics, id) is handled by
//! [`crate::persistence::config_store`].
//!
//! The file is created with defaults on first start. Missing keys fall back to defaults, so
//! an older file keeps working after new settings are added.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const CONFIG_DIR: &str = ".config/queueterm";
const SETTINGS_FILE: &str = "settings.toml";
const RECORD_FILE: &str = "device.eeprom";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid setting {0}: must be greater than zero")]
    Invalid(&'static str),
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkDriverKind {
    /// Associate through NetworkManager.
    #[default]
    Nmcli,
    /// The host manages its own network.
    Host,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LinkSettings {
    pub driver: LinkDriverKind,
    pub interface: Option<String>,
    pub poll_interval_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            driver: LinkDriverKind::Nmcli,
            interface: None,
            poll_interval_ms: 500,
            connect_timeout_secs: 60,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    /// Without a session for this long, the operator is asked for a new broker.
    pub connect_window_secs: u64,
    pub keep_alive_secs: u64,
    /// Bound of a single connect attempt.
    pub connect_timeout_ms: u64,
    /// How long one poll waits for broker traffic.
    pub poll_window_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            connect_window_secs: 30,
            keep_alive_secs: 5,
            connect_timeout_ms: 3000,
            poll_window_ms: 5,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RequestSettings {
    pub min_press_interval_ms: u64,
    pub response_timeout_secs: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            min_press_interval_ms: 500,
            response_timeout_secs: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HardwareSettings {
    /// Off on development hosts; the terminal then logs screens and beeps instead.
    pub gpio: bool,
    pub button_pin: u8,
    pub buzzer_pin: u8,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            gpio: true,
            button_pin: 17,
            buzzer_pin: 18,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TerminalSettings {
    /// Image file backing the device record.
    pub record_path: PathBuf,
    pub loop_interval_ms: u64,
    /// Pause after an accepted button press.
    pub trigger_pause_ms: u64,
    pub backlog_capacity: usize,
    pub link: LinkSettings,
    pub broker: BrokerSettings,
    pub request: RequestSettings,
    pub hardware: HardwareSettings,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            record_path: config_dir().join(RECORD_FILE),
            loop_interval_ms: 20,
            trigger_pause_ms: 1000,
            backlog_capacity: 10,
            link: LinkSettings::default(),
            broker: BrokerSettings::default(),
            request: RequestSettings::default(),
            hardware: HardwareSettings::default(),
        }
    }
}

impl TerminalSettings {
    pub fn default_path() -> PathBuf {
        config_dir().join(SETTINGS_FILE)
    }

    /// Reads the settings file, writing the defaults first if it does not exist yet.
    pub async fn load_or_create(path: &Path) -> Result<Self, SettingsError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| io_error(path, source))?;

        if exists {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| io_error(path, source))?;
            let settings: Self = toml::from_str(&content)?;
            settings.validate()?;
            info!("Settings loaded from {}", path.display());
            return Ok(settings);
        }

        warn!(
            "No settings at {}, creating one with defaults",
            path.display()
        );
        let settings = Self::default();
        settings.save(path).await?;
        Ok(settings)
    }

    pub async fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| io_error(path, source))
    }

    /// Rejects values that would stall the loop or make every broker attempt fail.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let required = [
            ("loop_interval_ms", self.loop_interval_ms),
            ("backlog_capacity", self.backlog_capacity as u64),
            ("link.poll_interval_ms", self.link.poll_interval_ms),
            ("broker.connect_timeout_ms", self.broker.connect_timeout_ms),
            ("broker.poll_window_ms", self.broker.poll_window_ms),
        ];
        match required.into_iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(SettingsError::Invalid(name)),
            None => Ok(()),
        }
    }

    /// Never zero; `tokio::time::interval` panics on a zero period.
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms.max(1))
    }

    pub fn trigger_pause(&self) -> Duration {
        Duration::from_millis(self.trigger_pause_ms)
    }
}

impl LinkSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl BrokerSettings {
    pub fn connect_window(&self) -> Duration {
        Duration::from_secs(self.connect_window_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn poll_window(&self) -> Duration {
        Duration::from_millis(self.poll_window_ms.max(1))
    }
}

impl RequestSettings {
    pub fn min_press_interval(&self) -> Duration {
        Duration::from_millis(self.min_press_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn config_dir() -> PathBuf {
    get_home_dir().join(CONFIG_DIR)
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let settings = TerminalSettings::load_or_create(&path).await.unwrap();
        assert_eq!(settings, TerminalSettings::default());
        assert!(path.exists());

        let reloaded = TerminalSettings::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded, settings);
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        tokio::fs::write(
            &path,
            "loop_interval_ms = 50\n\n[link]\ndriver = \"host\"\n\n[hardware]\ngpio = false\n",
        )
        .await
        .unwrap();

        let settings = TerminalSettings::load_or_create(&path).await.unwrap();
        assert_eq!(settings.loop_interval(), Duration::from_millis(50));
        assert_eq!(settings.link.driver, LinkDriverKind::Host);
        assert_eq!(settings.link.connect_timeout(), Duration::from_secs(60));
        assert!(!settings.hardware.gpio);
        assert_eq!(settings.hardware.buzzer_pin, 18);
        assert_eq!(settings.broker.connect_window(), Duration::from_secs(30));
        assert_eq!(settings.backlog_capacity, 10);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        tokio::fs::write(&path, "loop_interval_ms = \"fast\"")
            .await
            .unwrap();

        let result = TerminalSettings::load_or_create(&path).await;
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[tokio::test]
    async fn zero_intervals_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        tokio::fs::write(&path, "loop_interval_ms = 0\n").await.unwrap();
        let result = TerminalSettings::load_or_create(&path).await;
        assert!(matches!(
            result,
            Err(SettingsError::Invalid("loop_interval_ms"))
        ));

        tokio::fs::write(&path, "[broker]\nconnect_timeout_ms = 0\n")
            .await
            .unwrap();
        let result = TerminalSettings::load_or_create(&path).await;
        assert!(matches!(
            result,
            Err(SettingsError::Invalid("broker.connect_timeout_ms"))
        ));
    }

    #[test]
    fn durations_never_reach_zero() {
        let mut settings = TerminalSettings::default();
        settings.loop_interval_ms = 0;
        settings.broker.connect_timeout_ms = 0;
        settings.broker.poll_window_ms = 0;

        assert!(settings.validate().is_err());
        assert_eq!(settings.loop_interval(), Duration::from_millis(1));
        assert_eq!(settings.broker.connect_timeout(), Duration::from_millis(1));
        assert_eq!(settings.broker.poll_window(), Duration::from_millis(1));
    }
}
