//! # Persistence Module
//!
//! ## Why This Module Exists
//! The terminal has to survive power loss without re-entering setup. Everything it needs to
//! reach its network and broker lives in one small [`DeviceConfig`] record that is stored in
//! a fixed-layout non-volatile image (see [`config_store`]).
//!
//! ## Key Abstractions
//! - **[`DeviceConfig`]**: the in-memory, authoritative copy of the device identity
//! - **[`ConfigField`]**: the seven persisted fields with their byte capacities
//! - **[`config_store::ConfigStore`]**: validating load/save on top of a storage backend
//! - **[`storage::NvStorage`]**: the EEPROM-like backend (file image or memory)
//!
//! ## Error Handling Strategy
//! Corruption never reaches the caller: an invalid record loads as
//! [`DeviceConfig::factory_default`]. Setters on [`DeviceConfig`] reject values that would not
//! survive a save/load cycle, so the in-memory copy always satisfies the record invariants.

pub mod config_store;
pub mod storage;

use std::fmt;
use thiserror::Error;

pub const DEFAULT_PUBLISH_SUFFIX: &str = "Queue/tel";
pub const DEFAULT_SUBSCRIBE_SUFFIX: &str = "Queue/number";

/// Validation failures for a single configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(ConfigField),

    #[error("{field} is too long ({len} bytes, at most {max})")]
    TooLong {
        field: ConfigField,
        len: usize,
        max: usize,
    },

    #[error("{0} must not contain control characters")]
    ControlCharacter(ConfigField),

    #[error("broker port {0} is outside 1-65535")]
    PortOutOfRange(i64),

    #[error("broker port '{0}' is not a number")]
    PortNotNumeric(String),
}

/// The persisted fields in record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Ssid,
    Passphrase,
    BrokerHost,
    BrokerPort,
    PublishTopic,
    SubscribeTopic,
    DeviceId,
}

impl ConfigField {
    pub const ALL: [ConfigField; 7] = [
        ConfigField::Ssid,
        ConfigField::Passphrase,
        ConfigField::BrokerHost,
        ConfigField::BrokerPort,
        ConfigField::PublishTopic,
        ConfigField::SubscribeTopic,
        ConfigField::DeviceId,
    ];

    /// Byte capacity of the field including its NUL terminator.
    pub fn capacity(self) -> usize {
        match self {
            ConfigField::Ssid => 32,
            ConfigField::Passphrase => 32,
            ConfigField::BrokerHost => 64,
            ConfigField::BrokerPort => 4,
            ConfigField::PublishTopic => 64,
            ConfigField::SubscribeTopic => 64,
            ConfigField::DeviceId => 16,
        }
    }

    /// Longest string the field can hold.
    pub fn max_len(self) -> usize {
        self.capacity() - 1
    }

    pub fn allows_empty(self) -> bool {
        matches!(self, ConfigField::Passphrase)
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConfigField::Ssid => "WiFi SSID",
            ConfigField::Passphrase => "WiFi password",
            ConfigField::BrokerHost => "MQTT server",
            ConfigField::BrokerPort => "MQTT port",
            ConfigField::PublishTopic => "publish topic",
            ConfigField::SubscribeTopic => "subscribe topic",
            ConfigField::DeviceId => "device id",
        };
        write!(f, "{}", name)
    }
}

/// Network and broker identity of the terminal.
///
/// Fields are private so every mutation goes through a validating setter; the string
/// invariants of the persisted record therefore hold for every value of this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    ssid: String,
    passphrase: String,
    broker_host: String,
    broker_port: u16,
    publish_topic: String,
    subscribe_topic: String,
    device_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::factory_default()
    }
}

impl DeviceConfig {
    /// Hard-coded configuration used when the stored record is missing or corrupt.
    pub fn factory_default() -> Self {
        let device_id = "MC0001".to_string();
        Self {
            ssid: "Tenda_992D40".to_string(),
            passphrase: String::new(),
            broker_host: "192.168.0.100".to_string(),
            broker_port: 1883,
            publish_topic: format!("{}/{}", device_id, DEFAULT_PUBLISH_SUFFIX),
            subscribe_topic: format!("{}/{}", device_id, DEFAULT_SUBSCRIBE_SUFFIX),
            device_id,
        }
    }

    /// Builds a config from raw field values, validating each of them.
    pub fn from_parts(
        ssid: &str,
        passphrase: &str,
        broker_host: &str,
        broker_port: i64,
        publish_topic: &str,
        subscribe_topic: &str,
        device_id: &str,
    ) -> Result<Self, ConfigError> {
        let broker_port = check_port(broker_port)?;
        Ok(Self {
            ssid: checked(ConfigField::Ssid, ssid)?,
            passphrase: checked(ConfigField::Passphrase, passphrase)?,
            broker_host: checked(ConfigField::BrokerHost, broker_host)?,
            broker_port,
            publish_topic: checked(ConfigField::PublishTopic, publish_topic)?,
            subscribe_topic: checked(ConfigField::SubscribeTopic, subscribe_topic)?,
            device_id: checked(ConfigField::DeviceId, device_id)?,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Raw passphrase, possibly empty.
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// Passphrase for association; `None` selects an open network.
    pub fn wifi_passphrase(&self) -> Option<&str> {
        if self.passphrase.is_empty() {
            None
        } else {
            Some(&self.passphrase)
        }
    }

    pub fn broker_host(&self) -> &str {
        &self.broker_host
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn publish_topic(&self) -> &str {
        &self.publish_topic
    }

    pub fn subscribe_topic(&self) -> &str {
        &self.subscribe_topic
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn set_ssid(&mut self, ssid: &str) -> Result<(), ConfigError> {
        self.ssid = checked(ConfigField::Ssid, ssid)?;
        Ok(())
    }

    pub fn set_passphrase(&mut self, passphrase: &str) -> Result<(), ConfigError> {
        self.passphrase = checked(ConfigField::Passphrase, passphrase)?;
        Ok(())
    }

    pub fn set_broker_host(&mut self, host: &str) -> Result<(), ConfigError> {
        self.broker_host = checked(ConfigField::BrokerHost, host)?;
        Ok(())
    }

    pub fn set_broker_port(&mut self, port: i64) -> Result<(), ConfigError> {
        self.broker_port = check_port(port)?;
        Ok(())
    }

    /// Parses and sets the port from console text.
    pub fn set_broker_port_text(&mut self, text: &str) -> Result<(), ConfigError> {
        let trimmed = text.trim();
        let port = trimmed
            .parse::<i64>()
            .map_err(|_| ConfigError::PortNotNumeric(trimmed.to_string()))?;
        self.set_broker_port(port)
    }

    /// Sets the publish topic to `{device_id}/{suffix}`.
    pub fn set_publish_suffix(&mut self, suffix: &str) -> Result<(), ConfigError> {
        let topic = format!("{}/{}", self.device_id, suffix.trim_start_matches('/'));
        self.publish_topic = checked(ConfigField::PublishTopic, &topic)?;
        Ok(())
    }

    /// Sets the subscribe topic to `{device_id}/{suffix}`.
    pub fn set_subscribe_suffix(&mut self, suffix: &str) -> Result<(), ConfigError> {
        let topic = format!("{}/{}", self.device_id, suffix.trim_start_matches('/'));
        self.subscribe_topic = checked(ConfigField::SubscribeTopic, &topic)?;
        Ok(())
    }

    /// Changes the device id and rebases both topics onto it.
    ///
    /// Everything after the first `/` of a topic is kept; a topic without a separator is left
    /// untouched. Nothing is changed when any of the three new values is invalid.
    pub fn set_device_id(&mut self, device_id: &str) -> Result<(), ConfigError> {
        let device_id = checked(ConfigField::DeviceId, device_id)?;
        let publish_topic = checked(
            ConfigField::PublishTopic,
            &rebase_topic(&self.publish_topic, &device_id),
        )?;
        let subscribe_topic = checked(
            ConfigField::SubscribeTopic,
            &rebase_topic(&self.subscribe_topic, &device_id),
        )?;

        self.device_id = device_id;
        self.publish_topic = publish_topic;
        self.subscribe_topic = subscribe_topic;
        Ok(())
    }

    /// Multi-line dump for the console.
    pub fn render(&self) -> String {
        format!(
            "SSID: {}\nPassword: {}\nMQTT Server: {}\nMQTT Port: {}\nPublish Topic: {}\nSubscribe Topic: {}\nDevice ID: {}",
            self.ssid,
            self.passphrase,
            self.broker_host,
            self.broker_port,
            self.publish_topic,
            self.subscribe_topic,
            self.device_id
        )
    }
}

/// Replaces the part of `topic` before the first `/` with `device_id`.
pub fn rebase_topic(topic: &str, device_id: &str) -> String {
    match topic.split_once('/') {
        Some((_, suffix)) => format!("{}/{}", device_id, suffix),
        None => topic.to_string(),
    }
}

/// Validates a string field against the record invariants.
pub fn validate_field(field: ConfigField, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() && !field.allows_empty() {
        return Err(ConfigError::Empty(field));
    }
    if value.len() > field.max_len() {
        return Err(ConfigError::TooLong {
            field,
            len: value.len(),
            max: field.max_len(),
        });
    }
    // NUL would truncate the stored value, 0xFF can't appear in UTF-8 anyway
    if value.chars().any(char::is_control) {
        return Err(ConfigError::ControlCharacter(field));
    }
    Ok(())
}

fn checked(field: ConfigField, value: &str) -> Result<String, ConfigError> {
    validate_field(field, value)?;
    Ok(value.to_string())
}

fn check_port(port: i64) -> Result<u16, ConfigError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ConfigError::PortOutOfRange(port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_default_derives_topics_from_device_id() {
        let config = DeviceConfig::factory_default();
        assert_eq!(config.device_id(), "MC0001");
        assert_eq!(config.publish_topic(), "MC0001/Queue/tel");
        assert_eq!(config.subscribe_topic(), "MC0001/Queue/number");
        assert_eq!(config.broker_port(), 1883);
        assert_eq!(config.wifi_passphrase(), None);
    }

    #[test]
    fn device_id_change_rebases_both_topics() {
        let mut config = DeviceConfig::factory_default();
        config.set_device_id("MC0002").unwrap();

        assert_eq!(config.publish_topic(), "MC0002/Queue/tel");
        assert_eq!(config.subscribe_topic(), "MC0002/Queue/number");
    }

    #[test]
    fn device_id_change_keeps_custom_suffix() {
        let mut config = DeviceConfig::factory_default();
        config.set_publish_suffix("queue-trc/number").unwrap();
        config.set_device_id("B7").unwrap();

        assert_eq!(config.publish_topic(), "B7/queue-trc/number");
    }

    #[test]
    fn topic_without_separator_is_left_alone() {
        assert_eq!(rebase_topic("plain", "MC0002"), "plain");
    }

    #[test]
    fn rejected_device_id_leaves_config_untouched() {
        let mut config = DeviceConfig::factory_default();
        let before = config.clone();

        assert!(config.set_device_id("").is_err());
        assert!(config.set_device_id("THIS-ID-IS-TOO-LONG").is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn port_must_be_in_range() {
        let mut config = DeviceConfig::factory_default();
        assert_eq!(
            config.set_broker_port(0),
            Err(ConfigError::PortOutOfRange(0))
        );
        assert_eq!(
            config.set_broker_port(65536),
            Err(ConfigError::PortOutOfRange(65536))
        );
        assert!(config.set_broker_port_text(" 8883 ").is_ok());
        assert_eq!(config.broker_port(), 8883);
        assert!(matches!(
            config.set_broker_port_text("abc"),
            Err(ConfigError::PortNotNumeric(_))
        ));
    }

    #[test]
    fn passphrase_may_be_empty_but_ssid_may_not() {
        let mut config = DeviceConfig::factory_default();
        assert!(config.set_passphrase("").is_ok());
        assert_eq!(config.set_ssid(""), Err(ConfigError::Empty(ConfigField::Ssid)));
    }

    #[test]
    fn string_must_leave_room_for_terminator() {
        let mut config = DeviceConfig::factory_default();
        assert!(config.set_ssid(&"a".repeat(31)).is_ok());
        assert!(matches!(
            config.set_ssid(&"a".repeat(32)),
            Err(ConfigError::TooLong { max: 31, .. })
        ));
    }
}
