//! # Config Store
//!
//! Fixed-layout persistence of [`DeviceConfig`].
//!
//! ## Record Layout
//!
//! ```text
//! offset  width  field
//! ------  -----  ---------------
//!      0     32  WiFi SSID
//!     32     32  WiFi password
//!     64     64  MQTT server
//!    128      4  MQTT port (i32, little endian)
//!    132     64  publish topic
//!    196     64  subscribe topic
//!    260     16  device id
//!    276     16  reserved
//! ------
//!    292
//! ```
//!
//! Offsets never move. New fields may only be appended in the reserved tail, otherwise
//! records written by older firmware would silently lose values on load.
//!
//! Strings are NUL terminated inside their slot and the remainder of the slot is zeroed on
//! save. A record is rejected as a whole when any field fails validation; the store then
//! hands out [`DeviceConfig::factory_default`] instead.

use super::storage::{NvStorage, StoreError, ERASED_BYTE};
use super::{validate_field, ConfigField, DeviceConfig};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const RECORD_SIZE: usize = 292;

/// Why a stored record was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("{0} slot is erased")]
    Erased(ConfigField),

    #[error("{0} slot has no terminator")]
    Unterminated(ConfigField),

    #[error("{0} slot is not valid UTF-8")]
    NotUtf8(ConfigField),

    #[error("{0}")]
    Invalid(#[from] super::ConfigError),

    #[error("record image is {0} bytes, expected {RECORD_SIZE}")]
    Truncated(usize),
}

impl ConfigField {
    /// Byte offset of the field inside the record.
    pub fn offset(self) -> usize {
        match self {
            ConfigField::Ssid => 0,
            ConfigField::Passphrase => 32,
            ConfigField::BrokerHost => 64,
            ConfigField::BrokerPort => 128,
            ConfigField::PublishTopic => 132,
            ConfigField::SubscribeTopic => 196,
            ConfigField::DeviceId => 260,
        }
    }

    fn slot(self, image: &[u8]) -> &[u8] {
        &image[self.offset()..self.offset() + self.capacity()]
    }
}

/// Validating load/save of the device record.
pub struct ConfigStore {
    storage: Box<dyn NvStorage>,
}

impl ConfigStore {
    pub fn new(storage: Box<dyn NvStorage>) -> Self {
        if storage.size() < RECORD_SIZE {
            warn!(
                "Storage holds {} bytes, record needs {}; every load will use defaults",
                storage.size(),
                RECORD_SIZE
            );
        }
        Self { storage }
    }

    pub fn storage(&self) -> &dyn NvStorage {
        self.storage.as_ref()
    }

    /// Loads the stored config, falling back to the factory default on any corruption.
    pub fn load(&self) -> DeviceConfig {
        debug!(
            "Stored device id raw: {:02X?}",
            self.storage
                .image()
                .get(ConfigField::DeviceId.offset()..RECORD_SIZE.min(self.storage.size()))
                .unwrap_or_default()
        );

        match decode(self.storage.image()) {
            Ok(config) => {
                info!("Loaded config for device {}", config.device_id());
                config
            }
            Err(e) => {
                warn!("Invalid stored config ({}), using default values", e);
                DeviceConfig::factory_default()
            }
        }
    }

    /// Writes every field at its fixed offset and commits.
    ///
    /// The caller's in-memory config stays authoritative when this fails.
    pub async fn save(&mut self, config: &DeviceConfig) -> Result<(), StoreError> {
        info!("Saving config for device {}", config.device_id());

        for field in ConfigField::ALL {
            let slot = encode_field(config, field);
            self.storage.write(field.offset(), &slot)?;
        }

        self.storage.commit().await?;
        info!("Config saved successfully");
        Ok(())
    }

    /// [`save`](Self::save) for callers that only need to report the outcome.
    pub async fn persist(&mut self, config: &DeviceConfig) -> bool {
        match self.save(config).await {
            Ok(()) => true,
            Err(e) => {
                error!("Config commit failed, keeping in-memory values: {}", e);
                false
            }
        }
    }
}

fn encode_field(config: &DeviceConfig, field: ConfigField) -> Vec<u8> {
    let mut slot = vec![0u8; field.capacity()];
    let text = match field {
        ConfigField::BrokerPort => {
            slot.copy_from_slice(&i32::from(config.broker_port()).to_le_bytes());
            return slot;
        }
        ConfigField::Ssid => config.ssid(),
        ConfigField::Passphrase => config.passphrase(),
        ConfigField::BrokerHost => config.broker_host(),
        ConfigField::PublishTopic => config.publish_topic(),
        ConfigField::SubscribeTopic => config.subscribe_topic(),
        ConfigField::DeviceId => config.device_id(),
    };
    // setters keep text within max_len, so the terminator always fits
    let bytes = text.as_bytes();
    let n = bytes.len().min(field.max_len());
    slot[..n].copy_from_slice(&bytes[..n]);
    slot
}

/// Decodes and validates a record image.
pub fn decode(image: &[u8]) -> Result<DeviceConfig, RecordError> {
    if image.len() < RECORD_SIZE {
        return Err(RecordError::Truncated(image.len()));
    }

    let port_slot = ConfigField::BrokerPort.slot(image);
    let port = i32::from_le_bytes([port_slot[0], port_slot[1], port_slot[2], port_slot[3]]);

    let config = DeviceConfig::from_parts(
        read_text(image, ConfigField::Ssid)?,
        read_text(image, ConfigField::Passphrase)?,
        read_text(image, ConfigField::BrokerHost)?,
        i64::from(port),
        read_text(image, ConfigField::PublishTopic)?,
        read_text(image, ConfigField::SubscribeTopic)?,
        read_text(image, ConfigField::DeviceId)?,
    )?;
    Ok(config)
}

fn read_text(image: &[u8], field: ConfigField) -> Result<&str, RecordError> {
    let slot = field.slot(image);
    if slot[0] == ERASED_BYTE {
        return Err(RecordError::Erased(field));
    }
    let end = slot
        .iter()
        .position(|b| *b == 0)
        .ok_or(RecordError::Unterminated(field))?;
    let text = std::str::from_utf8(&slot[..end]).map_err(|_| RecordError::NotUtf8(field))?;
    validate_field(field, text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::storage::{FileStorage, MemoryStorage};

    fn custom_config() -> DeviceConfig {
        let mut config = DeviceConfig::from_parts(
            "HomeNet",
            "s3cret-pass",
            "broker.local",
            8883,
            "MC0001/queue-trc/number",
            "MC0001/queue-trc/call",
            "MC0001",
        )
        .unwrap();
        config.set_device_id("K9").unwrap();
        config
    }

    fn image_of(config: &DeviceConfig) -> Vec<u8> {
        let mut image = vec![ERASED_BYTE; RECORD_SIZE];
        for field in ConfigField::ALL {
            let slot = encode_field(config, field);
            image[field.offset()..field.offset() + slot.len()].copy_from_slice(&slot);
        }
        image
    }

    fn store_with(image: Vec<u8>) -> ConfigStore {
        ConfigStore::new(Box::new(MemoryStorage::from_image(image)))
    }

    #[test]
    fn erased_storage_loads_defaults() {
        let store = ConfigStore::new(Box::new(MemoryStorage::erased(RECORD_SIZE)));
        assert_eq!(store.load(), DeviceConfig::factory_default());
    }

    #[tokio::test]
    async fn save_then_load_returns_identical_fields() {
        let config = custom_config();
        let mut store = ConfigStore::new(Box::new(MemoryStorage::erased(RECORD_SIZE)));
        store.save(&config).await.unwrap();
        assert_eq!(store.storage().image(), image_of(&config).as_slice());

        let loaded = store.load();
        assert_eq!(loaded, config);
        assert_eq!(loaded.publish_topic(), "K9/queue-trc/number");
    }

    #[test]
    fn longest_values_round_trip() {
        let config = DeviceConfig::from_parts(
            &"s".repeat(31),
            &"p".repeat(31),
            &"h".repeat(63),
            65535,
            &"t".repeat(63),
            &"u".repeat(63),
            &"d".repeat(15),
        )
        .unwrap();
        assert_eq!(store_with(image_of(&config)).load(), config);
    }

    #[test]
    fn fields_land_at_fixed_offsets() {
        let image = image_of(&custom_config());

        assert_eq!(image.len(), RECORD_SIZE);
        assert_eq!(&image[0..8], b"HomeNet\0");
        assert_eq!(&image[32..44], b"s3cret-pass\0");
        assert_eq!(&image[64..77], b"broker.local\0");
        assert_eq!(&image[128..132], &8883i32.to_le_bytes());
        assert_eq!(&image[132..135], b"K9/");
        assert_eq!(&image[196..199], b"K9/");
        assert_eq!(&image[260..263], b"K9\0");
        // slots are zero filled after the terminator
        assert!(image[8..32].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_ssid_loads_defaults() {
        let mut image = image_of(&custom_config());
        image[0] = 0;
        assert_eq!(
            decode(&image),
            Err(RecordError::Invalid(crate::persistence::ConfigError::Empty(
                ConfigField::Ssid
            )))
        );
        assert_eq!(store_with(image).load(), DeviceConfig::factory_default());
    }

    #[test]
    fn out_of_range_port_loads_defaults() {
        for port in [0i32, -1, 65536, i32::MAX] {
            let mut image = image_of(&custom_config());
            image[128..132].copy_from_slice(&port.to_le_bytes());
            assert_eq!(store_with(image).load(), DeviceConfig::factory_default());
        }
    }

    #[test]
    fn oversized_string_loads_defaults() {
        let mut image = image_of(&custom_config());
        image[64..128].fill(b'h');
        assert_eq!(
            decode(&image),
            Err(RecordError::Unterminated(ConfigField::BrokerHost))
        );
        assert_eq!(store_with(image).load(), DeviceConfig::factory_default());
    }

    #[test]
    fn erased_sentinel_in_any_string_loads_defaults() {
        for field in ConfigField::ALL {
            if field == ConfigField::BrokerPort {
                continue;
            }
            let mut image = image_of(&custom_config());
            image[field.offset()] = ERASED_BYTE;
            assert_eq!(decode(&image), Err(RecordError::Erased(field)));
        }
    }

    #[test]
    fn empty_passphrase_is_valid() {
        let mut config = custom_config();
        config.set_passphrase("").unwrap();
        assert_eq!(store_with(image_of(&config)).load(), config);
    }

    #[test]
    fn invalid_utf8_loads_defaults() {
        let mut image = image_of(&custom_config());
        image[260] = 0xC3;
        image[261] = 0x28;
        assert_eq!(decode(&image), Err(RecordError::NotUtf8(ConfigField::DeviceId)));
    }

    #[tokio::test]
    async fn saved_record_survives_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.eeprom");
        let config = custom_config();

        let storage = FileStorage::open(&path, RECORD_SIZE).await.unwrap();
        let mut store = ConfigStore::new(Box::new(storage));
        assert!(store.persist(&config).await);

        let reopened = FileStorage::open(&path, RECORD_SIZE).await.unwrap();
        assert_eq!(ConfigStore::new(Box::new(reopened)).load(), config);
    }

    #[tokio::test]
    async fn commit_failure_is_reported_but_not_fatal() {
        let mut store = ConfigStore::new(Box::new(
            MemoryStorage::erased(RECORD_SIZE).fail_commits(),
        ));
        let config = custom_config();

        assert!(matches!(
            store.save(&config).await,
            Err(StoreError::CommitFailed(_))
        ));
        assert!(!store.persist(&config).await);
    }
}
