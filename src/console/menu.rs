//! Interactive configuration menu.
//!
//! ```text
//! ==== QUEUE TERMINAL CONFIG MENU ====
//! 1. Set WiFi SSID          5. Set MQTT Publish Topic
//! 2. Set WiFi Password      6. Set MQTT Subscribe Topic
//! 3. Set MQTT Server        9. Set Device ID
//! 4. Set MQTT Port          7. Show Current Config
//!                           8. Save Config
//!                           0. Exit Menu
//! ```
//!
//! Selecting a field command arms a prompt; the next console line is the value. Accepted
//! values are persisted right away, rejected ones leave the config unchanged.

use super::Console;
use crate::persistence::config_store::ConfigStore;
use crate::persistence::{ConfigError, DeviceConfig};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuField {
    Ssid,
    Passphrase,
    BrokerHost,
    BrokerPort,
    PublishSuffix,
    SubscribeSuffix,
    DeviceId,
}

impl MenuField {
    fn prompt(self) -> &'static str {
        match self {
            MenuField::Ssid => "Enter SSID: ",
            MenuField::Passphrase => "Enter Password (leave blank if none): ",
            MenuField::BrokerHost => "Enter MQTT Server: ",
            MenuField::BrokerPort => "Enter MQTT Port: ",
            MenuField::PublishSuffix => "Enter Publish Topic (e.g., queue-trc/number): ",
            MenuField::SubscribeSuffix => "Enter Subscribe Topic (e.g., queue-trc/call): ",
            MenuField::DeviceId => "Enter Device ID: ",
        }
    }

    fn apply(self, config: &mut DeviceConfig, value: &str) -> Result<(), ConfigError> {
        match self {
            MenuField::Ssid => config.set_ssid(value.trim()),
            // surrounding spaces can be part of a passphrase
            MenuField::Passphrase => config.set_passphrase(value.trim_end_matches(['\r', '\n'])),
            MenuField::BrokerHost => config.set_broker_host(value.trim()),
            MenuField::BrokerPort => config.set_broker_port_text(value),
            MenuField::PublishSuffix => config.set_publish_suffix(value.trim()),
            MenuField::SubscribeSuffix => config.set_subscribe_suffix(value.trim()),
            MenuField::DeviceId => config.set_device_id(value.trim()),
        }
    }
}

/// What a console line did to the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// A value prompt is now waiting for input.
    Prompting(MenuField),
    /// The config was changed and persisted (`saved == false` when the commit failed).
    Updated { field: MenuField, saved: bool },
    Rejected(MenuField),
    Printed,
    Saved(bool),
    Exited,
    Invalid,
    Ignored,
}

#[derive(Debug, Default)]
pub struct ConfigMenu {
    pending: Option<MenuField>,
}

impl ConfigMenu {
    pub fn pending(&self) -> Option<MenuField> {
        self.pending
    }

    pub fn show(&self, config: &DeviceConfig, console: &mut dyn Console) {
        let menu = format!(
            "==== QUEUE TERMINAL CONFIG MENU ====\n\
             1. Set WiFi SSID : {}\n\
             2. Set WiFi Password : {}\n\
             3. Set MQTT Server : {}\n\
             4. Set MQTT Port : {}\n\
             5. Set MQTT Publish Topic : {}\n\
             6. Set MQTT Subscribe Topic : {}\n\
             9. Set Device ID : {}\n\
             7. Show Current Config\n\
             8. Save Config\n\
             0. Exit Menu\n\
             Choose: ",
            config.ssid(),
            config.passphrase(),
            config.broker_host(),
            config.broker_port(),
            config.publish_topic(),
            config.subscribe_topic(),
            config.device_id()
        );
        console.print(&menu);
    }

    pub async fn handle_line(
        &mut self,
        line: &str,
        config: &mut DeviceConfig,
        store: &mut ConfigStore,
        console: &mut dyn Console,
    ) -> MenuOutcome {
        if let Some(field) = self.pending.take() {
            let outcome = match field.apply(config, line) {
                Ok(()) => {
                    info!("{:?} updated from console", field);
                    MenuOutcome::Updated {
                        field,
                        saved: store.persist(config).await,
                    }
                }
                Err(e) => {
                    warn!("Rejected console input for {:?}: {}", field, e);
                    console.println(&format!("Invalid value: {}", e));
                    MenuOutcome::Rejected(field)
                }
            };
            self.show(config, console);
            return outcome;
        }

        let command = line.trim();
        if command.is_empty() {
            return MenuOutcome::Ignored;
        }

        let field = match command {
            "1" => MenuField::Ssid,
            "2" => MenuField::Passphrase,
            "3" => MenuField::BrokerHost,
            "4" => MenuField::BrokerPort,
            "5" => MenuField::PublishSuffix,
            "6" => MenuField::SubscribeSuffix,
            "9" => MenuField::DeviceId,
            "7" => {
                console.println(&format!("\nCurrent Config:\n{}", config.render()));
                self.show(config, console);
                return MenuOutcome::Printed;
            }
            "8" => {
                let saved = store.persist(config).await;
                console.println(if saved {
                    "Config saved"
                } else {
                    "Config commit failed, changes kept until restart"
                });
                self.show(config, console);
                return MenuOutcome::Saved(saved);
            }
            "0" => {
                console.println("Exit menu.");
                return MenuOutcome::Exited;
            }
            _ => {
                console.println("Invalid choice");
                self.show(config, console);
                return MenuOutcome::Invalid;
            }
        };

        console.print(field.prompt());
        self.pending = Some(field);
        MenuOutcome::Prompting(field)
    }
}
