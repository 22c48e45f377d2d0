//! # Link Manager
//!
//! ```text
//! Disconnected ──associate──► Connecting ──address──► Connected
//!                                 │  ▲
//!                   timeout (60 s)│  │ failed attempt: associate again
//!                                 ▼  │
//!                             Recovery: SSID → password → save → restart
//! ```
//!
//! Recovery never resumes in-process. Once new credentials are stored the manager asks for a
//! full re-initialisation of the terminal, which starts again from the persisted config.

use super::driver::{LinkDriver, LinkStatus};
use super::ConnectionState;
use crate::console::Console;
use crate::hardware::{Feedback, Screen};
use crate::persistence::config_store::ConfigStore;
use crate::persistence::{validate_field, ConfigField, DeviceConfig};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkRecovery {
    AwaitingSsid,
    AwaitingPassphrase { ssid: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting { since: Instant, last_poll: Instant },
    Connected { address: Option<IpAddr> },
    Recovery(LinkRecovery),
}

/// Result of feeding a console line to the recovery prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryInput {
    /// More input is needed.
    Pending,
    /// New credentials are stored; the terminal must re-initialise.
    RestartRequired,
}

#[derive(Debug)]
pub struct LinkManager {
    phase: Phase,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for LinkManager {
    fn default() -> Self {
        Self::new(POLL_INTERVAL, CONNECT_TIMEOUT)
    }
}

impl LinkManager {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            phase: Phase::Disconnected,
            poll_interval,
            timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting { .. } => ConnectionState::Connecting,
            Phase::Connected { .. } => ConnectionState::Connected,
            Phase::Recovery(_) => ConnectionState::Recovery,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected { .. })
    }

    pub fn recovery(&self) -> Option<&LinkRecovery> {
        match &self.phase {
            Phase::Recovery(step) => Some(step),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<IpAddr> {
        match self.phase {
            Phase::Connected { address } => address,
            _ => None,
        }
    }

    /// Advances the association. Does nothing once connected or while in recovery.
    pub async fn service(
        &mut self,
        config: &DeviceConfig,
        driver: &mut dyn LinkDriver,
        feedback: &mut Feedback,
        console: &mut dyn Console,
        now: Instant,
    ) {
        match self.phase {
            Phase::Connected { .. } | Phase::Recovery(_) => {}
            Phase::Disconnected => {
                info!("Connecting to WiFi '{}'", config.ssid());
                associate(config, driver).await;
                feedback.show(Screen::connecting_wifi());
                self.phase = Phase::Connecting {
                    since: now,
                    last_poll: now,
                };
            }
            Phase::Connecting { since, last_poll } => {
                if now.saturating_duration_since(since) > self.timeout {
                    warn!(
                        "WiFi connection timeout after {:?}, asking for new credentials",
                        self.timeout
                    );
                    console.println("\nWiFi connection timeout. Please re-enter SSID and Password.");
                    console.print("Enter SSID: ");
                    feedback.show(Screen::setup_required("WiFi"));
                    self.phase = Phase::Recovery(LinkRecovery::AwaitingSsid);
                    return;
                }
                if now.saturating_duration_since(last_poll) < self.poll_interval {
                    return;
                }

                self.phase = Phase::Connecting {
                    since,
                    last_poll: now,
                };
                match driver.status().await {
                    LinkStatus::Up(address) => {
                        match address {
                            Some(addr) => info!("WiFi connected, address {}", addr),
                            None => info!("WiFi connected"),
                        }
                        feedback.show(Screen::wifi_connected());
                        self.phase = Phase::Connected { address };
                    }
                    LinkStatus::Associating => {
                        debug!("Still associating with '{}'", config.ssid());
                        feedback.show(Screen::connecting_wifi());
                    }
                    LinkStatus::Failed(reason) => {
                        warn!("Association with '{}' failed: {}", config.ssid(), reason);
                        associate(config, driver).await;
                        feedback.show(Screen::connecting_wifi());
                    }
                    LinkStatus::Down => {
                        debug!("Link down, re-issuing association");
                        associate(config, driver).await;
                    }
                }
            }
        }
    }

    /// Called when a layer above observed that the network is gone.
    pub fn mark_lost(&mut self) {
        if self.is_connected() {
            warn!("WiFi link lost");
            self.phase = Phase::Disconnected;
        }
    }

    /// Feeds one console line to the recovery prompt.
    pub async fn submit_recovery_input(
        &mut self,
        line: &str,
        config: &mut DeviceConfig,
        store: &mut ConfigStore,
        console: &mut dyn Console,
    ) -> RecoveryInput {
        let Phase::Recovery(step) = &self.phase else {
            return RecoveryInput::Pending;
        };

        match step {
            LinkRecovery::AwaitingSsid => {
                let ssid = line.trim();
                if let Err(e) = validate_field(ConfigField::Ssid, ssid) {
                    console.println(&format!("Invalid SSID: {}", e));
                    console.print("Enter SSID: ");
                    return RecoveryInput::Pending;
                }
                self.phase = Phase::Recovery(LinkRecovery::AwaitingPassphrase {
                    ssid: ssid.to_string(),
                });
                console.print("Enter Password (leave blank if none): ");
                RecoveryInput::Pending
            }
            LinkRecovery::AwaitingPassphrase { ssid } => {
                let mut updated = config.clone();
                let applied = updated
                    .set_ssid(ssid)
                    .and_then(|_| updated.set_passphrase(line.trim_end_matches(['\r', '\n'])));
                if let Err(e) = applied {
                    console.println(&format!("Invalid password: {}", e));
                    console.print("Enter Password (leave blank if none): ");
                    return RecoveryInput::Pending;
                }

                *config = updated;
                console.println(&format!("\nCurrent Config:\n{}", config.render()));
                if !store.persist(config).await {
                    error!("New WiFi credentials could not be stored, restart uses previous ones");
                }
                info!("WiFi credentials replaced, restarting");
                RecoveryInput::RestartRequired
            }
        }
    }
}

async fn associate(config: &DeviceConfig, driver: &mut dyn LinkDriver) {
    if let Err(e) = driver
        .associate(config.ssid(), config.wifi_passphrase())
        .await
    {
        warn!("Association request failed: {}", e);
    }
}
