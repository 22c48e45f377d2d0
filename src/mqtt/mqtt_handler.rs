//! # Broker Session
//!
//! ```text
//! Disconnected ──attempt──► Connected ──session lost──► Disconnected
//!      │                        ▲
//!      │ attempt failed         │ connect ok
//!      ▼                        │
//!  Connecting ──────────────────┘
//!      │  failed attempts are counted and retried next tick
//!      │
//!      └── no session for 30 s ──► Recovery: host → port → save → Disconnected
//! ```
//!
//! The session is only serviced while the WiFi link is up. The 30 s window opens with the
//! first attempt made on a live link; losing the link closes it again, so time spent without
//! WiFi never counts against the broker. Recovery replaces the broker endpoint in place and
//! restarts the connect window; the terminal keeps running.

use super::backlog::OutboundBacklog;
use super::config::{BrokerEndpoint, DEFAULT_KEEP_ALIVE};
use super::message_manager::{InboundMessage, OutboundMessage, TicketNumber};
use super::transport::{BrokerTransport, TransportEvent};
use crate::console::Console;
use crate::hardware::{Feedback, Screen, Tone};
use crate::network::ConnectionState;
use crate::persistence::config_store::ConfigStore;
use crate::persistence::{validate_field, ConfigField, DeviceConfig};
use crate::request::RequestMachine;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const CONNECT_WINDOW: Duration = Duration::from_secs(30);
/// How long an assigned number stays on screen before the idle screen returns.
pub const TICKET_HOLD: Duration = Duration::from_secs(5);

const HOST_PROMPT: &str = "Enter MQTT Server: ";
const PORT_PROMPT: &str = "Enter MQTT Port: ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerRecovery {
    AwaitingHost,
    AwaitingPort { host: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    /// No attempt made yet on the current link.
    Disconnected,
    /// At least one attempt failed since `since`.
    Connecting { since: Instant },
    Connected,
    Recovery(BrokerRecovery),
}

/// What happened during one [`BrokerSession::service`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub inbound: Vec<InboundMessage>,
    pub connected_now: bool,
    pub connection_lost: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

#[derive(Debug)]
pub struct BrokerSession {
    phase: Phase,
    failures: u32,
    connect_window: Duration,
    keep_alive: Duration,
}

impl Default for BrokerSession {
    fn default() -> Self {
        Self::new(CONNECT_WINDOW, DEFAULT_KEEP_ALIVE)
    }
}

impl BrokerSession {
    pub fn new(connect_window: Duration, keep_alive: Duration) -> Self {
        Self {
            phase: Phase::Disconnected,
            failures: 0,
            connect_window,
            keep_alive,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting { .. } => ConnectionState::Connecting,
            Phase::Connected => ConnectionState::Connected,
            Phase::Recovery(_) => ConnectionState::Recovery,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    pub fn in_recovery(&self) -> bool {
        matches!(self.phase, Phase::Recovery(_))
    }

    pub fn recovery(&self) -> Option<&BrokerRecovery> {
        match &self.phase {
            Phase::Recovery(step) => Some(step),
            _ => None,
        }
    }

    /// Failed connect attempts since boot.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Called on every pass where the WiFi link is not up. A pending connect window is
    /// dropped so the next attempt on a live link starts a fresh one.
    pub fn link_down(&mut self) {
        if matches!(self.phase, Phase::Connecting { .. }) {
            debug!("WiFi down, broker connect window reset");
            self.phase = Phase::Disconnected;
        }
    }

    /// Connects, or polls the live session. Call only while the WiFi link is up.
    ///
    /// A fresh session subscribes to the answer topic before the backlog is replayed.
    #[allow(clippy::too_many_arguments)]
    pub async fn service(
        &mut self,
        config: &DeviceConfig,
        transport: &mut dyn BrokerTransport,
        backlog: &mut OutboundBacklog,
        feedback: &mut Feedback,
        console: &mut dyn Console,
        link_address: Option<IpAddr>,
        now: Instant,
    ) -> SessionReport {
        let mut report = SessionReport::default();

        match self.phase {
            Phase::Recovery(_) => {}
            Phase::Connected => {
                for event in transport.poll().await {
                    match event {
                        TransportEvent::Inbound(msg) => {
                            debug!("Received {}", msg);
                            report.inbound.push(msg);
                        }
                        TransportEvent::Disconnected(reason) => {
                            warn!("MQTT connection lost: {}", reason);
                            report.connection_lost = true;
                        }
                    }
                }
                if report.connection_lost || !transport.is_connected() {
                    report.connection_lost = true;
                    self.phase = Phase::Disconnected;
                }
            }
            Phase::Disconnected | Phase::Connecting { .. } => {
                let window_start = match self.phase {
                    Phase::Connecting { since } => since,
                    _ => now,
                };
                if now.saturating_duration_since(window_start) > self.connect_window {
                    warn!(
                        "No MQTT session for {:?}, asking for a new broker",
                        self.connect_window
                    );
                    console.println(
                        "\nMQTT connection timeout. Please re-enter MQTT Server and Port.",
                    );
                    console.print(HOST_PROMPT);
                    feedback.show(Screen::setup_required("MQTT"));
                    self.phase = Phase::Recovery(BrokerRecovery::AwaitingHost);
                    return report;
                }

                let endpoint = BrokerEndpoint::from_config(config, self.keep_alive);
                match transport.connect(&endpoint).await {
                    Ok(()) => {
                        self.phase = Phase::Connected;
                        report.connected_now = true;
                        self.on_connected(config, transport, backlog);

                        let link = link_address
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|| config.ssid().to_string());
                        feedback.show(Screen::broker_connected(&link, &endpoint.host));
                    }
                    Err(e) => {
                        self.failures = self.failures.saturating_add(1);
                        warn!(
                            "MQTT connect to {} failed ({} so far): {}",
                            endpoint, self.failures, e
                        );
                        feedback.show(Screen::broker_failed(self.failures));
                        self.phase = Phase::Connecting {
                            since: window_start,
                        };
                    }
                }
            }
        }

        report
    }

    fn on_connected(
        &self,
        config: &DeviceConfig,
        transport: &mut dyn BrokerTransport,
        backlog: &mut OutboundBacklog,
    ) {
        match transport.subscribe(config.subscribe_topic()) {
            Ok(()) => info!("Subscribed to {}", config.subscribe_topic()),
            Err(e) => error!("Subscribe to {} failed: {}", config.subscribe_topic(), e),
        }

        if backlog.is_empty() {
            return;
        }
        let topic = config.publish_topic();
        let report = backlog.drain_all(|msg| transport.publish(topic, msg.payload()));
        info!(
            "Backlog replayed: {} delivered, {} dropped",
            report.delivered, report.dropped
        );
    }

    /// Sends `msg` right away when connected, otherwise keeps it for replay.
    pub fn submit(
        &self,
        msg: OutboundMessage,
        config: &DeviceConfig,
        transport: &mut dyn BrokerTransport,
        backlog: &mut OutboundBacklog,
    ) -> Delivery {
        if self.is_connected() {
            match transport.publish(config.publish_topic(), msg.payload()) {
                Ok(()) => {
                    info!("Sent {}", msg);
                    return Delivery::Sent;
                }
                Err(e) => warn!("Publish failed, keeping message for replay: {}", e),
            }
        } else {
            info!("MQTT Offline, saved message.");
        }

        backlog.push(msg);
        Delivery::Queued
    }

    /// Feeds one console line to the recovery prompt. Returns true once a new endpoint is
    /// in place.
    pub async fn submit_recovery_input(
        &mut self,
        line: &str,
        config: &mut DeviceConfig,
        store: &mut ConfigStore,
        console: &mut dyn Console,
    ) -> bool {
        let Phase::Recovery(step) = &self.phase else {
            return false;
        };

        match step {
            BrokerRecovery::AwaitingHost => {
                let host = line.trim();
                if let Err(e) = validate_field(ConfigField::BrokerHost, host) {
                    console.println(&format!("Invalid server: {}", e));
                    console.print(HOST_PROMPT);
                    return false;
                }
                self.phase = Phase::Recovery(BrokerRecovery::AwaitingPort {
                    host: host.to_string(),
                });
                console.print(PORT_PROMPT);
                false
            }
            BrokerRecovery::AwaitingPort { host } => {
                let mut updated = config.clone();
                let applied = updated
                    .set_broker_host(host)
                    .and_then(|_| updated.set_broker_port_text(line.trim()));
                if let Err(e) = applied {
                    console.println(&format!("Invalid port: {}", e));
                    console.print(PORT_PROMPT);
                    return false;
                }

                *config = updated;
                console.println(&format!("\nCurrent Config:\n{}", config.render()));
                if !store.persist(config).await {
                    error!("New broker endpoint could not be stored, using it for this session only");
                }
                info!(
                    "Broker endpoint replaced with {}:{}",
                    config.broker_host(),
                    config.broker_port()
                );
                self.phase = Phase::Disconnected;
                true
            }
        }
    }
}

/// Applies a server answer: the pending request completes and the number is announced.
pub fn handle_inbound(
    msg: &InboundMessage,
    request: &mut RequestMachine,
    feedback: &mut Feedback,
    now: Instant,
) -> TicketNumber {
    let ticket = msg.ticket();
    if !ticket.parsed {
        warn!(
            "Payload '{}' on {} is not a number, treating as 0",
            msg.payload(),
            msg.topic()
        );
    }
    info!("Queue number {}", ticket.value);

    if !request.complete() {
        debug!("Answer arrived without a pending request");
    }
    feedback.beep(Tone::TICKET, now);
    feedback.show_then(
        Screen::ticket(ticket.value),
        TICKET_HOLD,
        Screen::current(ticket.value),
        now,
    );
    ticket
}
