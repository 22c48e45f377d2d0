//! Broker transport seam.
//!
//! The session state machine drives a [`BrokerTransport`]; the production implementation
//! wraps a `rumqttc` [`AsyncClient`]/[`EventLoop`] pair. Publishing and subscribing only
//! enqueue requests; they reach the wire the next time [`BrokerTransport::poll`] runs the
//! event loop.

use super::config::BrokerEndpoint;
use super::message_manager::InboundMessage;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Capacity of the client request channel.
const REQUEST_CAPACITY: usize = 100;
/// Upper bound of events handled in one poll, so a chatty broker can't starve the loop.
const MAX_EVENTS_PER_POLL: usize = 32;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not connected to a broker")]
    NotConnected,

    #[error("broker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("broker refused the connection: {0}")]
    Refused(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Something the transport observed while polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Inbound(InboundMessage),
    Disconnected(String),
}

#[async_trait]
pub trait BrokerTransport: Send {
    /// Opens a new session, replacing any existing one. Resolves once the broker accepted it.
    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError>;

    /// Services keep-alive and outgoing requests and collects inbound messages.
    async fn poll(&mut self) -> Vec<TransportEvent>;

    fn disconnect(&mut self);
}

struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// MQTT 3.1.1 transport on top of rumqttc.
pub struct RumqttcTransport {
    session: Option<Session>,
    connect_timeout: Duration,
    poll_window: Duration,
}

impl RumqttcTransport {
    pub fn new(connect_timeout: Duration, poll_window: Duration) -> Self {
        Self {
            session: None,
            connect_timeout,
            poll_window,
        }
    }

    fn client(&self) -> Result<&AsyncClient, BrokerError> {
        self.session
            .as_ref()
            .map(|s| &s.client)
            .ok_or(BrokerError::NotConnected)
    }
}

#[async_trait]
impl BrokerTransport for RumqttcTransport {
    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<(), BrokerError> {
        self.disconnect();

        let mut options = MqttOptions::new(
            endpoint.client_id.clone(),
            endpoint.host.clone(),
            endpoint.port,
        );
        options
            .set_keep_alive(endpoint.keep_alive)
            .set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let deadline = tokio::time::Instant::now() + self.connect_timeout;

        loop {
            let event = tokio::time::timeout_at(deadline, eventloop.poll())
                .await
                .map_err(|_| BrokerError::Timeout(self.connect_timeout))?;
            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if !matches!(ack.code, ConnectReturnCode::Success) {
                        return Err(BrokerError::Refused(format!("{:?}", ack.code)));
                    }
                    info!("Connected to MQTT broker {}", endpoint);
                    break;
                }
                Ok(other) => debug!("Event before CONNACK: {:?}", other),
                Err(e) => return Err(BrokerError::Connection(e.to_string())),
            }
        }

        self.session = Some(Session { client, eventloop });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.client()?.try_subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        self.client()?
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())?;
        Ok(())
    }

    async fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let Some(session) = self.session.as_mut() else {
            return events;
        };

        let mut lost = None;
        for _ in 0..MAX_EVENTS_PER_POLL {
            // nothing pending within the window: the event loop is idle
            let Ok(event) = tokio::time::timeout(self.poll_window, session.eventloop.poll()).await
            else {
                break;
            };
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    events.push(TransportEvent::Inbound(InboundMessage::from_bytes(
                        publish.topic,
                        &publish.payload,
                    )));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    lost = Some("broker closed the session".to_string());
                    break;
                }
                Ok(other) => debug!("MQTT event: {:?}", other),
                Err(e) => {
                    lost = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(reason) = lost {
            warn!("MQTT session lost: {}", reason);
            self.session = None;
            events.push(TransportEvent::Disconnected(reason));
        }
        events
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
            }
        }
    }
}
