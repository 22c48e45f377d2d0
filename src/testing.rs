//! In-memory stand-ins for the terminal's peripherals.
//!
//! Every mock is a cheap handle onto shared state, so a test can keep one clone for
//! assertions and box another into the code under test.

use crate::console::Console;
use crate::hardware::{
    Buzzer, ButtonInput, Feedback, HardwareError, Screen, StatusDisplay, Tone,
};
use crate::mqtt::config::BrokerEndpoint;
use crate::mqtt::message_manager::InboundMessage;
use crate::mqtt::transport::{BrokerError, BrokerTransport, TransportEvent};
use crate::network::driver::{LinkDriver, LinkError, LinkStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

pub const MOCK_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 42));

#[derive(Default)]
struct LinkInner {
    up: bool,
    fail_next: Option<String>,
    associations: Vec<(String, Option<String>)>,
}

#[derive(Clone, Default)]
pub struct MockLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl MockLink {
    pub fn set_up(&self, up: bool) {
        self.inner.lock().unwrap().up = up;
    }

    /// The next status poll reports a failed association.
    pub fn fail_next(&self, reason: &str) {
        self.inner.lock().unwrap().fail_next = Some(reason.to_string());
    }

    pub fn associations(&self) -> Vec<(String, Option<String>)> {
        self.inner.lock().unwrap().associations.clone()
    }
}

#[async_trait]
impl LinkDriver for MockLink {
    async fn associate(&mut self, ssid: &str, passphrase: Option<&str>) -> Result<(), LinkError> {
        self.inner
            .lock()
            .unwrap()
            .associations
            .push((ssid.to_string(), passphrase.map(str::to_string)));
        Ok(())
    }

    async fn status(&mut self) -> LinkStatus {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.fail_next.take() {
            LinkStatus::Failed(reason)
        } else if inner.up {
            LinkStatus::Up(Some(MOCK_ADDRESS))
        } else if inner.associations.is_empty() {
            LinkStatus::Down
        } else {
            LinkStatus::Associating
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerCall {
    Connect {
        host: String,
        port: u16,
        client_id: String,
    },
    Subscribe(String),
    Publish(String, String),
    Disconnect,
}

struct BrokerInner {
    reachable: bool,
    connected: bool,
    fail_publishes: bool,
    pending: VecDeque<TransportEvent>,
    calls: Vec<BrokerCall>,
}

/// Broker that accepts connections unless told otherwise.
#[derive(Clone)]
pub struct MockBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BrokerInner {
                reachable: true,
                connected: false,
                fail_publishes: false,
                pending: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }
}

impl MockBroker {
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().unwrap().reachable = reachable;
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publishes = fail;
    }

    pub fn push_inbound(&self, topic: &str, payload: &str) {
        self.inner
            .lock()
            .unwrap()
            .pending
            .push_back(TransportEvent::Inbound(InboundMessage::from_topic(
                topic, payload,
            )));
    }

    /// Kills the session; the next poll reports it.
    pub fn drop_connection(&self, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner
            .pending
            .push_back(TransportEvent::Disconnected(reason.to_string()));
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Payloads of successful publishes, in order.
    pub fn published(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Publish(_, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl BrokerTransport for MockBroker {
    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BrokerCall::Connect {
            host: endpoint.host.clone(),
            port: endpoint.port,
            client_id: endpoint.client_id.clone(),
        });
        if !inner.reachable {
            return Err(BrokerError::Connection("connection refused".into()));
        }
        inner.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(BrokerError::NotConnected);
        }
        inner.calls.push(BrokerCall::Subscribe(topic.to_string()));
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(BrokerError::NotConnected);
        }
        if inner.fail_publishes {
            return Err(BrokerError::Connection("publish rejected".into()));
        }
        inner
            .calls
            .push(BrokerCall::Publish(topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn poll(&mut self) -> Vec<TransportEvent> {
        self.inner.lock().unwrap().pending.drain(..).collect()
    }

    fn disconnect(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.connected {
            inner.connected = false;
            inner.calls.push(BrokerCall::Disconnect);
        }
    }
}

#[derive(Default)]
struct ConsoleInner {
    input: VecDeque<String>,
    output: String,
}

/// Console fed from a script; everything printed is captured.
#[derive(Clone, Default)]
pub struct ScriptedConsole {
    inner: Arc<Mutex<ConsoleInner>>,
}

impl ScriptedConsole {
    pub fn push_line(&self, line: &str) {
        self.inner
            .lock()
            .unwrap()
            .input
            .push_back(line.to_string());
    }

    pub fn output(&self) -> String {
        self.inner.lock().unwrap().output.clone()
    }
}

impl Console for ScriptedConsole {
    fn try_read_line(&mut self) -> Option<String> {
        self.inner.lock().unwrap().input.pop_front()
    }

    fn print(&mut self, text: &str) {
        self.inner.lock().unwrap().output.push_str(text);
    }
}

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    screens: Arc<Mutex<Vec<Screen>>>,
}

impl RecordingDisplay {
    pub fn screens(&self) -> Vec<Screen> {
        self.screens.lock().unwrap().clone()
    }
}

impl StatusDisplay for RecordingDisplay {
    fn show(&mut self, screen: &Screen) {
        self.screens.lock().unwrap().push(screen.clone());
    }
}

#[derive(Default)]
struct BuzzerInner {
    tones: Vec<Tone>,
    sounding: bool,
}

#[derive(Clone, Default)]
pub struct RecordingBuzzer {
    inner: Arc<Mutex<BuzzerInner>>,
}

impl RecordingBuzzer {
    pub fn tones(&self) -> Vec<Tone> {
        self.inner.lock().unwrap().tones.clone()
    }

    pub fn is_sounding(&self) -> bool {
        self.inner.lock().unwrap().sounding
    }
}

impl Buzzer for RecordingBuzzer {
    fn start(&mut self, tone: Tone) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock().unwrap();
        inner.tones.push(tone);
        inner.sounding = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        self.inner.lock().unwrap().sounding = false;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockButton {
    pressed: Arc<Mutex<bool>>,
}

impl MockButton {
    pub fn set_pressed(&self, pressed: bool) {
        *self.pressed.lock().unwrap() = pressed;
    }
}

impl ButtonInput for MockButton {
    fn is_pressed(&mut self) -> bool {
        *self.pressed.lock().unwrap()
    }
}

pub fn test_feedback() -> (Feedback, RecordingDisplay, RecordingBuzzer) {
    let display = RecordingDisplay::default();
    let buzzer = RecordingBuzzer::default();
    let feedback = Feedback::new(Box::new(display.clone()), Box::new(buzzer.clone()));
    (feedback, display, buzzer)
}
