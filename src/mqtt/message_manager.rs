use chrono::NaiveDateTime;
use std::fmt;

/// One not-yet-delivered publish.
///
/// The topic is resolved at delivery time, so a message queued before a re-provisioning is
/// sent to the topic that is current when the broker comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    payload: String,
    created: NaiveDateTime,
}

impl OutboundMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            created: chrono::Local::now().naive_local(),
        }
    }

    /// A ticket request carries the requesting device's id.
    pub fn ticket_request(device_id: &str) -> Self {
        Self::new(device_id)
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {}", self.created.format("%H:%M:%S"), self.payload)
    }
}

/// A message received on the subscribe topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    topic: String,
    payload: String,
    timestamp: NaiveDateTime,
}

impl InboundMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    /// Decodes a raw MQTT payload; invalid UTF-8 is replaced, not rejected.
    pub fn from_bytes(topic: impl Into<String>, payload: &[u8]) -> Self {
        Self::from_topic(topic, String::from_utf8_lossy(payload).into_owned())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// The ticket number announced by the server.
    pub fn ticket(&self) -> TicketNumber {
        parse_ticket_number(&self.payload)
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.timestamp, self.topic, self.payload)
    }
}

/// Result of interpreting an inbound payload as a ticket number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketNumber {
    pub value: i64,
    /// False when the payload had no leading number and `value` is the 0 fallback.
    pub parsed: bool,
}

/// Lenient integer parse: leading whitespace, optional sign, then leading digits.
///
/// Anything after the digits is ignored. A payload without leading digits yields 0 with
/// `parsed == false`; values beyond `i64` saturate.
pub fn parse_ticket_number(payload: &str) -> TicketNumber {
    let text = payload.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        seen = true;
        let digit = i64::from(b - b'0');
        value = value.saturating_mul(10).saturating_add(digit);
    }

    TicketNumber {
        value: if negative { -value } else { value },
        parsed: seen,
    }
}
