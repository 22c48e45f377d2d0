use crate::persistence::DeviceConfig;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Everything the transport needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl BrokerEndpoint {
    /// The device id doubles as the MQTT client id.
    pub fn from_config(config: &DeviceConfig, keep_alive: Duration) -> Self {
        Self {
            host: config.broker_host().to_string(),
            port: config.broker_port(),
            client_id: config.device_id().to_string(),
            keep_alive,
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.client_id, self.host, self.port)
    }
}
