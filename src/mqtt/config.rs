use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Topic the hub publishes key/unkey events on
pub const DEFAULT_TOPIC: &str = "emf_hub/ptt";

/// Broker address and credentials.
///
/// `url` is `host` or `host:port`; the port defaults to 1883.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MQTTServer {
    /// Broker address (e.g. "mqtt.example.com:1883")
    pub url: String,
    /// Username, empty for anonymous access
    pub user: String,
    /// Password, ignored when `user` is empty
    pub pw: String,
}

impl Default for MQTTServer {
    fn default() -> Self {
        Self {
            url: "mqtt.emfhams.org:1883".to_string(),
            user: String::new(),
            pw: String::new(),
        }
    }
}

impl MQTTServer {
    /// Splits `url` into host and port.
    pub fn host_port(&self) -> (String, u16) {
        let mut comps = self.url.rsplitn(2, ':');
        let last = comps.next().unwrap_or_default();
        match (comps.next(), last.parse::<u16>()) {
            (Some(host), Ok(port)) => (host.to_string(), port),
            _ => (self.url.clone(), 1883),
        }
    }

    /// Credentials if a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.user.is_empty() {
            None
        } else {
            Some((self.user.as_str(), self.pw.as_str()))
        }
    }
}

impl fmt::Display for MQTTServer {
    /// Formats as "user@url", or just the url for anonymous access.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.user.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{}@{}", self.user, self.url)
        }
    }
}

/// Connection settings for the broker client, as stored in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub topic: String,
    /// Interval between heartbeat pings
    pub heartbeat_secs: u64,
    /// Delay between connection attempts
    pub retry_delay_ms: u64,
    /// How long a network bring-up attempt or a broker handshake step may take
    pub network_timeout_secs: u64,
    /// Pause after a successful connect before the first poll
    pub settle_ms: u64,
    pub server: MQTTServer,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            heartbeat_secs: 60,
            retry_delay_ms: 200,
            network_timeout_secs: 15,
            settle_ms: 1000,
            server: MQTTServer::default(),
        }
    }
}

impl MqttConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
