//! Broker client: connection lifecycle, heartbeat and event decoding.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::MqttConfig;
use super::message_manager::{DecodeError, HubEvent};
use super::transport::{BrokerSession, LinkError, Network};
use crate::clock::Clock;
use crate::ui::{ConnectStage, Display};

/// MQTT PINGREQ, the cheapest packet the broker must answer
pub const PING_REQUEST: [u8; 2] = [0xC0, 0x00];

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Why a poll cycle produced no event.
#[derive(Debug, thiserror::Error)]
pub enum PollDiagnostic {
    #[error("Dropped message on {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: DecodeError,
    },

    #[error("Transport failure, reconnected: {0}")]
    Transport(LinkError),

    #[error("Heartbeat failed, reconnected: {0}")]
    Heartbeat(LinkError),

    #[error("Reconnect abandoned: {0}")]
    Reconnect(LinkError),
}

/// Result of a single [`BrokerClient::poll`].
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub event: Option<HubEvent>,
    pub diagnostic: Option<PollDiagnostic>,
}

/// Fixed delays and limits used by the client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub topic: String,
    pub client_id: String,
    pub heartbeat_interval: Duration,
    pub retry_delay: Duration,
    pub network_timeout: Duration,
    pub settle_delay: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &MqttConfig, client_id: String) -> Self {
        Self {
            topic: config.topic.clone(),
            client_id,
            heartbeat_interval: config.heartbeat_interval(),
            retry_delay: config.retry_delay(),
            network_timeout: config.network_timeout(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Keeps one subscription to the hub topic alive and turns publishes into
/// [`HubEvent`]s.
///
/// Connecting never gives up: network bring-up and the broker handshake are
/// retried with a fixed delay until they succeed. The only way out is the
/// shutdown token.
pub struct BrokerClient<N, B, D, C> {
    state: ConnectionState,
    next_ping: Instant,
    settings: ClientSettings,
    network: N,
    broker: B,
    display: D,
    clock: C,
    shutdown: CancellationToken,
}

impl<N, B, D, C> BrokerClient<N, B, D, C>
where
    N: Network,
    B: BrokerSession,
    D: Display,
    C: Clock,
{
    pub fn new(
        settings: ClientSettings,
        network: N,
        broker: B,
        display: D,
        clock: C,
        shutdown: CancellationToken,
    ) -> Self {
        let next_ping = clock.now() + settings.heartbeat_interval;
        Self {
            state: ConnectionState::Disconnected,
            next_ping,
            settings,
            network,
            broker,
            display,
            clock,
            shutdown,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Brings the network up, opens the broker session and subscribes.
    ///
    /// Blocks until connected or the shutdown token fires.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;

        self.display.draw_connecting(ConnectStage::Network);
        info!("Connecting to network");
        while !self.network.is_connected() {
            self.check_cancelled()?;
            if let Err(e) = self.network.connect(self.settings.network_timeout) {
                debug!("Network not ready: {}", e);
                self.clock.sleep(self.settings.retry_delay);
            }
        }

        self.display.draw_connecting(ConnectStage::Broker);
        loop {
            self.check_cancelled()?;
            info!("Connecting to broker as {}", self.settings.client_id);
            match self.open_session() {
                Ok(()) => break,
                Err(e) => {
                    warn!("Broker connection failed: {}", e);
                    self.clock.sleep(self.settings.retry_delay);
                }
            }
        }

        self.state = ConnectionState::Connected;
        self.clock.sleep(self.settings.settle_delay);
        self.next_ping = self.clock.now() + self.settings.heartbeat_interval;
        Ok(())
    }

    fn open_session(&mut self) -> Result<(), LinkError> {
        self.broker.connect(&self.settings.client_id)?;
        info!("Subscribing to {}", self.settings.topic);
        if let Err(e) = self.broker.subscribe(&self.settings.topic) {
            let _ = self.broker.disconnect();
            return Err(e);
        }
        Ok(())
    }

    fn check_cancelled(&mut self) -> Result<(), LinkError> {
        if self.shutdown.is_cancelled() {
            self.state = ConnectionState::Disconnected;
            return Err(LinkError::Cancelled);
        }
        Ok(())
    }

    /// Drops the broker session and the network, then connects again.
    pub fn reconnect(&mut self) -> Result<(), LinkError> {
        info!("Reconnecting to broker");
        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.broker.disconnect() {
            debug!("Ignoring disconnect failure: {}", e);
        }
        self.network.disconnect();
        self.connect()
    }

    /// Checks for one pending message, then services the heartbeat.
    pub fn poll(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        match self.broker.check_message() {
            Ok(Some(msg)) => {
                debug!("Message received - {}", msg);
                match msg.decode() {
                    Ok(event) => {
                        debug!("Received {:?}", event);
                        outcome.event = Some(event);
                    }
                    Err(source) => {
                        debug!("Dropping message: {}", source);
                        outcome.diagnostic = Some(PollDiagnostic::Decode {
                            topic: msg.topic,
                            source,
                        });
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Transport error while checking messages: {}", e);
                outcome.diagnostic = Some(match self.reconnect() {
                    Ok(()) => PollDiagnostic::Transport(e),
                    Err(abandoned) => PollDiagnostic::Reconnect(abandoned),
                });
                return outcome;
            }
        }

        if let Some(diagnostic) = self.heartbeat() {
            outcome.diagnostic = Some(diagnostic);
        }
        outcome
    }

    fn heartbeat(&mut self) -> Option<PollDiagnostic> {
        if self.clock.now() < self.next_ping {
            return None;
        }

        debug!("Pinging broker");
        self.next_ping = self.clock.now() + self.settings.heartbeat_interval;
        let err = self.broker.send_raw(&PING_REQUEST).err()?;

        warn!("Heartbeat failed: {}", err);
        Some(match self.reconnect() {
            Ok(()) => PollDiagnostic::Heartbeat(err),
            Err(abandoned) => PollDiagnostic::Reconnect(abandoned),
        })
    }

    /// Best-effort disconnect on the way out.
    pub fn shutdown(&mut self) {
        if self.state == ConnectionState::Connected {
            info!("Disconnecting from broker");
            if let Err(e) = self.broker.disconnect() {
                debug!("Ignoring disconnect failure: {}", e);
            }
        }
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        DrawCall, ManualClock, RecordingDisplay, ScriptedBroker, ScriptedNetwork,
    };

    const KEY: &str = r#"{"type":"key","call":"M0ABC","nick":"Alice"}"#;

    type Client = BrokerClient<ScriptedNetwork, ScriptedBroker, RecordingDisplay, ManualClock>;

    fn settings() -> ClientSettings {
        ClientSettings {
            topic: "emf_hub/ptt".to_string(),
            client_id: "hub_mon_abcd".to_string(),
            heartbeat_interval: Duration::from_secs(60),
            retry_delay: Duration::from_millis(200),
            network_timeout: Duration::from_secs(15),
            settle_delay: Duration::from_secs(1),
        }
    }

    fn client(network: ScriptedNetwork, broker: ScriptedBroker) -> (Client, ManualClock, RecordingDisplay) {
        let clock = ManualClock::new();
        let display = RecordingDisplay::default();
        let client = BrokerClient::new(
            settings(),
            network,
            broker,
            display.clone(),
            clock.clone(),
            CancellationToken::new(),
        );
        (client, clock, display)
    }

    #[test]
    fn connect_retries_network_until_up() {
        let network = ScriptedNetwork::failing(3);
        let broker = ScriptedBroker::default();
        let (mut client, clock, display) = client(network.clone(), broker.clone());

        client.connect().unwrap();

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(network.attempts(), 4);
        assert_eq!(broker.subscriptions(), vec!["emf_hub/ptt".to_string()]);
        assert_eq!(broker.client_ids(), vec!["hub_mon_abcd".to_string()]);
        // three retry delays plus the settle delay
        assert_eq!(clock.elapsed(), Duration::from_millis(600) + Duration::from_secs(1));
        assert_eq!(
            display.calls(),
            vec![
                DrawCall::Connecting(ConnectStage::Network),
                DrawCall::Connecting(ConnectStage::Broker)
            ]
        );
    }

    #[test]
    fn connect_retries_broker_until_accepted() {
        let broker = ScriptedBroker::default();
        broker.fail_connects(2);
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker.clone());

        client.connect().unwrap();

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(broker.connect_attempts(), 3);
        assert_eq!(broker.open_sessions(), 1);
    }

    #[test]
    fn connect_stops_on_shutdown() {
        let broker = ScriptedBroker::default();
        broker.fail_connects(usize::MAX);
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker);
        client.shutdown.cancel();

        assert!(matches!(client.connect(), Err(LinkError::Cancelled)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn poll_decodes_key_event() {
        let broker = ScriptedBroker::default();
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker.clone());
        client.connect().unwrap();
        broker.push_message(KEY);

        let outcome = client.poll();

        assert_eq!(
            outcome.event,
            Some(HubEvent::KeyDown {
                call: "M0ABC".to_string(),
                nick: "Alice".to_string()
            })
        );
        assert!(outcome.diagnostic.is_none());
        assert!(client.poll().event.is_none());
    }

    #[test]
    fn poll_drops_malformed_payload() {
        let broker = ScriptedBroker::default();
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker.clone());
        client.connect().unwrap();
        broker.push_message(r#"{"nick":"Bob"}"#);

        let outcome = client.poll();

        assert!(outcome.event.is_none());
        assert!(matches!(
            outcome.diagnostic,
            Some(PollDiagnostic::Decode { .. })
        ));
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[test]
    fn heartbeat_pings_after_interval() {
        let broker = ScriptedBroker::default();
        let (mut client, clock, _display) = client(ScriptedNetwork::up(), broker.clone());
        client.connect().unwrap();

        clock.advance(Duration::from_secs(59));
        client.poll();
        assert!(broker.sent().is_empty());

        clock.advance(Duration::from_secs(1));
        let outcome = client.poll();
        assert!(outcome.diagnostic.is_none());
        assert_eq!(broker.sent(), vec![PING_REQUEST.to_vec()]);

        // deadline pushed forward
        client.poll();
        assert_eq!(broker.sent().len(), 1);
    }

    #[test]
    fn failed_ping_reconnects_once() {
        let network = ScriptedNetwork::up();
        let broker = ScriptedBroker::default();
        let (mut client, clock, _display) = client(network.clone(), broker.clone());
        client.connect().unwrap();
        broker.fail_sends(1);

        clock.advance(Duration::from_secs(60));
        let outcome = client.poll();

        assert!(matches!(
            outcome.diagnostic,
            Some(PollDiagnostic::Heartbeat(_))
        ));
        assert_eq!(broker.connect_attempts(), 2);
        assert_eq!(broker.disconnects(), 1);
        assert_eq!(network.disconnects(), 1);
        assert_eq!(broker.open_sessions(), 1);
        assert_eq!(client.state(), ConnectionState::Connected);

        // decoding resumes on the new session
        broker.push_message(KEY);
        assert!(client.poll().event.is_some());
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[test]
    fn closed_connection_triggers_reconnect() {
        let broker = ScriptedBroker::default();
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker.clone());
        client.connect().unwrap();
        broker.fail_next_check();

        let outcome = client.poll();

        assert!(matches!(
            outcome.diagnostic,
            Some(PollDiagnostic::Transport(LinkError::Closed))
        ));
        assert_eq!(broker.connect_attempts(), 2);
        assert_eq!(broker.open_sessions(), 1);
    }

    #[test]
    fn repeated_reconnects_keep_one_session() {
        let broker = ScriptedBroker::default();
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker.clone());
        client.connect().unwrap();

        for _ in 0..5 {
            client.reconnect().unwrap();
            assert_eq!(broker.open_sessions(), 1);
        }
        assert_eq!(broker.max_open_sessions(), 1);
    }

    #[test]
    fn shutdown_disconnects_session() {
        let broker = ScriptedBroker::default();
        let (mut client, _clock, _display) = client(ScriptedNetwork::up(), broker.clone());
        client.connect().unwrap();

        client.shutdown();

        assert_eq!(broker.open_sessions(), 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
