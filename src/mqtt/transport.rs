//! Network and broker collaborators used by the broker client.
//!
//! The client only talks to the [`Network`] and [`BrokerSession`] traits. The
//! host implementations here are [`HostNetwork`], which checks that the broker
//! is routable, and [`TcpBroker`], a blocking MQTT 3.1.1 session over a
//! `TcpStream` that uses `rumqttc`'s packet codec.

use bytes::BytesMut;
use rumqttc::mqttbytes::v4::{self, Connect, ConnectReturnCode, Packet, Subscribe};
use rumqttc::mqttbytes::{Error as MqttError, QoS};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::MQTTServer;
use super::message_manager::MQTTMessage;

/// Largest packet accepted from the broker
const MAX_PACKET_SIZE: usize = 64 * 1024;

/// MQTT DISCONNECT
const DISCONNECT: [u8; 2] = [0xE0, 0x00];

/// Errors reported by the network layer or the broker session
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Network unavailable: {0}")]
    NetworkDown(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] MqttError),

    #[error("Broker refused connection: {0}")]
    Refused(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("No open broker session")]
    NotConnected,

    #[error("Broker closed the connection")]
    Closed,

    #[error("Connection attempt cancelled")]
    Cancelled,
}

/// Device network layer (WiFi on the badge, routing on a host).
pub trait Network {
    fn is_connected(&self) -> bool;

    /// Tries once to bring the network up.
    fn connect(&mut self, timeout: Duration) -> Result<(), LinkError>;

    fn disconnect(&mut self);
}

/// A single broker session.
pub trait BrokerSession {
    /// Opens the session, replacing any session that is still open.
    fn connect(&mut self, client_id: &str) -> Result<(), LinkError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError>;

    /// Returns one pending publish without blocking.
    fn check_message(&mut self) -> Result<Option<MQTTMessage>, LinkError>;

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    fn disconnect(&mut self) -> Result<(), LinkError>;
}

/// Resolves `host:port` to its first address, giving up after `timeout`.
///
/// A lookup still running at the timeout finishes on its own thread and is
/// discarded.
fn resolve(host: &str, port: u16, timeout: Duration) -> Result<SocketAddr, LinkError> {
    let (tx, rx) = mpsc::channel();
    let target = (host.to_string(), port);
    thread::Builder::new()
        .name("resolver".to_string())
        .spawn(move || {
            let _ = tx.send(target.to_socket_addrs().map(|mut addrs| addrs.next()));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(Some(addr))) => Ok(addr),
        Ok(Ok(None)) => Err(LinkError::NetworkDown(format!("no address for {}", host))),
        Ok(Err(e)) => Err(LinkError::NetworkDown(format!("resolving {}: {}", host, e))),
        Err(_) => Err(LinkError::Timeout("name resolution")),
    }
}

/// Host network check: the broker resolves within the attempt timeout and a
/// route to it exists.
#[derive(Debug)]
pub struct HostNetwork {
    host: String,
    port: u16,
    route: Option<SocketAddr>,
}

impl HostNetwork {
    pub fn new(server: &MQTTServer) -> Self {
        let (host, port) = server.host_port();
        Self {
            host,
            port,
            route: None,
        }
    }
}

impl Network for HostNetwork {
    fn is_connected(&self) -> bool {
        self.route.is_some()
    }

    fn connect(&mut self, timeout: Duration) -> Result<(), LinkError> {
        let addr = resolve(&self.host, self.port, timeout)?;

        // UDP connect only selects a route, nothing is sent
        let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)?;
        socket
            .connect(addr)
            .map_err(|e| LinkError::NetworkDown(format!("no route to {}: {}", addr, e)))?;

        debug!("Network route to {} available", addr);
        self.route = Some(addr);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.route = None;
    }
}

/// Blocking MQTT 3.1.1 session over TCP.
///
/// The handshake (CONNECT/CONNACK, SUBSCRIBE/SUBACK) runs in blocking mode
/// with `io_timeout`; once subscribed the socket is switched to non-blocking
/// so [`BrokerSession::check_message`] never stalls the poll loop.
pub struct TcpBroker {
    server: MQTTServer,
    keep_alive: u16,
    io_timeout: Duration,
    stream: Option<TcpStream>,
    read_buf: BytesMut,
    next_pkid: u16,
}

impl TcpBroker {
    pub fn new(server: MQTTServer, keep_alive: Duration, io_timeout: Duration) -> Self {
        Self {
            server,
            keep_alive: keep_alive.as_secs().min(u64::from(u16::MAX)) as u16,
            io_timeout,
            stream: None,
            read_buf: BytesMut::with_capacity(4096),
            next_pkid: 1,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, LinkError> {
        self.stream.as_mut().ok_or(LinkError::NotConnected)
    }

    fn pkid(&mut self) -> u16 {
        let pkid = self.next_pkid;
        self.next_pkid = self.next_pkid.checked_add(1).unwrap_or(1);
        pkid
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.read_buf.clear();
    }

    /// Parses one packet from the buffer, reading from the socket at most once.
    /// `Ok(None)` means no complete packet is available yet.
    fn read_packet(&mut self) -> Result<Option<Packet>, LinkError> {
        loop {
            match v4::read(&mut self.read_buf, MAX_PACKET_SIZE) {
                Ok(packet) => return Ok(Some(packet)),
                Err(MqttError::InsufficientBytes(_)) => {}
                Err(e) => return Err(LinkError::Protocol(e)),
            }

            let mut chunk = [0u8; 4096];
            let stream = self.stream()?;
            match stream.read(&mut chunk) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
    }

    /// Blocks until a packet arrives or `deadline` passes.
    fn expect_packet(
        &mut self,
        what: &'static str,
        deadline: Instant,
    ) -> Result<Packet, LinkError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout(what));
            }
            self.stream()?.set_read_timeout(Some(remaining))?;
            if let Some(packet) = self.read_packet()? {
                return Ok(packet);
            }
        }
    }

    fn open(&mut self, client_id: &str) -> Result<(), LinkError> {
        let (host, port) = self.server.host_port();
        let addr = resolve(&host, port, self.io_timeout)?;

        let stream = TcpStream::connect_timeout(&addr, self.io_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        self.stream = Some(stream);

        let mut connect = Connect::new(client_id);
        connect.keep_alive = self.keep_alive;
        connect.clean_session = true;
        if let Some((user, pw)) = self.server.credentials() {
            connect.set_login(user, pw);
        }

        let mut out = BytesMut::new();
        connect.write(&mut out)?;
        self.stream()?.write_all(&out)?;

        let deadline = Instant::now() + self.io_timeout;
        match self.expect_packet("CONNACK", deadline)? {
            Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                info!("Broker session open at {} as {}", addr, client_id);
                Ok(())
            }
            Packet::ConnAck(ack) => Err(LinkError::Refused(format!("{:?}", ack.code))),
            other => Err(LinkError::Refused(format!(
                "expected CONNACK, got {:?}",
                other
            ))),
        }
    }
}

impl BrokerSession for TcpBroker {
    fn connect(&mut self, client_id: &str) -> Result<(), LinkError> {
        self.close();
        let result = self.open(client_id);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        let mut subscribe = Subscribe::new(topic, QoS::AtMostOnce);
        subscribe.pkid = self.pkid();

        let mut out = BytesMut::new();
        subscribe.write(&mut out)?;
        self.stream()?.write_all(&out)?;

        // Unrelated packets do not extend the wait
        let deadline = Instant::now() + self.io_timeout;
        loop {
            match self.expect_packet("SUBACK", deadline)? {
                Packet::SubAck(ack) if ack.pkid == subscribe.pkid => break,
                other => debug!("Ignoring {:?} while waiting for SUBACK", other),
            }
        }

        self.stream()?.set_nonblocking(true)?;
        info!("Subscribed to {}", topic);
        Ok(())
    }

    fn check_message(&mut self) -> Result<Option<MQTTMessage>, LinkError> {
        loop {
            match self.read_packet()? {
                Some(Packet::Publish(publish)) => {
                    return Ok(Some(MQTTMessage::from_topic(publish.topic, publish.payload)))
                }
                Some(other) => debug!("Broker sent {:?}", other),
                None => return Ok(None),
            }
        }
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let stream = self.stream()?;
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(&DISCONNECT).map_err(LinkError::from),
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!("Broker disconnect failed: {}", e);
        }
        self.close();
        result
    }
}
