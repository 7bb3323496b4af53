//! # Hub Link
//!
//! Keeps the appliance subscribed to the hub's key/unkey topic and turns each
//! publish into a [`message_manager::HubEvent`].
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, topic and retry timings
//! ├── message_manager.rs  - Inbound messages and event decoding
//! ├── mqtt_handler.rs     - BrokerClient: connect, heartbeat, reconnect, poll
//! └── transport.rs        - Network / broker session traits and TCP implementation
//! ```
//!
//! ## Failure handling
//!
//! - Network or broker unavailable: retried forever with a fixed delay
//! - Failed heartbeat ping or socket failure: full reconnect
//! - Undecodable payload: dropped, reported as a poll diagnostic
//!
//! The appliance has nothing useful to do without the link, so connecting
//! blocks until it succeeds or the process is shutting down.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
pub mod transport;
