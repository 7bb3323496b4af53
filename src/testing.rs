//! Test doubles for the injected collaborators.
//!
//! Each double is a cheap handle around shared state so a test can keep one
//! copy for assertions and hand another to the code under test.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::mqtt::message_manager::MQTTMessage;
use crate::mqtt::transport::{BrokerSession, LinkError, Network};
use crate::ui::{ConnectStage, Display, Indicator, LastHeard};

/// Clock that only moves when told to; `sleep` advances it.
#[derive(Clone)]
pub struct ManualClock {
    start: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCall {
    /// Formatted last-heard, if any
    Idle(Option<String>),
    Transmitting(String, String),
    Welcome,
    Connecting(ConnectStage),
}

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    calls: Rc<RefCell<Vec<DrawCall>>>,
}

impl RecordingDisplay {
    pub fn calls(&self) -> Vec<DrawCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl Display for RecordingDisplay {
    fn draw_idle(&mut self, last_heard: Option<&LastHeard>) {
        self.calls
            .borrow_mut()
            .push(DrawCall::Idle(last_heard.map(ToString::to_string)));
    }

    fn draw_transmitting(&mut self, call: &str, nick: &str) {
        self.calls
            .borrow_mut()
            .push(DrawCall::Transmitting(call.to_string(), nick.to_string()));
    }

    fn draw_welcome(&mut self) {
        self.calls.borrow_mut().push(DrawCall::Welcome);
    }

    fn draw_connecting(&mut self, stage: ConnectStage) {
        self.calls.borrow_mut().push(DrawCall::Connecting(stage));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCall {
    On,
    Off,
}

#[derive(Clone, Default)]
pub struct RecordingIndicator {
    calls: Rc<RefCell<Vec<LightCall>>>,
}

impl RecordingIndicator {
    pub fn calls(&self) -> Vec<LightCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl Indicator for RecordingIndicator {
    fn on(&mut self) {
        self.calls.borrow_mut().push(LightCall::On);
    }

    fn off(&mut self) {
        self.calls.borrow_mut().push(LightCall::Off);
    }
}

#[derive(Default)]
struct NetworkState {
    connected: bool,
    failures_left: usize,
    attempts: usize,
    disconnects: usize,
}

/// Network that fails a set number of bring-up attempts.
#[derive(Clone, Default)]
pub struct ScriptedNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl ScriptedNetwork {
    pub fn up() -> Self {
        Self::failing(0)
    }

    pub fn failing(attempts: usize) -> Self {
        let network = Self::default();
        network.state.borrow_mut().failures_left = attempts;
        network
    }

    pub fn attempts(&self) -> usize {
        self.state.borrow().attempts
    }

    pub fn disconnects(&self) -> usize {
        self.state.borrow().disconnects
    }
}

impl Network for ScriptedNetwork {
    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn connect(&mut self, _timeout: Duration) -> Result<(), LinkError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(LinkError::NetworkDown("scripted".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.connected = false;
        state.disconnects += 1;
    }
}

#[derive(Default)]
struct BrokerState {
    open: usize,
    max_open: usize,
    connect_failures: usize,
    send_failures: usize,
    fail_check: bool,
    connect_attempts: usize,
    disconnects: usize,
    client_ids: Vec<String>,
    subscriptions: Vec<String>,
    inbox: VecDeque<MQTTMessage>,
    sent: Vec<Vec<u8>>,
}

/// Broker that counts open sessions; opening a second one without
/// disconnecting shows up in `max_open_sessions`.
#[derive(Clone, Default)]
pub struct ScriptedBroker {
    state: Rc<RefCell<BrokerState>>,
}

impl ScriptedBroker {
    pub fn fail_connects(&self, count: usize) {
        self.state.borrow_mut().connect_failures = count;
    }

    pub fn fail_sends(&self, count: usize) {
        self.state.borrow_mut().send_failures = count;
    }

    pub fn fail_next_check(&self) {
        self.state.borrow_mut().fail_check = true;
    }

    pub fn push_message(&self, payload: &str) {
        self.state
            .borrow_mut()
            .inbox
            .push_back(MQTTMessage::from_topic("emf_hub/ptt", payload.to_string()));
    }

    pub fn open_sessions(&self) -> usize {
        self.state.borrow().open
    }

    pub fn max_open_sessions(&self) -> usize {
        self.state.borrow().max_open
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.borrow().connect_attempts
    }

    pub fn disconnects(&self) -> usize {
        self.state.borrow().disconnects
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.state.borrow().client_ids.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.borrow().subscriptions.clone()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }
}

impl BrokerSession for ScriptedBroker {
    fn connect(&mut self, client_id: &str) -> Result<(), LinkError> {
        let mut state = self.state.borrow_mut();
        state.connect_attempts += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(LinkError::Refused("scripted".to_string()));
        }
        state.open += 1;
        state.max_open = state.max_open.max(state.open);
        state.client_ids.push(client_id.to_string());
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        let mut state = self.state.borrow_mut();
        if state.open == 0 {
            return Err(LinkError::NotConnected);
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn check_message(&mut self) -> Result<Option<MQTTMessage>, LinkError> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_check) {
            return Err(LinkError::Closed);
        }
        Ok(state.inbox.pop_front())
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut state = self.state.borrow_mut();
        if state.send_failures > 0 {
            state.send_failures -= 1;
            return Err(LinkError::Closed);
        }
        state.sent.push(bytes.to_vec());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.borrow_mut();
        state.disconnects += 1;
        state.open = state.open.saturating_sub(1);
        Ok(())
    }
}
