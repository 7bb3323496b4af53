//! # Monitor Display
//!
//! Everything the user sees: the idle / transmitting screens, the welcome
//! screen and the "connecting" text, plus the indicator light that is lit
//! while someone is transmitting.
//!
//! ## Collaborators
//!
//! Drawing and lighting are behind the [`Display`] and [`Indicator`] traits so
//! the [`presentation::PresentationController`] only decides *what* to show.
//! Host implementations live in [`console`] (text frames on stdout) and
//! [`indicator`] (GPIO pins through `rppal`).
//!
//! ```text
//! BrokerClient ──HubEvent──► PresentationController ──► Display
//!                                                  └──► Indicator
//! ```

pub mod console;
pub mod indicator;
pub mod presentation;

use std::fmt;

/// Which step of bringing the link up is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    Network,
    Broker,
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectStage::Network => write!(f, "Connecting to Wifi..."),
            ConnectStage::Broker => write!(f, "Connecting to MQTT..."),
        }
    }
}

/// Screen currently shown by the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayState {
    #[default]
    Idle,
    Transmitting,
}

/// The last station heard, shown on the idle screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastHeard {
    pub call: String,
    pub nick: String,
}

impl LastHeard {
    pub fn new(call: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            nick: nick.into(),
        }
    }

    /// Nick to show, `unknown` when the hub sent none
    pub fn display_nick(&self) -> &str {
        if self.nick.is_empty() {
            "unknown"
        } else {
            &self.nick
        }
    }
}

impl fmt::Display for LastHeard {
    /// Formats as "CALL (nick)".
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.call, self.display_nick())
    }
}

/// Rendering surface.
pub trait Display {
    /// Idle screen, with the last station heard if there is one
    fn draw_idle(&mut self, last_heard: Option<&LastHeard>);

    fn draw_transmitting(&mut self, call: &str, nick: &str);

    fn draw_welcome(&mut self);

    fn draw_connecting(&mut self, stage: ConnectStage);
}

/// Light that is on while someone transmits.
pub trait Indicator {
    fn on(&mut self);

    fn off(&mut self);
}
