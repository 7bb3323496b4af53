//! Idle / transmitting state machine.
//!
//! A key event switches to the transmitting screen straight away. An unkey
//! event only arms the idle timer; the transmitting screen stays up until
//! [`PresentationController::tick`] sees the deadline pass. A new key event in
//! the meantime discards the timer, so a quick re-key never flickers to idle.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{Display, DisplayState, Indicator, LastHeard};
use crate::clock::Clock;
use crate::mqtt::message_manager::HubEvent;

/// Pending return to the idle screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleTimer {
    pub deadline: Instant,
    pub last_heard: LastHeard,
}

pub struct PresentationController<D, L, C> {
    display: D,
    indicator: L,
    clock: C,
    idle_timeout: Duration,
    state: DisplayState,
    pending_idle: Option<IdleTimer>,
    last_heard: Option<LastHeard>,
    /// Station on the Tx screen
    on_air: Option<LastHeard>,
}

impl<D, L, C> PresentationController<D, L, C>
where
    D: Display,
    L: Indicator,
    C: Clock,
{
    pub fn new(display: D, indicator: L, clock: C, idle_timeout: Duration) -> Self {
        Self {
            display,
            indicator,
            clock,
            idle_timeout,
            state: DisplayState::Idle,
            pending_idle: None,
            last_heard: None,
            on_air: None,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn last_heard(&self) -> Option<&LastHeard> {
        self.last_heard.as_ref()
    }

    pub fn pending_idle(&self) -> Option<&IdleTimer> {
        self.pending_idle.as_ref()
    }

    /// Draws the idle screen without last-heard data.
    pub fn init(&mut self) {
        self.show_idle(None);
    }

    /// Shows the welcome screen and holds it for `hold`.
    pub fn welcome(&mut self, hold: Duration) {
        info!("Drawing the welcome display");
        self.display.draw_welcome();
        self.clock.sleep(hold);
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::KeyDown { call, nick } => {
                debug!("Drawing the Tx display for {}", call);
                self.pending_idle = None;
                self.display.draw_transmitting(&call, &nick);
                self.indicator.on();
                self.state = DisplayState::Transmitting;
                self.on_air = Some(LastHeard::new(call, nick));
            }
            HubEvent::KeyUp { call, nick } => {
                debug!(
                    "Scheduling display to return to idle in {} ms",
                    self.idle_timeout.as_millis()
                );
                self.pending_idle = Some(IdleTimer {
                    deadline: self.clock.now() + self.idle_timeout,
                    last_heard: LastHeard::new(call, nick),
                });
            }
        }
    }

    /// Returns to idle once the pending timer has expired.
    pub fn tick(&mut self) {
        let expired = self
            .pending_idle
            .as_ref()
            .is_some_and(|timer| self.clock.now() >= timer.deadline);
        if !expired {
            return;
        }

        if let Some(timer) = self.pending_idle.take() {
            self.last_heard = Some(timer.last_heard);
            let last_heard = self.last_heard.clone();
            self.show_idle(last_heard.as_ref());
        }
    }

    /// Draws the current screen again without touching the idle timer.
    ///
    /// Used after the broker client has drawn its connecting screens over it.
    pub fn redraw(&mut self) {
        match (self.state, self.on_air.as_ref()) {
            (DisplayState::Transmitting, Some(station)) => {
                debug!("Redrawing the Tx display for {}", station.call);
                self.display.draw_transmitting(&station.call, &station.nick);
                self.indicator.on();
            }
            _ => {
                debug!("Redrawing Idle Screen");
                self.display.draw_idle(self.last_heard.as_ref());
                self.indicator.off();
            }
        }
    }

    fn show_idle(&mut self, last_heard: Option<&LastHeard>) {
        debug!("Drawing Idle Screen");
        self.pending_idle = None;
        self.on_air = None;
        self.display.draw_idle(last_heard);
        self.indicator.off();
        self.state = DisplayState::Idle;
    }
}
