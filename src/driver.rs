//! The cooperative main loop.
//!
//! One cycle is `BrokerClient::poll`, dispatch of any event, then
//! `PresentationController::tick`, followed by a fixed pause. Nothing runs in
//! parallel; the loop only ends when the shutdown token fires.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::mqtt::mqtt_handler::{BrokerClient, ConnectionState, PollDiagnostic};
use crate::mqtt::transport::{BrokerSession, LinkError, Network};
use crate::ui::presentation::PresentationController;
use crate::ui::{Display, Indicator};

pub struct Driver<N, B, D, L, C> {
    pub client: BrokerClient<N, B, D, C>,
    pub presenter: PresentationController<D, L, C>,
    clock: C,
    pause: Duration,
    shutdown: CancellationToken,
}

impl<N, B, D, L, C> Driver<N, B, D, L, C>
where
    N: Network,
    B: BrokerSession,
    D: Display,
    L: Indicator,
    C: Clock,
{
    pub fn new(
        client: BrokerClient<N, B, D, C>,
        presenter: PresentationController<D, L, C>,
        clock: C,
        pause: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            presenter,
            clock,
            pause,
            shutdown,
        }
    }

    /// Connects, draws the idle screen and runs cycles until shutdown.
    pub fn run(mut self) -> Result<(), LinkError> {
        if self.client.state() != ConnectionState::Connected {
            match self.client.connect() {
                Ok(()) => {}
                Err(LinkError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        self.presenter.init();
        info!("Monitoring started");

        while !self.shutdown.is_cancelled() {
            self.cycle();
            self.clock.sleep(self.pause);
        }

        info!("Shutting down");
        self.client.shutdown();
        self.presenter.init();
        Ok(())
    }

    /// Runs a single poll/dispatch/tick cycle.
    pub fn cycle(&mut self) {
        let outcome = self.client.poll();

        match outcome.diagnostic {
            Some(PollDiagnostic::Decode { topic, source }) => {
                debug!("Ignored message on {}: {}", topic, source)
            }
            Some(PollDiagnostic::Reconnect(LinkError::Cancelled)) => {}
            Some(
                diagnostic @ (PollDiagnostic::Transport(_) | PollDiagnostic::Heartbeat(_)),
            ) => {
                warn!("{}", diagnostic);
                // the reconnect left its connecting screen up
                self.presenter.redraw();
            }
            Some(other) => warn!("{}", other),
            None => {}
        }

        if let Some(event) = outcome.event {
            info!("Hub event: {:?}", event);
            self.presenter.handle(event);
        }

        self.presenter.tick();
    }
}
