use std::io::{self, Write};
use tracing::warn;

use super::{ConnectStage, Display, LastHeard};

const WIDTH: usize = 40;

/// Renders each screen as a boxed text frame on stdout.
///
/// Stateless, so the broker client and the presentation controller can each
/// hold a copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDisplay;

impl ConsoleDisplay {
    fn frame(&self, lines: &[String]) -> String {
        let clock = chrono::Local::now().format("%H:%M").to_string();
        let mut out = String::new();
        out.push_str(&format!("+{}+\n", "-".repeat(WIDTH)));
        out.push_str(&format!("|{:>width$}|\n", clock, width = WIDTH));
        out.push_str(&format!("+{}+\n", "-".repeat(WIDTH)));
        for line in lines {
            out.push_str(&format!("|{:^width$}|\n", fit(line), width = WIDTH));
        }
        out.push_str(&format!("+{}+\n", "-".repeat(WIDTH)));
        out
    }

    fn show(&self, lines: &[String]) {
        let frame = self.frame(lines);
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout
            .write_all(frame.as_bytes())
            .and_then(|_| stdout.flush())
        {
            warn!("Unable to draw frame: {}", e);
        }
    }
}

fn fit(line: &str) -> String {
    line.chars().take(WIDTH).collect()
}

/// Idle screen body; a last-heard entry without a call sign is not shown.
fn idle_lines(last_heard: Option<&LastHeard>) -> Vec<String> {
    let mut lines = vec![String::new(), "IDLE".to_string(), String::new()];
    if let Some(lh) = last_heard.filter(|lh| !lh.call.is_empty()) {
        lines.push(format!("last heard: {}", lh));
    }
    lines
}

impl Display for ConsoleDisplay {
    fn draw_idle(&mut self, last_heard: Option<&LastHeard>) {
        self.show(&idle_lines(last_heard));
    }

    fn draw_transmitting(&mut self, call: &str, nick: &str) {
        self.show(&[
            String::new(),
            call.to_string(),
            nick.to_string(),
            String::new(),
        ]);
    }

    fn draw_welcome(&mut self) {
        self.show(&[
            "Shows who is transmitting on the".to_string(),
            "\"EMF HUB\", a hub for amateur radio!".to_string(),
            String::new(),
            "More Info: http://hub.emfhams.org".to_string(),
        ]);
    }

    fn draw_connecting(&mut self, stage: ConnectStage) {
        self.show(&[String::new(), stage.to_string(), String::new()]);
    }
}
