pub mod clock;
pub mod config;
pub mod driver;
pub mod mqtt;
pub mod ui;

#[cfg(test)]
mod testing;

use clock::SystemClock;
use color_eyre::{eyre::eyre, Result};
use config::Config;
use driver::Driver;
use mqtt::mqtt_handler::{BrokerClient, ClientSettings};
use mqtt::transport::{HostNetwork, TcpBroker};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use ui::console::ConsoleDisplay;
use ui::indicator;
use ui::presentation::PresentationController;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_create(&path)?;
    setup_logging_env(config.debug);
    info!("Starting hub monitor with config {}", path.display());

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let mut monitor = tokio::task::spawn_blocking(move || run_monitor(config, &path, token));

    tokio::select! {
        result = &mut monitor => {
            return result.map_err(|e| eyre!("Monitor task failed: {}", e))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, stopping monitor");
            shutdown.cancel();
        }
    }

    monitor
        .await
        .map_err(|e| eyre!("Monitor task failed: {}", e))?
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Builds the collaborators and runs the driver loop on the current thread.
fn run_monitor(config: Config, path: &Path, shutdown: CancellationToken) -> Result<()> {
    let display = ConsoleDisplay;
    let light = indicator::from_config(&config.indicator)?;
    let mut presenter =
        PresentationController::new(display, light, SystemClock, config.idle_timeout());

    if config.first_boot {
        presenter.welcome(config.welcome_hold());
        if config.demo {
            info!("Demo mode, skipping setting first_boot");
        } else {
            info!("Setting first_boot false");
            let mut updated = config.clone();
            updated.first_boot = false;
            if let Err(e) = updated.save(path) {
                error!("Unable to persist first_boot: {}", e);
            }
        }
    }

    let network = HostNetwork::new(&config.mqtt.server);
    let broker = TcpBroker::new(
        config.mqtt.server.clone(),
        config.mqtt.heartbeat_interval() * 2,
        config.mqtt.network_timeout(),
    );
    let settings = ClientSettings::from_config(&config.mqtt, config.client_id());
    info!(
        "Monitoring {} on {} as {}",
        settings.topic, config.mqtt.server, settings.client_id
    );
    let client = BrokerClient::new(
        settings,
        network,
        broker,
        display,
        SystemClock,
        shutdown.clone(),
    );

    Driver::new(client, presenter, SystemClock, config.cycle(), shutdown)
        .run()
        .map_err(|e| eyre!("Monitor stopped: {}", e))
}
