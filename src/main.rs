pub mod config;
pub mod console;
pub mod hardware;
pub mod mqtt;
pub mod network;
pub mod persistence;
pub mod request;
pub mod terminal;
#[cfg(test)]
mod testing;

use crate::config::{LinkDriverKind, TerminalSettings};
use crate::console::{Console, StdinConsole};
use crate::hardware::{
    ButtonInput, Buzzer, Feedback, GpioButton, GpioBuzzer, LogDisplay, NoButton, SilentBuzzer,
};
use crate::mqtt::transport::RumqttcTransport;
use crate::network::driver::{HostLink, LinkDriver, NmcliLink};
use crate::persistence::config_store::{ConfigStore, RECORD_SIZE};
use crate::persistence::storage::FileStorage;
use crate::terminal::{LoopExit, Peripherals, Terminal};
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let settings = TerminalSettings::load_or_create(&TerminalSettings::default_path()).await?;
    info!("Device record at {}", settings.record_path.display());
    let storage = FileStorage::open(&settings.record_path, RECORD_SIZE).await?;
    let store = ConfigStore::new(Box::new(storage));

    let peripherals = build_peripherals(&settings)?;

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => token.cancel(),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    let mut terminal = Terminal::create(settings, store, peripherals).boot();
    loop {
        match terminal.run(&shutdown).await {
            LoopExit::Restart => terminal = terminal.restart().boot(),
            LoopExit::Shutdown => break,
        }
    }
    terminal.shutdown();

    Ok(())
}

fn build_peripherals(settings: &TerminalSettings) -> Result<Peripherals> {
    let link_driver: Box<dyn LinkDriver> = match settings.link.driver {
        LinkDriverKind::Nmcli => Box::new(NmcliLink::new(settings.link.interface.clone())),
        LinkDriverKind::Host => Box::new(HostLink),
    };

    let transport = Box::new(RumqttcTransport::new(
        settings.broker.connect_timeout(),
        settings.broker.poll_window(),
    ));

    let console: Box<dyn Console> = Box::new(StdinConsole::spawn()?);

    let (button, buzzer): (Box<dyn ButtonInput>, Box<dyn Buzzer>) = if settings.hardware.gpio {
        let button: Box<dyn ButtonInput> = match GpioButton::open(settings.hardware.button_pin) {
            Ok(button) => Box::new(button),
            Err(e) => {
                warn!("Button unavailable, running without one: {}", e);
                Box::new(NoButton)
            }
        };
        let buzzer: Box<dyn Buzzer> = match GpioBuzzer::open(settings.hardware.buzzer_pin) {
            Ok(buzzer) => Box::new(buzzer),
            Err(e) => {
                warn!("Buzzer unavailable, running silent: {}", e);
                Box::new(SilentBuzzer)
            }
        };
        (button, buzzer)
    } else {
        info!("GPIO disabled in settings");
        (Box::new(NoButton), Box::new(SilentBuzzer))
    };

    Ok(Peripherals {
        link_driver,
        transport,
        console,
        feedback: Feedback::new(Box::new(LogDisplay), buzzer),
        button,
    })
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
