//! # Terminal Lifecycle
//!
//! Ties the core together: one [`AppContext`] with all mutable session state, one set of
//! [`Peripherals`], and a polling loop that services them in a fixed order.
//!
//! ## State Machine
//!
//! ```text
//! Booting ──boot()──► Running ──restart()──► Booting
//! ```
//!
//! `boot` reloads the device record and rebuilds the context from scratch, so a restart
//! forgets everything that was not persisted (backlog, counters, pending request).
//!
//! ## Tick Order
//!
//! 1. console input (recovery prompt, otherwise menu)
//! 2. WiFi link
//! 3. broker session: connect or poll, inbound answers, backlog replay
//! 4. button edge and ticket request
//! 5. no-response timeout
//! 6. feedback timers

use crate::config::TerminalSettings;
use crate::console::menu::ConfigMenu;
use crate::console::Console;
use crate::hardware::{ButtonInput, Feedback, Screen, Tone};
use crate::mqtt::backlog::OutboundBacklog;
use crate::mqtt::message_manager::OutboundMessage;
use crate::mqtt::mqtt_handler::{handle_inbound, BrokerSession, Delivery};
use crate::mqtt::transport::BrokerTransport;
use crate::network::driver::LinkDriver;
use crate::network::link_manager::{LinkManager, RecoveryInput};
use crate::persistence::config_store::ConfigStore;
use crate::persistence::DeviceConfig;
use crate::request::{PressDetector, RequestMachine};
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long the offline notice stays up before the waiting screen.
const OFFLINE_NOTICE: Duration = Duration::from_secs(1);
const NO_CALLBACK_NOTICE: Duration = Duration::from_secs(2);

/// Everything a restart throws away.
#[derive(Debug)]
pub struct AppContext {
    pub config: DeviceConfig,
    pub backlog: OutboundBacklog,
    pub link: LinkManager,
    pub broker: BrokerSession,
    pub request: RequestMachine,
    pub press: PressDetector,
    pub menu: ConfigMenu,
}

impl AppContext {
    pub fn fresh(config: DeviceConfig, settings: &TerminalSettings) -> Self {
        Self {
            config,
            backlog: OutboundBacklog::with_capacity(settings.backlog_capacity),
            link: LinkManager::new(
                settings.link.poll_interval(),
                settings.link.connect_timeout(),
            ),
            broker: BrokerSession::new(
                settings.broker.connect_window(),
                settings.broker.keep_alive(),
            ),
            request: RequestMachine::new(
                settings.request.min_press_interval(),
                settings.request.response_timeout(),
            ),
            press: PressDetector::default(),
            menu: ConfigMenu::default(),
        }
    }
}

/// The terminal's outside world. Survives restarts.
pub struct Peripherals {
    pub link_driver: Box<dyn LinkDriver>,
    pub transport: Box<dyn BrokerTransport>,
    pub console: Box<dyn Console>,
    pub feedback: Feedback,
    pub button: Box<dyn ButtonInput>,
}

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub triggered: bool,
    pub delivery: Option<Delivery>,
    pub answers: usize,
    pub no_callback: bool,
    pub restart_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    Restart,
}

#[state]
#[derive(Debug, Clone)]
pub enum DeviceLifecycle {
    Booting,
    Running,
}

#[machine]
pub struct Terminal<S: DeviceLifecycle> {
    settings: TerminalSettings,
    store: ConfigStore,
    peripherals: Peripherals,
    context: AppContext,
}

impl<S: DeviceLifecycle> Terminal<S> {
    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn settings(&self) -> &TerminalSettings {
        &self.settings
    }
}

impl Terminal<Booting> {
    pub fn create(settings: TerminalSettings, store: ConfigStore, peripherals: Peripherals) -> Self {
        let context = AppContext::fresh(DeviceConfig::factory_default(), &settings);
        Self::new(settings, store, peripherals, context)
    }

    /// Loads the persisted record and starts a clean session on it.
    pub fn boot(mut self) -> Terminal<Running> {
        let config = self.store.load();
        info!(
            "Booting terminal {} (WiFi '{}', broker {}:{})",
            config.device_id(),
            config.ssid(),
            config.broker_host(),
            config.broker_port()
        );

        self.context = AppContext::fresh(config, &self.settings);
        let peripherals = &mut self.peripherals;
        peripherals.transport.disconnect();
        peripherals.feedback.reset();
        peripherals
            .feedback
            .show(Screen::boot(self.context.config.device_id()));

        let console = peripherals.console.as_mut();
        console.println(&format!(
            "\nCurrent Config:\n{}",
            self.context.config.render()
        ));
        self.context.menu.show(&self.context.config, console);

        self.transition()
    }
}

impl Terminal<Running> {
    /// One pass over every component. `now` drives all timeouts.
    pub async fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        if self.handle_console().await {
            report.restart_requested = true;
            return report;
        }

        let ctx = &mut self.context;
        let io = &mut self.peripherals;

        ctx.link
            .service(
                &ctx.config,
                io.link_driver.as_mut(),
                &mut io.feedback,
                io.console.as_mut(),
                now,
            )
            .await;

        if ctx.link.is_connected() {
            let session = ctx
                .broker
                .service(
                    &ctx.config,
                    io.transport.as_mut(),
                    &mut ctx.backlog,
                    &mut io.feedback,
                    io.console.as_mut(),
                    ctx.link.address(),
                    now,
                )
                .await;

            for msg in &session.inbound {
                handle_inbound(msg, &mut ctx.request, &mut io.feedback, now);
            }
            report.answers = session.inbound.len();

            if session.connection_lost {
                let status = io.link_driver.status().await;
                if !status.is_up() {
                    debug!("Link reports {:?} after broker loss", status);
                    ctx.link.mark_lost();
                }
            }
        } else {
            ctx.broker.link_down();
        }

        let pressed = io.button.is_pressed();
        if ctx.press.update(pressed) && ctx.request.try_trigger(now) {
            io.feedback.beep(Tone::PRESS, now);
            let msg = OutboundMessage::ticket_request(ctx.config.device_id());
            let delivery =
                ctx.broker
                    .submit(msg, &ctx.config, io.transport.as_mut(), &mut ctx.backlog);
            match delivery {
                Delivery::Sent => io.feedback.show(Screen::waiting()),
                Delivery::Queued => io.feedback.show_then(
                    Screen::offline_saved(),
                    OFFLINE_NOTICE,
                    Screen::waiting(),
                    now,
                ),
            }
            report.triggered = true;
            report.delivery = Some(delivery);
        }

        if ctx.request.check_timeout(now) {
            io.feedback.show_then(
                Screen::no_callback(),
                NO_CALLBACK_NOTICE,
                Screen::ready(ctx.config.device_id()),
                now,
            );
            report.no_callback = true;
        }

        io.feedback.service(now);
        report
    }

    /// Routes waiting console lines. Returns true when a restart was requested.
    async fn handle_console(&mut self) -> bool {
        let ctx = &mut self.context;
        let console = self.peripherals.console.as_mut();

        while let Some(line) = console.try_read_line() {
            if ctx.link.recovery().is_some() {
                let input = ctx
                    .link
                    .submit_recovery_input(&line, &mut ctx.config, &mut self.store, console)
                    .await;
                if input == RecoveryInput::RestartRequired {
                    return true;
                }
            } else if ctx.broker.in_recovery() {
                ctx.broker
                    .submit_recovery_input(&line, &mut ctx.config, &mut self.store, console)
                    .await;
            } else {
                let outcome = ctx
                    .menu
                    .handle_line(&line, &mut ctx.config, &mut self.store, console)
                    .await;
                debug!("Menu: {:?}", outcome);
            }
        }
        false
    }

    /// Ticks on the configured interval until shutdown or a restart request.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> LoopExit {
        let mut interval = tokio::time::interval(self.settings.loop_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return LoopExit::Shutdown;
                }
                _ = interval.tick() => {}
            }

            let report = self.tick(Instant::now()).await;
            if report.restart_requested {
                return LoopExit::Restart;
            }
            if report.triggered {
                tokio::time::sleep(self.settings.trigger_pause()).await;
            }
        }
    }

    /// Drops the session and returns to `Booting`; call [`Terminal::boot`] to start again.
    pub fn restart(mut self) -> Terminal<Booting> {
        warn!("Restarting terminal");
        self.peripherals.transport.disconnect();
        self.peripherals.feedback.reset();
        self.transition()
    }

    pub fn shutdown(mut self) {
        info!(
            "Terminal {} stopping, {} unsent message(s) dropped",
            self.context.config.device_id(),
            self.context.backlog.len()
        );
        self.peripherals.transport.disconnect();
        self.peripherals.feedback.reset();
    }
}
