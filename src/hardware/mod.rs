//! # Hardware Collaborators
//!
//! Thin wrappers around the terminal's physical I/O: a two-line status display, a buzzer and
//! the ticket button. The core only talks to the traits defined here; the concrete GPIO
//! backends live in [`buzzer`] and [`button`], the display backend in [`display`].
//!
//! [`Feedback`] bundles display and buzzer and adds the two bits of timing the core needs
//! without blocking the polling loop: stopping a tone after its duration, and swapping in a
//! follow-up screen after a hold time.

pub mod button;
pub mod buzzer;
pub mod display;

use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

pub use button::{ButtonInput, GpioButton, NoButton};
pub use buzzer::{Buzzer, GpioBuzzer, SilentBuzzer};
pub use display::{LogDisplay, StatusDisplay};

/// Characters per display line.
pub const LINE_WIDTH: usize = 16;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// Contents of the two-line display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Screen {
    pub top: String,
    pub bottom: String,
}

impl Screen {
    pub fn new(top: impl Into<String>, bottom: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            bottom: bottom.into(),
        }
    }

    pub fn single(top: impl Into<String>) -> Self {
        Self::new(top, "")
    }

    pub fn boot(device_id: &str) -> Self {
        Self::new("Ready to Queue!!", device_id)
    }

    pub fn ready(device_id: &str) -> Self {
        Self::new("Ready to queue", device_id)
    }

    pub fn connecting_wifi() -> Self {
        Self::single("Connect to WiFi")
    }

    pub fn wifi_connected() -> Self {
        Self::single("WiFi Connected!")
    }

    pub fn broker_connected(link: &str, broker: &str) -> Self {
        Self::new(format!("W{}", link), format!("M{}", broker))
    }

    pub fn broker_failed(failures: u32) -> Self {
        Self::new("MQTT Failed!", format!("Retries: {}", failures))
    }

    pub fn setup_required(what: &str) -> Self {
        Self::new(format!("{} setup", what), "See console")
    }

    pub fn offline_saved() -> Self {
        Self::new("MQTT Offline,", "saved message.")
    }

    pub fn waiting() -> Self {
        Self::single("Wait....")
    }

    pub fn ticket(number: i64) -> Self {
        Self::new(format!("Queue No: {}", number), "")
    }

    pub fn current(number: i64) -> Self {
        Self::new("Ready to Queue!!", format!("Current {}", number))
    }

    pub fn no_callback() -> Self {
        Self::single("Server no callback")
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}|{}]", self.top, self.bottom)
    }
}

/// A tone request for the buzzer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration: Duration,
}

impl Tone {
    /// Acknowledges a button press.
    pub const PRESS: Tone = Tone {
        frequency_hz: 1000.0,
        duration: Duration::from_millis(200),
    };

    /// Announces a ticket number.
    pub const TICKET: Tone = Tone {
        frequency_hz: 2000.0,
        duration: Duration::from_millis(200),
    };
}

/// Display and buzzer with non-blocking timing.
pub struct Feedback {
    display: Box<dyn StatusDisplay>,
    buzzer: Box<dyn Buzzer>,
    current: Screen,
    follow_up: Option<(Instant, Screen)>,
    tone_until: Option<Instant>,
}

impl Feedback {
    pub fn new(display: Box<dyn StatusDisplay>, buzzer: Box<dyn Buzzer>) -> Self {
        Self {
            display,
            buzzer,
            current: Screen::default(),
            follow_up: None,
            tone_until: None,
        }
    }

    pub fn current(&self) -> &Screen {
        &self.current
    }

    /// Shows `screen` now; any scheduled follow-up is cancelled.
    pub fn show(&mut self, screen: Screen) {
        self.follow_up = None;
        self.render(screen);
    }

    /// Shows `screen` and replaces it with `next` once `hold` has elapsed.
    pub fn show_then(&mut self, screen: Screen, hold: Duration, next: Screen, now: Instant) {
        self.render(screen);
        self.follow_up = Some((now + hold, next));
    }

    /// Starts a tone; it is stopped by [`service`](Self::service).
    pub fn beep(&mut self, tone: Tone, now: Instant) {
        match self.buzzer.start(tone) {
            Ok(()) => self.tone_until = Some(now + tone.duration),
            Err(e) => warn!("Buzzer failed: {}", e),
        }
    }

    /// Applies expired timers. Call once per loop iteration.
    pub fn service(&mut self, now: Instant) {
        if self.tone_until.is_some_and(|until| now >= until) {
            self.tone_until = None;
            if let Err(e) = self.buzzer.stop() {
                warn!("Failed to stop buzzer: {}", e);
            }
        }

        if self.follow_up.as_ref().is_some_and(|(at, _)| now >= *at) {
            if let Some((_, next)) = self.follow_up.take() {
                self.render(next);
            }
        }
    }

    /// Drops pending timers and silences the buzzer.
    pub fn reset(&mut self) {
        self.follow_up = None;
        if self.tone_until.take().is_some() {
            if let Err(e) = self.buzzer.stop() {
                warn!("Failed to stop buzzer: {}", e);
            }
        }
    }

    fn render(&mut self, screen: Screen) {
        if screen != self.current {
            self.display.show(&screen);
            self.current = screen;
        }
    }
}
