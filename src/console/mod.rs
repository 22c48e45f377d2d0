//! # Console Module
//!
//! Line-oriented operator interface on stdin/stdout, the serial console of the terminal.
//! It is the only source of re-provisioning input: the configuration menu in [`menu`] and
//! the recovery prompts of the link manager and broker session all read from a [`Console`].
//!
//! Reads never block. Lines are collected by a reader thread and handed out one at a time
//! from the polling loop, so waiting for the operator does not freeze timeout accounting.

pub mod menu;

use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub trait Console: Send {
    /// Next complete input line without its line terminator, if one is waiting.
    fn try_read_line(&mut self) -> Option<String>;

    /// Writes text for the operator; prompts are written without a trailing newline.
    fn print(&mut self, text: &str);

    fn println(&mut self, text: &str) {
        self.print(text);
        self.print("\n");
    }
}

/// Console on the process' stdin/stdout.
pub struct StdinConsole {
    lines: mpsc::Receiver<String>,
}

impl StdinConsole {
    /// Starts the reader thread.
    ///
    /// A plain thread instead of a runtime task: a pending stdin read must not keep the
    /// runtime from shutting down.
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(100);
        std::thread::Builder::new()
            .name("console-reader".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Failed to read console input: {}", e);
                            break;
                        }
                    }
                }
                debug!("stdin closed, console input disabled");
            })?;
        Ok(Self { lines: rx })
    }
}

impl Console for StdinConsole {
    fn try_read_line(&mut self) -> Option<String> {
        self.lines
            .try_recv()
            .ok()
            .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn print(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("Failed to write to console: {}", e);
        }
    }
}
