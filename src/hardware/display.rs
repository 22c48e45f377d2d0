use super::{Screen, LINE_WIDTH};
use tracing::info;

pub trait StatusDisplay: Send {
    fn show(&mut self, screen: &Screen);
}

/// Renders the 16x2 display into the log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&mut self, screen: &Screen) {
        info!(
            target: "display",
            "|{:<w$}|{:<w$}|",
            clip(&screen.top),
            clip(&screen.bottom),
            w = LINE_WIDTH
        );
    }
}

/// Cuts a line to the display width.
pub fn clip(line: &str) -> &str {
    match line.char_indices().nth(LINE_WIDTH) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
