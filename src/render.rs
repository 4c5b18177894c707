//! Frame composition for the render loop.
//!
//! A [`Renderer`] turns one [`StoreSnapshot`] into one frame: a single byte buffer
//! that erases the previous live region, prints the final line of every indicator
//! that closed with `leave`, and redraws the indicators that are still open. The
//! frame is written with one `write_all`, so nothing else can interleave with it.
//!
//! Formatting happens here, after the store lock has been released.

use std::{
    fmt::Write as _,
    io::{self, Write},
    time::Duration,
};

use crossterm::{
    cursor, queue,
    style::{self, Color},
    terminal::{self, ClearType},
};

use crate::{
    progress::{ColorState, Colour, ProgressMode, ProgressSnapshot},
    store::{StateStore, StoreSnapshot},
};

/// Default width of the bar, in cells.
pub const DEFAULT_BAR_WIDTH: u16 = 30;

/// Composes frames and remembers how many lines the last frame left on screen.
#[derive(Debug)]
pub struct Renderer {
    bar_width: u16,
    /// Columns available per line. Longer lines are cut so none of them wraps.
    max_width: Option<u16>,
    live_lines: u16,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_BAR_WIDTH)
    }
}

impl Renderer {
    /// Creates a renderer drawing bars `bar_width` cells wide.
    #[must_use]
    pub const fn new(bar_width: u16) -> Self {
        Self {
            bar_width,
            max_width: None,
            live_lines: 0,
        }
    }

    /// Limits every line to `width` columns, or lifts the limit with `None`.
    ///
    /// The live region is erased by moving up one row per line, so a line that wraps
    /// on the terminal would leave stale rows behind.
    pub const fn set_max_width(&mut self, width: Option<u16>) {
        self.max_width = width;
    }

    /// Takes one snapshot from `store` and writes the resulting frame to `out`.
    ///
    /// Write failures are swallowed: the tick is skipped and `false` is returned.
    pub fn tick(&mut self, store: &StateStore, out: &mut dyn Write) -> bool {
        let snapshot = store.snapshot();
        let Some((frame, live_lines)) = self.compose(&snapshot) else {
            return true;
        };

        match out.write_all(&frame).and_then(|()| out.flush()) {
            Ok(()) => {
                self.live_lines = live_lines;
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "render tick skipped");
                false
            }
        }
    }

    /// Builds the frame for `snapshot`, with the number of live lines it draws.
    ///
    /// Returns `None` when there is nothing to draw and nothing to erase.
    #[must_use]
    pub fn compose(&self, snapshot: &StoreSnapshot) -> Option<(Vec<u8>, u16)> {
        if snapshot.is_empty() && self.live_lines == 0 {
            return None;
        }

        let mut frame = Vec::new();
        self.queue_frame(&mut frame, snapshot).ok()?;

        let live = snapshot.iter().filter(|s| !s.is_closed()).count();
        Some((frame, u16::try_from(live).unwrap_or(u16::MAX)))
    }

    fn queue_frame(&self, frame: &mut Vec<u8>, snapshot: &StoreSnapshot) -> io::Result<()> {
        if self.live_lines > 0 {
            queue!(
                frame,
                cursor::MoveToPreviousLine(self.live_lines),
                terminal::Clear(ClearType::FromCursorDown)
            )?;
        }

        // Finished lines scroll into history above the live region.
        let (finished, live): (Vec<_>, Vec<_>) = snapshot.iter().partition(|s| s.is_closed());
        for item in finished.into_iter().filter(|s| !s.is_transient()) {
            self.queue_line(frame, item)?;
        }
        for item in live {
            self.queue_line(frame, item)?;
        }
        Ok(())
    }

    fn queue_line(&self, frame: &mut Vec<u8>, item: &ProgressSnapshot) -> io::Result<()> {
        let mut line = format_line(item, self.bar_width);
        if let Some(width) = self.max_width {
            truncate_columns(&mut line, usize::from(width));
        }
        match line_colour(item) {
            Some(color) => queue!(
                frame,
                style::SetForegroundColor(color),
                style::Print(line),
                style::ResetColor,
                style::Print('\n')
            ),
            None => queue!(frame, style::Print(line), style::Print('\n')),
        }
    }
}

/// Cuts `line` after `width` characters.
fn truncate_columns(line: &mut String, width: usize) {
    if let Some((end, _)) = line.char_indices().nth(width) {
        line.truncate(end);
    }
}

fn line_colour(item: &ProgressSnapshot) -> Option<Color> {
    if item.color_state() == ColorState::Error {
        return Some(Color::Red);
    }
    match item.colour() {
        Colour::Default => None,
        Colour::Red => Some(Color::Red),
        Colour::Green => Some(Color::Green),
        Colour::Yellow => Some(Color::Yellow),
        Colour::Blue => Some(Color::Blue),
        Colour::Magenta => Some(Color::Magenta),
        Colour::Cyan => Some(Color::Cyan),
        Colour::White => Some(Color::White),
    }
}

/// Renders one indicator as a single line of plain text.
///
/// ```text
/// label:  40%|############                  | 40/100 [00:04<00:06, 10.00it/s]
/// label:  63%|###################           | 17it [00:02, 8.50it/s]
/// ```
#[must_use]
pub fn format_line(item: &ProgressSnapshot, bar_width: u16) -> String {
    let mut line = String::new();

    if !item.description().is_empty() {
        let _ = write!(line, "{}: ", item.description());
    }

    let fraction = item.fraction();
    let _ = write!(line, "{:>3.0}%|{}| ", fraction * 100.0, bar(fraction, bar_width));

    let unit = item.unit();
    let scale = item.unit_scale();
    let completed = format_count(item.completed(), scale);
    let elapsed = format_duration(item.elapsed());
    let rate = format_rate(item.throughput(), scale);

    match (item.mode(), item.total()) {
        (Some(ProgressMode::Determinate), Some(total)) => {
            let eta = item.eta().map_or_else(|| "?".to_owned(), format_duration);
            let _ = write!(
                line,
                "{completed}/{} [{elapsed}<{eta}, {rate}{unit}/s]",
                format_count(total, scale)
            );
        }
        _ => {
            let _ = write!(line, "{completed}{unit} [{elapsed}, {rate}{unit}/s]");
        }
    }

    if !item.postfix().is_empty() {
        let _ = write!(line, " {}", item.postfix());
    }

    line
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bar(fraction: f64, width: u16) -> String {
    let width = usize::from(width);
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    let mut bar = "#".repeat(filled);
    bar.push_str(&" ".repeat(width - filled));
    bar
}

/// Formats a duration as `mm:ss`, or `h:mm:ss` past the hour.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Formats a count, optionally with an SI suffix.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_count(count: u64, unit_scale: bool) -> String {
    if unit_scale {
        si(count as f64)
    } else {
        count.to_string()
    }
}

fn format_rate(rate: f64, unit_scale: bool) -> String {
    if unit_scale {
        si(rate)
    } else {
        format!("{rate:.2}")
    }
}

fn si(value: f64) -> String {
    const SUFFIXES: [&str; 6] = ["", "k", "M", "G", "T", "P"];

    let mut value = value;
    let mut idx = 0;
    while value.abs() >= 1000.0 && idx < SUFFIXES.len() - 1 {
        value /= 1000.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}{}", SUFFIXES[idx])
    }
}
