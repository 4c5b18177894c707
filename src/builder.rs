//! Configuration for new indicators.
//!
//! [`ProgressConfig`] is the plain record an argument layer hands to the engine; the
//! engine copies it into the initial indicator state and never parses free-form
//! text itself. [`ProgressBuilder`] is a fluent wrapper around it.
//!
//! # Key Features
//!
//! * **Leave vs. transient:** `leave = true` (the default) keeps the final line on
//!   screen after close; [`ProgressBuilder::with_transient`] is the inverse spelling.
//! * **Disable:** a disabled indicator never registers anywhere. Its handle and any
//!   iterator wrapping it pass everything through untouched.
//! * **Time Travel:** Allows explicitly setting the start time, useful for resuming
//!   previously paused tasks or synchronizing start times across a batch of jobs.

use compact_str::CompactString;
use web_time::Instant;

use crate::{handle::Progress, progress::Colour, session::Session, store::StateStore};

/// Initial settings of an indicator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProgressConfig {
    /// Display label.
    pub description: CompactString,
    /// Known amount of work. `None` leaves the mode to be discovered.
    pub total: Option<u64>,
    /// Keep the final line visible after close.
    pub leave: bool,
    /// Bypass the engine entirely.
    pub disable: bool,
    /// Requested display slot.
    pub position: Option<usize>,
    /// Initial display colour.
    pub colour: Colour,
    /// Unit label for counts and rates.
    pub unit: CompactString,
    /// Show counts with SI suffixes.
    pub unit_scale: bool,
    /// Scale of the logarithmic curve for unknown totals.
    pub log_scale: Option<f64>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            description: CompactString::default(),
            total: None,
            leave: true,
            disable: false,
            position: None,
            colour: Colour::Default,
            unit: CompactString::const_new("it"),
            unit_scale: false,
            log_scale: None,
        }
    }
}

/// A builder pattern for constructing [`Progress`] handles.
#[derive(Clone, Debug, Default)]
pub struct ProgressBuilder {
    config: ProgressConfig,
    start: Option<Instant>,
}

impl From<ProgressConfig> for ProgressBuilder {
    fn from(config: ProgressConfig) -> Self {
        Self {
            config,
            start: None,
        }
    }
}

impl ProgressBuilder {
    /// Starts building an indicator with the given label.
    #[must_use]
    pub fn new(description: impl Into<CompactString>) -> Self {
        Self::default().with_description(description)
    }

    /// Starts building an indicator with a known total.
    #[must_use]
    pub fn new_bar(description: impl Into<CompactString>, total: impl Into<u64>) -> Self {
        Self::new(description).with_total(total)
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<CompactString>) -> Self {
        self.config.description = description.into();
        self
    }

    /// Sets the known total, making the indicator determinate.
    #[must_use]
    pub fn with_total(mut self, total: impl Into<u64>) -> Self {
        self.config.total = Some(total.into());
        self
    }

    /// Keeps (`true`) or erases (`false`) the final line on close.
    #[must_use]
    pub const fn with_leave(mut self, leave: bool) -> Self {
        self.config.leave = leave;
        self
    }

    /// Erases (`true`) or keeps (`false`) the final line on close.
    #[must_use]
    pub const fn with_transient(self, transient: bool) -> Self {
        self.with_leave(!transient)
    }

    /// Bypasses the engine entirely when `true`.
    #[must_use]
    pub const fn with_disable(mut self, disable: bool) -> Self {
        self.config.disable = disable;
        self
    }

    /// Requests a display slot.
    #[must_use]
    pub const fn with_position(mut self, position: usize) -> Self {
        self.config.position = Some(position);
        self
    }

    /// Sets the initial display colour.
    #[must_use]
    pub const fn with_colour(mut self, colour: Colour) -> Self {
        self.config.colour = colour;
        self
    }

    /// Sets the unit label (defaults to `it`).
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<CompactString>) -> Self {
        self.config.unit = unit.into();
        self
    }

    /// Shows counts with SI suffixes (`1.50k`, `2.00M`).
    #[must_use]
    pub const fn with_unit_scale(mut self, unit_scale: bool) -> Self {
        self.config.unit_scale = unit_scale;
        self
    }

    /// Sets the scale of the logarithmic curve used when the total is unknown.
    ///
    /// Non-finite or non-positive values are replaced by
    /// [`DEFAULT_LOG_SCALE`](crate::math::DEFAULT_LOG_SCALE) at registration.
    #[must_use]
    pub const fn with_log_scale(mut self, scale: f64) -> Self {
        self.config.log_scale = Some(scale);
        self
    }

    /// Sets the start time explicitly.
    #[must_use]
    pub const fn with_start_time(mut self, start: Instant) -> Self {
        self.start = Some(start);
        self
    }

    /// Returns the configuration built so far.
    #[must_use]
    pub const fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Registers the indicator in `store` and returns its handle.
    ///
    /// A disabled configuration returns a pass-through handle without registering.
    #[must_use]
    pub fn attach(self, store: &StateStore) -> Progress {
        if self.config.disable {
            return Progress::disabled();
        }
        let start = self.start.unwrap_or_else(Instant::now);
        let id = store.register(&self.config, start);
        Progress::attached(store.clone(), id)
    }

    /// Registers the indicator in `session`.
    #[must_use]
    pub fn build_in(self, session: &Session) -> Progress {
        self.attach(session.store())
    }

    /// Registers the indicator in the process-wide default session.
    #[must_use]
    pub fn build(self) -> Progress {
        self.build_in(Session::global())
    }
}
