//! Per-indicator state and its plain-data snapshot.
//!
//! Every live indicator is backed by exactly one [`ProgressState`] owned by a
//! [`StateStore`](crate::StateStore). The record is never handed out directly: readers
//! receive a [`ProgressSnapshot`], an owned copy taken while the store lock is held,
//! so no field of a snapshot can be torn by a concurrent update.
//!
//! # Modes
//!
//! An indicator either knows its total ([`ProgressMode::Determinate`]) or estimates
//! its progress on a saturating curve ([`ProgressMode::Logarithmic`]). The mode is
//! decided at most once; until then it reads as `None`.

use std::{fmt, time::Duration};

use compact_str::CompactString;
use web_time::Instant;

use crate::{builder::ProgressConfig, math};

/// Opaque identity of a registered indicator.
///
/// Ids are unique for the lifetime of the [`StateStore`](crate::StateStore) that issued them.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    feature = "rkyv",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "rkyv", rkyv(derive(Debug, Eq, PartialEq)))]
pub struct ProgressId(pub(crate) u64);

impl fmt::Display for ProgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the displayed fraction is computed.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "rkyv",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "rkyv", rkyv(derive(Debug, Eq, PartialEq)))]
pub enum ProgressMode {
    /// Ratio against a known total.
    Determinate,
    /// Saturating estimate, used when the total is unknown.
    Logarithmic,
}

/// Whether a failure has been observed on the indicator. One-way.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "rkyv",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "rkyv", rkyv(derive(Debug, Eq, PartialEq)))]
pub enum ColorState {
    /// No failure seen.
    #[default]
    Normal,
    /// A failure propagated through the tracked region.
    Error,
}

/// Initial display colour of an indicator.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "rkyv",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "rkyv", rkyv(derive(Debug, Eq, PartialEq)))]
pub enum Colour {
    /// The terminal's own foreground colour.
    #[default]
    Default,
    /// Red.
    Red,
    /// Green.
    Green,
    /// Yellow.
    Yellow,
    /// Blue.
    Blue,
    /// Magenta.
    Magenta,
    /// Cyan.
    Cyan,
    /// White.
    White,
}

/// Lifecycle phase of an indicator.
///
/// `Created -> Active -> {Completed, Errored} -> Disposed`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressPhase {
    /// Registered, nothing reported yet.
    Created,
    /// Work has been reported and the indicator is still open.
    Active,
    /// Closed without a failure.
    Completed,
    /// Closed after a failure was observed.
    Errored,
    /// Removed from its store (or never registered, for disabled handles).
    Disposed,
}

/// Mutable record of one indicator, owned by the store.
#[derive(Clone, Debug)]
pub(crate) struct ProgressState {
    pub(crate) id: ProgressId,
    pub(crate) description: CompactString,
    pub(crate) postfix: CompactString,
    pub(crate) completed: u64,
    pub(crate) total: Option<u64>,
    pub(crate) mode: Option<ProgressMode>,
    pub(crate) log_scale: f64,
    pub(crate) color: ColorState,
    pub(crate) colour: Colour,
    pub(crate) unit: CompactString,
    pub(crate) unit_scale: bool,
    pub(crate) transient: bool,
    pub(crate) position: usize,
    pub(crate) start: Instant,
    pub(crate) stopped: Option<Instant>,
    pub(crate) closed: bool,
}

impl ProgressState {
    pub(crate) fn new(
        id: ProgressId,
        position: usize,
        config: &ProgressConfig,
        start: Instant,
    ) -> Self {
        let log_scale = config.log_scale.map_or(math::DEFAULT_LOG_SCALE, |scale| {
            math::sanitize_scale(scale).unwrap_or_else(|| {
                tracing::warn!(%id, scale, "invalid log scale, using default");
                math::DEFAULT_LOG_SCALE
            })
        });

        Self {
            id,
            description: config.description.clone(),
            postfix: CompactString::default(),
            completed: 0,
            total: config.total,
            mode: config.total.map(|_| ProgressMode::Determinate),
            log_scale,
            color: ColorState::Normal,
            colour: config.colour,
            unit: config.unit.clone(),
            unit_scale: config.unit_scale,
            transient: !config.leave,
            position,
            start,
            stopped: None,
            closed: false,
        }
    }

    /// Fixes the mode. Returns `false` if it was already decided.
    pub(crate) fn resolve(&mut self, total: Option<u64>) -> bool {
        if self.mode.is_some() {
            return false;
        }
        self.total = total;
        self.mode = Some(match total {
            Some(_) => ProgressMode::Determinate,
            None => ProgressMode::Logarithmic,
        });
        true
    }

    pub(crate) fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let end = self.stopped.unwrap_or(now);
        ProgressSnapshot {
            id: self.id,
            description: self.description.clone(),
            postfix: self.postfix.clone(),
            completed: self.completed,
            total: self.total,
            mode: self.mode,
            log_scale: self.log_scale,
            color: self.color,
            colour: self.colour,
            unit: self.unit.clone(),
            unit_scale: self.unit_scale,
            transient: self.transient,
            position: self.position,
            elapsed: end.saturating_duration_since(self.start),
            closed: self.closed,
        }
    }
}

/// A plain-data copy of an indicator at a specific instant.
///
/// Holds owned data and requires no locking to read, which makes it the unit the
/// renderer works with.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "rkyv",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "rkyv", rkyv(derive(Debug, PartialEq)))]
pub struct ProgressSnapshot {
    id: ProgressId,

    description: CompactString,
    postfix: CompactString,

    completed: u64,
    total: Option<u64>,
    mode: Option<ProgressMode>,
    log_scale: f64,

    color: ColorState,
    colour: Colour,
    unit: CompactString,
    unit_scale: bool,

    transient: bool,
    position: usize,
    elapsed: Duration,
    closed: bool,
}

impl ProgressSnapshot {
    /// Returns the indicator id.
    #[must_use]
    pub const fn id(&self) -> ProgressId {
        self.id
    }

    /// Returns the display label. Empty if none was given.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the free-form text shown after the statistics.
    #[must_use]
    pub fn postfix(&self) -> &str {
        &self.postfix
    }

    /// Returns the number of work units processed.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Returns the known total, if any.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// Returns the resolved mode, or `None` while undecided.
    #[must_use]
    pub const fn mode(&self) -> Option<ProgressMode> {
        self.mode
    }

    /// Returns the scale of the logarithmic curve.
    #[must_use]
    pub const fn log_scale(&self) -> f64 {
        self.log_scale
    }

    /// Returns whether a failure has been observed.
    #[must_use]
    pub const fn color_state(&self) -> ColorState {
        self.color
    }

    /// Returns the configured display colour.
    #[must_use]
    pub const fn colour(&self) -> Colour {
        self.colour
    }

    /// Returns the unit label (e.g. `it`, `B`).
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Returns whether counts are shown with SI suffixes.
    #[must_use]
    pub const fn unit_scale(&self) -> bool {
        self.unit_scale
    }

    /// Returns `true` if the rendering is erased on close.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.transient
    }

    /// Returns the display slot.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the time since registration, frozen at close.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns `true` once the indicator has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the lifecycle phase this snapshot represents.
    ///
    /// A snapshot always describes a registered indicator, so it never reports
    /// [`ProgressPhase::Disposed`].
    #[must_use]
    pub const fn phase(&self) -> ProgressPhase {
        match (self.closed, self.color) {
            (true, ColorState::Error) => ProgressPhase::Errored,
            (true, ColorState::Normal) => ProgressPhase::Completed,
            (false, _) if self.completed == 0 => ProgressPhase::Created,
            (false, _) => ProgressPhase::Active,
        }
    }

    /// Returns the displayed fraction in `[0, 1]`.
    ///
    /// A cleanly closed indicator reads as `1`. An errored one keeps its last value.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.closed && self.color == ColorState::Normal {
            return 1.0;
        }
        match (self.mode, self.total) {
            (Some(ProgressMode::Determinate), Some(total)) => {
                math::determinate_fraction(self.completed, total)
            }
            _ => math::logarithmic_fraction(self.completed, self.log_scale),
        }
    }

    /// Returns the displayed fraction as a percentage (0.0 to 100.0).
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    /// Estimates the time remaining.
    ///
    /// Only defined for open determinate indicators that have made progress.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        if self.closed || self.mode != Some(ProgressMode::Determinate) {
            return None;
        }
        math::eta(self.completed, self.total?, self.elapsed)
    }

    /// Calculates the average throughput (items per second) over the entire lifetime.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        math::throughput(self.completed, self.elapsed)
    }

    /// Calculates the instantaneous throughput relative to a previous snapshot.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn throughput_since(&self, prev: &Self) -> f64 {
        let done = self.completed.saturating_sub(prev.completed) as f64;
        let secs = self.elapsed.as_secs_f64() - prev.elapsed.as_secs_f64();

        if secs > 0.0 { done / secs } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use web_time::Instant;

    use super::{ColorState, ProgressId, ProgressMode, ProgressPhase, ProgressState};
    use crate::builder::ProgressConfig;

    fn state(config: &ProgressConfig) -> ProgressState {
        ProgressState::new(ProgressId(1), 0, config, Instant::now())
    }

    /// Mode From Config
    /// A configured total fixes the mode at construction; otherwise it is undecided.
    #[test]
    fn test_mode_from_config() {
        let known = state(&ProgressConfig {
            total: Some(10),
            ..ProgressConfig::default()
        });
        assert_eq!(known.mode, Some(ProgressMode::Determinate));

        let unknown = state(&ProgressConfig::default());
        assert_eq!(unknown.mode, None);
    }

    /// Single Resolution
    /// Once resolved, the mode and total ignore later attempts.
    #[test]
    fn test_resolve_once() {
        let mut s = state(&ProgressConfig::default());

        assert!(s.resolve(None));
        assert_eq!(s.mode, Some(ProgressMode::Logarithmic));

        assert!(!s.resolve(Some(50)));
        assert_eq!(s.mode, Some(ProgressMode::Logarithmic));
        assert_eq!(s.total, None);
    }

    /// Phase Derivation
    /// Snapshots map state flags onto the lifecycle.
    #[test]
    fn test_phase() {
        let mut s = state(&ProgressConfig::default());
        assert_eq!(s.snapshot_at(Instant::now()).phase(), ProgressPhase::Created);

        s.completed = 3;
        assert_eq!(s.snapshot_at(Instant::now()).phase(), ProgressPhase::Active);

        s.closed = true;
        assert_eq!(s.snapshot_at(Instant::now()).phase(), ProgressPhase::Completed);

        s.color = ColorState::Error;
        assert_eq!(s.snapshot_at(Instant::now()).phase(), ProgressPhase::Errored);
    }

    /// Final Fraction
    /// Clean close paints 100%, an errored close keeps the last value.
    #[test]
    #[allow(clippy::float_cmp)]
    fn test_fraction_on_close() {
        let mut s = state(&ProgressConfig {
            total: Some(100),
            ..ProgressConfig::default()
        });
        s.completed = 40;
        assert_eq!(s.snapshot_at(Instant::now()).fraction(), 0.4);

        s.closed = true;
        assert_eq!(s.snapshot_at(Instant::now()).fraction(), 1.0);

        s.color = ColorState::Error;
        assert_eq!(s.snapshot_at(Instant::now()).fraction(), 0.4);
    }

    /// Logarithmic Snapshot
    /// Unknown totals stay below 100% while open and have no ETA.
    #[test]
    fn test_logarithmic_snapshot() {
        let mut s = state(&ProgressConfig::default());
        s.resolve(None);
        s.completed = 1_000;

        let snap = s.snapshot_at(Instant::now());
        assert!(snap.fraction() < 1.0);
        assert!(snap.fraction() > 0.9);
        assert!(snap.eta().is_none());
    }

    /// Frozen Elapsed
    /// Elapsed time stops advancing once the indicator is stopped.
    #[test]
    fn test_elapsed_frozen_at_stop() {
        let start = Instant::now();
        let mut s = ProgressState::new(ProgressId(1), 0, &ProgressConfig::default(), start);
        s.stopped = Some(start + Duration::from_secs(2));

        let later = start + Duration::from_secs(60);
        assert_eq!(s.snapshot_at(later).elapsed(), Duration::from_secs(2));
    }

    /// Instantaneous Throughput
    /// Rate between two snapshots uses only the delta.
    #[test]
    #[allow(clippy::float_cmp)]
    fn test_throughput_since() {
        let start = Instant::now();
        let mut s = ProgressState::new(ProgressId(1), 0, &ProgressConfig::default(), start);

        s.completed = 10;
        let first = s.snapshot_at(start + Duration::from_secs(1));
        s.completed = 30;
        let second = s.snapshot_at(start + Duration::from_secs(3));

        assert_eq!(second.throughput_since(&first), 10.0);
        assert_eq!(second.throughput(), 10.0);
        assert_eq!(first.throughput_since(&first), 0.0);
    }
}
