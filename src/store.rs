//! The thread-safe registry of live indicators.
//!
//! A [`StateStore`] is the single source of truth for every indicator drawn on one
//! terminal. Handles and iterators mutate it; the render loop reads it.
//!
//! # Synchronization Strategy
//!
//! All entries live behind one [`Mutex`](parking_lot::Mutex). Every critical section
//! is a handful of field reads or writes: no formatting and no I/O happen while it
//! is held. Readers copy what they need and work on the copy.
//!
//! # Final Paint
//!
//! Closing a transient indicator removes it at once. Closing a non-transient one only
//! flags it; the entry stays until the next [`StateStore::snapshot`] has copied its
//! terminal state, so the renderer is guaranteed to draw its last line exactly once.
//!
//! A store owned by a running [`Session`](crate::Session) also waits in
//! [`StateStore::close`] until the render thread has written a frame taken after the
//! close.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use compact_str::CompactString;
use parking_lot::Mutex;
use web_time::Instant;

use crate::{
    builder::ProgressConfig,
    error::ProgressError,
    progress::{ColorState, ProgressId, ProgressSnapshot, ProgressState},
    session::Signal,
};

/// A thread-safe, shared-clonable registry of indicator states.
///
/// Cloning is cheap (pointer copy) and every clone refers to the same registry.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Mutex<Registry>>,
    /// Render loop to wait for on close.
    painter: Option<Arc<Signal>>,
}

struct Registry {
    entries: HashMap<ProgressId, ProgressState>,
    /// Display slots currently held by an entry.
    occupied: BTreeSet<usize>,
    next_id: u64,
    /// Whether closed non-transient entries wait for a snapshot before removal.
    final_paint: bool,
}

impl Registry {
    fn remove(&mut self, id: ProgressId) -> Option<ProgressState> {
        let state = self.entries.remove(&id)?;
        self.occupied.remove(&state.position);
        tracing::trace!(%id, position = state.position, "indicator disposed");
        Some(state)
    }

    /// Lowest free slot at or after `from`.
    fn free_slot(&self, from: usize) -> usize {
        let mut slot = from;
        while self.occupied.contains(&slot) {
            slot += 1;
        }
        slot
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::with_final_paint(true)
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("count", &self.len())
            .finish()
    }
}

impl StateStore {
    /// Creates an empty store whose closed entries wait for one final snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// use livebar::StateStore;
    ///
    /// let store = StateStore::new();
    /// assert!(store.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that drops closed entries immediately.
    ///
    /// Used when nothing will ever take a snapshot, so entries cannot linger.
    #[must_use]
    pub fn headless() -> Self {
        Self::with_final_paint(false)
    }

    /// Creates a store painted by the render loop behind `painter`.
    pub(crate) fn painted_by(painter: Arc<Signal>) -> Self {
        Self {
            painter: Some(painter),
            ..Self::with_final_paint(true)
        }
    }

    fn with_final_paint(final_paint: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                entries: HashMap::new(),
                occupied: BTreeSet::new(),
                next_id: 0,
                final_paint,
            })),
            painter: None,
        }
    }

    /// Stops waiting for final paints and disposes closed entries still waiting.
    ///
    /// Called once the render loop is gone.
    pub(crate) fn make_headless(&self) {
        let mut registry = self.inner.lock();
        registry.final_paint = false;

        let closed: Vec<_> = registry
            .entries
            .values()
            .filter(|state| state.closed)
            .map(|state| state.id)
            .collect();
        for id in closed {
            registry.remove(id);
        }
    }

    /// Registers a new indicator and returns its id.
    ///
    /// The indicator takes the lowest free display slot, starting from
    /// `config.position` when one is requested.
    pub fn register(&self, config: &ProgressConfig, start: Instant) -> ProgressId {
        let mut registry = self.inner.lock();

        let id = ProgressId(registry.next_id);
        registry.next_id += 1;

        let position = registry.free_slot(config.position.unwrap_or(0));
        registry.occupied.insert(position);
        registry
            .entries
            .insert(id, ProgressState::new(id, position, config, start));
        drop(registry);

        tracing::trace!(%id, position, "indicator registered");
        id
    }

    /// Adds `delta` to the completed count.
    ///
    /// Silently ignored if the indicator is closed or gone.
    pub fn update(&self, id: ProgressId, delta: u64) {
        self.with_open(id, |state| {
            state.completed = state.completed.saturating_add(delta);
        });
    }

    /// Sets the completed count to an absolute value.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Regression`] and leaves the state unchanged if
    /// `completed` is lower than the current count.
    pub fn set_completed(&self, id: ProgressId, completed: u64) -> Result<(), ProgressError> {
        self.with_open(id, |state| {
            if completed < state.completed {
                return Err(ProgressError::Regression {
                    current: state.completed,
                    requested: completed,
                });
            }
            state.completed = completed;
            Ok(())
        })
        .unwrap_or(Ok(()))
    }

    /// Resolves the indicator as determinate with `total`.
    ///
    /// Returns `false` if the mode was already decided or the indicator is gone.
    pub fn set_total(&self, id: ProgressId, total: u64) -> bool {
        self.with_open(id, |state| state.resolve(Some(total)))
            .unwrap_or(false)
    }

    /// Resolves the indicator as logarithmic (no known total).
    ///
    /// Returns `false` if the mode was already decided or the indicator is gone.
    pub fn set_unbounded(&self, id: ProgressId) -> bool {
        self.with_open(id, |state| state.resolve(None))
            .unwrap_or(false)
    }

    /// Replaces the display label.
    pub fn set_description(&self, id: ProgressId, description: impl Into<CompactString>) {
        let description = description.into();
        self.with_open(id, |state| state.description = description);
    }

    /// Replaces the text shown after the statistics.
    pub fn set_postfix(&self, id: ProgressId, postfix: impl Into<CompactString>) {
        let postfix = postfix.into();
        self.with_open(id, |state| state.postfix = postfix);
    }

    /// Flags the indicator as failed. Idempotent, and permanent for its lifetime.
    ///
    /// Only an open indicator can fail: once closed, its outcome is settled.
    pub fn mark_error(&self, id: ProgressId) {
        self.with_open(id, |state| state.color = ColorState::Error);
    }

    /// Closes the indicator.
    ///
    /// Returns its terminal state if this call performed the transition, or `None`
    /// if it was already closed or gone. Concurrent callers therefore observe exactly
    /// one successful close.
    ///
    /// When a render loop paints this store, a successful close returns only after a
    /// frame reflecting it has been written.
    pub fn close(&self, id: ProgressId) -> Option<ProgressSnapshot> {
        let now = Instant::now();
        let mut registry = self.inner.lock();

        let final_paint = registry.final_paint;
        let state = registry.entries.get_mut(&id).filter(|state| !state.closed)?;

        state.closed = true;
        state.stopped = Some(now);
        let snapshot = state.snapshot_at(now);

        if state.transient || !final_paint {
            registry.remove(id);
        }
        drop(registry);

        tracing::trace!(%id, phase = ?snapshot.phase(), "indicator closed");
        if let Some(painter) = &self.painter {
            painter.flush();
        }
        Some(snapshot)
    }

    /// Returns a copy of one indicator without affecting the final-paint protocol.
    #[must_use]
    pub fn get(&self, id: ProgressId) -> Option<ProgressSnapshot> {
        let now = Instant::now();
        self.inner.lock().entries.get(&id).map(|s| s.snapshot_at(now))
    }

    /// Returns `true` if the indicator is still registered.
    #[must_use]
    pub fn contains(&self, id: ProgressId) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Takes a consistent copy of every registered indicator, ordered by position.
    ///
    /// This is the render loop's read: closed entries included in the copy are
    /// removed from the store in the same critical section, freeing their slots.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let now = Instant::now();
        let mut registry = self.inner.lock();

        let mut items: Vec<ProgressSnapshot> = registry
            .entries
            .values()
            .map(|state| state.snapshot_at(now))
            .collect();

        for item in items.iter().filter(|item| item.is_closed()) {
            registry.remove(item.id());
        }
        drop(registry);

        items.sort_unstable_by_key(ProgressSnapshot::position);
        StoreSnapshot(items)
    }

    /// Returns the number of registered indicators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if no indicator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Runs `f` on an open entry.
    fn with_open<T>(&self, id: ProgressId, f: impl FnOnce(&mut ProgressState) -> T) -> Option<T> {
        let mut registry = self.inner.lock();
        registry
            .entries
            .get_mut(&id)
            .filter(|state| !state.closed)
            .map(f)
    }
}

/// A point-in-time copy of every indicator in a store, ordered by position.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "rkyv",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "rkyv", rkyv(derive(Debug, PartialEq)))]
pub struct StoreSnapshot(pub Vec<ProgressSnapshot>);

impl StoreSnapshot {
    /// Returns `true` if the snapshot holds no indicators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the indicators in display order.
    pub fn iter(&self) -> std::slice::Iter<'_, ProgressSnapshot> {
        self.0.iter()
    }
}
