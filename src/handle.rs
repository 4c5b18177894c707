//! The public handle to one indicator.
//!
//! A [`Progress`] is a thin reference into a [`StateStore`]: it owns an id and
//! forwards every operation to the store. It is the scoped resource of the
//! lifecycle:
//!
//! ```text
//! Created -> Active -> { Completed, Errored } -> Disposed
//! ```
//!
//! * Dropping the handle closes the indicator. If the thread is panicking while the
//!   indicator is still open, it is marked as failed first, so every exit path runs
//!   the same single cleanup step.
//! * [`Progress::close`] is idempotent and safe to race from several threads.
//! * Operations on a closed handle are no-ops.
//!
//! Share a handle across threads with `&Progress` or `Arc<Progress>`; it is not
//! `Clone` because dropping any copy would close the indicator.

use std::fmt;

use compact_str::CompactString;
use parking_lot::Mutex;

use crate::{
    error::ProgressError,
    progress::{ProgressId, ProgressPhase, ProgressSnapshot},
    store::StateStore,
};

/// A handle to a registered (or disabled) indicator.
pub struct Progress {
    inner: Option<Attached>,
}

struct Attached {
    store: StateStore,
    id: ProgressId,
    /// Terminal state captured by the close that performed the transition.
    last: Mutex<Option<ProgressSnapshot>>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("id", &self.id())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Progress {
    pub(crate) fn attached(store: StateStore, id: ProgressId) -> Self {
        Self {
            inner: Some(Attached {
                store,
                id,
                last: Mutex::new(None),
            }),
        }
    }

    /// Creates a handle that is not backed by any store.
    ///
    /// Every operation is a no-op.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// Returns the indicator id, or `None` for a disabled handle.
    #[must_use]
    pub fn id(&self) -> Option<ProgressId> {
        self.inner.as_ref().map(|a| a.id)
    }

    /// Returns `true` if the handle bypasses the engine.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.inner.is_none()
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Adds `delta` units of completed work.
    pub fn update(&self, delta: u64) {
        if let Some(a) = &self.inner {
            a.store.update(a.id, delta);
        }
    }

    /// Adds one unit of completed work.
    pub fn inc(&self) {
        self.update(1);
    }

    /// Sets the completed count to an absolute value.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Regression`] if the count would decrease.
    pub fn set_completed(&self, completed: u64) -> Result<(), ProgressError> {
        match &self.inner {
            Some(a) => a.store.set_completed(a.id, completed),
            None => Ok(()),
        }
    }

    /// Resolves the total. Has no effect if the mode is already decided.
    ///
    /// Returns `true` if this call fixed the total.
    pub fn set_total(&self, total: u64) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|a| a.store.set_total(a.id, total))
    }

    /// Resolves the indicator as unbounded (logarithmic). Has no effect if the mode is
    /// already decided.
    pub fn set_unbounded(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|a| a.store.set_unbounded(a.id))
    }

    /// Replaces the display label.
    pub fn set_description(&self, description: impl Into<CompactString>) {
        if let Some(a) = &self.inner {
            a.store.set_description(a.id, description);
        }
    }

    /// Replaces the text shown after the statistics.
    pub fn set_postfix(&self, postfix: impl Into<CompactString>) {
        if let Some(a) = &self.inner {
            a.store.set_postfix(a.id, postfix);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Flags the indicator as failed without closing it. No effect once closed.
    pub fn mark_error(&self) {
        if let Some(a) = &self.inner {
            a.store.mark_error(a.id);
        }
    }

    /// Closes the indicator.
    ///
    /// Returns `true` if this call performed the transition. In a session with a
    /// running render thread, returns once the closed state has been drawn.
    pub fn close(&self) -> bool {
        let Some(a) = &self.inner else {
            return false;
        };
        match a.store.close(a.id) {
            Some(last) => {
                *a.last.lock() = Some(last);
                true
            }
            None => false,
        }
    }

    /// Marks the indicator as failed, then closes it.
    pub fn fail(&self) -> bool {
        self.mark_error();
        self.close()
    }

    /// Runs `f` as the tracked region of this indicator.
    ///
    /// On `Ok` the indicator is closed. On `Err` it is marked as failed and closed,
    /// and the error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn run<T, E>(self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E> {
        let result = f(&self);
        if result.is_err() {
            self.fail();
        } else {
            self.close();
        }
        result
    }

    /// Returns the current state, or the terminal state once closed.
    ///
    /// `None` for disabled handles.
    #[must_use]
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        let a = self.inner.as_ref()?;
        a.store.get(a.id).or_else(|| a.last.lock().clone())
    }

    /// Returns the lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ProgressPhase {
        self.inner
            .as_ref()
            .and_then(|a| a.store.get(a.id))
            .map_or(ProgressPhase::Disposed, |s| s.phase())
    }

    /// Returns `true` once the indicator has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.as_ref().is_none_or(|a| a.last.lock().is_some())
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if std::thread::panicking() && !self.is_closed() {
            self.mark_error();
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::Arc,
        thread,
    };

    use crate::{
        builder::ProgressBuilder,
        error::ProgressError,
        progress::{ColorState, ProgressPhase},
        store::StateStore,
    };

    /// Basic Lifecycle
    /// Created -> Active -> Completed -> Disposed.
    #[test]
    #[allow(clippy::float_cmp)]
    fn test_basic_lifecycle() {
        let store = StateStore::new();
        let p = ProgressBuilder::new_bar("job", 100u64).attach(&store);

        assert_eq!(p.phase(), ProgressPhase::Created);

        p.update(50);
        assert_eq!(p.phase(), ProgressPhase::Active);
        assert_eq!(p.snapshot().unwrap().fraction(), 0.5);

        assert!(p.close());
        assert_eq!(p.phase(), ProgressPhase::Completed);
        assert!(p.is_closed());

        let _ = store.snapshot();
        assert_eq!(p.phase(), ProgressPhase::Disposed);

        let last = p.snapshot().unwrap();
        assert_eq!(last.completed(), 50);
        assert_eq!(last.fraction(), 1.0);
    }

    /// Manual Mode
    /// Explicit updates drive a known total to completion.
    #[test]
    fn test_manual_updates() {
        let store = StateStore::new();
        let p = ProgressBuilder::new_bar("manual", 100u64).attach(&store);

        for _ in 0..10 {
            p.update(10);
        }
        p.set_description("manual (done)");
        p.set_postfix("ok");

        let snap = p.snapshot().unwrap();
        assert_eq!(snap.completed(), 100);
        assert_eq!(snap.description(), "manual (done)");
        assert_eq!(snap.postfix(), "ok");
    }

    /// Idempotent Close
    /// Closing twice, or updating afterwards, is harmless.
    #[test]
    fn test_close_idempotent() {
        let store = StateStore::new();
        let p = ProgressBuilder::new("twice").with_transient(true).attach(&store);

        assert!(p.close());
        assert!(!p.close());
        p.update(5);
        p.mark_error();

        assert_eq!(p.phase(), ProgressPhase::Disposed);
        assert_eq!(p.snapshot().unwrap().completed(), 0);
    }

    /// Concurrent Close
    /// A handle shared by several threads is disposed exactly once.
    #[test]
    fn test_concurrent_close_through_handle() {
        let store = StateStore::new();
        let p = Arc::new(ProgressBuilder::new("shared").attach(&store));

        let closes: usize = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || usize::from(p.close()))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();

        assert_eq!(closes, 1);
    }

    /// Drop Cleanup
    /// Dropping an open handle closes its indicator.
    #[test]
    fn test_drop_closes() {
        let store = StateStore::new();
        {
            let p = ProgressBuilder::new("scoped").with_transient(true).attach(&store);
            p.inc();
            assert_eq!(store.len(), 1);
        }
        assert!(store.is_empty());
    }

    /// Panic Cleanup
    /// Unwinding through a handle marks it as failed and closes it.
    #[test]
    fn test_panic_marks_error() {
        let store = StateStore::new();
        let p = ProgressBuilder::new("boom").attach(&store);
        let id = p.id().unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(move || {
            p.inc();
            panic!("worker failed");
        }));

        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"worker failed"));

        let last = store.snapshot().0.into_iter().find(|s| s.id() == id).unwrap();
        assert_eq!(last.phase(), ProgressPhase::Errored);
        assert_eq!(last.color_state(), ColorState::Error);
    }

    /// Panic After Close
    /// A handle closed cleanly stays completed when an unrelated panic drops it.
    #[test]
    fn test_panic_after_close_keeps_outcome() {
        let store = StateStore::new();
        let p = ProgressBuilder::new_bar("done early", 4u64).attach(&store);
        let id = p.id().unwrap();
        p.update(4);
        assert!(p.close());
        assert_eq!(p.phase(), ProgressPhase::Completed);

        let result = panic::catch_unwind(AssertUnwindSafe(move || {
            let _held = p;
            panic!("unrelated failure");
        }));
        assert!(result.is_err());

        let last = store.snapshot().0.into_iter().find(|s| s.id() == id).unwrap();
        assert_eq!(last.phase(), ProgressPhase::Completed);
        assert_eq!(last.color_state(), ColorState::Normal);
    }

    /// Scoped Result
    /// `run` closes on success and forwards failures untouched.
    #[test]
    fn test_run_forwards_error() {
        #[derive(Debug, PartialEq)]
        struct Oops(u32);

        let store = StateStore::new();
        let ok: Result<u32, Oops> = ProgressBuilder::new("ok")
            .attach(&store)
            .run(|p| {
                p.update(3);
                Ok(3)
            });
        assert_eq!(ok, Ok(3));

        let err: Result<(), Oops> = ProgressBuilder::new("err")
            .attach(&store)
            .run(|_| Err(Oops(7)));
        assert_eq!(err, Err(Oops(7)));

        let phases: Vec<_> = store.snapshot().iter().map(|s| s.phase()).collect();
        assert_eq!(phases, vec![ProgressPhase::Completed, ProgressPhase::Errored]);
    }

    /// Caller Errors
    /// Regressions are reported and leave state unchanged.
    #[test]
    fn test_set_completed_error() {
        let store = StateStore::new();
        let p = ProgressBuilder::new("abs").attach(&store);

        p.set_completed(8).unwrap();
        assert!(matches!(
            p.set_completed(2),
            Err(ProgressError::Regression { .. })
        ));
        assert_eq!(p.snapshot().unwrap().completed(), 8);
    }

    /// Late Total
    /// The total can be supplied once after construction.
    #[test]
    fn test_set_total_after_construction() {
        let store = StateStore::new();
        let p = ProgressBuilder::new("late").attach(&store);

        assert!(p.set_total(40));
        assert!(!p.set_total(80));
        assert!(!p.set_unbounded());
        assert_eq!(p.snapshot().unwrap().total(), Some(40));
    }

    /// Disabled Handle
    /// Every operation is accepted and ignored.
    #[test]
    fn test_disabled_handle() {
        let p = super::Progress::disabled();
        p.update(10);
        p.set_description("nothing");
        assert!(p.set_completed(1).is_ok());
        assert!(!p.set_total(5));
        assert!(!p.close());
        assert!(p.snapshot().is_none());
        assert!(p.id().is_none());
        assert_eq!(p.phase(), ProgressPhase::Disposed);
    }
}
