//! Iterator adapters for automatic progress tracking.
//!
//! This module provides [`track`] and the [`ProgressIteratorExt`] trait, which attach
//! an indicator to any Rust [`Iterator`] with a single call.
//!
//! # Length Discovery
//!
//! The adapters check [`Iterator::size_hint`]:
//! * If the hint is exact, the indicator is **determinate** with that total.
//! * Otherwise the mode stays open until the first element. If the hint has become
//!   exact by then, the total is resolved from it; if not, the indicator switches to
//!   the **logarithmic** curve.
//!
//! An explicit total on the builder always wins.
//!
//! # Cleanup
//!
//! Every element is counted before it is handed to the caller. Exhaustion closes the
//! indicator. Breaking out of a loop drops the adapter, which closes it too. A panic
//! unwinding past the adapter (in the wrapped iterator or in the loop body) marks it
//! as failed before closing, and the panic keeps unwinding untouched.
//!
//! # Example
//!
//! ```no_run
//! use livebar::ProgressIteratorExt;
//!
//! // Determinate because the Vec's length is known
//! for item in vec![1, 2, 3].into_iter().progress_with_description("numbers") {
//!     // ...
//! }
//! ```

use std::iter::FusedIterator;

use compact_str::CompactString;

use crate::{builder::ProgressBuilder, handle::Progress, session::Session};

/// An iterator adapter that wraps an underlying iterator and tracks progress.
///
/// Increments the indicator on every element, before yielding it.
pub struct ProgressIter<I> {
    iter: I,
    progress: Progress,
    resolved: bool,
}

impl<I: Iterator> ProgressIter<I> {
    /// Wraps `iter` with an existing handle.
    ///
    /// Note: This is usually constructed via [`track`] or [`ProgressIteratorExt`].
    pub fn new(iter: I, progress: Progress) -> Self {
        let resolved = progress.is_disabled()
            || progress.snapshot().is_some_and(|s| s.mode().is_some());
        let mut adapter = Self {
            iter,
            progress,
            resolved,
        };
        if !adapter.resolved {
            if let Some(len) = exact_len(&adapter.iter) {
                adapter.progress.set_total(len);
                adapter.resolved = true;
            }
        }
        adapter
    }

    /// Returns the handle of the attached indicator.
    pub const fn handle(&self) -> &Progress {
        &self.progress
    }

    /// Settles the mode once the first element has been produced.
    fn resolve_after_first(&mut self) {
        self.resolved = true;
        match exact_len(&self.iter) {
            Some(remaining) => self.progress.set_total(remaining + 1),
            None => self.progress.set_unbounded(),
        };
    }
}

impl<I: Iterator> Iterator for ProgressIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.iter.next();

        if item.is_some() {
            if !self.resolved {
                self.resolve_after_first();
            }
            self.progress.inc();
        } else {
            self.progress.close();
        }

        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl<I: FusedIterator> FusedIterator for ProgressIter<I> {}

/// Adapter for iterators of `Result`: the first `Err` marks the indicator as failed
/// and closes it. Items, including the error, pass through unchanged.
pub struct TryProgressIter<I> {
    inner: ProgressIter<I>,
}

impl<I: Iterator> TryProgressIter<I> {
    /// Wraps `iter` with an existing handle.
    pub fn new(iter: I, progress: Progress) -> Self {
        Self {
            inner: ProgressIter::new(iter, progress),
        }
    }

    /// Returns the handle of the attached indicator.
    pub const fn handle(&self) -> &Progress {
        self.inner.handle()
    }
}

impl<I, T, E> Iterator for TryProgressIter<I>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next();
        if matches!(item, Some(Err(_))) {
            self.inner.progress.fail();
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Extension trait to easily attach progress tracking to any Iterator.
pub trait ProgressIteratorExt: Iterator + Sized {
    /// Tracks the iterator in the default session.
    fn progress(self) -> ProgressIter<Self> {
        self.progress_with(ProgressBuilder::default())
    }

    /// Tracks the iterator in the default session with a label.
    fn progress_with_description(
        self,
        description: impl Into<CompactString>,
    ) -> ProgressIter<Self> {
        self.progress_with(ProgressBuilder::new(description))
    }

    /// Tracks the iterator in the default session with full configuration.
    fn progress_with(self, builder: ProgressBuilder) -> ProgressIter<Self> {
        ProgressIter::new(self, builder.build())
    }

    /// Tracks the iterator in the given session.
    fn progress_in(self, session: &Session, builder: ProgressBuilder) -> ProgressIter<Self> {
        ProgressIter::new(self, builder.build_in(session))
    }

    /// Tracks the iterator with an existing handle.
    fn progress_with_handle(self, progress: Progress) -> ProgressIter<Self> {
        ProgressIter::new(self, progress)
    }

    /// Tracks an iterator of `Result`s, failing the indicator on the first `Err`.
    fn try_progress<T, E>(self, builder: ProgressBuilder) -> TryProgressIter<Self>
    where
        Self: Iterator<Item = Result<T, E>>,
    {
        TryProgressIter::new(self, builder.build())
    }
}

impl<I: Iterator> ProgressIteratorExt for I {}

/// Tracks any iterable in the default session.
///
/// ```no_run
/// for n in livebar::track(0..100) {
///     // ...
/// }
/// ```
pub fn track<I: IntoIterator>(iterable: I) -> ProgressIter<I::IntoIter> {
    iterable.into_iter().progress()
}

/// Tracks any iterable in the default session with full configuration.
pub fn track_with<I: IntoIterator>(
    iterable: I,
    builder: ProgressBuilder,
) -> ProgressIter<I::IntoIter> {
    iterable.into_iter().progress_with(builder)
}

/// Exact length from `size_hint`, if the iterator reports one.
fn exact_len<I: Iterator>(iter: &I) -> Option<u64> {
    match iter.size_hint() {
        (lower, Some(upper)) if lower == upper => Some(lower as u64),
        _ => None,
    }
}
