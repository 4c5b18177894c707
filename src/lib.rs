//! # `livebar`
//!
//! Live, thread-safe progress indicators for the terminal.
//!
//! `livebar` wraps iteration or manually reported work in indicators that are painted
//! by a single background render loop. It is designed to be:
//!
//! * **Coordinated**: All indicators of a [`Session`] live in one [`StateStore`] and are
//!   drawn together by one thread, the only writer to the output stream.
//! * **Concurrent**: Handles can be updated from any thread. Every store operation is a
//!   short critical section; formatting and I/O happen outside the lock.
//! * **Honest about unknown sizes**: Work without a known total is shown on a
//!   saturating curve that never claims completion before the indicator is closed.
//! * **Transparent**: Failures are observed, not handled. A panic or `Err` passing
//!   through a tracked region turns the indicator red and continues unchanged.
//!
//! ## Modules
//!
//! * [`builder`]: [`ProgressConfig`] and the fluent [`ProgressBuilder`].
//! * [`error`]: The crate error type.
//! * [`handle`]: The [`Progress`] handle and its lifecycle.
//! * [`iter`]: [`track`] and extension traits for tracking progress on Iterators.
//! * [`math`]: Fraction, rate and ETA arithmetic.
//! * [`progress`]: Per-indicator state and [`ProgressSnapshot`].
//! * [`render`]: Frame composition for the render loop.
//! * [`session`]: A store plus the render thread that paints it.
//! * [`store`]: The registry of live indicators.
//!
//! ## Example
//!
//! ```no_run
//! use livebar::{ProgressBuilder, track, track_with};
//!
//! for _ in track(0..100) {
//!     // known length: determinate
//! }
//!
//! let lines = std::io::stdin().lines();
//! for _ in track_with(lines, ProgressBuilder::new("reading").with_log_scale(20.0)) {
//!     // unknown length: logarithmic
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod builder;
pub mod error;
pub mod handle;
pub mod iter;
pub mod math;
pub mod progress;
pub mod render;
pub mod session;
pub mod store;

pub use builder::{ProgressBuilder, ProgressConfig};
pub use error::ProgressError;
pub use handle::Progress;
pub use iter::{ProgressIter, ProgressIteratorExt, TryProgressIter, track, track_with};
pub use progress::{ColorState, Colour, ProgressId, ProgressMode, ProgressPhase, ProgressSnapshot};
pub use session::{RenderTarget, Session, SessionConfig};
pub use store::{StateStore, StoreSnapshot};
