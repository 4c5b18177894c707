//! One terminal, one store, one render loop.
//!
//! A [`Session`] owns a [`StateStore`] and the background thread that paints it. The
//! thread is the only writer to the output sink: it wakes every `refresh` interval,
//! takes one snapshot, and writes one frame. How often indicators are updated has
//! no effect on how often the terminal is redrawn.
//!
//! Most programs only need [`Session::global`], created on first use and rendering to
//! stderr when stderr is a terminal. Explicit sessions exist for tests, for custom
//! sinks, and for programs driving more than one output.
//!
//! Closing an indicator wakes the thread and waits until a frame taken after the
//! close has been written, so a finished line is on screen by the time `close`
//! returns. This also covers the global session, which is never dropped: the
//! process can exit right after a loop without losing the last frame.
//!
//! Dropping a session (or calling [`Session::shutdown`]) stops the thread after one
//! last tick. From then on its store disposes closed indicators immediately.

use std::{
    fmt,
    io::{self, IsTerminal as _, Write},
    sync::{Arc, OnceLock},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossterm::terminal;
use parking_lot::{Condvar, Mutex};

use crate::{
    builder::ProgressBuilder,
    error::ProgressError,
    handle::Progress,
    render::{DEFAULT_BAR_WIDTH, Renderer},
    store::StateStore,
};

/// Default interval between two redraws.
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(100);

/// Shortest interval accepted between two redraws.
pub const MIN_REFRESH: Duration = Duration::from_millis(10);

/// Where a session writes its frames.
pub enum RenderTarget {
    /// Standard error.
    Stderr,
    /// Standard output.
    Stdout,
    /// Nothing is written; the loop still runs so closed indicators are disposed.
    Hidden,
    /// A caller-supplied sink.
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => f.write_str("Stderr"),
            Self::Stdout => f.write_str("Stdout"),
            Self::Hidden => f.write_str("Hidden"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl RenderTarget {
    /// Stderr if it is a terminal, otherwise hidden.
    #[must_use]
    pub fn detect() -> Self {
        if io::stderr().is_terminal() {
            Self::Stderr
        } else {
            Self::Hidden
        }
    }

    fn into_sink(self) -> Option<Sink> {
        match self {
            Self::Stderr => Some(Sink {
                terminal: io::stderr().is_terminal(),
                out: Box::new(io::stderr()),
            }),
            Self::Stdout => Some(Sink {
                terminal: io::stdout().is_terminal(),
                out: Box::new(io::stdout()),
            }),
            Self::Hidden => None,
            Self::Writer(out) => Some(Sink {
                out,
                terminal: false,
            }),
        }
    }
}

struct Sink {
    out: Box<dyn Write + Send>,
    /// Lines are cut to the terminal width when set.
    terminal: bool,
}

/// Settings of a [`Session`].
#[derive(Debug)]
pub struct SessionConfig {
    /// Interval between redraws. Clamped to at least [`MIN_REFRESH`].
    pub refresh: Duration,
    /// Output sink.
    pub target: RenderTarget,
    /// Width of the bar, in cells.
    pub bar_width: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH,
            target: RenderTarget::detect(),
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }
}

impl SessionConfig {
    /// Default settings writing to `target`.
    #[must_use]
    pub fn with_target(target: RenderTarget) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }
}

/// Loop state shared between a session, its store and the render thread.
#[derive(Default)]
pub(crate) struct Signal {
    state: Mutex<LoopState>,
    /// Wakes the render thread before its refresh interval is up.
    wake: Condvar,
    /// Notified after every tick and when the thread exits.
    painted: Condvar,
}

#[derive(Default)]
struct LoopState {
    stop: bool,
    running: bool,
    /// Paint requests issued so far.
    requested: u64,
    /// Latest request covered by a finished tick.
    painted: u64,
}

impl Signal {
    fn running() -> Self {
        Self {
            state: Mutex::new(LoopState {
                running: true,
                ..LoopState::default()
            }),
            ..Self::default()
        }
    }

    /// Blocks until a tick that started after this call has been written.
    ///
    /// Returns at once when no render thread is running.
    pub(crate) fn flush(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }

        state.requested += 1;
        let target = state.requested;
        self.wake.notify_one();

        while state.running && state.painted < target {
            self.painted.wait(&mut state);
        }
    }
}

/// Marks the loop as gone on every exit path and releases blocked flushes.
struct LoopExit<'a>(&'a Signal);

impl Drop for LoopExit<'_> {
    fn drop(&mut self) {
        self.0.state.lock().running = false;
        self.0.painted.notify_all();
    }
}

/// A store plus the render loop painting it.
pub struct Session {
    store: StateStore,
    signal: Arc<Signal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("running", &self.thread.lock().is_some())
            .finish()
    }
}

impl Session {
    /// Starts a session and its render thread.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Spawn`] if the thread cannot be started.
    pub fn new(config: SessionConfig) -> Result<Self, ProgressError> {
        let signal = Arc::new(Signal::running());
        let store = StateStore::painted_by(Arc::clone(&signal));
        let refresh = config.refresh.max(MIN_REFRESH);
        let renderer = Renderer::new(config.bar_width);
        let sink = config.target.into_sink();

        let thread = {
            let store = store.clone();
            let signal = Arc::clone(&signal);
            thread::Builder::new()
                .name("livebar-render".into())
                .spawn(move || render_loop(&store, &signal, renderer, sink, refresh))
                .map_err(ProgressError::Spawn)?
        };

        Ok(Self {
            store,
            signal,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Creates a session without a render thread.
    ///
    /// Nothing is drawn and closed indicators are disposed immediately.
    #[must_use]
    pub fn headless() -> Self {
        Self {
            store: StateStore::headless(),
            signal: Arc::new(Signal::default()),
            thread: Mutex::new(None),
        }
    }

    /// Returns the process-wide default session, starting it on first use.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Session> = OnceLock::new();

        GLOBAL.get_or_init(|| {
            Self::new(SessionConfig::default()).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "progress rendering disabled");
                Self::headless()
            })
        })
    }

    /// Returns the store painted by this session.
    #[must_use]
    pub const fn store(&self) -> &StateStore {
        &self.store
    }

    /// Registers a new indicator in this session.
    #[must_use]
    pub fn progress(&self, builder: ProgressBuilder) -> Progress {
        builder.build_in(self)
    }

    /// Blocks until a frame taken after this call has been written.
    ///
    /// Returns at once for headless sessions and after shutdown.
    pub fn flush(&self) {
        self.signal.flush();
    }

    /// Stops the render loop after one final tick. Idempotent.
    ///
    /// Indicators registered afterwards are never drawn and are disposed as soon as
    /// they close.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };

        self.signal.state.lock().stop = true;
        self.signal.wake.notify_one();

        if thread.join().is_err() {
            tracing::debug!("render thread panicked");
        }
        self.store.make_headless();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_loop(
    store: &StateStore,
    signal: &Signal,
    mut renderer: Renderer,
    mut sink: Option<Sink>,
    refresh: Duration,
) {
    let _exit = LoopExit(signal);

    loop {
        let (stop, request) = {
            let mut state = signal.state.lock();
            if !state.stop && state.requested == state.painted {
                let _ = signal.wake.wait_for(&mut state, refresh);
            }
            (state.stop, state.requested)
        };

        match sink.as_mut() {
            Some(sink) => {
                if sink.terminal {
                    let width = terminal::size()
                        .ok()
                        .map(|(cols, _)| cols)
                        .filter(|&cols| cols > 0);
                    renderer.set_max_width(width);
                }
                renderer.tick(store, &mut sink.out);
            }
            None => {
                let _ = store.snapshot();
            }
        }

        signal.state.lock().painted = request;
        signal.painted.notify_all();

        if stop {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        sync::Arc,
        thread,
        time::Duration,
    };

    use parking_lot::Mutex;

    use super::{RenderTarget, Session, SessionConfig};
    use crate::{
        builder::ProgressBuilder,
        iter::ProgressIteratorExt as _,
        progress::ProgressPhase,
    };

    /// Shared in-memory terminal.
    #[derive(Clone, Default)]
    struct Screen(Arc<Mutex<Vec<u8>>>);

    impl Screen {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for Screen {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session(screen: &Screen) -> Session {
        Session::new(SessionConfig {
            refresh: Duration::from_millis(10),
            ..SessionConfig::with_target(RenderTarget::Writer(Box::new(screen.clone())))
        })
        .unwrap()
    }

    /// Final Line On Shutdown
    /// Indicators closed right before shutdown still get painted.
    #[test]
    fn test_shutdown_paints_final_lines() {
        let screen = Screen::default();
        let session = session(&screen);

        let items: Vec<_> = (0..10)
            .progress_in(&session, ProgressBuilder::new("final-task"))
            .collect();
        assert_eq!(items.len(), 10);

        session.shutdown();
        session.shutdown();

        let text = screen.text();
        assert!(text.contains("final-task: 100%|"));
        assert!(session.store().is_empty());
    }

    /// Paint On Close
    /// A finished line is on screen as soon as `close` returns, long before the next
    /// scheduled redraw.
    #[test]
    fn test_close_waits_for_final_paint() {
        let screen = Screen::default();
        let session = Session::new(SessionConfig {
            refresh: Duration::from_secs(30),
            ..SessionConfig::with_target(RenderTarget::Writer(Box::new(screen.clone())))
        })
        .unwrap();

        let total = (0..5)
            .progress_in(&session, ProgressBuilder::new("exit-bar"))
            .count();
        assert_eq!(total, 5);

        assert!(screen.text().contains("exit-bar: 100%|"));
        assert!(session.store().is_empty());
    }

    /// Flush
    /// `flush` returns once a frame taken after the call has been written.
    #[test]
    fn test_flush_draws_open_indicators() {
        let screen = Screen::default();
        let session = Session::new(SessionConfig {
            refresh: Duration::from_secs(30),
            ..SessionConfig::with_target(RenderTarget::Writer(Box::new(screen.clone())))
        })
        .unwrap();

        let p = session.progress(ProgressBuilder::new_bar("pending", 4u64));
        p.update(1);
        session.flush();
        assert!(screen.text().contains("pending:  25%|"));

        session.shutdown();
        session.flush();
        Session::headless().flush();
    }

    /// After Shutdown
    /// Indicators registered on a stopped session are disposed when they close and
    /// do not pile up in new display slots.
    #[test]
    fn test_shutdown_disposes_later_indicators() {
        let screen = Screen::default();
        let session = session(&screen);

        let kept = session.progress(ProgressBuilder::new("closed before stop"));
        kept.close();
        session.shutdown();
        assert!(session.store().is_empty());

        for i in 0..5 {
            let p = session.progress(ProgressBuilder::new(format!("late {i}")));
            assert_eq!(p.snapshot().unwrap().position(), 0);
            assert!(p.close());
        }
        assert!(session.store().is_empty());
    }

    /// Render Loop Disposal
    /// The loop disposes closed indicators on its own.
    #[test]
    fn test_loop_reaps_closed_entries() {
        let screen = Screen::default();
        let session = session(&screen);

        let p = session.progress(ProgressBuilder::new_bar("reaped", 3u64));
        p.update(3);
        p.close();

        for _ in 0..200 {
            if p.phase() == ProgressPhase::Disposed {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(p.phase(), ProgressPhase::Disposed);
        assert_eq!(p.snapshot().unwrap().completed(), 3);
    }

    /// Hidden Target
    /// A hidden session still runs its loop and disposes indicators.
    #[test]
    fn test_hidden_session() {
        let session = Session::new(SessionConfig {
            refresh: Duration::from_millis(10),
            ..SessionConfig::with_target(RenderTarget::Hidden)
        })
        .unwrap();

        let p = session.progress(ProgressBuilder::new("quiet"));
        p.close();
        session.shutdown();

        assert!(session.store().is_empty());
    }

    /// Headless Session
    /// Without a render thread, closing disposes immediately.
    #[test]
    fn test_headless_session() {
        let session = Session::headless();
        let p = session.progress(ProgressBuilder::new("nobody watching"));
        p.inc();
        assert!(p.close());
        assert_eq!(p.phase(), ProgressPhase::Disposed);
        session.shutdown();
    }

    /// Many Threads
    /// Concurrent workers share one session and each reach their own total.
    #[test]
    fn test_concurrent_workers() {
        let screen = Screen::default();
        let session = session(&screen);

        let counts: Vec<usize> = thread::scope(|s| {
            let workers: Vec<_> = (1..=5)
                .map(|i| {
                    let session = &session;
                    s.spawn(move || {
                        (0..i * 10)
                            .progress_in(session, ProgressBuilder::new(format!("worker {i}")))
                            .count()
                    })
                })
                .collect();
            workers.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counts, vec![10, 20, 30, 40, 50]);
        session.shutdown();
        assert!(session.store().is_empty());
    }
}
