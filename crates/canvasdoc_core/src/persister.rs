//! Debounced persistence.
//!
//! [`DebouncedPersister`] turns a stream of "document changed" signals into
//! occasional runs of a persistence action:
//!
//! - With `leading` set, the first signal of an idle period runs the action
//!   right away (on a spawned task, so a synchronous burst of edits is still
//!   written once with its final state).
//! - Signals inside the window push the deadline back by `delay` and are
//!   coalesced into one trailing run.
//! - The deadline never moves past `window start + max_wait`, so a steady
//!   stream of signals cannot postpone the save forever.
//!
//! Runs never overlap. A failing run is reported to the error callback and
//! the next signal schedules a new attempt.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{CanvasDocError, Result};
use crate::host::BoxFuture;

/// The persistence action.
pub type PersistAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Receives errors of scheduled runs.
pub type PersistErrorCallback = Arc<dyn Fn(CanvasDocError) + Send + Sync>;

#[derive(Default)]
struct TimerState {
    deadline: Option<Instant>,
    window_start: Option<Instant>,
    /// A signal arrived that no run has picked up yet.
    pending: bool,
    timer: Option<JoinHandle<()>>,
    disposed: bool,
}

struct Shared {
    delay: Duration,
    max_wait: Duration,
    leading: bool,
    runtime: Handle,
    action: PersistAction,
    on_error: PersistErrorCallback,
    state: Mutex<TimerState>,
    run_lock: tokio::sync::Mutex<()>,
}

/// Coalesces change signals into debounced runs of a persistence action.
#[derive(Clone)]
pub struct DebouncedPersister {
    shared: Arc<Shared>,
}

impl DebouncedPersister {
    /// Create a persister that spawns its timers on `runtime`.
    ///
    /// `max_wait` is raised to `delay` if it is shorter.
    pub fn new(
        runtime: Handle,
        delay: Duration,
        max_wait: Duration,
        leading: bool,
        action: PersistAction,
        on_error: PersistErrorCallback,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                delay,
                max_wait: max_wait.max(delay),
                leading,
                runtime,
                action,
                on_error,
                state: Mutex::new(TimerState::default()),
                run_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Signal that the document changed.
    pub fn schedule(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock().unwrap();
        if state.disposed {
            return;
        }

        state.pending = true;
        if shared.delay.is_zero() {
            drop(state);
            self.spawn_run();
            return;
        }

        let now = Instant::now();
        match state.window_start {
            Some(window_start) => {
                state.deadline = Some((now + shared.delay).min(window_start + shared.max_wait));
            }
            None => {
                state.window_start = Some(now);
                state.deadline = Some(now + shared.delay);
                state.timer = Some(shared.runtime.spawn(Self::timer(Arc::clone(shared))));
                if shared.leading {
                    drop(state);
                    self.spawn_run();
                }
            }
        }
    }

    /// Run the action now if a signal is pending, and wait for any run in
    /// progress. Errors are returned instead of reported.
    pub async fn flush_now(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            Self::stop_timer(&mut state);
        }
        let _run = self.shared.run_lock.lock().await;
        if self.take_pending() {
            (self.shared.action)().await
        } else {
            Ok(())
        }
    }

    /// Drop the pending signal and stop the timer. Returns whether a signal
    /// was pending.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        Self::close_window(&mut state)
    }

    /// Cancel and refuse every later signal. Returns whether a signal was
    /// pending.
    pub fn dispose(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        state.disposed = true;
        Self::close_window(&mut state)
    }

    /// Whether a signal is waiting for a run that has not started yet.
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().unwrap().pending
    }

    /// True once [`DebouncedPersister::dispose`] ran.
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().unwrap().disposed
    }

    fn close_window(state: &mut TimerState) -> bool {
        Self::stop_timer(state);
        std::mem::take(&mut state.pending)
    }

    fn stop_timer(state: &mut TimerState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.deadline = None;
        state.window_start = None;
    }

    fn take_pending(&self) -> bool {
        std::mem::take(&mut self.shared.state.lock().unwrap().pending)
    }

    fn spawn_run(&self) {
        let persister = self.clone();
        self.shared.runtime.spawn(async move { persister.run_pending().await });
    }

    /// Run the action if a signal is still pending once the previous run
    /// finished. Errors go to the error callback.
    async fn run_pending(&self) {
        let _run = self.shared.run_lock.lock().await;
        if !self.take_pending() {
            return;
        }
        if let Err(e) = (self.shared.action)().await {
            (self.shared.on_error)(e);
        }
    }

    async fn timer(shared: Arc<Shared>) {
        loop {
            let deadline = match shared.state.lock().unwrap().deadline {
                Some(deadline) => deadline,
                None => return,
            };
            tokio::time::sleep_until(deadline).await;

            {
                let mut state = shared.state.lock().unwrap();
                match state.deadline {
                    Some(current) if current > Instant::now() => continue,
                    _ => {}
                }
                // Detach before running so that cancel() cannot abort a
                // write that already started.
                state.timer = None;
                state.deadline = None;
                state.window_start = None;
            }
            log::debug!("[DebouncedPersister] Debounce window closed");
            DebouncedPersister { shared }.run_pending().await;
            return;
        }
    }
}

impl std::fmt::Debug for DebouncedPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedPersister")
            .field("delay", &self.shared.delay)
            .field("max_wait", &self.shared.max_wait)
            .field("leading", &self.shared.leading)
            .finish()
    }
}
