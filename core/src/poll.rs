//! Task status polling.
//!
//! # Overview
//! The backend offers no push channel for task progress, so a submitted
//! task is observed by re-issuing `get_task_status` at a fixed interval
//! until it reports `success` or `failure`.
//!
//! # Design
//! - `TaskPoller` is the loop itself: synchronous, one request per tick,
//!   no backoff and no jitter. A failed check ends the loop without retry.
//! - `CancelToken` doubles as the interval timer so a cancelled loop wakes
//!   immediately instead of sleeping out its tick.
//! - `TaskWatcher` owns the loop's lifetime for a session. Submitting a new
//!   task cancels and joins the previous loop first, so at most one loop is
//!   ever active and no thread outlives its owner.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::config::{ClientConfig, DEFAULT_POLL_INTERVAL};
use crate::error::ApiError;
use crate::http::Transport;
use crate::types::{TaskCreate, TaskResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until the task terminates, however long that takes.
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

impl From<&ClientConfig> for PollConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// Cloneable cancellation flag with an interruptible sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`. Returns `true` if the token was cancelled
    /// before or during the wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// How a polling loop ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The task reached `success` or `failure`.
    Completed(TaskResponse),
    /// A status check failed. `last` is the last snapshot actually
    /// observed; it says nothing about how the task ended.
    Stopped { last: TaskResponse, error: ApiError },
    Cancelled { last: TaskResponse },
    Exhausted { last: TaskResponse, attempts: u32 },
}

impl PollOutcome {
    pub fn last(&self) -> &TaskResponse {
        match self {
            PollOutcome::Completed(last)
            | PollOutcome::Stopped { last, .. }
            | PollOutcome::Cancelled { last }
            | PollOutcome::Exhausted { last, .. } => last,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }
}

/// Drives status checks for one task until it is terminal.
pub struct TaskPoller<'a, T> {
    client: &'a ApiClient<T>,
    config: PollConfig,
    cancel: CancelToken,
}

impl<'a, T: Transport> TaskPoller<'a, T> {
    pub fn new(client: &'a ApiClient<T>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Poll starting from `initial` (usually what `create_task` returned).
    /// `observe` sees every fresh snapshot, including the terminal one.
    pub fn run<F>(&self, initial: TaskResponse, mut observe: F) -> PollOutcome
    where
        F: FnMut(&TaskResponse),
    {
        if initial.is_terminal() {
            return PollOutcome::Completed(initial);
        }

        let mut last = initial;
        let mut attempts = 0u32;
        loop {
            if let Some(max) = self.config.max_attempts {
                if attempts >= max {
                    warn!(task_id = %last.task_id, attempts, "task still not terminal, giving up");
                    return PollOutcome::Exhausted { last, attempts };
                }
            }
            if self.cancel.wait(self.config.interval) {
                debug!(task_id = %last.task_id, attempts, "polling cancelled");
                return PollOutcome::Cancelled { last };
            }

            attempts += 1;
            match self.client.get_task_status(&last.task_id) {
                Ok(snapshot) => {
                    debug!(task_id = %snapshot.task_id, status = %snapshot.status, attempts, "task status");
                    observe(&snapshot);
                    last = snapshot;
                    if last.is_terminal() {
                        info!(task_id = %last.task_id, status = %last.status, attempts, "task finished");
                        return PollOutcome::Completed(last);
                    }
                }
                Err(error) => {
                    warn!(task_id = %last.task_id, %error, "task status check failed, polling stopped");
                    return PollOutcome::Stopped { last, error };
                }
            }
        }
    }
}

/// Events delivered to whoever is displaying a watched task.
#[derive(Debug)]
pub enum PollEvent {
    Snapshot(TaskResponse),
    Finished(PollOutcome),
}

struct ActiveLoop {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// Session-scoped owner of the task currently on display and of the single
/// polling loop observing it.
pub struct TaskWatcher<T> {
    client: Arc<ApiClient<T>>,
    config: PollConfig,
    current: Arc<Mutex<Option<TaskResponse>>>,
    active: Option<ActiveLoop>,
}

impl<T> TaskWatcher<T> {
    /// Latest snapshot of the watched task.
    pub fn current(&self) -> Option<TaskResponse> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_polling(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Cancel the active loop, if any, and wait for its thread to exit.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if active.handle.join().is_err() {
                warn!("polling thread panicked");
            }
        }
    }
}

impl<T: Transport + 'static> TaskWatcher<T> {
    pub fn new(client: Arc<ApiClient<T>>, config: PollConfig) -> Self {
        Self {
            client,
            config,
            current: Arc::new(Mutex::new(None)),
            active: None,
        }
    }

    /// Submit a task and start watching it. The previously watched task, if
    /// any, stops being polled once the submission is accepted.
    pub fn submit(&mut self, task: &TaskCreate) -> Result<Receiver<PollEvent>, ApiError> {
        let initial = self.client.create_task(task)?;
        info!(task_id = %initial.task_id, task_type = %initial.task_type, "task submitted");
        Ok(self.watch(initial))
    }

    /// Start watching an already submitted task.
    pub fn watch(&mut self, initial: TaskResponse) -> Receiver<PollEvent> {
        self.stop();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(initial.clone());

        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let client = Arc::clone(&self.client);
        let current = Arc::clone(&self.current);
        let config = self.config;

        let handle = thread::spawn(move || {
            let poller = TaskPoller::new(&client, config).with_cancel(token);
            let outcome = poller.run(initial, |snapshot| {
                *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
                // The receiver may have been dropped; the snapshot is still kept.
                let _ = tx.send(PollEvent::Snapshot(snapshot.clone()));
            });
            let _ = tx.send(PollEvent::Finished(outcome));
        });

        self.active = Some(ActiveLoop { cancel, handle });
        rx
    }
}

impl<T> Drop for TaskWatcher<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
