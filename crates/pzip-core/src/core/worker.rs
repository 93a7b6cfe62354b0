use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;

use super::cancel::CancelToken;
use crate::error::{PzipError, Result};

const STATE_NEW: u8 = 0;
const STATE_OPENED: u8 = 1;
const STATE_CLOSED: u8 = 2;

pub type Executor<T> = Arc<dyn Fn(T) -> Result<()> + Send + Sync>;

/// Bounded worker group that stops at the first executor error.
///
/// Items flow through a bounded channel into `parallelism` threads.
/// The first error wins a compare-and-swap, is stored for
/// [`FailFastWorker::wait`], and fires the group's own cancel token so
/// blocked submitters and idle workers unwind. In-flight executors are
/// not interrupted; draining is cooperative.
pub struct FailFastWorker<T> {
    executor: Executor<T>,
    parallelism: usize,
    capacity: usize,
    state: AtomicU8,
    runtime: Mutex<Option<Runtime<T>>>,
}

struct Runtime<T> {
    tx: Sender<T>,
    own: CancelToken,
    parent: CancelToken,
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct Shared {
    failed: AtomicBool,
    error: Mutex<Option<PzipError>>,
}

impl Shared {
    /// Records `err` if it is the first failure and fires `own` with
    /// its message as the cancellation cause.
    fn record(&self, own: &CancelToken, err: PzipError) {
        if self
            .failed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let cause = err.to_string();
            *self.error.lock() = Some(err);
            own.cancel(cause);
        }
    }
}

impl<T: Send + 'static> FailFastWorker<T> {
    pub fn new(
        executor: impl Fn(T) -> Result<()> + Send + Sync + 'static,
        parallelism: usize,
        capacity: usize,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            parallelism,
            capacity,
            state: AtomicU8::new(STATE_NEW),
            runtime: Mutex::new(None),
        }
    }

    /// Spawns the worker threads. The group cancels itself on first
    /// error and also observes `parent`.
    pub fn start(&self, parent: &CancelToken) {
        let (tx, rx) = bounded(self.capacity);
        let own = CancelToken::new();
        let shared = Arc::new(Shared::default());

        let mut handles = Vec::with_capacity(self.parallelism);
        for _ in 0..self.parallelism {
            let rx = rx.clone();
            let own = own.clone();
            let parent = parent.clone();
            let shared = Arc::clone(&shared);
            let executor = Arc::clone(&self.executor);
            handles.push(thread::spawn(move || {
                run_worker(rx, own, parent, shared, executor);
            }));
        }

        *self.runtime.lock() = Some(Runtime {
            tx,
            own,
            parent: parent.clone(),
            shared,
            handles,
        });
        self.state.store(STATE_OPENED, Ordering::Release);
    }

    /// Enqueues `task`, blocking while the channel is at capacity.
    /// Fails immediately once any worker has failed, on lifecycle
    /// misuse, or when a cancel token fires while blocked.
    pub fn submit(&self, task: T) -> Result<()> {
        let (tx, own, parent, shared) = {
            let guard = self.runtime.lock();
            match guard.as_ref() {
                Some(rt) => (
                    rt.tx.clone(),
                    rt.own.clone(),
                    rt.parent.clone(),
                    Arc::clone(&rt.shared),
                ),
                None => {
                    return Err(if self.is_closed() {
                        PzipError::WorkerClosed
                    } else {
                        PzipError::WorkerNotOpened
                    })
                }
            }
        };

        if shared.failed.load(Ordering::Acquire) {
            return Err(PzipError::Cancelled(cancel_cause(&own, &parent)));
        }

        let own_signal = own.signal();
        let parent_signal = parent.signal();
        select! {
            send(tx, task) -> res => res.map_err(|_| PzipError::WorkerClosed),
            recv(own_signal) -> _ => Err(PzipError::Cancelled(cancel_cause(&own, &parent))),
            recv(parent_signal) -> _ => Err(PzipError::Cancelled(cancel_cause(&own, &parent))),
        }
    }

    /// Closes the task channel, joins every worker, and returns the
    /// first recorded error.
    pub fn wait(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => return Err(PzipError::WorkerClosed),
            STATE_NEW => return Err(PzipError::WorkerNotOpened),
            _ => {}
        }

        let Some(runtime) = self.runtime.lock().take() else {
            return Err(PzipError::WorkerClosed);
        };
        let Runtime {
            tx,
            shared,
            handles,
            ..
        } = runtime;
        drop(tx); // closes the channel; workers drain and exit

        let mut panicked = false;
        for handle in handles {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        self.state.store(STATE_CLOSED, Ordering::Release);

        let stored = shared.error.lock().take();
        match stored {
            Some(err) => Err(err),
            None if panicked => Err(PzipError::InvalidState("worker thread panicked")),
            None => Ok(()),
        }
    }

    pub fn is_opened(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPENED
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CLOSED
    }
}

fn cancel_cause(own: &CancelToken, parent: &CancelToken) -> String {
    own.cause()
        .or_else(|| parent.cause())
        .unwrap_or_else(|| "context cancelled".to_string())
}

fn run_worker<T>(
    tasks: Receiver<T>,
    own: CancelToken,
    parent: CancelToken,
    shared: Arc<Shared>,
    executor: Executor<T>,
) {
    let own_signal = own.signal();
    let parent_signal = parent.signal();
    loop {
        select! {
            recv(tasks) -> msg => match msg {
                Ok(task) => {
                    if let Err(err) = executor(task) {
                        shared.record(&own, err);
                        return;
                    }
                }
                // Channel closed and drained.
                Err(_) => return,
            },
            recv(own_signal) -> _ => {
                shared.record(&own, PzipError::Cancelled(cancel_cause(&own, &parent)));
                return;
            }
            recv(parent_signal) -> _ => {
                shared.record(&own, PzipError::Cancelled(cancel_cause(&own, &parent)));
                return;
            }
        }
    }
}
