//! Bounded per-scaffold task execution
//!
//! Tasks run on a rayon pool with exactly `max_concurrency` threads. The
//! submitting thread is throttled by a slot gate so at most
//! `max_concurrency` tasks are ever in flight or queued. A failing or
//! panicking task is recorded and never disturbs its siblings; the fault list
//! is handed back once every task has finished.

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// A task that returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFault {
    pub scaffold: String,
    pub message: String,
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scaffold, self.message)
    }
}

/// Counting gate limiting the number of outstanding tasks
struct SlotGate {
    free: Mutex<usize>,
    released: Condvar,
}

impl SlotGate {
    fn new(slots: usize) -> Self {
        Self {
            free: Mutex::new(slots),
            released: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut free = self.free.lock();
        while *free == 0 {
            self.released.wait(&mut free);
        }
        *free -= 1;
    }

    fn release(&self) {
        *self.free.lock() += 1;
        self.released.notify_one();
    }
}

pub struct ValidationWorkerPool {
    pool: rayon::ThreadPool,
    max_concurrency: usize,
}

impl ValidationWorkerPool {
    pub fn new(max_concurrency: usize) -> Result<Self, PoolError> {
        if max_concurrency == 0 {
            return Err(PoolError::ZeroConcurrency);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrency)
            .thread_name(|i| format!("pasa-lite-worker-{}", i))
            .build()?;
        Ok(Self { pool, max_concurrency })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `submit_all` on the calling thread, letting it hand tasks to the
    /// pool through a [`TaskSubmitter`]. Returns once every submitted task has
    /// finished, together with the faults of those that failed.
    pub fn run<'scope, F, R>(&self, submit_all: F) -> (R, Vec<WorkerFault>)
    where
        F: FnOnce(&TaskSubmitter<'_, 'scope>) -> R,
    {
        let gate = Arc::new(SlotGate::new(self.max_concurrency));
        let faults: Arc<Mutex<Vec<WorkerFault>>> = Arc::new(Mutex::new(Vec::new()));

        let result = self.pool.in_place_scope(|scope| {
            let submitter = TaskSubmitter {
                scope,
                gate: Arc::clone(&gate),
                faults: Arc::clone(&faults),
            };
            submit_all(&submitter)
        });

        let faults = std::mem::take(&mut *faults.lock());
        (result, faults)
    }
}

/// Handle for submitting tasks inside [`ValidationWorkerPool::run`]
pub struct TaskSubmitter<'a, 'scope> {
    scope: &'a rayon::Scope<'scope>,
    gate: Arc<SlotGate>,
    faults: Arc<Mutex<Vec<WorkerFault>>>,
}

impl<'scope> TaskSubmitter<'_, 'scope> {
    /// Block until a slot is free, then start `task` for `scaffold`
    pub fn submit<T>(&self, scaffold: &str, task: T)
    where
        T: FnOnce() -> anyhow::Result<()> + Send + 'scope,
    {
        self.gate.acquire();

        let gate = Arc::clone(&self.gate);
        let faults = Arc::clone(&self.faults);
        let scaffold = scaffold.to_string();
        self.scope.spawn(move |_| {
            let outcome = catch_unwind(AssertUnwindSafe(task));
            let message = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{:#}", err)),
                Err(payload) => Some(format!("task panicked: {}", panic_message(payload.as_ref()))),
            };
            if let Some(message) = message {
                log::error!("Task for scaffold {} failed: {}", scaffold, message);
                faults.lock().push(WorkerFault { scaffold, message });
            }
            gate.release();
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
