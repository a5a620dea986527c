//! Batch coordinator: fetch many locators concurrently under one deadline.
//!
//! `run_batch` queues one task per locator and drains the queue with at most
//! `max_concurrency` worker threads (the calling thread is one of them). Each
//! task:
//!
//! 1. waits for an admission slot (at most `max_concurrency` held at once),
//! 2. checks the batch's cancel signal once; if it has fired, the task skips
//!    silently,
//! 3. otherwise fetches via the transport and hands the response to the
//!    callback,
//! 4. records its error (if any) and releases the slot.
//!
//! The cancel signal fires when the batch timeout elapses or when the first
//! task fails. It is only consulted at step 2: a fetch or callback that has
//! already started always runs to completion. The batch returns after every
//! task has finished, with the first recorded error.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::cancel::CancelSignal;
use crate::config::FetchConfig;
use crate::error::{BatchError, ConfigError};
use crate::limiter::AdmissionLimiter;
use crate::outcome::FirstError;
use crate::transport::Transport;

/// Immutable batch settings; one coordinator can run any number of batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinator {
    max_concurrency: usize,
    timeout: Duration,
}

/// Per-batch counts, returned by `run_batch_with_summary`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Tasks whose fetch and callback both succeeded.
    pub fetched: usize,
    /// Tasks that observed cancellation at admission and never fetched.
    pub skipped: usize,
    /// Tasks that reported an error (only the first is returned).
    pub failed: usize,
    pub elapsed: Duration,
}

/// Terminal state of one task.
#[derive(Debug)]
enum TaskOutcome {
    Fetched,
    Skipped,
    Failed,
}

/// Run state shared by the tasks of a single batch.
struct BatchRun {
    limiter: AdmissionLimiter,
    cancel: CancelSignal,
    first_error: FirstError,
}

impl Coordinator {
    /// `max_concurrency` must be at least 1. A zero `timeout` has already
    /// expired when the first task checks it, so every task skips.
    pub fn new(max_concurrency: usize, timeout: Duration) -> Result<Self, ConfigError> {
        if max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self {
            max_concurrency,
            timeout,
        })
    }

    pub fn from_config(cfg: &FetchConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.max_concurrency, cfg.timeout()?)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch every locator and pass each response to `callback`.
    ///
    /// Blocks until all tasks are done, then returns the first error any task
    /// reported (transport, callback or panic), or `Ok(())`. Tasks admitted
    /// after the deadline or after a failure skip without calling `callback`.
    pub fn run_batch<T, F>(
        &self,
        transport: &T,
        locators: &[T::Locator],
        callback: F,
    ) -> Result<(), BatchError>
    where
        T: Transport,
        F: Fn(&T::Locator, T::Response) -> anyhow::Result<()> + Sync,
    {
        let (result, summary) = self.run_batch_with_summary(transport, locators, callback);
        tracing::info!(
            fetched = summary.fetched,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed = ?summary.elapsed,
            "batch finished"
        );
        result
    }

    /// Like `run_batch`, also returning per-outcome task counts.
    pub fn run_batch_with_summary<T, F>(
        &self,
        transport: &T,
        locators: &[T::Locator],
        callback: F,
    ) -> (Result<(), BatchError>, BatchSummary)
    where
        T: Transport,
        F: Fn(&T::Locator, T::Response) -> anyhow::Result<()> + Sync,
    {
        let start = Instant::now();
        let mut summary = BatchSummary::default();
        if locators.is_empty() {
            return (Ok(()), summary);
        }

        let run = BatchRun {
            limiter: AdmissionLimiter::new(self.max_concurrency),
            cancel: CancelSignal::with_deadline(start, self.timeout),
            first_error: FirstError::new(),
        };
        tracing::debug!(
            tasks = locators.len(),
            max_concurrency = self.max_concurrency,
            timeout = ?self.timeout,
            "batch started"
        );

        let queue: Mutex<VecDeque<&T::Locator>> = Mutex::new(locators.iter().collect());
        let workers = run.limiter.capacity().min(locators.len());

        let outcomes: Vec<TaskOutcome> = thread::scope(|s| {
            let (run, queue, callback) = (&run, &queue, &callback);
            let mut handles = Vec::with_capacity(workers - 1);
            for id in 1..workers {
                let spawned = thread::Builder::new()
                    .name(format!("pget-worker-{}", id))
                    .spawn_scoped(s, move || run.drain(queue, transport, callback));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // The queue still drains on the workers already running.
                        tracing::warn!(error = %e, started = handles.len() + 1, "cannot start more batch workers");
                        break;
                    }
                }
            }
            let mut outcomes = run.drain(queue, transport, callback);
            for handle in handles {
                match handle.join() {
                    Ok(mut done) => outcomes.append(&mut done),
                    // Task bodies catch their own panics; this only trips if
                    // logging or recording itself panicked.
                    Err(payload) => {
                        let _ = run.first_error.record(BatchError::TaskPanicked {
                            locator: "<batch worker>".to_string(),
                            message: panic_message(payload.as_ref()),
                        });
                        outcomes.push(TaskOutcome::Failed);
                    }
                }
            }
            outcomes
        });

        for outcome in &outcomes {
            match outcome {
                TaskOutcome::Fetched => summary.fetched += 1,
                TaskOutcome::Skipped => summary.skipped += 1,
                TaskOutcome::Failed => summary.failed += 1,
            }
        }
        summary.elapsed = start.elapsed();
        (run.first_error.into_result(), summary)
    }
}

impl BatchRun {
    /// Run queued tasks until the queue is empty.
    fn drain<T, F>(
        &self,
        queue: &Mutex<VecDeque<&T::Locator>>,
        transport: &T,
        callback: &F,
    ) -> Vec<TaskOutcome>
    where
        T: Transport,
        F: Fn(&T::Locator, T::Response) -> anyhow::Result<()> + Sync,
    {
        let mut outcomes = Vec::new();
        loop {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(locator) = next else {
                return outcomes;
            };
            outcomes.push(self.task(transport, locator, callback));
        }
    }

    fn task<T, F>(&self, transport: &T, locator: &T::Locator, callback: &F) -> TaskOutcome
    where
        T: Transport,
        F: Fn(&T::Locator, T::Response) -> anyhow::Result<()> + Sync,
    {
        let _slot = self.limiter.acquire();

        // Single point-in-time check; the fetch below is not tied to the signal.
        if let Some(reason) = self.cancel.check() {
            tracing::debug!(%locator, ?reason, "skipped");
            return TaskOutcome::Skipped;
        }

        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            fetch_and_handle(transport, locator, callback)
        }));
        let err = match attempt {
            Ok(Ok(())) => return TaskOutcome::Fetched,
            Ok(Err(err)) => err,
            Err(payload) => BatchError::TaskPanicked {
                locator: locator.to_string(),
                message: panic_message(payload.as_ref()),
            },
        };

        // Record and cancel while still holding the slot, so whichever task is
        // admitted next already sees the failure.
        tracing::warn!(%locator, error = %err, "task failed");
        if let Err(later) = self.first_error.record(err) {
            tracing::debug!(%locator, error = %later, "discarding error after first failure");
        }
        if self.cancel.cancel() {
            tracing::debug!("batch cancelled by task failure");
        }
        TaskOutcome::Failed
    }
}

fn fetch_and_handle<T, F>(transport: &T, locator: &T::Locator, callback: &F) -> Result<(), BatchError>
where
    T: Transport,
    F: Fn(&T::Locator, T::Response) -> anyhow::Result<()>,
{
    tracing::debug!(%locator, "fetching");
    let response = transport
        .fetch(locator)
        .map_err(|e| BatchError::Transport {
            locator: locator.to_string(),
            source: Box::new(e),
        })?;
    callback(locator, response).map_err(|e| BatchError::Callback {
        locator: locator.to_string(),
        source: e.into(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
