//! Bounded, order-preserving task runner.
//!
//! All admitted tasks are polled on the caller's task; nothing is spawned.
//! At most `limit` tasks are in flight, and the result vector lines up with
//! the input vector regardless of completion order.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("concurrency limit must be at least 1")]
    ZeroLimit,
}

/// Why a task has no value in its result slot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task produced no result")]
    Lost,
}

pub type TaskOutcome<T> = Result<T, TaskFailure>;

/// Admission-control state, owned and mutated only by the run loop.
#[derive(Debug)]
struct Admission {
    limit: usize,
    in_flight: usize,
    next_index: usize,
    total: usize,
}

impl Admission {
    fn new(limit: usize, total: usize) -> Self {
        Self {
            limit,
            in_flight: 0,
            next_index: 0,
            total,
        }
    }

    fn can_admit(&self) -> bool {
        self.in_flight < self.limit && self.next_index < self.total
    }

    fn admit(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        self.in_flight += 1;
        index
    }

    fn complete(&mut self) {
        self.in_flight -= 1;
    }

    fn is_done(&self) -> bool {
        self.next_index >= self.total && self.in_flight == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    limit: usize,
}

impl Scheduler {
    pub fn new(limit: usize) -> Result<Self, SchedulerError> {
        if limit == 0 {
            return Err(SchedulerError::ZeroLimit);
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task, never more than `limit` at once.
    ///
    /// Each task is started lazily when a slot frees up. A panicking task is
    /// recorded as [`TaskFailure::Panicked`] at its own index; its siblings
    /// keep running.
    pub async fn run<T, F, Fut>(&self, tasks: Vec<F>) -> Vec<TaskOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let total = tasks.len();
        let mut pending = tasks.into_iter();
        let mut slots: Vec<Option<TaskOutcome<T>>> = (0..total).map(|_| None).collect();
        let mut admission = Admission::new(self.limit, total);
        let mut running = FuturesUnordered::new();

        debug!(total, limit = self.limit, "scheduler started");

        while !admission.is_done() {
            while admission.can_admit() {
                let Some(task) = pending.next() else { break };
                let index = admission.admit();
                running.push(async move {
                    let outcome = AssertUnwindSafe(async move { task().await })
                        .catch_unwind()
                        .await
                        .map_err(|payload| TaskFailure::Panicked(panic_message(payload)));
                    (index, outcome)
                });
            }

            match running.next().await {
                Some((index, outcome)) => {
                    if let Err(failure) = &outcome {
                        error!(index, %failure, "task failed");
                    }
                    slots[index] = Some(outcome);
                    admission.complete();
                }
                None => break,
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(TaskFailure::Lost)))
            .collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
