// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Task-execution seam for broadcast handlers.
//!
//! The dispatcher never runs broadcast handlers itself: it builds a task
//! and a dedup key and hands both to a [`TaskExecutor`].  Retry, backoff
//! and worker pools belong to the executor.
//!
//! [`WorkerPool`] is the default executor. [`InlineExecutor`] runs tasks on
//! the caller's thread and is meant for tests and single-threaded tools.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::handler::HandlerError;

/// Deferred handler invocation.
pub type Task = Box<dyn FnOnce() -> std::result::Result<Value, HandlerError> + Send + 'static>;

/// Reference to a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef(String);

impl TaskRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplicating task scheduler.
///
/// Scheduling twice with the same `dedup_key` must run the task at most
/// once; the second call returns the first call's reference.
pub trait TaskExecutor: Send + Sync {
    fn schedule(&self, dedup_key: &str, handler_identity: &str, task: Task) -> Result<TaskRef>;
}

/// Dedup key for one handler and one message.
pub fn dedup_key(correlation_id: &str, handler_identity: &str) -> String {
    format!("{}:{}", correlation_id, handler_identity)
}

#[derive(Debug, Default)]
struct Counters {
    executed: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    /// Run `task`, logging and counting failures and panics.
    fn run(&self, task_ref: &TaskRef, handler_identity: &str, task: Task) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        match catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Handler '{}' failed ({}): {}", handler_identity, task_ref, err);
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Handler '{}' panicked ({})", handler_identity, task_ref);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

struct Job {
    task_ref: TaskRef,
    handler_identity: String,
    task: Task,
}

/// Dedup keys seen recently, oldest evicted first once `capacity` is hit.
struct Ledger {
    refs: HashMap<String, TaskRef>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Ledger {
    fn new(capacity: usize) -> Self {
        Self {
            refs: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<&TaskRef> {
        self.refs.get(key)
    }

    fn insert(&mut self, key: &str, task_ref: TaskRef) {
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.refs.remove(&oldest);
            }
        }
        self.order.push_back(key.to_string());
        self.refs.insert(key.to_string(), task_ref);
    }

    fn len(&self) -> usize {
        self.refs.len()
    }
}

/// Fixed set of worker threads fed through a channel.
///
/// Dedup keys are remembered in a bounded ledger; a key evicted from it can
/// be scheduled again. Dropping the pool stops accepting work, lets the
/// workers drain the queue, and joins them.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    ledger: Mutex<Ledger>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawn `config.workers` threads.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers.max(1) {
            let receiver = receiver.clone();
            let counters = counters.clone();
            let handle = std::thread::Builder::new()
                .name(format!("saltbus-worker-{}", index))
                .spawn(move || {
                    for job in receiver.iter() {
                        counters.run(&job.task_ref, &job.handler_identity, job.task);
                    }
                })
                .map_err(|e| Error::Schedule(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }
        tracing::debug!("Started {} saltbus worker(s)", workers.len());

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            ledger: Mutex::new(Ledger::new(config.ledger_capacity)),
            counters,
        })
    }

    /// Tasks run so far.
    pub fn executed(&self) -> usize {
        self.counters.executed.load(Ordering::Relaxed)
    }

    /// Tasks that returned an error or panicked.
    pub fn failed(&self) -> usize {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Dedup keys currently remembered.
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Stop accepting tasks, run what is queued, and join the workers.
    /// Later calls to `schedule` fail.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            // The last reference may be dropped by a task on a worker.
            if handle.thread().id() == std::thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("Saltbus worker exited by panic");
            }
        }
    }
}

impl TaskExecutor for WorkerPool {
    fn schedule(&self, dedup_key: &str, handler_identity: &str, task: Task) -> Result<TaskRef> {
        let mut ledger = self.ledger.lock();
        if let Some(existing) = ledger.get(dedup_key) {
            tracing::debug!(
                "Task {} already scheduled; skipping duplicate for '{}'",
                dedup_key,
                handler_identity
            );
            return Ok(existing.clone());
        }

        let task_ref = TaskRef::new(dedup_key);
        let job = Job {
            task_ref: task_ref.clone(),
            handler_identity: handler_identity.to_string(),
            task,
        };
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(Error::Schedule("worker pool is shut down".into()));
        };
        sender
            .send(job)
            .map_err(|_| Error::Schedule("worker pool has no running workers".into()))?;

        ledger.insert(dedup_key, task_ref.clone());
        Ok(task_ref)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// InlineExecutor
// ---------------------------------------------------------------------------

/// Runs tasks on the scheduling thread, once per dedup key.
///
/// Dispatch blocks until every broadcast handler returns, and the ledger
/// keeps every key it has seen. Use it in tests and short-lived tools.
///
/// Failures (and panics) are logged against the handler and counted; they
/// never reach the dispatcher.
#[derive(Default)]
pub struct InlineExecutor {
    ledger: DashMap<String, TaskRef>,
    counters: Counters,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks actually run.
    pub fn executed(&self) -> usize {
        self.counters.executed.load(Ordering::Relaxed)
    }

    /// Tasks that returned an error or panicked.
    pub fn failed(&self) -> usize {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn is_scheduled(&self, dedup_key: &str) -> bool {
        self.ledger.contains_key(dedup_key)
    }
}

impl TaskExecutor for InlineExecutor {
    fn schedule(&self, dedup_key: &str, handler_identity: &str, task: Task) -> Result<TaskRef> {
        let task_ref = match self.ledger.entry(dedup_key.to_string()) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    "Task {} already scheduled; skipping duplicate for '{}'",
                    dedup_key,
                    handler_identity
                );
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => slot.insert(TaskRef::new(dedup_key)).clone(),
        };

        self.counters.run(&task_ref, handler_identity, task);
        Ok(task_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn counting(counter: &Arc<AtomicUsize>) -> Task {
        let counter = counter.clone();
        Box::new(move || -> std::result::Result<Value, HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
    }

    #[test]
    fn dedup_key_format() {
        assert_eq!(dedup_key("msg-1", "billing::on_order"), "msg-1:billing::on_order");
    }

    #[test]
    fn same_key_runs_once() {
        let exec = InlineExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = exec.schedule("m1:h", "h", counting(&counter)).unwrap();
        let second = exec.schedule("m1:h", "h", counting(&counter)).unwrap();

        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exec.executed(), 1);
        assert!(exec.is_scheduled("m1:h"));
    }

    #[test]
    fn distinct_keys_run_separately() {
        let exec = InlineExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        exec.schedule("m1:a", "a", counting(&counter)).unwrap();
        exec.schedule("m1:b", "b", counting(&counter)).unwrap();
        exec.schedule("m2:a", "a", counting(&counter)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failures_and_panics_are_contained() {
        let exec = InlineExecutor::new();
        let failing: Task = Box::new(|| -> std::result::Result<Value, HandlerError> {
            Err(HandlerError::internal("boom"))
        });
        let panicking: Task = Box::new(|| -> std::result::Result<Value, HandlerError> {
            panic!("handler bug")
        });
        exec.schedule("m1:a", "a", failing).unwrap();
        exec.schedule("m1:b", "b", panicking).unwrap();
        assert_eq!(exec.executed(), 2);
        assert_eq!(exec.failed(), 2);
    }

    fn pool(workers: usize, ledger_capacity: usize) -> WorkerPool {
        WorkerPool::new(&ExecutorConfig {
            workers,
            ledger_capacity,
        })
        .unwrap()
    }

    #[test]
    fn pool_runs_each_key_once() {
        let pool = pool(4, 1024);
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..50 {
            let key = dedup_key(&format!("m{}", i % 10), "h");
            pool.schedule(&key, "h", counting(&counter)).unwrap();
        }
        pool.shutdown();

        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.executed(), 10);
        assert_eq!(pool.ledger_len(), 10);
    }

    #[test]
    fn pool_does_not_block_the_caller() {
        let pool = pool(1, 16);
        let (release, gate) = channel::bounded::<()>(0);
        let done = Arc::new(AtomicBool::new(false));
        let finished = done.clone();
        let blocked: Task = Box::new(move || -> std::result::Result<Value, HandlerError> {
            let _ = gate.recv();
            finished.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        });

        pool.schedule("m1:slow", "slow", blocked).unwrap();
        assert!(!done.load(Ordering::SeqCst));
        release.send(()).unwrap();
        pool.shutdown();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn pool_ledger_is_bounded() {
        let pool = pool(2, 3);
        let counter = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "c", "d"] {
            pool.schedule(key, "h", counting(&counter)).unwrap();
        }
        assert_eq!(pool.ledger_len(), 3);

        // "a" was evicted, "d" is still remembered.
        pool.schedule("a", "h", counting(&counter)).unwrap();
        pool.schedule("d", "h", counting(&counter)).unwrap();
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn pool_contains_failures() {
        let pool = pool(2, 16);
        let failing: Task = Box::new(|| -> std::result::Result<Value, HandlerError> {
            Err(HandlerError::internal("boom"))
        });
        let panicking: Task = Box::new(|| -> std::result::Result<Value, HandlerError> {
            panic!("handler bug")
        });
        pool.schedule("m1:a", "a", failing).unwrap();
        pool.schedule("m1:b", "b", panicking).unwrap();
        pool.shutdown();
        assert_eq!(pool.executed(), 2);
        assert_eq!(pool.failed(), 2);
    }

    #[test]
    fn schedule_after_shutdown_fails() {
        let pool = pool(1, 16);
        pool.shutdown();
        let counter = Arc::new(AtomicUsize::new(0));
        let err = pool.schedule("m1:h", "h", counting(&counter)).unwrap_err();
        assert!(matches!(err, Error::Schedule(_)));
        assert_eq!(pool.ledger_len(), 0);
    }
}
