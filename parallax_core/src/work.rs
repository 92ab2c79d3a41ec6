// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-consumer work queue drained by a dedicated worker thread.
//!
//! [`WorkQueue`] is a mutex-guarded FIFO of [`WorkItem`]s paired with a
//! condition variable. [`WorkerThread`] owns one queue and one named OS
//! thread that pops items in submission order and runs them outside the lock,
//! one at a time.
//!
//! # Ordering contract
//!
//! - Items run in insertion order; items from one producer thread keep that
//!   thread's program order.
//! - At most one item runs at any instant, always on the worker thread.
//! - [`WorkerThread::stop`] abandons the backlog: the item currently running
//!   finishes, queued items are dropped without running.
//!
//! # Idle behaviour
//!
//! [`IdleStrategy::Park`] blocks on the condition variable until `submit` or
//! `stop` wakes the worker. [`IdleStrategy::Poll`] reproduces a fixed-interval
//! sleep loop (one pop per cycle). Both honour the ordering contract above.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// A deferred zero-argument action executed on the worker thread.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// How the worker waits when its queue is empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleStrategy {
    /// Block on a condition variable woken by `submit` and `stop`.
    Park,
    /// Pop at most one item per cycle, then sleep for the interval.
    Poll(Duration),
}

/// Configuration for a [`WorkerThread`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Name given to the spawned OS thread.
    pub thread_name: &'static str,
    /// Idle behaviour when the queue is empty.
    pub idle: IdleStrategy,
}

impl WorkerConfig {
    /// Sleep interval of the polling preset.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Condition-variable worker (no idle wake-ups, no added latency).
    #[must_use]
    pub const fn parked() -> Self {
        Self {
            thread_name: "RenderThread",
            idle: IdleStrategy::Park,
        }
    }

    /// Fixed 1 ms polling worker.
    #[must_use]
    pub const fn polling() -> Self {
        Self {
            thread_name: "RenderThread",
            idle: IdleStrategy::Poll(Self::POLL_INTERVAL),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::parked()
    }
}

/// Errors from [`WorkerThread`] and [`WorkQueue`] operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerError {
    /// `start` was called on a worker that has already been started.
    AlreadyStarted,
    /// The operation needs a running worker and none was started.
    NotStarted,
    /// The worker was stopped; no further work is accepted.
    Stopped,
    /// The operation would block the worker on itself.
    OnWorkerThread,
    /// The OS refused to spawn the worker thread.
    Spawn(io::ErrorKind),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => f.write_str("worker thread already started"),
            Self::NotStarted => f.write_str("worker thread not started"),
            Self::Stopped => f.write_str("worker thread stopped"),
            Self::OnWorkerThread => f.write_str("operation would block the worker on itself"),
            Self::Spawn(kind) => write!(f, "failed to spawn worker thread ({kind})"),
        }
    }
}

impl core::error::Error for WorkerError {}

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    closed: bool,
}

enum Next {
    Item(WorkItem),
    Empty,
    Closed,
}

/// Mutex-guarded FIFO of [`WorkItem`]s with a wake-up condition variable.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("WorkQueue")
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl WorkQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Items never run under this lock, so a poisoned guard still holds a
    // consistent deque.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `item` to the tail and wakes a parked consumer.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] if the queue was closed; the item is
    /// dropped without running.
    pub fn push(&self, item: WorkItem) -> Result<(), WorkerError> {
        self.push_then(item, || ())
    }

    /// Appends `item`, then runs `then` before the queue lock is released.
    ///
    /// No consumer can pop `item`, and no producer can queue behind it,
    /// until `then` returns.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] if the queue was closed; neither
    /// `item` nor `then` runs.
    pub fn push_then<R>(&self, item: WorkItem, then: impl FnOnce() -> R) -> Result<R, WorkerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(WorkerError::Stopped);
        }
        state.items.push_back(item);
        let out = then();
        drop(state);
        self.ready.notify_one();
        Ok(out)
    }

    /// Pops the head item without blocking.
    #[must_use]
    pub fn try_pop(&self) -> Option<WorkItem> {
        match self.next() {
            Next::Item(item) => Some(item),
            Next::Empty | Next::Closed => None,
        }
    }

    /// Closes the queue, dropping every pending item.
    ///
    /// Returns the number of items discarded. Closing twice is a no-op.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let discarded = core::mem::take(&mut state.items);
        drop(state);
        self.ready.notify_all();
        // Dropped outside the lock: closures may own arbitrary captures.
        discarded.len()
    }

    /// Returns the number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn next(&self) -> Next {
        let mut state = self.lock();
        if state.closed {
            return Next::Closed;
        }
        match state.items.pop_front() {
            Some(item) => Next::Item(item),
            None => Next::Empty,
        }
    }

    /// Blocks until an item is available or the queue closes.
    fn wait_pop(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Shared {
    queue: WorkQueue,
    worker_id: OnceLock<ThreadId>,
}

/// A dedicated thread draining a [`WorkQueue`].
///
/// All methods take `&self` so the worker can be shared by reference between
/// the display-callback thread and the lifecycle owner.
///
/// # Example
///
/// ```
/// use parallax_core::work::{WorkerConfig, WorkerThread};
///
/// let worker = WorkerThread::new(WorkerConfig::parked());
/// worker.start().unwrap();
/// worker.submit(|| println!("on the worker")).unwrap();
/// worker.barrier().unwrap();
/// worker.stop();
/// ```
pub struct WorkerThread {
    config: WorkerConfig,
    shared: Arc<Shared>,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerThread")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl WorkerThread {
    /// Creates a worker that has not been started yet.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                queue: WorkQueue::new(),
                worker_id: OnceLock::new(),
            }),
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Returns the worker's configuration.
    #[must_use]
    pub fn config(&self) -> WorkerConfig {
        self.config
    }

    /// Spawns the worker thread and waits until it is ready to run work.
    ///
    /// Items submitted before `start` are kept and run once the thread is up.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::AlreadyStarted`] if `start` already succeeded once
    ///   (a worker is single-use, even after [`stop`](Self::stop)).
    /// - [`WorkerError::Stopped`] if the worker was stopped before starting.
    /// - [`WorkerError::Spawn`] if the OS thread could not be created.
    pub fn start(&self) -> Result<(), WorkerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyStarted);
        }
        if self.shared.queue.is_closed() {
            return Err(WorkerError::Stopped);
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel::<()>(1);
        let shared = Arc::clone(&self.shared);
        let idle = self.config.idle;
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.into())
            .spawn(move || {
                let _ = shared.worker_id.set(thread::current().id());
                let _ = ready_tx.send(());
                drop(ready_tx);
                run_worker(&shared.queue, idle);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(WorkerError::Spawn(err.kind()));
            }
        };
        ready_rx
            .recv()
            .map_err(|_| WorkerError::Spawn(io::ErrorKind::Other))?;
        *self.lock_handle() = Some(handle);
        log::debug!("worker thread `{}` started", self.config.thread_name);
        Ok(())
    }

    /// Appends `work` to the queue. Never waits for execution.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] after [`stop`](Self::stop).
    pub fn submit<F>(&self, work: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.push(Box::new(work))
    }

    /// Appends `work`, then runs `then` while the queue is still locked.
    ///
    /// Anything `then` publishes is visible before `work` can run and before
    /// any later submission is queued.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Stopped`] after [`stop`](Self::stop); `then`
    /// does not run.
    pub fn submit_then<F, R>(&self, work: F, then: impl FnOnce() -> R) -> Result<R, WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.push_then(Box::new(work), then)
    }

    /// Blocks until every item submitted before this call has finished.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::OnWorkerThread`] when called from the worker itself.
    /// - [`WorkerError::NotStarted`] if the worker was never started.
    /// - [`WorkerError::Stopped`] if the worker stops before reaching the
    ///   fence.
    pub fn barrier(&self) -> Result<(), WorkerError> {
        if self.is_worker_thread() {
            return Err(WorkerError::OnWorkerThread);
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(WorkerError::NotStarted);
        }
        let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);
        self.submit(move || {
            let _ = done_tx.send(());
        })?;
        // A discarded fence drops its sender.
        done_rx.recv().map_err(|_| WorkerError::Stopped)
    }

    /// Signals the worker to exit and discards the backlog.
    ///
    /// The item currently running (if any) completes; queued items never run.
    /// Joins the thread unless called from the worker itself. Idempotent.
    pub fn stop(&self) {
        let discarded = self.shared.queue.close();
        if discarded > 0 {
            log::debug!(
                "worker thread `{}` stopping, discarded {discarded} queued items",
                self.config.thread_name
            );
        }

        let handle = self.lock_handle().take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Exits after the current item returns; dropping the handle detaches.
            return;
        }
        if handle.join().is_err() {
            log::error!("worker thread `{}` panicked", self.config.thread_name);
        } else {
            log::debug!("worker thread `{}` stopped", self.config.thread_name);
        }
    }

    /// Returns `true` between a successful `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shared.queue.is_closed()
    }

    /// Returns the number of items waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Returns `true` when called from this worker's thread.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        self.shared.worker_id.get() == Some(&thread::current().id())
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(queue: &WorkQueue, idle: IdleStrategy) {
    match idle {
        IdleStrategy::Park => {
            while let Some(item) = queue.wait_pop() {
                item();
            }
        }
        IdleStrategy::Poll(interval) => loop {
            match queue.next() {
                Next::Item(item) => item(),
                Next::Empty => {}
                Next::Closed => break,
            }
            thread::sleep(interval);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn started(config: WorkerConfig) -> WorkerThread {
        let worker = WorkerThread::new(config);
        worker.start().unwrap();
        worker
    }

    #[test]
    fn queue_pops_in_insertion_order() {
        let queue = WorkQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            queue
                .push(Box::new(move || log.lock().unwrap().push(i)))
                .unwrap();
        }
        assert_eq!(queue.len(), 3);
        while let Some(item) = queue.try_pop() {
            item();
        }
        assert!(queue.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn closed_queue_discards_and_rejects() {
        let queue = WorkQueue::new();
        queue.push(Box::new(|| {})).unwrap();
        queue.push(Box::new(|| {})).unwrap();
        assert_eq!(queue.close(), 2);
        assert_eq!(queue.close(), 0);
        assert!(queue.try_pop().is_none());
        assert_eq!(queue.push(Box::new(|| {})), Err(WorkerError::Stopped));
    }

    #[test]
    fn runs_items_in_submission_order() {
        for config in [WorkerConfig::parked(), WorkerConfig::polling()] {
            let worker = started(config);
            let log = Arc::new(Mutex::new(Vec::new()));
            for i in 0..20 {
                let log = Arc::clone(&log);
                worker.submit(move || log.lock().unwrap().push(i)).unwrap();
            }
            worker.barrier().unwrap();
            assert_eq!(
                *log.lock().unwrap(),
                (0..20).collect::<Vec<_>>(),
                "{config:?} reordered work"
            );
        }
    }

    #[test]
    fn preserves_order_per_producer() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 200;

        let worker = started(WorkerConfig::parked());
        let log = Arc::new(Mutex::new(Vec::new()));
        thread::scope(|s| {
            for producer in 0..PRODUCERS {
                let worker = &worker;
                let log = Arc::clone(&log);
                s.spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        let log = Arc::clone(&log);
                        worker
                            .submit(move || log.lock().unwrap().push((producer, seq)))
                            .unwrap();
                    }
                });
            }
        });
        worker.barrier().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), PRODUCERS * PER_PRODUCER);
        for producer in 0..PRODUCERS {
            let seqs: Vec<_> = log
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, seq)| *seq)
                .collect();
            assert_eq!(
                seqs,
                (0..PER_PRODUCER).collect::<Vec<_>>(),
                "producer {producer} saw reordering"
            );
        }
    }

    #[test]
    fn never_runs_two_items_at_once() {
        let worker = started(WorkerConfig::parked());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        thread::scope(|s| {
            for _ in 0..4 {
                let worker = &worker;
                let in_flight = Arc::clone(&in_flight);
                let overlaps = Arc::clone(&overlaps);
                s.spawn(move || {
                    for _ in 0..50 {
                        let in_flight = Arc::clone(&in_flight);
                        let overlaps = Arc::clone(&overlaps);
                        worker
                            .submit(move || {
                                if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                                    overlaps.fetch_add(1, Ordering::SeqCst);
                                }
                                thread::yield_now();
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                });
            }
        });
        worker.barrier().unwrap();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0, "work items overlapped");
    }

    #[test]
    fn work_runs_on_named_worker_thread() {
        let worker = started(WorkerConfig::parked());
        let (tx, rx) = mpsc::channel();
        worker
            .submit(move || {
                let current = thread::current();
                tx.send((current.id(), current.name().map(str::to_owned)))
                    .unwrap();
            })
            .unwrap();
        let (id, name) = rx.recv().unwrap();
        assert_ne!(id, thread::current().id(), "work ran on the submitter");
        assert_eq!(name.as_deref(), Some("RenderThread"));
    }

    #[test]
    fn second_start_fails() {
        let worker = started(WorkerConfig::parked());
        assert_eq!(worker.start(), Err(WorkerError::AlreadyStarted));
        worker.stop();
        assert_eq!(worker.start(), Err(WorkerError::AlreadyStarted));
    }

    #[test]
    fn start_after_stop_without_start_fails() {
        let worker = WorkerThread::new(WorkerConfig::parked());
        worker.stop();
        assert_eq!(worker.start(), Err(WorkerError::Stopped));
    }

    #[test]
    fn work_submitted_before_start_runs_after_start() {
        let worker = WorkerThread::new(WorkerConfig::parked());
        let (tx, rx) = mpsc::channel();
        worker.submit(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(worker.pending(), 1);
        worker.start().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
    }

    #[test]
    fn submit_after_stop_is_rejected() {
        let worker = started(WorkerConfig::parked());
        worker.stop();
        assert!(!worker.is_running());
        assert_eq!(worker.submit(|| {}), Err(WorkerError::Stopped));
        assert_eq!(worker.barrier(), Err(WorkerError::Stopped));
    }

    #[test]
    fn barrier_before_start_fails() {
        let worker = WorkerThread::new(WorkerConfig::parked());
        assert_eq!(worker.barrier(), Err(WorkerError::NotStarted));
    }

    #[test]
    fn barrier_on_worker_thread_is_refused() {
        let worker = Arc::new(started(WorkerConfig::parked()));
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&worker);
        worker
            .submit(move || tx.send(inner.barrier()).unwrap())
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Ok(Err(WorkerError::OnWorkerThread))
        );
    }

    fn assert_stop_abandons_queued_items(config: WorkerConfig) {
        let worker = started(config);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker_finished = Arc::clone(&finished);
        worker
            .submit(move || {
                entered_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
                blocker_finished.store(true, Ordering::SeqCst);
            })
            .unwrap();
        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            worker
                .submit(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        entered_rx.recv().unwrap();
        assert_eq!(worker.pending(), 5);

        thread::scope(|s| {
            s.spawn(|| worker.stop());
            let deadline = Instant::now() + Duration::from_secs(5);
            while worker.pending() != 0 {
                assert!(Instant::now() < deadline, "stop never cleared the queue");
                thread::yield_now();
            }
            gate_tx.send(()).unwrap();
        });

        assert!(finished.load(Ordering::SeqCst), "in-flight item was cut short");
        assert_eq!(ran.load(Ordering::SeqCst), 0, "queued items ran after stop");
    }

    #[test]
    fn stop_abandons_queued_items() {
        for config in [WorkerConfig::parked(), WorkerConfig::polling()] {
            assert_stop_abandons_queued_items(config);
        }
    }

    #[test]
    fn push_then_runs_before_the_item_is_visible() {
        let queue = WorkQueue::new();
        queue.push(Box::new(|| {})).unwrap();
        let seen = queue.push_then(Box::new(|| {}), || queue.state.try_lock().is_err());
        assert_eq!(seen, Ok(true), "callback ran outside the queue lock");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn push_then_skips_callback_when_closed() {
        let queue = WorkQueue::new();
        queue.close();
        let mut called = false;
        assert_eq!(
            queue.push_then(Box::new(|| {}), || called = true),
            Err(WorkerError::Stopped)
        );
        assert!(!called);
    }

    #[test]
    fn drop_stops_the_worker() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let worker = started(WorkerConfig::parked());
            let ran = Arc::clone(&ran);
            worker
                .submit(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            worker.barrier().unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_messages_are_descriptive() {
        assert_eq!(
            WorkerError::AlreadyStarted.to_string(),
            "worker thread already started"
        );
        assert!(
            WorkerError::Spawn(io::ErrorKind::OutOfMemory)
                .to_string()
                .starts_with("failed to spawn worker thread")
        );
    }
}
