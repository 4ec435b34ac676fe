//! Deduplicating asynchronous retrieval framework
//!
//! [`Retriever`] runs blocking fetches on an elastic pool of detached
//! worker threads while guaranteeing that at most one fetch per key is in
//! flight at any time. Submission uses a direct handoff: a zero-capacity
//! rendezvous channel hands a task to a worker that is already idle, and a
//! new worker thread is spawned only when none is. There is no backlog
//! queue; when the pool is saturated the call is rejected rather than
//! queued or blocked.
//!
//! Outcomes are tagged variants delivered over a channel instead of a
//! callback interface:
//!
//! - an accepted fetch eventually produces [`Outcome::Succeeded`] or
//!   [`Outcome::Failed`] on the outcome channel, sent from an arbitrary
//!   worker thread;
//! - a rejected fetch (duplicate key or saturated pool) is reported
//!   synchronously through the [`RetrieveStatus`] return value.
//!
//! The retriever performs no synchronization on behalf of the receiver:
//! callers needing single-threaded cache mutation drain the outcome
//! channel from their own consumer thread (see
//! [`crate::resource::ResourceCacheAdapter`]).
//!
//! Task objects are pooled in a free list guarded by the same mutex as the
//! in-flight set, so steady-state fetch traffic does not allocate per
//! request. No retries are attempted internally; a failed tile is fetched
//! again only when a later query asks for it.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

/// How long an idle worker thread lingers before exiting.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Errors delivered with a failed retrieval outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetrieveError {
    /// The fetch function returned an error (network, decode, timeout).
    #[error("retrieval failed: {0}")]
    Failed(String),

    /// The fetch function panicked on the worker thread.
    #[error("retrieval task panicked")]
    Panicked,
}

/// Synchronous result of submitting a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveStatus {
    /// The fetch was handed to a worker thread; an [`Outcome`] will follow.
    Accepted,
    /// A fetch for the same key is already in flight; no work was queued.
    RejectedDuplicate,
    /// The worker pool is saturated; no work was queued.
    RejectedSaturated,
}

impl RetrieveStatus {
    /// Whether the submission was accepted.
    #[inline]
    pub fn is_accepted(self) -> bool {
        matches!(self, RetrieveStatus::Accepted)
    }
}

/// Terminal outcome of an accepted retrieval, sent on the outcome channel
/// from the worker thread that ran the fetch.
#[derive(Debug)]
pub enum Outcome<K, V> {
    /// The fetch produced a value.
    Succeeded { key: K, value: V },
    /// The fetch failed; the error is logged by the consumer and absorbed.
    Failed { key: K, error: RetrieveError },
}

/// A blocking fetch function, run on worker threads.
///
/// Implementations typically resolve the key to a resource locator and
/// perform the network/decode work behind it.
pub trait Fetcher<K, V>: Send + Sync {
    /// Fetches the value for `key`, blocking until done.
    fn fetch(&self, key: &K) -> Result<V, RetrieveError>;
}

/// Pooled task object binding one key to one fetch execution.
struct Task<K> {
    key: Option<K>,
}

impl<K> Task<K> {
    fn new() -> Self {
        Self { key: None }
    }
}

/// State guarded by a single mutex: the in-flight key set and the task
/// free list share it so acceptance and recycling are atomic.
struct State<K> {
    in_flight: HashSet<K>,
    task_pool: Vec<Task<K>>,
    live_workers: usize,
}

struct Shared<K, V> {
    state: Mutex<State<K>>,
    handoff_tx: Sender<Task<K>>,
    handoff_rx: Receiver<Task<K>>,
    outcomes: Sender<Outcome<K, V>>,
    fetcher: Arc<dyn Fetcher<K, V>>,
    max_tasks: usize,
    keep_alive: Duration,
    worker_seq: AtomicUsize,
}

/// Deduplicating asynchronous retriever over an elastic worker pool.
pub struct Retriever<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Retriever<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    /// Creates a retriever allowing up to `max_tasks` simultaneous fetches
    /// and returns it together with the receiving end of its outcome
    /// channel.
    pub fn new(max_tasks: usize, fetcher: Arc<dyn Fetcher<K, V>>) -> (Self, Receiver<Outcome<K, V>>) {
        Self::with_keep_alive(max_tasks, DEFAULT_KEEP_ALIVE, fetcher)
    }

    /// Like [`Retriever::new`] with an explicit idle-worker keep-alive.
    pub fn with_keep_alive(
        max_tasks: usize,
        keep_alive: Duration,
        fetcher: Arc<dyn Fetcher<K, V>>,
    ) -> (Self, Receiver<Outcome<K, V>>) {
        assert!(max_tasks >= 1, "max_tasks must be at least 1");

        let (handoff_tx, handoff_rx) = bounded(0);
        let (outcome_tx, outcome_rx) = unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                in_flight: HashSet::new(),
                task_pool: Vec::with_capacity(max_tasks),
                live_workers: 0,
            }),
            handoff_tx,
            handoff_rx,
            outcomes: outcome_tx,
            fetcher,
            max_tasks,
            keep_alive,
            worker_seq: AtomicUsize::new(0),
        });

        (Self { shared }, outcome_rx)
    }

    /// Submits an asynchronous fetch for `key`.
    ///
    /// The key enters the in-flight set before submission and stays a
    /// member until the worker finishes, so a second call for the same key
    /// is rejected synchronously without queuing duplicate work. When no
    /// idle worker takes the direct handoff and the pool cannot grow, the
    /// key is withdrawn, the task recycled, and the call rejected.
    pub fn retrieve(&self, key: K) -> RetrieveStatus {
        let shared = &self.shared;
        let mut state = shared.state.lock().unwrap();

        if state.in_flight.contains(&key) {
            tracing::debug!(key = ?key, "retrieval rejected, already in flight");
            return RetrieveStatus::RejectedDuplicate;
        }
        if state.in_flight.len() >= shared.max_tasks {
            tracing::debug!(
                key = ?key,
                in_flight = state.in_flight.len(),
                "retrieval rejected, retriever saturated"
            );
            return RetrieveStatus::RejectedSaturated;
        }

        state.in_flight.insert(key.clone());
        let mut task = state.task_pool.pop().unwrap_or_else(Task::new);
        task.key = Some(key.clone());

        // Direct handoff: succeeds only when a worker is parked in recv.
        let mut task = match shared.handoff_tx.try_send(task) {
            Ok(()) => return RetrieveStatus::Accepted,
            Err(TrySendError::Full(task)) | Err(TrySendError::Disconnected(task)) => task,
        };

        // No idle worker; grow the pool, handing the key over as the new
        // worker's first job. The task object stays behind and returns to
        // the free list whether or not the spawn succeeds.
        task.key = None;
        if state.task_pool.len() < shared.max_tasks {
            state.task_pool.push(task);
        }

        let index = shared.worker_seq.fetch_add(1, Ordering::Relaxed);
        let worker_shared = Arc::clone(shared);
        let first_key = key.clone();
        let spawned = thread::Builder::new()
            .name(format!("terratile-retrieve-{index}"))
            .spawn(move || worker_loop(worker_shared, first_key));

        match spawned {
            Ok(_) => {
                state.live_workers += 1;
                RetrieveStatus::Accepted
            }
            Err(error) => {
                state.in_flight.remove(&key);
                tracing::warn!(key = ?key, %error, "retrieval rejected, worker spawn failed");
                RetrieveStatus::RejectedSaturated
            }
        }
    }

    /// Whether a fetch for `key` is currently in flight.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.shared.state.lock().unwrap().in_flight.contains(key)
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.shared.state.lock().unwrap().in_flight.len()
    }

    /// Number of live worker threads, busy or idle.
    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().unwrap().live_workers
    }

    /// Maximum number of simultaneous fetches.
    #[inline]
    pub fn max_tasks(&self) -> usize {
        self.shared.max_tasks
    }

    #[cfg(test)]
    fn pooled_task_count(&self) -> usize {
        self.shared.state.lock().unwrap().task_pool.len()
    }
}

/// Body of a detached worker thread: fetch the first key, then serve the
/// rendezvous channel until idle for the keep-alive period.
fn worker_loop<K, V>(shared: Arc<Shared<K, V>>, first_key: K)
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    run_fetch(&shared, first_key, None);
    loop {
        match shared.handoff_rx.recv_timeout(shared.keep_alive) {
            Ok(mut task) => {
                let key = match task.key.take() {
                    Some(key) => key,
                    None => continue,
                };
                run_fetch(&shared, key, Some(task));
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    shared.state.lock().unwrap().live_workers -= 1;
}

/// Runs one fetch, delivers its outcome, then clears the in-flight
/// membership and recycles the accompanying task object, if any. The
/// in-flight removal happens last so the dedup invariant covers the
/// entire fetch lifetime.
fn run_fetch<K, V>(shared: &Arc<Shared<K, V>>, key: K, task: Option<Task<K>>)
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| shared.fetcher.fetch(&key)));
    let outcome = match result {
        Ok(Ok(value)) => {
            tracing::debug!(key = ?key, "retrieval succeeded");
            Outcome::Succeeded { key: key.clone(), value }
        }
        Ok(Err(error)) => {
            tracing::warn!(key = ?key, %error, "retrieval failed");
            Outcome::Failed { key: key.clone(), error }
        }
        Err(_) => {
            tracing::error!(key = ?key, "retrieval task panicked");
            Outcome::Failed {
                key: key.clone(),
                error: RetrieveError::Panicked,
            }
        }
    };

    // The receiver may have been dropped; the fetch result is then simply
    // discarded.
    let _ = shared.outcomes.send(outcome);

    let mut state = shared.state.lock().unwrap();
    state.in_flight.remove(&key);
    if let Some(task) = task {
        if state.task_pool.len() < shared.max_tasks {
            state.task_pool.push(task);
        }
    }
}
