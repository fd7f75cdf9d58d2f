//! Prioritized, deduplicating work queue
//!
//! A small pool of named worker threads runs [`Job`]s keyed by `K`:
//! - At most one job per key runs at any time. Pushing a key that is
//!   already queued merges the jobs instead of queueing a second one.
//!   Pushing a key that is running queues a follow-up that is held back
//!   until the running job finishes.
//! - Higher priorities run first, equal priorities in submission order.
//! - [`PriorityWorkQueue::wait_for`] drains one key synchronously.
//! - [`PriorityWorkQueue::shutdown`] discards unstarted jobs and joins the
//!   workers once running jobs finish.

mod worker;

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, error, warn};

/// A unit of deferred work.
pub trait Job: Send + 'static {
    /// Execute the job on a worker (or on a thread draining it).
    fn run(self);

    /// Fold a later submission for the same key into this queued job.
    fn merge(&mut self, other: Self);

    /// Called instead of `run` when the job is dropped unstarted.
    fn discard(self)
    where
        Self: Sized,
    {
    }
}

/// What happened to a pushed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Queued as a new item
    Queued,
    /// Merged into an item already queued for the key
    Merged,
    /// The queue is shut down; the job was discarded
    Rejected,
}

struct Queued<J> {
    job: J,
    priority: u64,
    seq: u64,
}

#[derive(Clone)]
struct HeapEntry<K> {
    priority: u64,
    seq: u64,
    key: K,
}

impl<K> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<K> Eq for HeapEntry<K> {}

impl<K> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for HeapEntry<K> {
    // Max-heap: higher priority first, then lower (earlier) sequence number
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<K, J> {
    queued: HashMap<K, Queued<J>>,
    /// May hold stale entries; validated against `queued` on pop
    heap: BinaryHeap<HeapEntry<K>>,
    in_flight: HashSet<K>,
    next_seq: u64,
    accepting: bool,
    stopping: bool,
}

impl<K: Eq + Hash + Clone, J> QueueState<K, J> {
    fn new() -> Self {
        Self {
            queued: HashMap::new(),
            heap: BinaryHeap::new(),
            in_flight: HashSet::new(),
            next_seq: 0,
            accepting: true,
            stopping: false,
        }
    }

    fn is_current(&self, entry: &HeapEntry<K>) -> bool {
        self.queued
            .get(&entry.key)
            .is_some_and(|q| q.priority == entry.priority && q.seq == entry.seq)
    }

    /// Raise the priority of a queued key, keeping its submission slot.
    fn raise(&mut self, key: K, priority: u64) -> bool {
        let Some(queued) = self.queued.get_mut(&key) else {
            return false;
        };
        if priority > queued.priority {
            queued.priority = priority;
            let seq = queued.seq;
            self.heap.push(HeapEntry { priority, seq, key });
        }
        true
    }

    /// Take the best job whose key isn't running, marking it in flight.
    fn take_next(&mut self) -> Option<(K, J)> {
        let mut held_back = Vec::new();
        let mut found = None;
        while let Some(entry) = self.heap.pop() {
            if !self.is_current(&entry) {
                continue;
            }
            if self.in_flight.contains(&entry.key) {
                held_back.push(entry);
                continue;
            }
            if let Some(queued) = self.queued.remove(&entry.key) {
                self.in_flight.insert(entry.key.clone());
                found = Some((entry.key, queued.job));
            }
            break;
        }
        self.heap.extend(held_back);
        found
    }

    fn drain_queued(&mut self) -> Vec<J> {
        self.heap.clear();
        self.queued.drain().map(|(_, q)| q.job).collect()
    }
}

pub(crate) struct Shared<K, J> {
    state: Mutex<QueueState<K, J>>,
    /// Signalled when a job becomes runnable or the queue stops
    work_ready: Condvar,
    /// Signalled when a job finishes
    progress: Condvar,
}

impl<K, J> Shared<K, J>
where
    K: Eq + Hash + Clone + Send + 'static,
    J: Job,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<K, J>> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("Work queue mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Run a job taken with `take_next`, then clear its in-flight mark.
    fn execute(&self, key: K, job: J) {
        if catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
            error!("Work queue job panicked; continuing");
        }
        let mut state = self.lock();
        state.in_flight.remove(&key);
        drop(state);
        // Held-back follow-ups for this key may be runnable now
        self.work_ready.notify_all();
        self.progress.notify_all();
    }
}

/// Prioritized, deduplicating job runner with a fixed worker pool.
pub struct PriorityWorkQueue<K, J> {
    name: String,
    worker_count: usize,
    shared: Arc<Shared<K, J>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<K, J> PriorityWorkQueue<K, J>
where
    K: Eq + Hash + Clone + Send + 'static,
    J: Job,
{
    /// Create the queue and start `worker_count` workers (at least one).
    ///
    /// Threads are named `{name}-{index}`.
    pub fn new(name: impl Into<String>, worker_count: usize) -> std::io::Result<Self> {
        let queue = Self {
            name: name.into(),
            worker_count: worker_count.max(1),
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new()),
                work_ready: Condvar::new(),
                progress: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
        };
        queue.spawn_workers()?;
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn spawn_workers(&self) -> std::io::Result<()> {
        let mut workers = self.lock_workers();
        for index in 0..self.worker_count {
            let handle = worker::spawn(&self.name, index, self.shared.clone())?;
            workers.push(handle);
        }
        debug!("Work queue '{}' started {} workers", self.name, self.worker_count);
        Ok(())
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit a job for `key`.
    pub fn push(&self, key: K, job: J, priority: u64) -> Submitted {
        let mut state = self.shared.lock();
        if !state.accepting {
            drop(state);
            job.discard();
            return Submitted::Rejected;
        }

        if let Some(existing) = state.queued.get_mut(&key) {
            existing.job.merge(job);
            state.raise(key, priority);
            return Submitted::Merged;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queued.insert(key.clone(), Queued { job, priority, seq });
        state.heap.push(HeapEntry { priority, seq, key });
        drop(state);
        self.shared.work_ready.notify_one();
        Submitted::Queued
    }

    /// Raise the priority of the job queued for `key`.
    ///
    /// Returns `false` if nothing is queued for it. Lower priorities are
    /// ignored.
    pub fn bump(&self, key: &K, priority: u64) -> bool {
        self.shared.lock().raise(key.clone(), priority)
    }

    /// Drop a queued, unstarted job for `key`. A running one is unaffected.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.shared.lock().queued.remove(key);
        match removed {
            Some(queued) => {
                queued.job.discard();
                self.shared.progress.notify_all();
                true
            }
            None => false,
        }
    }

    /// Block until nothing is queued or running for `key`.
    ///
    /// A queued job is taken and run on the calling thread rather than
    /// waiting for a worker. Must not be called from inside a job for the
    /// same key.
    pub fn wait_for(&self, key: &K) {
        let mut state = self.shared.lock();
        loop {
            if state.in_flight.contains(key) {
                state = self
                    .shared
                    .progress
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
                continue;
            }
            let Some(queued) = state.queued.remove(key) else {
                break;
            };
            state.in_flight.insert(key.clone());
            drop(state);
            self.shared.execute(key.clone(), queued.job);
            state = self.shared.lock();
        }
    }

    /// Block until the queue is empty and no job is running.
    pub fn wait_until_idle(&self) {
        let mut state = self.shared.lock();
        while !state.queued.is_empty() || !state.in_flight.is_empty() {
            state = self
                .shared
                .progress
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Whether `key` has a queued or running job.
    pub fn is_busy(&self, key: &K) -> bool {
        let state = self.shared.lock();
        state.queued.contains_key(key) || state.in_flight.contains(key)
    }

    /// Number of queued, unstarted jobs.
    pub fn len(&self) -> usize {
        self.shared.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.lock().accepting
    }

    /// Stop accepting work, discard unstarted jobs and join the workers.
    ///
    /// Jobs already running finish first. Safe to call more than once.
    pub fn shutdown(&self) {
        let discarded = {
            let mut state = self.shared.lock();
            state.accepting = false;
            state.stopping = true;
            state.drain_queued()
        };
        self.shared.work_ready.notify_all();
        self.shared.progress.notify_all();

        if !discarded.is_empty() {
            debug!(
                "Work queue '{}' discarding {} unstarted jobs",
                self.name,
                discarded.len()
            );
        }
        for job in discarded {
            job.discard();
        }

        let handles: Vec<_> = self.lock_workers().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Work queue '{}' worker panicked", self.name);
            }
        }
    }

    /// Shut down, then start a fresh set of workers.
    pub fn restart(&self) -> std::io::Result<()> {
        self.shutdown();
        {
            let mut state = self.shared.lock();
            state.accepting = true;
            state.stopping = false;
        }
        self.spawn_workers()
    }
}

impl<K, J> Drop for PriorityWorkQueue<K, J> {
    fn drop(&mut self) {
        // Workers hold their own Arc to the shared state; tell them to go.
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            state.accepting = false;
            state.stopping = true;
        }
        self.shared.work_ready.notify_all();
        let handles: Vec<_> = match self.workers.get_mut() {
            Ok(workers) => workers.drain(..).collect(),
            Err(e) => e.into_inner().drain(..).collect(),
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}
