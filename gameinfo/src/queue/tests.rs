use super::*;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::thread;
use std::time::Duration;

use crate::test_utils::{Gate, wait_until};

// ============================================================================
// Test job
// ============================================================================

#[derive(Clone, Default)]
struct Probe {
    log: Arc<Mutex<Vec<u32>>>,
    threads: Arc<Mutex<Vec<String>>>,
    discarded: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl Probe {
    fn log(&self) -> Vec<u32> {
        self.log.lock().unwrap().clone()
    }
}

struct TestJob {
    tags: Vec<u32>,
    probe: Probe,
    gate: Option<Arc<Gate>>,
    panic: bool,
}

impl TestJob {
    fn new(tag: u32, probe: &Probe) -> Self {
        Self {
            tags: vec![tag],
            probe: probe.clone(),
            gate: None,
            panic: false,
        }
    }

    fn gated(tag: u32, probe: &Probe, gate: &Arc<Gate>) -> Self {
        Self {
            gate: Some(gate.clone()),
            ..Self::new(tag, probe)
        }
    }
}

impl Job for TestJob {
    fn run(self) {
        let running = self.probe.running.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.probe
            .max_running
            .fetch_max(running, AtomicOrdering::SeqCst);
        if let Some(name) = thread::current().name() {
            self.probe.threads.lock().unwrap().push(name.to_string());
        }
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.probe.log.lock().unwrap().extend(&self.tags);
        self.probe.running.fetch_sub(1, AtomicOrdering::SeqCst);
        if self.panic {
            panic!("test job panic");
        }
    }

    fn merge(&mut self, other: Self) {
        self.tags.extend(other.tags);
    }

    fn discard(self) {
        self.probe.discarded.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

/// Queue with one worker parked inside a gated job on key 0.
fn blocked_queue(probe: &Probe) -> (PriorityWorkQueue<u32, TestJob>, Arc<Gate>) {
    let queue = PriorityWorkQueue::new("test", 1).unwrap();
    let gate = Arc::new(Gate::new());
    queue.push(0, TestJob::gated(0, probe, &gate), 0);
    wait_until(|| probe.running.load(AtomicOrdering::SeqCst) == 1);
    (queue, gate)
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_higher_priority_runs_first() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);

    queue.push(1, TestJob::new(1, &probe), 10);
    queue.push(2, TestJob::new(2, &probe), 30);
    queue.push(3, TestJob::new(3, &probe), 20);
    gate.open();
    queue.wait_until_idle();

    assert_eq!(probe.log(), vec![0, 2, 3, 1]);
}

#[test]
fn test_equal_priority_runs_in_submission_order() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);

    for key in 1..=4 {
        queue.push(key, TestJob::new(key, &probe), 5);
    }
    gate.open();
    queue.wait_until_idle();

    assert_eq!(probe.log(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_merge_raises_priority_but_keeps_submission_slot() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);

    queue.push(1, TestJob::new(1, &probe), 1);
    queue.push(2, TestJob::new(2, &probe), 5);
    assert_eq!(queue.push(1, TestJob::new(10, &probe), 9), Submitted::Merged);
    assert_eq!(queue.len(), 2);

    gate.open();
    queue.wait_until_idle();

    assert_eq!(probe.log(), vec![0, 1, 10, 2]);
}

#[test]
fn test_bump_moves_queued_job_ahead() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);

    queue.push(1, TestJob::new(1, &probe), 1);
    queue.push(2, TestJob::new(2, &probe), 2);
    assert!(queue.bump(&1, 3));
    assert!(queue.bump(&2, 1));
    assert!(!queue.bump(&9, 10));
    assert_eq!(queue.len(), 2);

    gate.open();
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![0, 1, 2]);
}

// ============================================================================
// Deduplication
// ============================================================================

#[test]
fn test_push_for_queued_key_merges() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);

    assert_eq!(queue.push(7, TestJob::new(1, &probe), 1), Submitted::Queued);
    assert_eq!(queue.push(7, TestJob::new(2, &probe), 1), Submitted::Merged);
    assert_eq!(queue.len(), 1);

    gate.open();
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![0, 1, 2]);
}

#[test]
fn test_follow_up_waits_for_running_job_on_same_key() {
    let probe = Probe::default();
    let queue = PriorityWorkQueue::new("dedup", 3).unwrap();
    let gate = Arc::new(Gate::new());

    queue.push(1, TestJob::gated(1, &probe, &gate), 0);
    wait_until(|| probe.running.load(AtomicOrdering::SeqCst) == 1);

    // Running, so this is a separate follow-up, not a merge
    assert_eq!(queue.push(1, TestJob::new(2, &probe), 100), Submitted::Queued);
    assert!(queue.is_busy(&1));

    // Give idle workers a chance to (wrongly) pick it up
    thread::sleep(Duration::from_millis(20));
    assert_eq!(probe.max_running.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(queue.len(), 1);

    gate.open();
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![1, 2]);
    assert_eq!(probe.max_running.load(AtomicOrdering::SeqCst), 1);
}

#[test]
fn test_held_back_key_does_not_block_other_keys() {
    let probe = Probe::default();
    let queue = PriorityWorkQueue::new("bypass", 2).unwrap();
    let gate = Arc::new(Gate::new());

    queue.push(1, TestJob::gated(1, &probe, &gate), 0);
    wait_until(|| probe.running.load(AtomicOrdering::SeqCst) == 1);
    queue.push(1, TestJob::new(2, &probe), 100);
    queue.push(2, TestJob::new(3, &probe), 1);

    wait_until(|| probe.log() == vec![3]);
    gate.open();
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![3, 1, 2]);
}

// ============================================================================
// Synchronous drain
// ============================================================================

#[test]
fn test_wait_for_runs_queued_job_on_caller() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);
    queue.push(5, TestJob::new(5, &probe), 1);

    thread::Builder::new()
        .name("caller".into())
        .spawn({
            let probe = probe.clone();
            move || {
                queue.wait_for(&5);
                assert_eq!(probe.log(), vec![5]);
                gate.open();
            }
        })
        .unwrap()
        .join()
        .unwrap();

    let threads = probe.threads.lock().unwrap().clone();
    assert_eq!(threads, vec!["test-0".to_string(), "caller".to_string()]);
}

#[test]
fn test_wait_for_blocks_until_running_job_finishes() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);

    let opener = thread::spawn({
        let gate = gate.clone();
        move || {
            thread::sleep(Duration::from_millis(20));
            gate.open();
        }
    });
    queue.wait_for(&0);
    assert_eq!(probe.log(), vec![0]);
    assert!(!queue.is_busy(&0));
    opener.join().unwrap();
}

#[test]
fn test_wait_for_unknown_key_returns_immediately() {
    let queue: PriorityWorkQueue<u32, TestJob> = PriorityWorkQueue::new("idle", 1).unwrap();
    queue.wait_for(&42);
    assert!(queue.is_empty());
}

// ============================================================================
// Cancellation and lifecycle
// ============================================================================

#[test]
fn test_cancel_discards_queued_job() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);
    queue.push(3, TestJob::new(3, &probe), 1);

    assert!(queue.cancel(&3));
    assert!(!queue.cancel(&3));
    assert_eq!(probe.discarded.load(AtomicOrdering::SeqCst), 1);

    gate.open();
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![0]);
}

#[test]
fn test_shutdown_discards_unstarted_and_finishes_running() {
    let probe = Probe::default();
    let (queue, gate) = blocked_queue(&probe);
    for key in 1..=3 {
        queue.push(key, TestJob::new(key, &probe), 1);
    }

    let queue = Arc::new(queue);
    let stopper = thread::spawn({
        let queue = queue.clone();
        move || queue.shutdown()
    });

    wait_until(|| probe.discarded.load(AtomicOrdering::SeqCst) == 3);
    assert!(!queue.is_accepting());
    gate.open();
    stopper.join().unwrap();

    assert_eq!(probe.log(), vec![0]);
    assert!(queue.is_empty());
}

#[test]
fn test_push_after_shutdown_is_rejected() {
    let probe = Probe::default();
    let queue = PriorityWorkQueue::new("closed", 1).unwrap();
    queue.shutdown();
    queue.shutdown();

    assert_eq!(queue.push(1, TestJob::new(1, &probe), 1), Submitted::Rejected);
    assert_eq!(probe.discarded.load(AtomicOrdering::SeqCst), 1);
    assert!(probe.log().is_empty());
}

#[test]
fn test_restart_accepts_work_again() {
    let probe = Probe::default();
    let queue = PriorityWorkQueue::new("restart", 2).unwrap();
    queue.restart().unwrap();

    assert_eq!(queue.push(1, TestJob::new(1, &probe), 1), Submitted::Queued);
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![1]);
}

#[test]
fn test_panicking_job_does_not_kill_worker() {
    let probe = Probe::default();
    let queue = PriorityWorkQueue::new("panic", 1).unwrap();

    let mut bad = TestJob::new(1, &probe);
    bad.panic = true;
    queue.push(1, bad, 1);
    queue.wait_until_idle();

    queue.push(2, TestJob::new(2, &probe), 1);
    queue.wait_until_idle();
    assert_eq!(probe.log(), vec![1, 2]);
}
