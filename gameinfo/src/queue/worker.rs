//! Worker thread loop

use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use super::{Job, Shared};

/// Spawn worker `index` of queue `name`.
pub(super) fn spawn<K, J>(
    name: &str,
    index: usize,
    shared: Arc<Shared<K, J>>,
) -> std::io::Result<JoinHandle<()>>
where
    K: Eq + Hash + Clone + Send + 'static,
    J: Job,
{
    let thread_name = format!("{name}-{index}");
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || run(&shared))
}

fn run<K, J>(shared: &Shared<K, J>)
where
    K: Eq + Hash + Clone + Send + 'static,
    J: Job,
{
    debug!("Worker {:?} started", thread::current().name());

    loop {
        let mut state = shared.lock();
        let next = loop {
            if state.stopping {
                break None;
            }
            if let Some(next) = state.take_next() {
                break Some(next);
            }
            state = shared
                .work_ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        };
        drop(state);

        let Some((key, job)) = next else {
            break;
        };
        trace!("Worker {:?} running job", thread::current().name());
        shared.execute(key, job);
    }

    debug!("Worker {:?} finished", thread::current().name());
}
