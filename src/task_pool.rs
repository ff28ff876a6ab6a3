//! Dependency-aware thread pool driving package compilation.
//!
//! A fixed set of worker threads pull ready tasks off a shared queue; a task
//! becomes ready only once every predecessor it depends on has completed.
//! Package compilation has a dependency order the pool must respect, so this
//! is a small hand-rolled scheduler over `std::thread` + `Mutex`/`Condvar`
//! rather than a work-stealing pool that assumes independent work items.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, trace};

pub type TaskId = u64;

struct Job {
    id: TaskId,
    predecessors: HashSet<TaskId>,
    closure: Box<dyn FnOnce() + Send + 'static>,
}

struct Shared {
    pending: HashMap<TaskId, Job>,
    ready: VecDeque<TaskId>,
    completed: HashSet<TaskId>,
    in_flight: usize,
    shutdown: bool,
}

/// Bounded, dependency-aware task pool. Construct with [`TaskPool::new`],
/// submit a DAG of tasks with [`TaskPool::submit`], then block on
/// [`TaskPool::wait_until_all_tasks_complete`].
pub struct TaskPool {
    shared: Arc<Mutex<Shared>>,
    cv: Arc<Condvar>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

/// Worker count formula from the original (`(nproc - 3) / 2`, floored at 1)
/// — it reserves headroom for the editor's own language-server process
/// threads (parser, indexer, transport) alongside compilation workers.
pub fn default_worker_count() -> usize {
    let n = num_cpus::get();
    ((n.saturating_sub(3)) / 2).max(1)
}

impl TaskPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let shared = Arc::new(Mutex::new(Shared {
            pending: HashMap::new(),
            ready: VecDeque::new(),
            completed: HashSet::new(),
            in_flight: 0,
            shutdown: false,
        }));
        let cv = Arc::new(Condvar::new());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let shared = Arc::clone(&shared);
            let cv = Arc::clone(&cv);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("cjls-worker-{worker_id}"))
                    .spawn(move || worker_loop(shared, cv))
                    .expect("failed to spawn task pool worker"),
            );
        }

        Self { shared, cv, workers: handles }
    }

    /// Submits one task depending on `predecessors` (task ids already known
    /// to the pool, or ids submitted earlier in the same batch). The task
    /// becomes ready for a worker once every predecessor has completed;
    /// `submit` itself never blocks.
    pub fn submit<F>(&self, id: TaskId, predecessors: HashSet<TaskId>, closure: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut shared = self.shared.lock().expect("task pool lock poisoned");
        let unmet: HashSet<TaskId> = predecessors.into_iter().filter(|p| !shared.completed.contains(p)).collect();
        let job = Job { id, predecessors: unmet, closure: Box::new(closure) };
        if job.predecessors.is_empty() {
            trace!(task = id, "task ready immediately");
            shared.ready.push_back(id);
            shared.pending.insert(id, job);
        } else {
            shared.pending.insert(id, job);
        }
        self.cv.notify_all();
    }

    /// Blocks until every submitted task has completed and no more are
    /// pending or running.
    pub fn wait_until_all_tasks_complete(&self) {
        let shared = self.shared.lock().expect("task pool lock poisoned");
        let _guard = self
            .cv
            .wait_while(shared, |s| !s.pending.is_empty() || !s.ready.is_empty() || s.in_flight > 0)
            .expect("task pool lock poisoned");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        {
            let mut shared = self.shared.lock().expect("task pool lock poisoned");
            shared.shutdown = true;
        }
        self.cv.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Mutex<Shared>>, cv: Arc<Condvar>) {
    loop {
        let (id, job) = {
            let mut guard = shared.lock().expect("task pool lock poisoned");
            loop {
                if guard.shutdown {
                    return;
                }
                if let Some(id) = guard.ready.pop_front() {
                    let job = guard.pending.remove(&id).expect("ready task missing from pending map");
                    guard.in_flight += 1;
                    break (id, job);
                }
                guard = cv.wait(guard).expect("task pool lock poisoned");
            }
        };

        debug!(task = id, "running task");
        (job.closure)();

        let mut guard = shared.lock().expect("task pool lock poisoned");
        guard.completed.insert(id);
        guard.in_flight -= 1;

        let mut newly_ready = Vec::new();
        for (&pending_id, pending_job) in guard.pending.iter_mut() {
            pending_job.predecessors.remove(&id);
            if pending_job.predecessors.is_empty() {
                newly_ready.push(pending_id);
            }
        }
        for ready_id in newly_ready {
            guard.ready.push_back(ready_id);
        }
        drop(guard);
        cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_independent_tasks() {
        let pool = TaskPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for id in 0..5 {
            let counter = Arc::clone(&counter);
            pool.submit(id, HashSet::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_until_all_tasks_complete();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn respects_dependency_order() {
        let pool = TaskPool::new(4);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        pool.submit(1, HashSet::new(), move || o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        let mut preds = HashSet::new();
        preds.insert(1);
        pool.submit(2, preds, move || o2.lock().unwrap().push(2));
        let o3 = Arc::clone(&order);
        let mut preds = HashSet::new();
        preds.insert(2);
        pool.submit(3, preds, move || o3.lock().unwrap().push(3));

        pool.wait_until_all_tasks_complete();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn default_worker_count_is_at_least_one() {
        assert!(default_worker_count() >= 1);
    }
}
