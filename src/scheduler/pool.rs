//! The cooperative work-stealing worker pool.
//!
//! Fixed number of workers, each owning a FIFO deque. The thread that
//! transitions an actor from blocked to ready pushes it onto its own
//! local queue when it is a worker of this pool, or onto the global
//! injector otherwise. Idle workers drain the injector, then steal from
//! random peers, then park on a condition variable.

// Layer 1: Standard library imports
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

// Layer 2: Third-party crate imports
use crossbeam_deque::{Injector, Stealer, Worker};
use parking_lot::{Condvar, Mutex};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

// Layer 3: Internal module imports
use super::runnable::{ResumeResult, Runnable};
use crate::error::{Error, ErrorCode};

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    // (pool id, local deque) of the worker running on this thread, if any.
    static LOCAL_WORKER: RefCell<Option<(usize, Worker<Runnable>)>> = const { RefCell::new(None) };
}

struct SleepState {
    sleepers: usize,
    shutdown: bool,
}

struct PoolShared {
    id: usize,
    injector: Injector<Runnable>,
    stealers: Vec<Stealer<Runnable>>,
    sleep: Mutex<SleepState>,
    cv: Condvar,
    max_throughput: usize,
}

/// Handle to the worker pool.
pub struct Scheduler {
    shared: Arc<PoolShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Launch `workers` worker threads with the given per-slice message
    /// budget.
    pub(crate) fn start(workers: usize, max_throughput: usize) -> Result<Self, Error> {
        let workers = workers.max(1);
        let deques: Vec<Worker<Runnable>> = (0..workers).map(|_| Worker::new_fifo()).collect();
        let stealers = deques.iter().map(Worker::stealer).collect();
        let shared = Arc::new(PoolShared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            injector: Injector::new(),
            stealers,
            sleep: Mutex::new(SleepState {
                sleepers: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
            max_throughput: max_throughput.max(1),
        });

        let mut threads = Vec::with_capacity(workers);
        for (index, deque) in deques.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            let thread = std::thread::Builder::new()
                .name(format!("hive.worker-{index}"))
                .spawn(move || worker_loop(&shared, deque, index))
                .map_err(|err| {
                    Error::with_context(
                        ErrorCode::RuntimeError,
                        format!("failed to spawn worker thread: {err}"),
                    )
                })?;
            threads.push(thread);
        }
        debug!(target: "hive::scheduler", workers, max_throughput, "scheduler started");
        Ok(Self {
            shared,
            threads: Mutex::new(threads),
        })
    }

    /// The per-slice message budget handed to runnables.
    pub fn max_throughput(&self) -> usize {
        self.shared.max_throughput
    }

    /// Enqueue a ready runnable.
    pub(crate) fn schedule(&self, job: Runnable) {
        let mut job = Some(job);
        LOCAL_WORKER.with(|slot| {
            if let Some((owner, worker)) = slot.borrow().as_ref() {
                if *owner == self.shared.id {
                    if let Some(job) = job.take() {
                        worker.push(job);
                    }
                }
            }
        });
        if let Some(job) = job {
            self.shared.injector.push(job);
        }
        // Wake one parked worker, if any.
        let sleep = self.shared.sleep.lock();
        if sleep.sleepers > 0 {
            self.shared.cv.notify_one();
        }
    }

    /// Stop all workers. Queued runnables are dropped.
    pub(crate) fn stop(&self) {
        {
            let mut sleep = self.shared.sleep.lock();
            sleep.shutdown = true;
            self.shared.cv.notify_all();
        }
        let threads = std::mem::take(&mut *self.threads.lock());
        for thread in threads {
            let _ = thread.join();
        }
        debug!(target: "hive::scheduler", "scheduler stopped");
    }
}

fn worker_loop(shared: &Arc<PoolShared>, deque: Worker<Runnable>, index: usize) {
    LOCAL_WORKER.with(|slot| {
        *slot.borrow_mut() = Some((shared.id, deque));
    });
    let mut rng = SmallRng::seed_from_u64(index as u64 + 1);

    loop {
        let job = next_job(shared, &mut rng);
        match job {
            Some(job) => {
                let again = Arc::clone(&job);
                match job.resume(shared.max_throughput) {
                    ResumeResult::ResumeLater => {
                        trace!(target: "hive::scheduler", worker = index, "re-enqueue after budget");
                        push_local(again);
                    }
                    ResumeResult::Done | ResumeResult::AwaitMessage => drop(again),
                }
            }
            None => {
                let mut sleep = shared.sleep.lock();
                if sleep.shutdown {
                    return;
                }
                // Last look before parking; a producer enqueues first and
                // takes this lock second, so nothing can slip through.
                if has_global_work(shared) {
                    continue;
                }
                sleep.sleepers += 1;
                shared.cv.wait(&mut sleep);
                sleep.sleepers -= 1;
                if sleep.shutdown {
                    return;
                }
            }
        }
    }
}

fn push_local(job: Runnable) {
    let mut job = Some(job);
    LOCAL_WORKER.with(|slot| {
        if let Some((_, worker)) = slot.borrow().as_ref() {
            if let Some(job) = job.take() {
                worker.push(job);
            }
        }
    });
}

fn next_job(shared: &Arc<PoolShared>, rng: &mut SmallRng) -> Option<Runnable> {
    // 1) Own queue.
    let local = LOCAL_WORKER.with(|slot| {
        slot.borrow().as_ref().and_then(|(_, worker)| worker.pop())
    });
    if local.is_some() {
        return local;
    }
    // 2) Global injector (batch into the local deque).
    let from_injector = LOCAL_WORKER.with(|slot| {
        slot.borrow().as_ref().and_then(|(_, worker)| loop {
            match shared.injector.steal_batch_and_pop(worker) {
                crossbeam_deque::Steal::Success(job) => return Some(job),
                crossbeam_deque::Steal::Empty => return None,
                crossbeam_deque::Steal::Retry => continue,
            }
        })
    });
    if from_injector.is_some() {
        return from_injector;
    }
    // 3) Steal from a random peer, walking all of them once.
    let n = shared.stealers.len();
    if n == 0 {
        return None;
    }
    let start = rng.gen_range(0..n);
    for offset in 0..n {
        let victim = &shared.stealers[(start + offset) % n];
        loop {
            match victim.steal() {
                crossbeam_deque::Steal::Success(job) => return Some(job),
                crossbeam_deque::Steal::Empty => break,
                crossbeam_deque::Steal::Retry => continue,
            }
        }
    }
    None
}

fn has_global_work(shared: &PoolShared) -> bool {
    !shared.injector.is_empty() || shared.stealers.iter().any(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::runnable::Resumable;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountDown {
        remaining: AtomicUsize,
        resumes: AtomicUsize,
    }

    impl Resumable for CountDown {
        fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            let mut left = self.remaining.load(Ordering::SeqCst);
            let mut consumed = 0;
            while left > 0 && consumed < max_throughput {
                left = self.remaining.fetch_sub(1, Ordering::SeqCst) - 1;
                consumed += 1;
            }
            if left == 0 {
                ResumeResult::Done
            } else {
                ResumeResult::ResumeLater
            }
        }
    }

    #[test]
    fn budget_bounds_each_slice() {
        let scheduler = Scheduler::start(2, 100).unwrap();
        let job = Arc::new(CountDown {
            remaining: AtomicUsize::new(1000),
            resumes: AtomicUsize::new(0),
        });
        scheduler.schedule(Arc::clone(&job) as Runnable);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while job.remaining.load(Ordering::SeqCst) > 0 {
            assert!(std::time::Instant::now() < deadline, "job starved");
            std::thread::sleep(Duration::from_millis(5));
        }
        // 1000 units at 100 per slice: at least 10 resumes.
        assert!(job.resumes.load(Ordering::SeqCst) >= 10);
        scheduler.stop();
    }

    #[test]
    fn many_jobs_complete_across_workers() {
        let scheduler = Scheduler::start(4, 10).unwrap();
        let jobs: Vec<Arc<CountDown>> = (0..64)
            .map(|_| {
                Arc::new(CountDown {
                    remaining: AtomicUsize::new(25),
                    resumes: AtomicUsize::new(0),
                })
            })
            .collect();
        for job in &jobs {
            scheduler.schedule(Arc::clone(job) as Runnable);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while jobs.iter().any(|j| j.remaining.load(Ordering::SeqCst) > 0) {
            assert!(std::time::Instant::now() < deadline, "jobs starved");
            std::thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();
    }
}
