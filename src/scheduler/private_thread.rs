//! Dedicated OS threads for blocking and detached actors.
//!
//! `acquire` hands out an idle thread or launches a new one; `release`
//! returns it to the idle list. Shutdown signals every idle thread to
//! stop, lets running jobs finish, and joins everything.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::thread::JoinHandle;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::error::{Error, ErrorCode};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Stop,
}

/// One pooled thread, parked between assignments.
pub struct PrivateThread {
    slot: Mutex<Option<Command>>,
    cv: Condvar,
}

impl PrivateThread {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// Hand a job to this thread. Must only be called on a thread freshly
    /// returned by [`PrivateThreadPool::acquire`].
    pub(crate) fn run(&self, job: impl FnOnce() + Send + 'static) {
        let mut slot = self.slot.lock();
        debug_assert!(slot.is_none(), "private thread already has a job");
        *slot = Some(Command::Run(Box::new(job)));
        self.cv.notify_one();
    }

    fn send_stop(&self) {
        let mut slot = self.slot.lock();
        *slot = Some(Command::Stop);
        self.cv.notify_one();
    }

    fn await_command(&self) -> Command {
        let mut slot = self.slot.lock();
        loop {
            if let Some(command) = slot.take() {
                return command;
            }
            self.cv.wait(&mut slot);
        }
    }
}

struct PoolState {
    idle: Vec<Arc<PrivateThread>>,
    handles: Vec<JoinHandle<()>>,
    running: usize,
    shutdown: bool,
}

/// The pool of dedicated threads.
pub struct PrivateThreadPool {
    state: Mutex<PoolState>,
    cv: Condvar,
}

impl PrivateThreadPool {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                handles: Vec::new(),
                running: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
        })
    }

    /// Number of threads currently executing a job.
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Reserve a thread: reuse an idle one or launch a new one.
    pub(crate) fn acquire(this: &Arc<Self>) -> Result<Arc<PrivateThread>, Error> {
        let mut state = this.state.lock();
        if state.shutdown {
            return Err(Error::with_context(
                ErrorCode::RuntimeError,
                "private thread pool is shutting down",
            ));
        }
        state.running += 1;
        if let Some(thread) = state.idle.pop() {
            trace!(target: "hive::scheduler", "reusing idle private thread");
            return Ok(thread);
        }
        let thread = Arc::new(PrivateThread::new());
        let loop_thread = Arc::clone(&thread);
        let pool = Arc::downgrade(this);
        let handle = std::thread::Builder::new()
            .name("hive.private".into())
            .spawn(move || {
                loop {
                    match loop_thread.await_command() {
                        Command::Run(job) => {
                            job();
                            let keep_going = pool
                                .upgrade()
                                .map(|pool| pool.release(&loop_thread))
                                .unwrap_or(false);
                            if !keep_going {
                                return;
                            }
                        }
                        Command::Stop => return,
                    }
                }
            })
            .map_err(|err| {
                state.running -= 1;
                Error::with_context(
                    ErrorCode::RuntimeError,
                    format!("failed to spawn private thread: {err}"),
                )
            })?;
        state.handles.push(handle);
        Ok(thread)
    }

    /// Return a finished thread to the idle list. Returns `false` during
    /// shutdown, telling the thread to exit instead of idling.
    fn release(&self, thread: &Arc<PrivateThread>) -> bool {
        let mut state = self.state.lock();
        state.running -= 1;
        if state.shutdown {
            self.cv.notify_all();
            false
        } else {
            state.idle.push(Arc::clone(thread));
            true
        }
    }

    /// Stop idle threads, wait for running jobs to finish, join everything.
    pub(crate) fn stop(&self) {
        let handles = {
            let mut state = self.state.lock();
            state.shutdown = true;
            for thread in state.idle.drain(..) {
                thread.send_stop();
            }
            while state.running > 0 {
                self.cv.wait(&mut state);
            }
            std::mem::take(&mut state.handles)
        };
        for handle in handles {
            let _ = handle.join();
        }
        debug!(target: "hive::scheduler", "private thread pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn acquire_run_release_reuse() {
        let pool = PrivateThreadPool::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let thread = PrivateThreadPool::acquire(&pool).unwrap();
        let c = Arc::clone(&counter);
        thread.run(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        // Wait for the job to finish and the thread to return to idle.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while pool.running() > 0 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // The next acquire reuses the idle thread.
        let again = PrivateThreadPool::acquire(&pool).unwrap();
        let c = Arc::clone(&counter);
        again.run(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        while pool.running() > 0 {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        pool.stop();
    }

    #[test]
    fn stop_waits_for_running_jobs() {
        let pool = PrivateThreadPool::new();
        let done = Arc::new(AtomicUsize::new(0));
        let thread = PrivateThreadPool::acquire(&pool).unwrap();
        let d = Arc::clone(&done);
        thread.run(move || {
            std::thread::sleep(Duration::from_millis(50));
            d.fetch_add(1, Ordering::SeqCst);
        });
        pool.stop();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn acquire_after_stop_fails() {
        let pool = PrivateThreadPool::new();
        pool.stop();
        assert!(PrivateThreadPool::acquire(&pool).is_err());
    }
}
