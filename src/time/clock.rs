//! The runtime clock: a dedicated timer thread over a deadline heap.
//!
//! All timeouts in the runtime (receive timeouts, request deadlines,
//! delayed sends, heartbeat scheduling) funnel through one clock thread.
//! Each scheduled action carries a [`Disposable`]; disposing it before the
//! deadline turns the firing into a no-op.

// Layer 1: Standard library imports
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};
use tracing::trace;

// Layer 3: Internal module imports
use super::disposable::Disposable;
use crate::error::{Error, ErrorCode};

type Action = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    at: Instant,
    seq: u64,
    token: Disposable,
    action: Option<Action>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, we need the earliest deadline on
    // top.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct ClockState {
    queue: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

struct ClockInner {
    state: Mutex<ClockState>,
    cv: Condvar,
}

/// Handle to the clock thread.
pub struct Clock {
    inner: Arc<ClockInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Launch the clock thread.
    pub(crate) fn start() -> Result<Self, Error> {
        let inner = Arc::new(ClockInner {
            state: Mutex::new(ClockState {
                queue: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
        });
        let run_inner = Arc::clone(&inner);
        let thread = std::thread::Builder::new()
            .name("hive.clock".into())
            .spawn(move || run_loop(&run_inner))
            .map_err(|err| {
                Error::with_context(
                    ErrorCode::RuntimeError,
                    format!("failed to spawn clock thread: {err}"),
                )
            })?;
        Ok(Self {
            inner,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Run `action` after `delay` unless the returned token is disposed
    /// first.
    pub fn schedule_in(
        &self,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> Disposable {
        self.schedule_at(Instant::now() + delay, action)
    }

    /// Run `action` at `at` unless the returned token is disposed first.
    pub fn schedule_at(&self, at: Instant, action: impl FnOnce() + Send + 'static) -> Disposable {
        let token = Disposable::new();
        let mut state = self.inner.state.lock();
        if state.shutdown {
            // Late scheduling after stop: drop silently, report disposed.
            token.dispose();
            return token;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Entry {
            at,
            seq,
            token: token.clone(),
            action: Some(Box::new(action)),
        });
        self.inner.cv.notify_one();
        token
    }

    /// Stop the clock thread; pending entries are discarded.
    pub(crate) fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.queue.clear();
            self.inner.cv.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(inner: &ClockInner) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        let now = Instant::now();
        match state.queue.peek() {
            None => {
                inner.cv.wait(&mut state);
            }
            Some(entry) if entry.at > now => {
                let deadline = entry.at;
                let _ = inner.cv.wait_until(&mut state, deadline);
            }
            Some(_) => {
                // Due: pop and fire outside the lock.
                if let Some(mut entry) = state.queue.pop() {
                    let action = entry.action.take();
                    let token = entry.token;
                    parking_lot::MutexGuard::unlocked(&mut state, move || {
                        if let Some(action) = action {
                            if token.claim() {
                                action();
                            } else {
                                trace!(target: "hive::clock", "skipping disposed timer");
                            }
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fires_in_deadline_order() {
        let clock = Clock::start().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for (delay_ms, tag) in [(30u64, 3), (10, 1), (20, 2)] {
            let hits = Arc::clone(&hits);
            clock.schedule_in(Duration::from_millis(delay_ms), move || {
                hits.lock().push(tag);
            });
        }
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(*hits.lock(), vec![1, 2, 3]);
        clock.stop();
    }

    #[test]
    fn disposed_timers_never_fire() {
        let clock = Clock::start().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let token = clock.schedule_in(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        token.dispose();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        clock.stop();
    }

    #[test]
    fn stop_discards_pending_entries() {
        let clock = Clock::start().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        clock.schedule_in(Duration::from_secs(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        clock.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
