//! Lock-free multi-producer/single-consumer LIFO stack.
//!
//! The queue holds four logical states in a single atomic head pointer:
//!
//! - *empty dummy*: no stacked elements, the reader may park.
//! - *blocked dummy*: the reader is parked and must be woken by the next
//!   producer.
//! - a valid element pointer: a LIFO chain of elements not yet reversed
//!   into the reader's FIFO cache.
//! - null: closed; any further enqueue fails.
//!
//! The dummy pointers are distinct static addresses and are never
//! dereferenced.

// Layer 1: Standard library imports
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::element::MailboxElement;

/// Queue and reader state after an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// The element was enqueued; the reader is running.
    Success,
    /// The element was enqueued and the reader was parked; the producer
    /// must re-schedule (or wake) the reader.
    UnblockedReader,
    /// The queue was closed; the element has been dropped.
    QueueClosed,
}

// Two adjacent bytes give us two distinct, stable, never-dereferenced
// sentinel addresses.
static DUMMY_ADDRS: [u8; 2] = [0, 0];

fn empty_dummy() -> *mut MailboxElement {
    DUMMY_ADDRS.as_ptr() as *mut MailboxElement
}

fn blocked_dummy() -> *mut MailboxElement {
    // In bounds: index 1 of a 2-byte array.
    unsafe { DUMMY_ADDRS.as_ptr().add(1) as *mut MailboxElement }
}

fn is_dummy(ptr: *mut MailboxElement) -> bool {
    ptr == empty_dummy() || ptr == blocked_dummy()
}

/// The atomic head. Consumer-side operations (`take_stack`, `close_stack`,
/// `try_block`, `try_unblock`) must only be called by the owning reader.
pub(crate) struct MailboxQueue {
    stack: AtomicPtr<MailboxElement>,
}

impl MailboxQueue {
    pub(crate) fn new() -> Self {
        Self {
            stack: AtomicPtr::new(empty_dummy()),
        }
    }

    /// Push an element; callable from any thread.
    pub(crate) fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult {
        let raw = Box::into_raw(element);
        let mut expected = self.stack.load(Ordering::Acquire);
        loop {
            if expected.is_null() {
                // Closed: reclaim and report.
                drop(unsafe { Box::from_raw(raw) });
                return EnqueueResult::QueueClosed;
            }
            // A dummy is never part of a non-empty chain.
            unsafe {
                (*raw).next = if is_dummy(expected) {
                    ptr::null_mut()
                } else {
                    expected
                };
            }
            match self
                .stack
                .compare_exchange_weak(expected, raw, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(previous) => {
                    return if previous == blocked_dummy() {
                        EnqueueResult::UnblockedReader
                    } else {
                        EnqueueResult::Success
                    };
                }
                Err(actual) => expected = actual,
            }
        }
    }

    /// Whether the queue has been closed.
    pub(crate) fn closed(&self) -> bool {
        self.stack.load(Ordering::Acquire).is_null()
    }

    /// Whether the reader is parked.
    pub(crate) fn blocked(&self) -> bool {
        self.stack.load(Ordering::Acquire) == blocked_dummy()
    }

    /// Whether elements are stacked and not yet fetched.
    pub(crate) fn has_stacked(&self) -> bool {
        let head = self.stack.load(Ordering::Acquire);
        !head.is_null() && !is_dummy(head)
    }

    /// Reader only: `empty -> blocked`. Returns `true` when blocked now or
    /// already blocked before.
    pub(crate) fn try_block(&self) -> bool {
        match self.stack.compare_exchange(
            empty_dummy(),
            blocked_dummy(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(actual) => actual == blocked_dummy(),
        }
    }

    /// Reader only: `blocked -> empty`. Returns `false` when a producer
    /// already flipped the state, i.e. data is waiting.
    pub(crate) fn try_unblock(&self) -> bool {
        self.stack
            .compare_exchange(
                blocked_dummy(),
                empty_dummy(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Reader only: atomically detach the stacked chain, leaving the queue
    /// empty. Returns the newest-first chain head, or `None` when there was
    /// nothing stacked (or the queue is closed).
    pub(crate) fn take_stack(&self) -> Option<*mut MailboxElement> {
        let mut expected = self.stack.load(Ordering::Acquire);
        loop {
            if expected.is_null() || is_dummy(expected) {
                return None;
            }
            match self.stack.compare_exchange_weak(
                expected,
                empty_dummy(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(chain) => return Some(chain),
                Err(actual) => expected = actual,
            }
        }
    }

    /// Reader only: close the queue, returning any still-stacked chain for
    /// disposal by the caller.
    pub(crate) fn close_stack(&self) -> Option<*mut MailboxElement> {
        let previous = self.stack.swap(ptr::null_mut(), Ordering::AcqRel);
        if previous.is_null() || is_dummy(previous) {
            None
        } else {
            Some(previous)
        }
    }
}
