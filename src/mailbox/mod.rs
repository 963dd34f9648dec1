//! Per-actor mailboxes.
//!
//! The mailbox couples a lock-free multi-producer/single-consumer queue
//! with priority-split FIFO consumer caches. Producers only ever touch the
//! atomic head; the owning actor is the sole consumer and the only party
//! allowed to pop, prepend, block, or close.

pub mod element;
pub mod queue;

// Layer 1: Standard library imports
use std::cell::UnsafeCell;
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
pub use element::MailboxElement;
pub use queue::EnqueueResult;
use queue::MailboxQueue;

#[derive(Default)]
struct Caches {
    urgent: VecDeque<Box<MailboxElement>>,
    normal: VecDeque<Box<MailboxElement>>,
}

/// A single-reader mailbox with an urgent and a normal lane.
///
/// Elements whose message id carries the priority bit drain before normal
/// elements; within one lane, per-sender FIFO order is preserved.
///
/// # Ownership contract
///
/// `enqueue` may be called from any thread. Every other method is reserved
/// for the owning actor: exactly one thread at a time may act as consumer,
/// which is what makes the unsynchronized consumer caches sound.
pub struct Mailbox {
    queue: MailboxQueue,
    caches: UnsafeCell<Caches>,
}

// The caches are only touched by the single consumer; the queue itself is
// thread-safe. See the ownership contract above.
unsafe impl Send for Mailbox {}
unsafe impl Sync for Mailbox {}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            queue: MailboxQueue::new(),
            caches: UnsafeCell::new(Caches::default()),
        }
    }

    /// Enqueue an element. Callable from any thread.
    pub fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult {
        self.queue.enqueue(element)
    }

    /// Whether the mailbox has been closed.
    pub fn closed(&self) -> bool {
        self.queue.closed()
    }

    /// Whether the consumer is parked waiting for data.
    pub fn blocked(&self) -> bool {
        self.queue.blocked()
    }

    /// Consumer only: whether a `pop` would currently yield an element.
    pub(crate) fn can_fetch_more(&self) -> bool {
        let caches = unsafe { &*self.caches.get() };
        !caches.urgent.is_empty() || !caches.normal.is_empty() || self.queue.has_stacked()
    }

    /// Consumer only: transition `empty -> blocked`. Returns `true` when
    /// the mailbox is now (or already was) blocked; `false` means new data
    /// raced in and the consumer should keep draining.
    pub(crate) fn try_block(&self) -> bool {
        self.queue.try_block()
    }

    /// Consumer only: transition `blocked -> empty` after waking up.
    /// Returns `false` when the state had already been flipped by a
    /// producer, i.e. new data is available.
    pub(crate) fn try_unblock(&self) -> bool {
        self.queue.try_unblock()
    }

    /// Consumer only: pop the next element, urgent lane first.
    pub(crate) fn pop(&self) -> Option<Box<MailboxElement>> {
        let caches = unsafe { &mut *self.caches.get() };
        if let Some(element) = caches.urgent.pop_front() {
            return Some(element);
        }
        if let Some(element) = caches.normal.pop_front() {
            return Some(element);
        }
        self.fetch_new_data(caches);
        caches
            .urgent
            .pop_front()
            .or_else(|| caches.normal.pop_front())
    }

    /// Consumer only: return stashed elements to the front of their lanes,
    /// preserving their relative order.
    pub(crate) fn prepend(&self, elements: Vec<Box<MailboxElement>>) {
        let caches = unsafe { &mut *self.caches.get() };
        for element in elements.into_iter().rev() {
            if element.mid.is_urgent() {
                caches.urgent.push_front(element);
            } else {
                caches.normal.push_front(element);
            }
        }
    }

    /// Consumer only: close the mailbox, feeding every remaining element
    /// (cached and stacked) through `bouncer`. Further enqueues observe
    /// [`EnqueueResult::QueueClosed`].
    pub(crate) fn close(&self, mut bouncer: impl FnMut(Box<MailboxElement>)) {
        let caches = unsafe { &mut *self.caches.get() };
        for element in caches.urgent.drain(..) {
            bouncer(element);
        }
        for element in caches.normal.drain(..) {
            bouncer(element);
        }
        for element in Self::collect_chain(self.queue.close_stack()) {
            bouncer(element);
        }
    }

    /// Drain the stacked LIFO chain into the caches, restoring FIFO order.
    fn fetch_new_data(&self, caches: &mut Caches) -> bool {
        let chain = self.queue.take_stack();
        if chain.is_none() {
            return false;
        }
        let mut fetched = false;
        for mut element in Self::collect_chain(chain) {
            element.next = std::ptr::null_mut();
            if element.mid.is_urgent() {
                caches.urgent.push_back(element);
            } else {
                caches.normal.push_back(element);
            }
            fetched = true;
        }
        fetched
    }

    /// Reclaim a raw LIFO chain as boxes in FIFO (oldest-first) order.
    fn collect_chain(chain: Option<*mut MailboxElement>) -> Vec<Box<MailboxElement>> {
        let mut elements = Vec::new();
        let mut cursor = match chain {
            Some(head) => head,
            None => return elements,
        };
        while !cursor.is_null() {
            // Ownership transfers back from the queue; read `next` before
            // handing the box around.
            let element = unsafe { Box::from_raw(cursor) };
            cursor = element.next;
            elements.push(element);
        }
        elements.reverse();
        elements
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        if !self.queue.closed() {
            self.close(|_| ());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageId, Payload};
    use crate::payload;
    use std::sync::Arc;
    use std::thread;

    fn element(mid: MessageId, payload: Payload) -> Box<MailboxElement> {
        MailboxElement::new(None, mid, payload)
    }

    #[test]
    fn fifo_within_one_producer() {
        let mailbox = Mailbox::new();
        for i in 0..10i64 {
            assert_eq!(
                mailbox.enqueue(element(MessageId::ASYNC, payload!(i))),
                EnqueueResult::Success
            );
        }
        for i in 0..10i64 {
            let popped = mailbox.pop().unwrap();
            assert_eq!(popped.payload.get::<i64>(0), Some(&i));
        }
        assert!(mailbox.pop().is_none());
    }

    #[test]
    fn urgent_lane_drains_first() {
        let mailbox = Mailbox::new();
        mailbox.enqueue(element(MessageId::ASYNC, payload!(1i64)));
        mailbox.enqueue(element(
            MessageId::ASYNC.with_urgent_priority(),
            payload!(2i64),
        ));
        mailbox.enqueue(element(MessageId::ASYNC, payload!(3i64)));

        let order: Vec<i64> = std::iter::from_fn(|| mailbox.pop())
            .map(|e| *e.payload.get::<i64>(0).unwrap())
            .collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn block_unblock_protocol() {
        let mailbox = Mailbox::new();
        assert!(mailbox.try_block());
        assert!(mailbox.blocked());
        // Blocking twice reports success.
        assert!(mailbox.try_block());

        assert_eq!(
            mailbox.enqueue(element(MessageId::ASYNC, payload!(1i64))),
            EnqueueResult::UnblockedReader
        );
        assert!(!mailbox.blocked());
        // The producer already unblocked us.
        assert!(!mailbox.try_unblock());
        assert!(mailbox.pop().is_some());
    }

    #[test]
    fn try_block_fails_with_pending_data() {
        let mailbox = Mailbox::new();
        mailbox.enqueue(element(MessageId::ASYNC, payload!(1i64)));
        assert!(!mailbox.try_block());
        assert!(mailbox.pop().is_some());
    }

    #[test]
    fn close_bounces_everything_and_rejects_new_elements() {
        let mailbox = Mailbox::new();
        for i in 0..3i64 {
            mailbox.enqueue(element(MessageId::ASYNC, payload!(i)));
        }
        let mut bounced = Vec::new();
        mailbox.close(|e| bounced.push(*e.payload.get::<i64>(0).unwrap()));
        assert_eq!(bounced, vec![0, 1, 2]);
        assert!(mailbox.closed());
        assert_eq!(
            mailbox.enqueue(element(MessageId::ASYNC, payload!(9i64))),
            EnqueueResult::QueueClosed
        );
    }

    #[test]
    fn prepend_restores_order() {
        let mailbox = Mailbox::new();
        mailbox.enqueue(element(MessageId::ASYNC, payload!(3i64)));
        let stashed = vec![
            element(MessageId::ASYNC, payload!(1i64)),
            element(MessageId::ASYNC, payload!(2i64)),
        ];
        mailbox.prepend(stashed);

        let order: Vec<i64> = std::iter::from_fn(|| mailbox.pop())
            .map(|e| *e.payload.get::<i64>(0).unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn concurrent_producers_keep_per_sender_fifo() {
        const PRODUCERS: i64 = 4;
        const PER_PRODUCER: i64 = 500;

        let mailbox = Arc::new(Mailbox::new());
        let mut handles = Vec::new();
        for producer in 0..PRODUCERS {
            let mailbox = Arc::clone(&mailbox);
            handles.push(thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let tagged = (producer << 32) | seq;
                    mailbox.enqueue(element(MessageId::ASYNC, payload!(tagged)));
                }
            }));
        }

        let mut last_seen = vec![-1i64; PRODUCERS as usize];
        let mut received = 0;
        while received < PRODUCERS * PER_PRODUCER {
            match mailbox.pop() {
                Some(e) => {
                    let tagged = *e.payload.get::<i64>(0).unwrap();
                    let producer = (tagged >> 32) as usize;
                    let seq = tagged & 0xffff_ffff;
                    assert!(
                        seq > last_seen[producer],
                        "per-sender order violated for producer {producer}"
                    );
                    last_seen[producer] = seq;
                    received += 1;
                }
                None => thread::yield_now(),
            }
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(mailbox.pop().is_none());
    }
}
