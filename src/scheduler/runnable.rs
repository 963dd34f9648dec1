//! The unit of scheduling.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Outcome of one `resume` slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeResult {
    /// The runnable terminated; drop it.
    Done,
    /// The mailbox is drained and parked; a producer will re-schedule.
    AwaitMessage,
    /// The throughput budget was exhausted with work remaining; re-enqueue.
    ResumeLater,
}

/// Anything the scheduler can drive.
///
/// `resume` consumes up to `max_throughput` messages and reports how the
/// slice ended. Exactly one thread at a time calls `resume` on a given
/// runnable; that exclusivity is the concurrency contract actors rely on.
pub trait Resumable: Send + Sync + 'static {
    /// Run one scheduling slice.
    fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult;
}

/// Boxed runnable handle used by the pool.
pub type Runnable = Arc<dyn Resumable>;
