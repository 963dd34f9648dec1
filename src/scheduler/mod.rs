//! Execution: the cooperative work-stealing pool and the private-thread
//! pool for blocking/detached actors.

pub mod pool;
pub mod private_thread;
pub mod runnable;

pub use pool::Scheduler;
pub use private_thread::{PrivateThread, PrivateThreadPool};
pub use runnable::{Resumable, ResumeResult};
