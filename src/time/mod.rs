//! Timers and cancellation tokens.

pub mod clock;
pub mod disposable;

pub use clock::Clock;
pub use disposable::Disposable;
