//! Critical-section workloads.
//!
//! What a worker does while holding its two resources. The harness only
//! cares that it finishes in bounded time.

mod sleep;

pub use gridlock_core::CriticalSection;
pub use sleep::SleepWork;
