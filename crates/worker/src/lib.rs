//! Scheduling primitives shared by the cke5 hosts.
//!
//! Everything here is runtime plumbing with no knowledge of editors or documents:
//! classified task spawning, a trailing-edge [`debounce`], the [`wait_for`] poll-with-retry
//! helper and the generation/teardown tokens used by restartable and cancellable work.

mod class;
mod debounce;
mod spawn;
mod token;
mod wait;

pub use class::TaskClass;
pub use debounce::{Debounced, debounce};
pub use spawn::{join_error_message, spawn};
pub use token::{GenerationClock, TeardownToken};
pub use wait::{WaitOptions, WaitTimeout, wait_for};
