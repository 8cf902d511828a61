//! Export job execution: priority queue, worker pool, event bus, and the
//! independent terminal-state listener (§4.5).

pub mod events;
pub mod listener;
pub mod pool;
pub mod queue;

pub use events::{JobEvent, JOB_EVENTS_CHANNEL};
