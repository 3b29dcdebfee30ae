//! Bounded Ring Buffers
//!
//! Fixed-capacity buffers that evict the oldest entry on overflow, and the
//! lockstep temperature history built on them.

mod buffer;
mod history;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
pub use history::TemperatureHistory;
