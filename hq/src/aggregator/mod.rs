//! Update aggregation
//!
//! ```text
//! RawUpdate feed ──> error substitution ──> 3s window ──> group by host/device
//!                                                      ──> fold (last write wins)
//!                                                      ──> "<name>.Status" / "<name>.State"
//! ```

mod core;
mod window;

pub use core::{AggregatorStats, DEFAULT_WINDOW_MS, UpdateAggregator};
pub use window::{AggregationError, WindowBuffer};
