//! Map kernel: the large-map session that ties observers, origin and
//! streaming together.
//!
//! # Invariants
//! - One cycle per tick, always in the order refresh, rebase, stream.
//! - All session state is mutated from inside the cycle or the explicit
//!   operations on [`LargeMapManager`]; nothing is shared across threads.

pub mod manager;
pub mod observer;

pub use manager::{LargeMapManager, MapError, MapEvent, TickReport};
pub use observer::{LocalFrame, Observer, ObserverTracker, RefreshReport};

pub fn crate_info() -> &'static str {
    "largemap-kernel v0.1.0"
}
