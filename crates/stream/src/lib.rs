//! Streaming: sparse tile grid, distance-driven residency, content backends.
//!
//! # Invariants
//! - A tile's key is a pure, collision-free function of its (X, Y).
//! - Tiles are never destroyed; streaming only toggles their content handle.
//! - Within one cycle every unload is issued before any load.
//! - The residency diff is rebuilt from scratch each cycle, so failed
//!   backend requests are retried without any bookkeeping.

mod backend;
mod controller;
mod grid;

pub use backend::{
    BackendCall, BackendError, ContentHandle, InMemoryBackend, LoadRequest, TileContentBackend,
};
pub use controller::{SpawnOutcome, StreamConfig, StreamStats, StreamUpdate, StreamingController};
pub use grid::{Tile, TileCoord, TileGrid, TileKey};

pub fn crate_info() -> &'static str {
    "largemap-stream v0.1.0"
}
