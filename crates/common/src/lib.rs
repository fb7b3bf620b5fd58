//! Shared types for the large-map engine: identifiers, placeable items and
//! the session configuration.

mod config;
mod types;

pub use config::{ConfigError, MapConfig, MAX_STREAMING_REACH};
pub use types::{ItemId, ObserverId, PlaceableItem};
