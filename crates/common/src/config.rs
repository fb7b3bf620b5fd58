use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest allowed `streaming_distance / tile_side`. The streaming
/// neighbourhood spans about twice this many tiles per axis, and every tile
/// in it stays in the grid for the rest of the session.
pub const MAX_STREAMING_REACH: f64 = 64.0;

/// Errors raised while building or validating a [`MapConfig`].
///
/// Every variant is fatal: a manager refuses to start with a bad config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("rebase_unit {rebase_unit} exceeds rebase_distance {rebase_distance}; a rebase could not bring observers back within the threshold")]
    RebaseUnitTooCoarse {
        rebase_unit: f64,
        rebase_distance: f64,
    },
    #[error("streaming_distance spans {reach} tiles, more than the limit of {max}")]
    StreamingReachTooLarge { reach: f64, max: f64 },
}

/// Session configuration for tile streaming and origin rebasing.
///
/// All distances share the unit of the absolute positions fed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Side length of one square tile.
    pub tile_side: f64,
    /// Tiles closer than this to any observer must be resident.
    pub streaming_distance: f64,
    /// An observer farther than this from the origin triggers a rebase.
    pub rebase_distance: f64,
    /// The origin only ever moves to multiples of this length. Must not
    /// exceed `rebase_distance`.
    pub rebase_unit: f64,
    /// Ask the backend to finish loading before returning.
    pub block_on_load: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_side: 2_000.0,
            streaming_distance: 13_000.0,
            rebase_distance: 2_000.0,
            rebase_unit: 2_000.0,
            block_on_load: false,
        }
    }
}

impl MapConfig {
    /// Config with the given tile side and every other field at its default.
    pub fn with_tile_side(tile_side: f64) -> Self {
        Self {
            tile_side,
            ..Self::default()
        }
    }

    /// Check every distance is usable, that a rebase can always pull a lone
    /// observer back inside the threshold, and that the streaming
    /// neighbourhood stays bounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("tile_side", self.tile_side),
            ("streaming_distance", self.streaming_distance),
            ("rebase_distance", self.rebase_distance),
            ("rebase_unit", self.rebase_unit),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        // The snapped target lies within half a unit of the observer per
        // axis, which is inside the threshold only while unit <= distance.
        if self.rebase_unit > self.rebase_distance {
            return Err(ConfigError::RebaseUnitTooCoarse {
                rebase_unit: self.rebase_unit,
                rebase_distance: self.rebase_distance,
            });
        }
        let reach = self.streaming_distance / self.tile_side;
        if reach > MAX_STREAMING_REACH {
            return Err(ConfigError::StreamingReachTooLarge {
                reach,
                max: MAX_STREAMING_REACH,
            });
        }
        Ok(())
    }

    /// Parse and validate a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&data)
    }
}
