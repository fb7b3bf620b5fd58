//! Asset descriptions: enumerate placeable items for map generation.
//!
//! Items are identified by content-addressed hashes of their name and
//! absolute position, so enumerating the same manifest twice yields the
//! same ids.
//!
//! # Layout
//! A source path is either a single manifest file or a directory whose
//! `*.json` files are manifests, read in file-name order:
//! ```text
//! { "items": [ { "name": "road_07", "position": [1200.0, -40.0, 0.0] } ] }
//! ```

use glam::DVec3;
use largemap_common::{ItemId, PlaceableItem};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Errors from asset enumeration.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asset path not found: {0}")]
    NotFound(PathBuf),
    #[error("manifest {path} is invalid: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Yields the placeable items found under a path. Consumed once, when a map
/// is generated.
pub trait AssetSource {
    fn enumerate(&self, path: &Path) -> Result<Vec<PlaceableItem>, AssetError>;
}

/// One entry of a manifest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Absolute world position.
    pub position: [f64; 3],
}

/// On-disk list of placeable items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemManifest {
    pub items: Vec<ManifestEntry>,
}

impl ItemManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, position: DVec3) {
        self.items.push(ManifestEntry {
            name: name.into(),
            position: position.to_array(),
        });
    }

    /// Resolve entries into items with content-addressed ids.
    pub fn into_items(self) -> Vec<PlaceableItem> {
        self.items
            .into_iter()
            .map(|entry| {
                let position = DVec3::from_array(entry.position);
                PlaceableItem {
                    id: item_id(&entry.name, position),
                    name: entry.name,
                    position,
                }
            })
            .collect()
    }

    /// Save the manifest as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
            AssetError::Manifest {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

/// Content-addressed id of an item: first 8 bytes of SHA-256 over its name
/// and position.
pub fn item_id(name: &str, position: DVec3) -> ItemId {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    for c in position.to_array() {
        hasher.update(c.to_le_bytes());
    }
    let result = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&result[..8]);
    ItemId(u64::from_le_bytes(bytes))
}

/// Reads JSON manifests from a file or a directory of files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAssetSource;

impl AssetSource for JsonAssetSource {
    fn enumerate(&self, path: &Path) -> Result<Vec<PlaceableItem>, AssetError> {
        if !path.exists() {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }
        if path.is_file() {
            return Ok(ItemManifest::load(path)?.into_items());
        }

        let mut manifests: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        manifests.sort();

        let mut items = Vec::new();
        for manifest in &manifests {
            let loaded = ItemManifest::load(manifest)?.into_items();
            tracing::debug!(path = %manifest.display(), items = loaded.len(), "read manifest");
            items.extend(loaded);
        }
        Ok(items)
    }
}

pub fn crate_info() -> &'static str {
    "largemap-assets v0.1.0"
}
