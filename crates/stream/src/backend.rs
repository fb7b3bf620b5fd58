use std::collections::{BTreeMap, HashSet};

use glam::DVec3;
use largemap_common::{ItemId, PlaceableItem};
use serde::{Deserialize, Serialize};

use crate::grid::TileKey;

/// Opaque handle to streamed tile content, issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHandle(pub u64);

/// A request to stream in one tile's content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadRequest {
    pub key: TileKey,
    /// Absolute corner of the tile.
    pub anchor: DVec3,
    /// Prefer finishing the load before returning.
    pub blocking: bool,
}

/// Transient failures reported by a backend. Never fatal to the controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("load of {key} failed: {reason}")]
    Load { key: TileKey, reason: String },
    #[error("unload of {handle:?} failed: {reason}")]
    Unload {
        handle: ContentHandle,
        reason: String,
    },
    #[error("materialize of item {item:?} into {handle:?} failed: {reason}")]
    Materialize {
        handle: ContentHandle,
        item: ItemId,
        reason: String,
    },
}

/// Whatever actually brings tile content in and out of memory.
///
/// Calls are fire-and-forget: a successful `load` means the request was
/// accepted, not that the content is resident yet. `is_loaded` reports the
/// latter.
pub trait TileContentBackend {
    fn load(&mut self, request: &LoadRequest) -> Result<ContentHandle, BackendError>;
    fn unload(&mut self, handle: ContentHandle) -> Result<(), BackendError>;
    /// Place one item into a tile's content.
    ///
    /// The controller calls this in the same cycle `load` returned the
    /// handle, so it may arrive before `is_loaded(handle)` is true.
    /// Backends that stream asynchronously must queue the item until the
    /// content lands, or return an error so the controller retries next cycle.
    fn materialize(
        &mut self,
        handle: ContentHandle,
        item: &PlaceableItem,
    ) -> Result<(), BackendError>;
    fn is_loaded(&self, handle: ContentHandle) -> bool;
}

/// One call received by an [`InMemoryBackend`], successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendCall {
    Load { key: TileKey, blocking: bool },
    Unload { handle: ContentHandle },
    Materialize { handle: ContentHandle, item: ItemId },
}

/// Backend that keeps everything in memory and records every call.
///
/// Loads complete immediately. Failures can be injected per tile or per item
/// to exercise the retry paths.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    next_handle: u64,
    resident: BTreeMap<ContentHandle, TileKey>,
    materialized: BTreeMap<ContentHandle, Vec<ItemId>>,
    calls: Vec<BackendCall>,
    failing_loads: HashSet<TileKey>,
    failing_unloads: HashSet<TileKey>,
    failing_items: HashSet<ItemId>,
    materialized_total: usize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every load of `key` fail until cleared.
    pub fn fail_loads(&mut self, key: TileKey) {
        self.failing_loads.insert(key);
    }

    /// Make every unload of the content of `key` fail until cleared.
    pub fn fail_unloads(&mut self, key: TileKey) {
        self.failing_unloads.insert(key);
    }

    /// Make every materialize of `item` fail until cleared.
    pub fn fail_item(&mut self, item: ItemId) {
        self.failing_items.insert(item);
    }

    pub fn clear_failures(&mut self) {
        self.failing_loads.clear();
        self.failing_unloads.clear();
        self.failing_items.clear();
    }

    /// Read-only access to the call log.
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Drain and return the call log.
    pub fn drain_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of tiles with resident content.
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Tile a live handle belongs to.
    pub fn tile_of(&self, handle: ContentHandle) -> Option<TileKey> {
        self.resident.get(&handle).copied()
    }

    /// Items materialized into a live handle, in order.
    pub fn materialized(&self, handle: ContentHandle) -> &[ItemId] {
        self.materialized
            .get(&handle)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Materialize calls that succeeded this session.
    pub fn materialized_total(&self) -> usize {
        self.materialized_total
    }
}

impl TileContentBackend for InMemoryBackend {
    fn load(&mut self, request: &LoadRequest) -> Result<ContentHandle, BackendError> {
        self.calls.push(BackendCall::Load {
            key: request.key,
            blocking: request.blocking,
        });
        if self.failing_loads.contains(&request.key) {
            return Err(BackendError::Load {
                key: request.key,
                reason: "injected failure".into(),
            });
        }
        self.next_handle += 1;
        let handle = ContentHandle(self.next_handle);
        self.resident.insert(handle, request.key);
        Ok(handle)
    }

    fn unload(&mut self, handle: ContentHandle) -> Result<(), BackendError> {
        self.calls.push(BackendCall::Unload { handle });
        let Some(key) = self.resident.get(&handle).copied() else {
            return Err(BackendError::Unload {
                handle,
                reason: "unknown handle".into(),
            });
        };
        if self.failing_unloads.contains(&key) {
            return Err(BackendError::Unload {
                handle,
                reason: "injected failure".into(),
            });
        }
        self.resident.remove(&handle);
        self.materialized.remove(&handle);
        Ok(())
    }

    fn materialize(
        &mut self,
        handle: ContentHandle,
        item: &PlaceableItem,
    ) -> Result<(), BackendError> {
        self.calls.push(BackendCall::Materialize {
            handle,
            item: item.id,
        });
        if !self.resident.contains_key(&handle) {
            return Err(BackendError::Materialize {
                handle,
                item: item.id,
                reason: "content not resident".into(),
            });
        }
        if self.failing_items.contains(&item.id) {
            return Err(BackendError::Materialize {
                handle,
                item: item.id,
                reason: "injected failure".into(),
            });
        }
        self.materialized.entry(handle).or_default().push(item.id);
        self.materialized_total += 1;
        Ok(())
    }

    fn is_loaded(&self, handle: ContentHandle) -> bool {
        self.resident.contains_key(&handle)
    }
}
