use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use glam::DVec3;
use largemap_common::{ItemId, MapConfig};

use crate::backend::{BackendError, LoadRequest, TileContentBackend};
use crate::grid::{Tile, TileGrid, TileKey};

/// Streaming configuration: residency distance and load behaviour.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Tiles strictly closer than this to an observer must be resident.
    pub streaming_distance: f64,
    /// Forwarded to the backend with every load request.
    pub block_on_load: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig::from(&MapConfig::default())
    }
}

impl From<&MapConfig> for StreamConfig {
    fn from(config: &MapConfig) -> Self {
        Self {
            streaming_distance: config.streaming_distance,
            block_on_load: config.block_on_load,
        }
    }
}

/// Per-cycle streaming statistics for instrumentation.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub tiles_desired: usize,
    pub tiles_loaded_this_cycle: usize,
    pub tiles_unloaded_this_cycle: usize,
    pub items_spawned_this_cycle: usize,
    pub backend_failures_this_cycle: usize,
    pub total_resident_tiles: usize,
    pub cycle_time: Duration,
}

/// Everything one streaming cycle did, in the order it did it.
#[derive(Debug, Clone, Default)]
pub struct StreamUpdate {
    pub unloaded: Vec<TileKey>,
    pub loaded: Vec<TileKey>,
    pub spawned: Vec<(TileKey, ItemId)>,
    pub failures: Vec<BackendError>,
}

/// Result of draining one tile's pending queue.
#[derive(Debug, Clone, Default)]
pub struct SpawnOutcome {
    pub spawned: Vec<ItemId>,
    pub failures: Vec<BackendError>,
}

/// Decides which tiles must be resident and drives the backend to match.
///
/// Nothing is remembered between cycles except what the grid itself holds:
/// the desired/resident diff is rebuilt every cycle, so a failed request is
/// simply issued again next time.
pub struct StreamingController {
    pub config: StreamConfig,
    stats: StreamStats,
}

impl StreamingController {
    pub fn new(config: StreamConfig) -> Self {
        assert!(
            config.streaming_distance > 0.0,
            "streaming_distance must be positive"
        );
        Self {
            config,
            stats: StreamStats::default(),
        }
    }

    /// Union over all observers of the tiles within streaming distance.
    /// Every returned tile exists in the grid afterwards.
    pub fn desired_tiles(&self, grid: &mut TileGrid, observers: &[DVec3]) -> BTreeSet<TileKey> {
        let mut desired = BTreeSet::new();
        for position in observers {
            desired.extend(grid.keys_within(*position, self.config.streaming_distance));
        }
        for key in &desired {
            grid.get_or_create(*key);
        }
        desired
    }

    /// Run one streaming cycle for the given absolute observer positions.
    ///
    /// Unloads are issued before loads. Newly resident tiles, and resident
    /// tiles whose previous spawn was incomplete, then spawn their pending
    /// items.
    pub fn update<B>(
        &mut self,
        observers: &[DVec3],
        grid: &mut TileGrid,
        backend: &mut B,
    ) -> StreamUpdate
    where
        B: TileContentBackend + ?Sized,
    {
        let _span = tracing::info_span!("stream_update").entered();
        let cycle_start = Instant::now();

        let desired = self.desired_tiles(grid, observers);
        let resident = grid.resident_keys();
        let to_unload: Vec<TileKey> = resident.difference(&desired).copied().collect();
        let to_load: Vec<TileKey> = desired.difference(&resident).copied().collect();

        let mut update = StreamUpdate::default();

        for key in to_unload {
            let Some(tile) = grid.get_mut(key) else {
                continue;
            };
            let Some(handle) = tile.content() else {
                continue;
            };
            match backend.unload(handle) {
                Ok(()) => {
                    tile.release_content();
                    tracing::debug!(tile = %key, "unloaded tile");
                    update.unloaded.push(key);
                }
                Err(err) => {
                    tracing::warn!(tile = %key, %err, "unload failed, retrying next cycle");
                    update.failures.push(err);
                }
            }
        }

        for key in to_load {
            let tile = grid.get_or_create(key);
            let request = LoadRequest {
                key,
                anchor: tile.anchor(),
                blocking: self.config.block_on_load,
            };
            match backend.load(&request) {
                Ok(handle) => {
                    tile.attach_content(handle);
                    tracing::debug!(tile = %key, ?handle, "loaded tile");
                    update.loaded.push(key);
                }
                Err(err) => {
                    tracing::warn!(tile = %key, %err, "load failed, retrying next cycle");
                    update.failures.push(err);
                }
            }
        }

        for key in &desired {
            let Some(tile) = grid.get_mut(*key) else {
                continue;
            };
            if !tile.is_resident() || tile.is_spawned() {
                continue;
            }
            let outcome = Self::spawn_tile(tile, backend);
            update
                .spawned
                .extend(outcome.spawned.into_iter().map(|item| (*key, item)));
            update.failures.extend(outcome.failures);
        }

        self.stats = StreamStats {
            tiles_desired: desired.len(),
            tiles_loaded_this_cycle: update.loaded.len(),
            tiles_unloaded_this_cycle: update.unloaded.len(),
            items_spawned_this_cycle: update.spawned.len(),
            backend_failures_this_cycle: update.failures.len(),
            total_resident_tiles: grid.resident_keys().len(),
            cycle_time: cycle_start.elapsed(),
        };

        tracing::trace!(
            loaded = update.loaded.len(),
            unloaded = update.unloaded.len(),
            spawned = update.spawned.len(),
            failures = update.failures.len(),
            resident = self.stats.total_resident_tiles,
            "stream update complete"
        );

        update
    }

    /// Materialize a resident tile's pending items.
    ///
    /// A no-op once the tile has spawned. Items the backend rejects stay
    /// queued and the tile stays unspawned, so a later call retries only
    /// those.
    pub fn spawn_tile<B>(tile: &mut Tile, backend: &mut B) -> SpawnOutcome
    where
        B: TileContentBackend + ?Sized,
    {
        let mut outcome = SpawnOutcome::default();
        if tile.is_spawned() {
            return outcome;
        }
        let Some(handle) = tile.content() else {
            return outcome;
        };

        let mut pending = tile.take_pending();
        let mut remaining = std::collections::VecDeque::new();
        while let Some(item) = pending.pop_front() {
            match backend.materialize(handle, &item) {
                Ok(()) => {
                    tracing::debug!(tile = %tile.key(), item = %item.name, "spawned item");
                    outcome.spawned.push(item.id);
                }
                Err(err) => {
                    tracing::warn!(tile = %tile.key(), %err, "spawn failed, keeping item queued");
                    outcome.failures.push(err);
                    remaining.push_back(item);
                }
            }
        }
        tile.restore_pending(remaining);
        outcome
    }

    /// Get statistics from the last update.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}
