use std::path::Path;

use largemap_assets::{AssetError, AssetSource, JsonAssetSource};
use largemap_common::{ConfigError, ItemId, MapConfig, ObserverId};
use largemap_origin::{OriginListener, OriginRebaser, OriginState, RebaseEvent};
use largemap_stream::{
    StreamStats, StreamingController, Tile, TileContentBackend, TileGrid, TileKey,
};
use serde::{Deserialize, Serialize};

use crate::observer::{LocalFrame, ObserverTracker};

/// An event record produced by every observable change to the session.
///
/// The log is append-only and drained by the caller; it is the only history
/// the manager keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapEvent {
    /// Items were partitioned into tiles.
    MapGenerated { items: usize, tiles: usize },
    ObserverAdded { id: ObserverId },
    ObserverRemoved { id: ObserverId },
    /// The origin moved.
    Rebased(RebaseEvent),
    TileUnloaded { key: TileKey },
    TileLoaded { key: TileKey },
    ItemSpawned { key: TileKey, item: ItemId },
    /// A backend request failed and will be retried.
    BackendFailure { message: String },
}

/// Errors from manager operations after construction.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("asset enumeration failed: {0}")]
    Asset(#[from] AssetError),
}

/// Summary of one update cycle.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub observers_refreshed: usize,
    pub stale_observers: usize,
    pub rebase: Option<RebaseEvent>,
    pub stream: StreamStats,
}

/// Top-level owner of a large-map session.
///
/// Holds the tile grid, the observers, the origin and the streaming policy,
/// and runs them in a fixed order once per [`LargeMapManager::tick`]:
/// refresh observers, rebase if needed, then stream.
pub struct LargeMapManager<B: TileContentBackend> {
    config: MapConfig,
    grid: TileGrid,
    observers: ObserverTracker,
    rebaser: OriginRebaser,
    stream: StreamingController,
    backend: B,
    tick: u64,
    elapsed: f64,
    event_log: Vec<MapEvent>,
}

impl<B: TileContentBackend> LargeMapManager<B> {
    /// Build a session. Fails if the config is invalid.
    pub fn new(config: MapConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            grid: TileGrid::new(config.tile_side),
            observers: ObserverTracker::new(),
            rebaser: OriginRebaser::from_config(&config)?,
            stream: StreamingController::new((&config).into()),
            backend,
            tick: 0,
            elapsed: 0.0,
            event_log: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Partition the items found under `path` into their tiles' pending
    /// queues. Returns the number of items queued.
    pub fn generate_map(&mut self, path: impl AsRef<Path>) -> Result<usize, MapError> {
        self.generate_map_with(&JsonAssetSource, path)
    }

    /// [`LargeMapManager::generate_map`] with a custom asset source.
    pub fn generate_map_with<S>(
        &mut self,
        source: &S,
        path: impl AsRef<Path>,
    ) -> Result<usize, MapError>
    where
        S: AssetSource + ?Sized,
    {
        let path = path.as_ref();
        let _span = tracing::info_span!("generate_map", path = %path.display()).entered();

        let items = source.enumerate(path)?;
        let count = items.len();
        for item in items {
            self.grid.tile_at(item.position).push_pending(item);
        }

        let tiles = self.grid.tile_count();
        tracing::info!(items = count, tiles, "map generated");
        self.event_log.push(MapEvent::MapGenerated {
            items: count,
            tiles,
        });
        Ok(count)
    }

    /// Start tracking an observer. Returns false if the id is already tracked.
    pub fn add_observer(&mut self, id: ObserverId, frame: impl LocalFrame + 'static) -> bool {
        let added = self.observers.add(id, Box::new(frame));
        if added {
            tracing::debug!(?id, "observer added");
            self.event_log.push(MapEvent::ObserverAdded { id });
        }
        added
    }

    /// Stop tracking an observer. Returns false if it was not tracked.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.remove(id);
        if removed {
            tracing::debug!(?id, "observer removed");
            self.event_log.push(MapEvent::ObserverRemoved { id });
        }
        removed
    }

    pub fn add_origin_listener(&mut self, listener: Box<dyn OriginListener>) {
        self.rebaser.add_listener(listener);
    }

    /// Run one update cycle.
    pub fn tick(&mut self, delta_seconds: f32) -> TickReport {
        self.tick += 1;
        self.elapsed += f64::from(delta_seconds.max(0.0));
        let _span = tracing::info_span!("map_tick", tick = self.tick).entered();

        let refresh = self.observers.refresh_all(self.rebaser.origin());
        let positions = self.observers.positions();

        let observers = &mut self.observers;
        let rebase = self.rebaser.check(&positions, |origin| {
            observers.relocate_all(origin);
        });
        if let Some(event) = rebase {
            self.event_log.push(MapEvent::Rebased(event));
        }

        let update = self
            .stream
            .update(&positions, &mut self.grid, &mut self.backend);
        self.event_log.extend(
            update
                .unloaded
                .iter()
                .map(|key| MapEvent::TileUnloaded { key: *key }),
        );
        self.event_log.extend(
            update
                .loaded
                .iter()
                .map(|key| MapEvent::TileLoaded { key: *key }),
        );
        self.event_log.extend(
            update
                .spawned
                .iter()
                .map(|(key, item)| MapEvent::ItemSpawned {
                    key: *key,
                    item: *item,
                }),
        );
        self.event_log.extend(
            update
                .failures
                .iter()
                .map(|err| MapEvent::BackendFailure {
                    message: err.to_string(),
                }),
        );

        TickReport {
            tick: self.tick,
            observers_refreshed: refresh.refreshed,
            stale_observers: refresh.stale,
            rebase,
            stream: self.stream.stats().clone(),
        }
    }

    /// Number of distinct tile columns and rows materialized so far.
    pub fn grid_extent(&self) -> (usize, usize) {
        self.grid.extent()
    }

    /// The tile has resident content and the backend reports it loaded.
    pub fn is_tile_loaded(&self, key: TileKey) -> bool {
        self.grid
            .get(key)
            .and_then(Tile::content)
            .is_some_and(|handle| self.backend.is_loaded(handle))
    }

    pub fn tile(&self, key: TileKey) -> Option<&Tile> {
        self.grid.get(key)
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn observers(&self) -> &ObserverTracker {
        &self.observers
    }

    pub fn origin(&self) -> &OriginState {
        self.rebaser.origin()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of cycles run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Seconds of simulated time accumulated from tick deltas.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[MapEvent] {
        &self.event_log
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.event_log)
    }
}
