use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use glam::{DVec2, DVec3};
use largemap_common::PlaceableItem;
use serde::{Deserialize, Serialize};

use crate::backend::ContentHandle;

/// A 2D tile coordinate in the world grid (Z is ignored for partitioning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tile_{}_{}", self.x, self.y)
    }
}

/// Flat 64-bit tile identifier: X in the high half, Y in the low half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey(pub u64);

impl From<TileCoord> for TileKey {
    fn from(coord: TileCoord) -> Self {
        let high = u64::from(coord.x as u32) << 32;
        let low = u64::from(coord.y as u32);
        TileKey(high | low)
    }
}

impl From<TileKey> for TileCoord {
    fn from(key: TileKey) -> Self {
        TileCoord {
            x: (key.0 >> 32) as u32 as i32,
            y: key.0 as u32 as i32,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&TileCoord::from(*self), f)
    }
}

/// One square region of the world.
///
/// Tiles are never removed from the grid. Streaming only attaches and
/// releases the content handle; the pending queue and spawn flag live on
/// independently of residency.
#[derive(Debug, Clone)]
pub struct Tile {
    coord: TileCoord,
    anchor: DVec3,
    content: Option<ContentHandle>,
    pending: VecDeque<PlaceableItem>,
    spawned: bool,
}

impl Tile {
    fn new(coord: TileCoord, tile_side: f64) -> Self {
        Self {
            coord,
            anchor: DVec3::new(
                f64::from(coord.x) * tile_side,
                f64::from(coord.y) * tile_side,
                0.0,
            ),
            content: None,
            pending: VecDeque::new(),
            spawned: false,
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn key(&self) -> TileKey {
        self.coord.into()
    }

    /// Absolute location of the tile's minimum corner. Unaffected by rebases.
    pub fn anchor(&self) -> DVec3 {
        self.anchor
    }

    pub fn content(&self) -> Option<ContentHandle> {
        self.content
    }

    /// A load was requested and succeeded, and no unload has since.
    pub fn is_resident(&self) -> bool {
        self.content.is_some()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PlaceableItem> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    /// Queue an item for spawning. A tile that already spawned its content
    /// will spawn again to pick the new item up.
    pub fn push_pending(&mut self, item: PlaceableItem) {
        self.pending.push_back(item);
        self.spawned = false;
    }

    pub(crate) fn attach_content(&mut self, handle: ContentHandle) {
        self.content = Some(handle);
    }

    pub(crate) fn release_content(&mut self) -> Option<ContentHandle> {
        self.content.take()
    }

    pub(crate) fn take_pending(&mut self) -> VecDeque<PlaceableItem> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn restore_pending(&mut self, remaining: VecDeque<PlaceableItem>) {
        self.spawned = remaining.is_empty();
        self.pending = remaining;
    }
}

/// Sparse, fixed-size tile partitioning of an unbounded plane.
///
/// Tiles materialize the first time something asks for them and stay for the
/// rest of the session.
pub struct TileGrid {
    tile_side: f64,
    tiles: HashMap<TileKey, Tile>,
}

impl TileGrid {
    /// Create an empty grid with the given tile side.
    pub fn new(tile_side: f64) -> Self {
        assert!(tile_side > 0.0, "tile_side must be positive");
        Self {
            tile_side,
            tiles: HashMap::new(),
        }
    }

    pub fn tile_side(&self) -> f64 {
        self.tile_side
    }

    /// Tile coordinate covering an absolute position. Floors toward negative
    /// infinity on both axes so tiles cover the plane without overlap.
    pub fn coord_of(&self, position: DVec3) -> TileCoord {
        TileCoord {
            x: (position.x / self.tile_side).floor() as i32,
            y: (position.y / self.tile_side).floor() as i32,
        }
    }

    /// Key of the tile covering an absolute position.
    pub fn key_of(&self, position: DVec3) -> TileKey {
        self.coord_of(position).into()
    }

    /// Min and max corners of a tile in the XY plane.
    pub fn bounds(&self, coord: TileCoord) -> (DVec2, DVec2) {
        let min = DVec2::new(f64::from(coord.x), f64::from(coord.y)) * self.tile_side;
        (min, min + DVec2::splat(self.tile_side))
    }

    /// Straight-line XY distance from a position to the nearest point of a
    /// tile. Zero when the position is inside the tile.
    pub fn distance_to_tile(&self, position: DVec3, coord: TileCoord) -> f64 {
        let (min, max) = self.bounds(coord);
        let p = position.truncate();
        p.distance(p.clamp(min, max))
    }

    /// Keys of every tile strictly closer than `distance` to `position`,
    /// in ascending key order. Does not create tiles.
    pub fn keys_within(&self, position: DVec3, distance: f64) -> Vec<TileKey> {
        let reach = DVec3::new(distance, distance, 0.0);
        let lo = self.coord_of(position - reach);
        let hi = self.coord_of(position + reach);
        let mut keys = Vec::new();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                let coord = TileCoord::new(x, y);
                if self.distance_to_tile(position, coord) < distance {
                    keys.push(coord.into());
                }
            }
        }
        keys.sort_unstable();
        keys
    }

    /// Existing tile, if any.
    pub fn get(&self, key: TileKey) -> Option<&Tile> {
        self.tiles.get(&key)
    }

    pub fn get_mut(&mut self, key: TileKey) -> Option<&mut Tile> {
        self.tiles.get_mut(&key)
    }

    /// Existing tile, or a fresh one anchored at its corner.
    pub fn get_or_create(&mut self, key: TileKey) -> &mut Tile {
        let tile_side = self.tile_side;
        self.tiles
            .entry(key)
            .or_insert_with(|| Tile::new(key.into(), tile_side))
    }

    /// Tile covering an absolute position, created if needed.
    pub fn tile_at(&mut self, position: DVec3) -> &mut Tile {
        let key = self.key_of(position);
        self.get_or_create(key)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Number of materialized tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Keys of tiles whose content is currently resident.
    pub fn resident_keys(&self) -> BTreeSet<TileKey> {
        self.tiles
            .iter()
            .filter(|(_, tile)| tile.is_resident())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Number of distinct tile columns and rows materialized so far.
    pub fn extent(&self) -> (usize, usize) {
        let columns: BTreeSet<i32> = self.tiles.values().map(|t| t.coord.x).collect();
        let rows: BTreeSet<i32> = self.tiles.values().map(|t| t.coord.y).collect();
        (columns.len(), rows.len())
    }

    /// Items still waiting to be spawned, across all tiles.
    pub fn total_pending(&self) -> usize {
        self.tiles.values().map(Tile::pending_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use largemap_common::ItemId;

    fn item(id: u64, x: f64, y: f64) -> PlaceableItem {
        PlaceableItem {
            id: ItemId(id),
            name: format!("item_{id}"),
            position: DVec3::new(x, y, 0.0),
        }
    }

    #[test]
    fn key_round_trips_through_coord() {
        for (x, y) in [(0, 0), (1, -1), (-1, 1), (i32::MIN, i32::MAX), (i32::MAX, i32::MIN)] {
            let coord = TileCoord::new(x, y);
            let key = TileKey::from(coord);
            assert_eq!(TileCoord::from(key), coord);
        }
    }

    #[test]
    fn distinct_coords_never_collide() {
        let mut seen = std::collections::HashSet::new();
        for x in -8..8 {
            for y in -8..8 {
                assert!(seen.insert(TileKey::from(TileCoord::new(x, y))));
            }
        }
    }

    #[test]
    fn key_of_basic() {
        let grid = TileGrid::new(100.0);
        assert_eq!(
            TileCoord::from(grid.key_of(DVec3::new(50.0, 50.0, 0.0))),
            TileCoord::new(0, 0)
        );
        assert_eq!(
            TileCoord::from(grid.key_of(DVec3::new(150.0, 50.0, 0.0))),
            TileCoord::new(1, 0)
        );
    }

    #[test]
    fn negative_positions_floor() {
        let grid = TileGrid::new(100.0);
        assert_eq!(grid.coord_of(DVec3::new(-0.5, -99.9, 0.0)), TileCoord::new(-1, -1));
        assert_eq!(grid.coord_of(DVec3::new(-100.0, 0.0, 0.0)), TileCoord::new(-1, 0));
        assert_eq!(grid.coord_of(DVec3::new(-100.1, 0.0, 0.0)), TileCoord::new(-2, 0));
    }

    #[test]
    fn same_tile_same_key() {
        let grid = TileGrid::new(64.0);
        let a = grid.key_of(DVec3::new(64.0, 127.9, 5.0));
        let b = grid.key_of(DVec3::new(127.9, 64.0, -300.0));
        assert_eq!(a, b);
        assert_eq!(a, grid.key_of(DVec3::new(64.0, 127.9, 5.0)));
    }

    #[test]
    fn get_or_create_anchors_at_corner() {
        let mut grid = TileGrid::new(100.0);
        let key = TileKey::from(TileCoord::new(-2, 3));
        assert!(grid.get(key).is_none());

        let tile = grid.get_or_create(key);
        assert_eq!(tile.anchor(), DVec3::new(-200.0, 300.0, 0.0));
        assert!(!tile.is_resident());
        assert!(grid.get(key).is_some());
        assert_eq!(grid.tile_count(), 1);

        grid.get_or_create(key);
        assert_eq!(grid.tile_count(), 1);
    }

    #[test]
    fn tile_names_follow_coordinates() {
        assert_eq!(TileCoord::new(3, -7).to_string(), "Tile_3_-7");
        assert_eq!(TileKey::from(TileCoord::new(3, -7)).to_string(), "Tile_3_-7");
    }

    #[test]
    fn distance_to_tile_is_zero_inside() {
        let grid = TileGrid::new(100.0);
        let p = DVec3::new(150.0, 50.0, 0.0);
        assert_eq!(grid.distance_to_tile(p, TileCoord::new(1, 0)), 0.0);
        assert_eq!(grid.distance_to_tile(p, TileCoord::new(0, 0)), 50.0);
        let diag = grid.distance_to_tile(DVec3::new(0.0, 0.0, 0.0), TileCoord::new(1, 1));
        assert!((diag - (2.0f64 * 100.0 * 100.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn keys_within_uses_straight_line_distance() {
        let grid = TileGrid::new(100.0);
        // Center of tile (0,0). Side neighbours are 50 away, diagonals ~70.7.
        let keys = grid.keys_within(DVec3::new(50.0, 50.0, 0.0), 60.0);
        let coords: BTreeSet<TileCoord> = keys.into_iter().map(TileCoord::from).collect();
        assert_eq!(coords.len(), 5);
        assert!(coords.contains(&TileCoord::new(0, 0)));
        assert!(coords.contains(&TileCoord::new(-1, 0)));
        assert!(!coords.contains(&TileCoord::new(1, 1)));
    }

    #[test]
    fn extent_counts_distinct_rows_and_columns() {
        let mut grid = TileGrid::new(10.0);
        assert_eq!(grid.extent(), (0, 0));
        grid.tile_at(DVec3::new(5.0, 5.0, 0.0));
        grid.tile_at(DVec3::new(15.0, 5.0, 0.0));
        grid.tile_at(DVec3::new(15.0, -5.0, 0.0));
        assert_eq!(grid.extent(), (2, 2));
    }

    #[test]
    fn pending_items_reset_spawn_flag() {
        let mut grid = TileGrid::new(10.0);
        let tile = grid.tile_at(DVec3::ZERO);
        tile.restore_pending(VecDeque::new());
        assert!(tile.is_spawned());
        tile.push_pending(item(1, 1.0, 1.0));
        assert!(!tile.is_spawned());
        assert_eq!(grid.total_pending(), 1);
    }
}
