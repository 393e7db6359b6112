//! Chunked navigation graph — the tile-level truth the region layer reads.
//!
//! The graph mirrors each station grid as 8×8 chunks of [`NavNode`]s, created
//! lazily as tiles are first touched. Game-side mutations (tile changes,
//! anchored obstacles, access readers) are *queued* and applied in one batch
//! per simulation tick by [`NavGrid::process_updates`], which stamps touched
//! chunks with the current tick and reports them so the region layer can
//! queue rebuilds. Nothing is applied mid-tick.
//!
//! The graph knows nothing about entities beyond an opaque [`EntityRef`] and
//! the collision layers / access tags registered under it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::profile::{collision, AccessTag, TraversalProfile};

/// Chunk side length in tiles.
pub const CHUNK_SIZE: i32 = 8;

/// At most this many queued obstacle moves are applied per tick; remaining
/// moves are deferred so tile/access updates keep priority during spikes
/// (explosions, mass unanchoring).
pub const MOVE_UPDATE_BUDGET: usize = 50;

/// If the deferred move backlog grows past this, the excess is force-drained
/// regardless of budget.
pub const MOVE_UPDATE_BACKLOG_LIMIT: usize = 100;

/// Opaque identity of one grid (a station, a shuttle, a derelict).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridId(pub u32);

/// Opaque handle for a game entity anchored to a tile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityRef(pub u64);

/// Tile coordinates on one grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Origin of the chunk this tile belongs to.
    pub fn chunk(self) -> ChunkCoord {
        ChunkCoord {
            x: self.x.div_euclid(CHUNK_SIZE) * CHUNK_SIZE,
            y: self.y.div_euclid(CHUNK_SIZE) * CHUNK_SIZE,
        }
    }

    /// The four cardinal neighbors (east, south, west, north).
    pub fn cardinal_neighbors(self) -> [Tile; 4] {
        [
            Tile::new(self.x + 1, self.y),
            Tile::new(self.x, self.y - 1),
            Tile::new(self.x - 1, self.y),
            Tile::new(self.x, self.y + 1),
        ]
    }
}

/// Chunk origin: tile coordinates snapped down to `CHUNK_SIZE`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

/// Octile distance between two tiles (diagonal steps cost 1.4).
pub fn octile_distance(a: Tile, b: Tile) -> f32 {
    let dx = (a.x - b.x).abs() as f32;
    let dy = (a.y - b.y).abs() as f32;
    let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
    hi + 0.4 * lo
}

/// What a tile update turns the tile into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Walkable deck plating.
    Floor,
    /// No tile — open space. Space nodes never join a region.
    Space,
}

/// One traversable (or blocked) unit of a grid.
///
/// Nodes start as space until a tile update marks them floor. Blockers and
/// access readers are keyed by the registering entity so they can be removed
/// or moved individually.
#[derive(Debug, Clone)]
pub struct NavNode {
    tile: Tile,
    empty: bool,
    blockers: BTreeMap<EntityRef, u32>,
    access: BTreeMap<EntityRef, BTreeSet<AccessTag>>,
}

impl NavNode {
    fn new(tile: Tile) -> Self {
        Self {
            tile,
            empty: true,
            blockers: BTreeMap::new(),
            access: BTreeMap::new(),
        }
    }

    pub fn tile(&self) -> Tile {
        self.tile
    }

    /// Whether the tile is space (no floor).
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Union of all registered blockers' tracked collision layers.
    pub fn blocked_mask(&self) -> u32 {
        self.blockers.values().fold(0, |mask, layers| mask | layers)
    }

    /// Whether any access reader is registered on this node.
    pub fn requires_access(&self) -> bool {
        !self.access.is_empty()
    }

    /// Flattened access requirements: the union of every reader's tag set.
    /// An agent passes iff it holds every tag of every reader, which is the
    /// same as holding the union.
    pub fn access_requirements(&self) -> BTreeSet<AccessTag> {
        let mut all = BTreeSet::new();
        for tags in self.access.values() {
            all.extend(tags.iter().copied());
        }
        all
    }

    /// Whether this node lets `profile` through: floor exists, no tracked
    /// blocker intersects the profile's mask, and all access requirements are
    /// held.
    pub fn traversable_by(&self, profile: &TraversalProfile) -> bool {
        !self.empty
            && self.blocked_mask() & profile.collision_mask == 0
            && profile.satisfies(&self.access_requirements())
    }
}

/// An 8×8 square of nodes belonging to one grid.
#[derive(Debug, Clone)]
pub struct NavChunk {
    grid: GridId,
    origin: ChunkCoord,
    nodes: Vec<NavNode>,
    /// Tick of the last mutation applied to any node in this chunk.
    pub last_update: u64,
}

impl NavChunk {
    fn new(grid: GridId, origin: ChunkCoord, now: u64) -> Self {
        let mut nodes = Vec::with_capacity((CHUNK_SIZE * CHUNK_SIZE) as usize);
        for y in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                nodes.push(NavNode::new(Tile::new(origin.x + x, origin.y + y)));
            }
        }
        Self {
            grid,
            origin,
            nodes,
            last_update: now,
        }
    }

    pub fn grid(&self) -> GridId {
        self.grid
    }

    pub fn origin(&self) -> ChunkCoord {
        self.origin
    }

    pub fn contains(&self, tile: Tile) -> bool {
        tile.x >= self.origin.x
            && tile.x < self.origin.x + CHUNK_SIZE
            && tile.y >= self.origin.y
            && tile.y < self.origin.y + CHUNK_SIZE
    }

    fn index(&self, tile: Tile) -> usize {
        debug_assert!(self.contains(tile));
        let lx = tile.x - self.origin.x;
        let ly = tile.y - self.origin.y;
        (ly * CHUNK_SIZE + lx) as usize
    }

    pub fn node(&self, tile: Tile) -> &NavNode {
        &self.nodes[self.index(tile)]
    }

    fn node_mut(&mut self, tile: Tile) -> &mut NavNode {
        let idx = self.index(tile);
        &mut self.nodes[idx]
    }

    /// Node at chunk-local coordinates; used by the region builder's raster
    /// scan.
    pub fn node_at_local(&self, x: i32, y: i32) -> &NavNode {
        debug_assert!((0..CHUNK_SIZE).contains(&x) && (0..CHUNK_SIZE).contains(&y));
        &self.nodes[(y * CHUNK_SIZE + x) as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NavNode> {
        self.nodes.iter()
    }
}

// ── Queued mutations ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TileUpdate {
    grid: GridId,
    tile: Tile,
    kind: TileKind,
}

#[derive(Debug, Clone)]
struct AccessUpdate {
    grid: GridId,
    entity: EntityRef,
    tile: Tile,
    /// `Some` registers (replacing any previous set), `None` removes.
    tags: Option<BTreeSet<AccessTag>>,
}

#[derive(Debug, Clone)]
enum BlockerUpdate {
    Add {
        grid: GridId,
        entity: EntityRef,
        tile: Tile,
        layers: u32,
    },
    Remove {
        entity: EntityRef,
    },
}

#[derive(Debug, Clone)]
struct MoveUpdate {
    entity: EntityRef,
    grid: GridId,
    tile: Tile,
}

/// The navigation graph for all live grids.
#[derive(Debug, Default)]
pub struct NavGrid {
    chunks: HashMap<GridId, HashMap<ChunkCoord, NavChunk>>,
    tile_updates: VecDeque<TileUpdate>,
    access_updates: VecDeque<AccessUpdate>,
    blocker_updates: VecDeque<BlockerUpdate>,
    move_updates: VecDeque<MoveUpdate>,
    /// Last applied position and layers per tracked blocker.
    tracked_blockers: HashMap<EntityRef, (GridId, Tile, u32)>,
}

impl NavGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node lookup. `None` for tiles no chunk has been created for.
    pub fn node(&self, grid: GridId, tile: Tile) -> Option<&NavNode> {
        self.chunk(grid, tile.chunk()).map(|c| c.node(tile))
    }

    pub fn chunk(&self, grid: GridId, coord: ChunkCoord) -> Option<&NavChunk> {
        self.chunks.get(&grid)?.get(&coord)
    }

    /// All chunks of one grid, in no particular order.
    pub fn chunks_of(&self, grid: GridId) -> impl Iterator<Item = &NavChunk> {
        self.chunks.get(&grid).into_iter().flat_map(|m| m.values())
    }

    fn chunk_mut_or_create(&mut self, grid: GridId, tile: Tile, now: u64) -> &mut NavChunk {
        let coord = tile.chunk();
        self.chunks
            .entry(grid)
            .or_default()
            .entry(coord)
            .or_insert_with(|| NavChunk::new(grid, coord, now))
    }

    // ── Queueing (called from game-rule systems, any time) ──────────────

    pub fn queue_tile_update(&mut self, grid: GridId, tile: Tile, kind: TileKind) {
        self.tile_updates.push_back(TileUpdate { grid, tile, kind });
    }

    pub fn queue_access_add(
        &mut self,
        grid: GridId,
        entity: EntityRef,
        tile: Tile,
        tags: BTreeSet<AccessTag>,
    ) {
        self.access_updates.push_back(AccessUpdate {
            grid,
            entity,
            tile,
            tags: Some(tags),
        });
    }

    pub fn queue_access_remove(&mut self, grid: GridId, entity: EntityRef, tile: Tile) {
        self.access_updates.push_back(AccessUpdate {
            grid,
            entity,
            tile,
            tags: None,
        });
    }

    pub fn queue_blocker_add(&mut self, grid: GridId, entity: EntityRef, tile: Tile, layers: u32) {
        self.blocker_updates.push_back(BlockerUpdate::Add {
            grid,
            entity,
            tile,
            layers,
        });
    }

    pub fn queue_blocker_remove(&mut self, entity: EntityRef) {
        self.blocker_updates
            .push_back(BlockerUpdate::Remove { entity });
    }

    pub fn queue_blocker_move(&mut self, entity: EntityRef, grid: GridId, tile: Tile) {
        self.move_updates.push_back(MoveUpdate { entity, grid, tile });
    }

    // ── Batch application (once per tick) ───────────────────────────────

    /// Apply all queued mutations, stamp touched chunks with `now`, and
    /// return the deduplicated list of dirtied chunks.
    ///
    /// Tile, blocker and access updates always drain fully. Moves are capped
    /// by [`MOVE_UPDATE_BUDGET`] minus the higher-priority updates already
    /// applied, unless the backlog exceeds [`MOVE_UPDATE_BACKLOG_LIMIT`], in
    /// which case the excess is drained regardless.
    pub fn process_updates(&mut self, now: u64) -> Vec<(GridId, ChunkCoord)> {
        let mut dirty: BTreeSet<(GridId, ChunkCoord)> = BTreeSet::new();
        let mut total = 0usize;

        while let Some(update) = self.blocker_updates.pop_front() {
            self.apply_blocker(update, now, &mut dirty);
            total += 1;
        }

        while let Some(update) = self.access_updates.pop_front() {
            self.apply_access(update, now, &mut dirty);
            total += 1;
        }

        while let Some(update) = self.tile_updates.pop_front() {
            self.apply_tile(update, now, &mut dirty);
            total += 1;
        }

        let mut move_count = MOVE_UPDATE_BUDGET.saturating_sub(total);
        if self.move_updates.len() > MOVE_UPDATE_BACKLOG_LIMIT {
            move_count = move_count.max(self.move_updates.len() - MOVE_UPDATE_BACKLOG_LIMIT);
        }
        move_count = move_count.min(self.move_updates.len());

        for _ in 0..move_count {
            let update = self.move_updates.pop_front().expect("counted above");
            self.apply_move(update, now, &mut dirty);
        }

        for &(grid, coord) in &dirty {
            if let Some(chunk) = self
                .chunks
                .get_mut(&grid)
                .and_then(|m| m.get_mut(&coord))
            {
                chunk.last_update = now;
            }
        }

        dirty.into_iter().collect()
    }

    fn apply_tile(
        &mut self,
        update: TileUpdate,
        now: u64,
        dirty: &mut BTreeSet<(GridId, ChunkCoord)>,
    ) {
        let chunk = self.chunk_mut_or_create(update.grid, update.tile, now);
        chunk.node_mut(update.tile).empty = update.kind == TileKind::Space;
        dirty.insert((update.grid, update.tile.chunk()));
    }

    fn apply_access(
        &mut self,
        update: AccessUpdate,
        now: u64,
        dirty: &mut BTreeSet<(GridId, ChunkCoord)>,
    ) {
        let chunk = self.chunk_mut_or_create(update.grid, update.tile, now);
        let node = chunk.node_mut(update.tile);
        match update.tags {
            Some(tags) => {
                node.access.insert(update.entity, tags);
            }
            None => {
                node.access.remove(&update.entity);
            }
        }
        dirty.insert((update.grid, update.tile.chunk()));
    }

    fn apply_blocker(
        &mut self,
        update: BlockerUpdate,
        now: u64,
        dirty: &mut BTreeSet<(GridId, ChunkCoord)>,
    ) {
        match update {
            BlockerUpdate::Add {
                grid,
                entity,
                tile,
                layers,
            } => {
                let layers = layers & collision::TRACKED;
                // Untracked layers never enter the graph; double-adds keep
                // the first registration, matching move reconciliation.
                if layers == 0 || self.tracked_blockers.contains_key(&entity) {
                    return;
                }
                let chunk = self.chunk_mut_or_create(grid, tile, now);
                chunk.node_mut(tile).blockers.insert(entity, layers);
                self.tracked_blockers.insert(entity, (grid, tile, layers));
                dirty.insert((grid, tile.chunk()));
            }
            BlockerUpdate::Remove { entity } => {
                let Some((grid, tile, _)) = self.tracked_blockers.remove(&entity) else {
                    return;
                };
                if let Some(chunk) = self
                    .chunks
                    .get_mut(&grid)
                    .and_then(|m| m.get_mut(&tile.chunk()))
                {
                    chunk.node_mut(tile).blockers.remove(&entity);
                    dirty.insert((grid, tile.chunk()));
                }
            }
        }
    }

    fn apply_move(
        &mut self,
        update: MoveUpdate,
        now: u64,
        dirty: &mut BTreeSet<(GridId, ChunkCoord)>,
    ) {
        let Some(&(old_grid, old_tile, layers)) = self.tracked_blockers.get(&update.entity) else {
            return;
        };
        if old_grid == update.grid && old_tile == update.tile {
            return;
        }
        if let Some(chunk) = self
            .chunks
            .get_mut(&old_grid)
            .and_then(|m| m.get_mut(&old_tile.chunk()))
        {
            chunk.node_mut(old_tile).blockers.remove(&update.entity);
            dirty.insert((old_grid, old_tile.chunk()));
        }
        let chunk = self.chunk_mut_or_create(update.grid, update.tile, now);
        chunk.node_mut(update.tile).blockers.insert(update.entity, layers);
        self.tracked_blockers
            .insert(update.entity, (update.grid, update.tile, layers));
        dirty.insert((update.grid, update.tile.chunk()));
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Drop all chunks of a grid (shuttle destroyed, map unloaded). Queued
    /// updates targeting the grid are discarded so they cannot resurrect it.
    pub fn remove_grid(&mut self, grid: GridId) {
        self.chunks.remove(&grid);
        self.tracked_blockers.retain(|_, (g, _, _)| *g != grid);
        self.tile_updates.retain(|u| u.grid != grid);
        self.access_updates.retain(|u| u.grid != grid);
        self.blocker_updates.retain(|u| match u {
            BlockerUpdate::Add { grid: g, .. } => *g != grid,
            BlockerUpdate::Remove { .. } => true,
        });
        self.move_updates.retain(|u| u.grid != grid);
        log::debug!("nav grid {:?} removed", grid);
    }

    /// Full wipe (round restart).
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.tile_updates.clear();
        self.access_updates.clear();
        self.blocker_updates.clear();
        self.move_updates.clear();
        self.tracked_blockers.clear();
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Bounded flood fill: all nodes traversable by `profile` within `range`
    /// octile distance of `origin`, connected to it through traversable
    /// tiles. The origin itself is included when traversable. Used by the
    /// reachability façade to substitute a nearby node for an unreachable
    /// target.
    pub fn nodes_in_range(
        &self,
        grid: GridId,
        profile: &TraversalProfile,
        origin: Tile,
        range: f32,
    ) -> Vec<Tile> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(origin);
        queue.push_back(origin);

        if self
            .node(grid, origin)
            .is_some_and(|n| n.traversable_by(profile))
        {
            found.push(origin);
        }

        while let Some(tile) = queue.pop_front() {
            for neighbor in tile.cardinal_neighbors() {
                if !visited.insert(neighbor) {
                    continue;
                }
                if octile_distance(origin, neighbor) > range {
                    continue;
                }
                let Some(node) = self.node(grid, neighbor) else {
                    continue;
                };
                if !node.traversable_by(profile) {
                    continue;
                }
                found.push(neighbor);
                queue.push_back(neighbor);
            }
        }

        found
    }
}
