//! Region graph — connected groups of traversable nodes, one set per chunk.
//!
//! A region is the unit the reachability layer works in: a maximal set of
//! mutually walkable nodes inside one chunk that an agent can cross without
//! passing an access-controlled cell. Access-controlled nodes become
//! singleton "door" regions of their own. Regions in adjacent chunks (or
//! adjacent within a chunk but discovered separately by the raster scan) are
//! linked by bidirectional neighbor edges over which the reachability search
//! expands.
//!
//! Rebuilding is chunk-granular: a chunk mutation throws away that chunk's
//! regions and re-partitions its 64 nodes from scratch. Neighbor edges store
//! ids only; an id that no longer resolves is a stale edge and is skipped.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::grid::{ChunkCoord, GridId, NavChunk, Tile, CHUNK_SIZE};
use crate::profile::{collision, AccessTag, TraversalProfile};

/// Generation-unique region identity. Never reused, so a stale id held
/// anywhere simply fails to resolve after its region is deleted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegionId(pub u64);

/// A maximal connected set of profile-compatible nodes within one chunk.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub grid: GridId,
    pub chunk: ChunkCoord,
    /// Seed node of the region; stands in for the whole region in distance
    /// estimates.
    pub representative: Tile,
    pub tiles: HashSet<Tile>,
    /// True iff this region is a single access-controlled node.
    pub is_door: bool,
    /// Flattened access requirements of the door node (empty for non-doors).
    pub requirements: BTreeSet<AccessTag>,
    /// Adjacent regions, by id (weak references — resolve via the store).
    pub neighbors: HashSet<RegionId>,
    pub deleted: bool,
}

impl Region {
    fn new(
        id: RegionId,
        grid: GridId,
        chunk: ChunkCoord,
        seed: Tile,
        is_door: bool,
        requirements: BTreeSet<AccessTag>,
    ) -> Self {
        let mut tiles = HashSet::new();
        tiles.insert(seed);
        Self {
            id,
            grid,
            chunk,
            representative: seed,
            tiles,
            is_door,
            requirements,
            neighbors: HashSet::new(),
            deleted: false,
        }
    }

    /// Straight-line distance between the two regions' representative nodes.
    /// An approximation — good enough to bound the reachability search.
    pub fn distance_to(&self, other: &Region) -> f32 {
        let dx = (self.representative.x - other.representative.x) as f32;
        let dy = (self.representative.y - other.representative.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// Whether the agent may enter this region. Only doors gate on access;
    /// blocked nodes never made it into a region in the first place.
    pub fn traversable_by(&self, profile: &TraversalProfile) -> bool {
        !self.is_door || profile.satisfies(&self.requirements)
    }
}

/// Everything deleted by one chunk rebuild, for cache eviction downstream.
#[derive(Debug, Default)]
pub struct ChunkRebuild {
    pub deleted: Vec<Region>,
}

/// All live regions across all grids, indexed by id and by owning chunk.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: HashMap<RegionId, Region>,
    by_chunk: HashMap<GridId, HashMap<ChunkCoord, HashSet<RegionId>>>,
    next_id: u64,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region ids of one chunk. Empty iterator for unknown chunks.
    pub fn regions_in_chunk(
        &self,
        grid: GridId,
        chunk: ChunkCoord,
    ) -> impl Iterator<Item = &Region> {
        self.by_chunk
            .get(&grid)
            .and_then(|m| m.get(&chunk))
            .into_iter()
            .flatten()
            .filter_map(|id| self.regions.get(id))
    }

    /// Resolve a tile to its region by scanning the owning chunk's region
    /// set. O(regions-per-chunk); deliberately no persistent node→region
    /// index, which would need its own invalidation bookkeeping. `None` for
    /// untracked tiles (space, unindexed chunks).
    pub fn region_at(&self, grid: GridId, tile: Tile) -> Option<RegionId> {
        let chunk_regions = self.by_chunk.get(&grid)?.get(&tile.chunk())?;
        for &id in chunk_regions {
            if let Some(region) = self.regions.get(&id) {
                if region.tiles.contains(&tile) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Re-partition one chunk, replacing its previous region set. Returns
    /// the regions deleted in the process (prior generation plus any regions
    /// absorbed by merges) so the caller can evict them from caches.
    pub fn rebuild_chunk(&mut self, chunk: &NavChunk) -> ChunkRebuild {
        let grid = chunk.grid();
        let coord = chunk.origin();
        let mut rebuild = ChunkRebuild::default();

        if let Some(old) = self
            .by_chunk
            .get_mut(&grid)
            .and_then(|m| m.remove(&coord))
        {
            for id in old {
                if let Some(mut region) = self.regions.remove(&id) {
                    region.deleted = true;
                    rebuild.deleted.push(region);
                }
            }
        }
        self.by_chunk.entry(grid).or_default().insert(coord, HashSet::new());

        // Per-rebuild node→region lookup so joins and merges are O(1).
        // Doors are deliberately left out: a non-door node must never join
        // (or silently absorb) a door region.
        let mut node_regions: HashMap<Tile, RegionId> = HashMap::new();

        for y in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                self.place_node(chunk, x, y, &mut node_regions, &mut rebuild);
            }
        }

        log::debug!(
            "rebuilt chunk {:?}/{:?}: {} regions ({} deleted)",
            grid,
            coord,
            self.by_chunk[&grid][&coord].len(),
            rebuild.deleted.len(),
        );

        rebuild
    }

    /// Assign one node to a region (or none), following the raster-scan
    /// rules: doors become singletons, otherwise join/merge the left and
    /// bottom neighbors, otherwise start fresh.
    fn place_node(
        &mut self,
        chunk: &NavChunk,
        x: i32,
        y: i32,
        node_regions: &mut HashMap<Tile, RegionId>,
        rebuild: &mut ChunkRebuild,
    ) {
        let grid = chunk.grid();
        let coord = chunk.origin();
        let node = chunk.node_at_local(x, y);
        let tile = node.tile();

        if node.is_empty() || node.blocked_mask() & collision::TRACKED != 0 {
            return;
        }

        if node.requires_access() {
            let id = self.insert_region(grid, coord, tile, true, node.access_requirements());
            self.update_region_edges(id, tile);
            return;
        }

        let left = (x > 0).then(|| chunk.node_at_local(x - 1, y).tile());
        let bottom = (y > 0).then(|| chunk.node_at_local(x, y - 1).tile());
        let left_region = left.and_then(|t| node_regions.get(&t)).copied();
        let bottom_region = bottom.and_then(|t| node_regions.get(&t)).copied();

        match (left_region, bottom_region) {
            (Some(lr), Some(br)) if lr != br => {
                // The node bridges two regions: it joins the bottom one and
                // the left one is merged in wholesale.
                self.regions
                    .get_mut(&br)
                    .expect("bottom region live during rebuild")
                    .tiles
                    .insert(tile);
                node_regions.insert(tile, br);
                let absorbed = self.merge_into(lr, br, node_regions);
                rebuild.deleted.push(absorbed);
            }
            (Some(lr), _) => {
                self.regions
                    .get_mut(&lr)
                    .expect("left region live during rebuild")
                    .tiles
                    .insert(tile);
                node_regions.insert(tile, lr);
                self.update_region_edges(lr, tile);
            }
            (None, Some(br)) => {
                self.regions
                    .get_mut(&br)
                    .expect("bottom region live during rebuild")
                    .tiles
                    .insert(tile);
                node_regions.insert(tile, br);
                self.update_region_edges(br, tile);
            }
            (None, None) => {
                let id = self.insert_region(grid, coord, tile, false, BTreeSet::new());
                node_regions.insert(tile, id);
                self.update_region_edges(id, tile);
            }
        }
    }

    fn insert_region(
        &mut self,
        grid: GridId,
        chunk: ChunkCoord,
        seed: Tile,
        is_door: bool,
        requirements: BTreeSet<AccessTag>,
    ) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        self.regions
            .insert(id, Region::new(id, grid, chunk, seed, is_door, requirements));
        self.by_chunk
            .entry(grid)
            .or_default()
            .entry(chunk)
            .or_default()
            .insert(id);
        id
    }

    /// Absorb `source` into `target`: migrate every member tile (and its
    /// back-pointer in the rebuild lookup), drop the source, then re-register
    /// edges for all of the target's tiles.
    fn merge_into(
        &mut self,
        source: RegionId,
        target: RegionId,
        node_regions: &mut HashMap<Tile, RegionId>,
    ) -> Region {
        debug_assert_ne!(source, target);
        let mut absorbed = self
            .delete_region(source)
            .expect("merge source must be live");
        debug_assert!(!absorbed.is_door, "door regions are never merged");

        {
            let target_region = self
                .regions
                .get_mut(&target)
                .expect("merge target must be live");
            debug_assert_eq!(absorbed.chunk, target_region.chunk);
            for &tile in &absorbed.tiles {
                target_region.tiles.insert(tile);
                node_regions.insert(tile, target);
            }
        }

        let tiles: Vec<Tile> = self.regions[&target].tiles.iter().copied().collect();
        for tile in tiles {
            self.update_region_edges(target, tile);
        }

        absorbed.deleted = true;
        absorbed
    }

    /// Link this region to any differently-owned region on the node's four
    /// cardinal neighbors — including neighbors in adjacent chunks, which is
    /// how cross-chunk connectivity (and same-chunk connectivity the raster
    /// scan could not merge) enters the graph.
    fn update_region_edges(&mut self, id: RegionId, tile: Tile) {
        debug_assert!(self.regions[&id].tiles.contains(&tile));
        let grid = self.regions[&id].grid;
        for neighbor_tile in tile.cardinal_neighbors() {
            let Some(other) = self.region_at(grid, neighbor_tile) else {
                continue;
            };
            if other == id {
                continue;
            }
            self.regions.get_mut(&id).unwrap().neighbors.insert(other);
            self.regions.get_mut(&other).unwrap().neighbors.insert(id);
        }
    }

    fn delete_region(&mut self, id: RegionId) -> Option<Region> {
        let region = self.regions.remove(&id)?;
        if let Some(chunk_regions) = self
            .by_chunk
            .get_mut(&region.grid)
            .and_then(|m| m.get_mut(&region.chunk))
        {
            chunk_regions.remove(&id);
        }
        Some(region)
    }

    /// Drop every region of a grid (grid removed). Returns the deleted
    /// regions for cache eviction.
    pub fn remove_grid(&mut self, grid: GridId) -> Vec<Region> {
        let mut deleted = Vec::new();
        if let Some(chunks) = self.by_chunk.remove(&grid) {
            for (_, ids) in chunks {
                for id in ids {
                    if let Some(mut region) = self.regions.remove(&id) {
                        region.deleted = true;
                        deleted.push(region);
                    }
                }
            }
        }
        deleted
    }

    /// Full wipe (round restart). Ids keep counting up so stale ids from the
    /// previous round cannot alias new regions.
    pub fn reset(&mut self) {
        self.regions.clear();
        self.by_chunk.clear();
    }
}
