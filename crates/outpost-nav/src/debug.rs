//! Rebuild/cache observation hooks for tooling.
//!
//! The core notifies an optional [`RegionObserver`] whenever a chunk's
//! regions are regenerated and whenever the reachability cache is consulted.
//! Production code registers no observer; the simtest harness uses one to
//! dump chunk→region→node geometry and to assert cache behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::grid::{ChunkCoord, GridId, Tile};
use crate::regions::{RegionId, RegionStore};

/// Callback interface for rebuild and cache events. Correctness never
/// depends on an observer being registered.
pub trait RegionObserver {
    /// A chunk's region set was regenerated.
    fn regions_rebuilt(&mut self, grid: GridId, snapshot: ChunkRegionsSnapshot);

    /// The reachability cache answered for `source`; `cached` is false when
    /// the result was computed fresh.
    fn cache_consulted(&mut self, source: RegionId, result: &HashSet<RegionId>, cached: bool);
}

/// Geometry of one chunk's regions, for visualization tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRegionsSnapshot {
    pub grid: GridId,
    pub chunk: ChunkCoord,
    pub regions: Vec<RegionSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub id: RegionId,
    pub is_door: bool,
    pub tiles: Vec<Tile>,
}

/// Capture one chunk's current regions. Tiles and regions are sorted so the
/// output is stable across runs.
pub fn snapshot_chunk(store: &RegionStore, grid: GridId, chunk: ChunkCoord) -> ChunkRegionsSnapshot {
    let mut regions: Vec<RegionSnapshot> = store
        .regions_in_chunk(grid, chunk)
        .map(|region| {
            let mut tiles: Vec<Tile> = region.tiles.iter().copied().collect();
            tiles.sort();
            RegionSnapshot {
                id: region.id,
                is_door: region.is_door,
                tiles,
            }
        })
        .collect();
    regions.sort_by_key(|r| r.id);
    ChunkRegionsSnapshot {
        grid,
        chunk,
        regions,
    }
}
