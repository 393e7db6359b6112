//! Reachability cache and query façade.
//!
//! [`Reachability`] is the subsystem instance NPC controllers talk to. It
//! owns the region store, a per-profile cache of reachable-region sets, and
//! the queues that batch chunk rebuilds and cache evictions to once per
//! simulation tick.
//!
//! The cache answers "which regions can this profile reach from here"
//! with a bounded breadth-first expansion over region adjacency, memoized
//! per (profile, source region). Entries go stale when any contributing
//! region's chunk — or a neighbor's chunk — is rebuilt after the entry was
//! cached, except within a short hysteresis window that keeps hot entries
//! from thrashing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::debug::{snapshot_chunk, RegionObserver};
use crate::grid::{ChunkCoord, GridId, NavGrid, Tile};
use crate::profile::TraversalProfile;
use crate::regions::{Region, RegionId, RegionStore};

/// Tuning knobs for the reachability layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityConfig {
    /// Minimum age (in ticks) below which a cache entry is served without a
    /// staleness check. Keeps a busy chunk from invalidating the same entry
    /// every tick.
    pub min_cache_ticks: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        // One second at the simulation's 30 Hz tick rate.
        Self { min_cache_ticks: 30 }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    cached_at: u64,
    regions: HashSet<RegionId>,
}

enum CacheStatus {
    Hit(HashSet<RegionId>),
    Stale,
    Miss,
}

/// The reachability subsystem: region store + cache + per-tick queues.
///
/// All state lives here; callers construct one instance and pass it by
/// `&mut` from the single simulation thread.
pub struct Reachability {
    store: RegionStore,
    config: ReachabilityConfig,
    /// Cached reachable sets, grouped by profile. An association list rather
    /// than a map: a lookup scans for any *compatible* profile (equal access
    /// and mask, wider vision), which a hash lookup cannot express.
    cache: Vec<(TraversalProfile, HashMap<RegionId, CacheEntry>)>,
    queued_rebuilds: BTreeSet<(GridId, ChunkCoord)>,
    queued_evictions: Vec<Region>,
    observer: Option<Box<dyn RegionObserver>>,
}

impl Reachability {
    pub fn new(config: ReachabilityConfig) -> Self {
        Self {
            store: RegionStore::new(),
            config,
            cache: Vec::new(),
            queued_rebuilds: BTreeSet::new(),
            queued_evictions: Vec::new(),
            observer: None,
        }
    }

    pub fn with_observer(config: ReachabilityConfig, observer: Box<dyn RegionObserver>) -> Self {
        let mut this = Self::new(config);
        this.observer = Some(observer);
        this
    }

    /// Read access to the region graph, for tests and tooling.
    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    // ── Per-tick maintenance ────────────────────────────────────────────

    /// Queue a chunk for regeneration on the next [`update`](Self::update).
    /// Called with the dirty list from [`NavGrid::process_updates`]; queueing
    /// the same chunk repeatedly within a tick rebuilds it once.
    pub fn notify_chunk_changed(&mut self, grid: GridId, chunk: ChunkCoord) {
        self.queued_rebuilds.insert((grid, chunk));
    }

    /// Once-per-tick batch: rebuild queued chunks, then flush the cache
    /// evictions those rebuilds produced.
    pub fn update(&mut self, grid: &NavGrid, now: u64) {
        let queued: Vec<(GridId, ChunkCoord)> = std::mem::take(&mut self.queued_rebuilds)
            .into_iter()
            .collect();
        let mut rebuilt = 0usize;
        for (grid_id, coord) in queued {
            // Grid removed while the rebuild was queued: skip silently, the
            // teardown path already dropped its regions.
            let Some(chunk) = grid.chunk(grid_id, coord) else {
                continue;
            };
            let rebuild = self.store.rebuild_chunk(chunk);
            self.queued_evictions.extend(rebuild.deleted);
            rebuilt += 1;

            if self.observer.is_some() {
                let snapshot = snapshot_chunk(&self.store, grid_id, coord);
                if let Some(observer) = self.observer.as_deref_mut() {
                    observer.regions_rebuilt(grid_id, snapshot);
                }
            }
        }

        let evictions = std::mem::take(&mut self.queued_evictions);
        for region in &evictions {
            self.evict(region);
        }

        if rebuilt > 0 {
            log::debug!(
                "tick {}: rebuilt {} chunks, {} cache evictions",
                now,
                rebuilt,
                evictions.len(),
            );
        }
    }

    /// A grid was removed: drop its regions and scrub them from the cache.
    /// Queued rebuilds for it become harmless no-ops.
    pub fn on_grid_removed(&mut self, grid: GridId) {
        self.queued_rebuilds.retain(|(g, _)| *g != grid);
        let deleted = self.store.remove_grid(grid);
        log::debug!("grid {:?} removed, {} regions dropped", grid, deleted.len());
        for region in &deleted {
            self.evict(region);
        }
    }

    /// Full wipe (round restart).
    pub fn reset(&mut self) {
        self.store.reset();
        self.cache.clear();
        self.queued_rebuilds.clear();
        self.queued_evictions.clear();
    }

    /// Remove a deleted region from every entry's key space and result set.
    /// Entries that merely lose a member stay valid for the remaining ones.
    fn evict(&mut self, region: &Region) {
        debug_assert!(region.deleted);
        for (_, entries) in &mut self.cache {
            entries.remove(&region.id);
            for entry in entries.values_mut() {
                entry.regions.remove(&region.id);
            }
        }
        log::trace!("region {:?} evicted from reachability cache", region.id);
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Resolve a tile to its current region. `None` for untracked tiles
    /// (space, pending chunks) — never an error.
    pub fn region_of(&self, grid: GridId, tile: Tile) -> Option<RegionId> {
        self.store.region_at(grid, tile)
    }

    /// Can an agent with `profile` standing on `agent_tile` get to
    /// `target_tile`? `range > 0` lets a blocked target (a wall, a machine)
    /// stand in for any traversable node within that octile distance of it.
    ///
    /// The region search runs target→agent: targets are statistically more
    /// likely to sit inside access-locked areas, so expanding from them
    /// prunes faster.
    pub fn can_reach(
        &mut self,
        grid: &NavGrid,
        profile: &TraversalProfile,
        grid_id: GridId,
        agent_tile: Tile,
        target_grid: GridId,
        target_tile: Tile,
        range: f32,
        now: u64,
    ) -> bool {
        if grid_id != target_grid {
            return false;
        }
        let Some(agent_region) = self.store.region_at(grid_id, agent_tile) else {
            return false;
        };

        let target_traversable = grid
            .node(grid_id, target_tile)
            .is_some_and(|n| n.traversable_by(profile));

        let candidates: Vec<RegionId> = if target_traversable {
            self.store.region_at(grid_id, target_tile).into_iter().collect()
        } else if range > 0.0 {
            // Fall back to any traversable node near the target, deduped by
            // region.
            let mut seen = HashSet::new();
            grid.nodes_in_range(grid_id, profile, target_tile, range)
                .into_iter()
                .filter_map(|tile| self.store.region_at(grid_id, tile))
                .filter(|id| seen.insert(*id))
                .collect()
        } else {
            return false;
        };

        for target_region in candidates {
            // Same region: trivially reachable, no cache involved.
            if target_region == agent_region {
                return true;
            }
            if self
                .reachable_regions(grid, profile, target_region, now)
                .contains(&agent_region)
            {
                return true;
            }
        }
        false
    }

    /// The reachable-region set for `profile` expanding from `source`,
    /// served from cache when a valid compatible entry exists. An absent or
    /// stale `source` yields an empty set.
    pub fn reachable_regions(
        &mut self,
        grid: &NavGrid,
        profile: &TraversalProfile,
        source: RegionId,
        now: u64,
    ) -> HashSet<RegionId> {
        let slot = self
            .cache
            .iter()
            .position(|(cached, _)| profile.can_reuse_cached(cached));

        if let Some(idx) = slot {
            let status = match self.cache[idx].1.get(&source) {
                None => CacheStatus::Miss,
                Some(entry) => {
                    if now.saturating_sub(entry.cached_at) < self.config.min_cache_ticks {
                        CacheStatus::Hit(entry.regions.clone())
                    } else if Self::entry_stale(&self.store, grid, entry) {
                        CacheStatus::Stale
                    } else {
                        CacheStatus::Hit(entry.regions.clone())
                    }
                }
            };
            match status {
                CacheStatus::Hit(regions) => {
                    log::trace!("reachability cache hit for region {:?}", source);
                    if let Some(observer) = self.observer.as_deref_mut() {
                        observer.cache_consulted(source, &regions, true);
                    }
                    return regions;
                }
                CacheStatus::Stale => {
                    log::trace!("reachability cache stale for region {:?}", source);
                    self.cache[idx].1.remove(&source);
                }
                CacheStatus::Miss => {}
            }
        }

        // Compute with the compatible slot's (wider) vision so narrower
        // profiles keep sharing the entry.
        let vision = slot
            .map(|idx| self.cache[idx].0.vision_radius)
            .unwrap_or(profile.vision_radius);
        let result = Self::expand(&self.store, profile, vision, source);

        let idx = match slot {
            Some(idx) => idx,
            None => {
                self.cache.push((profile.clone(), HashMap::new()));
                self.cache.len() - 1
            }
        };
        self.cache[idx].1.insert(
            source,
            CacheEntry {
                cached_at: now,
                regions: result.clone(),
            },
        );
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.cache_consulted(source, &result, false);
        }
        result
    }

    /// Bounded breadth-first expansion over region adjacency. Neighbors the
    /// profile cannot enter, or whose representative lies beyond
    /// `vision + 1` of the source, are marked visited but not admitted — the
    /// search never proceeds through them.
    fn expand(
        store: &RegionStore,
        profile: &TraversalProfile,
        vision: f32,
        source: RegionId,
    ) -> HashSet<RegionId> {
        let Some(source_region) = store.get(source) else {
            return HashSet::new();
        };

        let mut open = VecDeque::new();
        let mut visited = HashSet::new();
        let mut reachable = HashSet::new();
        open.push_back(source);
        visited.insert(source);
        reachable.insert(source);

        while let Some(id) = open.pop_front() {
            let Some(region) = store.get(id) else {
                continue;
            };
            for &neighbor_id in &region.neighbors {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                // Stale edge to a deleted region: visited, never admitted.
                let Some(neighbor) = store.get(neighbor_id) else {
                    continue;
                };
                if !neighbor.traversable_by(profile)
                    || neighbor.distance_to(source_region) > vision + 1.0
                {
                    continue;
                }
                reachable.insert(neighbor_id);
                open.push_back(neighbor_id);
            }
        }

        reachable
    }

    /// An entry is stale when any region in its result set — or any current
    /// neighbor of one — sits in a chunk rebuilt after the entry was cached.
    fn entry_stale(store: &RegionStore, grid: &NavGrid, entry: &CacheEntry) -> bool {
        let mut checked: HashSet<RegionId> = HashSet::new();
        for &id in &entry.regions {
            if !checked.insert(id) {
                continue;
            }
            let Some(region) = store.get(id) else {
                // Result references a region that no longer resolves
                // (grid torn down between ticks): recompute.
                return true;
            };
            if Self::chunk_newer_than(grid, region, entry.cached_at) {
                return true;
            }
            for &neighbor_id in &region.neighbors {
                if !checked.insert(neighbor_id) {
                    continue;
                }
                if let Some(neighbor) = store.get(neighbor_id) {
                    if Self::chunk_newer_than(grid, neighbor, entry.cached_at) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn chunk_newer_than(grid: &NavGrid, region: &Region, cached_at: u64) -> bool {
        grid.chunk(region.grid, region.chunk)
            .is_none_or(|chunk| chunk.last_update > cached_at)
    }
}
