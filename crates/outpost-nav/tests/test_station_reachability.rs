//! Integration tests for the full reachability pipeline.
//!
//! Exercises: grid mutations → batched updates → chunk region rebuild →
//! adjacency → cache → `can_reach`, on a synthetic three-chunk station with
//! access-locked rooms and a separate shuttle grid.
//!
//! All tests are pure logic — no engine, no rendering.

use outpost_nav::grid::{EntityRef, GridId, NavGrid, Tile, TileKind};
use outpost_nav::profile::{access_tags, collision, TraversalProfile};
use outpost_nav::reachability::{Reachability, ReachabilityConfig};
use std::collections::BTreeSet;

const STATION: GridId = GridId(1);
const SHUTTLE: GridId = GridId(2);

// ── Helpers ────────────────────────────────────────────────────────────

fn civilian() -> TraversalProfile {
    TraversalProfile::new(64.0, collision::MOB_IMPASSABLE)
}

fn medic() -> TraversalProfile {
    civilian().with_access(access_tags::MEDICAL)
}

fn engineer() -> TraversalProfile {
    civilian().with_access(access_tags::ENGINEERING)
}

fn floor_rect(grid: &mut NavGrid, g: GridId, x0: i32, y0: i32, x1: i32, y1: i32) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            grid.queue_tile_update(g, Tile::new(x, y), TileKind::Floor);
        }
    }
}

fn sync(grid: &mut NavGrid, reach: &mut Reachability, now: u64) {
    for (g, coord) in grid.process_updates(now) {
        reach.notify_chunk_changed(g, coord);
    }
    reach.update(grid, now);
}

/// Three-chunk station:
///
/// ```text
/// y=4  ..MMMM....BBBB....EEEE..      M medbay   (door, MEDICAL)
/// y=3  ..MMMM....BBBB....EEEE..      B open bay (plain doorway)
/// y=2  ..MMMM....BBBB....EEEE..      E engineering (door, ENGINEERING)
/// y=1  ...d.......o.......d....      d door, o open floor
/// y=0  CCCCCCCCCCCCCCCCCCCCCCCC      C corridor, x = 0..23
/// ```
///
/// Plus a detached 4-tile shuttle on its own grid.
fn build_station() -> (NavGrid, Reachability) {
    let mut grid = NavGrid::new();
    let mut reach = Reachability::new(ReachabilityConfig { min_cache_ticks: 5 });

    // Corridor spine.
    floor_rect(&mut grid, STATION, 0, 0, 23, 0);

    // Medbay behind a medical door.
    floor_rect(&mut grid, STATION, 2, 2, 5, 4);
    grid.queue_tile_update(STATION, Tile::new(3, 1), TileKind::Floor);
    let mut tags = BTreeSet::new();
    tags.insert(access_tags::MEDICAL);
    grid.queue_access_add(STATION, EntityRef(100), Tile::new(3, 1), tags);

    // Open bay with a plain doorway.
    floor_rect(&mut grid, STATION, 10, 2, 13, 4);
    grid.queue_tile_update(STATION, Tile::new(11, 1), TileKind::Floor);

    // Engineering behind an engineering door, with an anchored machine.
    floor_rect(&mut grid, STATION, 18, 2, 21, 4);
    grid.queue_tile_update(STATION, Tile::new(19, 1), TileKind::Floor);
    let mut tags = BTreeSet::new();
    tags.insert(access_tags::ENGINEERING);
    grid.queue_access_add(STATION, EntityRef(101), Tile::new(19, 1), tags);
    grid.queue_blocker_add(STATION, EntityRef(102), Tile::new(21, 4), collision::IMPASSABLE);

    // Detached shuttle grid.
    floor_rect(&mut grid, SHUTTLE, 0, 0, 3, 0);

    sync(&mut grid, &mut reach, 1);
    (grid, reach)
}

fn reaches(
    reach: &mut Reachability,
    grid: &NavGrid,
    profile: &TraversalProfile,
    from: Tile,
    to: Tile,
    now: u64,
) -> bool {
    reach.can_reach(grid, profile, STATION, from, STATION, to, 0.0, now)
}

// ── Structural invariants ──────────────────────────────────────────────

#[test]
fn every_walkable_node_has_exactly_one_region() {
    let (grid, reach) = build_station();
    for g in [STATION, SHUTTLE] {
        for chunk in grid.chunks_of(g) {
            for node in chunk.nodes() {
                let walkable =
                    !node.is_empty() && node.blocked_mask() & collision::TRACKED == 0;
                let owners = reach
                    .store()
                    .regions_in_chunk(g, chunk.origin())
                    .filter(|r| r.tiles.contains(&node.tile()))
                    .count();
                assert_eq!(owners, usize::from(walkable), "tile {:?}", node.tile());
            }
        }
    }
}

#[test]
fn regions_stay_inside_their_chunk() {
    let (grid, reach) = build_station();
    for chunk in grid.chunks_of(STATION) {
        for region in reach.store().regions_in_chunk(STATION, chunk.origin()) {
            for tile in &region.tiles {
                assert_eq!(tile.chunk(), chunk.origin());
            }
        }
    }
}

#[test]
fn doors_are_isolated_singletons() {
    let (grid, reach) = build_station();
    for chunk in grid.chunks_of(STATION) {
        for region in reach.store().regions_in_chunk(STATION, chunk.origin()) {
            if region.is_door {
                assert_eq!(region.tiles.len(), 1);
            }
        }
    }
    let door = reach.region_of(STATION, Tile::new(3, 1)).unwrap();
    assert!(reach.store().get(door).unwrap().is_door);
}

#[test]
fn neighbor_edges_are_symmetric() {
    let (grid, reach) = build_station();
    for chunk in grid.chunks_of(STATION) {
        for region in reach.store().regions_in_chunk(STATION, chunk.origin()) {
            for &n in &region.neighbors {
                // Stale ids are allowed; live neighbors must point back.
                if let Some(neighbor) = reach.store().get(n) {
                    assert!(
                        neighbor.neighbors.contains(&region.id),
                        "{:?} -> {:?} not symmetric",
                        region.id,
                        n
                    );
                }
            }
        }
    }
}

// ── Queries ────────────────────────────────────────────────────────────

#[test]
fn corridor_spans_chunks() {
    let (grid, mut reach) = build_station();
    assert!(reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(23, 0), 2));
}

#[test]
fn open_bay_is_public() {
    let (grid, mut reach) = build_station();
    assert!(reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(12, 3), 2));
}

#[test]
fn locked_rooms_gate_on_access() {
    let (grid, mut reach) = build_station();
    let medbay = Tile::new(4, 3);
    let engineering = Tile::new(19, 3);

    assert!(!reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), medbay, 2));
    assert!(reaches(&mut reach, &grid, &medic(), Tile::new(0, 0), medbay, 2));
    assert!(!reaches(&mut reach, &grid, &medic(), Tile::new(0, 0), engineering, 2));
    assert!(reaches(&mut reach, &grid, &engineer(), Tile::new(0, 0), engineering, 2));
}

#[test]
fn reachability_is_symmetric_for_open_layouts() {
    let (grid, mut reach) = build_station();
    // Inside medbay looking out: the door search direction is target→agent,
    // and a medic can leave the way they came in.
    assert!(reaches(&mut reach, &grid, &medic(), Tile::new(4, 3), Tile::new(0, 0), 2));
}

#[test]
fn other_grids_are_unreachable() {
    let (grid, mut reach) = build_station();
    assert!(!reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        SHUTTLE,
        Tile::new(0, 0),
        0.0,
        2,
    ));
    // But the shuttle is internally connected.
    assert!(reach.can_reach(
        &grid,
        &civilian(),
        SHUTTLE,
        Tile::new(0, 0),
        SHUTTLE,
        Tile::new(3, 0),
        0.0,
        2,
    ));
}

#[test]
fn anchored_machine_reachable_with_range() {
    let (grid, mut reach) = build_station();
    let machine = Tile::new(21, 4);

    // The machine tile itself is blocked.
    assert!(!reach.can_reach(
        &grid,
        &engineer(),
        STATION,
        Tile::new(0, 0),
        STATION,
        machine,
        0.0,
        2,
    ));
    // With range, an adjacent engineering tile stands in.
    assert!(reach.can_reach(
        &grid,
        &engineer(),
        STATION,
        Tile::new(0, 0),
        STATION,
        machine,
        1.5,
        2,
    ));
    // A civilian cannot reach those stand-ins at all.
    assert!(!reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        STATION,
        machine,
        1.5,
        2,
    ));
}

// ── Mutation cycles ────────────────────────────────────────────────────

#[test]
fn removing_a_door_opens_the_room() {
    let (mut grid, mut reach) = build_station();
    assert!(!reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(4, 3), 2));

    grid.queue_access_remove(STATION, EntityRef(100), Tile::new(3, 1));
    sync(&mut grid, &mut reach, 10);

    assert!(reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(4, 3), 11));
}

#[test]
fn hull_breach_splits_the_corridor() {
    let (mut grid, mut reach) = build_station();
    assert!(reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(23, 0), 2));

    for x in 6..=8 {
        grid.queue_tile_update(STATION, Tile::new(x, 0), TileKind::Space);
    }
    sync(&mut grid, &mut reach, 10);

    assert!(!reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(23, 0), 11));
    // The near side is still intact.
    assert!(reaches(&mut reach, &grid, &civilian(), Tile::new(0, 0), Tile::new(5, 0), 11));
}

// ── Cache coherence ────────────────────────────────────────────────────

#[test]
fn cached_answers_match_fresh_instance() {
    let (grid, mut warm) = build_station();
    let tiles = [
        Tile::new(0, 0),
        Tile::new(12, 3),
        Tile::new(4, 3),
        Tile::new(19, 3),
        Tile::new(23, 0),
        Tile::new(3, 1),
    ];
    for profile in [civilian(), medic(), engineer()] {
        for &a in &tiles {
            for &b in &tiles {
                let first = reaches(&mut warm, &grid, &profile, a, b, 2);
                let second = reaches(&mut warm, &grid, &profile, a, b, 3);

                let mut fresh = Reachability::new(ReachabilityConfig { min_cache_ticks: 0 });
                for chunk in grid.chunks_of(STATION) {
                    fresh.notify_chunk_changed(STATION, chunk.origin());
                }
                fresh.update(&grid, 4);
                let cold = reaches(&mut fresh, &grid, &profile, a, b, 5);

                assert_eq!(first, cold, "{:?}->{:?}", a, b);
                assert_eq!(second, cold, "{:?}->{:?} (cached)", a, b);
            }
        }
    }
}

#[test]
fn rebuilds_are_deterministic() {
    let (grid_a, reach_a) = build_station();
    let (grid_b, reach_b) = build_station();

    assert_eq!(reach_a.store().len(), reach_b.store().len());
    for chunk in grid_a.chunks_of(STATION) {
        let count_a = reach_a
            .store()
            .regions_in_chunk(STATION, chunk.origin())
            .count();
        let count_b = reach_b
            .store()
            .regions_in_chunk(STATION, chunk.origin())
            .count();
        assert_eq!(count_a, count_b, "chunk {:?}", chunk.origin());
    }
    let _ = grid_b;
}
