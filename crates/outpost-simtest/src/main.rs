//! Outpost Headless Reachability Harness
//!
//! Validates the region graph and reachability cache without the engine.
//! Runs entirely in-process — no ECS, no networking, no rendering.
//!
//! Usage:
//!   cargo run -p outpost-simtest
//!   cargo run -p outpost-simtest -- --verbose
//!   cargo run -p outpost-simtest -- --dump-json

use outpost_nav::debug::{ChunkRegionsSnapshot, RegionObserver};
use outpost_nav::grid::{EntityRef, GridId, NavGrid, Tile, TileKind};
use outpost_nav::profile::{access_tags, collision, TraversalProfile};
use outpost_nav::reachability::{Reachability, ReachabilityConfig};
use outpost_nav::regions::RegionId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashSet};
use std::cell::RefCell;
use std::rc::Rc;

const STATION: GridId = GridId(1);
const SHUTTLE: GridId = GridId(7);

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: String) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail,
    }
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let dump_json = std::env::args().any(|a| a == "--dump-json");
    println!("=== Outpost Reachability Harness ===\n");

    let mut results = Vec::new();

    // 1. Region generation on a synthetic station
    results.extend(validate_region_generation(verbose));

    // 2. Access-controlled reachability
    results.extend(validate_access_control(verbose));

    // 3. Query façade edge cases
    results.extend(validate_query_facade(verbose));

    // 4. Mutation → rebuild → invalidation cycle
    results.extend(validate_invalidation_cycle(verbose));

    // 5. Randomized soak: cached vs fresh agreement
    results.extend(validate_cache_soak(verbose));

    // 6. Optional geometry dump for visualization tooling
    if dump_json {
        dump_geometry();
    }

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Station construction ────────────────────────────────────────────────

fn civilian() -> TraversalProfile {
    TraversalProfile::new(64.0, collision::MOB_IMPASSABLE)
}

fn floor_rect(grid: &mut NavGrid, g: GridId, x0: i32, y0: i32, x1: i32, y1: i32) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            grid.queue_tile_update(g, Tile::new(x, y), TileKind::Floor);
        }
    }
}

fn add_door(grid: &mut NavGrid, entity: u64, tile: Tile, tag: outpost_nav::profile::AccessTag) {
    let mut tags = BTreeSet::new();
    tags.insert(tag);
    grid.queue_access_add(STATION, EntityRef(entity), tile, tags);
}

fn sync(grid: &mut NavGrid, reach: &mut Reachability, now: u64) {
    for (g, coord) in grid.process_updates(now) {
        reach.notify_chunk_changed(g, coord);
    }
    reach.update(grid, now);
}

/// The standard harness station: a corridor spine across three chunks, a
/// medbay and an engineering bay behind doors, an open cargo bay, and a
/// detached shuttle grid.
fn build_station(config: ReachabilityConfig) -> (NavGrid, Reachability) {
    let mut grid = NavGrid::new();
    let mut reach = Reachability::new(config);
    populate_station(&mut grid);
    sync(&mut grid, &mut reach, 1);
    (grid, reach)
}

fn populate_station(grid: &mut NavGrid) {
    floor_rect(grid, STATION, 0, 0, 23, 1);

    // Medbay (chunk 0) behind a medical door.
    floor_rect(grid, STATION, 2, 3, 5, 6);
    grid.queue_tile_update(STATION, Tile::new(3, 2), TileKind::Floor);
    add_door(grid, 100, Tile::new(3, 2), access_tags::MEDICAL);

    // Open cargo bay (chunk 1).
    floor_rect(grid, STATION, 10, 3, 13, 6);
    grid.queue_tile_update(STATION, Tile::new(11, 2), TileKind::Floor);

    // Engineering (chunk 2) behind a door, plus an anchored generator.
    floor_rect(grid, STATION, 18, 3, 21, 6);
    grid.queue_tile_update(STATION, Tile::new(19, 2), TileKind::Floor);
    add_door(grid, 101, Tile::new(19, 2), access_tags::ENGINEERING);
    grid.queue_blocker_add(
        STATION,
        EntityRef(102),
        Tile::new(21, 6),
        collision::IMPASSABLE,
    );

    // Detached shuttle.
    floor_rect(grid, SHUTTLE, 0, 0, 3, 1);
}

// ── 1. Region generation ────────────────────────────────────────────────

fn validate_region_generation(verbose: bool) -> Vec<TestResult> {
    println!("--- Region Generation ---");
    let mut results = Vec::new();
    let (grid, reach) = build_station(ReachabilityConfig::default());

    let total_regions = reach.store().len();
    results.push(check(
        "regions_generated",
        total_regions > 0,
        format!("{} regions across station + shuttle", total_regions),
    ));

    // Partition: every walkable node in exactly one region.
    let mut walkable = 0usize;
    let mut violations = 0usize;
    for g in [STATION, SHUTTLE] {
        for chunk in grid.chunks_of(g) {
            for node in chunk.nodes() {
                let is_walkable =
                    !node.is_empty() && node.blocked_mask() & collision::TRACKED == 0;
                let owners = reach
                    .store()
                    .regions_in_chunk(g, chunk.origin())
                    .filter(|r| r.tiles.contains(&node.tile()))
                    .count();
                if is_walkable {
                    walkable += 1;
                }
                if owners != usize::from(is_walkable) {
                    violations += 1;
                }
            }
        }
    }
    results.push(check(
        "partition_invariant",
        violations == 0,
        format!("{} walkable nodes, {} ownership violations", walkable, violations),
    ));

    // Doors are singletons; regions never span chunks; edges symmetric.
    let mut door_violations = 0usize;
    let mut span_violations = 0usize;
    let mut edge_violations = 0usize;
    for g in [STATION, SHUTTLE] {
        for chunk in grid.chunks_of(g) {
            for region in reach.store().regions_in_chunk(g, chunk.origin()) {
                if region.is_door && region.tiles.len() != 1 {
                    door_violations += 1;
                }
                if region.tiles.iter().any(|t| t.chunk() != chunk.origin()) {
                    span_violations += 1;
                }
                for &n in &region.neighbors {
                    if let Some(neighbor) = reach.store().get(n) {
                        if !neighbor.neighbors.contains(&region.id) {
                            edge_violations += 1;
                        }
                    }
                }
            }
        }
    }
    results.push(check(
        "door_singletons",
        door_violations == 0,
        format!("{} oversized door regions", door_violations),
    ));
    results.push(check(
        "no_cross_chunk_regions",
        span_violations == 0,
        format!("{} regions crossing chunk borders", span_violations),
    ));
    results.push(check(
        "adjacency_symmetric",
        edge_violations == 0,
        format!("{} asymmetric edges", edge_violations),
    ));

    if verbose {
        for chunk in grid.chunks_of(STATION) {
            let count = reach
                .store()
                .regions_in_chunk(STATION, chunk.origin())
                .count();
            println!("    chunk {:?}: {} regions", chunk.origin(), count);
        }
    }
    results
}

// ── 2. Access control ───────────────────────────────────────────────────

fn validate_access_control(_verbose: bool) -> Vec<TestResult> {
    println!("--- Access Control ---");
    let mut results = Vec::new();
    let (grid, mut reach) = build_station(ReachabilityConfig::default());

    let corridor = Tile::new(0, 0);
    let medbay = Tile::new(4, 4);
    let cargo = Tile::new(12, 4);
    let engineering = Tile::new(19, 4);

    let civ = civilian();
    let medic = civilian().with_access(access_tags::MEDICAL);
    let engineer = civilian().with_access(access_tags::ENGINEERING);

    let cases = [
        ("civilian_reaches_cargo", &civ, cargo, true),
        ("civilian_blocked_from_medbay", &civ, medbay, false),
        ("civilian_blocked_from_engineering", &civ, engineering, false),
        ("medic_reaches_medbay", &medic, medbay, true),
        ("medic_blocked_from_engineering", &medic, engineering, false),
        ("engineer_reaches_engineering", &engineer, engineering, true),
        ("engineer_blocked_from_medbay", &engineer, medbay, false),
    ];

    for (name, profile, target, expected) in cases {
        let got = reach.can_reach(&grid, profile, STATION, corridor, STATION, target, 0.0, 2);
        results.push(check(
            name,
            got == expected,
            format!("expected {}, got {}", expected, got),
        ));
    }
    results
}

// ── 3. Query façade ─────────────────────────────────────────────────────

fn validate_query_facade(_verbose: bool) -> Vec<TestResult> {
    println!("--- Query Façade ---");
    let mut results = Vec::new();
    let (grid, mut reach) = build_station(ReachabilityConfig::default());

    // Cross-grid: never reachable.
    let cross = reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        SHUTTLE,
        Tile::new(0, 0),
        0.0,
        2,
    );
    results.push(check(
        "cross_grid_unreachable",
        !cross,
        format!("station→shuttle gave {}", cross),
    ));

    // Space tile: no region, unreachable, no error.
    let space = reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        STATION,
        Tile::new(0, 7),
        0.0,
        2,
    );
    results.push(check(
        "space_unreachable",
        !space,
        format!("corridor→space gave {}", space),
    ));

    // Blocked target with range: the generator in engineering.
    let engineer = civilian().with_access(access_tags::ENGINEERING);
    let generator = Tile::new(21, 6);
    let no_range = reach.can_reach(
        &grid,
        &engineer,
        STATION,
        Tile::new(0, 0),
        STATION,
        generator,
        0.0,
        2,
    );
    let with_range = reach.can_reach(
        &grid,
        &engineer,
        STATION,
        Tile::new(0, 0),
        STATION,
        generator,
        1.5,
        2,
    );
    results.push(check(
        "blocked_target_needs_range",
        !no_range && with_range,
        format!("range 0 gave {}, range 1.5 gave {}", no_range, with_range),
    ));

    // Same-region short-circuit: cache must not be consulted.
    let counter = Rc::new(RefCell::new((0usize, 0usize)));
    struct Counter(Rc<RefCell<(usize, usize)>>);
    impl RegionObserver for Counter {
        fn regions_rebuilt(&mut self, _grid: GridId, _snapshot: ChunkRegionsSnapshot) {}
        fn cache_consulted(&mut self, _s: RegionId, _r: &HashSet<RegionId>, cached: bool) {
            let mut c = self.0.borrow_mut();
            if cached {
                c.0 += 1;
            } else {
                c.1 += 1;
            }
        }
    }
    let mut grid2 = NavGrid::new();
    let mut observed = Reachability::with_observer(
        ReachabilityConfig::default(),
        Box::new(Counter(counter.clone())),
    );
    populate_station(&mut grid2);
    sync(&mut grid2, &mut observed, 1);
    let same = observed.can_reach(
        &grid2,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        STATION,
        Tile::new(23, 1),
        0.0,
        2,
    );
    let consults = {
        let c = counter.borrow();
        c.0 + c.1
    };
    results.push(check(
        "same_region_short_circuit",
        same && consults == 0,
        format!("reached={}, cache consults={}", same, consults),
    ));
    results
}

// ── 4. Mutation & invalidation ──────────────────────────────────────────

fn validate_invalidation_cycle(_verbose: bool) -> Vec<TestResult> {
    println!("--- Mutation & Invalidation ---");
    let mut results = Vec::new();
    // Zero hysteresis so staleness is observable immediately.
    let (mut grid, mut reach) = build_station(ReachabilityConfig { min_cache_ticks: 0 });

    let before = reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        STATION,
        Tile::new(23, 1),
        0.0,
        2,
    );

    // Breach the corridor between chunk 0 and chunk 1.
    for x in 6..=9 {
        for y in 0..=1 {
            grid.queue_tile_update(STATION, Tile::new(x, y), TileKind::Space);
        }
    }
    sync(&mut grid, &mut reach, 10);

    let after = reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        STATION,
        Tile::new(23, 1),
        0.0,
        11,
    );
    results.push(check(
        "breach_invalidates_cache",
        before && !after,
        format!("before={}, after={}", before, after),
    ));

    // Repair the deck and verify reachability returns.
    for x in 6..=9 {
        for y in 0..=1 {
            grid.queue_tile_update(STATION, Tile::new(x, y), TileKind::Floor);
        }
    }
    sync(&mut grid, &mut reach, 20);
    let repaired = reach.can_reach(
        &grid,
        &civilian(),
        STATION,
        Tile::new(0, 0),
        STATION,
        Tile::new(23, 1),
        0.0,
        21,
    );
    results.push(check(
        "repair_restores_reachability",
        repaired,
        format!("after repair got {}", repaired),
    ));

    // Tear down the shuttle grid entirely.
    grid.remove_grid(SHUTTLE);
    reach.on_grid_removed(SHUTTLE);
    reach.update(&grid, 30);
    let shuttle_gone = reach.region_of(SHUTTLE, Tile::new(0, 0)).is_none();
    results.push(check(
        "grid_teardown_drops_regions",
        shuttle_gone,
        format!("shuttle region lookup empty: {}", shuttle_gone),
    ));
    results
}

// ── 5. Randomized soak ──────────────────────────────────────────────────

/// Random mutation storm: after every batch, cached answers must match a
/// freshly built instance over the same grid.
fn validate_cache_soak(verbose: bool) -> Vec<TestResult> {
    println!("--- Cache Soak (randomized) ---");
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    let (mut grid, mut warm) = build_station(ReachabilityConfig::default());
    let probes = [
        Tile::new(0, 0),
        Tile::new(12, 4),
        Tile::new(4, 4),
        Tile::new(19, 4),
        Tile::new(23, 0),
    ];
    let profiles = [
        civilian(),
        civilian().with_access(access_tags::MEDICAL),
        civilian().with_access(access_tags::ENGINEERING),
    ];

    let mut now = 100u64;
    let mut mismatches = 0usize;
    let mut queries = 0usize;
    let mut wall_entity = 10_000u64;

    for round in 0..20 {
        // Mutate: a few random walls toggle, occasionally a breach or repair.
        for _ in 0..4 {
            let x = rng.gen_range(0..24);
            let y = rng.gen_range(0..2);
            if rng.gen_bool(0.5) {
                wall_entity += 1;
                grid.queue_blocker_add(
                    STATION,
                    EntityRef(wall_entity),
                    Tile::new(x, y),
                    collision::IMPASSABLE,
                );
            } else {
                let kind = if rng.gen_bool(0.8) {
                    TileKind::Floor
                } else {
                    TileKind::Space
                };
                grid.queue_tile_update(STATION, Tile::new(x, y), kind);
            }
        }
        now += 1;
        sync(&mut grid, &mut warm, now);

        // Skip past the hysteresis window so stale entries must be detected.
        now += ReachabilityConfig::default().min_cache_ticks + 1;

        // Fresh instance over the same grid state.
        let mut fresh = Reachability::new(ReachabilityConfig { min_cache_ticks: 0 });
        for chunk in grid.chunks_of(STATION) {
            fresh.notify_chunk_changed(STATION, chunk.origin());
        }
        fresh.update(&grid, now);

        for profile in &profiles {
            for &a in &probes {
                for &b in &probes {
                    queries += 1;
                    let w = warm.can_reach(&grid, profile, STATION, a, STATION, b, 0.0, now);
                    let f = fresh.can_reach(&grid, profile, STATION, a, STATION, b, 0.0, now);
                    if w != f {
                        mismatches += 1;
                        if verbose {
                            println!(
                                "    round {}: {:?}→{:?} warm={} fresh={}",
                                round, a, b, w, f
                            );
                        }
                    }
                }
            }
        }
    }

    results.push(check(
        "cached_matches_fresh",
        mismatches == 0,
        format!("{} queries, {} mismatches", queries, mismatches),
    ));
    results
}

// ── 6. Geometry dump ────────────────────────────────────────────────────

/// Collects rebuild snapshots and prints them as JSON for visualization
/// tooling.
struct SnapshotCollector(Rc<RefCell<Vec<ChunkRegionsSnapshot>>>);

impl RegionObserver for SnapshotCollector {
    fn regions_rebuilt(&mut self, _grid: GridId, snapshot: ChunkRegionsSnapshot) {
        self.0.borrow_mut().push(snapshot);
    }
    fn cache_consulted(&mut self, _s: RegionId, _r: &HashSet<RegionId>, _cached: bool) {}
}

fn dump_geometry() {
    let snapshots = Rc::new(RefCell::new(Vec::new()));
    let mut grid = NavGrid::new();
    let mut reach = Reachability::with_observer(
        ReachabilityConfig::default(),
        Box::new(SnapshotCollector(snapshots.clone())),
    );
    populate_station(&mut grid);
    sync(&mut grid, &mut reach, 1);

    let snapshots = snapshots.borrow();
    match serde_json::to_string_pretty(&*snapshots) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("geometry dump failed: {}", e),
    }
}
