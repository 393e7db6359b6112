//! AI reachability for Outpost.
//!
//! This crate contains the navigation-graph and region logic that lets NPC
//! controllers cheaply answer "can I get there from here" without running a
//! full pathfind. It is independent of any engine or ECS: functions take
//! plain data and return results, making them unit-testable and portable
//! across the game server, native tools, and the headless simtest harness.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`grid`] | Chunked tile graph with queued, per-tick batched mutations |
//! | [`profile`] | Traversal profiles: collision layers, access tags, vision |
//! | [`regions`] | Region builder and region graph (per-chunk partitions) |
//! | [`reachability`] | Reachable-region cache and the `can_reach` façade |
//! | [`debug`] | Optional observer hooks and geometry snapshots for tooling |
//!
//! # How it fits together
//!
//! Game-rule systems queue grid mutations on [`grid::NavGrid`]; once per tick
//! the simulation applies them, feeds the dirtied chunks to
//! [`reachability::Reachability::notify_chunk_changed`], and calls
//! [`reachability::Reachability::update`]. Queries go through
//! [`reachability::Reachability::can_reach`] with the agent's
//! [`profile::TraversalProfile`].

pub mod debug;
pub mod grid;
pub mod profile;
pub mod reachability;
pub mod regions;
