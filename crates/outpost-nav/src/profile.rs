//! Agent traversal profiles — collision layers and access tags as plain data.
//!
//! An agent's ability to pass a node is fully described by a
//! [`TraversalProfile`]: which collision layers block it, which access tags
//! it carries, and how far it can "see" for reachability purposes. The
//! profile is computed once per agent by the caller and passed by reference;
//! the region layer never inspects game entities.
//!
//! Profiles double as reachability-cache keys. Two profiles can share a
//! cached result when access and collision mask are identical and the cached
//! profile's vision radius covers the requested one — see
//! [`TraversalProfile::can_reuse_cached`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Collision layers tracked by the navigation graph.
pub mod collision {
    /// Blocks everything (walls, hull).
    pub const IMPASSABLE: u32 = 1 << 0;
    /// Blocks mobs but not thrown items (glass shields, railings).
    pub const MOB_IMPASSABLE: u32 = 1 << 1;
    /// Blocks small creatures (mousetraps, floor vents).
    pub const SMALL_IMPASSABLE: u32 = 1 << 2;
    /// Blocks anything that cannot vault (tables, crates).
    pub const VAULT_IMPASSABLE: u32 = 1 << 3;

    /// Union of all layers the graph records at all. Obstacles outside these
    /// layers never enter the graph.
    pub const TRACKED: u32 =
        IMPASSABLE | MOB_IMPASSABLE | SMALL_IMPASSABLE | VAULT_IMPASSABLE;
}

/// An access-control tag (keycard permission).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AccessTag(pub u16);

/// Well-known access tags. Station content defines more; the region layer
/// only ever compares tags for equality.
pub mod access_tags {
    use super::AccessTag;

    pub const COMMAND: AccessTag = AccessTag(0);
    pub const SECURITY: AccessTag = AccessTag(1);
    pub const ENGINEERING: AccessTag = AccessTag(2);
    pub const MEDICAL: AccessTag = AccessTag(3);
    pub const SCIENCE: AccessTag = AccessTag(4);
    pub const CARGO: AccessTag = AccessTag(5);
    pub const MAINTENANCE: AccessTag = AccessTag(6);
    pub const EXTERNAL: AccessTag = AccessTag(7);
}

/// Everything the reachability layer needs to know about an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalProfile {
    /// How far (in tiles, straight-line) the agent considers regions at all.
    pub vision_radius: f32,
    /// Access tags the agent holds.
    pub access: BTreeSet<AccessTag>,
    /// Collision layers that block this agent.
    pub collision_mask: u32,
}

impl TraversalProfile {
    /// A profile with no access tags.
    pub fn new(vision_radius: f32, collision_mask: u32) -> Self {
        Self {
            vision_radius,
            access: BTreeSet::new(),
            collision_mask,
        }
    }

    /// Builder-style: add one access tag.
    pub fn with_access(mut self, tag: AccessTag) -> Self {
        self.access.insert(tag);
        self
    }

    /// Whether the agent holds every tag in `requirements`.
    pub fn satisfies(&self, requirements: &BTreeSet<AccessTag>) -> bool {
        requirements.iter().all(|tag| self.access.contains(tag))
    }

    /// Whether a result cached for `cached` may serve this profile.
    ///
    /// Access and collision mask must match exactly. The cached vision radius
    /// must be at least ours: a wider expansion only over-covers, and the
    /// extra regions were all admitted under the same access rules.
    pub fn can_reuse_cached(&self, cached: &TraversalProfile) -> bool {
        self.access == cached.access
            && self.collision_mask == cached.collision_mask
            && cached.vision_radius >= self.vision_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(vision: f32) -> TraversalProfile {
        TraversalProfile::new(vision, collision::MOB_IMPASSABLE)
    }

    #[test]
    fn satisfies_empty_requirements() {
        let p = profile(8.0);
        assert!(p.satisfies(&BTreeSet::new()));
    }

    #[test]
    fn satisfies_requires_every_tag() {
        let p = profile(8.0)
            .with_access(access_tags::ENGINEERING)
            .with_access(access_tags::MAINTENANCE);
        let mut req = BTreeSet::new();
        req.insert(access_tags::ENGINEERING);
        assert!(p.satisfies(&req));

        req.insert(access_tags::SECURITY);
        assert!(!p.satisfies(&req));
    }

    #[test]
    fn reuse_requires_equal_access_and_mask() {
        let a = profile(8.0);
        let b = profile(8.0).with_access(access_tags::CARGO);
        assert!(!a.can_reuse_cached(&b));
        assert!(!b.can_reuse_cached(&a));

        let mut c = profile(8.0);
        c.collision_mask = collision::IMPASSABLE;
        assert!(!a.can_reuse_cached(&c));
    }

    #[test]
    fn reuse_only_from_wider_vision() {
        let narrow = profile(4.0);
        let wide = profile(12.0);
        assert!(narrow.can_reuse_cached(&wide));
        assert!(!wide.can_reuse_cached(&narrow));
        assert!(narrow.can_reuse_cached(&narrow));
    }
}
