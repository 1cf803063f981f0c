//! Lock-aware navigation gate.
//!
//! Converts [`LockCache`] reads into per-item sidebar affordances and route
//! reachability. Owns no state: every decision is a pure function of the
//! cache, the static tree, and whether the viewer is an administrator.
//!
//! Precedence: if the cache holds any entries, its values replace the
//! tree's static `locked` defaults for every item; otherwise the static
//! defaults apply. There is no per-item mixing of the two sources.

use serde::Serialize;

use crate::locks::LockCache;
use crate::navigation::{ancestry_for_path, ContentItem};

/// How a sidebar entry should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    /// Normal interactive entry.
    Open,
    /// Locked and inert for this viewer.
    Locked,
    /// Locked for students, but the viewer is an admin and may enter.
    LockedAdminAccess,
}

/// Gate outcome for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub effective_locked: bool,
    /// Clickable, expandable, and children rendered.
    pub interactive: bool,
    pub affordance: Affordance,
}

impl GateDecision {
    pub fn is_inert(&self) -> bool {
        !self.interactive
    }
}

/// Decide the affordance for one item from its raw inputs.
pub fn decide(
    has_server_data: bool,
    backend_locked: bool,
    static_locked: bool,
    is_admin: bool,
) -> GateDecision {
    let effective_locked = if has_server_data {
        backend_locked
    } else {
        static_locked
    };

    let (interactive, affordance) = match (effective_locked, is_admin) {
        (false, _) => (true, Affordance::Open),
        (true, true) => (true, Affordance::LockedAdminAccess),
        (true, false) => (false, Affordance::Locked),
    };

    GateDecision {
        effective_locked,
        interactive,
        affordance,
    }
}

/// Decide the affordance for a tree item against the current cache.
pub fn decide_item(item: &ContentItem, cache: &LockCache, is_admin: bool) -> GateDecision {
    decide(
        cache.has_server_data(),
        cache.is_item_locked(&item.id),
        item.locked,
        is_admin,
    )
}

/// A tree item with its gate decision and the gated subtree the viewer may
/// see. `children` is empty whenever the item is inert.
#[derive(Debug, Clone, Serialize)]
pub struct GatedItem<'a> {
    pub item: &'a ContentItem,
    pub decision: GateDecision,
    pub children: Vec<GatedItem<'a>>,
}

impl GatedItem<'_> {
    /// Dividers are rendered but never navigable.
    pub fn is_navigable(&self) -> bool {
        self.decision.interactive && !self.item.is_divider
    }
}

/// Gate an entire navigation tree for one viewer.
///
/// Admin-only items are omitted for non-admins.
pub fn gate_tree<'a>(
    tree: &'a [ContentItem],
    cache: &LockCache,
    is_admin: bool,
) -> Vec<GatedItem<'a>> {
    tree.iter()
        .filter(|item| is_admin || !item.admin_only)
        .map(|item| {
            let decision = decide_item(item, cache, is_admin);
            let children = if decision.interactive {
                gate_tree(&item.children, cache, is_admin)
            } else {
                Vec::new()
            };
            GatedItem {
                item,
                decision,
                children,
            }
        })
        .collect()
}

/// Whether the viewer may open the page at `path`.
///
/// Every item on the ancestry chain must be visible to the viewer and not
/// inert. Unknown paths are unreachable.
pub fn is_route_reachable(
    tree: &[ContentItem],
    cache: &LockCache,
    path: &str,
    is_admin: bool,
) -> bool {
    let Some(chain) = ancestry_for_path(tree, path) else {
        return false;
    };

    chain.iter().all(|item| {
        (is_admin || !item.admin_only) && decide_item(item, cache, is_admin).interactive
    })
}
