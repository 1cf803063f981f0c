//! Plain-text rendering of the gated sidebar and lock status.

use std::fmt::Write as _;

use courseport_core::gate::{gate_tree, Affordance, GatedItem};
use courseport_core::locks::{HistoryEntry, LockAction, LockCache};
use courseport_core::navigation::ContentItem;

const INDENT: &str = "  ";

/// Render the sidebar as the viewer sees it.
///
/// Inert items show a lock marker and no children; admins see locked
/// items with an access marker and can expand them.
pub fn render_sidebar(tree: &[ContentItem], cache: &LockCache, is_admin: bool) -> String {
    let mut out = String::new();
    for item in gate_tree(tree, cache, is_admin) {
        write_item(&mut out, &item, 0);
    }
    out
}

fn write_item(out: &mut String, gated: &GatedItem<'_>, depth: usize) {
    let indent = INDENT.repeat(depth);
    let item = gated.item;

    if item.is_divider {
        let _ = writeln!(out, "{indent}-- {} --", item.title);
        return;
    }

    let marker = match gated.decision.affordance {
        Affordance::Open => "",
        Affordance::Locked => " [locked]",
        Affordance::LockedAdminAccess => " [locked, admin access]",
    };
    let target = match (&item.path, gated.is_navigable()) {
        (Some(path), true) => format!("  ({path})"),
        _ => String::new(),
    };
    let _ = writeln!(out, "{indent}{}{marker}{target}", item.title);

    for child in &gated.children {
        write_item(out, child, depth + 1);
    }
}

/// One-paragraph summary of the cache's freshness and status.
pub fn render_status(cache: &LockCache) -> String {
    let mut out = String::new();
    let locked = cache.locked_items.values().filter(|locked| **locked).count();
    let updated = cache
        .last_updated
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    let _ = write!(
        out,
        "{locked} of {} tracked items locked, last updated {updated}",
        cache.locked_items.len()
    );
    if cache.is_loading {
        out.push_str(" (syncing)");
    }
    out.push('\n');
    if let Some(error) = &cache.error {
        let _ = writeln!(out, "Error: {error}");
    }
    out
}

/// Render a lock audit trail, oldest first.
pub fn render_history(content_id: &str, entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return format!("No lock history for {content_id}\n");
    }

    let mut out = format!("Lock history for {content_id}:\n");
    for entry in entries {
        let when = entry
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        let action = match entry.action {
            LockAction::Locked => "locked",
            LockAction::Unlocked => "unlocked",
        };
        let _ = write!(out, "{INDENT}{when}  {action} by {}", entry.performed_by.name);
        if let Some(reason) = &entry.reason {
            let _ = write!(out, " ({reason})");
        }
        out.push('\n');
    }
    out
}
