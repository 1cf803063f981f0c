//! Static course navigation tree.
//!
//! The tree is defined at build time and never mutated. Each top-level day
//! carries an optional static `locked` default that applies only until the
//! lock service has provided data.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{validate_content_id, ContentId};

/// A node in the sidebar navigation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub title: String,
    pub path: Option<String>,
    pub children: Vec<ContentItem>,
    /// Static default used when no server lock data is available.
    pub locked: bool,
    pub admin_only: bool,
    pub is_divider: bool,
}

impl ContentItem {
    fn bare(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            path: None,
            children: Vec::new(),
            locked: false,
            admin_only: false,
            is_divider: false,
        }
    }

    /// A leaf page reachable at `path`.
    pub fn page(id: &str, title: &str, path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::bare(id, title)
        }
    }

    /// A collapsible section with children and no page of its own.
    pub fn section(id: &str, title: &str, children: Vec<ContentItem>) -> Self {
        Self {
            children,
            ..Self::bare(id, title)
        }
    }

    /// A non-navigable visual separator.
    pub fn divider(id: &str, title: &str) -> Self {
        Self {
            is_divider: true,
            ..Self::bare(id, title)
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// The course's sidebar tree.
pub fn course_tree() -> Vec<ContentItem> {
    vec![
        ContentItem::page("home", "Home", "/"),
        ContentItem::section(
            "day1",
            "Day 1 (8/19 Tue)",
            vec![
                ContentItem::page("day1-01", "1. Onboarding and facilitation", "/day1/01_onboarding"),
                ContentItem::page("day1-02", "2. AI agent trends", "/day1/02_ai_agent_trends"),
                ContentItem::page(
                    "day1-03",
                    "3. Vibe coding and building AI agents",
                    "/day1/03_vibe_coding_and_agent",
                ),
                ContentItem::page(
                    "day1-04",
                    "4. Deploying AI services with Streamlit",
                    "/day1/04_streamlit_deploy",
                ),
                ContentItem::page(
                    "day1-05",
                    "5. RAG concepts with vibe coding",
                    "/day1/05_rag_with_vibe_coding",
                ),
                ContentItem::page(
                    "day1-06",
                    "6. IT fundamentals for vibe coding",
                    "/day1/06_it_knowledge_for_vibe_coding",
                ),
            ],
        ),
        ContentItem::section(
            "day2",
            "Day 2 (8/20 Wed)",
            vec![
                ContentItem::page("day2-01", "1. Introduction to n8n automation", "/day2/01_n8n_intro"),
                ContentItem::page("day2-02", "2. n8n workflow lab", "/day2/02_n8n_workflow"),
                ContentItem::page("day2-03", "3. Fresh AI trends", "/day2/03_collaboration_strategy"),
                ContentItem::page("day2-04", "4. Hackathon ideation", "/day2/04_hackathon_ideation"),
                ContentItem::page(
                    "day2-05",
                    "5. Hackathon idea pitches",
                    "/day2/05_hackathon_presentation",
                ),
                ContentItem::page(
                    "day2-06",
                    "6. Pitch feedback",
                    "/day2/06_hackathon_feedback",
                ),
            ],
        )
        .locked(),
        ContentItem::section(
            "day3",
            "Day 3 (8/21 Thu)",
            vec![
                ContentItem::page(
                    "day3-01",
                    "1. Special lecture: surviving the GenAI era",
                    "/day3/01_special_lecture_gen_ai",
                ),
                ContentItem::page(
                    "day3-02",
                    "2. Mini hackathon kickoff and team building",
                    "/day3/02_hackathon_kickoff",
                ),
                ContentItem::page(
                    "day3-03",
                    "3. Publishing a personal page with GitHub",
                    "/day3/03_github_pages_deploy",
                ),
                ContentItem::page(
                    "day3-04",
                    "4. Mini hackathon build time",
                    "/day3/04_hackathon_development",
                ),
                ContentItem::page(
                    "day3-05",
                    "5. Project demos",
                    "/day3/05_project_presentation",
                ),
                ContentItem::page("day3-06", "6. Next steps", "/day3/06_closing"),
            ],
        )
        .locked(),
        ContentItem::divider("admin-divider", "Admin").admin_only(),
        ContentItem::page("admin-dashboard", "Dashboard", "/admin").admin_only(),
        ContentItem::section(
            "admin-students",
            "Students",
            vec![
                ContentItem::page("admin-students-list", "Roster", "/admin/students"),
                ContentItem::page(
                    "admin-students-upload",
                    "CSV upload",
                    "/admin/students/upload",
                ),
            ],
        )
        .admin_only(),
        ContentItem::page("admin-assignments", "Assignments", "/admin/assignments").admin_only(),
    ]
}

/// Check that every id is valid and unique across the whole tree.
pub fn validate_tree(tree: &[ContentItem]) -> Result<(), CoreError> {
    fn walk<'a>(
        items: &'a [ContentItem],
        seen: &mut HashSet<&'a str>,
    ) -> Result<(), CoreError> {
        for item in items {
            validate_content_id(&item.id)?;
            if !seen.insert(item.id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "duplicate content id '{}' in navigation tree",
                    item.id
                )));
            }
            walk(&item.children, seen)?;
        }
        Ok(())
    }

    walk(tree, &mut HashSet::new())
}

/// Find an item anywhere in the tree by id.
pub fn find_item<'a>(tree: &'a [ContentItem], id: &str) -> Option<&'a ContentItem> {
    tree.iter().find_map(|item| {
        if item.id == id {
            Some(item)
        } else {
            find_item(&item.children, id)
        }
    })
}

/// The chain of items from a top-level item down to the one serving
/// `path`, inclusive. `None` if no item serves that path.
pub fn ancestry_for_path<'a>(tree: &'a [ContentItem], path: &str) -> Option<Vec<&'a ContentItem>> {
    for item in tree {
        if item.path.as_deref() == Some(path) {
            return Some(vec![item]);
        }
        if let Some(mut chain) = ancestry_for_path(&item.children, path) {
            chain.insert(0, item);
            return Some(chain);
        }
    }
    None
}

/// Top-level items an administrator can lock: sections that are neither
/// admin-only nor dividers.
pub fn lockable_items(tree: &[ContentItem]) -> Vec<&ContentItem> {
    tree.iter()
        .filter(|item| item.has_children() && !item.admin_only && !item.is_divider)
        .collect()
}
