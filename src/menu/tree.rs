//! Tree materializer: flat rows → nested forests.
//!
//! Input is the output of `list_menu_nodes` (one layout). Children are attached by
//! `parent_id` and kept in ascending `left_bound` order. A node whose parent is not
//! in the input is dropped together with its subtree; it is never promoted to a root.
//! Rows nested past `MAX_MENU_DEPTH` are cut off, so recursion depth stays bounded
//! even for rows written around the store.

use std::collections::HashMap;

use crate::{
    localized::LocalizedText,
    menu::nested_set::MAX_MENU_DEPTH,
    models::{AdminMenuNode, MenuNode, NavTarget, PublicMenuNode, page_public_path},
};

/// Rendered url of a node without a resolvable target.
pub const UNRESOLVED_URL: &str = "#";

struct Forest<'a> {
    nodes: Vec<&'a MenuNode>,
    children: HashMap<Option<i64>, Vec<usize>>,
}

impl<'a> Forest<'a> {
    fn new(rows: &'a [MenuNode], keep: impl Fn(&MenuNode) -> bool) -> Self {
        let mut nodes: Vec<&MenuNode> = rows.iter().filter(|n| keep(n)).collect();
        nodes.sort_by_key(|n| n.left_bound);

        let mut children: HashMap<Option<i64>, Vec<usize>> = HashMap::new();
        for (index, node) in nodes.iter().enumerate() {
            children.entry(node.parent_id).or_default().push(index);
        }
        Self { nodes, children }
    }

    fn build<T>(&self, make: &impl Fn(&MenuNode, usize, Vec<T>) -> T) -> Vec<T> {
        self.level(None, 0, make)
    }

    fn level<T>(
        &self,
        parent: Option<i64>,
        depth: usize,
        make: &impl Fn(&MenuNode, usize, Vec<T>) -> T,
    ) -> Vec<T> {
        if depth >= MAX_MENU_DEPTH {
            if let Some(parent) = parent.filter(|p| self.children.contains_key(&Some(*p))) {
                tracing::warn!(parent, depth, "menu rows nested past the depth limit were cut off");
            }
            return Vec::new();
        }
        self.children
            .get(&parent)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| {
                        let node = self.nodes[i];
                        let children = self.level(Some(node.id), depth + 1, make);
                        make(node, depth, children)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// admin_forest
///
/// Full projection: every input row (hidden ones included), raw name maps, bounds
/// and `depth` (number of ancestors).
pub fn admin_forest(rows: &[MenuNode]) -> Vec<AdminMenuNode> {
    Forest::new(rows, |_| true).build(&|node, depth, children| AdminMenuNode {
        id: node.id,
        layout: node.layout,
        parent_id: node.parent_id,
        left_bound: node.left_bound,
        right_bound: node.right_bound,
        depth,
        name: node.name.clone(),
        properties: node.properties.clone(),
        visibility: node.visibility,
        created_at: node.created_at,
        updated_at: node.updated_at,
        children,
    })
}

/// public_forest
///
/// Curated projection for anonymous readers. Hidden nodes are excluded with their
/// whole subtree even if the caller passed them in; names are resolved for `lang`.
pub fn public_forest(
    rows: &[MenuNode],
    lang: &str,
    default_lang: &str,
    page_paths: &HashMap<i64, String>,
) -> Vec<PublicMenuNode> {
    Forest::new(rows, |n| n.visibility).build(&|node, _, children| PublicMenuNode {
        id: node.id,
        name: display_name(&node.name, lang, default_lang),
        url: resolve_url(node, page_paths),
        children,
    })
}

fn display_name(name: &LocalizedText, lang: &str, default_lang: &str) -> String {
    name.resolve_with(lang, default_lang).to_string()
}

/// resolve_url
///
/// Page targets map through `page_paths` (page id → slug); link targets are used
/// verbatim; anything else renders as [`UNRESOLVED_URL`].
pub fn resolve_url(node: &MenuNode, page_paths: &HashMap<i64, String>) -> String {
    match NavTarget::from_properties(&node.properties) {
        Some(NavTarget::Page { id }) => page_paths
            .get(&id)
            .map(|slug| page_public_path(slug))
            .unwrap_or_else(|| UNRESOLVED_URL.to_string()),
        Some(NavTarget::Link { url }) => url,
        None => UNRESOLVED_URL.to_string(),
    }
}

/// Page ids referenced by `rows`, deduplicated, in first-seen order.
pub fn referenced_pages(rows: &[MenuNode]) -> Vec<i64> {
    let mut ids = Vec::new();
    for node in rows {
        if let Some(NavTarget::Page { id }) = NavTarget::from_properties(&node.properties) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}
