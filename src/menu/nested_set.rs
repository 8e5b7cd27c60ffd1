//! Nested-set (nested interval) arithmetic.
//!
//! Every node of a layout owns an interval `[left_bound, right_bound]`; a node's
//! interval strictly contains the intervals of all its descendants and sibling
//! order is `left_bound` ascending. Bounds of one layout are the consecutive
//! integers `1..=2n`.
//!
//! The functions here work on an in-memory table (`Vec<MenuNode>` holding every
//! layout). The Postgres repository issues the same shifts as SQL `UPDATE`s and
//! shares the validation and positioning helpers.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::{
    error::{MenuError, MenuResult},
    models::MenuNode,
};

/// Deepest nesting level a layout may hold. Roots sit at level 1.
pub const MAX_MENU_DEPTH: usize = 32;

/// Interval width of a subtree, in bound units.
pub fn width(node: &MenuNode) -> i32 {
    node.right_bound - node.left_bound + 1
}

/// Validates that `parent` can adopt a node of `layout`.
pub fn check_parent(layout: i16, parent: &MenuNode) -> MenuResult<()> {
    if parent.layout != layout {
        return Err(MenuError::LayoutMismatch {
            layout,
            parent: parent.id,
            parent_layout: parent.layout,
        });
    }
    Ok(())
}

/// Number of attached nodes of `node`'s layout whose interval encloses it.
pub fn ancestor_count(nodes: &[MenuNode], node: &MenuNode) -> usize {
    nodes
        .iter()
        .filter(|n| n.layout == node.layout && n.left_bound > 0 && n.contains(node))
        .count()
}

/// Levels below `root` inside its own subtree; 0 for a leaf.
pub fn subtree_height(nodes: &[MenuNode], root: &MenuNode) -> usize {
    let inside: Vec<&MenuNode> = nodes
        .iter()
        .filter(|n| n.layout == root.layout && root.contains(n))
        .collect();
    inside
        .iter()
        .map(|d| inside.iter().filter(|a| a.contains(d)).count() + 1)
        .max()
        .unwrap_or(0)
}

/// check_depth
///
/// A subtree of `height` extra levels placed under a parent at `parent_level`
/// (0 for a new root) must end at or above [`MAX_MENU_DEPTH`].
pub fn check_depth(parent_level: usize, height: usize, path: &str) -> MenuResult<()> {
    let deepest = parent_level + 1 + height;
    if deepest > MAX_MENU_DEPTH {
        return Err(MenuError::validation(
            path,
            format!(
                "would nest {} levels deep, the limit is {}",
                deepest, MAX_MENU_DEPTH
            ),
        ));
    }
    Ok(())
}

/// Validates a re-parenting of `node` under `new_parent`.
pub fn check_move(node: &MenuNode, new_parent: Option<&MenuNode>) -> MenuResult<()> {
    let Some(parent) = new_parent else {
        return Ok(());
    };
    if parent.id == node.id || (parent.layout == node.layout && node.contains(parent)) {
        return Err(MenuError::CycleDetected {
            node: node.id,
            new_parent: parent.id,
        });
    }
    check_parent(node.layout, parent)
}

/// insertion_point
///
/// Left bound at which a subtree lands among `sibling_lefts` (the new siblings'
/// left bounds, ascending, moved node excluded). `end` is the bound right after the
/// last sibling: the parent's right bound, or the layout's next free bound for roots.
pub fn insertion_point(sibling_lefts: &[i32], end: i32, position: Option<usize>) -> i32 {
    match position {
        Some(index) if index < sibling_lefts.len() => sibling_lefts[index],
        _ => end,
    }
}

/// First bound after every attached node of `layout` (1 for an empty layout).
pub fn next_root_bound(nodes: &[MenuNode], layout: i16) -> i32 {
    nodes
        .iter()
        .filter(|n| n.layout == layout && n.left_bound > 0)
        .map(|n| n.right_bound)
        .max()
        .map_or(1, |max| max + 1)
}

/// Makes room for `width` bounds starting at `at`. Detached (negative) nodes are skipped.
pub fn open_gap(nodes: &mut [MenuNode], layout: i16, at: i32, width: i32) {
    for n in nodes.iter_mut().filter(|n| n.layout == layout && n.left_bound > 0) {
        if n.left_bound >= at {
            n.left_bound += width;
        }
        if n.right_bound >= at {
            n.right_bound += width;
        }
    }
}

/// Removes the `width`-wide hole that ended at `after`. Detached nodes are skipped.
pub fn close_gap(nodes: &mut [MenuNode], layout: i16, after: i32, width: i32) {
    for n in nodes.iter_mut().filter(|n| n.layout == layout && n.left_bound > 0) {
        if n.left_bound > after {
            n.left_bound -= width;
        }
        if n.right_bound > after {
            n.right_bound -= width;
        }
    }
}

fn find(nodes: &[MenuNode], id: i64) -> MenuResult<&MenuNode> {
    nodes
        .iter()
        .find(|n| n.id == id)
        .ok_or(MenuError::NotFound(id))
}

fn sibling_lefts(nodes: &[MenuNode], layout: i16, parent_id: Option<i64>) -> Vec<i32> {
    let mut lefts: Vec<i32> = nodes
        .iter()
        .filter(|n| n.layout == layout && n.left_bound > 0 && n.parent_id == parent_id)
        .map(|n| n.left_bound)
        .collect();
    lefts.sort_unstable();
    lefts
}

/// insert_last
///
/// Appends `node` as the last child of its `parent_id` (or the last root of its
/// layout), shifting later bounds. The caller assigns `id` and timestamps; bounds
/// are overwritten.
pub fn insert_last(nodes: &mut Vec<MenuNode>, mut node: MenuNode) -> MenuResult<MenuNode> {
    let at = match node.parent_id {
        Some(parent_id) => {
            let parent = find(nodes, parent_id)?;
            check_parent(node.layout, parent)?;
            check_depth(ancestor_count(nodes, parent) + 1, 0, "node.parent_id")?;
            parent.right_bound
        }
        None => next_root_bound(nodes, node.layout),
    };

    open_gap(nodes, node.layout, at, 2);
    node.left_bound = at;
    node.right_bound = at + 1;
    nodes.push(node.clone());
    Ok(node)
}

/// move_subtree
///
/// Re-parents `id` (with its subtree) under `new_parent`, at `position` among the
/// new siblings. Detach, close the gap, reopen it at the destination, reattach.
/// On error `nodes` is left untouched.
pub fn move_subtree(
    nodes: &mut [MenuNode],
    id: i64,
    new_parent: Option<i64>,
    position: Option<usize>,
    now: DateTime<Utc>,
) -> MenuResult<MenuNode> {
    let node = find(nodes, id)?.clone();
    let parent = match new_parent {
        Some(parent_id) => Some(find(nodes, parent_id)?.clone()),
        None => None,
    };
    check_move(&node, parent.as_ref())?;
    let parent_level = parent.as_ref().map_or(0, |p| ancestor_count(nodes, p) + 1);
    check_depth(parent_level, subtree_height(nodes, &node), "parent_id")?;

    let layout = node.layout;
    let w = width(&node);

    // 1. detach: flip the subtree's bounds negative
    for n in nodes.iter_mut().filter(|n| n.layout == layout && node_within(&node, n)) {
        n.left_bound = -n.left_bound;
        n.right_bound = -n.right_bound;
    }

    // 2. close the hole it left behind
    close_gap(nodes, layout, node.right_bound, w);

    // 3. destination, computed against the compacted layout
    let end = match new_parent {
        Some(parent_id) => find(nodes, parent_id)?.right_bound,
        None => next_root_bound(nodes, layout),
    };
    let at = insertion_point(&sibling_lefts(nodes, layout, new_parent), end, position);
    open_gap(nodes, layout, at, w);

    // 4. reattach with the offset that maps the old left bound onto `at`
    let offset = at - node.left_bound;
    for n in nodes.iter_mut().filter(|n| n.layout == layout && n.left_bound < 0) {
        n.left_bound = -n.left_bound + offset;
        n.right_bound = -n.right_bound + offset;
    }

    let moved = nodes
        .iter_mut()
        .find(|n| n.id == id)
        .ok_or(MenuError::NotFound(id))?;
    moved.parent_id = new_parent;
    moved.updated_at = now;
    Ok(moved.clone())
}

fn node_within(root: &MenuNode, n: &MenuNode) -> bool {
    n.left_bound >= root.left_bound && n.right_bound <= root.right_bound
}

/// remove_subtree
///
/// Deletes `id` and every descendant, then closes the gap. Returns the number of
/// removed rows.
pub fn remove_subtree(nodes: &mut Vec<MenuNode>, id: i64) -> MenuResult<u64> {
    let node = find(nodes, id)?.clone();
    let before = nodes.len();
    nodes.retain(|n| !(n.layout == node.layout && node_within(&node, n)));
    let removed = (before - nodes.len()) as u64;
    close_gap(nodes, node.layout, node.right_bound, width(&node));
    Ok(removed)
}

/// verify_layout
///
/// Checks every nested-set invariant for `nodes` (rows of a single layout, any
/// order) and returns one message per violation.
pub fn verify_layout(nodes: &[MenuNode]) -> Vec<String> {
    let mut issues = Vec::new();
    let by_id: HashMap<i64, &MenuNode> = nodes.iter().map(|n| (n.id, n)).collect();

    let mut seen_bounds = HashSet::new();
    for n in nodes {
        if n.left_bound >= n.right_bound {
            issues.push(format!(
                "node {}: left bound {} is not below right bound {}",
                n.id, n.left_bound, n.right_bound
            ));
        }
        for bound in [n.left_bound, n.right_bound] {
            if !seen_bounds.insert(bound) {
                issues.push(format!("node {}: bound {} is used twice", n.id, bound));
            }
        }
        match n.parent_id.map(|p| (p, by_id.get(&p))) {
            None => {}
            Some((p, None)) => issues.push(format!("node {}: parent {} is missing", n.id, p)),
            Some((_, Some(parent))) if parent.layout != n.layout => issues.push(format!(
                "node {}: parent {} is in layout {}",
                n.id, parent.id, parent.layout
            )),
            Some((_, Some(parent))) if !parent.contains(n) => issues.push(format!(
                "node {}: interval [{}, {}] escapes parent {} [{}, {}]",
                n.id, n.left_bound, n.right_bound, parent.id, parent.left_bound, parent.right_bound
            )),
            Some(_) => {}
        }
    }

    // The innermost enclosing interval must be the declared parent.
    for n in nodes {
        let enclosing = nodes
            .iter()
            .filter(|candidate| candidate.contains(n))
            .max_by_key(|candidate| candidate.left_bound)
            .map(|candidate| candidate.id);
        if enclosing != n.parent_id {
            issues.push(format!(
                "node {}: declared parent {:?} but enclosed by {:?}",
                n.id, n.parent_id, enclosing
            ));
        }
    }

    let mut bounds: Vec<i32> = seen_bounds.into_iter().collect();
    bounds.sort_unstable();
    if bounds.iter().enumerate().any(|(i, b)| *b != i as i32 + 1) {
        issues.push("bounds are not contiguous from 1".to_string());
    }

    issues
}

/// Rows of `layout`, ordered by left bound, optionally without hidden nodes.
pub fn ordered_layout(nodes: &[MenuNode], layout: i16, include_hidden: bool) -> Vec<MenuNode> {
    let mut rows: Vec<MenuNode> = nodes
        .iter()
        .filter(|n| n.layout == layout && (include_hidden || n.visibility))
        .cloned()
        .collect();
    rows.sort_by_key(|n| n.left_bound);
    rows
}
