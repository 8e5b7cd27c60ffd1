use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{MenuError, MenuResult},
    menu::{nested_set, rebuild::PlannedNode},
    models::{MenuNode, MenuNodePatch, MoveMenuNode, NewMenuNode, User},
    repository::Repository,
};

/// A page as far as menus care: its slug and whether it is published.
#[derive(Debug, Clone)]
struct PageEntry {
    slug: String,
    visibility: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    pages: HashMap<i64, PageEntry>,
    nodes: Vec<MenuNode>,
    next_id: i64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// InMemoryRepository
///
/// A process-local `Repository` with the same semantics as the Postgres one. Used by
/// the test-suite and for running the API without a database.
///
/// One `RwLock` guards everything: structural writes hold the write half (so they are
/// serialized), reads share the read half and never see a half-shifted layout.
/// Structural writes work on a scratch copy that replaces the state only on success.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
    /// When set, a rebuild fails after inserting this many rows (simulated store failure).
    fail_rebuild_after: Option<usize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose rebuilds fail after `inserted` rows have been written.
    pub fn failing_rebuild_after(inserted: usize) -> Self {
        Self {
            fail_rebuild_after: Some(inserted),
            ..Self::default()
        }
    }

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn insert_page(&self, id: i64, slug: impl Into<String>, visibility: bool) {
        self.state.write().await.pages.insert(
            id,
            PageEntry {
                slug: slug.into(),
                visibility,
            },
        );
    }

    /// Every stored node, all layouts, in storage order.
    pub async fn snapshot(&self) -> Vec<MenuNode> {
        self.state.read().await.nodes.clone()
    }

    /// Runs `op` against a copy of the state and publishes the copy only if `op`
    /// succeeds.
    async fn transact<T>(
        &self,
        op: impl FnOnce(&mut MemoryState) -> MenuResult<T>,
    ) -> MenuResult<T> {
        let mut guard = self.state.write().await;
        let mut scratch = guard.clone();
        let out = op(&mut scratch)?;
        *guard = scratch;
        Ok(out)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> MenuResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn page_slugs(&self, ids: &[i64]) -> MenuResult<HashMap<i64, String>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .pages
                    .get(id)
                    .filter(|page| page.visibility)
                    .map(|page| (*id, page.slug.clone()))
            })
            .collect())
    }

    async fn list_menu_nodes(
        &self,
        layout: i16,
        include_hidden: bool,
    ) -> MenuResult<Vec<MenuNode>> {
        let state = self.state.read().await;
        Ok(nested_set::ordered_layout(&state.nodes, layout, include_hidden))
    }

    async fn get_menu_node(&self, id: i64) -> MenuResult<Option<MenuNode>> {
        let state = self.state.read().await;
        Ok(state.nodes.iter().find(|n| n.id == id).cloned())
    }

    async fn create_menu_node(&self, node: NewMenuNode) -> MenuResult<MenuNode> {
        let created = self
            .transact(|state| {
                let now = Utc::now();
                let row = MenuNode {
                    id: state.allocate_id(),
                    layout: node.layout,
                    name: node.name,
                    properties: node.properties,
                    parent_id: node.parent_id,
                    left_bound: 0,
                    right_bound: 0,
                    visibility: node.visibility,
                    created_at: now,
                    updated_at: now,
                };
                nested_set::insert_last(&mut state.nodes, row)
            })
            .await?;
        tracing::info!(id = created.id, layout = created.layout, "menu node created");
        Ok(created)
    }

    async fn move_menu_node(&self, id: i64, target: MoveMenuNode) -> MenuResult<MenuNode> {
        let moved = self
            .transact(|state| {
                nested_set::move_subtree(
                    &mut state.nodes,
                    id,
                    target.parent_id,
                    target.position,
                    Utc::now(),
                )
            })
            .await?;
        tracing::info!(id, layout = moved.layout, parent_id = ?moved.parent_id, "menu node moved");
        Ok(moved)
    }

    async fn delete_menu_subtree(&self, id: i64) -> MenuResult<u64> {
        let removed = self
            .transact(|state| nested_set::remove_subtree(&mut state.nodes, id))
            .await?;
        tracing::info!(id, removed, "menu subtree deleted");
        Ok(removed)
    }

    async fn clear_menu_layout(&self, layout: i16) -> MenuResult<u64> {
        let removed = self
            .transact(|state| {
                let before = state.nodes.len();
                state.nodes.retain(|n| n.layout != layout);
                Ok((before - state.nodes.len()) as u64)
            })
            .await?;
        tracing::info!(layout, removed, "menu layout cleared");
        Ok(removed)
    }

    async fn replace_menu_layout(
        &self,
        layout: i16,
        plan: Vec<PlannedNode>,
    ) -> MenuResult<Vec<MenuNode>> {
        let fail_after = self.fail_rebuild_after;
        let inserted = self
            .transact(|state| {
                state.nodes.retain(|n| n.layout != layout);

                let now = Utc::now();
                let mut inserted: Vec<MenuNode> = Vec::with_capacity(plan.len());
                for planned in plan {
                    if fail_after.is_some_and(|limit| inserted.len() >= limit) {
                        return Err(MenuError::storage("simulated store failure during rebuild"));
                    }
                    let row = MenuNode {
                        id: state.allocate_id(),
                        layout,
                        name: planned.name,
                        properties: planned.properties,
                        parent_id: planned.parent.map(|index| inserted[index].id),
                        left_bound: planned.left_bound,
                        right_bound: planned.right_bound,
                        visibility: planned.visibility,
                        created_at: now,
                        updated_at: now,
                    };
                    state.nodes.push(row.clone());
                    inserted.push(row);
                }
                Ok(inserted)
            })
            .await?;
        tracing::info!(layout, inserted = inserted.len(), "menu layout rebuilt");
        Ok(inserted)
    }

    async fn update_menu_node(&self, id: i64, patch: MenuNodePatch) -> MenuResult<MenuNode> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(MenuError::NotFound(id))?;
        if let Some(name) = patch.name {
            node.name = name;
        }
        if let Some(properties) = patch.properties {
            node.properties = properties;
        }
        if let Some(visibility) = patch.visibility {
            node.visibility = visibility;
        }
        node.updated_at = Utc::now();
        Ok(node.clone())
    }
}
