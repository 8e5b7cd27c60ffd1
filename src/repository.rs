use crate::{
    error::{MenuError, MenuResult},
    localized::LocalizedText,
    menu::{nested_set, rebuild::PlannedNode},
    models::{MenuNode, MenuNodePatch, MoveMenuNode, NewMenuNode, User},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction, types::Json};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract consumed by the menu core and the auth extractor.
/// Structural menu operations (create, move, delete, clear, replace) are each one
/// atomic unit serialized per layout; reads only ever observe committed states.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across
/// Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- User/Auth ---
    /// The profile behind `id`. `Ok(None)` means no such profile; `Err` means the
    /// store could not answer.
    async fn get_user(&self, id: Uuid) -> MenuResult<Option<User>>;

    // --- Pages ---
    /// Slugs of the given *visible* pages, keyed by page id. Unknown or hidden pages
    /// are simply absent.
    async fn page_slugs(&self, ids: &[i64]) -> MenuResult<HashMap<i64, String>>;

    // --- Menu reads ---
    /// Nodes of `layout` ordered by left bound; hidden nodes only with `include_hidden`.
    async fn list_menu_nodes(&self, layout: i16, include_hidden: bool)
    -> MenuResult<Vec<MenuNode>>;
    async fn get_menu_node(&self, id: i64) -> MenuResult<Option<MenuNode>>;

    // --- Menu structural writes ---
    async fn create_menu_node(&self, node: NewMenuNode) -> MenuResult<MenuNode>;
    async fn move_menu_node(&self, id: i64, target: MoveMenuNode) -> MenuResult<MenuNode>;
    /// Removes the node and its descendants; returns the number of removed rows.
    async fn delete_menu_subtree(&self, id: i64) -> MenuResult<u64>;
    async fn clear_menu_layout(&self, layout: i16) -> MenuResult<u64>;
    /// Deletes every node of `layout` and inserts `plan`, all or nothing. Returns the
    /// inserted rows in plan order, as committed.
    async fn replace_menu_layout(
        &self,
        layout: i16,
        plan: Vec<PlannedNode>,
    ) -> MenuResult<Vec<MenuNode>>;

    // --- Menu field writes ---
    async fn update_menu_node(&self, id: i64, patch: MenuNodePatch) -> MenuResult<MenuNode>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Advisory-lock class for menu layouts; the layout number is the second key.
pub const MENU_LOCK_CLASS: i32 = 0x4d45_4e55;

const MENU_COLUMNS: &str = "id, layout, name, properties, parent_id, _lft, _rgt, visibility, created_at, updated_at";

/// MenuRow
///
/// Raw `menus` row. `name`/`properties` are `JSON` columns (not `JSONB`) so the
/// stored key order of the name map survives the round trip.
#[derive(Debug, FromRow)]
struct MenuRow {
    id: i64,
    layout: i16,
    name: Json<LocalizedText>,
    properties: Option<Json<Value>>,
    parent_id: Option<i64>,
    #[sqlx(rename = "_lft")]
    left_bound: i32,
    #[sqlx(rename = "_rgt")]
    right_bound: i32,
    visibility: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MenuRow> for MenuNode {
    fn from(row: MenuRow) -> Self {
        MenuNode {
            id: row.id,
            layout: row.layout,
            name: row.name.0,
            properties: row.properties.map(|p| p.0).unwrap_or(Value::Null),
            parent_id: row.parent_id,
            left_bound: row.left_bound,
            right_bound: row.right_bound,
            visibility: row.visibility,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the exclusive per-layout scope: a transaction holding the layout's
    /// advisory lock until commit or rollback.
    async fn lock_layout(&self, layout: i16) -> MenuResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(MENU_LOCK_CLASS)
            .bind(i32::from(layout))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn layout_of(&self, id: i64) -> MenuResult<i16> {
        sqlx::query_scalar::<_, i16>("SELECT layout FROM menus WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(MenuError::NotFound(id))
    }
}

/// Serializes a JSON column value to text. Bound as text and cast with `::json`,
/// it reaches the column byte-for-byte (a `JSONB` parameter would reorder keys).
fn json_text<T: Serialize>(value: &T) -> MenuResult<String> {
    serde_json::to_string(value).map_err(MenuError::storage)
}

async fn fetch_node(tx: &mut Transaction<'_, Postgres>, id: i64) -> MenuResult<MenuNode> {
    let sql = format!("SELECT {} FROM menus WHERE id = $1", MENU_COLUMNS);
    sqlx::query_as::<_, MenuRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .map(MenuNode::from)
        .ok_or(MenuError::NotFound(id))
}

async fn next_root_bound(tx: &mut Transaction<'_, Postgres>, layout: i16) -> MenuResult<i32> {
    let max: Option<i32> =
        sqlx::query_scalar("SELECT MAX(_rgt) FROM menus WHERE layout = $1 AND _lft > 0")
            .bind(layout)
            .fetch_one(&mut **tx)
            .await?;
    Ok(max.map_or(1, |m| m + 1))
}

/// Level of `node` inside its layout: 1 for a root.
async fn level_of(tx: &mut Transaction<'_, Postgres>, node: &MenuNode) -> MenuResult<usize> {
    let ancestors: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM menus WHERE layout = $1 AND _lft > 0 AND _lft < $2 AND _rgt > $3",
    )
    .bind(node.layout)
    .bind(node.left_bound)
    .bind(node.right_bound)
    .fetch_one(&mut **tx)
    .await?;
    Ok(ancestors as usize + 1)
}

/// Levels below `node` inside its subtree, counted from the stored intervals.
async fn height_of(tx: &mut Transaction<'_, Postgres>, node: &MenuNode) -> MenuResult<usize> {
    let height: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(MAX(inner_depth), 0)::BIGINT FROM (
               SELECT COUNT(a.id) + 1 AS inner_depth
               FROM menus d
               LEFT JOIN menus a
                 ON a.layout = d.layout AND a._lft > $2 AND a._lft < d._lft AND a._rgt > d._rgt
               WHERE d.layout = $1 AND d._lft > $2 AND d._rgt < $3
               GROUP BY d.id
           ) levels"#,
    )
    .bind(node.layout)
    .bind(node.left_bound)
    .bind(node.right_bound)
    .fetch_one(&mut **tx)
    .await?;
    Ok(height as usize)
}

/// Shifts every attached bound of `layout` at or after `at` by `delta`.
async fn shift_from(
    tx: &mut Transaction<'_, Postgres>,
    layout: i16,
    at: i32,
    delta: i32,
) -> MenuResult<()> {
    sqlx::query("UPDATE menus SET _lft = _lft + $3 WHERE layout = $1 AND _lft >= $2 AND _lft > 0")
        .bind(layout)
        .bind(at)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
    sqlx::query("UPDATE menus SET _rgt = _rgt + $3 WHERE layout = $1 AND _rgt >= $2 AND _lft > 0")
        .bind(layout)
        .bind(at)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_user
    ///
    /// Retrieves the principal (ID, email, role) for authentication.
    async fn get_user(&self, id: Uuid) -> MenuResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn page_slugs(&self, ids: &[i64]) -> MenuResult<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, slug FROM pages WHERE id = ANY($1) AND visibility = true",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// list_menu_nodes
    ///
    /// Plain committed read, no lock: a concurrent structural write is either fully
    /// visible or not at all.
    async fn list_menu_nodes(
        &self,
        layout: i16,
        include_hidden: bool,
    ) -> MenuResult<Vec<MenuNode>> {
        let sql = format!(
            "SELECT {} FROM menus WHERE layout = $1 AND (visibility = true OR $2) ORDER BY _lft",
            MENU_COLUMNS
        );
        let rows = sqlx::query_as::<_, MenuRow>(&sql)
            .bind(layout)
            .bind(include_hidden)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MenuNode::from).collect())
    }

    async fn get_menu_node(&self, id: i64) -> MenuResult<Option<MenuNode>> {
        let sql = format!("SELECT {} FROM menus WHERE id = $1", MENU_COLUMNS);
        let row = sqlx::query_as::<_, MenuRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MenuNode::from))
    }

    /// create_menu_node
    ///
    /// Appends the node as the last child of its parent (or last root), opening a
    /// two-bound gap at the parent's right bound.
    async fn create_menu_node(&self, node: NewMenuNode) -> MenuResult<MenuNode> {
        let mut tx = self.lock_layout(node.layout).await?;

        let at = match node.parent_id {
            Some(parent_id) => {
                let parent = fetch_node(&mut tx, parent_id).await?;
                nested_set::check_parent(node.layout, &parent)?;
                let parent_level = level_of(&mut tx, &parent).await?;
                nested_set::check_depth(parent_level, 0, "node.parent_id")?;
                parent.right_bound
            }
            None => next_root_bound(&mut tx, node.layout).await?,
        };
        shift_from(&mut tx, node.layout, at, 2).await?;

        let sql = format!(
            r#"INSERT INTO menus (layout, name, properties, parent_id, _lft, _rgt, visibility, created_at, updated_at)
               VALUES ($1, $2::json, $3::json, $4, $5, $6, $7, NOW(), NOW())
               RETURNING {}"#,
            MENU_COLUMNS
        );
        let created = sqlx::query_as::<_, MenuRow>(&sql)
            .bind(node.layout)
            .bind(json_text(&node.name)?)
            .bind(json_text(&node.properties)?)
            .bind(node.parent_id)
            .bind(at)
            .bind(at + 1)
            .bind(node.visibility)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(id = created.id, layout = node.layout, "menu node created");
        Ok(created.into())
    }

    /// move_menu_node
    ///
    /// Detach (negate the subtree's bounds), close the gap, reopen it at the
    /// destination, reattach with an offset. One transaction under the layout lock.
    async fn move_menu_node(&self, id: i64, target: MoveMenuNode) -> MenuResult<MenuNode> {
        let layout = self.layout_of(id).await?;
        let mut tx = self.lock_layout(layout).await?;

        // Re-read under the lock; the unlocked read only picked the lock key.
        let node = fetch_node(&mut tx, id).await?;
        let parent = match target.parent_id {
            Some(parent_id) => Some(fetch_node(&mut tx, parent_id).await?),
            None => None,
        };
        nested_set::check_move(&node, parent.as_ref())?;
        let parent_level = match &parent {
            Some(parent) => level_of(&mut tx, parent).await?,
            None => 0,
        };
        let height = height_of(&mut tx, &node).await?;
        nested_set::check_depth(parent_level, height, "parent_id")?;

        let width = nested_set::width(&node);

        sqlx::query(
            "UPDATE menus SET _lft = -_lft, _rgt = -_rgt WHERE layout = $1 AND _lft >= $2 AND _rgt <= $3",
        )
        .bind(layout)
        .bind(node.left_bound)
        .bind(node.right_bound)
        .execute(&mut *tx)
        .await?;

        shift_from(&mut tx, layout, node.right_bound + 1, -width).await?;

        let end = match target.parent_id {
            Some(parent_id) => fetch_node(&mut tx, parent_id).await?.right_bound,
            None => next_root_bound(&mut tx, layout).await?,
        };
        let sibling_lefts: Vec<i32> = sqlx::query_scalar(
            "SELECT _lft FROM menus WHERE layout = $1 AND parent_id IS NOT DISTINCT FROM $2 AND _lft > 0 ORDER BY _lft",
        )
        .bind(layout)
        .bind(target.parent_id)
        .fetch_all(&mut *tx)
        .await?;
        let at = nested_set::insertion_point(&sibling_lefts, end, target.position);

        shift_from(&mut tx, layout, at, width).await?;

        sqlx::query(
            "UPDATE menus SET _lft = -_lft + $2, _rgt = -_rgt + $2 WHERE layout = $1 AND _lft < 0",
        )
        .bind(layout)
        .bind(at - node.left_bound)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE menus SET parent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(target.parent_id)
            .execute(&mut *tx)
            .await?;

        let moved = fetch_node(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!(id, layout, parent_id = ?target.parent_id, "menu node moved");
        Ok(moved)
    }

    async fn delete_menu_subtree(&self, id: i64) -> MenuResult<u64> {
        let layout = self.layout_of(id).await?;
        let mut tx = self.lock_layout(layout).await?;
        let node = fetch_node(&mut tx, id).await?;

        let removed =
            sqlx::query("DELETE FROM menus WHERE layout = $1 AND _lft >= $2 AND _rgt <= $3")
                .bind(layout)
                .bind(node.left_bound)
                .bind(node.right_bound)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        shift_from(&mut tx, layout, node.right_bound + 1, -nested_set::width(&node)).await?;

        tx.commit().await?;
        tracing::info!(id, layout, removed, "menu subtree deleted");
        Ok(removed)
    }

    async fn clear_menu_layout(&self, layout: i16) -> MenuResult<u64> {
        let mut tx = self.lock_layout(layout).await?;
        let removed = sqlx::query("DELETE FROM menus WHERE layout = $1")
            .bind(layout)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        tracing::info!(layout, removed, "menu layout cleared");
        Ok(removed)
    }

    /// replace_menu_layout
    ///
    /// Delete-then-insert inside one transaction. Any failure drops `tx` without a
    /// commit, which rolls the layout back to its pre-rebuild state.
    async fn replace_menu_layout(
        &self,
        layout: i16,
        plan: Vec<PlannedNode>,
    ) -> MenuResult<Vec<MenuNode>> {
        let mut tx = self.lock_layout(layout).await?;

        sqlx::query("DELETE FROM menus WHERE layout = $1")
            .bind(layout)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            r#"INSERT INTO menus (layout, name, properties, parent_id, _lft, _rgt, visibility, created_at, updated_at)
               VALUES ($1, $2::json, $3::json, $4, $5, $6, $7, NOW(), NOW())
               RETURNING {}"#,
            MENU_COLUMNS
        );
        let mut inserted: Vec<MenuNode> = Vec::with_capacity(plan.len());
        for planned in &plan {
            let parent_id = planned.parent.map(|index| inserted[index].id);
            let row = sqlx::query_as::<_, MenuRow>(&sql)
                .bind(layout)
                .bind(json_text(&planned.name)?)
                .bind(json_text(&planned.properties)?)
                .bind(parent_id)
                .bind(planned.left_bound)
                .bind(planned.right_bound)
                .bind(planned.visibility)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(row.into());
        }

        tx.commit().await?;
        tracing::info!(layout, inserted = inserted.len(), "menu layout rebuilt");
        Ok(inserted)
    }

    /// update_menu_node
    ///
    /// Single-row patch of non-structural fields; uses `COALESCE` so absent fields
    /// keep their value. No layout lock, bounds are never touched.
    async fn update_menu_node(&self, id: i64, patch: MenuNodePatch) -> MenuResult<MenuNode> {
        let sql = format!(
            r#"UPDATE menus
               SET name = COALESCE($2::json, name),
                   properties = COALESCE($3::json, properties),
                   visibility = COALESCE($4, visibility),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            MENU_COLUMNS
        );
        sqlx::query_as::<_, MenuRow>(&sql)
            .bind(id)
            .bind(patch.name.as_ref().map(json_text).transpose()?)
            .bind(patch.properties.as_ref().map(json_text).transpose()?)
            .bind(patch.visibility)
            .fetch_optional(&self.pool)
            .await?
            .map(MenuNode::from)
            .ok_or(MenuError::NotFound(id))
    }
}
