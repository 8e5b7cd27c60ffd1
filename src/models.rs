use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::localized::LocalizedText;

// --- Identity ---

/// User
///
/// The principal record resolved during authentication (`profiles` table).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // 'superadmin' | 'admin' | 'manager' | '' (regular user)
    pub role: String,
}

/// UserProfile
///
/// Output schema for GET /me.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    /// Whether this principal may edit menus.
    pub can_edit_menus: bool,
}

// --- Menu Nodes ---

/// MenuNode
///
/// One persisted navigation node. `left_bound`/`right_bound` are the nested-set
/// coordinates; they are owned by the store and never accepted from callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuNode {
    pub id: i64,
    pub layout: i16,
    #[ts(type = "Record<string, string>")]
    #[schema(value_type = Object)]
    pub name: LocalizedText,
    #[ts(type = "Record<string, unknown>")]
    #[schema(value_type = Object)]
    pub properties: Value,
    pub parent_id: Option<i64>,
    #[serde(rename = "_lft")]
    pub left_bound: i32,
    #[serde(rename = "_rgt")]
    pub right_bound: i32,
    pub visibility: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl MenuNode {
    /// True when `other` lies strictly inside this node's interval.
    pub fn contains(&self, other: &MenuNode) -> bool {
        self.left_bound < other.left_bound && other.right_bound < self.right_bound
    }
}

/// NavTarget
///
/// The navigation target stored under `properties.target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
#[ts(export)]
pub enum NavTarget {
    Page { id: i64 },
    Link { url: String },
}

impl NavTarget {
    /// from_properties
    ///
    /// Reads `properties.target` leniently: a page id may be a JSON number or a numeric
    /// string. Anything else yields `None` (which renders as `"#"` publicly).
    pub fn from_properties(properties: &Value) -> Option<Self> {
        let target = properties.get("target")?;
        match target.get("type")?.as_str()? {
            "page" => page_id(target.get("id")?).map(|id| NavTarget::Page { id }),
            "link" => target
                .get("url")
                .and_then(Value::as_str)
                .map(|url| NavTarget::Link { url: url.to_string() }),
            _ => None,
        }
    }
}

/// Parses a page id from either `12` or `"12"`.
pub(crate) fn page_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Public path of a page, as linked from menus.
pub fn page_public_path(slug: &str) -> String {
    format!("/pages/{}", slug)
}

// --- Request Payloads ---

fn default_visibility() -> bool {
    true
}

/// NewMenuNode
///
/// Input payload for POST /admin/menus. The node is appended as the last child of
/// `parent_id` (or as the last root of `layout`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewMenuNode {
    pub layout: i16,
    #[ts(type = "Record<string, string>")]
    #[schema(value_type = Object)]
    pub name: LocalizedText,
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    #[schema(value_type = Object)]
    pub properties: Value,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
}

/// MenuNodePatch
///
/// Partial, non-structural update (PATCH /admin/menus/{id}). Bounds never change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MenuNodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "Record<string, string> | null")]
    #[schema(value_type = Option<Object>)]
    pub name: Option<LocalizedText>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "Record<string, unknown> | null")]
    #[schema(value_type = Option<Object>)]
    pub properties: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<bool>,
}

impl MenuNodePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.properties.is_none() && self.visibility.is_none()
    }
}

/// MoveMenuNode
///
/// Re-parenting request (PUT /admin/menus/{id}/position). `parent_id = null` moves the
/// node to the root level. `position` is the zero-based index among the new siblings;
/// absent or past the end means "append last".
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MoveMenuNode {
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub position: Option<usize>,
}

/// MenuItemInput
///
/// One node of a rebuild forest; `children` nests recursively.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuItemInput {
    #[ts(type = "Record<string, string>")]
    #[schema(value_type = Object)]
    pub name: LocalizedText,
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    #[schema(value_type = Object)]
    pub properties: Value,
    #[serde(default)]
    pub visibility: Option<bool>,
    #[serde(default)]
    #[schema(no_recursion)]
    pub children: Vec<MenuItemInput>,
}

/// RebuildRequest
///
/// Input payload for PUT /admin/menus/rebuild. Replaces the whole `layout`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RebuildRequest {
    pub layout: i16,
    pub items: Vec<MenuItemInput>,
}

// --- Output Schemas ---

/// AdminMenuNode
///
/// Full admin projection of a node with its nested children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminMenuNode {
    pub id: i64,
    pub layout: i16,
    pub parent_id: Option<i64>,
    #[serde(rename = "_lft")]
    pub left_bound: i32,
    #[serde(rename = "_rgt")]
    pub right_bound: i32,
    /// Number of ancestors (roots are at depth 0).
    pub depth: usize,
    #[ts(type = "Record<string, string>")]
    #[schema(value_type = Object)]
    pub name: LocalizedText,
    #[ts(type = "Record<string, unknown>")]
    #[schema(value_type = Object)]
    pub properties: Value,
    pub visibility: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[schema(no_recursion)]
    pub children: Vec<AdminMenuNode>,
}

/// PublicMenuNode
///
/// Curated public projection: resolved name and url only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicMenuNode {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[schema(no_recursion)]
    pub children: Vec<PublicMenuNode>,
}

/// DeletedNodes
///
/// Output of delete and clear operations.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DeletedNodes {
    pub removed: u64,
}

/// IntegrityReport
///
/// Result of GET /admin/menus/integrity. An empty `issues` list means the layout
/// satisfies every nested-set invariant.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct IntegrityReport {
    pub layout: i16,
    pub node_count: usize,
    pub issues: Vec<String>,
}
