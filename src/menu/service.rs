use serde_json::Value;

use crate::{
    access::AccessGateState,
    auth::AuthUser,
    error::{MenuError, MenuResult},
    menu::{nested_set, rebuild, tree},
    models::{
        AdminMenuNode, DeletedNodes, IntegrityReport, MenuNode, MenuNodePatch, MoveMenuNode,
        NewMenuNode, PublicMenuNode, RebuildRequest,
    },
    repository::RepositoryState,
};

/// MenuService
///
/// Entry point for every menu operation. Each call takes the principal (and, for the
/// public tree, the language) explicitly, asks the gate, validates the payload and
/// only then touches the repository.
#[derive(Clone)]
pub struct MenuService {
    repo: RepositoryState,
    gate: AccessGateState,
    default_language: String,
}

impl MenuService {
    pub fn new(
        repo: RepositoryState,
        gate: AccessGateState,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            gate,
            default_language: default_language.into(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    fn require_editor(&self, principal: &AuthUser, action: &'static str) -> MenuResult<()> {
        if self.gate.can_mutate_menus(principal) {
            return Ok(());
        }
        tracing::warn!(user_id = %principal.id, role = %principal.role, action, "menu write denied");
        Err(MenuError::AccessDenied(action))
    }

    // --- Reads ---

    /// public_tree
    ///
    /// Visible nodes of `layout` with names resolved for `lang` and page targets
    /// resolved to public paths.
    pub async fn public_tree(&self, layout: i16, lang: &str) -> MenuResult<Vec<PublicMenuNode>> {
        let rows = self.repo.list_menu_nodes(layout, false).await?;
        let page_paths = self
            .repo
            .page_slugs(&tree::referenced_pages(&rows))
            .await?;
        Ok(tree::public_forest(
            &rows,
            lang,
            &self.default_language,
            &page_paths,
        ))
    }

    /// Full admin tree of `layout`; hidden nodes only when the gate allows it.
    pub async fn admin_tree(
        &self,
        principal: &AuthUser,
        layout: i16,
    ) -> MenuResult<Vec<AdminMenuNode>> {
        let include_hidden = self.gate.can_read_hidden(principal);
        let rows = self.repo.list_menu_nodes(layout, include_hidden).await?;
        Ok(tree::admin_forest(&rows))
    }

    /// A single node. Hidden nodes are reported as missing to principals that may not
    /// read them.
    pub async fn get(&self, principal: &AuthUser, id: i64) -> MenuResult<MenuNode> {
        let node = self
            .repo
            .get_menu_node(id)
            .await?
            .ok_or(MenuError::NotFound(id))?;
        if !node.visibility && !self.gate.can_read_hidden(principal) {
            return Err(MenuError::NotFound(id));
        }
        Ok(node)
    }

    /// integrity
    ///
    /// Re-checks every nested-set invariant of `layout` against the stored rows.
    pub async fn integrity(&self, principal: &AuthUser, layout: i16) -> MenuResult<IntegrityReport> {
        if !self.gate.can_read_hidden(principal) {
            tracing::warn!(user_id = %principal.id, layout, "integrity check denied");
            return Err(MenuError::AccessDenied("inspect menu layouts"));
        }
        let rows = self.repo.list_menu_nodes(layout, true).await?;
        let issues = nested_set::verify_layout(&rows);
        if !issues.is_empty() {
            tracing::error!(layout, issues = issues.len(), "menu layout failed integrity check");
        }
        Ok(IntegrityReport {
            layout,
            node_count: rows.len(),
            issues,
        })
    }

    // --- Writes ---

    pub async fn create(&self, principal: &AuthUser, node: NewMenuNode) -> MenuResult<MenuNode> {
        self.require_editor(principal, "create menu nodes")?;
        rebuild::validate_name(&node.name, "node")?;
        validate_optional_properties(&node.properties, "node")?;
        self.repo.create_menu_node(node).await
    }

    /// Field update. Bounds and parent never change here.
    pub async fn update(
        &self,
        principal: &AuthUser,
        id: i64,
        patch: MenuNodePatch,
    ) -> MenuResult<MenuNode> {
        self.require_editor(principal, "update menu nodes")?;
        if patch.is_empty() {
            return Err(MenuError::validation(
                "patch",
                "at least one of name, properties or visibility is required",
            ));
        }
        if let Some(name) = &patch.name {
            rebuild::validate_name(name, "patch")?;
        }
        if let Some(properties) = &patch.properties {
            validate_optional_properties(properties, "patch")?;
        }
        self.repo.update_menu_node(id, patch).await
    }

    pub async fn move_node(
        &self,
        principal: &AuthUser,
        id: i64,
        target: MoveMenuNode,
    ) -> MenuResult<MenuNode> {
        self.require_editor(principal, "move menu nodes")?;
        self.repo.move_menu_node(id, target).await
    }

    pub async fn delete(&self, principal: &AuthUser, id: i64) -> MenuResult<DeletedNodes> {
        self.require_editor(principal, "delete menu nodes")?;
        let removed = self.repo.delete_menu_subtree(id).await?;
        Ok(DeletedNodes { removed })
    }

    pub async fn clear(&self, principal: &AuthUser, layout: i16) -> MenuResult<DeletedNodes> {
        self.require_editor(principal, "clear menu layouts")?;
        let removed = self.repo.clear_menu_layout(layout).await?;
        Ok(DeletedNodes { removed })
    }

    /// rebuild
    ///
    /// Validates the whole forest, replaces the layout in one atomic step and returns
    /// the admin tree of exactly the rows that step committed. Nothing is written if
    /// validation fails.
    pub async fn rebuild(
        &self,
        principal: &AuthUser,
        request: RebuildRequest,
    ) -> MenuResult<Vec<AdminMenuNode>> {
        self.require_editor(principal, "rebuild menu layouts")?;
        rebuild::validate_forest(&request.items)?;

        let plan = rebuild::plan_forest(&request.items);
        let rows = self.repo.replace_menu_layout(request.layout, plan).await?;
        Ok(tree::admin_forest(&rows))
    }
}

/// Single-node writes may omit properties entirely; when present they follow the
/// rebuild rules.
fn validate_optional_properties(properties: &Value, path: &str) -> MenuResult<()> {
    if properties.is_null() {
        return Ok(());
    }
    rebuild::validate_properties(properties, path)
}
