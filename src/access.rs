use std::sync::Arc;

use crate::auth::AuthUser;

/// Roles allowed to restructure menus unless configured otherwise.
pub const DEFAULT_EDITOR_ROLES: [&str; 3] = ["superadmin", "admin", "manager"];

/// AccessGate
///
/// Capability checks the menu core asks before reading hidden nodes or writing
/// anything. The principal is whatever the auth layer resolved; the gate decides.
pub trait AccessGate: Send + Sync {
    /// May `principal` see nodes with `visibility = false`?
    fn can_read_hidden(&self, principal: &AuthUser) -> bool;
    /// May `principal` create, move, update, delete or rebuild menu nodes?
    fn can_mutate_menus(&self, principal: &AuthUser) -> bool;
}

/// AccessGateState
///
/// Shared handle stored in the application state.
pub type AccessGateState = Arc<dyn AccessGate>;

/// RoleGate
///
/// Role-based gate: every authenticated principal reads hidden nodes, only the
/// editor roles mutate.
#[derive(Debug, Clone)]
pub struct RoleGate {
    editor_roles: Vec<String>,
}

impl RoleGate {
    pub fn new<I, S>(editor_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            editor_roles: editor_roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for RoleGate {
    fn default() -> Self {
        Self::new(DEFAULT_EDITOR_ROLES)
    }
}

impl AccessGate for RoleGate {
    fn can_read_hidden(&self, _principal: &AuthUser) -> bool {
        true
    }

    fn can_mutate_menus(&self, principal: &AuthUser) -> bool {
        self.editor_roles.iter().any(|role| *role == principal.role)
    }
}
