use thiserror::Error;

/// Result alias for every menu operation.
pub type MenuResult<T> = Result<T, MenuError>;

/// MenuError
///
/// The failure taxonomy of the menu core. Structural errors abort the enclosing
/// transaction and reach the caller unchanged; only `Storage` carries a lower-level
/// cause. The HTTP layer decides the status code (see `handlers`).
#[derive(Debug, Error)]
pub enum MenuError {
    /// A referenced node (or parent) does not exist.
    #[error("menu node {0} not found")]
    NotFound(i64),

    /// A parent reference crosses layouts.
    #[error("parent {parent} belongs to layout {parent_layout}, expected layout {layout}")]
    LayoutMismatch {
        layout: i16,
        parent: i64,
        parent_layout: i16,
    },

    /// The node would become its own ancestor.
    #[error("moving node {node} under {new_parent} would create a cycle")]
    CycleDetected { node: i64, new_parent: i64 },

    /// Malformed payload. `path` points at the offending value, e.g.
    /// `items[0].children[1].properties.target.id`.
    #[error("invalid value at {path}: {message}")]
    Validation { path: String, message: String },

    /// Another structural write on the same layout won the race.
    #[error("conflicting menu update: {0}")]
    Conflict(String),

    /// The principal may not perform this operation.
    #[error("access denied: {0}")]
    AccessDenied(&'static str),

    /// Any other persistence failure.
    #[error("storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MenuError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        MenuError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn storage(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        MenuError::Storage(cause.into())
    }
}

// SQLSTATEs that mean "someone else touched these rows first".
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

impl From<sqlx::Error> for MenuError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if matches!(
                    code.as_ref(),
                    SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE
                ) {
                    return MenuError::Conflict(db_err.message().to_string());
                }
            }
        }
        MenuError::Storage(Box::new(err))
    }
}
