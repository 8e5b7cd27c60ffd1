//! Router Module Index
//!
//! Routes are split by who may reach them. Authentication is enforced with a
//! router layer; menu permissions are decided by the access gate inside the service.

/// Anonymous, read-only routes.
pub mod public;

/// Routes that only need a resolved principal.
pub mod authenticated;

/// Menu administration, nested under `/admin`.
pub mod admin;
