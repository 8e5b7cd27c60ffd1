//! The menu core: nested-set arithmetic, rebuild planning, tree materialization and
//! the service that ties them to a repository and an access gate.

pub mod nested_set;
pub mod rebuild;
pub mod service;
pub mod tree;

pub use service::MenuService;
