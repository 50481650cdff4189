//! Worktrees: the store of records and the lifecycle manager that mutates it.

pub mod errors;
mod locks;
pub mod manager;
pub mod persistence;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod validation;

pub use errors::WorktreeError;
pub use manager::WorktreeManager;
pub use reconcile::ReconcileReport;
pub use store::WorktreeStore;
pub use types::{WorktreeKey, WorktreeRecord, WorktreeState};
