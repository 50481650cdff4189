pub mod aggregator;
pub mod errors;
pub mod persistence;
pub mod registry;
pub mod types;

pub use aggregator::list_projects;
pub use errors::ProjectError;
pub use registry::ProjectRegistry;
pub use types::{BaseProject, Project, derive_name};
