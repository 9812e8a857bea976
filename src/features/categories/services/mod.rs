mod category_service;
mod category_tree;
mod deletion_cascade;
mod path_propagator;

pub use category_service::CategoryService;
pub use category_tree::{CategoryTree, ParentRef};
pub use deletion_cascade::{DeletionCascade, DeletionReport};
pub use path_propagator::{PathPropagator, PropagationReport};
