//! Category tree with materialized paths.
//!
//! Every category stores its full ancestry as a slug path (`/raw/metal/`).
//! Products and Stores keep a copy of their category's path so catalog
//! queries can filter by "this category or any descendant" with a prefix
//! match.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`CategoryTree`] | Computes paths, rejects cycles |
//! | [`PathPropagator`] | Pushes a changed path to descendants and mirrors |
//! | [`DeletionCascade`] | Removes a subtree leaves first |
//! | [`CategoryService`] | Transactional create/update/delete and reads |

pub mod dtos;
pub mod models;
pub mod services;

pub use services::{CategoryService, CategoryTree, DeletionCascade, PathPropagator};
