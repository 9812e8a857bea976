use std::collections::HashSet;

use crate::core::error::{AppError, Result};
use crate::features::categories::models::{Category, CreateCategory};
use crate::features::categories::services::path_propagator::{PathPropagator, PropagationReport};
use crate::modules::persistence::{CatalogRepository, CategoryRepository};
use crate::shared::constants::PATH_SEPARATOR;

/// Parent reference handed to path computation
#[derive(Debug, Clone, Copy)]
pub enum ParentRef<'a> {
    /// A row already in hand. Its `full_path` is trusted only when the slug is
    /// populated; an empty slug marks a reference that carries just the id.
    Loaded(&'a Category),
    /// Only the id is known, so the stored row is fetched
    Id(i64),
}

impl ParentRef<'_> {
    pub fn id(&self) -> i64 {
        match self {
            ParentRef::Loaded(p) => p.id,
            ParentRef::Id(id) => *id,
        }
    }
}

/// Path computation and structural checks for the category tree
pub struct CategoryTree;

impl CategoryTree {
    /// Append `slug` to a parent path, or build a root path when there is none
    pub fn join(parent_path: Option<&str>, slug: &str) -> String {
        match parent_path {
            Some(parent) => format!("{}{}{}", parent, slug, PATH_SEPARATOR),
            None => format!("{}{}{}", PATH_SEPARATOR, slug, PATH_SEPARATOR),
        }
    }

    /// Compute the materialized path for a node with `slug` under `parent`
    pub async fn compute_path<T>(
        tx: &mut T,
        slug: &str,
        parent: Option<ParentRef<'_>>,
    ) -> Result<String>
    where
        T: CategoryRepository,
    {
        let parent_path = match parent {
            None => None,
            Some(ParentRef::Loaded(p)) if !p.slug.is_empty() => Some(p.full_path.clone()),
            Some(ParentRef::Loaded(p)) => Some(Self::fetch_parent(tx, p.id).await?.full_path),
            Some(ParentRef::Id(id)) => Some(Self::fetch_parent(tx, id).await?.full_path),
        };

        Ok(Self::join(parent_path.as_deref(), slug))
    }

    /// Fill in `full_path` on a row that is about to be inserted
    pub async fn on_create<T>(
        tx: &mut T,
        data: &mut CreateCategory,
        parent: Option<ParentRef<'_>>,
    ) -> Result<()>
    where
        T: CategoryRepository,
    {
        let parent = match (parent, data.parent_id) {
            (None, declared) => declared.map(ParentRef::Id),
            (Some(p), Some(declared)) if p.id() == declared => Some(p),
            (Some(p), declared) => {
                return Err(AppError::Internal(format!(
                    "Parent reference {} does not match declared parent {:?}",
                    p.id(),
                    declared
                )));
            }
        };

        data.full_path = Self::compute_path(tx, &data.slug, parent).await?;
        Ok(())
    }

    /// Recompute the path of a persisted node after its fields changed.
    ///
    /// When the path moved, the new value is stored and pushed to every
    /// descendant and mirror. Returns `None` when nothing had to change.
    pub async fn on_update<T>(tx: &mut T, node: &mut Category) -> Result<Option<PropagationReport>>
    where
        T: CategoryRepository + CatalogRepository,
    {
        let parent = node.parent_id.map(ParentRef::Id);
        let path = Self::compute_path(tx, &node.slug, parent).await?;

        if path == node.full_path {
            return Ok(None);
        }

        tracing::debug!(
            "Category {} path changes: {} -> {}",
            node.id,
            node.full_path,
            path
        );
        tx.update_category_path(node.id, &path).await?;
        node.full_path = path;

        let mut report = PathPropagator::propagate(tx, node).await?;
        report.categories_updated += 1;
        Ok(Some(report))
    }

    /// Reject moving `node_id` under `new_parent_id` when that would make the
    /// node its own ancestor
    pub async fn ensure_acyclic<T>(tx: &mut T, node_id: i64, new_parent_id: i64) -> Result<()>
    where
        T: CategoryRepository,
    {
        let mut seen = HashSet::new();
        let mut cursor = Some(new_parent_id);

        while let Some(id) = cursor {
            if id == node_id {
                return Err(AppError::Validation(format!(
                    "Category {} cannot be moved under its own descendant {}",
                    node_id, new_parent_id
                )));
            }
            if !seen.insert(id) {
                return Err(AppError::Internal(format!(
                    "Parent chain of category {} loops at {}",
                    new_parent_id, id
                )));
            }
            cursor = Self::fetch_parent(tx, id).await?.parent_id;
        }

        Ok(())
    }

    async fn fetch_parent<T>(tx: &mut T, id: i64) -> Result<Category>
    where
        T: CategoryRepository,
    {
        tx.find_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Parent category {} not found", id)))
    }
}
