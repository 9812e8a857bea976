use std::collections::HashSet;

use crate::core::error::{AppError, Result};
use crate::features::categories::models::Category;
use crate::features::categories::services::category_tree::CategoryTree;
use crate::modules::persistence::{CatalogRepository, CategoryRepository, MirrorTarget};

/// What a propagation touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Category rows whose `full_path` was written
    pub categories_updated: usize,
    /// Product and Store rows whose `category_path` was rewritten
    pub mirrors_updated: u64,
}

impl std::ops::AddAssign for PropagationReport {
    fn add_assign(&mut self, other: Self) {
        self.categories_updated += other.categories_updated;
        self.mirrors_updated += other.mirrors_updated;
    }
}

/// Pushes a finalized category path down the subtree and into mirror tables
pub struct PathPropagator;

impl PathPropagator {
    /// Make every descendant of `node`, and every mirror record pointing at
    /// `node` or a descendant, agree with `node.full_path`.
    ///
    /// Traversal is depth-first pre-order on an explicit stack: each child's
    /// path is written, then its whole subtree, before the next sibling. The
    /// caller has already stored `node.full_path`. The first failing
    /// write aborts the walk with [`AppError::CascadeFailure`]; the caller owns
    /// the transaction and must roll it back.
    pub async fn propagate<T>(tx: &mut T, node: &Category) -> Result<PropagationReport>
    where
        T: CategoryRepository + CatalogRepository,
    {
        let mut report = PropagationReport::default();
        let mut visited = HashSet::new();
        // (category id, path to store, whether the row still needs the write)
        let mut stack = vec![(node.id, node.full_path.clone(), false)];

        while let Some((id, path, pending)) = stack.pop() {
            if !visited.insert(id) {
                return Err(AppError::CascadeFailure(format!(
                    "category {} reached twice while propagating from {}",
                    id, node.id
                )));
            }

            if pending {
                tx.update_category_path(id, &path)
                    .await
                    .map_err(|e| AppError::cascade(id, e))?;
                tracing::debug!("Propagated path to category {}: {}", id, path);
                report.categories_updated += 1;
            }

            report.mirrors_updated += Self::mirror(tx, id, &path)
                .await
                .map_err(|e| AppError::cascade(id, e))?;

            let children = tx
                .find_children(Some(id))
                .await
                .map_err(|e| AppError::cascade(id, e))?;

            // Reversed so the first child is popped first
            stack.extend(children.into_iter().rev().map(|child| {
                let child_path = CategoryTree::join(Some(&path), &child.slug);
                (child.id, child_path, true)
            }));
        }

        tracing::info!(
            "Path propagation from category {} updated {} categories and {} mirror rows",
            node.id,
            report.categories_updated,
            report.mirrors_updated
        );

        Ok(report)
    }

    /// Rewrite the mirrored path of one category in every mirror table
    pub async fn mirror<T>(tx: &mut T, category_id: i64, path: &str) -> Result<u64>
    where
        T: CatalogRepository,
    {
        let mut rows = 0;
        for target in MirrorTarget::ALL {
            rows += tx.mirror_path(target, category_id, path).await?;
        }
        Ok(rows)
    }
}
