use std::collections::HashSet;

use crate::core::error::{AppError, Result};
use crate::modules::persistence::{CatalogRepository, CategoryRepository, MirrorTarget};

/// What a subtree deletion removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Category ids in the order their rows were deleted
    pub removed: Vec<i64>,
    /// Product and Store rows detached from a removed category
    pub mirrors_detached: u64,
}

enum Visit {
    Enter(i64),
    Exit(i64),
}

/// Removes a category subtree leaves first
pub struct DeletionCascade;

impl DeletionCascade {
    /// Delete every descendant of `node_id`, post-order, leaving `node_id`
    /// itself in place for the caller to remove.
    ///
    /// Mirror rows pointing at a doomed category are detached right before
    /// its row goes. Any failure aborts with [`AppError::CascadeFailure`] and
    /// the caller must roll back.
    pub async fn cascade_delete<T>(tx: &mut T, node_id: i64) -> Result<DeletionReport>
    where
        T: CategoryRepository + CatalogRepository,
    {
        let mut report = DeletionReport::default();
        let mut seen = HashSet::from([node_id]);
        let mut stack = Vec::new();

        Self::push_children(tx, node_id, &mut stack).await?;

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if !seen.insert(id) {
                        return Err(AppError::CascadeFailure(format!(
                            "category {} reached twice while deleting {}",
                            id, node_id
                        )));
                    }
                    stack.push(Visit::Exit(id));
                    Self::push_children(tx, id, &mut stack).await?;
                }
                Visit::Exit(id) => {
                    report.mirrors_detached += Self::detach_mirrors(tx, id)
                        .await
                        .map_err(|e| AppError::cascade(id, e))?;
                    tx.delete_category(id)
                        .await
                        .map_err(|e| AppError::cascade(id, e))?;
                    tracing::debug!("Deleted descendant category {} of {}", id, node_id);
                    report.removed.push(id);
                }
            }
        }

        Ok(report)
    }

    /// Clear the category reference on every mirror row pointing at `category_id`
    pub async fn detach_mirrors<T>(tx: &mut T, category_id: i64) -> Result<u64>
    where
        T: CatalogRepository,
    {
        let mut rows = 0;
        for target in MirrorTarget::ALL {
            rows += tx.clear_mirror(target, category_id).await?;
        }
        Ok(rows)
    }

    async fn push_children<T>(tx: &mut T, parent_id: i64, stack: &mut Vec<Visit>) -> Result<()>
    where
        T: CategoryRepository,
    {
        let children = tx
            .find_children(Some(parent_id))
            .await
            .map_err(|e| AppError::cascade(parent_id, e))?;
        stack.extend(children.into_iter().rev().map(|c| Visit::Enter(c.id)));
        Ok(())
    }
}
