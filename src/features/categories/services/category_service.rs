use validator::Validate;

use crate::core::config::CategoryConfig;
use crate::core::error::{AppError, Result};
use crate::features::categories::dtos::{
    CategoryResponseDto, CategoryTreeDto, CreateCategoryDto, PathDrift, UpdateCategoryDto,
};
use crate::features::categories::models::{path_depth, Category, CreateCategory};
use crate::features::categories::services::category_tree::{CategoryTree, ParentRef};
use crate::features::categories::services::deletion_cascade::{DeletionCascade, DeletionReport};
use crate::features::categories::services::path_propagator::{PathPropagator, PropagationReport};
use crate::modules::persistence::{finish_tx, CategoryRepository, Datastore, RowLock};

/// Service for category operations.
///
/// Every write runs in one transaction: the node, its descendants and every
/// mirror row either all change or none do.
pub struct CategoryService<D: Datastore> {
    store: D,
    max_depth: usize,
}

impl<D: Datastore> CategoryService<D> {
    pub fn new(store: D, config: &CategoryConfig) -> Self {
        Self {
            store,
            max_depth: config.max_depth,
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Create a category under an optional parent
    pub async fn create(&self, dto: CreateCategoryDto) -> Result<CategoryResponseDto> {
        dto.validate()?;

        let mut tx = self.store.begin().await?;
        let result = self.create_in(&mut tx, dto).await;
        let category = finish_tx(tx, result, "category create").await?;

        tracing::info!(
            "Category created: id={}, path={}",
            category.id,
            category.full_path
        );

        Ok(category.into())
    }

    /// Update attributes and optionally move or rename a category.
    ///
    /// A changed slug or parent recomputes the path and propagates it to the
    /// whole subtree and its mirrors.
    pub async fn update(&self, id: i64, dto: UpdateCategoryDto) -> Result<CategoryResponseDto> {
        dto.validate()?;

        let mut tx = self.store.begin().await?;
        let result = self.update_in(&mut tx, id, dto).await;
        let category = finish_tx(tx, result, "category update").await?;

        tracing::info!(
            "Category updated: id={}, path={}",
            category.id,
            category.full_path
        );

        Ok(category.into())
    }

    /// Delete a category together with its whole subtree
    pub async fn delete(&self, id: i64) -> Result<DeletionReport> {
        let mut tx = self.store.begin().await?;
        let result = self.delete_in(&mut tx, id).await;
        let report = finish_tx(tx, result, "category delete").await?;

        tracing::info!(
            "Category deleted: id={}, removed={}, mirrors_detached={}",
            id,
            report.removed.len(),
            report.mirrors_detached
        );

        Ok(report)
    }

    async fn create_in(&self, tx: &mut D::Tx, dto: CreateCategoryDto) -> Result<Category> {
        if tx.find_category_by_slug(&dto.slug).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Category with slug '{}' already exists",
                dto.slug
            )));
        }

        let parent = match dto.parent_id {
            Some(parent_id) => Some(Self::lock_parent(tx, parent_id).await?),
            None => None,
        };

        Self::ensure_unique_name(tx, dto.parent_id, &dto.name, None).await?;
        self.ensure_depth(parent.as_ref().map_or(0, Category::depth) + 1)?;

        let mut data = CreateCategory {
            parent_id: dto.parent_id,
            name: dto.name,
            slug: dto.slug,
            full_path: String::new(),
            description: dto.description,
            status: dto.status,
            display_order: dto.display_order,
        };
        CategoryTree::on_create(tx, &mut data, parent.as_ref().map(ParentRef::Loaded)).await?;

        tx.insert_category(&data).await
    }

    async fn update_in(
        &self,
        tx: &mut D::Tx,
        id: i64,
        dto: UpdateCategoryDto,
    ) -> Result<Category> {
        let current = Self::lock_for_write(tx, id).await?;

        let mut fields = current.fields();
        if let Some(name) = dto.name {
            fields.name = name;
        }
        if let Some(slug) = dto.slug {
            fields.slug = slug;
        }
        if let Some(description) = dto.description {
            fields.description = description;
        }
        if let Some(status) = dto.status {
            fields.status = status;
        }
        if let Some(display_order) = dto.display_order {
            fields.display_order = display_order;
        }
        if let Some(parent_id) = dto.parent_id {
            fields.parent_id = parent_id;
        }

        let moved = fields.parent_id != current.parent_id;

        if fields.slug != current.slug {
            if let Some(other) = tx.find_category_by_slug(&fields.slug).await? {
                if other.id != id {
                    return Err(AppError::Conflict(format!(
                        "Category with slug '{}' already exists",
                        fields.slug
                    )));
                }
            }
        }

        if moved {
            let parent_depth = match fields.parent_id {
                Some(parent_id) if parent_id == id => {
                    return Err(AppError::Validation(format!(
                        "Category {} cannot be its own parent",
                        id
                    )));
                }
                Some(parent_id) => {
                    let parent = Self::lock_parent(tx, parent_id).await?;
                    CategoryTree::ensure_acyclic(tx, id, parent_id).await?;
                    parent.depth()
                }
                None => 0,
            };

            let height = Self::subtree_height(tx, &current).await?;
            self.ensure_depth(parent_depth + 1 + height)?;
        }

        if moved || fields.name != current.name {
            Self::ensure_unique_name(tx, fields.parent_id, &fields.name, Some(id)).await?;
        }

        let mut updated = tx
            .update_category_fields(id, &fields)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;

        if let Some(report) = CategoryTree::on_update(tx, &mut updated).await? {
            tracing::info!(
                "Category {} moved to {}: {} paths and {} mirror rows rewritten",
                id,
                updated.full_path,
                report.categories_updated,
                report.mirrors_updated
            );
        }

        Ok(updated)
    }

    async fn delete_in(&self, tx: &mut D::Tx, id: i64) -> Result<DeletionReport> {
        Self::lock_for_write(tx, id).await?;

        let mut report = DeletionCascade::cascade_delete(tx, id).await?;
        report.mirrors_detached += DeletionCascade::detach_mirrors(tx, id).await?;
        tx.delete_category(id).await?;
        report.removed.push(id);

        Ok(report)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Get category by id
    pub async fn get(&self, id: i64) -> Result<CategoryResponseDto> {
        let mut tx = self.store.begin().await?;
        let result = Self::find(&mut tx, id).await;
        let category = finish_tx(tx, result, "category get").await?;
        Ok(category.into())
    }

    /// Get category by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<CategoryResponseDto> {
        let mut tx = self.store.begin().await?;
        let result = tx.find_category_by_slug(slug).await;
        let category = finish_tx(tx, result, "category get by slug").await?;

        category
            .map(|c| c.into())
            .ok_or_else(|| AppError::NotFound(format!("Category '{}' not found", slug)))
    }

    /// List all categories (flat list, ordered by path)
    pub async fn list(&self) -> Result<Vec<CategoryResponseDto>> {
        let categories = self.all().await?;
        Ok(categories.into_iter().map(|c| c.into()).collect())
    }

    /// List all categories as tree structure
    pub async fn list_tree(&self) -> Result<Vec<CategoryTreeDto>> {
        let categories = self.all().await?;
        Ok(CategoryTreeDto::build_tree(categories))
    }

    /// Every category below `id`, found by path prefix, ordered by path
    pub async fn descendants(&self, id: i64) -> Result<Vec<CategoryResponseDto>> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let node = Self::find(&mut tx, id).await?;
            tx.find_by_path_prefix(&node.full_path).await
        }
        .await;
        let rows = finish_tx(tx, result, "category descendants").await?;

        Ok(rows
            .into_iter()
            .filter(|c| c.id != id)
            .map(|c| c.into())
            .collect())
    }

    /// Ancestors of `id` from the root down, excluding the node itself
    pub async fn ancestors(&self, id: i64) -> Result<Vec<CategoryResponseDto>> {
        let mut tx = self.store.begin().await?;
        let result = self.ancestors_in(&mut tx, id).await;
        let chain = finish_tx(tx, result, "category ancestors").await?;
        Ok(chain.into_iter().map(|c| c.into()).collect())
    }

    async fn ancestors_in(&self, tx: &mut D::Tx, id: i64) -> Result<Vec<Category>> {
        let node = Self::find(tx, id).await?;
        let mut chain = Vec::new();
        let mut cursor = node.parent_id;

        while let Some(parent_id) = cursor {
            if chain.len() >= self.max_depth {
                return Err(AppError::Internal(format!(
                    "Parent chain of category {} exceeds the maximum depth",
                    id
                )));
            }
            let parent = Self::find_parent(tx, parent_id).await?;
            cursor = parent.parent_id;
            chain.push(parent);
        }

        chain.reverse();
        Ok(chain)
    }

    async fn all(&self) -> Result<Vec<Category>> {
        let mut tx = self.store.begin().await?;
        let result = tx.find_by_path_prefix("/").await;
        finish_tx(tx, result, "category list").await
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Report every category whose stored path disagrees with the path
    /// rebuilt from the roots. Writes nothing.
    pub async fn verify_paths(&self) -> Result<Vec<PathDrift>> {
        let mut tx = self.store.begin().await?;
        let result = Self::verify_in(&mut tx).await;
        finish_tx(tx, result, "category path verification").await
    }

    async fn verify_in(tx: &mut D::Tx) -> Result<Vec<PathDrift>> {
        let mut drift = Vec::new();
        let mut stack: Vec<(Category, String)> = tx
            .find_children(None)
            .await?
            .into_iter()
            .rev()
            .map(|root| {
                let expected = CategoryTree::join(None, &root.slug);
                (root, expected)
            })
            .collect();

        while let Some((node, expected)) = stack.pop() {
            for child in tx.find_children(Some(node.id)).await?.into_iter().rev() {
                let child_expected = CategoryTree::join(Some(&expected), &child.slug);
                stack.push((child, child_expected));
            }

            if node.full_path != expected {
                drift.push(PathDrift {
                    id: node.id,
                    stored: node.full_path,
                    expected,
                });
            }
        }

        Ok(drift)
    }

    /// Rewrite every root path and propagate it through the whole forest
    pub async fn repair_paths(&self) -> Result<PropagationReport> {
        let mut tx = self.store.begin().await?;
        let result = Self::repair_in(&mut tx).await;
        let report = finish_tx(tx, result, "category path repair").await?;

        tracing::info!(
            "Category paths repaired: {} categories, {} mirror rows",
            report.categories_updated,
            report.mirrors_updated
        );

        Ok(report)
    }

    async fn repair_in(tx: &mut D::Tx) -> Result<PropagationReport> {
        let mut report = PropagationReport::default();

        for mut root in tx.find_children(None).await? {
            let expected = CategoryTree::join(None, &root.slug);
            if root.full_path != expected {
                tx.update_category_path(root.id, &expected).await?;
                root.full_path = expected;
                report.categories_updated += 1;
            }
            report += PathPropagator::propagate(tx, &root).await?;
        }

        Ok(report)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn find(tx: &mut D::Tx, id: i64) -> Result<Category> {
        tx.find_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))
    }

    /// Share-lock a parent so its path cannot change before the child is written
    async fn lock_parent(tx: &mut D::Tx, id: i64) -> Result<Category> {
        tx.lock_category(id, RowLock::Share)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Parent category {} not found", id)))
    }

    /// Lock the current parent, then the node itself, so that writers always
    /// lock top-down
    async fn lock_for_write(tx: &mut D::Tx, id: i64) -> Result<Category> {
        let seen = Self::find(tx, id).await?;
        if let Some(parent_id) = seen.parent_id {
            Self::lock_parent(tx, parent_id).await?;
        }

        let locked = tx
            .lock_category(id, RowLock::Update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;
        if locked.parent_id != seen.parent_id {
            return Err(AppError::Conflict(format!(
                "Category {} was moved by another transaction",
                id
            )));
        }

        Ok(locked)
    }

    async fn find_parent(tx: &mut D::Tx, id: i64) -> Result<Category> {
        tx.find_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Parent category {} not found", id)))
    }

    async fn ensure_unique_name(
        tx: &mut D::Tx,
        parent_id: Option<i64>,
        name: &str,
        exclude: Option<i64>,
    ) -> Result<()> {
        let siblings = tx.find_children(parent_id).await?;
        if siblings
            .iter()
            .any(|s| s.name == name && Some(s.id) != exclude)
        {
            return Err(AppError::Conflict(format!(
                "A sibling category named '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    /// Levels below `node`; a leaf has height 0
    async fn subtree_height(tx: &mut D::Tx, node: &Category) -> Result<usize> {
        let deepest = tx
            .find_by_path_prefix(&node.full_path)
            .await?
            .iter()
            .map(|c| path_depth(&c.full_path))
            .max()
            .unwrap_or_else(|| node.depth());
        Ok(deepest.saturating_sub(node.depth()))
    }

    fn ensure_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(AppError::Validation(format!(
                "Category depth {} exceeds the maximum of {}",
                depth, self.max_depth
            )));
        }
        Ok(())
    }
}
