//! Transactional storage seam for the category subsystem.
//!
//! Services never touch a connection pool directly. They open a transaction
//! through [`Datastore::begin`], run every read and write of one logical
//! operation against it, and then either commit or roll back. Dropping an
//! uncommitted transaction discards its writes.
//!
//! [`PgDatastore`] is the production implementation. The in-memory
//! implementation in [`memory`] is compiled for tests only.

mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::features::catalog::models::{CreateProduct, CreateStore, Product, Store};
use crate::features::categories::models::{Category, CategoryFields, CreateCategory};

pub use postgres::{PgDatastore, PgTx};

/// Catalog tables that carry a denormalized copy of a category path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorTarget {
    Product,
    Store,
}

impl MirrorTarget {
    pub const ALL: [MirrorTarget; 2] = [MirrorTarget::Product, MirrorTarget::Store];

    pub fn table(&self) -> &'static str {
        match self {
            MirrorTarget::Product => "products",
            MirrorTarget::Store => "stores",
        }
    }
}

impl std::fmt::Display for MirrorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// Row lock held until the owning transaction ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Taken on a category whose path is about to be copied. Blocks writers.
    Share,
    /// Taken on a category about to be changed or removed
    Update,
}

impl RowLock {
    pub fn clause(&self) -> &'static str {
        match self {
            RowLock::Share => "FOR SHARE",
            RowLock::Update => "FOR UPDATE",
        }
    }
}

/// Opens transactions
#[async_trait]
pub trait Datastore: Send + Sync {
    type Tx: DataTx;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// One open transaction over the category and catalog tables
#[async_trait]
pub trait DataTx: CategoryRepository + CatalogRepository + Send {
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// Category rows, scoped to a transaction
#[async_trait]
pub trait CategoryRepository: Send {
    async fn find_category(&mut self, id: i64) -> Result<Option<Category>>;

    /// Like `find_category`, but returns the latest committed row and locks
    /// it until the transaction ends. Parents are locked before children.
    async fn lock_category(&mut self, id: i64, lock: RowLock) -> Result<Option<Category>>;

    async fn find_category_by_slug(&mut self, slug: &str) -> Result<Option<Category>>;

    /// Direct children of `parent_id`, ordered by display order then name.
    /// `None` lists the roots.
    async fn find_children(&mut self, parent_id: Option<i64>) -> Result<Vec<Category>>;

    /// Every category whose path starts with `prefix`, ordered by path
    async fn find_by_path_prefix(&mut self, prefix: &str) -> Result<Vec<Category>>;

    async fn insert_category(&mut self, data: &CreateCategory) -> Result<Category>;

    /// Overwrite the attribute columns and parent link. `full_path` is left alone.
    async fn update_category_fields(
        &mut self,
        id: i64,
        fields: &CategoryFields,
    ) -> Result<Option<Category>>;

    /// Overwrite `full_path` only
    async fn update_category_path(&mut self, id: i64, full_path: &str) -> Result<()>;

    /// Remove one row. Fails if the row still has children.
    async fn delete_category(&mut self, id: i64) -> Result<()>;
}

/// Product and Store rows, scoped to a transaction
#[async_trait]
pub trait CatalogRepository: Send {
    async fn insert_product(&mut self, data: &CreateProduct) -> Result<Product>;

    async fn find_product(&mut self, id: i64) -> Result<Option<Product>>;

    async fn set_product_category(
        &mut self,
        id: i64,
        category_id: Option<i64>,
        category_path: Option<&str>,
    ) -> Result<Option<Product>>;

    async fn find_products_by_path_prefix(
        &mut self,
        prefix: &str,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Product>, i64)>;

    async fn insert_store(&mut self, data: &CreateStore) -> Result<Store>;

    async fn find_store(&mut self, id: i64) -> Result<Option<Store>>;

    async fn set_store_category(
        &mut self,
        id: i64,
        category_id: Option<i64>,
        category_path: Option<&str>,
    ) -> Result<Option<Store>>;

    async fn find_stores_by_path_prefix(&mut self, prefix: &str) -> Result<Vec<Store>>;

    /// Rewrite `category_path` on every row of `target` that references
    /// `category_id`. Returns the number of rows touched.
    async fn mirror_path(
        &mut self,
        target: MirrorTarget,
        category_id: i64,
        category_path: &str,
    ) -> Result<u64>;

    /// Clear `category_id` and `category_path` on every row of `target` that
    /// references `category_id`. Returns the number of rows touched.
    async fn clear_mirror(&mut self, target: MirrorTarget, category_id: i64) -> Result<u64>;
}

/// Commit `tx` when `result` is `Ok`, roll it back otherwise.
///
/// The operation's error is returned even if the rollback itself fails.
pub async fn finish_tx<T, V>(tx: T, result: Result<V>, action: &str) -> Result<V>
where
    T: DataTx,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tracing::error!("{} failed ({}): {}", action, e.kind(), e);
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(
                    "Rollback after failed {} also failed: {:?}",
                    action,
                    rollback_err
                );
            }
            Err(e)
        }
    }
}
