use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{CatalogRepository, CategoryRepository, DataTx, Datastore, MirrorTarget, RowLock};
use crate::core::error::{AppError, Result};
use crate::features::catalog::models::{CreateProduct, CreateStore, Product, Store};
use crate::features::categories::models::{Category, CategoryFields, CreateCategory};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Convert database error to more specific AppError with user-friendly messages
fn handle_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let message = match db_err.constraint() {
                Some("categories_slug_unique") => "A category with this slug already exists",
                Some("categories_sibling_name_unique") => {
                    "A sibling category with this name already exists"
                }
                Some("products_sku_unique") => "A product with this SKU already exists",
                Some("stores_code_unique") => "A store with this code already exists",
                _ => "Record violates a uniqueness constraint",
            };
            return AppError::Conflict(message.to_string());
        }

        if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return AppError::NotFound("Referenced record does not exist".to_string());
        }
    }

    tracing::error!("Database error: {:?}", e);
    AppError::Database(e)
}

/// Escape LIKE wildcards and append `%` for a prefix match
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Postgres-backed datastore
#[derive(Clone)]
pub struct PgDatastore {
    pool: PgPool,
}

impl PgDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDatastore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to begin transaction: {:?}", e);
            AppError::Database(e)
        })?;
        Ok(PgTx { tx })
    }
}

/// An open Postgres transaction. Rolled back on drop unless committed.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DataTx for PgTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit transaction: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(|e| {
            tracing::error!("Failed to roll back transaction: {:?}", e);
            AppError::Database(e)
        })
    }
}

#[async_trait]
impl CategoryRepository for PgTx {
    async fn find_category(&mut self, id: i64) -> Result<Option<Category>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            FROM categories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn lock_category(&mut self, id: i64, lock: RowLock) -> Result<Option<Category>> {
        let sql = format!(
            r#"
            SELECT id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            FROM categories
            WHERE id = $1
            {}
            "#,
            lock.clause()
        );

        sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(handle_db_error)
    }

    async fn find_category_by_slug(&mut self, slug: &str) -> Result<Option<Category>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            FROM categories
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn find_children(&mut self, parent_id: Option<i64>) -> Result<Vec<Category>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            FROM categories
            WHERE parent_id IS NOT DISTINCT FROM $1
            ORDER BY display_order, name, id
            "#,
        )
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn find_by_path_prefix(&mut self, prefix: &str) -> Result<Vec<Category>> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            FROM categories
            WHERE full_path LIKE $1
            ORDER BY full_path
            "#,
        )
        .bind(like_prefix(prefix))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn insert_category(&mut self, data: &CreateCategory) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (parent_id, name, slug, full_path, description, status, display_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            "#,
        )
        .bind(data.parent_id)
        .bind(&data.name)
        .bind(&data.slug)
        .bind(&data.full_path)
        .bind(&data.description)
        .bind(data.status)
        .bind(data.display_order)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn update_category_fields(
        &mut self,
        id: i64,
        fields: &CategoryFields,
    ) -> Result<Option<Category>> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET parent_id = $2,
                name = $3,
                slug = $4,
                description = $5,
                status = $6,
                display_order = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, parent_id, name, slug, full_path, description, status, display_order, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(fields.parent_id)
        .bind(&fields.name)
        .bind(&fields.slug)
        .bind(&fields.description)
        .bind(fields.status)
        .bind(fields.display_order)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn update_category_path(&mut self, id: i64, full_path: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET full_path = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(full_path)
        .execute(&mut *self.tx)
        .await
        .map_err(handle_db_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category {} not found", id)));
        }

        Ok(())
    }

    async fn delete_category(&mut self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match handle_db_error(e) {
                AppError::NotFound(_) => {
                    AppError::Conflict(format!("Category {} is still referenced", id))
                }
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category {} not found", id)));
        }

        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for PgTx {
    async fn insert_product(&mut self, data: &CreateProduct) -> Result<Product> {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (sku, name, category_id, category_path)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sku, name, category_id, category_path, created_at, updated_at
            "#,
        )
        .bind(&data.sku)
        .bind(&data.name)
        .bind(data.category_id)
        .bind(&data.category_path)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn find_product(&mut self, id: i64) -> Result<Option<Product>> {
        sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, category_id, category_path, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn set_product_category(
        &mut self,
        id: i64,
        category_id: Option<i64>,
        category_path: Option<&str>,
    ) -> Result<Option<Product>> {
        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET category_id = $2, category_path = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, sku, name, category_id, category_path, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(category_id)
        .bind(category_path)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn find_products_by_path_prefix(
        &mut self,
        prefix: &str,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Product>, i64)> {
        let pattern = like_prefix(prefix);

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_path LIKE $1")
                .bind(&pattern)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(handle_db_error)?;

        let items = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, category_id, category_path, created_at, updated_at
            FROM products
            WHERE category_path LIKE $1
            ORDER BY category_path, name, id
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(&pattern)
        .bind(offset)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(handle_db_error)?;

        Ok((items, total))
    }

    async fn insert_store(&mut self, data: &CreateStore) -> Result<Store> {
        sqlx::query_as::<_, Store>(
            r#"
            INSERT INTO stores (code, name, address, category_id, category_path)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, code, name, address, category_id, category_path, created_at, updated_at
            "#,
        )
        .bind(&data.code)
        .bind(&data.name)
        .bind(&data.address)
        .bind(data.category_id)
        .bind(&data.category_path)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn find_store(&mut self, id: i64) -> Result<Option<Store>> {
        sqlx::query_as::<_, Store>(
            r#"
            SELECT id, code, name, address, category_id, category_path, created_at, updated_at
            FROM stores
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn set_store_category(
        &mut self,
        id: i64,
        category_id: Option<i64>,
        category_path: Option<&str>,
    ) -> Result<Option<Store>> {
        sqlx::query_as::<_, Store>(
            r#"
            UPDATE stores
            SET category_id = $2, category_path = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, code, name, address, category_id, category_path, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(category_id)
        .bind(category_path)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn find_stores_by_path_prefix(&mut self, prefix: &str) -> Result<Vec<Store>> {
        sqlx::query_as::<_, Store>(
            r#"
            SELECT id, code, name, address, category_id, category_path, created_at, updated_at
            FROM stores
            WHERE category_path LIKE $1
            ORDER BY category_path, name, id
            "#,
        )
        .bind(like_prefix(prefix))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(handle_db_error)
    }

    async fn mirror_path(
        &mut self,
        target: MirrorTarget,
        category_id: i64,
        category_path: &str,
    ) -> Result<u64> {
        // Table names come from a closed enum, never from input
        let sql = format!(
            "UPDATE {} SET category_path = $2, updated_at = NOW() WHERE category_id = $1",
            target.table()
        );

        let result = sqlx::query(&sql)
            .bind(category_id)
            .bind(category_path)
            .execute(&mut *self.tx)
            .await
            .map_err(handle_db_error)?;

        Ok(result.rows_affected())
    }

    async fn clear_mirror(&mut self, target: MirrorTarget, category_id: i64) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET category_id = NULL, category_path = NULL, updated_at = NOW() WHERE category_id = $1",
            target.table()
        );

        let result = sqlx::query(&sql)
            .bind(category_id)
            .execute(&mut *self.tx)
            .await
            .map_err(handle_db_error)?;

        Ok(result.rows_affected())
    }
}
