use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::features::catalog::dtos::{CreateProductDto, CreateStoreDto};
use crate::features::catalog::models::{CreateProduct, CreateStore, Product, Store};
use crate::features::categories::models::Category;
use crate::modules::persistence::{
    finish_tx, CatalogRepository, CategoryRepository, Datastore, RowLock,
};
use crate::shared::types::PaginationQuery;

/// Service for Product and Store rows and their category assignment
pub struct CatalogService<D: Datastore> {
    store: D,
}

impl<D: Datastore> CatalogService<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Create a product, copying the category path when a category is given
    pub async fn create_product(&self, dto: CreateProductDto) -> Result<Product> {
        dto.validate()?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let category = Self::resolve(&mut tx, dto.category_id).await?;
            tx.insert_product(&CreateProduct {
                sku: dto.sku,
                name: dto.name,
                category_id: category.as_ref().map(|c| c.id),
                category_path: category.map(|c| c.full_path),
            })
            .await
        }
        .await;
        let product = finish_tx(tx, result, "product create").await?;

        tracing::info!("Product created: id={}, sku={}", product.id, product.sku);
        Ok(product)
    }

    /// Create a store, copying the category path when a category is given
    pub async fn create_store(&self, dto: CreateStoreDto) -> Result<Store> {
        dto.validate()?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let category = Self::resolve(&mut tx, dto.category_id).await?;
            tx.insert_store(&CreateStore {
                code: dto.code,
                name: dto.name,
                address: dto.address,
                category_id: category.as_ref().map(|c| c.id),
                category_path: category.map(|c| c.full_path),
            })
            .await
        }
        .await;
        let store = finish_tx(tx, result, "store create").await?;

        tracing::info!("Store created: id={}, code={}", store.id, store.code);
        Ok(store)
    }

    /// Set or clear a product's category
    pub async fn assign_product_category(
        &self,
        id: i64,
        category_id: Option<i64>,
    ) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let category = Self::resolve(&mut tx, category_id).await?;
            tx.set_product_category(
                id,
                category.as_ref().map(|c| c.id),
                category.as_ref().map(|c| c.full_path.as_str()),
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))
        }
        .await;
        let product = finish_tx(tx, result, "product category assignment").await?;

        tracing::debug!(
            "Product {} assigned to category {:?}",
            product.id,
            product.category_path
        );
        Ok(product)
    }

    /// Set or clear a store's category
    pub async fn assign_store_category(&self, id: i64, category_id: Option<i64>) -> Result<Store> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let category = Self::resolve(&mut tx, category_id).await?;
            tx.set_store_category(
                id,
                category.as_ref().map(|c| c.id),
                category.as_ref().map(|c| c.full_path.as_str()),
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Store {} not found", id)))
        }
        .await;
        let store = finish_tx(tx, result, "store category assignment").await?;

        tracing::debug!(
            "Store {} assigned to category {:?}",
            store.id,
            store.category_path
        );
        Ok(store)
    }

    /// Products in a category or any of its descendants, with the total count
    pub async fn products_in_category(
        &self,
        category_id: i64,
        pagination: &PaginationQuery,
    ) -> Result<(Vec<Product>, i64)> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let category = Self::find_category(&mut tx, category_id).await?;
            tx.find_products_by_path_prefix(
                &category.full_path,
                pagination.offset(),
                pagination.limit(),
            )
            .await
        }
        .await;
        finish_tx(tx, result, "product listing").await
    }

    /// Stores in a category or any of its descendants
    pub async fn stores_in_category(&self, category_id: i64) -> Result<Vec<Store>> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let category = Self::find_category(&mut tx, category_id).await?;
            tx.find_stores_by_path_prefix(&category.full_path).await
        }
        .await;
        finish_tx(tx, result, "store listing").await
    }

    /// Share-lock the category whose path is about to be copied
    async fn resolve(tx: &mut D::Tx, category_id: Option<i64>) -> Result<Option<Category>> {
        let Some(id) = category_id else {
            return Ok(None);
        };

        tx.lock_category(id, RowLock::Share)
            .await?
            .map(Some)
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))
    }

    async fn find_category(tx: &mut D::Tx, id: i64) -> Result<Category> {
        tx.find_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))
    }
}
