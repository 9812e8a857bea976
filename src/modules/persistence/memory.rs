//! In-memory datastore for tests.
//!
//! Each transaction works on a private copy of the committed state and swaps
//! it in on commit. Foreign keys and unique constraints from the SQL schema
//! are enforced so services see the same failures they would see against
//! Postgres. Writes can be made to fail on demand through [`Faults`].
//!
//! Row locks are tracked across open transactions. A lock that conflicts
//! with one held elsewhere fails with `Conflict` instead of waiting.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{CatalogRepository, CategoryRepository, DataTx, Datastore, MirrorTarget, RowLock};
use crate::core::error::{AppError, Result};
use crate::features::catalog::models::{CreateProduct, CreateStore, Product, Store};
use crate::features::categories::models::{Category, CategoryFields, CreateCategory};

/// Committed rows
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub categories: BTreeMap<i64, Category>,
    pub products: BTreeMap<i64, Product>,
    pub stores: BTreeMap<i64, Store>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Write failures to inject, counted per transaction and 1-based
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub fail_path_write_at: Option<usize>,
    pub fail_delete_at: Option<usize>,
    pub fail_mirror_write_at: Option<usize>,
}

/// A committed write, in the order it was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    LockCategory(i64, RowLock),
    InsertCategory(i64),
    UpdateFields(i64),
    WritePath(i64),
    DeleteCategory(i64),
    MirrorPath(MirrorTarget, i64),
    ClearMirror(MirrorTarget, i64),
}

#[derive(Debug, Default)]
struct Shared {
    state: MemoryState,
    faults: Faults,
    log: Vec<Op>,
    commits: usize,
    rollbacks: usize,
    next_tx: u64,
    /// Category id to the transactions holding a lock on it
    row_locks: HashMap<i64, Vec<(u64, RowLock)>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    pub fn snapshot(&self) -> MemoryState {
        self.lock().state.clone()
    }

    pub fn category(&self, id: i64) -> Option<Category> {
        self.lock().state.categories.get(&id).cloned()
    }

    pub fn product(&self, id: i64) -> Option<Product> {
        self.lock().state.products.get(&id).cloned()
    }

    pub fn store(&self, id: i64) -> Option<Store> {
        self.lock().state.stores.get(&id).cloned()
    }

    /// Committed writes since the last [`MemoryDatastore::clear_log`]
    pub fn log(&self) -> Vec<Op> {
        self.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    /// Overwrite a stored path behind the service's back
    pub fn corrupt_path(&self, id: i64, full_path: &str) {
        if let Some(category) = self.lock().state.categories.get_mut(&id) {
            category.full_path = full_path.to_string();
        }
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let mut shared = self.lock();
        shared.next_tx += 1;
        Ok(MemoryTx {
            tx_id: shared.next_tx,
            shared: Arc::clone(&self.shared),
            work: shared.state.clone(),
            written: HashSet::new(),
            faults: shared.faults,
            path_writes: 0,
            deletes: 0,
            mirror_writes: 0,
            log: Vec::new(),
        })
    }
}

pub struct MemoryTx {
    tx_id: u64,
    shared: Arc<Mutex<Shared>>,
    work: MemoryState,
    /// Categories this transaction has written
    written: HashSet<i64>,
    faults: Faults,
    path_writes: usize,
    deletes: usize,
    mirror_writes: usize,
    log: Vec<Op>,
}

fn injected(what: &str, n: usize) -> AppError {
    AppError::Internal(format!("injected failure on {} #{}", what, n))
}

impl MemoryTx {
    fn check_category_unique(
        &self,
        id: Option<i64>,
        parent_id: Option<i64>,
        name: &str,
        slug: &str,
    ) -> Result<()> {
        for other in self.work.categories.values() {
            if Some(other.id) == id {
                continue;
            }
            if other.slug == slug {
                return Err(AppError::Conflict(
                    "A category with this slug already exists".to_string(),
                ));
            }
            if other.parent_id == parent_id && other.name == name {
                return Err(AppError::Conflict(
                    "A sibling category with this name already exists".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_category_exists(&self, id: Option<i64>) -> Result<()> {
        match id {
            Some(id) if !self.work.categories.contains_key(&id) => Err(AppError::NotFound(
                "Referenced record does not exist".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn mirror_rows(&mut self, target: MirrorTarget, category_id: i64) -> Vec<i64> {
        match target {
            MirrorTarget::Product => self
                .work
                .products
                .values()
                .filter(|p| p.category_id == Some(category_id))
                .map(|p| p.id)
                .collect(),
            MirrorTarget::Store => self
                .work
                .stores
                .values()
                .filter(|s| s.category_id == Some(category_id))
                .map(|s| s.id)
                .collect(),
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            for holders in shared.row_locks.values_mut() {
                holders.retain(|(tx_id, _)| *tx_id != self.tx_id);
            }
        }
    }
}

#[async_trait]
impl DataTx for MemoryTx {
    async fn commit(mut self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.state = std::mem::take(&mut self.work);
        shared.log.append(&mut self.log);
        shared.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.shared.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for MemoryTx {
    async fn find_category(&mut self, id: i64) -> Result<Option<Category>> {
        Ok(self.work.categories.get(&id).cloned())
    }

    async fn lock_category(&mut self, id: i64, lock: RowLock) -> Result<Option<Category>> {
        let committed = {
            let mut shared = self.shared.lock().unwrap();
            let holders = shared.row_locks.entry(id).or_default();
            let blocked = holders.iter().any(|(tx_id, held)| {
                *tx_id != self.tx_id && (lock == RowLock::Update || *held == RowLock::Update)
            });
            if blocked {
                return Err(AppError::Conflict(format!(
                    "Category {} is locked by another transaction",
                    id
                )));
            }
            holders.push((self.tx_id, lock));
            shared.state.categories.get(&id).cloned()
        };

        if !self.written.contains(&id) {
            match committed {
                Some(row) => {
                    self.work.categories.insert(id, row);
                }
                None => {
                    self.work.categories.remove(&id);
                }
            }
        }

        self.log.push(Op::LockCategory(id, lock));
        Ok(self.work.categories.get(&id).cloned())
    }

    async fn find_category_by_slug(&mut self, slug: &str) -> Result<Option<Category>> {
        Ok(self
            .work
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn find_children(&mut self, parent_id: Option<i64>) -> Result<Vec<Category>> {
        let mut children: Vec<Category> = self
            .work
            .categories
            .values()
            .filter(|c| c.parent_id == parent_id)
            .cloned()
            .collect();
        children.sort_by(|a, b| {
            (a.display_order, &a.name, a.id).cmp(&(b.display_order, &b.name, b.id))
        });
        Ok(children)
    }

    async fn find_by_path_prefix(&mut self, prefix: &str) -> Result<Vec<Category>> {
        let mut rows: Vec<Category> = self
            .work
            .categories
            .values()
            .filter(|c| c.full_path.starts_with(prefix))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(rows)
    }

    async fn insert_category(&mut self, data: &CreateCategory) -> Result<Category> {
        self.check_category_exists(data.parent_id)?;
        self.check_category_unique(None, data.parent_id, &data.name, &data.slug)?;

        let now = Utc::now();
        let category = Category {
            id: self.work.next_id(),
            parent_id: data.parent_id,
            name: data.name.clone(),
            slug: data.slug.clone(),
            full_path: data.full_path.clone(),
            description: data.description.clone(),
            status: data.status,
            display_order: data.display_order,
            created_at: now,
            updated_at: now,
        };
        self.work.categories.insert(category.id, category.clone());
        self.written.insert(category.id);
        self.log.push(Op::InsertCategory(category.id));
        Ok(category)
    }

    async fn update_category_fields(
        &mut self,
        id: i64,
        fields: &CategoryFields,
    ) -> Result<Option<Category>> {
        if !self.work.categories.contains_key(&id) {
            return Ok(None);
        }
        self.check_category_exists(fields.parent_id)?;
        self.check_category_unique(Some(id), fields.parent_id, &fields.name, &fields.slug)?;

        let Some(category) = self.work.categories.get_mut(&id) else {
            return Ok(None);
        };
        category.parent_id = fields.parent_id;
        category.name = fields.name.clone();
        category.slug = fields.slug.clone();
        category.description = fields.description.clone();
        category.status = fields.status;
        category.display_order = fields.display_order;
        category.updated_at = Utc::now();
        let updated = category.clone();
        self.written.insert(id);
        self.log.push(Op::UpdateFields(id));
        Ok(Some(updated))
    }

    async fn update_category_path(&mut self, id: i64, full_path: &str) -> Result<()> {
        self.path_writes += 1;
        if self.faults.fail_path_write_at == Some(self.path_writes) {
            return Err(injected("path write", self.path_writes));
        }

        let category = self
            .work
            .categories
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;
        category.full_path = full_path.to_string();
        category.updated_at = Utc::now();
        self.written.insert(id);
        self.log.push(Op::WritePath(id));
        Ok(())
    }

    async fn delete_category(&mut self, id: i64) -> Result<()> {
        self.deletes += 1;
        if self.faults.fail_delete_at == Some(self.deletes) {
            return Err(injected("delete", self.deletes));
        }

        if !self.work.categories.contains_key(&id) {
            return Err(AppError::NotFound(format!("Category {} not found", id)));
        }
        let referenced = self
            .work
            .categories
            .values()
            .any(|c| c.parent_id == Some(id))
            || self
                .work
                .products
                .values()
                .any(|p| p.category_id == Some(id))
            || self.work.stores.values().any(|s| s.category_id == Some(id));
        if referenced {
            return Err(AppError::Conflict(format!(
                "Category {} is still referenced",
                id
            )));
        }

        self.work.categories.remove(&id);
        self.written.insert(id);
        self.log.push(Op::DeleteCategory(id));
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for MemoryTx {
    async fn insert_product(&mut self, data: &CreateProduct) -> Result<Product> {
        self.check_category_exists(data.category_id)?;
        if self.work.products.values().any(|p| p.sku == data.sku) {
            return Err(AppError::Conflict(
                "A product with this SKU already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let product = Product {
            id: self.work.next_id(),
            sku: data.sku.clone(),
            name: data.name.clone(),
            category_id: data.category_id,
            category_path: data.category_path.clone(),
            created_at: now,
            updated_at: now,
        };
        self.work.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn find_product(&mut self, id: i64) -> Result<Option<Product>> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn set_product_category(
        &mut self,
        id: i64,
        category_id: Option<i64>,
        category_path: Option<&str>,
    ) -> Result<Option<Product>> {
        self.check_category_exists(category_id)?;
        Ok(self.work.products.get_mut(&id).map(|p| {
            p.category_id = category_id;
            p.category_path = category_path.map(str::to_string);
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn find_products_by_path_prefix(
        &mut self,
        prefix: &str,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Product>, i64)> {
        let mut matching: Vec<Product> = self
            .work
            .products
            .values()
            .filter(|p| {
                p.category_path
                    .as_deref()
                    .is_some_and(|path| path.starts_with(prefix))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (&a.category_path, &a.name, a.id).cmp(&(&b.category_path, &b.name, b.id))
        });

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((items, total))
    }

    async fn insert_store(&mut self, data: &CreateStore) -> Result<Store> {
        self.check_category_exists(data.category_id)?;
        if self.work.stores.values().any(|s| s.code == data.code) {
            return Err(AppError::Conflict(
                "A store with this code already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let store = Store {
            id: self.work.next_id(),
            code: data.code.clone(),
            name: data.name.clone(),
            address: data.address.clone(),
            category_id: data.category_id,
            category_path: data.category_path.clone(),
            created_at: now,
            updated_at: now,
        };
        self.work.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn find_store(&mut self, id: i64) -> Result<Option<Store>> {
        Ok(self.work.stores.get(&id).cloned())
    }

    async fn set_store_category(
        &mut self,
        id: i64,
        category_id: Option<i64>,
        category_path: Option<&str>,
    ) -> Result<Option<Store>> {
        self.check_category_exists(category_id)?;
        Ok(self.work.stores.get_mut(&id).map(|s| {
            s.category_id = category_id;
            s.category_path = category_path.map(str::to_string);
            s.updated_at = Utc::now();
            s.clone()
        }))
    }

    async fn find_stores_by_path_prefix(&mut self, prefix: &str) -> Result<Vec<Store>> {
        let mut matching: Vec<Store> = self
            .work
            .stores
            .values()
            .filter(|s| {
                s.category_path
                    .as_deref()
                    .is_some_and(|path| path.starts_with(prefix))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (&a.category_path, &a.name, a.id).cmp(&(&b.category_path, &b.name, b.id))
        });
        Ok(matching)
    }

    async fn mirror_path(
        &mut self,
        target: MirrorTarget,
        category_id: i64,
        category_path: &str,
    ) -> Result<u64> {
        self.mirror_writes += 1;
        if self.faults.fail_mirror_write_at == Some(self.mirror_writes) {
            return Err(injected("mirror write", self.mirror_writes));
        }

        let ids = self.mirror_rows(target, category_id);
        let now = Utc::now();
        for id in &ids {
            match target {
                MirrorTarget::Product => {
                    if let Some(p) = self.work.products.get_mut(id) {
                        p.category_path = Some(category_path.to_string());
                        p.updated_at = now;
                    }
                }
                MirrorTarget::Store => {
                    if let Some(s) = self.work.stores.get_mut(id) {
                        s.category_path = Some(category_path.to_string());
                        s.updated_at = now;
                    }
                }
            }
        }
        self.log.push(Op::MirrorPath(target, category_id));
        Ok(ids.len() as u64)
    }

    async fn clear_mirror(&mut self, target: MirrorTarget, category_id: i64) -> Result<u64> {
        let ids = self.mirror_rows(target, category_id);
        let now = Utc::now();
        for id in &ids {
            match target {
                MirrorTarget::Product => {
                    if let Some(p) = self.work.products.get_mut(id) {
                        p.category_id = None;
                        p.category_path = None;
                        p.updated_at = now;
                    }
                }
                MirrorTarget::Store => {
                    if let Some(s) = self.work.stores.get_mut(id) {
                        s.category_id = None;
                        s.category_path = None;
                        s.updated_at = now;
                    }
                }
            }
        }
        self.log.push(Op::ClearMirror(target, category_id));
        Ok(ids.len() as u64)
    }
}
