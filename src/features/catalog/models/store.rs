use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Database model for a warehouse store location
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Store {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for inserting a new store
#[derive(Debug, Clone)]
pub struct CreateStore {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Option<String>,
}
