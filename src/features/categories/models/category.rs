use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::shared::constants::PATH_SEPARATOR;

/// Category status enum matching database enum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "category_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    #[default]
    Active,
    Inactive,
    Banned,
}

impl std::fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryStatus::Active => write!(f, "active"),
            CategoryStatus::Inactive => write!(f, "inactive"),
            CategoryStatus::Banned => write!(f, "banned"),
        }
    }
}

/// Database model for category
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Category {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    /// Materialized path, e.g. `/raw/metal/`. Written only by the category tree.
    pub full_path: String,
    pub description: Option<String>,
    pub status: CategoryStatus,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Number of slugs in the path; a root has depth 1
    pub fn depth(&self) -> usize {
        path_depth(&self.full_path)
    }

    /// Current attribute values, as a starting point for an update
    pub fn fields(&self) -> CategoryFields {
        CategoryFields {
            parent_id: self.parent_id,
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            status: self.status,
            display_order: self.display_order,
        }
    }
}

/// Count the slugs in a materialized path
pub fn path_depth(path: &str) -> usize {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).count()
}

/// Data for inserting a new category
#[derive(Debug, Clone)]
pub struct CreateCategory {
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub full_path: String,
    pub description: Option<String>,
    pub status: CategoryStatus,
    pub display_order: i32,
}

/// Attribute columns plus the parent link, written without touching `full_path`
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFields {
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub status: CategoryStatus,
    pub display_order: i32,
}
