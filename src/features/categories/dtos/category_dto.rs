use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::features::categories::models::{Category, CategoryStatus};
use crate::shared::validation::SLUG_REGEX;

/// Distinguish an absent field from an explicit `null`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request DTO for creating a category
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryDto {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    /// URL-safe key, unique across the whole tree
    #[validate(
        length(min = 1, max = 100, message = "Slug must be 1-100 characters"),
        regex(path = *SLUG_REGEX, message = "Slug must be lowercase alphanumeric words separated by single hyphens")
    )]
    pub slug: String,

    /// Parent category; omitted for a root
    pub parent_id: Option<i64>,

    pub description: Option<String>,

    #[serde(default)]
    pub status: CategoryStatus,

    #[serde(default)]
    pub display_order: i32,
}

/// Request DTO for updating a category. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryDto {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[validate(
        length(min = 1, max = 100, message = "Slug must be 1-100 characters"),
        regex(path = *SLUG_REGEX, message = "Slug must be lowercase alphanumeric words separated by single hyphens")
    )]
    pub slug: Option<String>,

    /// `Some(None)` (an explicit `null`) moves the category to the root
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<i64>>,

    /// `Some(None)` clears the description
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,

    pub status: Option<CategoryStatus>,

    pub display_order: Option<i32>,
}

/// Response DTO for category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponseDto {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub full_path: String,
    pub description: Option<String>,
    pub status: CategoryStatus,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Category> for CategoryResponseDto {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            parent_id: c.parent_id,
            name: c.name,
            slug: c.slug,
            full_path: c.full_path,
            description: c.description,
            status: c.status,
            display_order: c.display_order,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Response DTO for category tree (hierarchical structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeDto {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub full_path: String,
    pub status: CategoryStatus,
    pub display_order: i32,
    pub children: Vec<CategoryTreeDto>,
}

impl CategoryTreeDto {
    /// Build tree from flat list of categories
    pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryTreeDto> {
        // Get root categories (parent_id is None)
        let roots: Vec<&Category> = categories
            .iter()
            .filter(|c| c.parent_id.is_none())
            .collect();

        roots
            .into_iter()
            .map(|root| Self::build_node(root, &categories))
            .collect()
    }

    fn build_node(category: &Category, all_categories: &[Category]) -> CategoryTreeDto {
        let mut children: Vec<&Category> = all_categories
            .iter()
            .filter(|c| c.parent_id == Some(category.id))
            .collect();
        children.sort_by(|a, b| (a.display_order, &a.name).cmp(&(b.display_order, &b.name)));

        CategoryTreeDto {
            id: category.id,
            name: category.name.clone(),
            slug: category.slug.clone(),
            full_path: category.full_path.clone(),
            status: category.status,
            display_order: category.display_order,
            children: children
                .into_iter()
                .map(|child| Self::build_node(child, all_categories))
                .collect(),
        }
    }

    /// Number of nodes in this subtree, including itself
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTreeDto::size).sum::<usize>()
    }
}

/// A category whose stored path disagrees with its ancestry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDrift {
    pub id: i64,
    pub stored: String,
    pub expected: String,
}
