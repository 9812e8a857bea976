use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::shared::validation::SLUG_REGEX;

/// Request DTO for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductDto {
    #[validate(
        length(min = 1, max = 64, message = "SKU must be 1-64 characters"),
        regex(path = *SLUG_REGEX, message = "SKU must be lowercase alphanumeric words separated by single hyphens")
    )]
    pub sku: String,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    pub category_id: Option<i64>,
}

/// Request DTO for creating a store
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreDto {
    #[validate(
        length(min = 1, max = 32, message = "Code must be 1-32 characters"),
        regex(path = *SLUG_REGEX, message = "Code must be lowercase alphanumeric words separated by single hyphens")
    )]
    pub code: String,

    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,

    pub category_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_dto_validation() {
        let mut dto = CreateProductDto {
            sku: "bolt-m8".to_string(),
            name: "M8 Bolt".to_string(),
            category_id: None,
        };
        assert!(dto.validate().is_ok());

        dto.sku = "BOLT M8".to_string();
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_store_dto_from_json() {
        let dto: CreateStoreDto =
            serde_json::from_str(r#"{"code":"wh-01","name":"North","categoryId":3}"#).unwrap();
        assert_eq!(dto.category_id, Some(3));
        assert_eq!(dto.address, None);
        assert!(dto.validate().is_ok());
    }
}
