//! Products and Stores, the catalog rows that mirror a category path.
//!
//! `category_path` is never accepted from callers. It is copied from the
//! category on assignment and kept current by the category services.

pub mod dtos;
pub mod models;
pub mod services;

pub use services::CatalogService;
