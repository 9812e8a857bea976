mod category;

pub use category::{path_depth, Category, CategoryFields, CategoryStatus, CreateCategory};
