mod product;
mod store;

pub use product::{CreateProduct, Product};
pub use store::{CreateStore, Store};
