//! Category tree core for the warehouse backend.
//!
//! [`features::categories::CategoryService`] and
//! [`features::catalog::CatalogService`] are the entry points for an outer
//! CRUD layer. Both run on any [`modules::persistence::Datastore`];
//! [`modules::persistence::PgDatastore`] is the Postgres one.

pub mod core;
pub mod features;
pub mod modules;
pub mod shared;
