//! Modules layer - Infrastructure components
//!
//! Contains the transactional storage seam the feature services run on.

pub mod persistence;
