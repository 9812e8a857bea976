/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

// =============================================================================
// CATEGORY PATHS
// =============================================================================

/// Separator between slugs in a materialized category path
pub const PATH_SEPARATOR: char = '/';
