use thiserror::Error;

#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A write inside a path propagation or subtree deletion failed.
    /// The enclosing transaction is always rolled back.
    #[error("Cascade failure: {0}")]
    CascadeFailure(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap an error raised while cascading from `category_id`.
    ///
    /// Errors that are already cascade failures pass through untouched so the
    /// innermost context wins.
    pub fn cascade(category_id: i64, source: AppError) -> Self {
        match source {
            AppError::CascadeFailure(_) => source,
            other => AppError::CascadeFailure(format!("category {}: {}", category_id, other)),
        }
    }

    /// Short label used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation",
            AppError::CascadeFailure(_) => "cascade_failure",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
