use thiserror::Error;

/// SQLSTATE reported by PostgreSQL for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Duplicate key for unique field: {field}")]
    DuplicateKey { field: String },

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Document error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl StorageError {
    pub fn duplicate_key(field: impl Into<String>) -> Self {
        StorageError::DuplicateKey {
            field: field.into(),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StorageError::DuplicateKey { .. })
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let field = db_err.constraint().unwrap_or("unknown").to_string();
                return StorageError::DuplicateKey { field };
            }
        }
        StorageError::Database(err)
    }
}
