use crate::{
    Error,
    error::{ConfigError, StorageError},
};

/// Extension trait for Result types to simplify database error mapping
///
/// Storage backends use this to turn driver errors into kagi storage errors,
/// which the services surface as retryable infrastructure failures.
///
/// # Example
///
/// ```rust,ignore
/// use kagi_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err()?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a kagi storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a database error to a kagi storage error with additional context
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(format!("{context}: {e}"))))
    }
}

/// Extension trait for Option types to simplify required setting validation
///
/// # Example
///
/// ```rust
/// use kagi_core::error::utilities::RequiredSettingExt;
///
/// let field: Option<String> = Some("email".to_string());
/// let field = field.require_setting("identity_field").unwrap();
/// assert_eq!(field, "email");
/// ```
pub trait RequiredSettingExt<T> {
    /// Convert None to a ConfigError::MissingField
    fn require_setting(self, setting: &str) -> Result<T, ConfigError>;
}

impl<T> RequiredSettingExt<T> for Option<T> {
    fn require_setting(self, setting: &str) -> Result<T, ConfigError> {
        self.ok_or_else(|| ConfigError::MissingField(format!("{setting} is required")))
    }
}

/// Macro to convert any error to a storage database error
///
/// # Example
///
/// ```rust,ignore
/// use kagi_core::map_storage_err;
///
/// map_storage_err!(query.execute(&pool).await)?;
/// ```
#[macro_export]
macro_rules! map_storage_err {
    ($result:expr) => {
        $result.map_err(|e| {
            $crate::Error::Storage($crate::error::StorageError::Database(e.to_string()))
        })
    };
}

/// Macro to convert any error to a storage database error with context
///
/// # Example
///
/// ```rust,ignore
/// use kagi_core::map_storage_err_with_context;
///
/// map_storage_err_with_context!(query.execute(&pool).await, "Failed to mark token")?;
/// ```
#[macro_export]
macro_rules! map_storage_err_with_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| {
            $crate::Error::Storage($crate::error::StorageError::Database(format!(
                "{}: {}",
                $context, e
            )))
        })
    };
}
