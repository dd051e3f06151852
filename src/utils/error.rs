use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroceryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}' ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("CSV layout error: {message}")]
    LayoutError { message: String },

    #[error("Image lookup failed: {message}")]
    LookupError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Storage,
    Network,
    Input,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GroceryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GroceryError::DatabaseError(_) | GroceryError::StoreUnavailable { .. } => {
                ErrorCategory::Storage
            }
            GroceryError::HttpError(_) | GroceryError::LookupError { .. } => ErrorCategory::Network,
            GroceryError::CsvError(_) | GroceryError::LayoutError { .. } => ErrorCategory::Input,
            GroceryError::ConfigError { .. }
            | GroceryError::InvalidConfigValueError { .. }
            | GroceryError::MissingConfigError { .. }
            | GroceryError::ValidationError { .. } => ErrorCategory::Configuration,
            GroceryError::IoError(_) | GroceryError::SerializationError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GroceryError::LookupError { .. } => ErrorSeverity::Low,
            GroceryError::HttpError(_) => ErrorSeverity::Medium,
            GroceryError::CsvError(_)
            | GroceryError::LayoutError { .. }
            | GroceryError::ConfigError { .. }
            | GroceryError::InvalidConfigValueError { .. }
            | GroceryError::MissingConfigError { .. }
            | GroceryError::ValidationError { .. } => ErrorSeverity::High,
            GroceryError::DatabaseError(_)
            | GroceryError::StoreUnavailable { .. }
            | GroceryError::IoError(_)
            | GroceryError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            GroceryError::StoreUnavailable { path, .. } => {
                format!("The grocery database at '{}' could not be opened", path)
            }
            GroceryError::DatabaseError(e) => format!("A database operation failed: {}", e),
            GroceryError::HttpError(e) => format!("Could not reach an image service: {}", e),
            GroceryError::CsvError(e) => format!("The CSV file could not be read: {}", e),
            GroceryError::LayoutError { message } => {
                format!("The CSV file does not match the vendor layout: {}", message)
            }
            GroceryError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            GroceryError::MissingConfigError { field } => {
                format!("Setting '{}' is required", field)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Storage => {
                "Check the --db path; run `import` first to create the database"
            }
            ErrorCategory::Network => "Check network connectivity or raise --sleep-ms and retry",
            ErrorCategory::Input => {
                "Verify the CSV export and the --store flag, or adjust [vendors] in the config file"
            }
            ErrorCategory::Configuration => "Review the command-line flags and the TOML config file",
            ErrorCategory::Internal => "Check file permissions and free disk space",
        }
    }
}

pub type Result<T> = std::result::Result<T, GroceryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_is_critical() {
        let err = GroceryError::StoreUnavailable {
            path: "data/missing.db".to_string(),
            reason: "file does not exist".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("data/missing.db"));
    }

    #[test]
    fn test_lookup_error_is_low_severity() {
        let err = GroceryError::LookupError {
            message: "all sources failed".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.category(), ErrorCategory::Network);
    }
}
