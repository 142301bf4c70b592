use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote operation '{operation}' failed: {message}")]
    RemoteOperation { operation: String, message: String },

    #[error("Custom field '{0}' has no matching remote field id")]
    UnknownCustomField(String),

    #[error("Duplicate matching key on {side} side: {key}")]
    DuplicateMatchingKey { side: InventorySide, key: String },

    #[error("{failed} work item(s) failed:\n{details}")]
    Aggregated { failed: usize, details: String },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Worker task panicked: {0}")]
    TaskPanicked(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    pub fn remote<E: std::fmt::Display>(operation: impl Into<String>, e: E) -> Self {
        Self::RemoteOperation {
            operation: operation.into(),
            message: e.to_string(),
        }
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }
}

/// Which inventory a duplicate matching key was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventorySide {
    Remote,
    Local,
}

impl InventorySide {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventorySide::Remote => "remote",
            InventorySide::Local => "local",
        }
    }
}

impl std::fmt::Display for InventorySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_message() {
        let err = SyncError::remote("set_status", "HTTP 403 Forbidden");
        assert_eq!(
            err.to_string(),
            "Remote operation 'set_status' failed: HTTP 403 Forbidden"
        );
    }

    #[test]
    fn test_unknown_custom_field_message() {
        let err = SyncError::UnknownCustomField("Test Scope".to_string());
        assert!(err.to_string().contains("Test Scope"));
    }

    #[test]
    fn test_duplicate_key_message() {
        let err = SyncError::DuplicateMatchingKey {
            side: InventorySide::Local,
            key: "test_login".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate matching key on local side: test_login");
    }
}
