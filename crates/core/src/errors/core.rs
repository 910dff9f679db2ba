use std::error::Error;
use thiserror::Error as ThisError;

/// Core error type for the alloy runtime
#[derive(Debug, ThisError)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Circular dependency detected: {path}")]
    CircularDependency { path: String },

    #[error("No value provided for token '{token}'{}", path_suffix(.path))]
    MissingToken { token: String, path: String },

    #[error("Invalid dependency at position {position}{}: value of type {type_tag} is not a service, deferred import, or token", path_suffix(.path))]
    InvalidDependency {
        position: usize,
        type_tag: String,
        path: String,
    },

    #[error("Deferred import of {target} failed after {attempts} attempt(s){}: {source}", path_suffix(.path))]
    DeferredImportFailed {
        target: String,
        attempts: u32,
        path: String,
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("Deferred import of {target} did not produce a service constructor")]
    NotAConstructor { target: String },

    #[error("No service bound for {identifier}")]
    NoService { identifier: String },

    #[error("{service} is a deferred-service placeholder and cannot be constructed directly")]
    PlaceholderInstantiated { service: String },

    #[error("Identifier '{identifier}' is already bound to {existing}; cannot rebind it to {attempted}")]
    IdentifierRebound {
        identifier: String,
        existing: String,
        attempted: String,
    },

    #[error("Invalid service scope: {scope}")]
    InvalidServiceScope { scope: String },

    #[error("Construction of {service}{} failed: {source}", path_suffix(.path))]
    Construction {
        service: String,
        path: String,
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("Constructor for {service} received arguments that do not match its dependency list: {message}")]
    ArgumentMismatch { service: String, message: String },

    #[error("Service {service} resolved to an instance of an unexpected type")]
    InstanceTypeMismatch { service: String },

    #[error("{source}")]
    PendingCreation { source: std::sync::Arc<CoreError> },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },

    #[error("Provider error: {message}")]
    Provider { message: String },
}

fn path_suffix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" while resolving {}", path)
    }
}

impl CoreError {
    /// Create a circular dependency error from a named resolution path
    pub fn circular(path: impl Into<String>) -> Self {
        Self::CircularDependency { path: path.into() }
    }

    /// Create a missing token error
    pub fn missing_token(token: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingToken {
            token: token.into(),
            path: path.into(),
        }
    }

    /// Create a no-service error
    pub fn no_service(identifier: impl Into<String>) -> Self {
        Self::NoService {
            identifier: identifier.into(),
        }
    }

    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a construction error with an underlying cause
    pub fn construction(
        service: impl Into<String>,
        source: Box<dyn Error + Send + Sync>,
    ) -> Self {
        Self::Construction {
            service: service.into(),
            path: String::new(),
            source,
        }
    }

    /// Attach a resolution path to errors that were raised below the
    /// resolver and could not name it themselves.
    pub(crate) fn with_path(self, path: &str) -> Self {
        match self {
            Self::DeferredImportFailed {
                target,
                attempts,
                path: old,
                source,
            } if old.is_empty() => Self::DeferredImportFailed {
                target,
                attempts,
                path: path.to_string(),
                source,
            },
            Self::Construction {
                service,
                path: old,
                source,
            } if old.is_empty() => Self::Construction {
                service,
                path: path.to_string(),
                source,
            },
            other => other,
        }
    }

    /// Check if the error is a circular dependency failure, looking
    /// through shared-creation wrapping.
    pub fn is_circular(&self) -> bool {
        match self {
            Self::CircularDependency { .. } => true,
            Self::PendingCreation { source } => source.is_circular(),
            _ => false,
        }
    }

    /// Check if the error is a missing token failure
    pub fn is_missing_token(&self) -> bool {
        match self {
            Self::MissingToken { .. } => true,
            Self::PendingCreation { source } => source.is_missing_token(),
            _ => false,
        }
    }

    /// Check if the error is a no-service failure
    pub fn is_no_service(&self) -> bool {
        match self {
            Self::NoService { .. } => true,
            Self::PendingCreation { source } => source.is_no_service(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_path() {
        let error = CoreError::circular("A -> B -> A");
        assert_eq!(
            error.to_string(),
            "Circular dependency detected: A -> B -> A"
        );

        let error = CoreError::missing_token("config", "UserService");
        assert!(error.to_string().contains("config"));
        assert!(error.to_string().contains("UserService"));
    }

    #[test]
    fn test_with_path_fills_empty_paths_only() {
        let error = CoreError::construction(
            "Database",
            "connection refused".to_string().into(),
        );
        let error = error.with_path("App -> Database");
        match &error {
            CoreError::Construction { path, .. } => assert_eq!(path, "App -> Database"),
            other => panic!("unexpected error: {}", other),
        }

        let error = error.with_path("Other -> Path");
        match &error {
            CoreError::Construction { path, .. } => assert_eq!(path, "App -> Database"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_kind_predicates() {
        assert!(CoreError::circular("A -> A").is_circular());
        assert!(CoreError::no_service("alloy:app#Missing").is_no_service());
        assert!(!CoreError::provider("bad block").is_missing_token());
    }
}
