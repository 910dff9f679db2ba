use thiserror::Error;

/// Error type for discovery, manifest ingestion, and code generation
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid manifest from '{package}': {message}")]
    InvalidManifest { package: String, message: String },

    #[error("Duplicate registration of '{class_name}': discovered locally at {local_paths} and provided by manifest import path '{manifest_path}'")]
    DuplicateRegistration {
        class_name: String,
        local_paths: String,
        manifest_path: String,
    },

    #[error("lazy_services entry '{identifier}' is not an alloy identifier key (expected the 'alloy:' prefix)")]
    UnsupportedLazyIdentifier { identifier: String },

    #[error("Manifest for '{package}' lists providers but was built with mode '{build_mode}'; providers require preserve-modules so their module specifiers stay stable")]
    ProvidersRequirePreserveModules {
        package: String,
        build_mode: String,
    },

    #[error("Project metadata error: {message}")]
    ProjectMetadata { message: String },

    #[error("Codegen error: {message}")]
    Codegen { message: String },
}

impl CodegenError {
    /// Create a parse error for a source file
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-manifest error
    pub fn invalid_manifest(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create a generic codegen error
    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen {
            message: message.into(),
        }
    }
}
