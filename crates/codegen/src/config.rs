use serde::Deserialize;

/// Compiler configuration, usually deserialized from the host's config
/// file and handed to the build adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Wiring-module file paths, relative to the project root. Each is
    /// imported by the generated module and applied in order after the
    /// registration loop.
    #[serde(default)]
    pub providers: Vec<String>,

    /// Already-imported library manifest records to ingest
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,

    /// Identifier keys of services to emit as factory-deferred stubs
    #[serde(default)]
    pub lazy_services: Vec<String>,

    /// Where generated declaration files are written
    #[serde(default = "default_declaration_dir")]
    pub container_declaration_dir: String,

    /// Source file extensions the adapter scans
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

fn default_declaration_dir() -> String {
    "./src".to_string()
}

fn default_source_extensions() -> Vec<String> {
    vec!["rs".to_string()]
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            manifests: Vec::new(),
            lazy_services: Vec::new(),
            container_declaration_dir: default_declaration_dir(),
            source_extensions: default_source_extensions(),
        }
    }
}
