//! Host-bundler adapter: the thin layer between a watching host and the
//! discovery/codegen pipeline.
//!
//! The host calls `on_transform` for every source unit it processes,
//! `on_hot_update` on file events, `on_build_start` once per build, and
//! `on_load` when the virtual container module is requested. Everything
//! stateful lives in the discovery store; the adapter serializes calls
//! by requiring `&mut self`.

use crate::config::CompilerConfig;
use crate::discovery::{DiscoveryStore, UpdateOutcome};
use crate::error::CodegenError;
use crate::generator::{generate, CodegenInput, GeneratedOutput};
use crate::manifest::ingest_manifests;
use crate::scanner::{normalize_path, Scanner};
use crate::writer::CodeWriter;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Symbolic id of the virtual container module
pub const VIRTUAL_MODULE_ID: &str = "virtual:alloy-container";
/// Opaque resolved id handed back to the host
pub const RESOLVED_VIRTUAL_MODULE_ID: &str = "\0virtual:alloy-container";

/// File name of the generated wiring module
pub const CONTAINER_MODULE_FILE: &str = "alloy_container.rs";
/// File name of the generated identifier declarations
pub const IDENTIFIER_DECLARATIONS_FILE: &str = "alloy_identifiers.rs";

/// Adapter binding one project to the compiler pipeline
pub struct BuildAdapter {
    config: CompilerConfig,
    project_root: PathBuf,
    store: DiscoveryStore,
    writer: CodeWriter,
}

impl BuildAdapter {
    /// Create an adapter for a project, reading the package name from
    /// its `Cargo.toml`.
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: CompilerConfig,
    ) -> Result<Self, CodegenError> {
        let project_root = project_root.into();
        let package_name = read_package_name(&project_root)?;
        let store = DiscoveryStore::new(Scanner::new(package_name, project_root.clone()));
        Ok(Self {
            config,
            project_root,
            store,
            writer: CodeWriter::new(),
        })
    }

    pub fn store(&self) -> &DiscoveryStore {
        &self.store
    }

    /// Map the symbolic virtual-module id to its resolved form
    pub fn resolve_virtual(&self, id: &str) -> Option<&'static str> {
        (id == VIRTUAL_MODULE_ID).then_some(RESOLVED_VIRTUAL_MODULE_ID)
    }

    /// Scan one source unit the host is transforming. Files outside the
    /// configured extensions, under `target/`, or belonging to the
    /// generated output are ignored.
    pub fn on_transform(
        &mut self,
        file_path: &Path,
        source: &str,
    ) -> Result<Option<UpdateOutcome>, CodegenError> {
        if !self.is_scannable(file_path) {
            return Ok(None);
        }
        self.store.update(file_path, source).map(Some)
    }

    /// React to a host file event; an empty module list signals deletion
    pub fn on_hot_update(
        &mut self,
        file_path: &Path,
        modules_empty: bool,
    ) -> Result<Option<UpdateOutcome>, CodegenError> {
        if !self.is_scannable(file_path) {
            return Ok(None);
        }
        if modules_empty {
            return Ok(Some(self.store.remove(file_path)));
        }
        let source = fs::read_to_string(file_path)?;
        self.store.update(file_path, &source).map(Some)
    }

    /// Clear discovery and seed it with one walk of the source root
    pub fn on_build_start(&mut self) -> Result<(), CodegenError> {
        self.store.clear();
        let source_root = self.project_root.join("src");
        let mut files = Vec::new();
        collect_source_files(&source_root, &mut files)?;
        files.sort();
        for file in &files {
            if !self.is_scannable(file) {
                continue;
            }
            let source = fs::read_to_string(file)?;
            self.store.update(file, &source)?;
        }
        tracing::info!(
            files = files.len(),
            services = self.store.service_count(),
            "seeded service discovery"
        );
        Ok(())
    }

    /// Synthesize the virtual module for a resolved id and write the
    /// generated declaration files as a side effect.
    pub fn on_load(&mut self, resolved_id: &str) -> Result<Option<String>, CodegenError> {
        if resolved_id != RESOLVED_VIRTUAL_MODULE_ID {
            return Ok(None);
        }
        let output = self.generate()?;

        let declaration_dir = self
            .project_root
            .join(self.config.container_declaration_dir.trim_start_matches("./"));
        self.writer
            .write_if_changed(&declaration_dir.join(CONTAINER_MODULE_FILE), &output.module)?;
        self.writer.write_if_changed(
            &declaration_dir.join(IDENTIFIER_DECLARATIONS_FILE),
            &output.declarations,
        )?;

        Ok(Some(output.module))
    }

    /// Run discovery + ingestion + codegen without touching the disk
    pub fn generate(&self) -> Result<GeneratedOutput, CodegenError> {
        let local_services = self.store.services();
        let ingested = ingest_manifests(&self.config.manifests, &local_services);

        let mut deferred_keys = self.store.deferred_keys();
        deferred_keys.extend(ingested.deferred_keys.iter().cloned());

        let lazy_services: BTreeSet<String> =
            self.config.lazy_services.iter().cloned().collect();

        generate(&CodegenInput {
            local_services: &local_services,
            ingested: &ingested,
            deferred_keys: &deferred_keys,
            providers: &self.config.providers,
            lazy_services: &lazy_services,
            project_root: &self.project_root,
        })
    }

    /// Write an emitted asset (manifest-emitter path)
    pub fn emit_file(&self, file_name: &str, source: &str) -> Result<PathBuf, CodegenError> {
        let path = self.project_root.join(file_name);
        self.writer.write_if_changed(&path, source)?;
        Ok(path)
    }

    fn is_scannable(&self, file_path: &Path) -> bool {
        let normalized = normalize_path(file_path);
        if normalized.contains("/target/") {
            return false;
        }
        if let Some(name) = file_path.file_name().and_then(|name| name.to_str()) {
            if name == CONTAINER_MODULE_FILE || name == IDENTIFIER_DECLARATIONS_FILE {
                return false;
            }
        }
        file_path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| {
                self.config
                    .source_extensions
                    .iter()
                    .any(|allowed| allowed == extension)
            })
            .unwrap_or(false)
    }
}

fn collect_source_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CodegenError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_source_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn read_package_name(project_root: &Path) -> Result<String, CodegenError> {
    let manifest_path = project_root.join("Cargo.toml");
    let content = fs::read_to_string(&manifest_path).map_err(|error| {
        CodegenError::ProjectMetadata {
            message: format!(
                "failed to read {}: {}",
                normalize_path(&manifest_path),
                error
            ),
        }
    })?;
    let manifest: toml::Value =
        content
            .parse()
            .map_err(|error| CodegenError::ProjectMetadata {
                message: format!("failed to parse Cargo.toml: {}", error),
            })?;
    manifest
        .get("package")
        .and_then(|package| package.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_string)
        .ok_or_else(|| CodegenError::ProjectMetadata {
            message: "Cargo.toml has no [package] name".to_string(),
        })
}
