//! Manifest emitter: the library-build variant of the compiler.
//!
//! Instead of wiring a container, a library build publishes what it
//! discovered: a JSON manifest describing its services and a companion
//! source file exporting one stable identifier accessor per service, so
//! consumers share the exact same identities.

use crate::error::CodegenError;
use crate::manifest::{
    BuildMode, DeferredDep, LibraryManifest, ManifestRetry, ManifestService, TokenDep,
    MANIFEST_SCHEMA_VERSION,
};
use crate::scanner::{DependencyForm, DiscoveredService};

/// Default file name of the emitted manifest
pub const MANIFEST_FILE_NAME: &str = "alloy.manifest.json";
/// Default file name of the emitted identifier-constants source
pub const IDENTIFIERS_FILE_NAME: &str = "alloy_identifiers.rs";

/// An asset the host should write via its emit-file channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedAsset {
    pub file_name: String,
    pub source: String,
}

/// Emitter for one library build
pub struct ManifestEmitter<'a> {
    package_name: &'a str,
    build_mode: BuildMode,
    providers: &'a [String],
    services: &'a [DiscoveredService],
}

impl<'a> ManifestEmitter<'a> {
    pub fn new(
        package_name: &'a str,
        build_mode: BuildMode,
        providers: &'a [String],
        services: &'a [DiscoveredService],
    ) -> Self {
        Self {
            package_name,
            build_mode,
            providers,
            services,
        }
    }

    /// Produce the manifest and its identifier companion.
    ///
    /// Providers are only representable when the build preserves module
    /// subpaths; any other mode has no stable specifier to publish.
    pub fn emit(&self) -> Result<Vec<EmittedAsset>, CodegenError> {
        if !self.providers.is_empty() && self.build_mode != BuildMode::PreserveModules {
            return Err(CodegenError::ProvidersRequirePreserveModules {
                package: self.package_name.to_string(),
                build_mode: self.build_mode.to_string(),
            });
        }

        let manifest = self.build_manifest();
        let manifest_json = serde_json::to_string_pretty(&manifest)?;

        Ok(vec![
            EmittedAsset {
                file_name: MANIFEST_FILE_NAME.to_string(),
                source: format!("{}\n", manifest_json),
            },
            EmittedAsset {
                file_name: IDENTIFIERS_FILE_NAME.to_string(),
                source: self.identifiers_source(),
            },
        ])
    }

    fn build_manifest(&self) -> LibraryManifest {
        let crate_name = self.package_name.replace('-', "_");
        let services = self
            .services
            .iter()
            .map(|service| self.manifest_service(service, &crate_name))
            .collect();

        LibraryManifest {
            schema_version: Some(MANIFEST_SCHEMA_VERSION),
            package_name: self.package_name.to_string(),
            build_mode: self.build_mode,
            services,
            providers: self.providers.to_vec(),
            diagnostics: Vec::new(),
        }
    }

    fn manifest_service(&self, service: &DiscoveredService, crate_name: &str) -> ManifestService {
        let import_path = match self.build_mode {
            BuildMode::PreserveModules => public_path(crate_name, &service.file_path),
            BuildMode::Chunks | BuildMode::Bundled => crate_name.to_string(),
        };

        let mut deps = Vec::new();
        let mut token_deps = Vec::new();
        let mut deferred_deps = Vec::new();
        for dependency in &service.metadata.dependencies {
            match &dependency.form {
                DependencyForm::Service { path } => {
                    deps.push(tail_name(path));
                }
                DependencyForm::Unresolved { name } => deps.push(name.clone()),
                DependencyForm::Token { path } => {
                    let export_name = tail_name(path);
                    let import_path = service
                        .referenced_imports
                        .iter()
                        .find(|import| import.local_name == export_name)
                        .map(|import| import.module_path.clone())
                        .unwrap_or_else(|| crate_name.to_string());
                    token_deps.push(TokenDep {
                        export_name,
                        import_path: publicize(crate_name, &import_path),
                    });
                }
                DependencyForm::Deferred {
                    target_path,
                    export_name,
                } => {
                    let module = target_path
                        .strip_suffix(&format!("::{}", export_name))
                        .unwrap_or(target_path);
                    deferred_deps.push(DeferredDep {
                        export_name: export_name.clone(),
                        import_path: publicize(crate_name, module),
                        retry: dependency.retry.map(|retry| ManifestRetry {
                            retries: retry.attempts_after_first,
                            backoff_ms: retry.initial_backoff_ms,
                            factor: retry.factor,
                        }),
                    });
                }
            }
        }

        ManifestService {
            export_name: service.class_name.clone(),
            import_path,
            symbol_key: service.identifier_key.clone(),
            scope: service.metadata.scope,
            deps,
            token_deps,
            deferred_deps,
        }
    }

    fn identifiers_source(&self) -> String {
        let mut out = String::from(
            "//! Stable service identifiers published with the library manifest.\n//! Generated by alloy-codegen. Do not edit by hand.\n\nuse alloy_core::ServiceIdentifier;\n\n",
        );
        for service in self.services {
            out.push_str(&format!(
                "/// `{}`\npub fn {}() -> ServiceIdentifier {{\n    ServiceIdentifier::for_key(\"{}\")\n}}\n\n",
                service.class_name,
                snake_ident(&service.class_name),
                service.identifier_key.replace('"', "\\\"")
            ));
        }
        out
    }
}

/// Public subpath of a source file within the crate, for builds that
/// preserve module layout
fn public_path(crate_name: &str, file_path: &str) -> String {
    let marker = "/src/";
    let module = match file_path.find(marker) {
        Some(index) => {
            let relative = &file_path[index + marker.len()..];
            let trimmed = relative.strip_suffix(".rs").unwrap_or(relative);
            let mut segments: Vec<&str> = trimmed.split('/').collect();
            if segments.last() == Some(&"mod") {
                segments.pop();
            }
            if segments == ["lib"] || segments == ["main"] {
                segments.clear();
            }
            segments.join("::")
        }
        None => String::new(),
    };
    if module.is_empty() {
        crate_name.to_string()
    } else {
        format!("{}::{}", crate_name, module)
    }
}

/// Rewrite a crate-relative path to the public path consumers use
fn publicize(crate_name: &str, path: &str) -> String {
    if path == "crate" {
        crate_name.to_string()
    } else if let Some(rest) = path.strip_prefix("crate::") {
        format!("{}::{}", crate_name, rest)
    } else {
        path.to_string()
    }
}

fn tail_name(path: &str) -> String {
    path.rsplit("::").next().unwrap_or(path).to_string()
}

fn snake_ident(name: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}
