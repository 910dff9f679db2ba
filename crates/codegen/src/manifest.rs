//! Library manifests: the declarative descriptors prebuilt libraries
//! ship, and their ingestion into the discovered-service shape.

use crate::error::CodegenError;
use crate::scanner::{
    DependencyDescriptor, DependencyForm, DiscoveredService, ReferencedImport, RetryHints,
    ServiceMetadata,
};
use alloy_core::ServiceScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The manifest schema version this compiler understands
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// How a library build laid out its public modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    /// Every source module keeps a stable public subpath
    PreserveModules,
    /// Modules grouped into chunks
    Chunks,
    /// A single flat bundle
    Bundled,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreserveModules => write!(f, "preserve-modules"),
            Self::Chunks => write!(f, "chunks"),
            Self::Bundled => write!(f, "bundled"),
        }
    }
}

/// Retry options in their on-disk manifest shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRetry {
    pub retries: u32,
    #[serde(default)]
    pub backoff_ms: u64,
    #[serde(default = "default_retry_factor")]
    pub factor: f64,
}

fn default_retry_factor() -> f64 {
    2.0
}

impl From<ManifestRetry> for RetryHints {
    fn from(retry: ManifestRetry) -> Self {
        Self {
            attempts_after_first: retry.retries,
            initial_backoff_ms: retry.backoff_ms,
            factor: retry.factor,
        }
    }
}

/// A token dependency of a manifest service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDep {
    pub export_name: String,
    pub import_path: String,
}

/// A deferred dependency of a manifest service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredDep {
    pub export_name: String,
    pub import_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<ManifestRetry>,
}

/// One service described by a library manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestService {
    pub export_name: String,
    /// Public specifier consumers import the service from
    pub import_path: String,
    pub symbol_key: String,
    #[serde(default)]
    pub scope: ServiceScope,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub token_deps: Vec<TokenDep>,
    #[serde(default)]
    pub deferred_deps: Vec<DeferredDep>,
}

/// A prebuilt library's declarative service descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryManifest {
    /// Missing is tolerated and treated as the current version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    pub package_name: String,
    pub build_mode: BuildMode,
    #[serde(default)]
    pub services: Vec<ManifestService>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl LibraryManifest {
    /// Validate the record against the schema this compiler understands
    pub fn validate(&self) -> Result<(), CodegenError> {
        match self.schema_version {
            None => Ok(()),
            Some(MANIFEST_SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(CodegenError::invalid_manifest(
                &self.package_name,
                format!(
                    "unknown schema version {} (expected {})",
                    other, MANIFEST_SCHEMA_VERSION
                ),
            )),
        }
    }
}

/// Aggregated output of manifest ingestion
#[derive(Debug, Clone, Default)]
pub struct IngestOutput {
    /// Manifest services materialized into the discovered-service shape
    pub services: Vec<DiscoveredService>,
    /// Provider module specifiers contributed by manifests
    pub providers: Vec<String>,
    /// Deferred-reference keys contributed by deferred deps
    pub deferred_keys: BTreeSet<String>,
    /// Names of the packages that were successfully ingested
    pub packages: Vec<String>,
}

/// Ingest a sequence of manifest records.
///
/// Records that fail to deserialize or validate are skipped with a
/// warning; a bad manifest from an independent build must never abort
/// the compilation.
pub fn ingest_manifests(
    records: &[serde_json::Value],
    discovered: &[DiscoveredService],
) -> IngestOutput {
    let mut output = IngestOutput::default();
    let mut known: Vec<DiscoveredService> = discovered.to_vec();

    for record in records {
        let manifest: LibraryManifest = match serde_json::from_value(record.clone()) {
            Ok(manifest) => manifest,
            Err(error) => {
                tracing::warn!(%error, "skipping malformed library manifest");
                continue;
            }
        };
        if let Err(error) = manifest.validate() {
            tracing::warn!(%error, package = %manifest.package_name, "skipping library manifest");
            continue;
        }
        for diagnostic in &manifest.diagnostics {
            tracing::debug!(package = %manifest.package_name, "{}", diagnostic);
        }

        for service in &manifest.services {
            let materialized = materialize_service(service, &known, &mut output.deferred_keys);
            known.push(materialized.clone());
            output.services.push(materialized);
        }
        output.providers.extend(manifest.providers.iter().cloned());
        output.packages.push(manifest.package_name.clone());
    }

    output
}

/// Turn a manifest service into the discovered-service shape.
fn materialize_service(
    service: &ManifestService,
    known: &[DiscoveredService],
    deferred_keys: &mut BTreeSet<String>,
) -> DiscoveredService {
    let mut dependencies = Vec::new();
    let mut referenced_imports = Vec::new();

    for name in &service.deps {
        match best_match(name, &service.import_path, known) {
            Some(candidate) => {
                dependencies.push(DependencyDescriptor {
                    expression: candidate.class_name.clone(),
                    referenced_identifiers: vec![candidate.class_name.clone()],
                    is_deferred: false,
                    retry: None,
                    form: DependencyForm::Service {
                        path: candidate.class_name.clone(),
                    },
                });
                referenced_imports.push(ReferencedImport {
                    local_name: candidate.class_name.clone(),
                    module_path: candidate.file_path.clone(),
                    original_name: candidate.class_name.clone(),
                });
            }
            // keep the name verbatim; resolution fails if truly missing
            None => dependencies.push(DependencyDescriptor {
                expression: name.clone(),
                referenced_identifiers: vec![name.clone()],
                is_deferred: false,
                retry: None,
                form: DependencyForm::Unresolved { name: name.clone() },
            }),
        }
    }

    for token in &service.token_deps {
        dependencies.push(DependencyDescriptor {
            expression: format!("token({})", token.export_name),
            referenced_identifiers: vec![token.export_name.clone()],
            is_deferred: false,
            retry: None,
            form: DependencyForm::Token {
                path: token.export_name.clone(),
            },
        });
        referenced_imports.push(ReferencedImport {
            local_name: token.export_name.clone(),
            module_path: token.import_path.clone(),
            original_name: token.export_name.clone(),
        });
    }

    for deferred in &service.deferred_deps {
        let target_path = format!("{}::{}", deferred.import_path, deferred.export_name);
        let mut expression = format!("lazy({}", target_path);
        if let Some(retry) = &deferred.retry {
            expression.push_str(&format!(", retries = {}", retry.retries));
            if retry.backoff_ms != 0 {
                expression.push_str(&format!(", backoff_ms = {}", retry.backoff_ms));
            }
            if retry.factor != default_retry_factor() {
                expression.push_str(&format!(", factor = {}", retry.factor));
            }
        }
        expression.push(')');

        dependencies.push(DependencyDescriptor {
            expression,
            referenced_identifiers: vec![deferred.export_name.clone()],
            is_deferred: true,
            retry: deferred.retry.map(RetryHints::from),
            form: DependencyForm::Deferred {
                target_path: target_path.clone(),
                export_name: deferred.export_name.clone(),
            },
        });
        // elide any eager import of the deferred target
        deferred_keys.insert(target_path);
    }

    DiscoveredService {
        class_name: service.export_name.clone(),
        file_path: service.import_path.clone(),
        identifier_key: service.symbol_key.clone(),
        metadata: ServiceMetadata {
            scope: service.scope,
            dependencies,
            factory: None,
        },
        referenced_imports,
    }
}

/// Best-match selection for a manifest dependency name: exact unique
/// match, then a shared scope prefix with the manifest's import path,
/// then the first candidate.
fn best_match<'a>(
    name: &str,
    import_path: &str,
    known: &'a [DiscoveredService],
) -> Option<&'a DiscoveredService> {
    let candidates: Vec<&DiscoveredService> = known
        .iter()
        .filter(|service| service.class_name == name)
        .collect();
    match candidates.as_slice() {
        [] => None,
        [only] => Some(only),
        many => {
            let scope = scope_prefix(import_path);
            many.iter()
                .find(|candidate| scope_prefix(&candidate.file_path) == scope)
                .copied()
                .or_else(|| many.first().copied())
        }
    }
}

/// The leading segment of a specifier: the crate for bare paths, the
/// first directory component for file paths.
fn scope_prefix(specifier: &str) -> &str {
    let specifier = specifier.trim_start_matches('/');
    let end = specifier
        .find("::")
        .or_else(|| specifier.find('/'))
        .unwrap_or(specifier.len());
    &specifier[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn billing_manifest() -> serde_json::Value {
        json!({
            "schemaVersion": 1,
            "packageName": "acme-billing",
            "buildMode": "preserve-modules",
            "services": [
                {
                    "exportName": "Invoicer",
                    "importPath": "acme_billing::services",
                    "symbolKey": "alloy:acme-billing/src/services.rs#Invoicer",
                    "scope": "singleton",
                    "deps": ["Ledger"],
                    "tokenDeps": [
                        {"exportName": "BILLING_CONFIG", "importPath": "acme_billing::config"}
                    ],
                    "deferredDeps": [
                        {
                            "exportName": "PdfRenderer",
                            "importPath": "acme_billing::render",
                            "retry": {"retries": 2, "backoffMs": 10}
                        }
                    ]
                }
            ],
            "providers": ["acme_billing::wiring"]
        })
    }

    fn local_ledger() -> DiscoveredService {
        DiscoveredService {
            class_name: "Ledger".to_string(),
            file_path: "/project/src/ledger.rs".to_string(),
            identifier_key: "alloy:app/src/ledger.rs#Ledger".to_string(),
            metadata: ServiceMetadata {
                scope: ServiceScope::Singleton,
                dependencies: Vec::new(),
                factory: None,
            },
            referenced_imports: Vec::new(),
        }
    }

    #[test]
    fn test_ingest_materializes_services_and_providers() {
        let output = ingest_manifests(&[billing_manifest()], &[local_ledger()]);

        assert_eq!(output.packages, vec!["acme-billing"]);
        assert_eq!(output.providers, vec!["acme_billing::wiring"]);
        assert_eq!(output.services.len(), 1);

        let invoicer = &output.services[0];
        assert_eq!(invoicer.class_name, "Invoicer");
        assert_eq!(invoicer.file_path, "acme_billing::services");
        assert_eq!(invoicer.metadata.scope, ServiceScope::Singleton);
        assert_eq!(invoicer.metadata.dependencies.len(), 3);

        // name dep matched against the local discovery
        assert_eq!(
            invoicer.metadata.dependencies[0].form,
            DependencyForm::Service { path: "Ledger".into() }
        );
        // token dep carries its referenced import
        assert!(invoicer.referenced_imports.iter().any(|import| {
            import.local_name == "BILLING_CONFIG"
                && import.module_path == "acme_billing::config"
        }));
        // deferred dep reconstructs the deferral wrapper with retry options
        let deferred = &invoicer.metadata.dependencies[2];
        assert!(deferred.is_deferred);
        assert_eq!(
            deferred.expression,
            "lazy(acme_billing::render::PdfRenderer, retries = 2, backoff_ms = 10)"
        );
        assert!(output
            .deferred_keys
            .contains("acme_billing::render::PdfRenderer"));
    }

    #[test]
    fn test_unknown_schema_version_is_skipped() {
        let mut record = billing_manifest();
        record["schemaVersion"] = json!(9);
        let output = ingest_manifests(&[record], &[]);
        assert!(output.services.is_empty());
        assert!(output.packages.is_empty());
    }

    #[test]
    fn test_missing_schema_version_is_tolerated() {
        let mut record = billing_manifest();
        record.as_object_mut().unwrap().remove("schemaVersion");
        let output = ingest_manifests(&[record], &[local_ledger()]);
        assert_eq!(output.services.len(), 1);
    }

    #[test]
    fn test_malformed_manifest_does_not_abort_ingestion() {
        let malformed = json!({"packageName": 42});
        let output = ingest_manifests(&[malformed, billing_manifest()], &[local_ledger()]);
        assert_eq!(output.packages, vec!["acme-billing"]);
    }

    #[test]
    fn test_unmatched_dep_names_are_kept_verbatim() {
        let output = ingest_manifests(&[billing_manifest()], &[]);
        let invoicer = &output.services[0];
        assert_eq!(
            invoicer.metadata.dependencies[0].form,
            DependencyForm::Unresolved { name: "Ledger".into() }
        );
    }

    #[test]
    fn test_ambiguous_deps_prefer_the_shared_scope_prefix() {
        let mut other = local_ledger();
        other.file_path = "other_crate::ledger".to_string();
        let mut same_scope = local_ledger();
        same_scope.file_path = "acme_billing::ledger".to_string();

        let output = ingest_manifests(&[billing_manifest()], &[other, same_scope]);
        let invoicer = &output.services[0];
        assert!(invoicer.referenced_imports.iter().any(|import| {
            import.local_name == "Ledger" && import.module_path == "acme_billing::ledger"
        }));
    }
}
