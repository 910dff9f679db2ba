//! Synthesis of the container wiring module and its identifier
//! declarations from the unified discovery output.
//!
//! Generation is a pure function of its inputs: services are ordered by
//! `(file_path, class_name)` before emission and every intermediate
//! structure iterates deterministically, so identical inputs yield
//! byte-identical output.

use crate::error::CodegenError;
use crate::manifest::IngestOutput;
use crate::scanner::{
    normalize_path, DependencyDescriptor, DependencyForm, DiscoveredService, RetryHints,
};
use crate::templates::{
    render_template, CONTAINER_MODULE_TEMPLATE, DECLARATIONS_TEMPLATE,
    SERVICE_IDENTIFIERS_TEMPLATE,
};
use alloy_core::ServiceScope;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Everything codegen needs to synthesize the wiring module
pub struct CodegenInput<'a> {
    pub local_services: &'a [DiscoveredService],
    pub ingested: &'a IngestOutput,
    /// Union of scanner and ingestor deferred-reference keys
    pub deferred_keys: &'a BTreeSet<String>,
    /// Provider module specifiers: project-relative file paths or bare
    /// crate paths
    pub providers: &'a [String],
    /// Identifier keys of services to emit as factory-deferred stubs
    pub lazy_services: &'a BTreeSet<String>,
    pub project_root: &'a Path,
}

/// The two synthesized texts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOutput {
    /// The container wiring module
    pub module: String,
    /// The ambient identifier declarations
    pub declarations: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Manifest,
}

struct EmitService {
    service: DiscoveredService,
    origin: Origin,
    /// Name used in the generated code; aliased on class-name collisions
    emitted_name: String,
    /// Key the service exports under in `service_identifiers`
    export_key: String,
    /// Crate path the class is importable from
    module_path: String,
    /// The crate path of the module the service's file defines
    file_module: String,
    is_stub: bool,
}

/// Synthesize the wiring module and declarations
pub fn generate(input: &CodegenInput) -> Result<GeneratedOutput, CodegenError> {
    let mut all: Vec<(DiscoveredService, Origin)> = input
        .local_services
        .iter()
        .cloned()
        .map(|service| (service, Origin::Local))
        .chain(
            input
                .ingested
                .services
                .iter()
                .cloned()
                .map(|service| (service, Origin::Manifest)),
        )
        .collect();
    all.sort_by(|(a, _), (b, _)| {
        (a.file_path.as_str(), a.class_name.as_str())
            .cmp(&(b.file_path.as_str(), b.class_name.as_str()))
    });

    detect_duplicates(&all)?;

    // filter services referenced only through deferral, then reinstate
    // any that some eager dependency expression also names
    let deferred_marked: Vec<bool> = all
        .iter()
        .map(|(service, _)| {
            input
                .deferred_keys
                .contains(&format!("{}::{}", service.file_path, service.class_name))
        })
        .collect();
    let eager_identifier_names: BTreeSet<&str> = all
        .iter()
        .zip(&deferred_marked)
        .filter(|(_, marked)| !**marked)
        .flat_map(|((service, _), _)| service.metadata.dependencies.iter())
        .filter(|dependency| !dependency.is_deferred)
        .flat_map(|dependency| dependency.referenced_identifiers.iter().map(String::as_str))
        .collect();
    let active: Vec<(DiscoveredService, Origin)> = all
        .iter()
        .zip(&deferred_marked)
        .filter(|((service, _), marked)| {
            !**marked || eager_identifier_names.contains(service.class_name.as_str())
        })
        .map(|((service, origin), _)| (service.clone(), *origin))
        .collect();

    // factory-deferral augmentation from the configured identifier keys
    for identifier in input.lazy_services {
        if !identifier.starts_with("alloy:") {
            return Err(CodegenError::UnsupportedLazyIdentifier {
                identifier: identifier.clone(),
            });
        }
        if !active
            .iter()
            .any(|(service, _)| &service.identifier_key == identifier)
        {
            tracing::warn!(identifier = %identifier, "lazy_services entry matches no discovered service");
        }
    }

    // collision aliasing
    let mut names: BTreeMap<&str, usize> = BTreeMap::new();
    for (service, _) in &active {
        *names.entry(service.class_name.as_str()).or_default() += 1;
    }
    let collisions: BTreeSet<String> = names
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, _)| name.to_string())
        .collect();

    let services: Vec<EmitService> = active
        .into_iter()
        .map(|(service, origin)| {
            let is_stub = input.lazy_services.contains(&service.identifier_key)
                && service.metadata.factory.is_none();
            let (emitted_name, export_key) = if collisions.contains(&service.class_name) {
                let digest = hash36(&service.file_path);
                (
                    format!("{}__{}", service.class_name, digest),
                    format!("{}_{}", service.class_name, digest),
                )
            } else {
                (service.class_name.clone(), service.class_name.clone())
            };
            let module_path = module_path_for(&service, origin, input.project_root);
            let file_module = module_path.clone();
            EmitService {
                service,
                origin,
                emitted_name,
                export_key,
                module_path,
                file_module,
                is_stub,
            }
        })
        .collect();

    let imports = resolve_imports(&services, input.project_root);
    let actives_by_location: HashMap<(String, String), usize> = services
        .iter()
        .enumerate()
        .map(|(index, emit)| {
            (
                (emit.service.file_path.clone(), emit.service.class_name.clone()),
                index,
            )
        })
        .collect();

    let context = EmitContext {
        all: &all,
        services: &services,
        imports: &imports,
        actives_by_location: &actives_by_location,
        project_root: input.project_root,
    };

    let module = render_module(input, &context)?;
    let declarations = render_declarations(&context)?;

    Ok(GeneratedOutput {
        module,
        declarations,
    })
}

struct EmitContext<'a> {
    all: &'a [(DiscoveredService, Origin)],
    services: &'a [EmitService],
    imports: &'a ImportTable,
    actives_by_location: &'a HashMap<(String, String), usize>,
    project_root: &'a Path,
}

fn detect_duplicates(all: &[(DiscoveredService, Origin)]) -> Result<(), CodegenError> {
    let mut by_name: BTreeMap<&str, (Vec<&str>, Vec<&str>)> = BTreeMap::new();
    for (service, origin) in all {
        let entry = by_name.entry(service.class_name.as_str()).or_default();
        match origin {
            Origin::Local => entry.0.push(service.file_path.as_str()),
            Origin::Manifest => entry.1.push(service.file_path.as_str()),
        }
    }
    for (class_name, (local, manifest)) in by_name {
        if !local.is_empty() && !manifest.is_empty() {
            return Err(CodegenError::DuplicateRegistration {
                class_name: class_name.to_string(),
                local_paths: local.join(", "),
                manifest_path: manifest.join(", "),
            });
        }
    }
    Ok(())
}

/// Canonical import table: `(module_path, original_name)` mapped to the
/// final local name after collision renumbering. References to
/// factory-deferred services route to their locally declared stubs
/// instead of importing the real class.
struct ImportTable {
    locals: HashMap<(String, String), String>,
    stubs: HashMap<(String, String), String>,
    use_lines: String,
}

fn resolve_imports(services: &[EmitService], project_root: &Path) -> ImportTable {
    let stubs: HashMap<(String, String), String> = services
        .iter()
        .filter(|emit| emit.is_stub)
        .map(|emit| {
            (
                (emit.module_path.clone(), emit.service.class_name.clone()),
                emit.emitted_name.clone(),
            )
        })
        .collect();

    // first insertion wins, and service-class imports are authoritative
    let mut requested: BTreeMap<(String, String), String> = BTreeMap::new();
    for emit in services {
        if !emit.is_stub {
            requested
                .entry((emit.module_path.clone(), emit.service.class_name.clone()))
                .or_insert_with(|| emit.emitted_name.clone());
        }
        for import in &emit.service.referenced_imports {
            let key = import_key(emit, import, project_root);
            if stubs.contains_key(&key) {
                continue;
            }
            requested
                .entry(key)
                .or_insert_with(|| import.local_name.clone());
        }
    }

    // disambiguate local-name clashes with counters
    let mut by_local: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for (key, local) in &requested {
        by_local.entry(local.clone()).or_default().push(key.clone());
    }
    let mut locals: HashMap<(String, String), String> = HashMap::new();
    for (local, keys) in by_local {
        for (index, key) in keys.into_iter().enumerate() {
            let resolved = if index == 0 {
                local.clone()
            } else {
                format!("{}_{}", local, index)
            };
            locals.insert(key, resolved);
        }
    }

    let mut use_lines = String::new();
    for (key, _) in &requested {
        let local = &locals[key];
        let (module_path, original) = key;
        if local == original {
            use_lines.push_str(&format!("use {}::{};\n", module_path, original));
        } else {
            use_lines.push_str(&format!("use {}::{} as {};\n", module_path, original, local));
        }
    }

    ImportTable {
        locals,
        stubs,
        use_lines,
    }
}

fn render_module(input: &CodegenInput, context: &EmitContext) -> Result<String, CodegenError> {
    let services = context.services;
    let any_active = !services.is_empty();
    let any_deferred = services.iter().any(|emit| {
        emit.is_stub
            || emit.service.metadata.factory.is_some()
            || emit
                .service
                .metadata
                .dependencies
                .iter()
                .any(|dependency| dependency.is_deferred)
    });
    let providers: Vec<String> = input
        .providers
        .iter()
        .cloned()
        .chain(input.ingested.providers.iter().cloned())
        .collect();

    // the registration loop and the registrations signature are part of
    // the fixed module shape, so their imports are unconditional; only
    // the deferral helpers and provider application come and go
    let mut runtime_imports = String::from(
        "use alloy_core::{dependencies_registry, Container, CoreError, DependencyExpr, ServiceCtor, ServiceRegistration, ServiceScope};\nuse alloy_core::{register_service_identifier, ServiceIdentifier};\n",
    );
    if any_deferred {
        runtime_imports.push_str("use alloy_core::{Lazy, RetryPolicy};\n");
    }
    if !providers.is_empty() {
        runtime_imports.push_str("use alloy_core::apply_providers;\n");
    }

    let mut stubs = String::new();
    for emit in services.iter().filter(|emit| emit.is_stub) {
        stubs.push_str(&format!(
            "/// Deferred-service placeholder; the real `{}` is fetched at resolution time\npub struct {};\n",
            emit.service.class_name, emit.emitted_name
        ));
    }
    if !stubs.is_empty() {
        stubs.push('\n');
    }

    let mut provider_modules = String::new();
    let mut provider_calls = Vec::new();
    for (index, provider) in providers.iter().enumerate() {
        if provider.contains("::") {
            provider_modules.push_str(&format!("use {} as providers_{};\n", provider, index));
        } else {
            let absolute = normalize_path(&context.project_root.join(provider));
            provider_modules.push_str(&format!(
                "#[path = \"{}\"]\nmod providers_{};\n",
                escape(&absolute),
                index
            ));
        }
        provider_calls.push(format!("providers_{}::provider()", index));
    }
    if !provider_modules.is_empty() {
        provider_modules.push('\n');
    }

    let mut registrations = String::new();
    for emit in services {
        registrations.push_str(&registration_row(emit, context)?);
    }

    let apply_providers = if provider_calls.is_empty() {
        String::new()
    } else {
        format!(
            "    apply_providers(&container, vec![{}])?;\n",
            provider_calls.join(", ")
        )
    };

    let service_identifiers = if any_active {
        let mut entries = String::new();
        for emit in services {
            entries.push_str(&format!(
                "    /// `{}`\n    pub fn {}() -> ServiceIdentifier {{\n        ServiceIdentifier::for_key(\"{}\")\n    }}\n",
                emit.export_key,
                snake_case(&emit.export_key),
                escape(&emit.service.identifier_key)
            ));
        }
        let mut identifiers_context = HashMap::new();
        identifiers_context.insert("entries", entries);
        render_template(SERVICE_IDENTIFIERS_TEMPLATE, &identifiers_context)?
    } else {
        String::new()
    };

    let mut module_context = HashMap::new();
    module_context.insert("runtime_imports", runtime_imports);
    module_context.insert("dependency_imports", {
        let mut lines = context.imports.use_lines.clone();
        if !lines.is_empty() {
            lines.push('\n');
        }
        lines
    });
    module_context.insert("stubs", stubs);
    module_context.insert("provider_modules", provider_modules);
    module_context.insert("registrations", registrations);
    module_context.insert("apply_providers", apply_providers);
    module_context.insert("service_identifiers", service_identifiers);

    render_template(CONTAINER_MODULE_TEMPLATE, &module_context)
}

fn registration_row(emit: &EmitService, context: &EmitContext) -> Result<String, CodegenError> {
    let scope = scope_text(emit.service.metadata.scope);
    let arity = emit.service.metadata.dependencies.len();

    let ctor = if emit.is_stub {
        format!("ServiceCtor::placeholder::<{}>()", emit.emitted_name)
    } else {
        format!(
            "ServiceCtor::new::<{}, _>({})",
            emit.emitted_name,
            construct_closure(&emit.emitted_name, arity)
        )
    };

    let mut registration = format!("ServiceRegistration::new({}, {})", ctor, scope);

    if arity > 0 {
        let mut expressions = Vec::with_capacity(arity);
        for dependency in &emit.service.metadata.dependencies {
            expressions.push(dependency_expr_text(
                dependency,
                ResolveMode::Aliased(emit),
                context,
                &mut BTreeSet::new(),
            ));
        }
        registration.push_str(&format!(
            ".with_dependencies(|| vec![{}])",
            expressions.join(", ")
        ));
    }

    if emit.is_stub {
        let real_path = format!("{}::{}", emit.module_path, emit.service.class_name);
        registration.push_str(&format!(
            ".with_factory(Lazy::from_ctor(|| ServiceCtor::new::<{}, _>({})).with_target(\"{}\"))",
            real_path,
            construct_closure(&real_path, arity),
            escape(&real_path)
        ));
    } else if let Some(factory) = &emit.service.metadata.factory {
        let expression = dependency_expr_text(
            factory,
            ResolveMode::Aliased(emit),
            context,
            &mut BTreeSet::new(),
        );
        // a factory descriptor is a deferred expression; unwrap the
        // DependencyExpr::lazy(..) shell down to the Lazy value
        let lazy = expression
            .strip_prefix("DependencyExpr::lazy(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(&expression)
            .to_string();
        registration.push_str(&format!(".with_factory({})", lazy));
    }

    Ok(format!(
        "        (\n            {},\n            ServiceIdentifier::for_key(\"{}\"),\n        ),\n",
        registration,
        escape(&emit.service.identifier_key)
    ))
}

enum ResolveMode<'a> {
    /// Top-level emission: identifiers resolve through the import table
    Aliased(&'a EmitService),
    /// Inside an importer closure: identifiers resolve to absolute paths
    Absolute {
        service: &'a DiscoveredService,
        file_module: String,
        origin: Origin,
    },
}

fn dependency_expr_text(
    dependency: &DependencyDescriptor,
    mode: ResolveMode<'_>,
    context: &EmitContext,
    visited: &mut BTreeSet<String>,
) -> String {
    match &dependency.form {
        DependencyForm::Service { path } => {
            format!("DependencyExpr::key::<{}>()", resolve_path(path, &mode, context))
        }
        DependencyForm::Token { path } => {
            format!("DependencyExpr::token(&{})", resolve_path(path, &mode, context))
        }
        DependencyForm::Unresolved { name } => {
            format!("DependencyExpr::unresolved(\"{}\")", escape(name))
        }
        DependencyForm::Deferred {
            target_path,
            export_name,
        } => {
            let (file_module, origin) = match &mode {
                ResolveMode::Aliased(emit) => (emit.file_module.clone(), emit.origin),
                ResolveMode::Absolute {
                    file_module,
                    origin,
                    ..
                } => (file_module.clone(), *origin),
            };
            let absolute = absolute_target_path(origin, &file_module, target_path);
            let importer = deferred_importer_text(&absolute, export_name, context, visited);
            let retry = dependency
                .retry
                .map(|retry| format!(".with_retry({})", retry_text(&retry)))
                .unwrap_or_default();
            format!(
                "DependencyExpr::lazy({}.with_target(\"{}\"){})",
                importer,
                escape(&absolute),
                retry
            )
        }
    }
}

/// Emit the importer for a deferred target. When the target is a
/// discovered service, loading it also registers its metadata, the way
/// executing its module would; unknown targets fall back to a bare
/// zero-argument constructor.
fn deferred_importer_text(
    absolute_target: &str,
    export_name: &str,
    context: &EmitContext,
    visited: &mut BTreeSet<String>,
) -> String {
    let (module, _) = split_path_tail(absolute_target);
    let known = context.all.iter().find(|(service, origin)| {
        service.class_name == export_name
            && module_path_for(service, *origin, context.project_root) == module
    });

    let fresh = visited.insert(absolute_target.to_string());
    match known {
        Some((service, origin)) if fresh => {
            let arity = service.metadata.dependencies.len();
            let ctor = format!(
                "ServiceCtor::new::<{}, _>({})",
                absolute_target,
                construct_closure(absolute_target, arity)
            );
            let mut registration = format!(
                "ServiceRegistration::new(ctor.clone(), {})",
                scope_text(service.metadata.scope)
            );
            if arity > 0 {
                let file_module = module_path_for(service, *origin, context.project_root);
                let expressions: Vec<String> = service
                    .metadata
                    .dependencies
                    .iter()
                    .map(|dependency| {
                        dependency_expr_text(
                            dependency,
                            ResolveMode::Absolute {
                                service,
                                file_module: file_module.clone(),
                                origin: *origin,
                            },
                            context,
                            visited,
                        )
                    })
                    .collect();
                registration.push_str(&format!(
                    ".with_dependencies(|| vec![{}])",
                    expressions.join(", ")
                ));
            }
            format!(
                "Lazy::from_ctor(|| {{ let ctor = {}; let _ = dependencies_registry().insert({}); ctor }})",
                ctor, registration
            )
        }
        _ => format!(
            "Lazy::from_ctor(|| ServiceCtor::new::<{}, _>(|_args| Ok({}::new())))",
            absolute_target, absolute_target
        ),
    }
}

fn resolve_path(path: &str, mode: &ResolveMode<'_>, context: &EmitContext) -> String {
    if path.contains("::") {
        match mode {
            ResolveMode::Aliased(_) => path.to_string(),
            ResolveMode::Absolute {
                file_module,
                origin,
                ..
            } => absolute_target_path(*origin, file_module, path),
        }
    } else {
        match mode {
            ResolveMode::Aliased(emit) => resolve_aliased_ident(emit, path, context),
            ResolveMode::Absolute {
                service,
                file_module,
                origin,
            } => resolve_absolute_ident(service, file_module, *origin, path, context.project_root),
        }
    }
}

/// Canonical import-table key: the module path resolved absolute
/// against the file the import was written in. Manifest-matched
/// dependencies record the candidate's file path; those become crate
/// paths here so the emitted `use` lines stay valid.
fn import_key(
    emit: &EmitService,
    import: &crate::scanner::ReferencedImport,
    project_root: &Path,
) -> (String, String) {
    let module = if import.module_path.contains('/') {
        crate_path_of_file(&import.module_path, project_root)
    } else {
        absolute_target_path(emit.origin, &emit.file_module, &import.module_path)
    };
    (module, import.original_name.clone())
}

fn resolve_aliased_ident(emit: &EmitService, ident: &str, context: &EmitContext) -> String {
    if let Some(import) = emit
        .service
        .referenced_imports
        .iter()
        .find(|import| import.local_name == ident)
    {
        let key = import_key(emit, import, context.project_root);
        // eager references to a factory-deferred service land on its stub
        if let Some(stub) = context.imports.stubs.get(&key) {
            return stub.clone();
        }
        if let Some(local) = context.imports.locals.get(&key) {
            return local.clone();
        }
        return ident.to_string();
    }
    // a service declared in the same file
    let peer = context
        .actives_by_location
        .get(&(emit.service.file_path.clone(), ident.to_string()));
    if let Some(index) = peer {
        return context.services[*index].emitted_name.clone();
    }
    ident.to_string()
}

fn resolve_absolute_ident(
    service: &DiscoveredService,
    file_module: &str,
    origin: Origin,
    ident: &str,
    project_root: &Path,
) -> String {
    if let Some(import) = service
        .referenced_imports
        .iter()
        .find(|import| import.local_name == ident)
    {
        let module = if import.module_path.contains('/') {
            crate_path_of_file(&import.module_path, project_root)
        } else {
            absolute_target_path(origin, file_module, &import.module_path)
        };
        return format!("{}::{}", module, import.original_name);
    }
    format!("{}::{}", file_module, ident)
}

/// Rewrite a possibly-relative module path to its absolute form,
/// resolved against the module the referencing file defines
fn absolute_target_path(origin: Origin, file_module: &str, target: &str) -> String {
    if origin == Origin::Manifest || target.starts_with("crate::") || target == "crate" {
        return target.to_string();
    }
    let mut base: Vec<&str> = file_module.split("::").collect();
    let mut segments = target.split("::").peekable();
    while let Some(&segment) = segments.peek() {
        match segment {
            "self" => {
                segments.next();
            }
            "super" => {
                segments.next();
                base.pop();
                if base.is_empty() {
                    base.push("crate");
                }
            }
            _ => break,
        }
    }
    for segment in segments {
        base.push(segment);
    }
    base.join("::")
}

fn render_declarations(context: &EmitContext) -> Result<String, CodegenError> {
    let mut entries = String::new();
    for emit in context.services {
        entries.push_str(&format!(
            "    /// `{}`\n    pub fn {}() -> ServiceIdentifier {{\n        ServiceIdentifier::for_key(\"{}\")\n    }}\n",
            emit.export_key,
            snake_case(&emit.export_key),
            escape(&emit.service.identifier_key)
        ));
    }

    let mut packages = String::new();
    let mut by_package: BTreeMap<String, Vec<&EmitService>> = BTreeMap::new();
    for emit in context.services {
        if emit.origin == Origin::Manifest {
            by_package
                .entry(scope_prefix(&emit.service.file_path).to_string())
                .or_default()
                .push(emit);
        }
    }
    for (package, services) in by_package {
        packages.push_str(&format!(
            "\n/// Identifiers contributed by the `{}` manifest\npub mod {} {{\n    use alloy_core::ServiceIdentifier;\n\n",
            package,
            snake_case(&package)
        ));
        for emit in services {
            packages.push_str(&format!(
                "    /// `{}`\n    pub fn {}() -> ServiceIdentifier {{\n        ServiceIdentifier::for_key(\"{}\")\n    }}\n",
                emit.export_key,
                snake_case(&emit.export_key),
                escape(&emit.service.identifier_key)
            ));
        }
        packages.push_str("}\n");
    }

    let mut declarations_context = HashMap::new();
    declarations_context.insert("entries", entries);
    declarations_context.insert("packages", packages);
    render_template(DECLARATIONS_TEMPLATE, &declarations_context)
}

fn module_path_for(service: &DiscoveredService, origin: Origin, project_root: &Path) -> String {
    match origin {
        Origin::Manifest => service.file_path.clone(),
        Origin::Local => crate_path_of_file(&service.file_path, project_root),
    }
}

/// Crate path of the module a project source file defines
fn crate_path_of_file(file_path: &str, project_root: &Path) -> String {
    let root = format!("{}/src/", normalize_path(project_root));
    let relative = file_path.strip_prefix(&root).unwrap_or(file_path);
    let trimmed = relative.strip_suffix(".rs").unwrap_or(relative);
    let mut segments: Vec<&str> = trimmed.split('/').collect();
    if segments.last() == Some(&"mod") {
        segments.pop();
    }
    if segments == ["lib"] || segments == ["main"] {
        return "crate".to_string();
    }
    format!("crate::{}", segments.join("::"))
}

fn split_path_tail(path: &str) -> (String, String) {
    match path.rfind("::") {
        Some(index) => (path[..index].to_string(), path[index + 2..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

fn scope_prefix(specifier: &str) -> &str {
    let end = specifier
        .find("::")
        .or_else(|| specifier.find('/'))
        .unwrap_or(specifier.len());
    &specifier[..end]
}

fn construct_closure(type_path: &str, arity: usize) -> String {
    if arity == 0 {
        format!("|_args| Ok({}::new())", type_path)
    } else {
        let takes = vec!["args.take()?"; arity].join(", ");
        format!("|mut args| Ok({}::new({}))", type_path, takes)
    }
}

fn scope_text(scope: ServiceScope) -> &'static str {
    match scope {
        ServiceScope::Singleton => "ServiceScope::Singleton",
        ServiceScope::Transient => "ServiceScope::Transient",
    }
}

fn retry_text(retry: &RetryHints) -> String {
    format!(
        "RetryPolicy {{ attempts_after_first: {}, initial_backoff_ms: {}, factor: {:?} }}",
        retry.attempts_after_first, retry.initial_backoff_ms, retry.factor
    )
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn snake_case(name: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch == '-' || ch == ' ' || ch == '.' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Stable short digest of a normalized path, rendered base-36
fn hash36(value: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in value.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    let mut n = hash;
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    let rendered: String = out.into_iter().map(char::from).collect();
    rendered.chars().take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash36_is_stable_and_short() {
        let a = hash36("/project/src/a.rs");
        assert_eq!(a, hash36("/project/src/a.rs"));
        assert!(a.len() <= 6);
        assert_ne!(a, hash36("/project/src/b.rs"));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Database"), "database");
        assert_eq!(snake_case("PdfRenderer"), "pdf_renderer");
        assert_eq!(snake_case("Service_1k2j"), "service_1k2j");
        assert_eq!(snake_case("acme-billing"), "acme_billing");
    }

    #[test]
    fn test_absolute_target_path_resolution() {
        assert_eq!(
            absolute_target_path(Origin::Local, "crate::services::user", "reports::Engine"),
            "crate::services::user::reports::Engine"
        );
        assert_eq!(
            absolute_target_path(Origin::Local, "crate::services::user", "super::db::Pool"),
            "crate::services::db::Pool"
        );
        assert_eq!(
            absolute_target_path(Origin::Local, "crate::services", "crate::reports::Engine"),
            "crate::reports::Engine"
        );
        assert_eq!(
            absolute_target_path(Origin::Manifest, "acme::x", "acme::render::Pdf"),
            "acme::render::Pdf"
        );
    }

    #[test]
    fn test_module_path_for_local_files() {
        let mut service = DiscoveredService {
            class_name: "X".into(),
            file_path: "/project/src/services/db.rs".into(),
            identifier_key: "alloy:app/src/services/db.rs#X".into(),
            metadata: crate::scanner::ServiceMetadata {
                scope: ServiceScope::Transient,
                dependencies: Vec::new(),
                factory: None,
            },
            referenced_imports: Vec::new(),
        };
        let root = Path::new("/project");
        assert_eq!(
            module_path_for(&service, Origin::Local, root),
            "crate::services::db"
        );
        service.file_path = "/project/src/services/db/mod.rs".into();
        assert_eq!(
            module_path_for(&service, Origin::Local, root),
            "crate::services::db"
        );
        service.file_path = "/project/src/lib.rs".into();
        assert_eq!(module_path_for(&service, Origin::Local, root), "crate");
    }
}
