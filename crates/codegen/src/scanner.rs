//! Source scanner: extracts annotated service declarations from one
//! source unit.
//!
//! Scanning is purely syntactic. A type is a service iff it carries an
//! attribute whose path tail is `injectable` or `singleton`; dependency
//! expressions are read from the attribute arguments, and every
//! `lazy(...)` call — in annotation arguments and in function bodies —
//! contributes deferred-reference keys for the module files its target
//! path may live in.

use crate::error::CodegenError;
use alloy_core::ServiceScope;
use quote::ToTokens;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use syn::punctuated::Punctuated;
use syn::visit::Visit;
use syn::{Expr, ExprCall, Item, Lit, Token, UseTree};

/// Retry options parsed from the literal arguments of a `lazy(...)` call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryHints {
    pub attempts_after_first: u32,
    #[serde(default)]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_factor() -> f64 {
    2.0
}

impl Default for RetryHints {
    fn default() -> Self {
        Self {
            attempts_after_first: 0,
            initial_backoff_ms: 0,
            factor: default_factor(),
        }
    }
}

/// Parsed structure of a dependency expression, used by codegen to
/// reconstruct it as well-typed generated code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DependencyForm {
    /// A plain service path, e.g. `Database` or `crate::db::Database`
    Service { path: String },
    /// A `lazy(<path>, ...)` call
    Deferred {
        target_path: String,
        export_name: String,
    },
    /// A `token(<path>)` call
    Token { path: String },
    /// A name kept verbatim; the runtime fails if it is ever resolved
    Unresolved { name: String },
}

/// One dependency of a discovered service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    /// Source text of the dependency argument
    pub expression: String,
    /// Identifier names referenced inside the expression, in order
    pub referenced_identifiers: Vec<String>,
    /// True iff the expression is a call to the deferral wrapper
    pub is_deferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryHints>,
    pub form: DependencyForm,
}

/// Scope and dependencies read from a service annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub scope: ServiceScope,
    pub dependencies: Vec<DependencyDescriptor>,
    /// Deferred import fetching the real constructor at resolution time;
    /// attached by codegen for factory-deferred services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<DependencyDescriptor>,
}

/// An import referenced by some dependency expression of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedImport {
    pub local_name: String,
    pub module_path: String,
    pub original_name: String,
}

/// A service declaration discovered in a source unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub class_name: String,
    /// Canonical slash-normalized source location; a bare crate path for
    /// manifest-ingested services
    pub file_path: String,
    /// `alloy:<package>/<relative-path>#<class-name>`
    pub identifier_key: String,
    pub metadata: ServiceMetadata,
    pub referenced_imports: Vec<ReferencedImport>,
}

/// Everything one scan produces
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub services: Vec<DiscoveredService>,
    /// `"<candidate-module-file>::<export-name>"` keys for every
    /// `lazy(...)` reference in the unit
    pub deferred_keys: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AnnotationKind {
    Injectable,
    Singleton,
}

#[derive(Debug, Clone)]
struct ImportBinding {
    local_name: String,
    module_path: String,
    original_name: String,
}

/// Syntactic scanner bound to one project
#[derive(Debug, Clone)]
pub struct Scanner {
    package_name: String,
    project_root: PathBuf,
    source_root: PathBuf,
}

impl Scanner {
    pub fn new(package_name: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let source_root = project_root.join("src");
        Self {
            package_name: package_name.into(),
            project_root,
            source_root,
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Scan one source unit. Parse errors propagate; unsupported
    /// annotation shapes silently leave the type undiscovered.
    pub fn scan(&self, source: &str, file_path: &Path) -> Result<ScanOutput, CodegenError> {
        let ast = syn::parse_file(source).map_err(|error| {
            CodegenError::parse(normalize_path(file_path), error.to_string())
        })?;

        let mut output = ScanOutput::default();
        let imports = collect_imports(&ast.items);

        self.scan_items(&ast.items, file_path, &imports, &mut output);

        let mut body_calls = LazyCallCollector {
            scanner: self,
            file_path,
            keys: BTreeSet::new(),
        };
        body_calls.visit_file(&ast);
        output.deferred_keys.extend(body_calls.keys);

        tracing::debug!(
            file = %normalize_path(file_path),
            services = output.services.len(),
            deferred_keys = output.deferred_keys.len(),
            "scanned source unit"
        );

        Ok(output)
    }

    fn scan_items(
        &self,
        items: &[Item],
        file_path: &Path,
        imports: &[ImportBinding],
        output: &mut ScanOutput,
    ) {
        for item in items {
            match item {
                Item::Struct(item_struct) => {
                    if let Some(service) =
                        self.discover_service(&item_struct.ident, &item_struct.attrs, file_path, imports, output)
                    {
                        output.services.push(service);
                    }
                }
                Item::Mod(item_mod) => {
                    if let Some((_, items)) = &item_mod.content {
                        self.scan_items(items, file_path, imports, output);
                    }
                }
                _ => {}
            }
        }
    }

    fn discover_service(
        &self,
        ident: &syn::Ident,
        attrs: &[syn::Attribute],
        file_path: &Path,
        imports: &[ImportBinding],
        output: &mut ScanOutput,
    ) -> Option<DiscoveredService> {
        let (kind, attr) = attrs.iter().find_map(|attr| {
            annotation_kind(attr).map(|kind| (kind, attr))
        })?;

        let args = match &attr.meta {
            syn::Meta::Path(_) => Vec::new(),
            syn::Meta::List(_) => attr
                .parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)
                .ok()?
                .into_iter()
                .collect(),
            // name-value attributes are not an annotation shape we know
            syn::Meta::NameValue(_) => return None,
        };

        let (scope, dependency_exprs) = interpret_annotation(kind, &args)?;
        let dependencies: Vec<DependencyDescriptor> = dependency_exprs
            .iter()
            .map(|expr| self.dependency_descriptor(expr, file_path, &mut output.deferred_keys))
            .collect();

        let class_name = ident.to_string();
        let referenced: BTreeSet<&str> = dependencies
            .iter()
            .flat_map(|dep| dep.referenced_identifiers.iter().map(String::as_str))
            .collect();
        let referenced_imports = imports
            .iter()
            .filter(|import| referenced.contains(import.local_name.as_str()))
            .map(|import| ReferencedImport {
                local_name: import.local_name.clone(),
                module_path: import.module_path.clone(),
                original_name: import.original_name.clone(),
            })
            .collect();

        Some(DiscoveredService {
            identifier_key: self.identifier_key(file_path, &class_name),
            class_name,
            file_path: normalize_path(file_path),
            metadata: ServiceMetadata {
                scope,
                dependencies,
                factory: None,
            },
            referenced_imports,
        })
    }

    fn identifier_key(&self, file_path: &Path, class_name: &str) -> String {
        let relative = file_path
            .strip_prefix(&self.project_root)
            .map(normalize_path)
            .unwrap_or_else(|_| normalize_path(file_path));
        format!("alloy:{}/{}#{}", self.package_name, relative, class_name)
    }

    fn dependency_descriptor(
        &self,
        expr: &Expr,
        file_path: &Path,
        deferred_keys: &mut BTreeSet<String>,
    ) -> DependencyDescriptor {
        let expression = expr_text(expr);
        let mut referenced_identifiers = Vec::new();
        collect_identifiers(expr, &mut referenced_identifiers);

        if let Expr::Call(call) = expr {
            if callee_tail(&call.func).as_deref() == Some("lazy") {
                let retry = retry_hints(call.args.iter().skip(1));
                if let Some(Expr::Path(target)) = call.args.first() {
                    let segments = path_segment_names(&target.path);
                    let export_name = segments.last().cloned().unwrap_or_default();
                    if target.path.leading_colon.is_none() {
                        deferred_keys
                            .extend(self.deferred_keys_for(file_path, &segments));
                    }
                    return DependencyDescriptor {
                        expression,
                        referenced_identifiers,
                        is_deferred: true,
                        retry,
                        form: DependencyForm::Deferred {
                            target_path: path_text(&target.path),
                            export_name,
                        },
                    };
                }
                // computed target: still deferred, but conservatively
                // contributes no keys and cannot be reconstructed
                return DependencyDescriptor {
                    expression: expression.clone(),
                    referenced_identifiers,
                    is_deferred: true,
                    retry,
                    form: DependencyForm::Unresolved { name: expression },
                };
            }
            if callee_tail(&call.func).as_deref() == Some("token") {
                if let Some(Expr::Path(target)) = call.args.first() {
                    return DependencyDescriptor {
                        expression,
                        referenced_identifiers,
                        is_deferred: false,
                        retry: None,
                        form: DependencyForm::Token {
                            path: path_text(&target.path),
                        },
                    };
                }
            }
        }

        if let Expr::Path(path) = expr {
            return DependencyDescriptor {
                expression,
                referenced_identifiers,
                is_deferred: false,
                retry: None,
                form: DependencyForm::Service {
                    path: path_text(&path.path),
                },
            };
        }

        DependencyDescriptor {
            expression: expression.clone(),
            referenced_identifiers,
            is_deferred: false,
            retry: None,
            form: DependencyForm::Unresolved { name: expression },
        }
    }

    /// Candidate deferred-reference keys for a module path, varying the
    /// module-file layout (`<seg>.rs` and `<seg>/mod.rs`)
    fn deferred_keys_for(&self, file_path: &Path, segments: &[String]) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        let Some((export_name, module_segments)) = segments.split_last() else {
            return keys;
        };

        if module_segments.is_empty() {
            // bare type: the target lives in the scanned file itself
            keys.insert(format!("{}::{}", normalize_path(file_path), export_name));
            return keys;
        }

        let mut index = 0;
        let base = match module_segments[0].as_str() {
            "crate" => {
                index = 1;
                if module_segments.len() == 1 {
                    for root in ["lib.rs", "main.rs"] {
                        keys.insert(format!(
                            "{}::{}",
                            normalize_path(&self.source_root.join(root)),
                            export_name
                        ));
                    }
                    return keys;
                }
                self.source_root.clone()
            }
            "self" => {
                index = 1;
                module_dir(file_path)
            }
            "super" => {
                let mut dir = module_dir(file_path);
                while module_segments.get(index).map(String::as_str) == Some("super") {
                    dir = match dir.parent() {
                        Some(parent) => parent.to_path_buf(),
                        None => return keys,
                    };
                    index += 1;
                }
                dir
            }
            _ => module_dir(file_path),
        };

        let rest = &module_segments[index..];
        let Some((last, intermediate)) = rest.split_last() else {
            // `lazy(self::Type)`: the current module file
            keys.insert(format!("{}::{}", normalize_path(file_path), export_name));
            return keys;
        };

        let mut dir = base;
        for segment in intermediate {
            dir = dir.join(segment);
        }
        keys.insert(format!(
            "{}::{}",
            normalize_path(&dir.join(format!("{}.rs", last))),
            export_name
        ));
        keys.insert(format!(
            "{}::{}",
            normalize_path(&dir.join(last).join("mod.rs")),
            export_name
        ));
        keys
    }
}

struct LazyCallCollector<'a> {
    scanner: &'a Scanner,
    file_path: &'a Path,
    keys: BTreeSet<String>,
}

impl<'a, 'ast> Visit<'ast> for LazyCallCollector<'a> {
    fn visit_expr_call(&mut self, node: &'ast ExprCall) {
        if callee_tail(&node.func).as_deref() == Some("lazy") {
            if let Some(Expr::Path(target)) = node.args.first() {
                if target.path.leading_colon.is_none() {
                    let segments = path_segment_names(&target.path);
                    self.keys
                        .extend(self.scanner.deferred_keys_for(self.file_path, &segments));
                }
            }
        }
        syn::visit::visit_expr_call(self, node);
    }
}

fn annotation_kind(attr: &syn::Attribute) -> Option<AnnotationKind> {
    let tail = attr.path().segments.last()?.ident.to_string();
    match tail.as_str() {
        "injectable" => Some(AnnotationKind::Injectable),
        "singleton" => Some(AnnotationKind::Singleton),
        _ => None,
    }
}

/// Interpret annotation arguments into a scope and a dependency list.
/// Returns `None` for shapes the annotation surface does not define.
fn interpret_annotation(
    kind: AnnotationKind,
    args: &[Expr],
) -> Option<(ServiceScope, Vec<Expr>)> {
    let mut positional_scope = None;
    let mut named_scope = None;
    let mut dependencies: Option<Vec<Expr>> = None;

    let set_deps = |exprs: Vec<Expr>, slot: &mut Option<Vec<Expr>>| -> bool {
        if slot.is_some() {
            return false;
        }
        *slot = Some(exprs);
        true
    };

    for arg in args {
        match arg {
            Expr::Lit(lit) => match &lit.lit {
                Lit::Str(value) => {
                    positional_scope = Some(value.value().parse::<ServiceScope>().ok()?);
                }
                _ => return None,
            },
            Expr::Array(array) => {
                if !set_deps(array.elems.iter().cloned().collect(), &mut dependencies) {
                    return None;
                }
            }
            Expr::Closure(closure) if closure.inputs.is_empty() => {
                let Expr::Array(array) = closure.body.as_ref() else {
                    return None;
                };
                if !set_deps(array.elems.iter().cloned().collect(), &mut dependencies) {
                    return None;
                }
            }
            Expr::Call(call)
                if matches!(
                    callee_tail(&call.func).as_deref(),
                    Some("deps") | Some("dependencies")
                ) =>
            {
                if !set_deps(call.args.iter().cloned().collect(), &mut dependencies) {
                    return None;
                }
            }
            Expr::Assign(assign) => {
                let name = match assign.left.as_ref() {
                    Expr::Path(path) => path.path.get_ident()?.to_string(),
                    _ => return None,
                };
                match name.as_str() {
                    "scope" => match assign.right.as_ref() {
                        Expr::Lit(lit) => match &lit.lit {
                            Lit::Str(value) => {
                                named_scope =
                                    Some(value.value().parse::<ServiceScope>().ok()?);
                            }
                            _ => return None,
                        },
                        _ => return None,
                    },
                    "dependencies" => match assign.right.as_ref() {
                        Expr::Array(array) => {
                            if !set_deps(
                                array.elems.iter().cloned().collect(),
                                &mut dependencies,
                            ) {
                                return None;
                            }
                        }
                        Expr::Closure(closure) if closure.inputs.is_empty() => {
                            let Expr::Array(array) = closure.body.as_ref() else {
                                return None;
                            };
                            if !set_deps(
                                array.elems.iter().cloned().collect(),
                                &mut dependencies,
                            ) {
                                return None;
                            }
                        }
                        _ => return None,
                    },
                    _ => return None,
                }
            }
            _ => return None,
        }
    }

    let scope = match kind {
        // the singleton annotation always wins over argument scopes
        AnnotationKind::Singleton => ServiceScope::Singleton,
        AnnotationKind::Injectable => positional_scope
            .or(named_scope)
            .unwrap_or(ServiceScope::Transient),
    };

    Some((scope, dependencies.unwrap_or_default()))
}

/// Lexical identifier collection: leading path identifiers, recursing
/// into call arguments, struct-field initializers, and index expressions
fn collect_identifiers(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Path(path) => {
            if let Some(first) = path.path.segments.first() {
                let name = first.ident.to_string();
                let is_qualifier =
                    matches!(name.as_str(), "crate" | "self" | "super" | "Self");
                if !is_qualifier && !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        Expr::Call(call) => {
            collect_identifiers(&call.func, out);
            for arg in &call.args {
                collect_identifiers(arg, out);
            }
        }
        Expr::MethodCall(call) => {
            collect_identifiers(&call.receiver, out);
            for arg in &call.args {
                collect_identifiers(arg, out);
            }
        }
        Expr::Struct(expr_struct) => {
            for field in &expr_struct.fields {
                collect_identifiers(&field.expr, out);
            }
            if let Some(rest) = &expr_struct.rest {
                collect_identifiers(rest, out);
            }
        }
        Expr::Index(index) => {
            collect_identifiers(&index.expr, out);
            collect_identifiers(&index.index, out);
        }
        Expr::Array(array) => {
            for element in &array.elems {
                collect_identifiers(element, out);
            }
        }
        Expr::Tuple(tuple) => {
            for element in &tuple.elems {
                collect_identifiers(element, out);
            }
        }
        Expr::Closure(closure) => collect_identifiers(&closure.body, out),
        Expr::Reference(reference) => collect_identifiers(&reference.expr, out),
        Expr::Paren(paren) => collect_identifiers(&paren.expr, out),
        Expr::Group(group) => collect_identifiers(&group.expr, out),
        Expr::Cast(cast) => collect_identifiers(&cast.expr, out),
        Expr::Unary(unary) => collect_identifiers(&unary.expr, out),
        Expr::Binary(binary) => {
            collect_identifiers(&binary.left, out);
            collect_identifiers(&binary.right, out);
        }
        Expr::Field(field) => collect_identifiers(&field.base, out),
        Expr::Assign(assign) => {
            collect_identifiers(&assign.left, out);
            collect_identifiers(&assign.right, out);
        }
        _ => {}
    }
}

fn retry_hints<'a>(args: impl Iterator<Item = &'a Expr>) -> Option<RetryHints> {
    let mut hints = RetryHints::default();
    let mut seen = false;

    for arg in args {
        let Expr::Assign(assign) = arg else { continue };
        let Expr::Path(name) = assign.left.as_ref() else {
            continue;
        };
        let Some(name) = name.path.get_ident().map(|ident| ident.to_string()) else {
            continue;
        };
        let Expr::Lit(lit) = assign.right.as_ref() else {
            continue;
        };
        match (name.as_str(), &lit.lit) {
            ("retries", Lit::Int(value)) => {
                hints.attempts_after_first = value.base10_parse().ok()?;
                seen = true;
            }
            ("backoff_ms", Lit::Int(value)) => {
                hints.initial_backoff_ms = value.base10_parse().ok()?;
                seen = true;
            }
            ("factor", Lit::Float(value)) => {
                hints.factor = value.base10_parse().ok()?;
                seen = true;
            }
            ("factor", Lit::Int(value)) => {
                hints.factor = value.base10_parse::<u32>().ok()? as f64;
                seen = true;
            }
            _ => {}
        }
    }

    seen.then_some(hints)
}

fn collect_imports(items: &[Item]) -> Vec<ImportBinding> {
    let mut imports = Vec::new();
    for item in items {
        match item {
            Item::Use(item_use) => {
                flatten_use_tree(&item_use.tree, String::new(), &mut imports);
            }
            Item::Mod(item_mod) => {
                if let Some((_, items)) = &item_mod.content {
                    imports.extend(collect_imports(items));
                }
            }
            _ => {}
        }
    }
    imports
}

fn flatten_use_tree(tree: &UseTree, prefix: String, out: &mut Vec<ImportBinding>) {
    match tree {
        UseTree::Path(path) => {
            let next = if prefix.is_empty() {
                path.ident.to_string()
            } else {
                format!("{}::{}", prefix, path.ident)
            };
            flatten_use_tree(&path.tree, next, out);
        }
        UseTree::Name(name) => out.push(ImportBinding {
            local_name: name.ident.to_string(),
            module_path: prefix,
            original_name: name.ident.to_string(),
        }),
        UseTree::Rename(rename) => out.push(ImportBinding {
            local_name: rename.rename.to_string(),
            module_path: prefix,
            original_name: rename.ident.to_string(),
        }),
        UseTree::Group(group) => {
            for item in &group.items {
                flatten_use_tree(item, prefix.clone(), out);
            }
        }
        // glob imports cannot map individual identifiers
        UseTree::Glob(_) => {}
    }
}

fn callee_tail(func: &Expr) -> Option<String> {
    match func {
        Expr::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    }
}

fn path_segment_names(path: &syn::Path) -> Vec<String> {
    path.segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect()
}

fn path_text(path: &syn::Path) -> String {
    path_segment_names(path).join("::")
}

fn expr_text(expr: &Expr) -> String {
    expr.to_token_stream()
        .to_string()
        .replace(" :: ", "::")
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" ,", ",")
}

fn module_dir(file_path: &Path) -> PathBuf {
    let parent = file_path.parent().unwrap_or_else(|| Path::new(""));
    let stem = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    if matches!(stem.as_str(), "mod" | "lib" | "main") {
        parent.to_path_buf()
    } else {
        parent.join(stem)
    }
}

pub(crate) fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
