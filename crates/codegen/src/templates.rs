use crate::error::CodegenError;
use std::collections::HashMap;

pub fn render_template(
    template: &str,
    context: &HashMap<&str, String>,
) -> Result<String, CodegenError> {
    let mut result = template.to_string();

    for (key, value) in context {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    if result.contains("{{") {
        return Err(CodegenError::codegen(format!(
            "unresolved template placeholder near: {}",
            result
                .split("{{")
                .nth(1)
                .and_then(|rest| rest.split("}}").next())
                .unwrap_or("<unknown>")
        )));
    }

    Ok(result)
}

pub static CONTAINER_MODULE_TEMPLATE: &str = r#"//! Container wiring synthesized by alloy-codegen. Do not edit by hand.
#![allow(unused_imports, unused_variables, clippy::all)]

{{runtime_imports}}use std::sync::OnceLock;

{{dependency_imports}}{{stubs}}{{provider_modules}}fn registrations() -> Vec<(ServiceRegistration, ServiceIdentifier)> {
    vec![
{{registrations}}    ]
}

/// Wire the registries and build the container
pub fn build() -> Result<Container, CoreError> {
    let registry = dependencies_registry();
    let entries = registrations();
    let container = Container::new();
    for (registration, _) in &entries {
        registry.insert(registration.clone())?;
    }
{{apply_providers}}    for (registration, identifier) in &entries {
        register_service_identifier(registration.ctor(), identifier.clone())?;
    }
    Ok(container)
}

/// The process-wide generated container
pub fn container() -> &'static Container {
    static CONTAINER: OnceLock<Container> = OnceLock::new();
    CONTAINER.get_or_init(|| build().expect("alloy container wiring failed"))
}

{{service_identifiers}}"#;

pub static SERVICE_IDENTIFIERS_TEMPLATE: &str =
    r#"/// Opaque identifiers for every wired service, keyed by export name
pub mod service_identifiers {
    use super::ServiceIdentifier;

{{entries}}}
"#;

pub static DECLARATIONS_TEMPLATE: &str =
    r#"//! Service identifier declarations synthesized by alloy-codegen. Do not edit by hand.

use alloy_core::ServiceIdentifier;

/// Typed accessors for the generated container's service identifiers
pub struct ServiceIdentifiers;

impl ServiceIdentifiers {
{{entries}}}
{{packages}}"#;
