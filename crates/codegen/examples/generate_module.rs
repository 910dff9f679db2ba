//! Example: scan a pair of annotated sources and print the synthesized
//! wiring module.

use alloy_codegen::{generate, CodegenInput, DiscoveryStore, IngestOutput, Scanner};
use std::collections::BTreeSet;
use std::path::Path;

fn main() -> Result<(), alloy_codegen::CodegenError> {
    tracing_subscriber::fmt()
        .with_env_filter("alloy_codegen=debug")
        .init();

    let mut store = DiscoveryStore::new(Scanner::new("demo", "/demo"));

    store.update(
        Path::new("/demo/src/database.rs"),
        r#"
#[singleton]
pub struct Database;
"#,
    )?;

    store.update(
        Path::new("/demo/src/handlers.rs"),
        r#"
use crate::database::Database;

#[injectable(deps(Database, lazy(crate::reports::ReportEngine, retries = 2, backoff_ms = 10)))]
pub struct RequestHandler;
"#,
    )?;

    let local_services = store.services();
    let ingested = IngestOutput::default();
    let output = generate(&CodegenInput {
        local_services: &local_services,
        ingested: &ingested,
        deferred_keys: &store.deferred_keys(),
        providers: &[],
        lazy_services: &BTreeSet::new(),
        project_root: Path::new("/demo"),
    })?;

    println!("==== alloy_container.rs ====\n{}", output.module);
    println!("==== alloy_identifiers.rs ====\n{}", output.declarations);
    Ok(())
}
