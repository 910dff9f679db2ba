//! Example: driving the resolution runtime the way a generated wiring
//! module does.
//!
//! Registers a small service graph by hand — a singleton config source,
//! a singleton database, a transient request handler with a deferred
//! reporting dependency — then resolves services by type, identifier,
//! and token.

use alloy_core::prelude::*;
use alloy_core::Lazy;
use std::sync::Arc;

struct AppConfig {
    database_url: String,
}

struct Database {
    url: String,
}

impl Database {
    fn new(config: Arc<AppConfig>) -> Self {
        Self {
            url: config.database_url.clone(),
        }
    }
}

struct ReportEngine {
    format: &'static str,
}

struct RequestHandler {
    db: Arc<Database>,
    reports: Arc<ReportEngine>,
    greeting: Arc<String>,
}

impl RequestHandler {
    fn new(db: Arc<Database>, reports: Arc<ReportEngine>, greeting: Arc<String>) -> Self {
        Self {
            db,
            reports,
            greeting,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter("alloy_core=debug")
        .init();

    let greeting = create_token::<String>("greeting");
    let registry = dependencies_registry();

    registry.insert(ServiceRegistration::singleton(ServiceCtor::new::<
        AppConfig,
        _,
    >(|_| {
        Ok(AppConfig {
            database_url: "postgres://localhost/demo".to_string(),
        })
    })))?;

    registry.insert(
        ServiceRegistration::singleton(ServiceCtor::new::<Database, _>(|mut args| {
            Ok(Database::new(args.take()?))
        }))
        .with_dependencies(|| vec![DependencyExpr::key::<AppConfig>()]),
    )?;

    let greeting_dep = greeting.clone();
    registry.insert(
        ServiceRegistration::transient(ServiceCtor::new::<RequestHandler, _>(|mut args| {
            Ok(RequestHandler::new(
                args.take()?,
                args.take()?,
                args.take()?,
            ))
        }))
        .with_dependencies(move || {
            vec![
                DependencyExpr::key::<Database>(),
                DependencyExpr::lazy(
                    Lazy::from_ctor(|| {
                        ServiceCtor::new::<ReportEngine, _>(|_| {
                            Ok(ReportEngine { format: "pdf" })
                        })
                    })
                    .with_target("reports::ReportEngine"),
                ),
                DependencyExpr::token(&greeting_dep),
            ]
        }),
    )?;

    let database_ctor = ServiceCtor::new::<Database, _>(|mut args| {
        Ok(Database::new(args.take()?))
    });
    let database_id = register_service_identifier(
        &database_ctor,
        ServiceIdentifier::for_key("alloy:demo/src/database.rs#Database"),
    )?;

    let container = Container::new();
    container.provide_value(&greeting, "hello from alloy".to_string())?;

    let handler = container.get::<RequestHandler>().await?;
    println!("handler database: {}", handler.db.url);
    println!("handler reports as: {}", handler.reports.format);
    println!("handler greeting: {}", handler.greeting);

    let shared = container.get::<Database>().await?;
    println!(
        "handler shares the database singleton: {}",
        Arc::ptr_eq(&handler.db, &shared)
    );

    let by_identifier = container.get_by_identifier(&database_id).await?;
    let by_identifier = by_identifier
        .downcast::<Database>()
        .expect("identifier resolves the database");
    println!(
        "identifier resolution hits the same instance: {}",
        Arc::ptr_eq(&shared, &by_identifier)
    );

    Ok(())
}
