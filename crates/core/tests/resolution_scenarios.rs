//! End-to-end resolution scenarios against the public runtime API,
//! driving the registries the way a generated wiring module would.

use alloy_core::prelude::*;
use alloy_core::{identifier_registry, Lazy, ImporterFuture};
use serial_test::serial;
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Config {
    url: String,
}

struct Database {
    config: Arc<Config>,
}

fn wire_database_chain() {
    let registry = dependencies_registry();
    registry
        .insert(ServiceRegistration::singleton(ServiceCtor::new::<Config, _>(
            |_| {
                Ok(Config {
                    url: "postgres://localhost/app".to_string(),
                })
            },
        )))
        .unwrap();
    registry
        .insert(
            ServiceRegistration::singleton(ServiceCtor::new::<Database, _>(|mut args| {
                Ok(Database {
                    config: args.take()?,
                })
            }))
            .with_dependencies(|| vec![DependencyExpr::key::<Config>()]),
        )
        .unwrap();
}

#[tokio::test]
#[serial]
async fn singleton_chain_resolves_shared_instances() {
    wire_database_chain();

    let container = Container::new();
    let db = container.get::<Database>().await.unwrap();
    let config = container.get::<Config>().await.unwrap();

    assert!(Arc::ptr_eq(&db.config, &config));
    assert_eq!(config.url, "postgres://localhost/app");
}

#[tokio::test]
#[serial]
async fn identifier_resolution_finds_the_same_singleton() {
    wire_database_chain();

    let ctor = ServiceCtor::new::<Database, _>(|mut args| {
        Ok(Database {
            config: args.take()?,
        })
    });
    let identifier = register_service_identifier(
        &ctor,
        ServiceIdentifier::for_key("alloy:app/src/database.rs#Database"),
    )
    .unwrap();

    let container = Container::new();
    let by_type = container.get::<Database>().await.unwrap();
    let by_identifier = container.get_by_identifier(&identifier).await.unwrap();
    let by_identifier = by_identifier.downcast::<Database>().unwrap();

    assert!(Arc::ptr_eq(&by_type, &by_identifier));
}

#[tokio::test]
#[serial]
async fn identifier_registration_is_stable() {
    struct Ledger;

    let ctor = ServiceCtor::new::<Ledger, _>(|_| Ok(Ledger));
    let first = identifier_registry().register(&ctor, None).unwrap();
    let second = identifier_registry().register(&ctor, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        identifier_registry()
            .constructor_for(&first)
            .unwrap()
            .key(),
        ctor.key()
    );
}

#[tokio::test]
#[serial]
async fn deferred_dependency_loads_per_resolution_without_eager_wiring() {
    static IMPORTS: AtomicU32 = AtomicU32::new(0);
    static CONSTRUCTIONS: AtomicU32 = AtomicU32::new(0);

    struct Report;
    struct Consumer {
        #[allow(dead_code)]
        report: Arc<Report>,
    }

    dependencies_registry()
        .insert(
            ServiceRegistration::transient(ServiceCtor::new::<Consumer, _>(|mut args| {
                Ok(Consumer {
                    report: args.take()?,
                })
            }))
            .with_dependencies(|| {
                vec![DependencyExpr::lazy(
                    Lazy::from_ctor(|| {
                        IMPORTS.fetch_add(1, Ordering::SeqCst);
                        ServiceCtor::new::<Report, _>(|_| {
                            CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
                            Ok(Report)
                        })
                    })
                    .with_target("reports::Report"),
                )]
            }),
        )
        .unwrap();

    let container = Container::new();
    container.get::<Consumer>().await.unwrap();
    container.get::<Consumer>().await.unwrap();

    // each resolution executes the importer; nothing was wired eagerly
    assert_eq!(IMPORTS.load(Ordering::SeqCst), 2);
    assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[serial]
async fn deferred_singleton_target_constructs_once() {
    static CONSTRUCTIONS: AtomicU32 = AtomicU32::new(0);

    struct Indexer;
    struct Search {
        #[allow(dead_code)]
        indexer: Arc<Indexer>,
    }

    let registry = dependencies_registry();
    registry
        .insert(ServiceRegistration::singleton(ServiceCtor::new::<Indexer, _>(
            |_| {
                CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
                Ok(Indexer)
            },
        )))
        .unwrap();
    registry
        .insert(
            ServiceRegistration::transient(ServiceCtor::new::<Search, _>(|mut args| {
                Ok(Search {
                    indexer: args.take()?,
                })
            }))
            .with_dependencies(|| {
                vec![DependencyExpr::lazy(Lazy::from_ctor(|| {
                    ServiceCtor::new::<Indexer, _>(|_| {
                        CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
                        Ok(Indexer)
                    })
                }))]
            }),
        )
        .unwrap();

    let container = Container::new();
    container.get::<Search>().await.unwrap();
    container.get::<Search>().await.unwrap();

    // the loaded constructor defers to the singleton registration
    assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn retry_succeeds_on_the_third_attempt_with_scheduled_backoff() {
    static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

    struct Remote;
    struct Edge {
        #[allow(dead_code)]
        remote: Arc<Remote>,
    }

    dependencies_registry()
        .insert(
            ServiceRegistration::transient(ServiceCtor::new::<Edge, _>(|mut args| {
                Ok(Edge {
                    remote: args.take()?,
                })
            }))
            .with_dependencies(|| {
                let importer = || -> ImporterFuture {
                    Box::pin(async {
                        if ATTEMPTS.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(CoreError::provider("remote unavailable"))
                        } else {
                            Ok(Box::new(ServiceCtor::new::<Remote, _>(|_| Ok(Remote)))
                                as Box<dyn Any + Send + Sync>)
                        }
                    })
                };
                vec![DependencyExpr::lazy(Lazy::new(importer).with_retry(
                    RetryPolicy {
                        attempts_after_first: 3,
                        initial_backoff_ms: 1,
                        factor: 2.0,
                    },
                ))]
            }),
        )
        .unwrap();

    let container = Container::new();
    let started = tokio::time::Instant::now();
    container.get::<Edge>().await.unwrap();

    // attempts 0 and 1 failed; sleeps of 1 ms and 2 ms were scheduled
    assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(3));
}

#[tokio::test]
#[serial]
async fn eager_cycle_is_detected_at_resolution() {
    #[derive(Debug)]
    struct Alpha;
    struct Beta;

    let registry = dependencies_registry();
    registry
        .insert(
            ServiceRegistration::transient(ServiceCtor::new::<Alpha, _>(|_| Ok(Alpha)))
                .with_dependencies(|| vec![DependencyExpr::key::<Beta>()]),
        )
        .unwrap();
    registry
        .insert(
            ServiceRegistration::transient(ServiceCtor::new::<Beta, _>(|_| Ok(Beta)))
                .with_dependencies(|| vec![DependencyExpr::key::<Alpha>()]),
        )
        .unwrap();

    let container = Container::new();
    let error = container.get::<Alpha>().await.unwrap_err();
    assert!(error.is_circular());
    assert!(error.to_string().contains("Alpha -> Beta -> Alpha"));
}

#[tokio::test]
#[serial]
async fn factory_backed_service_resolves_through_its_placeholder() {
    struct PdfRenderer {
        dpi: u32,
    }

    // the stub type generated wiring modules declare in place of the
    // real, deferred class
    struct PdfRendererStub;

    let stub = ServiceCtor::placeholder::<PdfRendererStub>();
    dependencies_registry()
        .insert(
            ServiceRegistration::singleton(stub.clone()).with_factory(
                Lazy::from_ctor(|| {
                    ServiceCtor::new::<PdfRenderer, _>(|_| Ok(PdfRenderer { dpi: 300 }))
                })
                .with_target("render::PdfRenderer"),
            ),
        )
        .unwrap();
    let identifier = register_service_identifier(
        &stub,
        ServiceIdentifier::for_key("alloy:app/src/render.rs#PdfRenderer"),
    )
    .unwrap();

    let container = Container::new();
    let instance = container.get_by_identifier(&identifier).await.unwrap();
    let renderer = instance.downcast::<PdfRenderer>().unwrap();
    assert_eq!(renderer.dpi, 300);
}

#[tokio::test]
#[serial]
async fn placeholder_without_factory_cannot_be_instantiated() {
    #[derive(Debug)]
    struct OrphanStub;

    dependencies_registry()
        .insert(ServiceRegistration::transient(
            ServiceCtor::placeholder::<OrphanStub>(),
        ))
        .unwrap();

    let container = Container::new();
    let error = container.get::<OrphanStub>().await.unwrap_err();
    assert!(matches!(
        error,
        CoreError::PlaceholderInstantiated { .. }
    ));
}

#[tokio::test]
#[serial]
async fn snapshot_then_restore_returns_the_registry_to_its_prior_state() {
    struct Ephemeral;

    let registry = dependencies_registry();
    let snapshot = alloy_core::testing::snapshot().unwrap();
    let before_keys = {
        let mut keys = snapshot.keys();
        keys.sort_by_key(|key| key.type_name());
        keys
    };

    registry
        .insert(ServiceRegistration::transient(ServiceCtor::new::<
            Ephemeral,
            _,
        >(|_| Ok(Ephemeral))))
        .unwrap();
    assert!(registry.contains(&ServiceKey::of::<Ephemeral>()));

    alloy_core::testing::restore(snapshot).unwrap();
    assert!(!registry.contains(&ServiceKey::of::<Ephemeral>()));

    let after = alloy_core::testing::snapshot().unwrap();
    let mut after_keys = after.keys();
    after_keys.sort_by_key(|key| key.type_name());
    assert_eq!(before_keys, after_keys);
}

#[tokio::test]
#[serial]
async fn provider_deferred_service_registers_a_working_factory() {
    struct Exporter {
        format: &'static str,
    }
    struct ExporterStub;

    let block = ProviderBlock::new().deferred_service(
        alloy_core::ProviderDeferredService::new(
            ServiceCtor::placeholder::<ExporterStub>(),
            ServiceScope::Singleton,
            Lazy::from_ctor(|| {
                ServiceCtor::new::<Exporter, _>(|_| Ok(Exporter { format: "csv" }))
            })
            .with_target("export::Exporter"),
        ),
    );

    let container = Container::new();
    apply_providers(&container, vec![block]).unwrap();

    let stub_ctor = ServiceCtor::placeholder::<ExporterStub>();
    let instance = container.get_ctor(&stub_ctor).await.unwrap();
    let exporter = instance.downcast::<Exporter>().unwrap();
    assert_eq!(exporter.format, "csv");
}
