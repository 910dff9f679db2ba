//! Deferred service loading with retry and exponential backoff.
//!
//! A [`Lazy`] wraps an asynchronous importer that fetches a service
//! constructor at resolution time instead of registration time. The
//! importer may yield the constructor directly or a
//! [`ServiceModule`](crate::container::key::ServiceModule) wrapping one.

use crate::container::key::{ServiceCtor, ServiceModule};
use crate::errors::CoreError;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future returned by a deferred importer
pub type ImporterFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn Any + Send + Sync>, CoreError>> + Send>>;

type ImporterFn = Arc<dyn Fn() -> ImporterFuture + Send + Sync>;

/// Retry behavior of a deferred importer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failing one
    pub attempts_after_first: u32,
    /// Backoff before the first retry, in milliseconds (0 retries immediately)
    pub initial_backoff_ms: u64,
    /// Multiplier applied to the backoff on every further retry
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_after_first: 0,
            initial_backoff_ms: 0,
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with the given number of retries and no backoff
    pub fn retries(attempts_after_first: u32) -> Self {
        Self {
            attempts_after_first,
            ..Self::default()
        }
    }

    /// Backoff duration after a failed attempt with the given index
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let millis = self.initial_backoff_ms as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }
}

/// A deferred dependency: an importer plus its retry policy
#[derive(Clone)]
pub struct Lazy {
    importer: ImporterFn,
    retry: RetryPolicy,
    target: Option<Arc<str>>,
}

impl Lazy {
    /// Wrap an asynchronous importer
    pub fn new<F>(importer: F) -> Self
    where
        F: Fn() -> ImporterFuture + Send + Sync + 'static,
    {
        Self {
            importer: Arc::new(importer),
            retry: RetryPolicy::default(),
            target: None,
        }
    }

    /// Wrap a synchronous constructor lookup.
    ///
    /// This is the form the generated wiring module emits: the closure
    /// references the deferred target only inside its own body, so the
    /// target participates in no eager wiring.
    pub fn from_ctor<F>(make: F) -> Self
    where
        F: Fn() -> ServiceCtor + Send + Sync + 'static,
    {
        Self::new(move || {
            let ctor = make();
            Box::pin(async move { Ok(Box::new(ctor) as Box<dyn Any + Send + Sync>) })
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record the target this importer loads, used in diagnostics and by
    /// the test overlay to match deferred mocks.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(Arc::from(target.into()));
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub(crate) fn target_name(&self) -> String {
        self.target
            .as_deref()
            .unwrap_or("<deferred service>")
            .to_string()
    }

    /// Run the importer, retrying per the policy, and unwrap the result
    /// into a service constructor.
    pub(crate) async fn load(&self) -> Result<ServiceCtor, CoreError> {
        let mut attempt: u32 = 0;
        loop {
            match (self.importer)().await {
                Ok(value) => return self.unwrap_ctor(value),
                Err(error) => {
                    if attempt >= self.retry.attempts_after_first {
                        return Err(CoreError::DeferredImportFailed {
                            target: self.target_name(),
                            attempts: attempt + 1,
                            path: String::new(),
                            source: Box::new(error),
                        });
                    }
                    let backoff = self.retry.backoff(attempt);
                    tracing::debug!(
                        target_service = %self.target_name(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "deferred import failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn unwrap_ctor(&self, value: Box<dyn Any + Send + Sync>) -> Result<ServiceCtor, CoreError> {
        let value = match value.downcast::<ServiceCtor>() {
            Ok(ctor) => return Ok(*ctor),
            Err(value) => value,
        };
        match value.downcast::<ServiceModule>() {
            Ok(module) => Ok(module.default),
            Err(_) => Err(CoreError::NotAConstructor {
                target: self.target_name(),
            }),
        }
    }
}

impl std::fmt::Debug for Lazy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy")
            .field("target", &self.target)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Report;

    fn report_ctor() -> ServiceCtor {
        ServiceCtor::new::<Report, _>(|_| Ok(Report))
    }

    #[tokio::test]
    async fn test_load_accepts_a_bare_constructor() {
        let lazy = Lazy::from_ctor(report_ctor);
        let ctor = lazy.load().await.unwrap();
        assert_eq!(ctor.key(), report_ctor().key());
    }

    #[tokio::test]
    async fn test_load_accepts_a_module_default_export() {
        let lazy = Lazy::new(|| {
            Box::pin(async {
                Ok(Box::new(ServiceModule {
                    default: report_ctor(),
                }) as Box<dyn Any + Send + Sync>)
            })
        });
        let ctor = lazy.load().await.unwrap();
        assert_eq!(ctor.key(), report_ctor().key());
    }

    #[tokio::test]
    async fn test_load_rejects_non_constructors() {
        let lazy = Lazy::new(|| {
            Box::pin(async { Ok(Box::new(42_u32) as Box<dyn Any + Send + Sync>) })
        })
        .with_target("reports::Report");

        let error = lazy.load().await.unwrap_err();
        assert!(matches!(error, CoreError::NotAConstructor { .. }));
        assert!(error.to_string().contains("reports::Report"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_schedule_and_attempt_count() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        let lazy = Lazy::new(|| {
            Box::pin(async {
                ATTEMPTS.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::provider("importer down"))
            })
        })
        .with_retry(RetryPolicy {
            attempts_after_first: 3,
            initial_backoff_ms: 10,
            factor: 2.0,
        });

        let started = tokio::time::Instant::now();
        let error = lazy.load().await.unwrap_err();

        // 4 invocations with sleeps of 10, 20, and 40 ms between them.
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(70));
        match error {
            CoreError::DeferredImportFailed { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_success_on_a_later_attempt() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        let lazy = Lazy::new(|| {
            Box::pin(async {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CoreError::provider("importer down"))
                } else {
                    Ok(Box::new(report_ctor()) as Box<dyn Any + Send + Sync>)
                }
            })
        })
        .with_retry(RetryPolicy::retries(3));

        let ctor = lazy.load().await.unwrap();
        assert_eq!(ctor.key(), report_ctor().key());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 3);
    }
}
