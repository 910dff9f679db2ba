//! Call recording for hand-written mock surfaces.

use std::sync::Mutex;

/// Records the arguments of every call made to a mocked method.
///
/// Embed one spy per method in a hand-written mock and `record` inside
/// the method body:
///
/// ```
/// use alloy_core::testing::Spy;
///
/// struct MailerMock {
///     send: Spy<(String, String)>,
/// }
///
/// impl MailerMock {
///     fn send(&self, to: &str, subject: &str) {
///         self.send.record((to.to_string(), subject.to_string()));
///     }
/// }
///
/// let mock = MailerMock { send: Spy::new() };
/// mock.send("user@example.com", "Welcome");
/// assert_eq!(mock.send.call_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Spy<A> {
    calls: Mutex<Vec<A>>,
}

impl<A> Spy<A> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Record one call
    pub fn record(&self, args: A) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(args);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }
}

impl<A: Clone> Spy<A> {
    /// Get a copy of every recorded call, in order
    pub fn calls(&self) -> Vec<A> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn last_call(&self) -> Option<A> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.last().cloned())
    }
}
