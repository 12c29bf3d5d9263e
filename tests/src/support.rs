//! Shared fixtures for the integration suites.

use parking_lot::Mutex;
use relay_bus::{handler_fn, EventHandler};
use relay_types::Event;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any single await in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Await `fut`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn within<F: Future>(fut: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, fut).await {
        Ok(output) => output,
        Err(_) => panic!("timed out after {TEST_TIMEOUT:?}"),
    }
}

/// Poll `condition` until it holds or [`TEST_TIMEOUT`] passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Ordered log of handler invocations.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler appending `label` on every event.
    pub fn handler(&self, label: &str) -> Arc<dyn EventHandler> {
        let entries = Arc::clone(&self.entries);
        let label = label.to_string();
        handler_fn(move |_event: Arc<Event>| {
            entries.lock().push(label.clone());
            async { Ok(()) }
        })
    }

    /// Handler appending `label` after sleeping `delay`.
    pub fn slow_handler(&self, label: &str, delay: Duration) -> Arc<dyn EventHandler> {
        let entries = Arc::clone(&self.entries);
        let label = label.to_string();
        handler_fn(move |_event: Arc<Event>| {
            let entries = Arc::clone(&entries);
            let label = label.clone();
            async move {
                tokio::time::sleep(delay).await;
                entries.lock().push(label);
                Ok(())
            }
        })
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handler that always fails with `message`.
pub fn failing_handler(message: &'static str) -> Arc<dyn EventHandler> {
    handler_fn(move |_event: Arc<Event>| async move { Err::<(), _>(message.into()) })
}

/// Handler that never finishes.
pub fn hanging_handler() -> Arc<dyn EventHandler> {
    handler_fn(|_event: Arc<Event>| async {
        std::future::pending::<()>().await;
        Ok(())
    })
}
