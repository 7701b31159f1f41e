// SPDX-License-Identifier: Apache-2.0 OR MIT

use ::std::sync::Arc;
use ::std::sync::atomic::{AtomicUsize, Ordering};
use ::std::thread::sleep as thread_sleep;
use ::std::time::Duration;

use ::tokio::time::Instant;
use ::tokio_waitfor::{AsyncViewport, Condition};
use ::tracing::dispatcher::DefaultGuard;
use ::tracing_subscriber::EnvFilter;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const WAIT_STEP: Duration = Duration::from_millis(1);

pub fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration, timeout_message: &str) {
    let deadline = ::std::time::Instant::now() + timeout;
    while ::std::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        thread_sleep(WAIT_STEP);
    }
    panic!("{timeout_message}");
}

/// Installs a thread-local subscriber for the duration of a test.
pub fn trace_init() -> DefaultGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tokio_waitfor=trace"));
    let subscriber = ::tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .finish();
    ::tracing::subscriber::set_default(subscriber)
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Sleeps on the (usually paused) Tokio clock until `start + millis`.
pub async fn sleep_until_ms(start: Instant, millis: u64) {
    ::tokio::time::sleep_until(start + ms(millis)).await;
}

/// A predicate that counts its calls and holds from a point in time on.
#[derive(Clone)]
pub struct Probe {
    calls: Arc<AtomicUsize>,
}

impl Probe {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Holds once the Tokio clock reaches `at`.
    pub fn met_at(&self, at: Instant) -> Condition {
        let calls = self.calls.clone();
        Condition::predicate(move || {
            calls.fetch_add(1, Ordering::Relaxed);
            Instant::now() >= at
        })
    }

    pub fn never(&self) -> Condition {
        let calls = self.calls.clone();
        Condition::predicate(move || {
            calls.fetch_add(1, Ordering::Relaxed);
            false
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Viewport whose wake-ups are counted.
pub fn counting_viewport() -> (AsyncViewport, Arc<AtomicUsize>) {
    let wake_count = Arc::new(AtomicUsize::new(0));
    let viewport = AsyncViewport::new_with_wake_up({
        let wake_count = wake_count.clone();
        Arc::new(move || {
            wake_count.fetch_add(1, Ordering::Relaxed);
        })
    });
    (viewport, wake_count)
}
