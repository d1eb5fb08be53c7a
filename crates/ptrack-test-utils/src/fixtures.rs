//! Reusable tracker and pointee fixtures.
//!
//! - [`propagating_tracker`] returns violations as values.
//! - [`panicking_tracker`] keeps the abort policy but panics instead of
//!   aborting, so `#[should_panic]` tests can observe it.
//! - [`Probe`] counts how often it has been dropped.
//! - [`capture_logs`] collects the ptrack log lines a closure emits.

use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex, Once, PoisonError};

use ptrack_registry::{RegistryConfig, Tracker, ViolationPolicy};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Abort handler that panics with the diagnostic message.
pub fn panic_abort(message: &str) -> ! {
    panic!("abort: {message}")
}

/// Tracker whose violations come back as `Err`.
pub fn propagating_tracker() -> Tracker {
    Tracker::new(RegistryConfig::new().with_policy(ViolationPolicy::Propagate))
}

/// Tracker with the default abort policy and a panicking handler.
pub fn panicking_tracker() -> Tracker {
    Tracker::new(RegistryConfig::new().with_abort_handler(panic_abort))
}

/// Propagating tracker with per-operation traces enabled.
pub fn verbose_tracker() -> Tracker {
    Tracker::new(
        RegistryConfig::new()
            .with_policy(ViolationPolicy::Propagate)
            .with_verbose(true),
    )
}

/// Install a test-writer fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` under a thread-local subscriber and return every `ptrack`
/// line it logged at `debug` or above, one per line, without colour.
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("ptrack=debug"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    {
        let _guard = subscriber.set_default();
        f();
    }
    buf.contents()
}

/// Pointee that records its drops in a shared counter.
///
/// Clones share the counter, so a test can keep one clone and hand the
/// other to a handle.
#[derive(Clone, Debug, Default)]
pub struct Probe {
    drops: Rc<Cell<usize>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops recorded so far across all clones.
    pub fn drops(&self) -> usize {
        self.drops.get()
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}
