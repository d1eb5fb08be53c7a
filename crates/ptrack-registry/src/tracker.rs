//! Shared handle to a single-threaded registry.
//!
//! A [`Tracker`] is the explicit context every instrumented pointer is
//! constructed against. It is `Rc`-based, so tracked handles are neither
//! `Send` nor `Sync`: concurrent use of one registry does not compile.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use ptrack_core::PtrError;

use crate::config::{apply_policy, RegistryConfig};
use crate::registry::PointerRegistry;
use crate::report::LeakReport;

/// Reference-counted access to one [`PointerRegistry`].
///
/// Cloning a tracker shares the registry. The registry is torn down, and
/// its leak report logged, when the last clone is dropped.
#[derive(Clone)]
pub struct Tracker {
    registry: Rc<RefCell<PointerRegistry>>,
}

impl Tracker {
    /// Create a tracker around a fresh registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            registry: Rc::new(RefCell::new(PointerRegistry::new(config))),
        }
    }

    /// Shared access to the registry.
    ///
    /// # Panics
    ///
    /// Panics if the registry is mutably borrowed.
    pub fn registry(&self) -> Ref<'_, PointerRegistry> {
        self.registry.borrow()
    }

    /// Exclusive access to the registry.
    ///
    /// # Panics
    ///
    /// Panics if the registry is already borrowed.
    pub fn registry_mut(&self) -> RefMut<'_, PointerRegistry> {
        self.registry.borrow_mut()
    }

    /// Apply the registry's violation policy to `result`.
    ///
    /// The registry is not borrowed while the abort handler runs.
    pub fn enforce<T>(&self, result: Result<T, PtrError>) -> Result<T, PtrError> {
        let handler = self.registry.borrow().config().fatal_handler();
        apply_policy(handler, result)
    }

    /// Toggle per-operation trace lines.
    pub fn set_verbose(&self, verbose: bool) {
        self.registry.borrow_mut().set_verbose(verbose);
    }

    /// Whether per-operation trace lines are emitted.
    pub fn is_verbose(&self) -> bool {
        self.registry.borrow().is_verbose()
    }

    /// Run the leak audit without tearing the registry down.
    pub fn audit(&self) -> LeakReport {
        self.registry.borrow().audit()
    }

    /// Number of records created so far.
    pub fn record_count(&self) -> usize {
        self.registry.borrow().record_count()
    }

    /// Whether both trackers share one registry.
    pub fn ptr_eq(&self, other: &Tracker) -> bool {
        Rc::ptr_eq(&self.registry, &other.registry)
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.registry.try_borrow() {
            Ok(registry) => f.debug_tuple("Tracker").field(&*registry).finish(),
            Err(_) => f.write_str("Tracker(<borrowed>)"),
        }
    }
}
