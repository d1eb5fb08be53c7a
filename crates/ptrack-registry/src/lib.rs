//! Address-to-record registry for ptrack.
//!
//! The [`PointerRegistry`] correlates raw addresses with liveness records
//! and audits them at teardown. A [`Tracker`] is the shared, single-threaded
//! handle to one registry that instrumented pointers carry around.
//!
//! # Architecture
//!
//! ```text
//! Tracker (Rc<RefCell<_>>, cloned into every tracked handle)
//! └── PointerRegistry
//!     ├── latest: IndexMap<Address, RecordId>   (newest record per address)
//!     ├── records: Vec<PointerRecord>           (append-only, indexed by id)
//!     ├── type_stats: IndexMap<&str, TypeStats> (per pointee type)
//!     └── RegistryConfig                        (tracing, policy, abort hooks)
//! ```
//!
//! When the last `Tracker` clone goes away the registry runs its audit and
//! logs the [`LeakReport`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod registry;
pub mod report;
pub mod tracker;

pub use config::{default_abort, AbortHandler, RegistryConfig, ViolationPolicy};
pub use registry::PointerRegistry;
pub use report::{LeakReport, TypeStats};
pub use tracker::Tracker;
