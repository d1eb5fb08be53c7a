//! ptrack: dual-mode pointer auditing.
//!
//! This is the facade crate. It re-exports the sub-crates and picks the
//! build-wide handle mode: with the `track-mem` feature, [`Ptr`] is
//! instrumented and every copy, release, and access is checked against a
//! registry; without it, [`Ptr`] compiles down to a bare pointer.
//!
//! # Quick start
//!
//! ```rust
//! use ptrack::prelude::*;
//!
//! let ctx = ptrack::new_context();
//! let mut p: Ptr<u32> = Ptr::new(&ctx, 7)?;
//! let q = p.clone();
//! assert_eq!(*q, 7);
//! drop(q);
//! // SAFETY: `p` came from `Ptr::new` and no alias is used afterwards.
//! unsafe { p.delete()? };
//! # Ok::<(), PtrError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ptrack-core` | Ids, records, violation types |
//! | [`registry`] | `ptrack-registry` | Registry, configuration, leak report, tracker |
//! | [`ptr`] | `ptrack-ptr` | `Ptr<T, M>`, the `Mode` trait and both modes |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids, records, and violation types (`ptrack-core`).
pub use ptrack_core as types;

/// Registry, configuration, and leak audit (`ptrack-registry`).
pub use ptrack_registry as registry;

/// Handle types and modes (`ptrack-ptr`).
pub use ptrack_ptr as ptr;

use ptrack_ptr::Mode;

/// The mode selected for this build.
#[cfg(feature = "track-mem")]
pub type DefaultMode = ptrack_ptr::Instrumented;

/// The mode selected for this build.
#[cfg(not(feature = "track-mem"))]
pub type DefaultMode = ptrack_ptr::Transparent;

/// Handle in the mode selected for this build.
pub type Ptr<T> = ptrack_ptr::Ptr<T, DefaultMode>;

/// Context handles are constructed against in this build.
pub type Context = <DefaultMode as Mode>::Context;

/// Whether this build audits pointers.
pub const TRACKING: bool = <DefaultMode as Mode>::TRACKING;

/// A context for the process root, configured from `PTRACK_*` variables.
#[cfg(feature = "track-mem")]
pub fn new_context() -> Context {
    ptrack_registry::Tracker::new(ptrack_registry::RegistryConfig::from_env())
}

/// A context for the process root. Carries nothing in this build.
#[cfg(not(feature = "track-mem"))]
pub fn new_context() -> Context {
    ptrack_ptr::NoTracker
}

/// Common imports for typical ptrack usage.
pub mod prelude {
    pub use crate::{Context, DefaultMode, Ptr};

    pub use ptrack_core::{PtrError, RecordId, ViolationKind};
    pub use ptrack_ptr::{Instrumented, Mode, NoTracker, Transparent};
    pub use ptrack_registry::{LeakReport, RegistryConfig, Tracker, ViolationPolicy};
}
