//! Audited pointer handles.
//!
//! [`Ptr<T, M>`](Ptr) is a raw-pointer-like handle whose behaviour is
//! selected by its [`Mode`]:
//!
//! - [`Instrumented`] handles carry a [`Tracker`](ptrack_registry::Tracker)
//!   and a record id. Every copy, reassignment, cast, release, and drop
//!   updates the registry, and access to a released or out-of-range
//!   target is reported as a [`PtrError`](ptrack_core::PtrError).
//! - [`Transparent`] handles are a bare `Option<NonNull<T>>` with the
//!   footprint of `*mut T`. Nothing is recorded and nothing is checked
//!   beyond null.
//!
//! A handle is a view, not an owner: dropping one never frees memory.
//! Release is explicit through [`Ptr::delete`] or [`Ptr::delete_array`].
//!
//! # Safety model
//!
//! Transparent mode checks nothing, so every operation that could touch
//! freed or out-of-bounds memory is `unsafe`: the raw constructors,
//! release, mutable access, indexing, and static casts. Instrumented mode
//! verifies the same conditions for tracked handles and turns a broken
//! contract into a violation instead.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cast;
pub mod instrumented;
pub mod mode;
pub mod ptr;
pub mod transparent;

pub use instrumented::{Instrumented, TrackedLink};
pub use mode::{Mode, Shape};
pub use ptr::{to_ptr, track_ptr, Ptr};
pub use transparent::{NoTracker, Transparent};
