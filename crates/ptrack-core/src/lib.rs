//! Core types for the ptrack pointer-auditing workspace.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the registry and the handle types: record
//! and address identifiers, the per-address [`PointerRecord`], and the
//! [`PtrError`] violation taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod record;

pub use error::{Operation, PtrError, ViolationKind};
pub use id::{Address, RecordId};
pub use record::{Extent, PointerRecord, RecordStatus};
