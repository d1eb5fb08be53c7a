//! Violation types for pointer auditing.
//!
//! Every detected memory-safety violation is a [`PtrError`]. All of them
//! are programmer errors found synchronously at the violating call; the
//! registry's policy decides whether they abort the process or come back
//! to the caller as values.

use std::error::Error;
use std::fmt;

use crate::id::{Address, RecordId};

/// The operation that was being performed when a violation was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Creating a scalar record.
    Register,
    /// Creating an array record.
    RegisterArray,
    /// Adding a handle to a record.
    Increment,
    /// Removing a handle from a record.
    Decrement,
    /// Transitioning a record to Deleted.
    MarkDeleted,
    /// Copying a handle.
    Copy,
    /// Reassigning a handle.
    Assign,
    /// Dereferencing or following a handle.
    Deref,
    /// Indexing into an array handle.
    Index,
    /// Converting a handle to a raw pointer.
    Raw,
    /// Static conversion to another pointee type.
    Cast,
    /// Checked conversion to another pointee type.
    DynamicCast,
    /// Releasing a scalar allocation.
    Delete,
    /// Releasing an array allocation.
    DeleteArray,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Register => "register",
            Self::RegisterArray => "register_array",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::MarkDeleted => "mark_deleted",
            Self::Copy => "copy",
            Self::Assign => "assign",
            Self::Deref => "deref",
            Self::Index => "index",
            Self::Raw => "raw",
            Self::Cast => "cast",
            Self::DynamicCast => "dynamic_cast",
            Self::Delete => "delete",
            Self::DeleteArray => "delete_array",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`PtrError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Operating on a deleted record.
    Protocol,
    /// Releasing through the wrong path or without owning a record.
    Ownership,
    /// Accessing outside a tracked array extent.
    Range,
    /// Dereferencing, indexing, or releasing a null handle.
    NullAccess,
    /// A checked conversion to a type the pointee is not.
    Cast,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Protocol => "protocol violation",
            Self::Ownership => "ownership violation",
            Self::Range => "range violation",
            Self::NullAccess => "null access",
            Self::Cast => "cast violation",
        };
        f.write_str(name)
    }
}

/// A memory-safety violation detected by the tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PtrError {
    /// The record was already deleted: double free, or use after free.
    ProtocolViolation {
        /// The operation that was attempted.
        op: Operation,
        /// The record involved.
        id: RecordId,
        /// The address of that record.
        address: Address,
        /// What went wrong.
        reason: &'static str,
    },
    /// Scalar/array release mismatch, release of an untracked handle,
    /// double registration of a live address, or dropping the last
    /// reference to a record that was never released.
    OwnershipViolation {
        /// The operation that was attempted.
        op: Operation,
        /// The record involved, or [`RecordId::UNTRACKED`].
        id: RecordId,
        /// The address involved.
        address: Address,
        /// What went wrong.
        reason: &'static str,
    },
    /// An index or length outside the tracked array extent.
    RangeViolation {
        /// The operation that was attempted.
        op: Operation,
        /// The record involved.
        id: RecordId,
        /// The address of that record.
        address: Address,
        /// The requested index or element count.
        requested: usize,
        /// The number of elements the record covers.
        extent: usize,
    },
    /// The handle was null.
    NullAccess {
        /// The operation that was attempted.
        op: Operation,
    },
    /// A checked conversion found a pointee of a different type.
    CastViolation {
        /// The operation that was attempted.
        op: Operation,
        /// The record involved, or [`RecordId::UNTRACKED`].
        id: RecordId,
        /// The address of the pointee.
        address: Address,
        /// Name of the requested target type.
        target: &'static str,
    },
}

impl PtrError {
    /// Classification of this violation.
    pub fn kind(&self) -> ViolationKind {
        match self {
            Self::ProtocolViolation { .. } => ViolationKind::Protocol,
            Self::OwnershipViolation { .. } => ViolationKind::Ownership,
            Self::RangeViolation { .. } => ViolationKind::Range,
            Self::NullAccess { .. } => ViolationKind::NullAccess,
            Self::CastViolation { .. } => ViolationKind::Cast,
        }
    }

    /// The operation during which the violation was detected.
    pub fn operation(&self) -> Operation {
        match self {
            Self::ProtocolViolation { op, .. }
            | Self::OwnershipViolation { op, .. }
            | Self::RangeViolation { op, .. }
            | Self::NullAccess { op }
            | Self::CastViolation { op, .. } => *op,
        }
    }

    /// The record involved, if the violation concerns a tracked record.
    pub fn record_id(&self) -> Option<RecordId> {
        let id = match self {
            Self::ProtocolViolation { id, .. }
            | Self::OwnershipViolation { id, .. }
            | Self::RangeViolation { id, .. }
            | Self::CastViolation { id, .. } => *id,
            Self::NullAccess { .. } => return None,
        };
        id.is_tracked().then_some(id)
    }
}

impl fmt::Display for PtrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation {
                op,
                id,
                address,
                reason,
            } => {
                write!(f, "{op}: {reason} (record {id} at {address})")
            }
            Self::OwnershipViolation {
                op,
                id,
                address,
                reason,
            } => {
                write!(f, "{op}: {reason} (record {id} at {address})")
            }
            Self::RangeViolation {
                op,
                id,
                address,
                requested,
                extent,
            } => {
                write!(
                    f,
                    "{op}: {requested} out of range for {extent} elements (record {id} at {address})"
                )
            }
            Self::NullAccess { op } => write!(f, "{op}: null handle"),
            Self::CastViolation {
                op,
                id,
                address,
                target,
            } => {
                write!(
                    f,
                    "{op}: pointee is not a {target} (record {id} at {address})"
                )
            }
        }
    }
}

impl Error for PtrError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_operation_follow_variant() {
        let err = PtrError::RangeViolation {
            op: Operation::Index,
            id: RecordId(3),
            address: Address::from(0x40),
            requested: 9,
            extent: 4,
        };
        assert_eq!(err.kind(), ViolationKind::Range);
        assert_eq!(err.operation(), Operation::Index);
        assert_eq!(err.record_id(), Some(RecordId(3)));
    }

    #[test]
    fn untracked_id_is_not_reported() {
        let err = PtrError::OwnershipViolation {
            op: Operation::Delete,
            id: RecordId::UNTRACKED,
            address: Address::from(0x40),
            reason: "release of an untracked handle",
        };
        assert_eq!(err.record_id(), None);
        assert_eq!(PtrError::NullAccess { op: Operation::Deref }.record_id(), None);
    }

    #[test]
    fn display_carries_context() {
        let err = PtrError::ProtocolViolation {
            op: Operation::Deref,
            id: RecordId(0),
            address: Address::from(0x100),
            reason: "record already deleted",
        };
        assert_eq!(
            err.to_string(),
            "deref: record already deleted (record 0 at 0x100)"
        );
        assert_eq!(
            PtrError::NullAccess { op: Operation::Index }.to_string(),
            "index: null handle"
        );
    }
}
