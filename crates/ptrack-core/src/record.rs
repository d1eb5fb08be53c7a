//! Per-address liveness records.
//!
//! A [`PointerRecord`] describes one lifetime of one tracked address: how
//! many handles alias it, whether it has been released, and whether it is
//! an array. Identity (id and address) is fixed at creation; the count and
//! status change as handles come and go.

use crate::error::{Operation, PtrError};
use crate::id::{Address, RecordId};

/// Liveness of a record. Monotone: once `Deleted`, never `Active` again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    /// The allocation is live and may be accessed.
    Active,
    /// The allocation was released; any access is a violation.
    Deleted,
}

/// Shape of a tracked allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Extent {
    /// A single object.
    Scalar,
    /// A contiguous array.
    Array {
        /// Size of the whole array in bytes.
        bytes: usize,
    },
}

impl Extent {
    /// Whether this is an array extent.
    pub fn is_array(self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// Array size in bytes; zero for scalars.
    pub fn bytes(self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Array { bytes } => bytes,
        }
    }
}

/// Registry entry for one tracked address lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerRecord {
    id: RecordId,
    address: Address,
    count: usize,
    status: RecordStatus,
    extent: Extent,
    type_name: Option<&'static str>,
}

impl PointerRecord {
    /// Create an active record with a single reference.
    pub fn new(id: RecordId, address: Address, extent: Extent) -> Self {
        Self {
            id,
            address,
            count: 1,
            status: RecordStatus::Active,
            extent,
            type_name: None,
        }
    }

    /// The record's id.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// The tracked address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Number of live handles aliasing this record.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Current liveness.
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// The allocation's shape.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Pointee type the allocation was created as, once labelled.
    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }

    /// Label the allocation with its pointee type.
    pub fn set_type_name(&mut self, type_name: &'static str) {
        self.type_name = Some(type_name);
    }

    /// Whether the allocation may still be accessed.
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// Whether the allocation is an array.
    pub fn is_array(&self) -> bool {
        self.extent.is_array()
    }

    /// Array size in bytes; zero for scalars.
    pub fn array_bytes(&self) -> usize {
        self.extent.bytes()
    }

    /// Flag this record as an array of `bytes` bytes.
    pub fn promote_to_array(&mut self, bytes: usize) {
        self.extent = Extent::Array { bytes };
    }

    /// Add one handle.
    pub fn increment(&mut self) -> Result<(), PtrError> {
        if self.status == RecordStatus::Deleted {
            return Err(self.protocol(Operation::Increment, "record already deleted"));
        }
        self.count += 1;
        Ok(())
    }

    /// Remove one handle.
    ///
    /// The last reference to an active record may not simply be dropped:
    /// it has to be released first. Such a decrement is refused and the
    /// count is left untouched, so the record stays outstanding.
    pub fn decrement(&mut self) -> Result<(), PtrError> {
        if self.count == 0 {
            return Err(self.protocol(Operation::Decrement, "reference count underflow"));
        }
        if self.count == 1 && self.status == RecordStatus::Active {
            return Err(PtrError::OwnershipViolation {
                op: Operation::Decrement,
                id: self.id,
                address: self.address,
                reason: "last reference dropped without release",
            });
        }
        self.count -= 1;
        Ok(())
    }

    /// Transition to `Deleted`.
    pub fn mark_deleted(&mut self) -> Result<(), PtrError> {
        if self.status == RecordStatus::Deleted {
            return Err(self.protocol(Operation::MarkDeleted, "record deleted twice"));
        }
        self.status = RecordStatus::Deleted;
        Ok(())
    }

    fn protocol(&self, op: Operation, reason: &'static str) -> PtrError {
        PtrError::ProtocolViolation {
            op,
            id: self.id,
            address: self.address,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;

    fn scalar() -> PointerRecord {
        PointerRecord::new(RecordId(0), Address::from(0x100), Extent::Scalar)
    }

    #[test]
    fn new_record_is_active_with_one_reference() {
        let rec = scalar();
        assert!(rec.is_active());
        assert!(!rec.is_array());
        assert_eq!(rec.count(), 1);
        assert_eq!(rec.array_bytes(), 0);
    }

    #[test]
    fn type_label_starts_empty() {
        let mut rec = scalar();
        assert_eq!(rec.type_name(), None);
        rec.set_type_name("u64");
        assert_eq!(rec.type_name(), Some("u64"));
    }

    #[test]
    fn increment_after_delete_is_protocol_violation() {
        let mut rec = scalar();
        rec.mark_deleted().unwrap();
        let err = rec.increment().unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Protocol);
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn double_delete_is_rejected() {
        let mut rec = scalar();
        rec.mark_deleted().unwrap();
        let err = rec.mark_deleted().unwrap_err();
        assert_eq!(err.operation(), Operation::MarkDeleted);
        assert_eq!(rec.status(), RecordStatus::Deleted);
    }

    #[test]
    fn last_reference_of_active_record_cannot_be_dropped() {
        let mut rec = scalar();
        let err = rec.decrement().unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Ownership);
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn last_reference_of_deleted_record_can_be_dropped() {
        let mut rec = scalar();
        rec.mark_deleted().unwrap();
        rec.decrement().unwrap();
        assert_eq!(rec.count(), 0);
        let err = rec.decrement().unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Protocol);
    }

    #[test]
    fn extra_references_decrement_freely() {
        let mut rec = scalar();
        rec.increment().unwrap();
        rec.increment().unwrap();
        rec.decrement().unwrap();
        assert_eq!(rec.count(), 2);
    }

    #[test]
    fn promotion_sets_array_extent() {
        let mut rec = scalar();
        rec.promote_to_array(64);
        assert!(rec.is_array());
        assert_eq!(rec.array_bytes(), 64);
        assert_eq!(rec.extent(), Extent::Array { bytes: 64 });
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn count_never_drops_below_one_while_active(
                ops in proptest::collection::vec(any::<bool>(), 1..64),
            ) {
                let mut rec = scalar();
                for inc in ops {
                    if inc {
                        rec.increment().unwrap();
                    } else {
                        let _ = rec.decrement();
                    }
                    prop_assert!(rec.count() >= 1);
                }
            }

            #[test]
            fn deleted_record_drains_to_zero(extra in 0usize..32) {
                let mut rec = scalar();
                for _ in 0..extra {
                    rec.increment().unwrap();
                }
                rec.mark_deleted().unwrap();
                for _ in 0..=extra {
                    rec.decrement().unwrap();
                }
                prop_assert_eq!(rec.count(), 0);
                prop_assert!(rec.decrement().is_err());
            }
        }
    }
}
