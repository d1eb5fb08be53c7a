//! Strongly-typed identifiers for records and tracked addresses.

use std::fmt;

/// Identifies one record in a registry's append-only record list.
///
/// Ids are assigned sequentially from zero and are never reused, even
/// when the same address is registered again after deletion.
/// [`RecordId::UNTRACKED`] is the sentinel carried by handles that do not
/// participate in tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

impl RecordId {
    /// Sentinel id for handles that are not attached to any record.
    pub const UNTRACKED: RecordId = RecordId(usize::MAX);

    /// Whether this id refers to a real record.
    pub fn is_tracked(self) -> bool {
        self != Self::UNTRACKED
    }

    /// Position of the record in the registry's record list.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tracked() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "untracked")
        }
    }
}

impl From<usize> for RecordId {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// The numeric identity of a tracked allocation.
///
/// Only the address bits are kept; an `Address` is a lookup key and is
/// never turned back into a pointer. For unsized pointees (`*const dyn Any`)
/// the metadata is discarded, so a thin and a fat pointer to the same
/// allocation compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(usize);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Address of the object behind `ptr`.
    pub fn of<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr.cast::<()>().addr())
    }

    /// The raw address value.
    pub fn get(self) -> usize {
        self.0
    }

    /// Whether this is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_sentinel_is_not_tracked() {
        assert!(!RecordId::UNTRACKED.is_tracked());
        assert!(RecordId(0).is_tracked());
        assert_eq!(RecordId::UNTRACKED.to_string(), "untracked");
        assert_eq!(RecordId(7).to_string(), "7");
    }

    #[test]
    fn address_ignores_pointer_metadata() {
        let value = 5u32;
        let thin: *const u32 = &value;
        let fat: *const dyn std::any::Any = &value as &dyn std::any::Any;
        assert_eq!(Address::of(thin), Address::of(fat));
    }

    #[test]
    fn null_address() {
        assert!(Address::of(std::ptr::null::<u8>()).is_null());
        assert_eq!(Address::from(0x100).to_string(), "0x100");
    }
}
