//! The tracking policy a handle is compiled against.

use std::fmt;

use ptrack_core::{Address, Extent, Operation, PtrError, RecordId};

/// Shape of an allocation as seen by a constructor or a release call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// A single object.
    Scalar,
    /// `len` contiguous elements of `elem_size` bytes each.
    Array {
        /// Element count.
        len: usize,
        /// Size of one element in bytes.
        elem_size: usize,
    },
}

impl Shape {
    /// Array shape for `len` elements of `T`.
    pub fn array_of<T>(len: usize) -> Self {
        Self::Array {
            len,
            elem_size: std::mem::size_of::<T>(),
        }
    }

    /// The registry extent this shape is recorded as.
    pub fn extent(self) -> Extent {
        match self {
            Self::Scalar => Extent::Scalar,
            Self::Array { len, elem_size } => Extent::Array {
                bytes: len.saturating_mul(elem_size),
            },
        }
    }
}

/// Number of `elem_size`-byte elements in `bytes`. Zero-sized elements
/// cannot be counted and report zero.
pub(crate) fn elements(bytes: usize, elem_size: usize) -> usize {
    bytes.checked_div(elem_size).unwrap_or(0)
}

/// Tracking policy for [`Ptr`](crate::Ptr).
///
/// Every method is an associated function over the handle's `Link`, so a
/// mode carries no data of its own and `Ptr<T, M>` stays a plain struct.
/// [`Instrumented`](crate::Instrumented) routes everything to a registry;
/// [`Transparent`](crate::Transparent) compiles to nothing.
pub trait Mode: Sized + 'static {
    /// Context handles are constructed against.
    type Context: Clone + Default + fmt::Debug;

    /// Per-handle bookkeeping.
    type Link: fmt::Debug;

    /// Whether this mode records anything.
    const TRACKING: bool;

    /// Link of a handle not attached to any record.
    fn untracked() -> Self::Link;

    /// Alias-or-register for the non-null `address`.
    ///
    /// If the address has an active record the new link shares it. Otherwise
    /// a record is created when `track` is set, and the link is untracked
    /// when it is not.
    fn attach(
        ctx: &Self::Context,
        address: Address,
        shape: Shape,
        track: bool,
        type_name: &'static str,
    ) -> Result<Self::Link, PtrError>;

    /// Link for an allocation the handle has just made itself.
    ///
    /// `bytes` is the allocation's size. A zero-byte allocation shares its
    /// dangling address with every other one, so it gets a record of its
    /// own that address lookups never find. Any other allocation goes
    /// through [`attach`](Self::attach) with tracking on.
    fn attach_new(
        ctx: &Self::Context,
        address: Address,
        shape: Shape,
        bytes: usize,
        type_name: &'static str,
    ) -> Result<Self::Link, PtrError>;

    /// A second link to the same record, for copies and conversions.
    fn share(link: &Self::Link, op: Operation) -> Result<Self::Link, PtrError>;

    /// Drop this link's reference and leave it untracked.
    fn detach(link: &mut Self::Link) -> Result<(), PtrError>;

    /// Whether both links are attached to the same tracked record.
    fn same_record(a: &Self::Link, b: &Self::Link) -> bool;

    /// The link's record id, or [`RecordId::UNTRACKED`].
    fn record_id(link: &Self::Link) -> RecordId;

    /// Live handles sharing the link's record; zero when untracked.
    fn count(link: &Self::Link) -> usize;

    /// Fail if the link's record has been released.
    fn check_live(link: &Self::Link, op: Operation) -> Result<(), PtrError>;

    /// Fail unless the link's record is a live array covering `pos`.
    fn check_index(link: &Self::Link, pos: usize, elem_size: usize) -> Result<(), PtrError>;

    /// Validate a release of `shape` and mark the record deleted.
    fn release(link: &Self::Link, address: Address, shape: Shape) -> Result<(), PtrError>;

    /// Apply the violation policy reachable from `link`.
    fn enforce<T>(link: &Self::Link, result: Result<T, PtrError>) -> Result<T, PtrError>;

    /// Apply the violation policy of `ctx`.
    fn enforce_in<T>(ctx: &Self::Context, result: Result<T, PtrError>) -> Result<T, PtrError>;
}
