//! The handle type.

use std::any::type_name;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use ptrack_core::{Address, Operation, PtrError, RecordId};

use crate::mode::{Mode, Shape};

/// A raw-pointer-like handle audited according to `M`.
///
/// `Ptr` never owns its target. Copies ([`try_clone`](Self::try_clone) or
/// `Clone`) alias the same allocation, dropping a handle only drops its
/// reference, and memory is freed by an explicit [`delete`](Self::delete)
/// or [`delete_array`](Self::delete_array) through any one alias.
///
/// Every fallible operation returns a [`PtrError`] after applying the
/// tracker's violation policy, so under the default abort policy an `Err`
/// is never actually observed.
pub struct Ptr<T: ?Sized, M: Mode> {
    ptr: Option<NonNull<T>>,
    link: M::Link,
}

impl<T: ?Sized, M: Mode> Ptr<T, M> {
    /// A null, untracked handle.
    pub fn null() -> Self {
        Self {
            ptr: None,
            link: M::untracked(),
        }
    }

    /// Wrap `raw`, attaching to its active record if there is one.
    ///
    /// Otherwise a new record is created when `track` is set; with `track`
    /// unset the handle stays untracked. A null `raw` gives a null handle.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a valid `T` that stays valid until it
    /// is released. If the handle may be released, `raw` must come from
    /// `Box::into_raw`.
    pub unsafe fn from_raw(ctx: &M::Context, raw: *mut T, track: bool) -> Result<Self, PtrError> {
        Self::attach_raw(ctx, raw, Shape::Scalar, track)
    }

    fn attach_raw(
        ctx: &M::Context,
        raw: *mut T,
        shape: Shape,
        track: bool,
    ) -> Result<Self, PtrError> {
        let Some(ptr) = NonNull::new(raw) else {
            return Ok(Self::null());
        };
        let attached = M::attach(ctx, Address::of(raw), shape, track, type_name::<T>());
        let link = M::enforce_in(ctx, attached)?;
        Ok(Self {
            ptr: Some(ptr),
            link,
        })
    }

    pub(crate) fn link(&self) -> &M::Link {
        &self.link
    }

    /// Whether the handle is null.
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Address of the target, without any liveness check.
    pub fn address(&self) -> Address {
        self.ptr.map_or(Address::NULL, |p| Address::of(p.as_ptr()))
    }

    /// The record this handle is attached to, or [`RecordId::UNTRACKED`].
    pub fn record_id(&self) -> RecordId {
        M::record_id(&self.link)
    }

    /// Whether the handle participates in tracking.
    pub fn is_tracked(&self) -> bool {
        self.record_id().is_tracked()
    }

    /// Live handles sharing this handle's record; zero when untracked.
    pub fn debug_count(&self) -> usize {
        M::count(&self.link)
    }

    /// Copy the handle, adding a reference to its record.
    ///
    /// Copying a handle whose record was deleted is a protocol violation.
    pub fn try_clone(&self) -> Result<Self, PtrError> {
        self.share(Operation::Copy)
    }

    fn share(&self, op: Operation) -> Result<Self, PtrError> {
        self.convert(op, |p| p)
    }

    /// A second handle on this record whose pointer is `map` of this one's.
    pub(crate) fn convert<U: ?Sized>(
        &self,
        op: Operation,
        map: impl FnOnce(NonNull<T>) -> NonNull<U>,
    ) -> Result<Ptr<U, M>, PtrError> {
        let link = M::enforce(&self.link, M::share(&self.link, op))?;
        Ok(Ptr {
            ptr: self.ptr.map(map),
            link,
        })
    }

    /// Move the handle out, leaving a null handle behind.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    /// Point at `other`'s target, sharing its record.
    ///
    /// No-op when both already share a record. A deleted source is
    /// rejected and leaves `self` unchanged.
    pub fn assign(&mut self, other: &Self) -> Result<(), PtrError> {
        M::enforce(&other.link, M::check_live(&other.link, Operation::Assign))?;
        if M::same_record(&self.link, &other.link) {
            return Ok(());
        }
        let fresh = other.share(Operation::Assign)?;
        self.replace_with(fresh)
    }

    /// Point at `raw` with the alias-or-register rule of
    /// [`from_raw`](Self::from_raw).
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw).
    pub unsafe fn assign_raw(
        &mut self,
        ctx: &M::Context,
        raw: *mut T,
        track: bool,
    ) -> Result<(), PtrError> {
        let fresh = Self::attach_raw(ctx, raw, Shape::Scalar, track)?;
        self.replace_with(fresh)
    }

    /// Swap in `fresh` and drop the reference held before.
    ///
    /// A failure to drop the old reference leaves `self` on `fresh` and the
    /// old record outstanding.
    fn replace_with(&mut self, fresh: Self) -> Result<(), PtrError> {
        let mut old = mem::replace(self, fresh);
        let detached = M::detach(&mut old.link);
        M::enforce(&old.link, detached)
    }

    fn checked(&self, op: Operation) -> Result<NonNull<T>, PtrError> {
        let checked = M::check_live(&self.link, op)
            .and_then(|()| self.ptr.ok_or(PtrError::NullAccess { op }));
        M::enforce(&self.link, checked)
    }

    /// Shared access to the target.
    pub fn get(&self) -> Result<&T, PtrError> {
        self.get_for(Operation::Deref)
    }

    pub(crate) fn get_for(&self, op: Operation) -> Result<&T, PtrError> {
        let ptr = self.checked(op)?;
        // SAFETY: the target is live per the `from_raw`/`delete` contracts,
        // and verified against the record when tracked.
        Ok(unsafe { ptr.as_ref() })
    }

    /// Exclusive access to the target.
    ///
    /// # Safety
    ///
    /// No other reference to the target, through this or any aliasing
    /// handle, may be alive while the returned borrow is.
    pub unsafe fn get_mut(&mut self) -> Result<&mut T, PtrError> {
        let mut ptr = self.checked(Operation::Deref)?;
        // SAFETY: liveness as in `get`; exclusivity is the caller's promise.
        Ok(unsafe { ptr.as_mut() })
    }

    /// The target pointer, refusing a handle whose record was deleted.
    pub fn as_non_null(&self) -> Result<Option<NonNull<T>>, PtrError> {
        M::enforce(&self.link, M::check_live(&self.link, Operation::Raw))?;
        Ok(self.ptr)
    }

    /// Release a scalar target and free it.
    ///
    /// Instrumented handles must be tracked, active, and not arrays; the
    /// record becomes Deleted but the handle keeps its id, so any further
    /// access through an alias is caught.
    ///
    /// # Safety
    ///
    /// The target must have been allocated by `Box` ([`Ptr::new`] or
    /// `Box::into_raw`). In transparent mode it must not have been freed
    /// already, and no alias may be used to access it afterwards.
    pub unsafe fn delete(&mut self) -> Result<(), PtrError> {
        let Some(ptr) = self.ptr else {
            return M::enforce(&self.link, Err(PtrError::NullAccess { op: Operation::Delete }));
        };
        let released = M::release(&self.link, self.address(), Shape::Scalar);
        M::enforce(&self.link, released)?;
        // SAFETY: boxed per the caller's contract, and not yet freed.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        Ok(())
    }
}

impl<T, M: Mode> Ptr<T, M> {
    /// Allocate `value` and track it.
    ///
    /// Every call gets a record of its own, zero-sized `T` included.
    pub fn new(ctx: &M::Context, value: T) -> Result<Self, PtrError> {
        let raw = Box::into_raw(Box::new(value));
        let result = Self::attach_allocated(ctx, raw, Shape::Scalar, mem::size_of::<T>());
        if result.is_err() {
            // SAFETY: `raw` came from `Box::into_raw` and no handle kept it.
            drop(unsafe { Box::from_raw(raw) });
        }
        result
    }

    /// Attach a handle to the `bytes`-byte allocation just made at `raw`.
    fn attach_allocated(
        ctx: &M::Context,
        raw: *mut T,
        shape: Shape,
        bytes: usize,
    ) -> Result<Self, PtrError> {
        let Some(ptr) = NonNull::new(raw) else {
            return Ok(Self::null());
        };
        let attached = M::attach_new(ctx, Address::of(raw), shape, bytes, type_name::<T>());
        let link = M::enforce_in(ctx, attached)?;
        Ok(Self {
            ptr: Some(ptr),
            link,
        })
    }

    /// Wrap the `len`-element array at `raw`, attaching to its active
    /// record if there is one.
    ///
    /// An active record whose byte size differs from `len` elements is a
    /// range violation.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to `len` valid elements that stay valid
    /// until released. If the handle may be released, the array must come
    /// from `Box<[T]>`.
    pub unsafe fn from_raw_array(
        ctx: &M::Context,
        raw: *mut T,
        len: usize,
        track: bool,
    ) -> Result<Self, PtrError> {
        Self::attach_raw(ctx, raw, Shape::array_of::<T>(len), track)
    }

    /// Drop the current reference and point at a fresh allocation of
    /// `value`.
    pub fn renew(&mut self, ctx: &M::Context, value: T) -> Result<(), PtrError> {
        let fresh = Self::new(ctx, value)?;
        self.replace_with(fresh)
    }

    /// The target as a raw pointer; null for a null handle.
    pub fn as_ptr(&self) -> Result<*mut T, PtrError> {
        Ok(self
            .as_non_null()?
            .map_or(ptr::null_mut(), NonNull::as_ptr))
    }

    fn checked_index(&self, pos: usize) -> Result<NonNull<T>, PtrError> {
        let op = Operation::Index;
        let checked = M::check_index(&self.link, pos, mem::size_of::<T>())
            .and_then(|()| self.ptr.ok_or(PtrError::NullAccess { op }));
        M::enforce(&self.link, checked)
    }

    /// Element `pos` of the target array.
    ///
    /// # Safety
    ///
    /// `pos` must lie inside the array. Tracked handles verify this and
    /// report a range violation instead.
    pub unsafe fn index(&self, pos: usize) -> Result<&T, PtrError> {
        let ptr = self.checked_index(pos)?;
        // SAFETY: in bounds and live per the caller's contract.
        Ok(unsafe { &*ptr.as_ptr().add(pos) })
    }

    /// Mutable element `pos` of the target array.
    ///
    /// # Safety
    ///
    /// As for [`index`](Self::index), plus the exclusivity rule of
    /// [`get_mut`](Self::get_mut).
    pub unsafe fn index_mut(&mut self, pos: usize) -> Result<&mut T, PtrError> {
        let ptr = self.checked_index(pos)?;
        // SAFETY: in bounds, live, and exclusive per the caller's contract.
        Ok(unsafe { &mut *ptr.as_ptr().add(pos) })
    }

    /// Release a `len`-element array target and free it.
    ///
    /// Instrumented handles must be tracked, active, array-flagged, and
    /// `len` must match the recorded size.
    ///
    /// # Safety
    ///
    /// The target must be a `Box<[T]>` of exactly `len` elements. In
    /// transparent mode it must not have been freed already, and no alias
    /// may be used to access it afterwards.
    pub unsafe fn delete_array(&mut self, len: usize) -> Result<(), PtrError> {
        let Some(ptr) = self.ptr else {
            return M::enforce(
                &self.link,
                Err(PtrError::NullAccess {
                    op: Operation::DeleteArray,
                }),
            );
        };
        let released = M::release(&self.link, self.address(), Shape::array_of::<T>(len));
        M::enforce(&self.link, released)?;
        let slice = ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len);
        // SAFETY: a boxed slice of `len` elements per the caller's contract.
        drop(unsafe { Box::from_raw(slice) });
        Ok(())
    }

    /// Hash key: the address with its always-zero low bits shifted out.
    pub fn hash_key(&self) -> usize {
        self.address().get() >> (1 + mem::size_of::<T>()).ilog2()
    }
}

impl<T: Default, M: Mode> Ptr<T, M> {
    /// Allocate `len` default elements and track them as one array.
    pub fn new_array(ctx: &M::Context, len: usize) -> Result<Self, PtrError> {
        let boxed: Box<[T]> = (0..len).map(|_| T::default()).collect();
        let raw = Box::into_raw(boxed).cast::<T>();
        let shape = Shape::array_of::<T>(len);
        let result = Self::attach_allocated(ctx, raw, shape, shape.extent().bytes());
        if result.is_err() {
            // SAFETY: `raw` is the boxed slice allocated above, still unshared.
            drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(raw, len)) });
        }
        result
    }

    /// Drop the current reference and point at a fresh `len`-element array.
    pub fn renew_array(&mut self, ctx: &M::Context, len: usize) -> Result<(), PtrError> {
        let fresh = Self::new_array(ctx, len)?;
        self.replace_with(fresh)
    }
}

/// Wrap `raw` without tracking it, still attaching to an active record.
///
/// # Safety
///
/// Same contract as [`Ptr::from_raw`].
pub unsafe fn to_ptr<T: ?Sized, M: Mode>(
    ctx: &M::Context,
    raw: *mut T,
) -> Result<Ptr<T, M>, PtrError> {
    // SAFETY: forwarded contract.
    unsafe { Ptr::from_raw(ctx, raw, false) }
}

/// Wrap `raw` and track it.
///
/// # Safety
///
/// Same contract as [`Ptr::from_raw`].
pub unsafe fn track_ptr<T: ?Sized, M: Mode>(
    ctx: &M::Context,
    raw: *mut T,
) -> Result<Ptr<T, M>, PtrError> {
    // SAFETY: forwarded contract.
    unsafe { Ptr::from_raw(ctx, raw, true) }
}

impl<T: ?Sized, M: Mode> Drop for Ptr<T, M> {
    fn drop(&mut self) {
        let mut result = M::detach(&mut self.link);
        if result.is_err() && !std::thread::panicking() {
            result = M::enforce(&self.link, result);
        }
        if let Err(err) = result {
            tracing::warn!(target: "ptrack::ptr", "{err}; record left outstanding");
        }
    }
}

impl<T: ?Sized, M: Mode> Default for Ptr<T, M> {
    fn default() -> Self {
        Self::null()
    }
}

/// Panics if the record was deleted and the policy propagates.
impl<T: ?Sized, M: Mode> Clone for Ptr<T, M> {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(copy) => copy,
            Err(err) => panic!("{err}"),
        }
    }
}

/// Panics on a null or deleted target.
impl<T: ?Sized, M: Mode> Deref for Ptr<T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Ok(target) => target,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: ?Sized, M: Mode> PartialEq for Ptr<T, M> {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl<T: ?Sized, M: Mode> Eq for Ptr<T, M> {}

impl<T: ?Sized, M: Mode> PartialEq<*mut T> for Ptr<T, M> {
    fn eq(&self, other: &*mut T) -> bool {
        self.address() == Address::of(*other)
    }
}

impl<T: ?Sized, M: Mode> PartialOrd for Ptr<T, M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized, M: Mode> Ord for Ptr<T, M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl<T, M: Mode> Hash for Ptr<T, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.hash_key());
    }
}

impl<T: ?Sized, M: Mode> fmt::Display for Ptr<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.address(), f)
    }
}

impl<T: ?Sized, M: Mode> fmt::Debug for Ptr<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ptr")
            .field("address", &format_args!("{}", self.address()))
            .field("id", &format_args!("{}", self.record_id()))
            .finish()
    }
}
