//! Zero-cost mode: no registry, no bookkeeping.

use ptrack_core::{Address, Operation, PtrError, RecordId};

use crate::mode::{Mode, Shape};

/// Mode whose handles are bare pointers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Transparent;

/// Context of transparent handles. Carries nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NoTracker;

impl Mode for Transparent {
    type Context = NoTracker;
    type Link = ();
    const TRACKING: bool = false;

    #[inline]
    fn untracked() {}

    #[inline]
    fn attach(
        _ctx: &NoTracker,
        _address: Address,
        _shape: Shape,
        _track: bool,
        _type_name: &'static str,
    ) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn attach_new(
        _ctx: &NoTracker,
        _address: Address,
        _shape: Shape,
        _bytes: usize,
        _type_name: &'static str,
    ) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn share(_link: &(), _op: Operation) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn detach(_link: &mut ()) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn same_record(_a: &(), _b: &()) -> bool {
        false
    }

    #[inline]
    fn record_id(_link: &()) -> RecordId {
        RecordId::UNTRACKED
    }

    #[inline]
    fn count(_link: &()) -> usize {
        0
    }

    #[inline]
    fn check_live(_link: &(), _op: Operation) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn check_index(_link: &(), _pos: usize, _elem_size: usize) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn release(_link: &(), _address: Address, _shape: Shape) -> Result<(), PtrError> {
        Ok(())
    }

    #[inline]
    fn enforce<T>(_link: &(), result: Result<T, PtrError>) -> Result<T, PtrError> {
        result
    }

    #[inline]
    fn enforce_in<T>(_ctx: &NoTracker, result: Result<T, PtrError>) -> Result<T, PtrError> {
        result
    }
}
