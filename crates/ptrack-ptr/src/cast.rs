//! Conversions between pointee types.
//!
//! Every conversion yields a second handle on the same record, so the
//! count goes up by one and the source stays usable. Converting a handle
//! whose record was deleted is a protocol violation.

use std::any::{type_name, Any};
use std::ptr::NonNull;

use ptrack_core::{Operation, PtrError};

use crate::mode::Mode;
use crate::ptr::Ptr;

impl<T: ?Sized, M: Mode> Ptr<T, M> {
    /// Reinterpret the target as a `U`.
    ///
    /// # Safety
    ///
    /// The target must be valid as a `U` for every later access through the
    /// returned handle, including its release.
    pub unsafe fn cast<U>(&self) -> Result<Ptr<U, M>, PtrError> {
        self.convert(Operation::Cast, NonNull::cast::<U>)
    }
}

impl<T: Any, M: Mode> Ptr<T, M> {
    /// A type-erased handle on the same target, for checked downcasts.
    pub fn to_any(&self) -> Result<Ptr<dyn Any, M>, PtrError> {
        self.convert(Operation::Cast, |p| -> NonNull<dyn Any> { p })
    }
}

impl<M: Mode> Ptr<dyn Any, M> {
    /// Whether the target is a `U`.
    pub fn is<U: Any>(&self) -> Result<bool, PtrError> {
        Ok(self.get_for(Operation::DynamicCast)?.is::<U>())
    }

    /// A handle on the target as a `U`, verified against its runtime type.
    ///
    /// A target of any other type is a cast violation.
    pub fn downcast<U: Any>(&self) -> Result<Ptr<U, M>, PtrError> {
        if !self.is::<U>()? {
            let err = PtrError::CastViolation {
                op: Operation::DynamicCast,
                id: self.record_id(),
                address: self.address(),
                target: type_name::<U>(),
            };
            return M::enforce(self.link(), Err(err));
        }
        self.convert(Operation::DynamicCast, NonNull::cast::<U>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Instrumented, NoTracker, Transparent};
    use ptrack_core::ViolationKind;
    use ptrack_test_utils::propagating_tracker;

    #[test]
    fn cast_shares_record() {
        let tracker = propagating_tracker();
        let mut p = Ptr::<u32, Instrumented>::new(&tracker, 0x0102_0304).unwrap();
        let bytes = unsafe { p.cast::<[u8; 4]>() }.unwrap();
        assert_eq!(bytes.record_id(), p.record_id());
        assert_eq!(p.debug_count(), 2);
        assert_eq!(bytes.get().unwrap(), &0x0102_0304u32.to_ne_bytes());
        drop(bytes);
        unsafe { p.delete() }.unwrap();
    }

    #[test]
    fn release_after_cast_counts_the_created_type() {
        let tracker = propagating_tracker();
        let p = Ptr::<u32, Instrumented>::new(&tracker, 9).unwrap();
        let mut signed = unsafe { p.cast::<i32>() }.unwrap();
        drop(p);
        unsafe { signed.delete() }.unwrap();

        let registry = tracker.registry();
        let stats = registry.type_stats_for(type_name::<u32>()).unwrap();
        assert_eq!((stats.total, stats.current), (1, 0));
        assert_eq!(registry.type_stats_for(type_name::<i32>()), None);
    }

    #[test]
    fn cast_of_deleted_record_is_rejected() {
        let tracker = propagating_tracker();
        let mut p = Ptr::<u32, Instrumented>::new(&tracker, 1).unwrap();
        unsafe { p.delete() }.unwrap();
        let err = unsafe { p.cast::<i32>() }.unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Protocol);
        assert_eq!(err.operation(), Operation::Cast);
    }

    #[test]
    fn downcast_checks_runtime_type() {
        let tracker = propagating_tracker();
        let mut p = Ptr::<String, Instrumented>::new(&tracker, "hi".into()).unwrap();
        let any = p.to_any().unwrap();
        assert!(any.is::<String>().unwrap());
        assert_eq!(any.address(), p.address());

        let back = any.downcast::<String>().unwrap();
        assert_eq!(back.as_str(), "hi");
        assert_eq!(p.debug_count(), 3);

        let err = any.downcast::<u8>().unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Cast);
        assert_eq!(err.record_id(), Some(p.record_id()));
        assert!(err.to_string().contains("u8"));

        drop((any, back));
        unsafe { p.delete() }.unwrap();
    }

    #[test]
    fn transparent_downcast_still_checks_type() {
        let mut p = Ptr::<u64, Transparent>::new(&NoTracker, 5).unwrap();
        let any = p.to_any().unwrap();
        assert_eq!(*any.downcast::<u64>().unwrap(), 5);
        assert_eq!(
            any.downcast::<i64>().unwrap_err().kind(),
            ViolationKind::Cast
        );
        unsafe { p.delete() }.unwrap();
    }

    #[test]
    fn null_any_handle_reports_null_access() {
        let p: Ptr<dyn Any, Instrumented> = Ptr::null();
        let err = p.downcast::<u8>().unwrap_err();
        assert_eq!(err.kind(), ViolationKind::NullAccess);
    }
}
