//! Registry-backed tracking.

use std::fmt;
use std::mem;

use ptrack_core::{Address, Extent, Operation, PtrError, RecordId};
use ptrack_registry::{PointerRegistry, Tracker};

use crate::mode::{elements, Mode, Shape};

/// Mode whose handles are audited through a [`Tracker`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Instrumented;

/// An instrumented handle's tie to its registry.
///
/// `tracker` is kept even for untracked handles built against a context,
/// so their violations still follow that context's policy. Handles with
/// no tracker at all (`Ptr::null()`) return violations as values.
pub struct TrackedLink {
    tracker: Option<Tracker>,
    id: RecordId,
}

impl TrackedLink {
    /// The tracker and id of a tracked link.
    fn tracked(&self) -> Option<(&Tracker, RecordId)> {
        match &self.tracker {
            Some(tracker) if self.id.is_tracked() => Some((tracker, self.id)),
            _ => None,
        }
    }

    /// The tracker this link reports to, if any.
    pub fn tracker(&self) -> Option<&Tracker> {
        self.tracker.as_ref()
    }
}

impl fmt::Debug for TrackedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedLink")
            .field("id", &self.id)
            .field("has_tracker", &self.tracker.is_some())
            .finish()
    }
}

fn protocol(
    op: Operation,
    id: RecordId,
    registry: &PointerRegistry,
    reason: &'static str,
) -> PtrError {
    PtrError::ProtocolViolation {
        op,
        id,
        address: address_of(registry, id),
        reason,
    }
}

fn address_of(registry: &PointerRegistry, id: RecordId) -> Address {
    registry.record(id).map_or(Address::NULL, |r| r.address())
}

impl Mode for Instrumented {
    type Context = Tracker;
    type Link = TrackedLink;
    const TRACKING: bool = true;

    fn untracked() -> TrackedLink {
        TrackedLink {
            tracker: None,
            id: RecordId::UNTRACKED,
        }
    }

    fn attach(
        ctx: &Tracker,
        address: Address,
        shape: Shape,
        track: bool,
        type_name: &'static str,
    ) -> Result<TrackedLink, PtrError> {
        let mut registry = ctx.registry_mut();
        if registry.is_verbose() {
            tracing::debug!(
                target: "ptrack::ptr",
                "construct {type_name} at {address} ({shape:?}, track={track})"
            );
        }

        let id = if let Some(id) = registry.current_id(address) {
            if let Shape::Array { len, elem_size } = shape {
                let recorded = registry.array_bytes_by_id(id);
                if shape.extent().bytes() != recorded {
                    return Err(PtrError::RangeViolation {
                        op: Operation::RegisterArray,
                        id,
                        address,
                        requested: len,
                        extent: elements(recorded, elem_size),
                    });
                }
            }
            registry.increment_by_id(id)?;
            id
        } else if track {
            let id = match shape.extent() {
                Extent::Scalar => registry.register(address)?,
                Extent::Array { bytes } => registry.register_array(address, bytes)?,
            };
            registry.note_type_created(id, type_name);
            id
        } else {
            RecordId::UNTRACKED
        };

        Ok(TrackedLink {
            tracker: Some(ctx.clone()),
            id,
        })
    }

    fn attach_new(
        ctx: &Tracker,
        address: Address,
        shape: Shape,
        bytes: usize,
        type_name: &'static str,
    ) -> Result<TrackedLink, PtrError> {
        if bytes != 0 {
            return Self::attach(ctx, address, shape, true, type_name);
        }
        let mut registry = ctx.registry_mut();
        if registry.is_verbose() {
            tracing::debug!(
                target: "ptrack::ptr",
                "construct {type_name} at {address} ({shape:?}, zero-sized)"
            );
        }
        let id = registry.register_unkeyed(address, shape.extent())?;
        registry.note_type_created(id, type_name);
        Ok(TrackedLink {
            tracker: Some(ctx.clone()),
            id,
        })
    }

    fn share(link: &TrackedLink, op: Operation) -> Result<TrackedLink, PtrError> {
        let Some((tracker, id)) = link.tracked() else {
            return Ok(TrackedLink {
                tracker: link.tracker.clone(),
                id: RecordId::UNTRACKED,
            });
        };
        let mut registry = tracker.registry_mut();
        if registry.is_deleted_by_id(id) {
            return Err(protocol(op, id, &registry, "source record already deleted"));
        }
        registry.increment_by_id(id)?;
        Ok(TrackedLink {
            tracker: Some(tracker.clone()),
            id,
        })
    }

    fn detach(link: &mut TrackedLink) -> Result<(), PtrError> {
        let id = mem::replace(&mut link.id, RecordId::UNTRACKED);
        match &link.tracker {
            Some(tracker) if id.is_tracked() => tracker.registry_mut().decrement_by_id(id),
            _ => Ok(()),
        }
    }

    fn same_record(a: &TrackedLink, b: &TrackedLink) -> bool {
        match (a.tracked(), b.tracked()) {
            (Some((ta, ia)), Some((tb, ib))) => ia == ib && ta.ptr_eq(tb),
            _ => false,
        }
    }

    fn record_id(link: &TrackedLink) -> RecordId {
        link.id
    }

    fn count(link: &TrackedLink) -> usize {
        link.tracked()
            .map_or(0, |(tracker, id)| tracker.registry().count_by_id(id))
    }

    fn check_live(link: &TrackedLink, op: Operation) -> Result<(), PtrError> {
        let Some((tracker, id)) = link.tracked() else {
            return Ok(());
        };
        let registry = tracker.registry();
        if registry.is_deleted_by_id(id) {
            return Err(protocol(op, id, &registry, "record already deleted"));
        }
        Ok(())
    }

    fn check_index(link: &TrackedLink, pos: usize, elem_size: usize) -> Result<(), PtrError> {
        let Some((tracker, id)) = link.tracked() else {
            return Ok(());
        };
        let registry = tracker.registry();
        let Some(record) = registry.record(id) else {
            return Ok(());
        };
        if !record.is_active() {
            return Err(protocol(Operation::Index, id, &registry, "record already deleted"));
        }
        let extent = elements(record.array_bytes(), elem_size);
        if !record.is_array() || pos >= extent {
            return Err(PtrError::RangeViolation {
                op: Operation::Index,
                id,
                address: record.address(),
                requested: pos,
                extent,
            });
        }
        Ok(())
    }

    fn release(link: &TrackedLink, address: Address, shape: Shape) -> Result<(), PtrError> {
        let op = match shape {
            Shape::Scalar => Operation::Delete,
            Shape::Array { .. } => Operation::DeleteArray,
        };
        let Some((tracker, id)) = link.tracked() else {
            return Err(PtrError::OwnershipViolation {
                op,
                id: RecordId::UNTRACKED,
                address,
                reason: "release of an untracked handle",
            });
        };

        let mut registry = tracker.registry_mut();
        let Some(record) = registry.record(id) else {
            return Err(PtrError::OwnershipViolation {
                op,
                id,
                address,
                reason: "unknown record id",
            });
        };
        if !record.is_active() {
            return Err(protocol(op, id, &registry, "record deleted twice"));
        }
        let ownership = |reason| PtrError::OwnershipViolation {
            op,
            id,
            address,
            reason,
        };
        match (shape, record.extent()) {
            (Shape::Scalar, Extent::Array { .. }) => {
                return Err(ownership("array released with delete"));
            }
            (Shape::Array { .. }, Extent::Scalar) => {
                return Err(ownership("scalar released with delete_array"));
            }
            (Shape::Array { len, elem_size }, Extent::Array { bytes })
                if shape.extent().bytes() != bytes =>
            {
                return Err(PtrError::RangeViolation {
                    op,
                    id,
                    address,
                    requested: len,
                    extent: elements(bytes, elem_size),
                });
            }
            _ => {}
        }

        registry.mark_deleted_by_id(id)?;
        registry.note_type_released(id);
        Ok(())
    }

    fn enforce<T>(link: &TrackedLink, result: Result<T, PtrError>) -> Result<T, PtrError> {
        match &link.tracker {
            Some(tracker) => tracker.enforce(result),
            None => result,
        }
    }

    fn enforce_in<T>(ctx: &Tracker, result: Result<T, PtrError>) -> Result<T, PtrError> {
        ctx.enforce(result)
    }
}
