//! End-of-run audit results.

use std::fmt;

use smallvec::SmallVec;

use ptrack_core::RecordId;

/// Summary produced by [`PointerRegistry::audit`](crate::PointerRegistry::audit).
///
/// Purely informational: an unclean report never aborts anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Records created over the registry's lifetime.
    pub total: usize,
    /// Records still active, i.e. never released.
    pub outstanding: usize,
    /// Records that were released but are still aliased by live handles.
    pub dangling: usize,
    /// Ids of the outstanding records, in creation order.
    pub leaked: SmallVec<[RecordId; 8]>,
}

impl LeakReport {
    /// Whether every record was released.
    pub fn is_clean(&self) -> bool {
        self.outstanding == 0
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(
                f,
                "no memory leaks found: {} records created; {} released records still referenced",
                self.total, self.dangling
            );
        }
        write!(
            f,
            "{} of {} records never released (ids:",
            self.outstanding, self.total
        )?;
        for id in &self.leaked {
            write!(f, " {id}")?;
        }
        write!(f, ")")
    }
}

/// Per-pointee-type allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeStats {
    /// Tracked allocations of this type created so far.
    pub total: usize,
    /// Tracked allocations of this type not yet released.
    pub current: usize,
}
