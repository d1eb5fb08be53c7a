//! The address-to-record store.
//!
//! [`PointerRegistry`] owns every [`PointerRecord`] created during a run.
//! Records are append-only: ids are never reused, and a deleted record is
//! kept for inspection after its address has been registered again.

use indexmap::IndexMap;
use smallvec::SmallVec;

use ptrack_core::{Address, Extent, Operation, PointerRecord, PtrError, RecordId};

use crate::config::{apply_policy, RegistryConfig};
use crate::report::{LeakReport, TypeStats};

/// Registry of tracked addresses and their liveness records.
///
/// All lookups are O(1) amortized through address hashing; only
/// [`audit`](Self::audit) walks the record list.
pub struct PointerRegistry {
    /// Newest record for every address ever registered. The address has a
    /// live record exactly when that newest record is still active.
    latest: IndexMap<Address, RecordId>,
    /// All records, indexed by `RecordId`.
    records: Vec<PointerRecord>,
    /// Tracked allocation counters keyed by pointee type name.
    type_stats: IndexMap<&'static str, TypeStats>,
    config: RegistryConfig,
}

impl PointerRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            latest: IndexMap::new(),
            records: Vec::new(),
            type_stats: IndexMap::new(),
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Toggle per-operation trace lines.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    /// Whether per-operation trace lines are emitted.
    pub fn is_verbose(&self) -> bool {
        self.config.verbose
    }

    // ── Registration ───────────────────────────────────────────────

    /// Create an active scalar record for `address`.
    ///
    /// Fails if `address` is null or already has an active record.
    pub fn register(&mut self, address: Address) -> Result<RecordId, PtrError> {
        self.create(address, Operation::Register, true)
    }

    /// Create an active array record of `bytes` bytes for `address`.
    pub fn register_array(&mut self, address: Address, bytes: usize) -> Result<RecordId, PtrError> {
        let id = self.create(address, Operation::RegisterArray, true)?;
        self.promote_to_array(id, bytes)?;
        Ok(id)
    }

    /// Create an active record that address lookups never find.
    ///
    /// Zero-byte allocations all share one dangling address, so two of them
    /// must never be mistaken for aliases. Such a record is reachable only
    /// through its id and does not block later registrations of `address`.
    pub fn register_unkeyed(
        &mut self,
        address: Address,
        extent: Extent,
    ) -> Result<RecordId, PtrError> {
        let op = match extent {
            Extent::Scalar => Operation::Register,
            Extent::Array { .. } => Operation::RegisterArray,
        };
        let id = self.create(address, op, false)?;
        if let Extent::Array { bytes } = extent {
            self.promote_to_array(id, bytes)?;
        }
        Ok(id)
    }

    fn create(
        &mut self,
        address: Address,
        op: Operation,
        keyed: bool,
    ) -> Result<RecordId, PtrError> {
        if address.is_null() {
            return Err(PtrError::NullAccess { op });
        }
        if let Some(id) = self.current_id(address).filter(|_| keyed) {
            return Err(PtrError::OwnershipViolation {
                op,
                id,
                address,
                reason: "address already has an active record",
            });
        }

        let id = RecordId(self.records.len());
        if self.config.abort_on_new == Some(id) {
            (self.config.abort_handler)(&format!(
                "aborting at creation of record {id} ({address})"
            ));
        }
        if self.config.verbose {
            tracing::debug!(target: "ptrack::registry", "new {id} ({address})");
        }

        self.records.push(PointerRecord::new(id, address, Extent::Scalar));
        if keyed {
            self.latest.insert(address, id);
        }
        Ok(id)
    }

    /// Flag an existing record as an array of `bytes` bytes.
    pub fn promote_to_array(&mut self, id: RecordId, bytes: usize) -> Result<(), PtrError> {
        let record = self.record_mut(id, Operation::RegisterArray)?;
        record.promote_to_array(bytes);
        if self.config.verbose {
            tracing::debug!(target: "ptrack::registry", "array {id} of {bytes} bytes");
        }
        Ok(())
    }

    // ── Address queries ────────────────────────────────────────────

    /// Whether `address` has ever been registered.
    pub fn is_tracked(&self, address: Address) -> bool {
        self.latest.contains_key(&address)
    }

    /// Whether `address` currently has an active record.
    pub fn is_active(&self, address: Address) -> bool {
        self.current_id(address).is_some()
    }

    /// Id of the active record at `address`, if any.
    pub fn current_id(&self, address: Address) -> Option<RecordId> {
        let &id = self.latest.get(&address)?;
        self.records[id.index()].is_active().then_some(id)
    }

    /// Id of the newest record at `address`, active or deleted.
    pub fn latest_id(&self, address: Address) -> Option<RecordId> {
        self.latest.get(&address).copied()
    }

    // ── Id-based mutation ──────────────────────────────────────────

    /// Add a handle to record `id`. No-op for [`RecordId::UNTRACKED`].
    pub fn increment_by_id(&mut self, id: RecordId) -> Result<(), PtrError> {
        if !id.is_tracked() {
            return Ok(());
        }
        if self.config.verbose {
            tracing::debug!(target: "ptrack::registry", "inc {id}");
        }
        self.record_mut(id, Operation::Increment)?.increment()
    }

    /// Remove a handle from record `id`. No-op for [`RecordId::UNTRACKED`].
    pub fn decrement_by_id(&mut self, id: RecordId) -> Result<(), PtrError> {
        if !id.is_tracked() {
            return Ok(());
        }
        let record = self.record_mut(id, Operation::Decrement)?;
        let address = record.address();
        let result = record.decrement();
        if self.config.verbose {
            tracing::debug!(target: "ptrack::registry", "dec {id} ({address})");
        }
        result
    }

    /// Transition record `id` to deleted.
    pub fn mark_deleted_by_id(&mut self, id: RecordId) -> Result<(), PtrError> {
        if !id.is_tracked() {
            return Err(PtrError::OwnershipViolation {
                op: Operation::MarkDeleted,
                id,
                address: Address::NULL,
                reason: "release of an untracked handle",
            });
        }
        if self.config.abort_on_delete == Some(id) {
            (self.config.abort_handler)(&format!("aborting at deletion of record {id}"));
        }
        if self.config.verbose {
            tracing::debug!(target: "ptrack::registry", "delete {id}");
        }
        self.record_mut(id, Operation::MarkDeleted)?.mark_deleted()
    }

    fn record_mut(&mut self, id: RecordId, op: Operation) -> Result<&mut PointerRecord, PtrError> {
        self.records
            .get_mut(id.index())
            .ok_or(PtrError::OwnershipViolation {
                op,
                id,
                address: Address::NULL,
                reason: "unknown record id",
            })
    }

    // ── Id-based queries ───────────────────────────────────────────

    /// The record with id `id`, if it exists.
    pub fn record(&self, id: RecordId) -> Option<&PointerRecord> {
        self.records.get(id.index())
    }

    /// Whether record `id` has been deleted. False for untracked or unknown ids.
    pub fn is_deleted_by_id(&self, id: RecordId) -> bool {
        self.record(id).is_some_and(|r| !r.is_active())
    }

    /// Whether record `id` is an array.
    pub fn is_array_by_id(&self, id: RecordId) -> bool {
        self.record(id).is_some_and(PointerRecord::is_array)
    }

    /// Array size of record `id` in bytes; zero for scalars and unknown ids.
    pub fn array_bytes_by_id(&self, id: RecordId) -> usize {
        self.record(id).map_or(0, PointerRecord::array_bytes)
    }

    /// Number of live handles aliasing record `id`.
    pub fn count_by_id(&self, id: RecordId) -> usize {
        self.record(id).map_or(0, PointerRecord::count)
    }

    /// Number of records created so far.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// All records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &PointerRecord> {
        self.records.iter()
    }

    // ── Per-type statistics ────────────────────────────────────────

    /// Label record `id` as an allocation of `type_name` and count it.
    ///
    /// A record is counted once; relabelling it is ignored.
    pub fn note_type_created(&mut self, id: RecordId, type_name: &'static str) {
        let Some(record) = self.records.get_mut(id.index()) else {
            return;
        };
        if record.type_name().is_some() {
            return;
        }
        record.set_type_name(type_name);
        let stats = self.type_stats.entry(type_name).or_default();
        stats.total += 1;
        stats.current += 1;
    }

    /// Count the release of record `id` under the type it was created as.
    pub fn note_type_released(&mut self, id: RecordId) {
        let Some(type_name) = self.record(id).and_then(PointerRecord::type_name) else {
            return;
        };
        if let Some(stats) = self.type_stats.get_mut(type_name) {
            stats.current = stats.current.saturating_sub(1);
        }
    }

    /// Counters for `type_name`, if any allocation of it was tracked.
    pub fn type_stats_for(&self, type_name: &str) -> Option<TypeStats> {
        self.type_stats.get(type_name).copied()
    }

    /// Counters for every tracked pointee type, in first-seen order.
    pub fn type_stats(&self) -> impl Iterator<Item = (&'static str, TypeStats)> + '_ {
        self.type_stats.iter().map(|(&name, &stats)| (name, stats))
    }

    // ── Audit and policy ───────────────────────────────────────────

    /// Summarize outstanding records. Never aborts.
    pub fn audit(&self) -> LeakReport {
        let mut leaked = SmallVec::new();
        let mut dangling = 0;
        for record in &self.records {
            if record.is_active() {
                leaked.push(record.id());
            } else if record.count() > 0 {
                dangling += 1;
            }
        }
        LeakReport {
            total: self.records.len(),
            outstanding: leaked.len(),
            dangling,
            leaked,
        }
    }

    /// Apply the violation policy to `result`.
    ///
    /// Under [`ViolationPolicy::Abort`] an error never returns: it is handed
    /// to the abort handler with its diagnostic context.
    pub fn enforce<T>(&self, result: Result<T, PtrError>) -> Result<T, PtrError> {
        apply_policy(self.config.fatal_handler(), result)
    }
}

impl Default for PointerRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Drop for PointerRegistry {
    fn drop(&mut self) {
        let report = self.audit();
        if report.is_clean() {
            tracing::info!(target: "ptrack::registry", "{report}");
        } else {
            tracing::warn!(target: "ptrack::registry", "{report}");
        }
    }
}

impl std::fmt::Debug for PointerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerRegistry")
            .field("records", &self.records.len())
            .field("addresses", &self.latest.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViolationPolicy;
    use ptrack_core::ViolationKind;

    fn registry() -> PointerRegistry {
        PointerRegistry::new(RegistryConfig::new().with_policy(ViolationPolicy::Propagate))
    }

    fn addr(v: usize) -> Address {
        Address::from(v)
    }

    fn panic_abort(message: &str) -> ! {
        panic!("abort: {message}")
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut reg = registry();
        assert_eq!(reg.register(addr(0x100)).unwrap(), RecordId(0));
        assert_eq!(reg.register(addr(0x200)).unwrap(), RecordId(1));
        assert_eq!(reg.record_count(), 2);
        assert!(reg.is_active(addr(0x100)));
        assert_eq!(reg.current_id(addr(0x200)), Some(RecordId(1)));
        assert_eq!(reg.count_by_id(RecordId(0)), 1);
    }

    #[test]
    fn live_address_cannot_be_registered_twice() {
        let mut reg = registry();
        reg.register(addr(0x100)).unwrap();
        let err = reg.register(addr(0x100)).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Ownership);
        assert_eq!(reg.record_count(), 1);
    }

    #[test]
    fn null_address_is_rejected() {
        let mut reg = registry();
        let err = reg.register(Address::NULL).unwrap_err();
        assert_eq!(err, PtrError::NullAccess { op: Operation::Register });
    }

    #[test]
    fn array_registration_records_extent() {
        let mut reg = registry();
        let id = reg.register_array(addr(0x100), 40).unwrap();
        assert!(reg.is_array_by_id(id));
        assert_eq!(reg.array_bytes_by_id(id), 40);
        assert_eq!(reg.current_id(addr(0x100)), Some(id));
    }

    #[test]
    fn promotion_turns_scalar_into_array() {
        let mut reg = registry();
        let id = reg.register(addr(0x100)).unwrap();
        reg.promote_to_array(id, 16).unwrap();
        assert!(reg.is_array_by_id(id));
        assert!(reg.promote_to_array(RecordId(9), 16).is_err());
    }

    #[test]
    fn reregistration_after_delete_gets_new_id() {
        let mut reg = registry();
        let first = reg.register(addr(0x100)).unwrap();
        reg.mark_deleted_by_id(first).unwrap();
        assert!(reg.is_tracked(addr(0x100)));
        assert!(!reg.is_active(addr(0x100)));
        assert_eq!(reg.current_id(addr(0x100)), None);
        assert_eq!(reg.latest_id(addr(0x100)), Some(first));

        let second = reg.register(addr(0x100)).unwrap();
        assert_ne!(first, second);
        assert!(reg.is_deleted_by_id(first));
        assert!(!reg.is_deleted_by_id(second));
        assert_eq!(reg.record(first).unwrap().address(), addr(0x100));
    }

    #[test]
    fn untracked_sentinel_is_inert() {
        let mut reg = registry();
        reg.increment_by_id(RecordId::UNTRACKED).unwrap();
        reg.decrement_by_id(RecordId::UNTRACKED).unwrap();
        assert!(!reg.is_deleted_by_id(RecordId::UNTRACKED));
        assert_eq!(reg.record_count(), 0);
        let err = reg.mark_deleted_by_id(RecordId::UNTRACKED).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Ownership);
    }

    #[test]
    fn unknown_id_is_ownership_violation() {
        let mut reg = registry();
        let err = reg.increment_by_id(RecordId(5)).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Ownership);
    }

    #[test]
    fn increment_after_delete_propagates_record_failure() {
        let mut reg = registry();
        let id = reg.register(addr(0x100)).unwrap();
        reg.mark_deleted_by_id(id).unwrap();
        let err = reg.increment_by_id(id).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Protocol);
        let err = reg.mark_deleted_by_id(id).unwrap_err();
        assert_eq!(err.kind(), ViolationKind::Protocol);
    }

    #[test]
    fn audit_counts_outstanding_and_dangling() {
        let mut reg = registry();
        let a = reg.register(addr(0x100)).unwrap();
        let b = reg.register(addr(0x200)).unwrap();
        let c = reg.register(addr(0x300)).unwrap();
        reg.mark_deleted_by_id(a).unwrap();
        reg.mark_deleted_by_id(b).unwrap();
        reg.decrement_by_id(b).unwrap();

        let report = reg.audit();
        assert_eq!(report.total, 3);
        assert_eq!(report.outstanding, 1);
        assert_eq!(report.dangling, 1);
        assert_eq!(report.leaked.as_slice(), &[c]);
    }

    #[test]
    fn type_stats_track_current_and_total() {
        let mut reg = registry();
        let a = reg.register(addr(0x100)).unwrap();
        let b = reg.register(addr(0x200)).unwrap();
        let c = reg.register(addr(0x300)).unwrap();
        reg.note_type_created(a, "u32");
        reg.note_type_created(b, "u32");
        reg.note_type_created(c, "String");
        reg.note_type_released(a);
        reg.note_type_released(RecordId(9));

        assert_eq!(
            reg.type_stats_for("u32"),
            Some(TypeStats {
                total: 2,
                current: 1
            })
        );
        assert_eq!(reg.record(b).unwrap().type_name(), Some("u32"));
        let names: Vec<_> = reg.type_stats().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["u32", "String"]);
    }

    #[test]
    fn release_counts_under_the_created_type() {
        let mut reg = registry();
        let id = reg.register(addr(0x100)).unwrap();
        reg.note_type_created(id, "u32");
        reg.note_type_created(id, "[u8; 4]");
        reg.note_type_released(id);

        assert_eq!(
            reg.type_stats_for("u32"),
            Some(TypeStats {
                total: 1,
                current: 0
            })
        );
        assert_eq!(reg.type_stats_for("[u8; 4]"), None);
    }

    #[test]
    fn unkeyed_records_share_an_address_independently() {
        let mut reg = registry();
        let a = reg.register_unkeyed(addr(0x8), Extent::Scalar).unwrap();
        let b = reg
            .register_unkeyed(addr(0x8), Extent::Array { bytes: 0 })
            .unwrap();
        assert_ne!(a, b);
        assert!(!reg.is_tracked(addr(0x8)));
        assert_eq!(reg.current_id(addr(0x8)), None);
        assert!(reg.is_array_by_id(b));

        reg.mark_deleted_by_id(a).unwrap();
        reg.mark_deleted_by_id(b).unwrap();
        let keyed = reg.register(addr(0x8)).unwrap();
        assert_eq!(reg.current_id(addr(0x8)), Some(keyed));
        assert_eq!(reg.audit().leaked.as_slice(), &[keyed]);
    }

    #[test]
    fn verbose_flag_toggles() {
        let mut reg = registry();
        assert!(!reg.is_verbose());
        reg.set_verbose(true);
        assert!(reg.is_verbose());
    }

    #[test]
    fn propagate_policy_returns_errors() {
        let reg = registry();
        let err = PtrError::NullAccess { op: Operation::Deref };
        assert_eq!(reg.enforce::<()>(Err(err.clone())), Err(err));
        assert_eq!(reg.enforce(Ok(3)), Ok(3));
    }

    #[test]
    #[should_panic(expected = "abort: null access: deref: null handle")]
    fn abort_policy_calls_handler() {
        let reg = PointerRegistry::new(RegistryConfig::new().with_abort_handler(panic_abort));
        let _ = reg.enforce::<()>(Err(PtrError::NullAccess { op: Operation::Deref }));
    }

    #[test]
    #[should_panic(expected = "aborting at creation of record 1")]
    fn abort_on_new_fires_for_matching_id() {
        let mut reg = PointerRegistry::new(
            RegistryConfig::new()
                .with_abort_on_new(RecordId(1))
                .with_abort_handler(panic_abort),
        );
        reg.register(addr(0x100)).unwrap();
        let _ = reg.register(addr(0x200));
    }

    #[test]
    #[should_panic(expected = "aborting at deletion of record 0")]
    fn abort_on_delete_fires_for_matching_id() {
        let mut reg = PointerRegistry::new(
            RegistryConfig::new()
                .with_abort_on_delete(RecordId(0))
                .with_abort_handler(panic_abort),
        );
        let id = reg.register(addr(0x100)).unwrap();
        let _ = reg.mark_deleted_by_id(id);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Register(usize),
            Increment(usize),
            Decrement(usize),
            Delete(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1usize..8).prop_map(Op::Register),
                (0usize..16).prop_map(Op::Increment),
                (0usize..16).prop_map(Op::Decrement),
                (0usize..16).prop_map(Op::Delete),
            ]
        }

        proptest! {
            #[test]
            fn record_list_only_grows(ops in proptest::collection::vec(op(), 1..64)) {
                let mut reg = registry();
                let mut previous = 0;
                for op in ops {
                    let _ = match op {
                        Op::Register(a) => reg.register(addr(a * 0x10)).map(|_| ()),
                        Op::Increment(id) => reg.increment_by_id(RecordId(id)),
                        Op::Decrement(id) => reg.decrement_by_id(RecordId(id)),
                        Op::Delete(id) => reg.mark_deleted_by_id(RecordId(id)),
                    };
                    prop_assert!(reg.record_count() >= previous);
                    previous = reg.record_count();
                }
            }

            #[test]
            fn at_most_one_active_record_per_address(
                ops in proptest::collection::vec(op(), 1..64),
            ) {
                let mut reg = registry();
                for op in ops {
                    let _ = match op {
                        Op::Register(a) => reg.register(addr(a * 0x10)).map(|_| ()),
                        Op::Increment(id) => reg.increment_by_id(RecordId(id)),
                        Op::Decrement(id) => reg.decrement_by_id(RecordId(id)),
                        Op::Delete(id) => reg.mark_deleted_by_id(RecordId(id)),
                    };
                }
                let mut active = std::collections::HashSet::new();
                for record in reg.records().filter(|r| r.is_active()) {
                    prop_assert!(active.insert(record.address()));
                    prop_assert!(record.count() >= 1);
                }
            }

            #[test]
            fn audit_reports_unreleased_records(n in 1usize..32, m_seed in 0usize..32) {
                let m = m_seed % (n + 1);
                let mut reg = registry();
                let ids: Vec<_> = (0..n)
                    .map(|i| reg.register(addr((i + 1) * 0x10)).unwrap())
                    .collect();
                for &id in &ids[..m] {
                    reg.mark_deleted_by_id(id).unwrap();
                }
                let report = reg.audit();
                prop_assert_eq!(report.total, n);
                prop_assert_eq!(report.outstanding, n - m);
            }
        }
    }
}
