//! Benchmark workloads for ptrack.
//!
//! Each workload is generic over [`Mode`] so the same code measures the
//! instrumented and the transparent handle:
//!
//! - [`churn`]: allocate, alias, and release `n` scalars
//! - [`array_sweep`]: fill and sum an `n`-element array through checked indexing
//! - [`bench_tracker`]: a quiet tracker that returns violations as values

#![deny(rustdoc::broken_intra_doc_links)]

use ptrack_core::PtrError;
use ptrack_ptr::{Mode, Ptr};
use ptrack_registry::{RegistryConfig, Tracker, ViolationPolicy};

/// Tracker for benchmark runs: no traces, violations propagate.
pub fn bench_tracker() -> Tracker {
    Tracker::new(RegistryConfig::new().with_policy(ViolationPolicy::Propagate))
}

/// Allocate `n` values, take `aliases` copies of each, read through every
/// copy, then release. Returns the sum of everything read.
pub fn churn<M: Mode>(ctx: &M::Context, n: usize, aliases: usize) -> Result<u64, PtrError> {
    let mut sum = 0u64;
    for i in 0..n as u64 {
        let mut root = Ptr::<u64, M>::new(ctx, i)?;
        let copies = (0..aliases)
            .map(|_| root.try_clone())
            .collect::<Result<Vec<_>, _>>()?;
        for copy in &copies {
            sum += *copy.get()?;
        }
        drop(copies);
        // SAFETY: `root` came from `Ptr::new` and its aliases are gone.
        unsafe { root.delete()? };
    }
    Ok(sum)
}

/// Fill an `n`-element array through `index_mut`, sum it through `index`,
/// and release it.
pub fn array_sweep<M: Mode>(ctx: &M::Context, n: usize) -> Result<u64, PtrError> {
    let mut array = Ptr::<u64, M>::new_array(ctx, n)?;
    let mut sum = 0;
    // SAFETY: every position is below `n`, the array's length, and the
    // array is released exactly once with that length.
    unsafe {
        for i in 0..n {
            *array.index_mut(i)? = i as u64;
        }
        for i in 0..n {
            sum += *array.index(i)?;
        }
        array.delete_array(n)?;
    }
    Ok(sum)
}
