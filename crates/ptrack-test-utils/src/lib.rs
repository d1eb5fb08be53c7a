//! Test fixtures for ptrack development.
//!
//! Trackers preconfigured for tests, a drop-counting [`Probe`] pointee,
//! one-shot log initialisation, and log capture.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    capture_logs, init_logging, panic_abort, panicking_tracker, propagating_tracker,
    verbose_tracker, Probe,
};
